use anyhow::Result;
use tokio_util::sync::CancellationToken;

use super::logs::{stream_opts, LogsArgs};
use super::Context;
use crate::output::PlainLogPrinter;
use crate::prompt::{self, PromptDefault};

/// Stream the logs of an addon. Addon lines carry no process name.
pub async fn logs(ctx: &Context, name: Option<String>, args: LogsArgs) -> Result<()> {
    let name = prompt::ask("Addon Name:", name, PromptDefault::None).await?;
    let opts = stream_opts(args.follow, args.since, args.tail)?;
    let stream = ctx.api.addon_log_stream(&name, &opts).await?;

    let mut printer = PlainLogPrinter::new(std::io::stdout());
    stream.follow(&mut printer, &CancellationToken::new()).await?;
    Ok(())
}
