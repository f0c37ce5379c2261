use std::io::IsTerminal;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use lade_core::api::{LogStreamOpts, Process};
use tokio_util::sync::CancellationToken;

use super::Context;
use crate::output::NamedLogPrinter;
use crate::prompt::{self, PromptDefault};

pub struct LogsArgs {
    pub app: Option<String>,
    pub follow: bool,
    pub since: Option<Duration>,
    pub tail: Option<u32>,
}

/// Stream an app's logs with every line prefixed by its process name
pub async fn execute(ctx: &Context, args: LogsArgs) -> Result<()> {
    let app = prompt::ask("App Name:", args.app, PromptDefault::current_dir_name()).await?;
    let processes = ctx.api.list_processes(&app).await?;
    let width = Process::name_width(&processes);

    let opts = stream_opts(args.follow, args.since, args.tail)?;
    let stream = ctx.api.app_log_stream(&app, &opts).await?;

    let stdout = std::io::stdout();
    let color = stdout.is_terminal();
    let mut printer = NamedLogPrinter::new(stdout, width, color);
    stream.follow(&mut printer, &CancellationToken::new()).await?;
    Ok(())
}

/// Options for a log stream given the command-line flags
pub fn stream_opts(follow: bool, since: Option<Duration>, tail: Option<u32>) -> Result<LogStreamOpts> {
    let since = match since.filter(|d| !d.is_zero()) {
        Some(since) => Some(Utc::now() - chrono::Duration::from_std(since)?),
        None => None,
    };
    Ok(LogStreamOpts { follow, tail, since })
}

/// Parse a duration such as `90s`, `15m` or `1h30m`
pub fn parse_since(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("empty duration".to_string());
    }
    if value == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = Duration::ZERO;
    let mut rest = value;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(format!("invalid duration {:?}", value));
        }
        let amount: u64 = rest[..digits]
            .parse()
            .map_err(|_| format!("invalid duration {:?}", value))?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = match &rest[..unit_len] {
            "ms" => Duration::from_millis(1),
            "s" => Duration::from_secs(1),
            "m" => Duration::from_secs(60),
            "h" => Duration::from_secs(60 * 60),
            "" => return Err(format!("missing unit in duration {:?}", value)),
            other => return Err(format!("unknown unit {:?} in duration {:?}", other, value)),
        };
        rest = &rest[unit_len..];

        let amount = u32::try_from(amount).map_err(|_| format!("duration {:?} is too large", value))?;
        total += unit * amount;
    }
    Ok(total)
}
