use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use lade_core::api::{ProcessCreateOpts, ProcessResizer};
use lade_core::stream::{AttachMode, Attacher, CrosstermTerminal, ResizeEvents};
use tracing::debug;

use super::Context;
use crate::prompt::{self, PromptDefault};

pub struct RunArgs {
    pub command: Option<String>,
    pub app: Option<String>,
    pub plan: Option<String>,
}

/// Start a one-off process and attach the terminal to it until it exits
pub async fn execute(ctx: &Context, args: RunArgs) -> Result<()> {
    let app = prompt::ask("App Name:", args.app, PromptDefault::current_dir_name()).await?;
    let command = prompt::ask("Command:", args.command, PromptDefault::None).await?;

    let opts = ProcessCreateOpts {
        command,
        plan: args.plan.filter(|p| !p.is_empty()),
    };
    let process = ctx
        .api
        .create_process(&app, &opts)
        .await
        .with_context(|| format!("Failed to start process on {}", app))?;
    let conn = ctx.api.attach_process(&app, process.number).await?;

    // Without a terminal there is nothing to put in raw mode or resize.
    let mode = attach_mode(std::io::stdin().is_terminal());
    debug!(app = %app, number = process.number, ?mode, "Attaching to process");

    let resizer = ProcessResizer::new(ctx.api.clone(), app, process.number);
    let attacher = Attacher::new(Arc::new(CrosstermTerminal)).with_resize(Arc::new(resizer));
    let events = match mode {
        AttachMode::Interactive => ResizeEvents::from_signal(),
        AttachMode::OutputOnly => ResizeEvents::none(),
    };

    attacher
        .attach(conn, &mut tokio::io::stdin(), &mut tokio::io::stdout(), mode, events)
        .await?;
    Ok(())
}

fn attach_mode(stdin_is_terminal: bool) -> AttachMode {
    if stdin_is_terminal {
        AttachMode::Interactive
    } else {
        AttachMode::OutputOnly
    }
}
