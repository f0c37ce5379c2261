use anyhow::Result;

use super::Context;

/// Prompt for credentials and store the new token. The login flow reports
/// who is logged in.
pub async fn execute(ctx: &Context) -> Result<()> {
    ctx.tokens.login().await?;
    Ok(())
}
