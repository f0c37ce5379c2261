use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use lade_core::api::LogStreamOpts;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Context;
use crate::output::DeployLogPrinter;
use crate::prompt::{self, PromptDefault};

/// Directories never shipped with a release
const EXCLUDED_DIRS: &[&str] = &[".git"];

/// Upload the working directory as a release and follow its build
pub async fn execute(ctx: &Context, app: Option<String>) -> Result<()> {
    let app = prompt::ask("App Name:", app, PromptDefault::current_dir_name()).await?;

    let dir = std::env::current_dir().context("Failed to read current directory")?;
    let tarball = tokio::task::spawn_blocking(move || build_tarball(&dir))
        .await?
        .context("Failed to package source")?;
    debug!(bytes = tarball.len(), "Packaged source");

    let release = ctx
        .api
        .create_release(&app, tarball)
        .await
        .context("Failed to create release")?;
    let stream = ctx
        .api
        .release_log_stream(&app, &release, &LogStreamOpts::follow())
        .await?;

    let mut printer = DeployLogPrinter::new(io::stdout());
    stream.follow(&mut printer, &CancellationToken::new()).await?;
    printer.finish()?;

    println!("Build finished use \"lade logs -a {} -f\" to view app logs", app);
    Ok(())
}

/// Gzipped tarball of `dir`, paths relative to it
pub fn build_tarball(dir: &Path) -> io::Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut archive = tar::Builder::new(encoder);
    archive.follow_symlinks(false);

    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<_>>()?;
    entries.sort();

    for path in entries {
        let Some(name) = path.file_name().map(PathBuf::from) else {
            continue;
        };
        if EXCLUDED_DIRS.iter().any(|excluded| name.as_os_str() == *excluded) {
            continue;
        }
        if path.is_dir() {
            archive.append_dir_all(&name, &path)?;
        } else {
            archive.append_path_with_name(&path, &name)?;
        }
    }

    archive.into_inner()?.finish()
}
