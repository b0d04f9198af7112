// Rehearsal - terminal rehearsal track player
// Loads the catalog, wires the shared controller to the surfaces and runs the TUI

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rehearsal::ui::App;
use rehearsal::{Catalog, Config};

#[derive(Parser)]
#[command(name = "rehearsal")]
#[command(about = "Play rehearsal tracks with one shared player and automatic advance")]
struct Args {
    /// Config file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Catalog file, overriding `catalog_path` from the config
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Enable developer logging (stderr + debug output)
    #[arg(long)]
    dev: bool,
}

fn init_logging(log_dir: &Path, dev: bool) -> Result<()> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;

    // Daily rotating file appender
    let file_appender = tracing_appender::rolling::daily(log_dir, "rehearsal.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rehearsal=debug"));

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_target(true)
        .with_level(true)
        .with_ansi(false);
    let stderr_layer = dev.then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()?;

    // Keep the writer alive for the whole process
    std::mem::forget(guard);
    Ok(())
}

/// Point stderr at /dev/null so audio backend chatter does not tear the TUI.
fn redirect_stderr_to_null() -> Result<()> {
    unsafe {
        let null_fd = libc::open(
            b"/dev/null\0".as_ptr() as *const libc::c_char,
            libc::O_WRONLY,
        );
        if null_fd == -1 {
            return Err(anyhow::anyhow!("Failed to open /dev/null"));
        }

        if libc::dup2(null_fd, libc::STDERR_FILENO) == -1 {
            libc::close(null_fd);
            return Err(anyhow::anyhow!("Failed to redirect stderr"));
        }
        libc::close(null_fd);
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(catalog) = args.catalog {
        config.catalog_path = catalog;
    }

    init_logging(&config.log_dir, args.dev)?;
    info!("Rehearsal starting up");

    // Load before silencing stderr so a bad catalog is still reported
    let catalog = Catalog::load(&config.catalog_path)
        .with_context(|| format!("loading catalog {}", config.catalog_path.display()))?;

    if args.dev {
        debug!("Dev mode: keeping stderr for debug output");
    } else {
        redirect_stderr_to_null()?;
    }

    let mut app = App::new(&config, Arc::new(catalog))?;
    app.run().await?;

    info!("Rehearsal shut down cleanly");
    Ok(())
}
