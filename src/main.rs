use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use webmail_archiver::catalog::{FolderCatalog, format_folder_listing};
use webmail_archiver::cli::Args;
use webmail_archiver::error::{Error, InputError};
use webmail_archiver::retrieval::{RetrievalLoop, RunReport};
use webmail_archiver::session::{CookieCache, SessionProvider};
use webmail_archiver::webmail::WebmailApi;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Held until exit so buffered file logs are flushed.
    let _log_guard = match init_tracing(args.log_level(), args.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Error::Input(InputError::NoSuchFolder { available, .. }) = &e {
                eprint!("{}", format_folder_listing(available));
            }
            error!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(level: &str, log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let (file, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "webmail-archiver.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .context("installing tracing subscriber")?;
    Ok(guard)
}

async fn run(args: Args) -> Result<(), Error> {
    let archive = args.archive_config()?;

    let provider = SessionProvider::new(
        args.webmail_config(),
        CookieCache::new(args.cookie_cache.clone()),
    );
    let acquired = provider
        .acquire(args.cookie_pair(), args.credential_input())
        .await?;
    if acquired.logged_in {
        info!("Logged in; session cookies cached");
    }
    info!(
        "There are {} mails with {} unseen",
        acquired.counts.messages, acquired.counts.unseen
    );

    if args.list {
        let catalog = FolderCatalog::new(WebmailApi::new(acquired.session.clone()));
        let folders = catalog.list_folders().await?;
        print!("{}", format_folder_listing(&folders));
        return Ok(());
    }

    if acquired.counts.messages == 0 {
        info!("Exiting because of 0 mail");
        return Ok(());
    }

    let report = RetrievalLoop::new(acquired.session, archive)
        .await?
        .run()
        .await?;
    summarise(&report);
    Ok(())
}

fn summarise(report: &RunReport) {
    info!(
        windows = report.windows_fetched,
        saved = report.saved.len(),
        skipped = report.skipped.len(),
        moved = report.moved.len(),
        purged = report.purged.len(),
        "Done"
    );
    if report.destructive_disabled {
        warn!("Trash and delete were switched off part way because a message was already downloaded");
    }
}
