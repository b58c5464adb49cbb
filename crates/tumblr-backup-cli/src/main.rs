mod cli;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Timelike;
use clap::Parser;
use tumblr_backup_core::coordinator::{BackupJob, EXIT_INTERRUPT};
use tumblr_backup_core::{config, logging};

use cli::{Cli, Command};

fn main() {
    if logging::init_logging().is_err() {
        logging::init_logging_stderr();
    }

    let exit_code = match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("tumblr-backup: {e:#}");
            1
        }
    };
    std::process::exit(exit_code);
}

fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Command::SetConsumerKey { key } => {
            cli::run_set_consumer_key(&key)?;
            Ok(0)
        }
        Command::Backup(args) => {
            let creds = config::load_credentials().map_err(|_| {
                anyhow::anyhow!(
                    "API key not set. Go to https://www.tumblr.com/oauth/apps, create an app, \
                     then run `tumblr-backup set-consumer-key API_KEY` with its OAuth consumer key."
                )
            })?;

            let cancel = Arc::new(AtomicBool::new(false));
            {
                let cancel = Arc::clone(&cancel);
                // Only the first Ctrl-C asks for a graceful stop; a second
                // one lets the default handler kill the process if the
                // wind-down hangs.
                if let Err(e) = ctrlc::set_handler(move || cancel.store(true, Ordering::SeqCst)) {
                    tracing::warn!(
                        error = %e,
                        "failed to install signal handler; Ctrl-C will kill the process immediately"
                    );
                }
            }

            match args.auto {
                Some(hour) => loop {
                    let force_incremental = chrono::Local::now().hour() != hour;
                    let code = cli::run_backup(&args, &creds.oauth_consumer_key, force_incremental, &cancel)?;
                    if code == EXIT_INTERRUPT || cancel.load(Ordering::SeqCst) {
                        return Ok(EXIT_INTERRUPT);
                    }
                    let delay = BackupJob::schedule_delay(hour);
                    tracing::info!(seconds = delay.as_secs(), "sleeping until next scheduled run");
                    sleep_interruptible(delay, &cancel);
                    if cancel.load(Ordering::SeqCst) {
                        return Ok(EXIT_INTERRUPT);
                    }
                },
                None => cli::run_backup(&args, &creds.oauth_consumer_key, false, &cancel),
            }
        }
    }
}

/// Sleeps in short slices so a Ctrl-C during the `--auto` wait is noticed
/// promptly instead of only after the full delay elapses.
fn sleep_interruptible(delay: Duration, cancel: &Arc<AtomicBool>) {
    const SLICE: Duration = Duration::from_millis(500);
    let mut remaining = delay;
    while remaining > Duration::ZERO && !cancel.load(Ordering::SeqCst) {
        let step = remaining.min(SLICE);
        std::thread::sleep(step);
        remaining -= step;
    }
}
