//! `tumblr-backup backup` – back up one or more blogs against already-parsed
//! flags.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use tumblr_backup_core::coordinator::{self, BackupJob};
use tumblr_backup_core::coordinator::{EXIT_ERRORS, EXIT_INTERRUPT, EXIT_NOPOSTS, EXIT_SUCCESS};

use super::super::args::BackupArgs;

/// Runs one backup pass over every requested blog and returns the process
/// exit code for the whole run: `EXIT_INTERRUPT` if a SIGINT/SIGTERM cut the
/// run short, `EXIT_ERRORS` if any blog or post failed, `EXIT_NOPOSTS` if
/// nothing was saved anywhere, else `EXIT_SUCCESS`.
pub fn run_backup(
    args: &BackupArgs,
    consumer_key: &str,
    force_incremental: bool,
    cancel: &Arc<AtomicBool>,
) -> Result<i32> {
    if args.no_get && args.prev_archives.is_empty() && !args.reuse_json {
        bail!("--no-get makes no sense without --prev-archives or --reuse-json");
    }
    if args.no_get && args.save_notes {
        tracing::warn!("--save-notes uses HTTP regardless of --no-get");
    }
    if args.count == Some(0) && (args.incremental || args.auto.is_some()) {
        bail!("--count 0 conflicts with --incremental and --auto");
    }

    let incremental = args.incremental || force_incremental;
    let mut any_failed = false;
    let mut total_saved = 0u32;

    for (i, blog) in args.blogs.iter().enumerate() {
        if cancel.load(Ordering::SeqCst) {
            break;
        }

        let job = BackupJob {
            account: blog.clone(),
            output_root: args.output_root(blog),
            previous_archive: args.prev_archives.get(i).cloned(),
            options: args.to_options(),
            consumer_key: consumer_key.to_string(),
            resume: args.resume,
            incremental,
            ignore_diffopt: args.ignore_diffopt,
            threads: args.threads,
            queue_capacity: 1000,
            filter: args.to_filter()?,
            reuse_json: args.reuse_json,
        };

        match coordinator::run(&job, cancel) {
            Ok(summary) => {
                if !args.quiet {
                    println!(
                        "{blog}: saved {} post(s), {} failed",
                        summary.posts_saved, summary.posts_failed
                    );
                }
                total_saved += summary.posts_saved;
                any_failed |= summary.posts_failed > 0;
                if summary.interrupted {
                    break;
                }
            }
            Err(e) => {
                tracing::error!(blog = %blog, error = %e, "backup failed");
                eprintln!("{blog}: {e:#}");
                any_failed = true;
            }
        }
    }

    if cancel.load(Ordering::SeqCst) {
        if !args.quiet {
            eprintln!("interrupted");
        }
        return Ok(EXIT_INTERRUPT);
    }

    if !args.quiet {
        if any_failed {
            eprintln!("one or more blogs or posts failed to back up");
        } else if total_saved == 0 {
            println!("no new posts");
        }
    }

    Ok(if any_failed {
        EXIT_ERRORS
    } else if total_saved == 0 {
        EXIT_NOPOSTS
    } else {
        EXIT_SUCCESS
    })
}
