//! Per-blog option set, and reconciliation against the previous run's
//! `.first_run_options` sentinel.
//!
//! Mirrors `main.py`'s `MUST_MATCH_OPTIONS` (layout-affecting; any mismatch
//! aborts unconditionally) and `BACKUP_CHANGING_OPTIONS` (content-affecting;
//! mismatches abort unless `--ignore-diffopt`, and non-default values are
//! still rejected when resuming an incomplete backup).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::url_model::ImageNamesPolicy;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupOptions {
    // MUST_MATCH_OPTIONS: layout, never allowed to change across runs.
    pub likes: bool,
    pub blosxom: bool,
    pub dirs: bool,
    pub hostdirs: bool,
    pub image_names: ImageNamesScheme,

    // BACKUP_CHANGING_OPTIONS: content selection, may change with --ignore-diffopt.
    pub save_images: bool,
    pub save_video: bool,
    pub save_video_tumblr: bool,
    pub save_audio: bool,
    pub save_notes: bool,
    pub copy_notes: bool,
    pub notes_limit: Option<u32>,
    pub json: bool,
    pub count: Option<u32>,
    pub skip: u32,
    pub period: Option<(i64, i64)>,
    pub no_reblog: bool,
    pub only_reblog: bool,
    pub exif: bool,
    pub prev_archives: Vec<String>,
    pub use_server_timestamps: bool,
    pub user_agent: Option<String>,
    pub no_get: bool,
    pub internet_archive: bool,
}

/// Serializable mirror of `ImageNamesPolicy` (which itself carries no
/// `Serialize`/`Deserialize` impl, being a pure algorithm type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageNamesScheme {
    Original,
    PostId,
    BlogAndPostId,
}

impl From<ImageNamesScheme> for ImageNamesPolicy {
    fn from(s: ImageNamesScheme) -> Self {
        match s {
            ImageNamesScheme::Original => ImageNamesPolicy::Original,
            ImageNamesScheme::PostId => ImageNamesPolicy::PostId,
            ImageNamesScheme::BlogAndPostId => ImageNamesPolicy::BlogAndPostId,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("{account}: given options {given:?} but the existing backup was made with {saved:?}")]
    MustMatchMismatch {
        account: String,
        given: Vec<String>,
        saved: Vec<String>,
    },
    #[error(
        "{account}: given different backup-affecting options than the existing backup was made \
         with; skip this check with --ignore-diffopt"
    )]
    BackupChangingMismatch { account: String },
    #[error("{account}: found incomplete archive, try --continue")]
    IncompleteNeedsContinue { account: String },
    #[error(
        "{account}: cannot continue a complete backup that was not stopped early with --count \
         or --period"
    )]
    CannotContinueComplete { account: String },
}

const MUST_MATCH_FIELDS: [&str; 5] = ["likes", "blosxom", "dirs", "hostdirs", "image_names"];

fn must_match_diff(given: &BackupOptions, saved: &BackupOptions) -> Vec<&'static str> {
    let mut diffs = Vec::new();
    if given.likes != saved.likes {
        diffs.push("likes");
    }
    if given.blosxom != saved.blosxom {
        diffs.push("blosxom");
    }
    if given.dirs != saved.dirs {
        diffs.push("dirs");
    }
    if given.hostdirs != saved.hostdirs {
        diffs.push("hostdirs");
    }
    if given.image_names != saved.image_names {
        diffs.push("image_names");
    }
    debug_assert!(diffs.iter().all(|d| MUST_MATCH_FIELDS.contains(d)));
    diffs
}

/// Crude structural inequality check standing in for Python's per-field
/// `differs` comparison across the wider `BACKUP_CHANGING_OPTIONS` set: any
/// field outside layout that differs counts.
fn backup_changing_differs(given: &BackupOptions, saved: &BackupOptions) -> bool {
    let mut g = given.clone();
    let mut s = saved.clone();
    // Normalize layout fields, which were already checked separately.
    g.likes = s.likes;
    g.blosxom = s.blosxom;
    g.dirs = s.dirs;
    g.hostdirs = s.hostdirs;
    g.image_names = s.image_names;
    g != s
}

pub enum Reconciled {
    /// Use `given` as-is; this is either the first run or options matched.
    UseGiven,
    /// Load `BACKUP_CHANGING_OPTIONS` from the saved first-run options,
    /// discarding whatever the caller passed for this run.
    UseSaved(BackupOptions),
}

/// Reconcile `given` (this run's requested options) against `saved` (loaded
/// from a prior `.first_run_options`, if any).
pub fn reconcile(
    account: &str,
    given: &BackupOptions,
    saved: Option<&BackupOptions>,
    complete_backup: bool,
    resume: bool,
    ignore_diffopt: bool,
) -> Result<Reconciled, ReconcileError> {
    let Some(saved) = saved else {
        return Ok(Reconciled::UseGiven);
    };

    let mustmatch = must_match_diff(given, saved);
    if !mustmatch.is_empty() {
        return Err(ReconcileError::MustMatchMismatch {
            account: account.to_string(),
            given: mustmatch.iter().map(|s| s.to_string()).collect(),
            saved: mustmatch.iter().map(|s| s.to_string()).collect(),
        });
    }

    let changed = backup_changing_differs(given, saved);

    if complete_backup {
        if resume && given.count.is_none() {
            return Err(ReconcileError::CannotContinueComplete {
                account: account.to_string(),
            });
        }
        return Ok(Reconciled::UseGiven);
    }

    if resume {
        if changed && !ignore_diffopt {
            return Err(ReconcileError::BackupChangingMismatch {
                account: account.to_string(),
            });
        }
        return Ok(Reconciled::UseGiven);
    }

    if !changed {
        return Err(ReconcileError::IncompleteNeedsContinue {
            account: account.to_string(),
        });
    }
    if !ignore_diffopt {
        return Err(ReconcileError::BackupChangingMismatch {
            account: account.to_string(),
        });
    }
    Ok(Reconciled::UseSaved(saved.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> BackupOptions {
        BackupOptions {
            likes: false,
            blosxom: false,
            dirs: false,
            hostdirs: false,
            image_names: ImageNamesScheme::Original,
            save_images: true,
            save_video: true,
            save_video_tumblr: true,
            save_audio: true,
            save_notes: false,
            copy_notes: false,
            notes_limit: None,
            json: false,
            count: None,
            skip: 0,
            period: None,
            no_reblog: false,
            only_reblog: false,
            exif: false,
            prev_archives: Vec::new(),
            use_server_timestamps: false,
            user_agent: None,
            no_get: false,
            internet_archive: false,
        }
    }

    #[test]
    fn no_saved_options_means_first_run() {
        let given = base();
        assert!(matches!(
            reconcile("acct", &given, None, false, false, false).unwrap(),
            Reconciled::UseGiven
        ));
    }

    #[test]
    fn must_match_mismatch_aborts_even_with_ignore_diffopt() {
        let given = base();
        let mut saved = base();
        saved.dirs = true;
        let err = reconcile("acct", &given, Some(&saved), false, false, true).unwrap_err();
        assert!(matches!(err, ReconcileError::MustMatchMismatch { .. }));
    }

    #[test]
    fn incomplete_backup_without_continue_or_diff_needs_continue_flag() {
        let given = base();
        let saved = base();
        let err = reconcile("acct", &given, Some(&saved), false, false, false).unwrap_err();
        assert!(matches!(err, ReconcileError::IncompleteNeedsContinue { .. }));
    }

    #[test]
    fn incomplete_backup_with_diff_and_no_ignore_flag_aborts() {
        let given = base();
        let mut saved = base();
        saved.json = true;
        let err = reconcile("acct", &given, Some(&saved), false, false, false).unwrap_err();
        assert!(matches!(err, ReconcileError::BackupChangingMismatch { .. }));
    }

    #[test]
    fn incomplete_backup_with_diff_and_ignore_flag_uses_saved_options() {
        let given = base();
        let mut saved = base();
        saved.json = true;
        let result = reconcile("acct", &given, Some(&saved), false, false, true).unwrap();
        assert!(matches!(result, Reconciled::UseSaved(_)));
    }

    #[test]
    fn resuming_incomplete_backup_with_diff_and_no_ignore_aborts() {
        let given = base();
        let mut saved = base();
        saved.json = true;
        let err = reconcile("acct", &given, Some(&saved), false, true, false).unwrap_err();
        assert!(matches!(err, ReconcileError::BackupChangingMismatch { .. }));
    }

    #[test]
    fn complete_backup_resumed_without_count_is_rejected() {
        let given = base();
        let saved = base();
        let err = reconcile("acct", &given, Some(&saved), true, true, false).unwrap_err();
        assert!(matches!(err, ReconcileError::CannotContinueComplete { .. }));
    }

    #[test]
    fn complete_backup_resumed_with_count_is_accepted() {
        let mut given = base();
        given.count = Some(10);
        let saved = base();
        let result = reconcile("acct", &given, Some(&saved), true, true, false).unwrap();
        assert!(matches!(result, Reconciled::UseGiven));
    }
}
