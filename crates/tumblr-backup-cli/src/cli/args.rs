//! Flag surface for the `backup` subcommand, mapped onto
//! [`tumblr_backup_core::coordinator::BackupOptions`] and `PostFilter`.

use std::collections::HashSet;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tumblr_backup_core::coordinator::{BackupOptions, ImageNamesScheme as CoreImageNamesScheme, PostFilter};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ImageNamesArg {
    /// Keep the filename from the URL.
    O,
    /// `<post-id>[offset].ext`.
    I,
    /// `<blog>_<post-id>[offset].ext`.
    Bi,
}

impl From<ImageNamesArg> for CoreImageNamesScheme {
    fn from(a: ImageNamesArg) -> Self {
        match a {
            ImageNamesArg::O => CoreImageNamesScheme::Original,
            ImageNamesArg::I => CoreImageNamesScheme::PostId,
            ImageNamesArg::Bi => CoreImageNamesScheme::BlogAndPostId,
        }
    }
}

#[derive(Debug, Parser)]
pub struct BackupArgs {
    /// Blog name(s) to back up, e.g. `example` or `example.tumblr.com`.
    #[arg(required = true)]
    pub blogs: Vec<String>,

    /// Base directory under which each blog gets its own subdirectory.
    #[arg(short = 'O', long, value_name = "DIR", default_value = ".")]
    pub outdir: PathBuf,

    /// Save each post in its own folder (`posts/<id>/index.html`).
    #[arg(short = 'D', long)]
    pub dirs: bool,

    /// Generate host-prefixed directories for media.
    #[arg(long)]
    pub hostdirs: bool,

    /// Image filename scheme: o(riginal), i(d), b(log)+i(d).
    #[arg(long = "image-names", value_enum, default_value = "o")]
    pub image_names: ImageNamesArg,

    /// Save a blog's likes instead of its posts.
    #[arg(short = 'l', long)]
    pub likes: bool,

    /// Save the posts in blosxom format (flat timestamp-ordered, no media subdirectories).
    #[arg(short = 'b', long)]
    pub blosxom: bool,

    /// Only save posts with this tag.
    #[arg(long)]
    pub tags: Option<String>,

    /// Only save posts of this type (e.g. `photo`, `video`, `text`).
    #[arg(long = "type")]
    pub post_type: Option<String>,

    /// Don't save reblogged posts.
    #[arg(long, conflicts_with = "only_reblog")]
    pub no_reblog: bool,

    /// Save only reblogged posts.
    #[arg(long)]
    pub only_reblog: bool,

    /// Only save posts whose id is listed in this file, one id per line.
    #[arg(long, value_name = "PATH")]
    pub id_file: Option<PathBuf>,

    /// Stop after saving this many posts.
    #[arg(long)]
    pub count: Option<u32>,

    /// Skip the first SKIP posts.
    #[arg(short = 's', long, default_value_t = 0)]
    pub skip: u32,

    /// Restrict to a time period: `y`/`m`/`d` for the current year/month/day,
    /// or explicit `YYYY[MM[DD]][Z]` (optionally `START,END`).
    #[arg(short = 'p', long, value_parser = parse_period)]
    pub period: Option<(i64, i64)>,

    /// Incremental backup: stop at the newest post already saved.
    #[arg(short = 'i', long)]
    pub incremental: bool,

    /// Resume an interrupted backup from its oldest saved post.
    #[arg(long = "continue")]
    pub resume: bool,

    /// Only run if invoked at this local hour; otherwise fall back to
    /// incremental mode (for cron-driven scheduling).
    #[arg(short = 'a', long, value_name = "HOUR")]
    pub auto: Option<u32>,

    /// Re-render HTML from this run's own saved `json/` directory instead of
    /// calling the API.
    #[arg(long)]
    pub reuse_json: bool,

    /// Reuse media already downloaded into these previous archive directories.
    #[arg(long = "prev-archives", value_delimiter = ',')]
    pub prev_archives: Vec<PathBuf>,

    /// Don't retrieve files not found in --prev-archives/--reuse-json.
    #[arg(long)]
    pub no_get: bool,

    /// Accept backup-affecting option changes across runs without aborting.
    #[arg(long)]
    pub ignore_diffopt: bool,

    /// Save image files.
    #[arg(short = 'k', long = "skip-images", action = clap::ArgAction::SetFalse, default_value_t = true)]
    pub save_images: bool,

    /// Save all video files (requires a video downloader; see --save-video-tumblr).
    #[arg(long)]
    pub save_video: bool,

    /// Save only Tumblr-hosted video files.
    #[arg(long)]
    pub save_video_tumblr: bool,

    /// Save audio files.
    #[arg(long)]
    pub save_audio: bool,

    /// Save a list of notes for each post.
    #[arg(long)]
    pub save_notes: bool,

    /// Copy notes between backup runs instead of re-fetching them.
    #[arg(long)]
    pub copy_notes: bool,

    /// Cap the number of notes fetched per post.
    #[arg(long)]
    pub notes_limit: Option<u32>,

    /// Save the original JSON source for each post.
    #[arg(short = 'j', long)]
    pub json: bool,

    /// Tag EXIF metadata (source URL, post URL) onto downloaded images.
    #[arg(long)]
    pub exif: bool,

    /// Fall back to the Internet Archive's Wayback Machine for media that's
    /// gone missing from Tumblr.
    #[arg(long = "internet-archive")]
    pub internet_archive: bool,

    /// Trust the server's Last-Modified header for saved file mtimes.
    #[arg(long = "no-server-timestamps", action = clap::ArgAction::SetFalse, default_value_t = true)]
    pub use_server_timestamps: bool,

    /// Custom User-Agent header for API and media requests.
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Worker thread count for rendering and media downloads.
    #[arg(long, default_value_t = 20)]
    pub threads: usize,

    /// Suppress progress messages.
    #[arg(short = 'q', long)]
    pub quiet: bool,
}

impl BackupArgs {
    pub fn output_root(&self, blog: &str) -> PathBuf {
        self.outdir.join(blog)
    }

    pub fn to_options(&self) -> BackupOptions {
        BackupOptions {
            likes: self.likes,
            blosxom: self.blosxom,
            dirs: self.dirs,
            hostdirs: self.hostdirs,
            image_names: self.image_names.into(),
            save_images: self.save_images,
            save_video: self.save_video,
            save_video_tumblr: self.save_video_tumblr,
            save_audio: self.save_audio,
            save_notes: self.save_notes,
            copy_notes: self.copy_notes,
            notes_limit: self.notes_limit,
            json: self.json,
            count: self.count,
            skip: self.skip,
            period: self.period,
            no_reblog: self.no_reblog,
            only_reblog: self.only_reblog,
            exif: self.exif,
            prev_archives: self
                .prev_archives
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
            use_server_timestamps: self.use_server_timestamps,
            user_agent: self.user_agent.clone(),
            no_get: self.no_get,
            internet_archive: self.internet_archive,
        }
    }

    pub fn to_filter(&self) -> anyhow::Result<PostFilter> {
        let id_allowlist = match &self.id_file {
            Some(path) => Some(read_id_file(path)?),
            None => None,
        };
        Ok(PostFilter {
            type_filter: self.post_type.clone(),
            tag_filter: self.tags.clone(),
            id_allowlist,
            no_reblog: self.no_reblog,
            only_reblog: self.only_reblog,
        })
    }
}

fn read_id_file(path: &std::path::Path) -> anyhow::Result<HashSet<u64>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading id file {}: {e}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|l| l.parse().ok())
        .collect())
}

/// Mirrors `main.py`'s `parse_period_date`/`PeriodCallback`: either a
/// shorthand granularity letter (current year/month/day) or explicit
/// `YYYY[MM[DD]][Z]` values, optionally a `START,END` pair.
fn parse_period(raw: &str) -> Result<(i64, i64), String> {
    use chrono::Local;

    let now = Local::now();
    let expanded = match raw {
        "y" => now.format("%Y").to_string(),
        "m" => now.format("%Y%m").to_string(),
        "d" => now.format("%Y%m%d").to_string(),
        other => other.replace('-', ""),
    };

    let tokens: Vec<&str> = expanded.split(',').collect();
    if tokens.is_empty() || tokens.len() > 2 {
        return Err("period must have either one year/month/day or a start and end".to_string());
    }
    let token_re = regex::Regex::new(r"^\d{4}(\d\d)?(\d\d)?Z?$").unwrap();
    for t in &tokens {
        if !token_re.is_match(t) {
            return Err(format!("period must be YYYY[MM[DD]][Z]: {t}"));
        }
    }

    let (start, mut stop) = period_token_range(tokens[0])?;
    if tokens.len() == 2 {
        stop = period_token_range(tokens[1])?.0;
    }
    Ok((start, stop))
}

/// `(start, stop)` for one `YYYY[MM[DD]][Z]` token, where `stop` is `start`
/// with its smallest given field advanced by one.
fn period_token_range(token: &str) -> Result<(i64, i64), String> {
    use chrono::NaiveDate;

    let (body, utc) = match token.strip_suffix('Z') {
        Some(b) => (b, true),
        None => (token, false),
    };
    let year: i32 = body[0..4].parse().map_err(|_| format!("bad year in period: {token}"))?;
    let (month, day, granularity) = match body.len() {
        4 => (1, 1, 0u8),
        6 => (
            body[4..6].parse().map_err(|_| format!("bad month in period: {token}"))?,
            1,
            1,
        ),
        8 => (
            body[4..6].parse().map_err(|_| format!("bad month in period: {token}"))?,
            body[6..8].parse().map_err(|_| format!("bad day in period: {token}"))?,
            2,
        ),
        _ => return Err(format!("period must be YYYY, YYYYMM, or YYYYMMDD: {token}")),
    };

    let start_date =
        NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| format!("invalid date in period: {token}"))?;
    let stop_date = match granularity {
        0 => NaiveDate::from_ymd_opt(year + 1, month, day),
        1 => {
            if month == 12 {
                NaiveDate::from_ymd_opt(year + 1, 1, day)
            } else {
                NaiveDate::from_ymd_opt(year, month + 1, day)
            }
        }
        _ => start_date.succ_opt(),
    }
    .ok_or_else(|| format!("invalid date in period: {token}"))?;

    Ok((date_to_timestamp(start_date, utc), date_to_timestamp(stop_date, utc)))
}

fn date_to_timestamp(date: chrono::NaiveDate, utc: bool) -> i64 {
    use chrono::TimeZone;

    let midnight = date.and_hms_opt(0, 0, 0).expect("midnight always exists");
    if utc {
        chrono::Utc.from_utc_datetime(&midnight).timestamp()
    } else {
        match chrono::Local.from_local_datetime(&midnight) {
            chrono::LocalResult::Single(dt) => dt.timestamp(),
            chrono::LocalResult::Ambiguous(dt, _) => dt.timestamp(),
            chrono::LocalResult::None => chrono::Utc.from_utc_datetime(&midnight).timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_year() {
        let (start, stop) = parse_period("2020").unwrap();
        // 2020 is a leap year.
        assert_eq!(stop - start, 366 * 86_400);
    }

    #[test]
    fn parses_year_month_day_utc() {
        let (start, stop) = parse_period("20200101Z").unwrap();
        assert_eq!(start, 1_577_836_800);
        assert_eq!(stop - start, 86_400);
    }

    #[test]
    fn parses_start_end_range() {
        let (start, stop) = parse_period("20200101Z,20200201Z").unwrap();
        assert_eq!(start, 1_577_836_800);
        assert_eq!(stop, 1_580_515_200);
    }

    #[test]
    fn rejects_malformed_token() {
        assert!(parse_period("not-a-date").is_err());
    }
}
