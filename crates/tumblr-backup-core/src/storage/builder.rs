//! Creates the `.{basename}.{rand}` temp file used during a retrieval.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};

use super::writer::PartFileGuard;

pub struct PartFileBuilder;

impl PartFileBuilder {
    /// Create a new temp file in `dest_dir` for `basename`, mode 0600.
    /// The random suffix avoids collisions between concurrent workers that
    /// happen to target the same final name (e.g. a retried job racing a
    /// still-finishing earlier attempt).
    pub fn create(dest_dir: &Path, basename: &str) -> Result<PartFileGuard> {
        std::fs::create_dir_all(dest_dir)
            .with_context(|| format!("failed to create directory: {}", dest_dir.display()))?;

        let suffix = random_suffix();
        let temp_name = format!(".{basename}.{suffix}");
        let temp_path: PathBuf = dest_dir.join(temp_name);

        let file = open_temp_file(&temp_path)
            .with_context(|| format!("failed to create temp file: {}", temp_path.display()))?;

        Ok(PartFileGuard::new(file, temp_path))
    }
}

#[cfg(unix)]
fn open_temp_file(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    File::options()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_temp_file(path: &Path) -> std::io::Result<File> {
    File::options().write(true).create(true).truncate(true).open(path)
}

fn random_suffix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let pid = std::process::id();
    format!("{nanos:x}{pid:x}")
}
