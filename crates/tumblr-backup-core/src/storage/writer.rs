//! The part-file guard: owns the temp file, appends sequentially, and
//! commits via atomic rename. Cleans itself up on drop unless committed.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct PartFileGuard {
    file: Option<File>,
    temp_path: PathBuf,
    committed: bool,
}

impl PartFileGuard {
    pub(super) fn new(file: File, temp_path: PathBuf) -> Self {
        Self {
            file: Some(file),
            temp_path,
            committed: false,
        }
    }

    /// Reopen an existing temp file for append, used when resuming a
    /// retrieval across process restarts (the temp file's name is recovered
    /// from the job's resume bookkeeping).
    pub fn open_existing(temp_path: &Path) -> Result<Self> {
        let file = File::options()
            .append(true)
            .open(temp_path)
            .with_context(|| format!("failed to reopen temp file: {}", temp_path.display()))?;
        Ok(Self {
            file: Some(file),
            temp_path: temp_path.to_path_buf(),
            committed: false,
        })
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        let file = self.file.as_mut().expect("part file already finalized");
        file.write_all(data).context("part file write failed")?;
        Ok(())
    }

    /// Discard everything written so far (used when the server ignored our
    /// resume point and restarted the transfer from byte zero, or when a
    /// `Content-Encoding` change mid-resume makes the partial decoder state
    /// unsafe to continue from).
    pub fn truncate(&mut self) -> Result<()> {
        use std::io::{Seek, SeekFrom};
        let file = self.file.as_mut().expect("part file already finalized");
        file.set_len(0).context("part file truncate failed")?;
        file.seek(SeekFrom::Start(0))
            .context("part file seek failed")?;
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        let file = self.file.as_ref().expect("part file already finalized");
        file.sync_all().context("part file fsync failed")?;
        Ok(())
    }

    /// Leak the guard's cleanup-on-drop behaviour so the temp file survives
    /// process exit (used when a retrieval suspends mid-stream on a
    /// transient error and will resume the same temp file later).
    pub fn into_kept(mut self) {
        self.committed = true;
    }

    /// Finalize: chmod 0644, fsync, rename into place, fsync the containing
    /// directory. Consumes the guard; on success the temp file no longer exists.
    pub fn commit(mut self, final_path: &Path) -> Result<()> {
        let file = self.file.take().expect("part file already finalized");
        set_final_permissions(&file)?;
        file.sync_all().context("part file fsync before commit failed")?;
        drop(file);

        std::fs::rename(&self.temp_path, final_path).with_context(|| {
            format!(
                "failed to rename {} to {}",
                self.temp_path.display(),
                final_path.display()
            )
        })?;
        fsync_parent_dir(final_path)?;
        self.committed = true;
        Ok(())
    }

}

/// Set a file's mtime to `when` (used for `use_server_timestamps`: the
/// minimum of the post timestamp and the remote `Last-Modified`). Called on
/// the final path after `PartFileGuard::commit`.
pub fn set_mtime(path: &Path, when: std::time::SystemTime) -> Result<()> {
    let ft = filetime::FileTime::from_system_time(when);
    filetime::set_file_mtime(path, ft).context("failed to set mtime")?;
    Ok(())
}

#[cfg(unix)]
fn set_final_permissions(file: &File) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(0o644);
    file.set_permissions(perms).context("chmod 0644 failed")?;
    Ok(())
}

#[cfg(not(unix))]
fn set_final_permissions(_file: &File) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn fsync_parent_dir(path: &Path) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    let dir = File::open(parent).with_context(|| format!("failed to open dir: {}", parent.display()))?;
    dir.sync_all().context("fsync parent dir failed")?;
    Ok(())
}

#[cfg(not(unix))]
fn fsync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}

impl Drop for PartFileGuard {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}
