//! Cross-archive media reuse: copy a previous run's file in place instead of
//! re-fetching it. `std::fs::copy` already uses `copy_file_range` on Linux
//! when src and dst are on the same filesystem, falling back to a buffered
//! copy otherwise; we additionally carry over the source mtime, which the
//! stdlib copy does not preserve.

use std::path::Path;

use anyhow::{Context, Result};

pub fn copy_preserving_stat(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    std::fs::copy(src, dst)
        .with_context(|| format!("failed to copy {} to {}", src.display(), dst.display()))?;

    let meta = std::fs::metadata(src).with_context(|| format!("stat failed: {}", src.display()))?;
    if let Ok(mtime) = meta.modified() {
        let ft = filetime::FileTime::from_system_time(mtime);
        filetime::set_file_mtime(dst, ft)
            .with_context(|| format!("failed to set mtime on {}", dst.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_reproduces_bytes_and_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.jpg");
        let dst = dir.path().join("nested").join("dst.jpg");
        std::fs::write(&src, b"jpeg bytes").unwrap();

        copy_preserving_stat(&src, &dst).unwrap();

        assert_eq!(std::fs::read(&dst).unwrap(), b"jpeg bytes");
        let src_mtime = std::fs::metadata(&src).unwrap().modified().unwrap();
        let dst_mtime = std::fs::metadata(&dst).unwrap().modified().unwrap();
        assert_eq!(src_mtime, dst_mtime);
    }
}
