//! Part-file lifecycle for the HTTP retriever.
//!
//! A retrieval writes to a temp file created `0600` in the destination
//! directory, named `.{basename}.{rand}` (so a crash never leaves a
//! half-written file at the final name), then is atomically renamed into
//! place. The temp file and the destination directory's file descriptor are
//! bound to a guard object: dropping the guard without calling `commit`
//! closes and unlinks the temp file, so every early-return error path is
//! automatically clean.

mod builder;
mod writer;

pub use builder::PartFileBuilder;
pub use writer::{set_mtime, PartFileGuard};

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn create_append_commit() {
        let dir = tempfile::tempdir().unwrap();
        let mut guard = PartFileBuilder::create(dir.path(), "archive.zip").unwrap();
        guard.append(b"hello ").unwrap();
        guard.append(b"world").unwrap();
        guard.sync().unwrap();
        let final_path = dir.path().join("archive.zip");
        guard.commit(&final_path).unwrap();

        assert!(final_path.exists());
        let mut f = std::fs::File::open(&final_path).unwrap();
        let mut buf = String::new();
        f.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "hello world");
    }

    #[test]
    fn dropped_without_commit_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let temp_path;
        {
            let mut guard = PartFileBuilder::create(dir.path(), "archive.zip").unwrap();
            guard.append(b"partial").unwrap();
            temp_path = guard.temp_path().to_path_buf();
            assert!(temp_path.exists());
        }
        assert!(!temp_path.exists());
    }

    #[test]
    fn resume_reopens_existing_temp_file_for_append() {
        let dir = tempfile::tempdir().unwrap();
        let temp_path;
        {
            let mut guard = PartFileBuilder::create(dir.path(), "archive.zip").unwrap();
            guard.append(b"first-half:").unwrap();
            temp_path = guard.temp_path().to_path_buf();
            guard.into_kept();
        }
        assert!(temp_path.exists());

        let mut resumed = PartFileGuard::open_existing(&temp_path).unwrap();
        resumed.append(b"second-half").unwrap();
        let final_path = dir.path().join("archive.zip");
        resumed.commit(&final_path).unwrap();

        let mut f = std::fs::File::open(&final_path).unwrap();
        let mut buf = String::new();
        f.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "first-half:second-half");
    }
}
