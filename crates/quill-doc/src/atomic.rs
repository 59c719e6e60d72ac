//! Atomic write operations for issue documents.
//!
//! Documents are written with the temp-file-then-rename pattern:
//!
//! 1. Data is first written to a temporary file with a `.tmp` extension
//! 2. The temporary file is flushed and synced
//! 3. The temporary file is atomically renamed to the target path
//!
//! If a crash occurs during step 1 or 2, the original file remains intact.
//! On POSIX systems a rename within one filesystem is atomic, so readers
//! (including file watchers) never observe a half-written document.
//!
//! The temporary name keeps the original extension as a prefix (`x.md.tmp`),
//! so tools that only look at `.md` files ignore it.

use crate::Result;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Atomically replace the contents of `path` with `bytes`.
///
/// # Errors
///
/// Returns an error if:
/// - The temporary file cannot be created or written
/// - The atomic rename fails (e.g., cross-filesystem move)
///
/// On failure the original file (if it exists) is left unchanged and the
/// temporary file is removed on a best-effort basis.
pub async fn write_atomic<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let temp_path = make_temp_path(path);

    if let Err(e) = write_to_temp_file(&temp_path, bytes).await {
        // Best-effort cleanup of temp file
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }

    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e.into());
    }

    tracing::trace!(path = %path.display(), len = bytes.len(), "Wrote document atomically");
    Ok(())
}

/// Creates a temporary file path for atomic write operations.
///
/// If the original path has no extension, `.tmp` is appended directly.
/// If it has an extension, the extension is replaced with `{ext}.tmp`.
fn make_temp_path(path: &Path) -> PathBuf {
    let mut temp_path = path.to_path_buf();
    let new_extension = match path.extension() {
        Some(ext) => {
            let mut new_ext = ext.to_os_string();
            new_ext.push(".tmp");
            new_ext
        }
        None => std::ffi::OsString::from("tmp"),
    };
    temp_path.set_extension(new_extension);
    temp_path
}

/// Writes bytes to a temporary file, ensuring proper flush and sync.
async fn write_to_temp_file(temp_path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(temp_path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}
