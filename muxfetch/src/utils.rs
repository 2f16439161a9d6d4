//! File naming and directory helpers

use std::path::{Path, PathBuf};

/// Characters that are not allowed in file names on common platforms
const RESERVED_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Stem used when a title has nothing left after sanitizing
const FALLBACK_STEM: &str = "video";

/// Default working directory for downloads, relative to the current directory
pub fn default_download_dir() -> PathBuf {
    PathBuf::from("videos")
}

/// Create the working directory if it does not exist yet
pub fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Remove every reserved character from a title. Idempotent.
pub fn sanitize_title(title: &str) -> String {
    title.chars().filter(|c| !RESERVED_CHARS.contains(c)).collect()
}

/// File stem for a title: sanitized, never empty
pub fn file_stem(title: &str) -> String {
    let sanitized = sanitize_title(title);
    if sanitized.trim().is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        sanitized
    }
}

/// Remove a file, treating "already gone" as success
pub async fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
