use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

const VIDEO_EXTENSION: &str = ".mp4";

/// Names of the regular `.mp4` files directly inside `dir`, sorted.
pub fn list_videos(dir: &Path) -> Result<Vec<String>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to list {}", dir.display()))?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(VIDEO_EXTENSION) {
            names.push(name);
        }
    }
    names.sort();

    Ok(names)
}

/// Move a file, falling back to copy + remove when a rename is not possible
/// (e.g. across filesystems).
pub fn move_file(source: &Path, destination: &Path) -> io::Result<()> {
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            if !source.is_file() {
                return Err(rename_err);
            }
            debug!(?source, ?destination, %rename_err, "rename failed, copying instead");
            fs::copy(source, destination)?;
            fs::remove_file(source)
        }
    }
}
