use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use tracing::{info, warn};

use crate::advisory;

/// Files at or below this size are treated as failed downloads.
pub const MIN_DOWNLOAD_BYTES: u64 = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
}

/// Size of a regular file above `min_size`, `None` when the path is missing,
/// not a file, or too small.
pub async fn sized_file(path: &Path, min_size: u64) -> std::io::Result<Option<u64>> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() && metadata.len() > min_size => Ok(Some(metadata.len())),
        Ok(_) => Ok(None),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error),
    }
}

pub fn is_partial_artifact(name: &str) -> bool {
    name.ends_with(".part") || name.ends_with(".ytdl")
}

/// Finds a regular file in `dir` whose name starts with `prefix` and whose
/// size exceeds `min_size`. When several match, the most recently modified
/// wins, then the lexicographically smallest name.
pub async fn find_by_prefix(
    dir: &Path,
    prefix: &str,
    min_size: u64,
    skip_partials: bool,
) -> std::io::Result<Option<FoundFile>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut best: Option<(SystemTime, FoundFile)> = None;

    while let Some(entry) = entries.next_entry().await? {
        let Some(name) = entry.file_name().to_str().map(ToString::to_string) else {
            continue;
        };
        if !name.starts_with(prefix) || (skip_partials && is_partial_artifact(&name)) {
            continue;
        }

        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == ErrorKind::NotFound => continue,
            Err(error) => return Err(error),
        };
        if !metadata.is_file() || metadata.len() <= min_size {
            continue;
        }

        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let candidate = FoundFile {
            path: entry.path(),
            name,
            size: metadata.len(),
        };

        let replace = match &best {
            None => true,
            Some((best_modified, best_file)) => {
                modified > *best_modified
                    || (modified == *best_modified && candidate.name < best_file.name)
            }
        };
        if replace {
            best = Some((modified, candidate));
        }
    }

    Ok(best.map(|(_, file)| file))
}

/// Removes `.part` leftovers of a failed download: the planned file's own
/// partial plus any per-format partials sharing the title.
pub async fn remove_partials(dir: &Path, safe_title: &str, planned: &Path) -> usize {
    let mut removed = 0;

    let mut planned_part = planned.as_os_str().to_owned();
    planned_part.push(".part");
    if advisory::remove_file("partial download cleanup", Path::new(&planned_part)).await {
        info!("Cleaned up partial download: {}", Path::new(&planned_part).display());
        removed += 1;
    }

    let entries = advisory::advisory("partial download scan", tokio::fs::read_dir(dir).await);
    let Some(mut entries) = entries else {
        return removed;
    };

    let title_prefix = format!("{safe_title}.");
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let matches = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(&title_prefix) && name.ends_with(".part"));
        if matches && advisory::remove_file("partial download cleanup", &path).await {
            info!("Cleaned up partial download: {}", path.display());
            removed += 1;
        }
    }

    removed
}

/// Deletes regular files in `dir` older than `max_age`. Failures are logged
/// and skipped.
pub async fn prune_stale_downloads(dir: &Path, max_age: Duration) -> usize {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(error) => {
            if error.kind() != ErrorKind::NotFound {
                warn!("Could not open download directory for pruning: {error}");
            }
            return 0;
        }
    };

    let now = SystemTime::now();
    let mut removed = 0;

    loop {
        let maybe_entry = match entries.next_entry().await {
            Ok(value) => value,
            Err(error) => {
                warn!("Could not iterate download directory for pruning: {error}");
                break;
            }
        };

        let Some(entry) = maybe_entry else {
            break;
        };

        let path = entry.path();
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(error) => {
                warn!("Could not read metadata of {:?}: {error}", path);
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age < max_age {
            continue;
        }

        if advisory::remove_file("stale download pruning", &path).await {
            removed += 1;
        }
    }

    if removed > 0 {
        info!("Pruned {removed} stale download(s) from {}", dir.display());
    }
    removed
}
