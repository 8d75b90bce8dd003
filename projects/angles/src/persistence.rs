use crate::error::{ArchiveError, MigrationFailures, StorageError};
use crate::layout::StorageLayout;
use crate::media::MediaOpener;
use crate::model::Video;
use std::fs;
use std::future::Future;
use std::path::Path;
use walkdir::WalkDir;

/// Write the whole collection to the layout's archive file.
///
/// The JSON is written to a sibling temporary file and renamed over the
/// archive, so a failed save leaves the previous archive in place.
pub fn save(layout: &StorageLayout, videos: &[Video]) -> Result<(), ArchiveError> {
    let content = serde_json::to_string_pretty(videos)?;
    write_archive(&layout.archive_path(), &content)?;
    tracing::debug!(
        "Saved {} videos to {}",
        videos.len(),
        layout.archive_path().display()
    );
    Ok(())
}

/// Snapshot the collection now and start writing it on a blocking worker. The
/// returned future resolves when the write finishes.
///
/// Saves started this way are not ordered with respect to each other: the last
/// one to finish wins.
pub fn save_in_background(
    layout: &StorageLayout,
    videos: &[Video],
) -> Result<impl Future<Output = Result<(), ArchiveError>>, ArchiveError> {
    let content = serde_json::to_string_pretty(videos)?;
    let path = layout.archive_path();
    let count = videos.len();
    let handle = tokio::task::spawn_blocking(move || {
        write_archive(&path, &content)?;
        tracing::debug!("Saved {} videos to {}", count, path.display());
        Ok(())
    });
    Ok(async move {
        match handle.await {
            Ok(result) => result,
            Err(e) => Err(ArchiveError::Interrupted(e)),
        }
    })
}

fn write_archive(path: &Path, content: &str) -> Result<(), ArchiveError> {
    let write_err = |source| ArchiveError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, content).map_err(write_err)?;
    fs::rename(&tmp_path, path).map_err(write_err)
}

/// Read the collection from the layout's archive file.
///
/// A missing or unreadable archive reads as an empty collection, the state of
/// a first run. Loaded videos are attached to `layout` but not migrated.
pub fn load(layout: &StorageLayout) -> Vec<Video> {
    let path = layout.archive_path();
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) => {
            tracing::debug!("No archive at {}: {}", path.display(), e);
            return Vec::new();
        }
    };
    let mut videos: Vec<Video> = match serde_json::from_str(&content) {
        Ok(videos) => videos,
        Err(e) => {
            tracing::warn!("Could not decode archive {}: {}", path.display(), e);
            return Vec::new();
        }
    };
    for video in &mut videos {
        video.attach(layout);
    }
    tracing::info!("Loaded {} videos from {}", videos.len(), path.display());
    videos
}

/// Migrate every outdated video. Returns how many were migrated.
///
/// A video that fails keeps its old version and the others still migrate;
/// all failures are returned together.
pub fn migrate_outdated(
    videos: &mut [Video],
    opener: &dyn MediaOpener,
    mut on_progress: impl FnMut(usize),
) -> Result<usize, MigrationFailures> {
    let mut migrated = 0;
    let mut failures = Vec::new();
    for (position, video) in videos.iter_mut().enumerate() {
        if video.is_outdated_version() {
            match video.migrate(opener) {
                Ok(()) => migrated += 1,
                Err(e) => {
                    tracing::warn!("{}", e);
                    failures.push((position, e));
                }
            }
        }
        on_progress(position + 1);
    }
    if failures.is_empty() {
        Ok(migrated)
    } else {
        Err(MigrationFailures { failures })
    }
}

/// Delete every managed file and the archive. Removal failures are logged and
/// skipped. Returns the number of entries removed.
pub fn clear_all(layout: &StorageLayout) -> usize {
    let mut removed = 0;
    for dir in layout.managed_dirs() {
        if !dir.exists() {
            continue;
        }
        // Listed up front so removals do not race the directory iterator.
        let entries: Vec<_> = WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .collect();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let e = StorageError::ReadDirectory {
                        path: dir.clone(),
                        source: e.into(),
                    };
                    warn_skipped(&e);
                    continue;
                }
            };
            let path = entry.path();
            tracing::info!("Removing: {}", path.display());
            let result = if entry.file_type().is_dir() {
                fs::remove_dir_all(path)
            } else {
                fs::remove_file(path)
            };
            match result {
                Ok(()) => removed += 1,
                Err(source) => {
                    let e = StorageError::DeleteFile {
                        path: path.to_path_buf(),
                        source,
                    };
                    warn_skipped(&e);
                }
            }
        }
    }
    removed
}

fn warn_skipped(e: &StorageError) {
    match std::error::Error::source(e) {
        Some(cause) => tracing::warn!("{}: {}", e, cause),
        None => tracing::warn!("{}", e),
    }
}
