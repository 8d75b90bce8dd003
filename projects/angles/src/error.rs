use std::io;
use std::path::PathBuf;

/// The media backing a video could not be read, or one image could not be produced.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("could not open media {}: {reason}", path.display())]
    Open { path: PathBuf, reason: String },

    #[error("no video track in {}", path.display())]
    NoVideoTrack { path: PathBuf },

    #[error("could not read sample timestamps from {}: {reason}", path.display())]
    ReadSamples { path: PathBuf, reason: String },

    #[error("could not generate image at {seconds:.3}s from {}: {reason}", path.display())]
    ImageGeneration {
        path: PathBuf,
        seconds: f64,
        reason: String,
    },
}

/// A single file-system operation on managed storage failed.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("could not create directory {}", path.display())]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no file extension for video {}", path.display())]
    MissingExtension { path: PathBuf },

    #[error("could not move {} to {}", from.display(), to.display())]
    MoveFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not delete {}", path.display())]
    DeleteFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not read directory {}", path.display())]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The whole video collection could not be archived.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("could not encode video collection")]
    Serialize(#[from] serde_json::Error),

    #[error("could not write archive {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("archive task did not complete")]
    Interrupted(#[from] tokio::task::JoinError),
}

/// A spreadsheet export failed.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("could not write row {row} column {column} of the {sheet} sheet")]
    WriteCell {
        sheet: String,
        row: usize,
        column: usize,
        #[source]
        source: csv::Error,
    },

    #[error("could not create export file {}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not finish writing {}", path.display())]
    Finish {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Deleting a video left some of its files behind.
///
/// Every removal is attempted; each failure is kept.
#[derive(Debug, thiserror::Error)]
#[error("{} file(s) of video \"{video}\" could not be removed", failures.len())]
pub struct CleanupError {
    pub video: String,
    pub failures: Vec<StorageError>,
}

/// A video could not be brought up to the current schema version.
#[derive(Debug, thiserror::Error)]
#[error("could not migrate video \"{video}\" from version {from_version}")]
pub struct MigrationError {
    pub video: String,
    pub from_version: u32,
    #[source]
    pub source: DecodeError,
}

/// One or more videos of a collection failed to migrate.
#[derive(Debug, thiserror::Error)]
#[error("{} video(s) could not be migrated", failures.len())]
pub struct MigrationFailures {
    /// Position in the collection and the failure for that video.
    pub failures: Vec<(usize, MigrationError)>,
}

/// An annotation edit referred to something that does not exist.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EditError {
    #[error("frame {index} does not exist ({count} saved)")]
    NoSuchFrame { index: usize, count: usize },

    #[error("point {index} does not exist ({count} placed)")]
    NoSuchPoint { index: usize, count: usize },

    #[error("there is no point to undo")]
    NothingToUndo,

    #[error("the current frame is not saved")]
    NoCurrentFrame,
}
