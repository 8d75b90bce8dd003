use crate::error::StorageError;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

const VIDEO_FILES_DIR: &str = "videoFiles";
const CSV_FILES_DIR: &str = "csv";
const XLSX_FILES_DIR: &str = "xlsx";
const ARCHIVE_FILE: &str = "videos";
const FILE_NAME_DATE_FORMAT: &str = "%Y%m%d%H%M%S";

/// Where managed files live. Built once at start-up from the data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn video_files_dir(&self) -> PathBuf {
        self.root.join(VIDEO_FILES_DIR)
    }

    pub fn csv_dir(&self) -> PathBuf {
        self.root.join(CSV_FILES_DIR)
    }

    pub fn xlsx_dir(&self) -> PathBuf {
        self.root.join(XLSX_FILES_DIR)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.root.join(ARCHIVE_FILE)
    }

    /// Every directory holding managed files, the root last.
    pub fn managed_dirs(&self) -> [PathBuf; 4] {
        [
            self.video_files_dir(),
            self.csv_dir(),
            self.xlsx_dir(),
            self.root.clone(),
        ]
    }

    pub fn video_path(&self, file_name: &str) -> PathBuf {
        self.video_files_dir().join(file_name)
    }

    /// `<root>/csv/<media stem>.csv`
    pub fn csv_path(&self, video_file_name: &str) -> PathBuf {
        self.csv_dir().join(format!("{}.csv", file_stem(video_file_name)))
    }

    /// `<root>/xlsx/<media stem>.xlsx`
    pub fn xlsx_path(&self, video_file_name: &str) -> PathBuf {
        self.xlsx_dir().join(format!("{}.xlsx", file_stem(video_file_name)))
    }

    /// A free path in the video files directory named after `created_at`,
    /// suffixed `_1`, `_2`, ... while the name is taken.
    pub fn unused_video_path(&self, created_at: &DateTime<Utc>, extension: &str) -> PathBuf {
        let dir = self.video_files_dir();
        let base = created_at.format(FILE_NAME_DATE_FORMAT).to_string();
        let mut candidate = dir.join(format!("{base}.{extension}"));
        let mut count = 1;
        while candidate.exists() {
            candidate = dir.join(format!("{base}_{count}.{extension}"));
            count += 1;
        }
        candidate
    }
}

fn file_stem(file_name: &str) -> &str {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name)
}

pub fn ensure_dir(path: &Path) -> Result<(), StorageError> {
    fs::create_dir_all(path).map_err(|source| StorageError::CreateDirectory {
        path: path.to_path_buf(),
        source,
    })
}
