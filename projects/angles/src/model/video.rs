use super::frame::Frame;
use crate::error::{CleanupError, DecodeError, MigrationError, StorageError};
use crate::layout::{ensure_dir, StorageLayout};
use crate::media::{thumbnail_bounds, MediaOpener, MediaSource, Size};
use chrono::{DateTime, Local, Utc};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Schema version written by this build. Archives with a lower version are
/// migrated on load.
pub const CURRENT_VERSION: u32 = 1;

const DEFAULT_NAME: &str = "Untitled";

/// An imported video and its annotated frames, kept in ascending time order.
#[derive(Serialize, Deserialize, Debug)]
pub struct Video {
    name: String,
    date_created: DateTime<Utc>,
    /// File name inside the layout's video files directory
    video_file_name: String,
    #[serde(default)]
    version: u32,
    frames: Vec<Frame>,
    #[serde(skip)]
    video_path: PathBuf,
    #[serde(skip)]
    cache: VideoCache,
}

/// Decoder state and derived data. Never a source of truth: everything here can
/// be dropped and rebuilt from the media file.
#[derive(Default)]
struct VideoCache {
    source: Option<Box<dyn MediaSource>>,
    timestamps: Option<Vec<f64>>,
    /// Side the video thumbnail was decoded for, and the image
    thumbnail: Option<(u32, RgbImage)>,
}

impl fmt::Debug for VideoCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoCache")
            .field("source_open", &self.source.is_some())
            .field("timestamps", &self.timestamps.as_ref().map(Vec::len))
            .field("thumbnail", &self.thumbnail.is_some())
            .finish()
    }
}

impl VideoCache {
    fn source(
        &mut self,
        path: &Path,
        opener: &dyn MediaOpener,
    ) -> Result<&mut (dyn MediaSource + 'static), DecodeError> {
        let source = match self.source.take() {
            Some(source) => source,
            None => opener.open(path)?,
        };
        Ok(&mut **self.source.insert(source))
    }

    fn timestamps(&mut self, path: &Path, opener: &dyn MediaOpener) -> Result<&[f64], DecodeError> {
        if self.timestamps.is_none() {
            let timestamps = self.source(path, opener)?.sample_timestamps()?;
            self.timestamps = Some(timestamps);
        }
        Ok(self.timestamps.as_deref().unwrap_or(&[]))
    }
}

impl Video {
    pub fn new(
        name: &str,
        date_created: DateTime<Utc>,
        video_file_name: String,
        layout: &StorageLayout,
    ) -> Self {
        let video_path = layout.video_path(&video_file_name);
        Self {
            name: normalize_name(name),
            date_created,
            video_file_name,
            version: CURRENT_VERSION,
            frames: Vec::new(),
            video_path,
            cache: VideoCache::default(),
        }
    }

    /// Move the media at `source` into managed storage and create a video for it.
    ///
    /// The file is renamed after `date_created`, with a numeric suffix if that
    /// name is already taken.
    pub fn import(
        layout: &StorageLayout,
        source: &Path,
        date_created: DateTime<Utc>,
    ) -> Result<Self, StorageError> {
        ensure_dir(&layout.video_files_dir())?;

        let extension = source
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .ok_or_else(|| StorageError::MissingExtension {
                path: source.to_path_buf(),
            })?;

        let destination = layout.unused_video_path(&date_created, extension);
        move_file(source, &destination)?;
        tracing::info!(
            "Imported {} as {}",
            source.display(),
            destination.display()
        );

        let file_name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new("", date_created, file_name, layout))
    }

    /// Resolve the media path against `layout`. Needed after deserializing.
    pub fn attach(&mut self, layout: &StorageLayout) {
        self.video_path = layout.video_path(&self.video_file_name);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// An empty name becomes "Untitled".
    pub fn set_name(&mut self, name: &str) {
        self.name = normalize_name(name);
    }

    pub fn date_created(&self) -> DateTime<Utc> {
        self.date_created
    }

    pub fn formatted_date_created(&self) -> String {
        self.date_created
            .with_timezone(&Local)
            .format("%B %-d, %Y at %-I:%M %p")
            .to_string()
    }

    pub fn video_file_name(&self) -> &str {
        &self.video_file_name
    }

    pub fn video_path(&self) -> &Path {
        &self.video_path
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn is_outdated_version(&self) -> bool {
        self.version < CURRENT_VERSION
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    /// Mutable access to a frame's points. Its time must not change, or the
    /// time ordering of the list breaks.
    pub fn frame_mut(&mut self, index: usize) -> Option<&mut Frame> {
        self.frames.get_mut(index)
    }

    /// Insert `frame` before the first frame with a strictly greater timestamp
    /// and return its position. Frames with equal timestamps keep insertion
    /// order.
    pub fn insert_frame(&mut self, frame: Frame) -> usize {
        let position = self
            .frames
            .iter()
            .position(|f| f.seconds > frame.seconds)
            .unwrap_or(self.frames.len());
        self.frames.insert(position, frame);
        position
    }

    pub fn remove_frame(&mut self, index: usize) -> Option<Frame> {
        if index < self.frames.len() {
            Some(self.frames.remove(index))
        } else {
            None
        }
    }

    pub fn max_point_count(&self) -> usize {
        self.frames.iter().map(|f| f.points.len()).max().unwrap_or(0)
    }

    pub fn max_angle_count(&self) -> usize {
        self.frames.iter().map(Frame::angle_count).max().unwrap_or(0)
    }

    /// Intrinsic size of the video track.
    pub fn dimensions(&mut self, opener: &dyn MediaOpener) -> Result<Size, DecodeError> {
        Ok(self.cache.source(&self.video_path, opener)?.dimensions())
    }

    /// Sorted timestamps of every sample in the video track. Decoded once, then
    /// cached until [`Video::free_memory`].
    pub fn frame_timestamps(&mut self, opener: &dyn MediaOpener) -> Result<&[f64], DecodeError> {
        self.cache.timestamps(&self.video_path, opener)
    }

    pub fn nearest_frame_index(
        &mut self,
        seconds: f64,
        opener: &dyn MediaOpener,
    ) -> Result<usize, DecodeError> {
        Ok(nearest_frame_index(self.frame_timestamps(opener)?, seconds))
    }

    /// A new, unsaved frame at the sample nearest to `seconds`, carrying that
    /// sample's index and exact timestamp.
    pub fn frame_at(
        &mut self,
        seconds: f64,
        opener: &dyn MediaOpener,
    ) -> Result<Frame, DecodeError> {
        let timestamps = self.frame_timestamps(opener)?;
        let index = nearest_frame_index(timestamps, seconds);
        let actual = timestamps.get(index).copied().unwrap_or(seconds);
        Ok(Frame::new(actual, Some(index)))
    }

    /// Bring the video up to [`CURRENT_VERSION`], one version at a time.
    ///
    /// A failed step leaves the video at the version it had before that step,
    /// with its frames untouched.
    pub fn migrate(&mut self, opener: &dyn MediaOpener) -> Result<(), MigrationError> {
        while self.version < CURRENT_VERSION {
            let from_version = self.version;
            let step = match from_version {
                0 => self.backfill_frame_indices(opener),
                _ => Ok(()),
            };
            step.map_err(|source| MigrationError {
                video: self.name.clone(),
                from_version,
                source,
            })?;
            self.version = from_version + 1;
            tracing::info!(
                "Migrated video \"{}\" from version {} to {} ({} frames)",
                self.name,
                from_version,
                self.version,
                self.frames.len()
            );
        }
        Ok(())
    }

    /// Version 0 frames only stored the scrub time. Snap each one to the nearest
    /// real sample and record that sample's index and timestamp.
    fn backfill_frame_indices(&mut self, opener: &dyn MediaOpener) -> Result<(), DecodeError> {
        let timestamps = self.cache.timestamps(&self.video_path, opener)?;
        for frame in &mut self.frames {
            let index = nearest_frame_index(timestamps, frame.seconds);
            frame.index = Some(index);
            if let Some(&seconds) = timestamps.get(index) {
                frame.seconds = seconds;
            }
        }
        Ok(())
    }

    /// Time to decode for a frame: its sample's timestamp when the index and the
    /// timestamp list are both known, otherwise its stored seconds.
    fn image_time(&self, frame: &Frame) -> f64 {
        match (frame.index, self.cache.timestamps.as_deref()) {
            (Some(index), Some(timestamps)) => {
                timestamps.get(index).copied().unwrap_or(frame.seconds)
            }
            _ => frame.seconds,
        }
    }

    /// Full-resolution image of the frame at `index`, or `None` if there is
    /// no such frame.
    pub fn frame_image(
        &mut self,
        index: usize,
        opener: &dyn MediaOpener,
    ) -> Result<Option<&RgbImage>, DecodeError> {
        let Some(frame) = self.frames.get(index) else {
            return Ok(None);
        };
        let at = self.image_time(frame);
        let source = self.cache.source(&self.video_path, opener)?;
        let frame = &mut self.frames[index];
        frame.image_with(source, at).map(Some)
    }

    /// Thumbnail of the frame at `index` for a square of `side` pixels.
    pub fn frame_thumbnail(
        &mut self,
        index: usize,
        side: u32,
        opener: &dyn MediaOpener,
    ) -> Result<Option<&RgbImage>, DecodeError> {
        let Some(frame) = self.frames.get(index) else {
            return Ok(None);
        };
        let at = self.image_time(frame);
        let source = self.cache.source(&self.video_path, opener)?;
        let bounds = thumbnail_bounds(source.dimensions(), side);
        let frame = &mut self.frames[index];
        frame.thumbnail_with(source, at, bounds).map(Some)
    }

    /// Thumbnail for the whole video: the first saved frame's thumbnail, or the
    /// image at time zero when nothing is saved yet.
    pub fn thumbnail(
        &mut self,
        side: u32,
        opener: &dyn MediaOpener,
    ) -> Result<&RgbImage, DecodeError> {
        if let Some(first) = self.frames.first() {
            let at = self.image_time(first);
            let source = self.cache.source(&self.video_path, opener)?;
            let bounds = thumbnail_bounds(source.dimensions(), side);
            return self.frames[0].thumbnail_with(source, at, bounds);
        }
        let image = match self.cache.thumbnail.take() {
            Some((cached, image)) if cached == side => image,
            _ => {
                let source = self.cache.source(&self.video_path, opener)?;
                let bounds = thumbnail_bounds(source.dimensions(), side);
                source.image_at(0.0, bounds)?
            }
        };
        Ok(&self.cache.thumbnail.insert((side, image)).1)
    }

    /// Drop the decoder, timestamps and every decoded image, including those of
    /// each frame. Saved state is untouched.
    pub fn free_memory(&mut self) {
        self.cache = VideoCache::default();
        for frame in &mut self.frames {
            frame.free_memory();
        }
    }

    /// Remove the media file and any exported spreadsheets.
    ///
    /// Each removal is attempted even if an earlier one failed. A missing media
    /// file is a failure; missing exports are not.
    pub fn delete_files(&self, layout: &StorageLayout) -> Result<(), CleanupError> {
        let mut failures = Vec::new();

        if let Err(source) = fs::remove_file(&self.video_path) {
            failures.push(StorageError::DeleteFile {
                path: self.video_path.clone(),
                source,
            });
        }

        for path in [
            layout.csv_path(&self.video_file_name),
            layout.xlsx_path(&self.video_file_name),
        ] {
            if !path.exists() {
                continue;
            }
            if let Err(source) = fs::remove_file(&path) {
                failures.push(StorageError::DeleteFile { path, source });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CleanupError {
                video: self.name.clone(),
                failures,
            })
        }
    }
}

/// Index of the sample nearest to `seconds` in sorted `timestamps`.
///
/// Bisects for the last sample at or before `seconds`, then takes the
/// following sample instead if it is strictly closer. Queries before the first
/// sample give 0 and after the last give the last index. An empty list gives 0.
pub fn nearest_frame_index(timestamps: &[f64], seconds: f64) -> usize {
    if timestamps.is_empty() {
        return 0;
    }
    let mut low = 0;
    let mut high = timestamps.len() - 1;
    if seconds <= timestamps[low] {
        return low;
    }
    if seconds >= timestamps[high] {
        return high;
    }
    // timestamps[low] < seconds < timestamps[high]
    while high - low > 1 {
        let mid = low + (high - low) / 2;
        if timestamps[mid] <= seconds {
            low = mid;
        } else {
            high = mid;
        }
    }
    if timestamps[high] - seconds < seconds - timestamps[low] {
        high
    } else {
        low
    }
}

fn normalize_name(name: &str) -> String {
    if name.is_empty() {
        DEFAULT_NAME.to_string()
    } else {
        name.to_string()
    }
}

/// Rename, falling back to copy and remove when the paths are on different
/// file systems.
fn move_file(from: &Path, to: &Path) -> Result<(), StorageError> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)
        .and_then(|_| fs::remove_file(from))
        .map_err(|source| StorageError::MoveFile {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        })
}
