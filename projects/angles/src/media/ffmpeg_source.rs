use super::{fit_size, MediaOpener, MediaSource, Size};
use crate::error::DecodeError;
use ffmpeg_next::ffi;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame;
use image::RgbImage;
use std::path::{Path, PathBuf};

/// Opens local video files with FFmpeg.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegOpener;

impl MediaOpener for FfmpegOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn MediaSource>, DecodeError> {
        Ok(Box::new(FfmpegSource::new(path)?))
    }
}

/// Video source backed by FFmpeg via ffmpeg-next.
pub struct FfmpegSource {
    path: PathBuf,
    input_ctx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::codec::decoder::Video,
    video_stream_index: usize,
    /// Seconds per pts tick of the video stream
    time_base: f64,
    dimensions: Size,
}

// SAFETY: a FfmpegSource is owned by one Video and only used by whichever
// thread currently holds that Video. The raw pointers inside ffmpeg-next types
// are never shared.
unsafe impl Send for FfmpegSource {}

impl FfmpegSource {
    pub fn new(path: &Path) -> Result<Self, DecodeError> {
        let open_err = |reason: String| DecodeError::Open {
            path: path.to_path_buf(),
            reason,
        };

        ffmpeg_next::init().map_err(|e| open_err(format!("failed to initialize FFmpeg: {e}")))?;

        if !path.exists() {
            return Err(open_err("file not found".to_string()));
        }

        let input_ctx = ffmpeg_next::format::input(path).map_err(|e| open_err(e.to_string()))?;

        let video_stream = input_ctx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| DecodeError::NoVideoTrack {
                path: path.to_path_buf(),
            })?;
        let video_stream_index = video_stream.index();
        let time_base = f64::from(video_stream.time_base());

        let decoder_ctx =
            ffmpeg_next::codec::context::Context::from_parameters(video_stream.parameters())
                .map_err(|e| open_err(format!("failed to create decoder context: {e}")))?;
        let decoder = decoder_ctx
            .decoder()
            .video()
            .map_err(|e| open_err(format!("failed to open video decoder: {e}")))?;

        let dimensions = Size::new(decoder.width(), decoder.height());

        tracing::info!(
            "FfmpegSource: opened {}, {}x{}, time_base={}",
            path.display(),
            dimensions.width,
            dimensions.height,
            time_base
        );

        Ok(Self {
            path: path.to_path_buf(),
            input_ctx,
            decoder,
            video_stream_index,
            time_base,
            dimensions,
        })
    }

    fn frame_seconds(&self, frame: &frame::Video) -> Option<f64> {
        frame
            .timestamp()
            .or_else(|| frame.pts())
            .map(|pts| pts as f64 * self.time_base)
    }

    /// Decode the frame on screen at `seconds`: the last frame whose
    /// presentation time is not after `seconds`, or the first frame when
    /// `seconds` precedes the whole track.
    fn decode_frame_at(&mut self, seconds: f64) -> Result<frame::Video, String> {
        let target = (seconds.max(0.0) * ffi::AV_TIME_BASE as f64) as i64;
        self.input_ctx
            .seek(target, ..target)
            .map_err(|e| format!("failed to seek: {e}"))?;
        self.decoder.flush();

        // Half a microsecond of slack for timestamps that went through f64
        let limit = seconds + 5e-7;
        let mut best: Option<frame::Video> = None;
        let mut decoded = frame::Video::empty();
        let mut packet = ffmpeg_next::codec::packet::Packet::empty();
        let mut eof_sent = false;

        loop {
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    let at = self.frame_seconds(&decoded).unwrap_or(f64::NEG_INFINITY);
                    if at > limit && best.is_some() {
                        break;
                    }
                    let is_past = at > limit;
                    best = Some(std::mem::replace(&mut decoded, frame::Video::empty()));
                    if is_past {
                        break;
                    }
                    continue;
                }
                Err(ffmpeg_next::Error::Other { errno: ffi::EAGAIN }) => {
                    if eof_sent {
                        break;
                    }
                }
                Err(ffmpeg_next::Error::Eof) => break,
                Err(e) => return Err(format!("decoder error: {e}")),
            }

            let mut found_packet = false;
            while packet.read(&mut self.input_ctx).is_ok() {
                if packet.stream() == self.video_stream_index {
                    self.decoder
                        .send_packet(&packet)
                        .map_err(|e| format!("failed to send packet to decoder: {e}"))?;
                    found_packet = true;
                    break;
                }
            }
            if !found_packet {
                self.decoder
                    .send_eof()
                    .map_err(|e| format!("failed to send EOF to decoder: {e}"))?;
                eof_sent = true;
            }
        }

        best.ok_or_else(|| "no frame decoded".to_string())
    }
}

impl MediaSource for FfmpegSource {
    fn dimensions(&self) -> Size {
        self.dimensions
    }

    fn sample_timestamps(&mut self) -> Result<Vec<f64>, DecodeError> {
        let read_err = |reason: String| DecodeError::ReadSamples {
            path: self.path.clone(),
            reason,
        };

        // A separate context so the scan does not disturb the decoding position.
        let mut input_ctx =
            ffmpeg_next::format::input(&self.path).map_err(|e| read_err(e.to_string()))?;
        let mut packet = ffmpeg_next::codec::packet::Packet::empty();
        let mut timestamps = Vec::new();

        loop {
            match packet.read(&mut input_ctx) {
                Ok(()) => {}
                Err(ffmpeg_next::Error::Eof) => break,
                Err(e) => return Err(read_err(e.to_string())),
            }
            if packet.stream() != self.video_stream_index {
                continue;
            }
            if packet.size() == 0 || packet.is_corrupt() {
                continue;
            }
            if let Some(pts) = packet.pts() {
                timestamps.push(pts as f64 * self.time_base);
            }
        }

        timestamps.sort_by(|a, b| a.total_cmp(b));
        tracing::debug!(
            "FfmpegSource: {} samples in {}",
            timestamps.len(),
            self.path.display()
        );
        Ok(timestamps)
    }

    fn image_at(&mut self, seconds: f64, max_size: Size) -> Result<RgbImage, DecodeError> {
        let gen_err = |path: &Path, reason: String| DecodeError::ImageGeneration {
            path: path.to_path_buf(),
            seconds,
            reason,
        };

        let decoded = self
            .decode_frame_at(seconds)
            .map_err(|reason| gen_err(&self.path, reason))?;

        let source = Size::new(decoded.width(), decoded.height());
        let out = fit_size(source, max_size);
        let mut scaler = scaling::Context::get(
            decoded.format(),
            source.width,
            source.height,
            Pixel::RGB24,
            out.width,
            out.height,
            scaling::Flags::BILINEAR,
        )
        .map_err(|e| gen_err(&self.path, format!("failed to create scaler: {e}")))?;

        let mut rgb = frame::Video::empty();
        scaler
            .run(&decoded, &mut rgb)
            .map_err(|e| gen_err(&self.path, format!("scaler failed: {e}")))?;

        rgb_frame_to_image(&rgb).ok_or_else(|| gen_err(&self.path, "bad frame layout".to_string()))
    }
}

/// Copy an RGB24 frame row by row, dropping the stride padding.
fn rgb_frame_to_image(frame: &frame::Video) -> Option<RgbImage> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let data = frame.data(0);
    let stride = frame.stride(0);
    let row_len = width * 3;

    let mut pixels = Vec::with_capacity(row_len * height);
    for y in 0..height {
        let start = y * stride;
        pixels.extend_from_slice(data.get(start..start + row_len)?);
    }
    RgbImage::from_raw(width as u32, height as u32, pixels)
}
