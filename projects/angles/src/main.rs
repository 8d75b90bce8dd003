mod cli;
mod coords;
mod editor;
mod error;
mod export;
mod geometry;
mod layout;
mod media;
mod model;
mod persistence;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use cli::{Args, Command, FrameCommand, FrameTarget, PointCommand};
use coords::DisplayMapping;
use editor::{Annotator, Change, SavePolicy};
use error::MigrationError;
use export::SheetKind;
use indicatif::{ProgressBar, ProgressStyle};
use layout::StorageLayout;
use media::{FfmpegOpener, MediaOpener};
use model::{format_timestamp, Frame, Point, Video};
use std::path::Path;
use std::sync::Arc;

const DEFAULT_THUMBNAIL_SIDE: u32 = 256;

/// Outcome of the start-up migration, reported by `migrate`.
#[derive(Default)]
struct MigrationReport {
    migrated: usize,
    /// Position in the collection and the failure for each video left outdated
    failures: Vec<(usize, MigrationError)>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let args = Args::parse_args();
    let layout = StorageLayout::new(&args.data_root);
    let opener = Arc::new(FfmpegOpener);

    let clearing = matches!(args.command, Command::Clear { .. });

    let mut videos = persistence::load(&layout);
    let report = migrate_with_progress(&mut videos, opener.as_ref())?;

    let changed = run(
        args.command,
        &mut videos,
        &layout,
        opener,
        args.save_policy.into(),
        &report,
    )
    .await?;

    if changed || (report.migrated > 0 && !clearing) {
        persistence::save_in_background(&layout, &videos)?.await?;
    }

    Ok(())
}

fn migrate_with_progress(
    videos: &mut [Video],
    opener: &dyn MediaOpener,
) -> Result<MigrationReport> {
    let outdated = videos.iter().filter(|v| v.is_outdated_version()).count();
    if outdated == 0 {
        return Ok(MigrationReport::default());
    }

    tracing::info!("Migrating {} outdated videos", outdated);
    let pb = ProgressBar::new(videos.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} videos",
            )?
            .progress_chars("#>-"),
    );
    let result =
        persistence::migrate_outdated(videos, opener, |done| pb.set_position(done as u64));
    pb.finish_and_clear();

    Ok(match result {
        Ok(migrated) => MigrationReport {
            migrated,
            failures: Vec::new(),
        },
        Err(failed) => {
            tracing::warn!("{}", failed);
            MigrationReport {
                migrated: outdated - failed.failures.len(),
                failures: failed.failures,
            }
        }
    })
}

/// Run one command. Returns true when the collection needs saving.
async fn run(
    command: Command,
    videos: &mut Vec<Video>,
    layout: &StorageLayout,
    opener: Arc<FfmpegOpener>,
    policy: SavePolicy,
    report: &MigrationReport,
) -> Result<bool> {
    match command {
        Command::Import { file } => {
            let video = Video::import(layout, &file, Utc::now())
                .with_context(|| format!("Failed to import {}", file.display()))?;
            println!(
                "{:>3}  {}  {}",
                videos.len() + 1,
                video.name(),
                video.video_file_name()
            );
            videos.push(video);
            Ok(true)
        }

        Command::List => {
            for (i, video) in videos.iter().enumerate() {
                let outdated = if video.is_outdated_version() {
                    "  (outdated)"
                } else {
                    ""
                };
                println!(
                    "{:>3}  {}  {}  {} frames{}",
                    i + 1,
                    video.name(),
                    video.formatted_date_created(),
                    video.frames().len(),
                    outdated
                );
            }
            Ok(false)
        }

        Command::Show { video, view } => {
            let index = migrated_position(videos, video, report)?;
            let video = &mut videos[index];
            let mapping = match view {
                Some((width, height)) => Some(DisplayMapping::aspect_fit(
                    width,
                    height,
                    video.dimensions(opener.as_ref())?,
                )),
                None => None,
            };
            println!("{} ({})", video.name(), video.formatted_date_created());
            if let Some(mapping) = &mapping {
                let rect = mapping.image_rect();
                println!(
                    "Image at ({:.1}, {:.1}) size {:.1}x{:.1} in view",
                    rect.min().x,
                    rect.min().y,
                    rect.width(),
                    rect.height()
                );
            }
            for (i, frame) in video.frames().iter().enumerate() {
                print_frame(Some(i), frame);
                if let Some(mapping) = &mapping {
                    for (n, point) in frame.points.as_slice().iter().enumerate() {
                        let display = mapping.denormalize(*point);
                        println!(
                            "       point {} in view: ({:.1}, {:.1})",
                            n + 1,
                            display.x,
                            display.y
                        );
                    }
                }
            }
            Ok(false)
        }

        Command::Timestamps { video, near } => {
            let index = migrated_position(videos, video, report)?;
            let video = &mut videos[index];
            let opener = opener.as_ref();
            let nearest = near
                .map(|seconds| video.nearest_frame_index(seconds, opener))
                .transpose()?;
            let timestamps = video.frame_timestamps(opener)?;
            for (i, seconds) in timestamps.iter().enumerate() {
                if nearest.map_or(true, |n| n == i) {
                    println!("{:>6}  {:.6}  {}", i, seconds, format_timestamp(*seconds));
                }
            }
            Ok(false)
        }

        Command::Point(command) => edit_points(command, videos, opener.as_ref(), policy, report),
        Command::Frame(command) => edit_frames(command, videos, opener.as_ref(), policy, report),

        Command::Rename { video, name } => {
            let index = migrated_position(videos, video, report)?;
            let video = &mut videos[index];
            video.set_name(&name);
            println!("Renamed to {}", video.name());
            Ok(true)
        }

        Command::Export {
            video,
            sheet,
            stdout,
        } => {
            let index = migrated_position(videos, video, report)?;
            let video = &videos[index];
            let kind = SheetKind::from(sheet);
            if stdout {
                export::write_sheet(
                    &export::sheet(video, kind),
                    std::io::stdout().lock(),
                    Path::new("-"),
                )?;
            } else if kind == SheetKind::Angles {
                let path = export::save_csv(video, layout)?;
                println!("{}", path.display());
            } else {
                bail!("The points sheet can only be written with --stdout");
            }
            Ok(false)
        }

        Command::Image {
            video,
            frame,
            out,
            size,
        } => {
            let index = migrated_position(videos, video, report)?;
            let frame = frame.map(|n| frame_position(&videos[index], n)).transpose()?;
            let mut video = videos.remove(index);
            let (video, result) = tokio::task::spawn_blocking(move || {
                let result = write_image(&mut video, frame, size, opener.as_ref(), &out);
                video.free_memory();
                (video, result)
            })
            .await
            .context("Image task panicked")?;
            videos.insert(index, video);
            result?;
            Ok(false)
        }

        Command::Delete { video } => {
            let index = position(videos, video)?;
            let video = videos.remove(index);
            if let Err(e) = video.delete_files(layout) {
                for failure in &e.failures {
                    tracing::warn!("{}", failure);
                }
                tracing::warn!("{}", e);
            }
            println!("Deleted {}", video.name());
            Ok(true)
        }

        Command::Migrate => {
            println!(
                "{} migrated, {} failed, {} outdated",
                report.migrated,
                report.failures.len(),
                videos.iter().filter(|v| v.is_outdated_version()).count()
            );
            Ok(false)
        }

        Command::Clear { yes } => {
            if !yes {
                bail!("Refusing to delete all data without --yes");
            }
            let removed = persistence::clear_all(layout);
            videos.clear();
            println!("Removed {} entries", removed);
            // The archive is gone on purpose; writing it back would undo that.
            Ok(false)
        }
    }
}

fn edit_points(
    command: PointCommand,
    videos: &mut [Video],
    opener: &dyn MediaOpener,
    policy: SavePolicy,
    report: &MigrationReport,
) -> Result<bool> {
    let (current, change) = match command {
        PointCommand::Add {
            video,
            target,
            x,
            y,
            view,
        } => {
            let index = migrated_position(videos, video, report)?;
            let video = &mut videos[index];
            let point = match view {
                Some((width, height)) => {
                    let image = video.dimensions(opener)?;
                    let mapping = DisplayMapping::aspect_fit(width, height, image);
                    let display = Point::new(x, y);
                    if !mapping.contains(display) {
                        bail!("({x}, {y}) is outside the image in a {width}x{height} view");
                    }
                    mapping.normalize(display)
                }
                None => Point::new(x, y),
            };
            let mut editor = open_target(video, target, opener, policy)?;
            let change = editor.add_point(point)?;
            (current_summary(&editor), change)
        }
        PointCommand::Move {
            video,
            frame,
            point,
            x,
            y,
        } => {
            let index = migrated_position(videos, video, report)?;
            let video = &mut videos[index];
            let frame = frame_position(video, frame)?;
            let mut editor = Annotator::new(video, policy);
            editor.select(frame)?;
            let point = point.checked_sub(1).context("Points are numbered from 1")?;
            let change = editor.move_point(point, Point::new(x, y))?;
            (current_summary(&editor), change)
        }
        PointCommand::Remove {
            video,
            frame,
            point,
        } => {
            let index = migrated_position(videos, video, report)?;
            let video = &mut videos[index];
            let frame = frame_position(video, frame)?;
            let mut editor = Annotator::new(video, policy);
            editor.select(frame)?;
            let point = point.checked_sub(1).context("Points are numbered from 1")?;
            let change = editor.remove_point(point)?;
            (current_summary(&editor), change)
        }
        PointCommand::Undo { video, frame } => {
            let index = migrated_position(videos, video, report)?;
            let video = &mut videos[index];
            let frame = frame_position(video, frame)?;
            let mut editor = Annotator::new(video, policy);
            editor.select(frame)?;
            let change = editor.undo_point()?;
            (current_summary(&editor), change)
        }
    };
    report_change(change);
    print_frame(current.0, &current.1);
    Ok(change.needs_save())
}

fn edit_frames(
    command: FrameCommand,
    videos: &mut [Video],
    opener: &dyn MediaOpener,
    policy: SavePolicy,
    report: &MigrationReport,
) -> Result<bool> {
    let change = match command {
        FrameCommand::Save { video, at } => {
            let index = migrated_position(videos, video, report)?;
            let video = &mut videos[index];
            let target = FrameTarget {
                frame: None,
                at: Some(at),
            };
            let mut editor = open_target(video, target, opener, policy)?;
            editor.save_current()
        }
        FrameCommand::Delete { video, frame } => {
            let index = migrated_position(videos, video, report)?;
            let video = &mut videos[index];
            let frame = frame_position(video, frame)?;
            let mut editor = Annotator::new(video, policy);
            editor.select(frame)?;
            editor.delete_current()?
        }
    };
    report_change(change);
    Ok(change.needs_save())
}

/// An editor positioned on the target frame. Scrubbing to the sample of an
/// already saved frame selects that frame.
fn open_target<'v>(
    video: &'v mut Video,
    target: FrameTarget,
    opener: &dyn MediaOpener,
    policy: SavePolicy,
) -> Result<Annotator<'v>> {
    match (target.frame, target.at) {
        (Some(n), _) => {
            let index = frame_position(video, n)?;
            let mut editor = Annotator::new(video, policy);
            editor.select(index)?;
            Ok(editor)
        }
        (None, Some(seconds)) => {
            let frame = video.frame_at(seconds, opener)?;
            let saved = video
                .frames()
                .iter()
                .position(|f| f.index.is_some() && f.index == frame.index);
            let mut editor = Annotator::new(video, policy);
            match saved {
                Some(index) => editor.select(index)?,
                None => editor.scrub_to(frame),
            }
            Ok(editor)
        }
        (None, None) => bail!("Either --frame or --at is required"),
    }
}

fn write_image(
    video: &mut Video,
    frame: Option<usize>,
    size: Option<u32>,
    opener: &dyn MediaOpener,
    out: &Path,
) -> Result<()> {
    let image = match (frame, size) {
        (Some(index), Some(side)) => video.frame_thumbnail(index, side, opener)?,
        (Some(index), None) => video.frame_image(index, opener)?,
        (None, side) => Some(video.thumbnail(side.unwrap_or(DEFAULT_THUMBNAIL_SIDE), opener)?),
    }
    .context("No such frame")?;
    image
        .save(out)
        .with_context(|| format!("Failed to write {}", out.display()))?;
    tracing::info!(
        "Wrote {}x{} image to {}",
        image.width(),
        image.height(),
        out.display()
    );
    Ok(())
}

fn current_summary(editor: &Annotator<'_>) -> (Option<usize>, Frame) {
    let current = editor.current();
    (
        editor.current_index(),
        Frame::with_points(current.seconds, current.index, current.points.clone()),
    )
}

fn report_change(change: Change) {
    match change {
        Change::None => println!("Frame not saved"),
        Change::PointsChanged => println!("Points updated"),
        Change::FrameInserted(i) => println!("Saved as frame {}", i + 1),
        Change::FrameRemoved(i) => println!("Deleted frame {}", i + 1),
    }
}

fn print_frame(index: Option<usize>, frame: &Frame) {
    let label = index.map_or_else(|| "-".to_string(), |i| (i + 1).to_string());
    let sample = frame
        .index
        .map_or_else(|| "?".to_string(), |i| i.to_string());
    println!(
        "{:>3}. {} ({}s, sample {})",
        label,
        format_timestamp(frame.seconds),
        frame.seconds,
        sample
    );
    for (i, point) in frame.points.as_slice().iter().enumerate() {
        println!("       point {}: ({:.2}, {:.2})", i + 1, point.x, point.y);
    }
    for (i, angle) in frame.angles_in_degrees().into_iter().enumerate() {
        if angle.is_nan() {
            println!("       angle {}: undefined", i + 1);
        } else {
            println!(
                "       angle {}: {}°",
                i + 1,
                geometry::round_for_display(angle)
            );
        }
    }
}

/// 0-based index of the video at 1-based `position`.
fn position(videos: &[Video], position: usize) -> Result<usize> {
    if position == 0 || position > videos.len() {
        bail!("No video {} ({} imported)", position, videos.len());
    }
    Ok(position - 1)
}

/// Like [`position`], but refuses a video still at an old schema version: its
/// frames are not aligned to real samples, so its angles would be wrong.
fn migrated_position(
    videos: &[Video],
    position: usize,
    report: &MigrationReport,
) -> Result<usize> {
    let index = self::position(videos, position)?;
    let video = &videos[index];
    if !video.is_outdated_version() {
        return Ok(index);
    }
    match report.failures.iter().find(|(i, _)| *i == index) {
        Some((_, e)) => bail!("Video {} is outdated: {}: {}", position, e, e.source),
        None => bail!(
            "Video {} is outdated (version {}); run `migrate`",
            position,
            video.version()
        ),
    }
}

/// 0-based index of the saved frame at 1-based `position`.
fn frame_position(video: &Video, position: usize) -> Result<usize> {
    if position == 0 || position > video.frames().len() {
        bail!(
            "No frame {} in {} ({} saved)",
            position,
            video.name(),
            video.frames().len()
        );
    }
    Ok(position - 1)
}
