use crate::editor::SavePolicy;
use crate::export::SheetKind;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Root directory for imported videos, exports and the archive
    #[arg(long, env = "ANGLES_DATA_ROOT")]
    pub data_root: PathBuf,

    /// When a newly annotated frame is saved
    #[arg(long, env = "ANGLES_SAVE_POLICY", value_enum, default_value_t = SavePolicyArg::Implicit)]
    pub save_policy: SavePolicyArg,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SavePolicyArg {
    /// Placing the first point on a frame saves it
    Implicit,
    /// Frames are saved with `frame save`
    Explicit,
}

impl From<SavePolicyArg> for SavePolicy {
    fn from(arg: SavePolicyArg) -> Self {
        match arg {
            SavePolicyArg::Implicit => SavePolicy::Implicit,
            SavePolicyArg::Explicit => SavePolicy::Explicit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SheetArg {
    Angles,
    Points,
}

impl From<SheetArg> for SheetKind {
    fn from(arg: SheetArg) -> Self {
        match arg {
            SheetArg::Angles => SheetKind::Angles,
            SheetArg::Points => SheetKind::Points,
        }
    }
}

/// Videos are addressed by their 1-based position in `list`.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Move a video file into managed storage
    Import { file: PathBuf },
    /// List imported videos
    List,
    /// Show the frames, points and angles of a video
    Show {
        video: usize,
        /// Also give point positions in a view of this size (`WxH`)
        #[arg(long, value_parser = parse_view)]
        view: Option<(f64, f64)>,
    },
    /// Print the sample timestamps of a video
    Timestamps {
        video: usize,
        /// Only print the sample nearest to this time
        #[arg(long)]
        near: Option<f64>,
    },
    /// Edit points on a frame
    #[command(subcommand)]
    Point(PointCommand),
    /// Save or delete frames
    #[command(subcommand)]
    Frame(FrameCommand),
    /// Rename a video
    Rename { video: usize, name: String },
    /// Write a sheet as CSV
    Export {
        video: usize,
        #[arg(long, value_enum, default_value_t = SheetArg::Angles)]
        sheet: SheetArg,
        /// Print to standard output instead of the managed csv directory
        #[arg(long)]
        stdout: bool,
    },
    /// Write a frame image, or the video thumbnail, as PNG
    Image {
        video: usize,
        /// 1-based saved frame; the video thumbnail when omitted
        #[arg(long)]
        frame: Option<usize>,
        #[arg(long)]
        out: PathBuf,
        /// Thumbnail side in pixels; full resolution when omitted
        #[arg(long)]
        size: Option<u32>,
    },
    /// Delete a video and its files
    Delete { video: usize },
    /// Migrate outdated videos and report the result
    Migrate,
    /// Delete every managed file and the archive
    Clear {
        #[arg(long)]
        yes: bool,
    },
}

#[derive(ClapArgs, Debug)]
pub struct FrameTarget {
    /// 1-based saved frame
    #[arg(long, conflicts_with = "at")]
    pub frame: Option<usize>,
    /// Scrub position in seconds; snaps to the nearest sample
    #[arg(long)]
    pub at: Option<f64>,
}

#[derive(Subcommand, Debug)]
pub enum PointCommand {
    /// Append a point
    Add {
        video: usize,
        #[command(flatten)]
        target: FrameTarget,
        x: f64,
        y: f64,
        /// Interpret X Y in a view of this size (`WxH`), aspect-fit around the image
        #[arg(long, value_parser = parse_view)]
        view: Option<(f64, f64)>,
    },
    /// Move a placed point
    Move {
        video: usize,
        #[arg(long)]
        frame: usize,
        /// 1-based point
        point: usize,
        x: f64,
        y: f64,
    },
    /// Remove a placed point, joining its neighbours
    Remove {
        video: usize,
        #[arg(long)]
        frame: usize,
        /// 1-based point
        point: usize,
    },
    /// Remove the last point
    Undo {
        video: usize,
        #[arg(long)]
        frame: usize,
    },
}

#[derive(Subcommand, Debug)]
pub enum FrameCommand {
    /// Save the frame nearest to a time without placing points
    Save {
        video: usize,
        #[arg(long)]
        at: f64,
    },
    /// Delete a saved frame
    Delete {
        video: usize,
        #[arg(long)]
        frame: usize,
    },
}

fn parse_view(value: &str) -> Result<(f64, f64), String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {value:?}"))?;
    let parse = |s: &str| {
        s.trim()
            .parse::<f64>()
            .ok()
            .filter(|v| *v > 0.0)
            .ok_or_else(|| format!("invalid view dimension {s:?}"))
    };
    Ok((parse(w)?, parse(h)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_view() {
        assert_eq!(parse_view("400x300"), Ok((400.0, 300.0)));
        assert_eq!(parse_view("1024X768"), Ok((1024.0, 768.0)));
        assert!(parse_view("400").is_err());
        assert!(parse_view("0x300").is_err());
    }

    #[test]
    fn test_point_add_arguments() {
        let args = Args::try_parse_from([
            "angles",
            "--data-root",
            "/data",
            "point",
            "add",
            "1",
            "--at",
            "2.5",
            "10",
            "20",
            "--view",
            "400x400",
        ])
        .unwrap();
        assert_eq!(args.save_policy, SavePolicyArg::Implicit);
        match args.command {
            Command::Point(PointCommand::Add {
                video,
                target,
                x,
                y,
                view,
            }) => {
                assert_eq!(video, 1);
                assert_eq!(target.at, Some(2.5));
                assert_eq!(target.frame, None);
                assert_eq!((x, y), (10.0, 20.0));
                assert_eq!(view, Some((400.0, 400.0)));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_frame_and_at_conflict() {
        let result = Args::try_parse_from([
            "angles",
            "--data-root",
            "/data",
            "point",
            "add",
            "1",
            "--frame",
            "1",
            "--at",
            "2.5",
            "10",
            "20",
        ]);
        assert!(result.is_err());
    }
}
