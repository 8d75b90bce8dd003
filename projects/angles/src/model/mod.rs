pub mod frame;
pub mod points;
pub mod video;

pub use frame::Frame;
pub use points::{Point, PointSequence};
pub use video::{nearest_frame_index, Video, CURRENT_VERSION};

/// `H:MM:SS` label for a position in a video, rounded down to the second.
pub fn format_timestamp(total_seconds: f64) -> String {
    let total = total_seconds.max(0.0).floor() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{}:{:02}:{:02}", hours, minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "0:00:00");
        assert_eq!(format_timestamp(59.99), "0:00:59");
        assert_eq!(format_timestamp(61.5), "0:01:01");
        assert_eq!(format_timestamp(3600.0 * 2.0 + 125.0), "2:02:05");
        assert_eq!(format_timestamp(-3.0), "0:00:00");
    }
}
