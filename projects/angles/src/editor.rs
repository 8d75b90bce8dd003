use crate::error::EditError;
use crate::model::{Frame, Point, Video};

/// When an unsaved frame joins the video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SavePolicy {
    /// Placing the first point saves the frame.
    #[default]
    Implicit,
    /// Only [`Annotator::save_current`] saves the frame.
    Explicit,
}

#[derive(Debug)]
enum Current {
    Unsaved(Frame),
    Saved(usize),
}

/// What an edit changed, so the caller knows whether to persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Only the unsaved frame changed
    None,
    PointsChanged,
    FrameInserted(usize),
    FrameRemoved(usize),
}

impl Change {
    pub fn needs_save(self) -> bool {
        self != Change::None
    }
}

/// Annotation session over one video. The current frame is either a transient
/// frame the user scrubbed to, or a saved frame addressed by its position.
pub struct Annotator<'v> {
    video: &'v mut Video,
    current: Current,
    policy: SavePolicy,
}

impl<'v> Annotator<'v> {
    /// Start on the first saved frame, or an unsaved frame at time zero whose
    /// sample is not resolved yet.
    pub fn new(video: &'v mut Video, policy: SavePolicy) -> Self {
        let current = if video.frames().is_empty() {
            Current::Unsaved(Frame::new(0.0, None))
        } else {
            Current::Saved(0)
        };
        Self {
            video,
            current,
            policy,
        }
    }

    pub fn current(&self) -> &Frame {
        match &self.current {
            Current::Unsaved(frame) => frame,
            Current::Saved(index) => &self.video.frames()[*index],
        }
    }

    fn current_mut(&mut self) -> Result<&mut Frame, EditError> {
        match &mut self.current {
            Current::Unsaved(frame) => Ok(frame),
            Current::Saved(index) => {
                let count = self.video.frames().len();
                self.video
                    .frame_mut(*index)
                    .ok_or(EditError::NoSuchFrame { index: *index, count })
            }
        }
    }

    /// Position of the current frame in the video, if it is saved.
    pub fn current_index(&self) -> Option<usize> {
        match self.current {
            Current::Saved(index) => Some(index),
            Current::Unsaved(_) => None,
        }
    }

    /// Make a freshly scrubbed-to frame current. It is not saved yet.
    pub fn scrub_to(&mut self, frame: Frame) {
        self.current = Current::Unsaved(frame);
    }

    pub fn select(&mut self, index: usize) -> Result<(), EditError> {
        let count = self.video.frames().len();
        if index >= count {
            return Err(EditError::NoSuchFrame { index, count });
        }
        self.current = Current::Saved(index);
        Ok(())
    }

    pub fn add_point(&mut self, point: Point) -> Result<Change, EditError> {
        let points = &mut self.current_mut()?.points;
        points.push(point);
        let first_point = points.len() == 1;
        if self.current_index().is_none() && first_point && self.policy == SavePolicy::Implicit {
            return Ok(self.save_current());
        }
        Ok(self.points_change())
    }

    pub fn move_point(&mut self, index: usize, point: Point) -> Result<Change, EditError> {
        let points = &mut self.current_mut()?.points;
        let count = points.len();
        points
            .set(index, point)
            .ok_or(EditError::NoSuchPoint { index, count })?;
        Ok(self.points_change())
    }

    /// Remove the point at `index`, joining its neighbours. A saved frame left
    /// without points is deleted.
    pub fn remove_point(&mut self, index: usize) -> Result<Change, EditError> {
        let points = &mut self.current_mut()?.points;
        let count = points.len();
        points
            .remove(index)
            .ok_or(EditError::NoSuchPoint { index, count })?;
        self.after_removal()
    }

    /// Remove the last point. A saved frame left without points is deleted.
    pub fn undo_point(&mut self) -> Result<Change, EditError> {
        self.current_mut()?
            .points
            .pop()
            .ok_or(EditError::NothingToUndo)?;
        self.after_removal()
    }

    fn after_removal(&mut self) -> Result<Change, EditError> {
        if self.current().points.is_empty() && self.current_index().is_some() {
            return self.delete_current();
        }
        Ok(self.points_change())
    }

    /// Insert the current frame into the video in time order. A frame that is
    /// already saved stays where it is.
    pub fn save_current(&mut self) -> Change {
        let Current::Unsaved(frame) =
            std::mem::replace(&mut self.current, Current::Saved(0))
        else {
            return Change::None;
        };
        let index = self.video.insert_frame(frame);
        self.current = Current::Saved(index);
        Change::FrameInserted(index)
    }

    /// Delete the current saved frame. The same instant stays current as an
    /// unsaved frame without points.
    pub fn delete_current(&mut self) -> Result<Change, EditError> {
        let index = self.current_index().ok_or(EditError::NoCurrentFrame)?;
        let mut frame = self
            .video
            .remove_frame(index)
            .ok_or(EditError::NoCurrentFrame)?;
        frame.points.clear();
        frame.free_memory();
        self.current = Current::Unsaved(frame);
        Ok(Change::FrameRemoved(index))
    }

    fn points_change(&self) -> Change {
        match self.current {
            Current::Saved(_) => Change::PointsChanged,
            Current::Unsaved(_) => Change::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::StorageLayout;
    use chrono::{TimeZone, Utc};

    fn empty_video() -> Video {
        Video::new(
            "Walk",
            Utc.with_ymd_and_hms(2016, 5, 8, 10, 0, 0).unwrap(),
            "walk.mov".to_string(),
            &StorageLayout::new("/data"),
        )
    }

    #[test]
    fn test_first_point_saves_frame_implicitly() {
        let mut video = empty_video();
        let mut editor = Annotator::new(&mut video, SavePolicy::Implicit);
        assert_eq!(editor.current_index(), None);
        assert_eq!(editor.current().index, None);

        editor.scrub_to(Frame::new(2.0, Some(60)));
        assert_eq!(editor.add_point(Point::new(1.0, 1.0)), Ok(Change::FrameInserted(0)));
        assert_eq!(editor.current_index(), Some(0));
        assert_eq!(editor.add_point(Point::new(2.0, 1.0)), Ok(Change::PointsChanged));

        editor.scrub_to(Frame::new(1.0, Some(30)));
        assert_eq!(editor.add_point(Point::new(5.0, 5.0)), Ok(Change::FrameInserted(0)));

        let times: Vec<f64> = video.frames().iter().map(|f| f.seconds).collect();
        assert_eq!(times, vec![1.0, 2.0]);
        assert_eq!(video.frame(1).unwrap().points.len(), 2);
    }

    #[test]
    fn test_explicit_policy_waits_for_save() {
        let mut video = empty_video();
        let mut editor = Annotator::new(&mut video, SavePolicy::Explicit);
        editor.scrub_to(Frame::new(0.5, Some(15)));
        assert_eq!(editor.add_point(Point::new(1.0, 1.0)), Ok(Change::None));
        assert_eq!(editor.add_point(Point::new(2.0, 2.0)), Ok(Change::None));

        assert_eq!(editor.save_current(), Change::FrameInserted(0));
        assert_eq!(editor.save_current(), Change::None);
        assert_eq!(video.frames().len(), 1);
        assert_eq!(video.frame(0).unwrap().points.len(), 2);
    }

    #[test]
    fn test_undo_last_point_deletes_saved_frame() {
        let mut video = empty_video();
        let mut editor = Annotator::new(&mut video, SavePolicy::Implicit);
        editor.scrub_to(Frame::new(3.0, Some(90)));
        editor.add_point(Point::new(1.0, 1.0)).unwrap();
        editor.add_point(Point::new(2.0, 2.0)).unwrap();

        assert_eq!(editor.undo_point(), Ok(Change::PointsChanged));
        assert_eq!(editor.undo_point(), Ok(Change::FrameRemoved(0)));
        assert_eq!(editor.current_index(), None);
        assert_eq!(editor.current().seconds, 3.0);
        assert_eq!(editor.undo_point(), Err(EditError::NothingToUndo));
        assert!(video.frames().is_empty());
    }

    #[test]
    fn test_move_point_and_select() {
        let mut video = empty_video();
        video.insert_frame(Frame::with_points(
            1.0,
            Some(30),
            vec![Point::new(0.0, 0.0), Point::new(5.0, 0.0), Point::new(10.0, 0.0)].into(),
        ));
        let mut editor = Annotator::new(&mut video, SavePolicy::Implicit);
        assert_eq!(editor.current_index(), Some(0));

        assert_eq!(
            editor.move_point(1, Point::new(5.0, 5.0)),
            Ok(Change::PointsChanged)
        );
        let angle = editor.current().angles_in_degrees()[0];
        assert!((angle - 90.0).abs() < 1e-9);

        assert_eq!(
            editor.move_point(7, Point::new(0.0, 0.0)),
            Err(EditError::NoSuchPoint { index: 7, count: 3 })
        );
        assert_eq!(
            editor.select(1),
            Err(EditError::NoSuchFrame { index: 1, count: 1 })
        );
        assert!(editor.select(0).is_ok());
    }

    #[test]
    fn test_remove_point_joins_neighbours() {
        let mut video = empty_video();
        video.insert_frame(Frame::with_points(
            1.0,
            Some(30),
            vec![
                Point::new(0.0, 0.0),
                Point::new(3.0, 7.0),
                Point::new(10.0, 0.0),
                Point::new(10.0, 10.0),
            ]
            .into(),
        ));
        let mut editor = Annotator::new(&mut video, SavePolicy::Implicit);

        assert_eq!(editor.remove_point(1), Ok(Change::PointsChanged));
        let angles = editor.current().angles_in_degrees();
        assert_eq!(angles.len(), 1);
        assert!((angles[0] - 90.0).abs() < 1e-9);
        assert_eq!(
            editor.remove_point(3),
            Err(EditError::NoSuchPoint { index: 3, count: 3 })
        );

        editor.remove_point(0).unwrap();
        editor.remove_point(0).unwrap();
        assert_eq!(editor.remove_point(0), Ok(Change::FrameRemoved(0)));
        assert!(video.frames().is_empty());
    }

    #[test]
    fn test_delete_current() {
        let mut video = empty_video();
        video.insert_frame(Frame::with_points(1.0, Some(30), vec![Point::new(1.0, 1.0)].into()));
        video.insert_frame(Frame::with_points(2.0, Some(60), vec![Point::new(2.0, 2.0)].into()));
        let mut editor = Annotator::new(&mut video, SavePolicy::Implicit);
        editor.select(1).unwrap();

        assert_eq!(editor.delete_current(), Ok(Change::FrameRemoved(1)));
        assert!(editor.current().points.is_empty());
        assert_eq!(editor.current().index, Some(60));
        assert_eq!(editor.delete_current(), Err(EditError::NoCurrentFrame));
        assert_eq!(video.frames().len(), 1);
    }
}
