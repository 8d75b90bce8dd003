use crate::error::ExportError;
use crate::layout::{ensure_dir, StorageLayout};
use crate::model::Video;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

const TIME_HEADER: &str = "Time (seconds)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetKind {
    Points,
    Angles,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
    Empty,
}

impl Cell {
    fn render(&self) -> String {
        match self {
            Cell::Number(n) => n.to_string(),
            Cell::Text(s) => s.clone(),
            Cell::Empty => String::new(),
        }
    }
}

/// A header row plus one row per frame. Rows are as long as the frame's data,
/// not padded to the header.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: &'static str,
    pub header: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

pub fn sheet(video: &Video, kind: SheetKind) -> Sheet {
    match kind {
        SheetKind::Points => points_sheet(video),
        SheetKind::Angles => angles_sheet(video),
    }
}

/// Columns `Point 1..N` for the largest point count of any frame; each point
/// is written as the literal pair `(x, y)`.
pub fn points_sheet(video: &Video) -> Sheet {
    let header = std::iter::once(TIME_HEADER.to_string())
        .chain((1..=video.max_point_count()).map(|i| format!("Point {i}")))
        .collect();
    let rows = video
        .frames()
        .iter()
        .map(|frame| {
            std::iter::once(Cell::Number(frame.seconds))
                .chain(
                    frame
                        .points
                        .as_slice()
                        .iter()
                        .map(|p| Cell::Text(format!("({:.6}, {:.6})", p.x, p.y))),
                )
                .collect()
        })
        .collect();
    Sheet {
        name: "Points",
        header,
        rows,
    }
}

/// Columns `Angle 1..M (degrees)` for the largest angle count of any frame.
/// Undefined angles are left empty.
pub fn angles_sheet(video: &Video) -> Sheet {
    let header = std::iter::once(TIME_HEADER.to_string())
        .chain((1..=video.max_angle_count()).map(|i| format!("Angle {i} (degrees)")))
        .collect();
    let rows = video
        .frames()
        .iter()
        .map(|frame| {
            std::iter::once(Cell::Number(frame.seconds))
                .chain(frame.angles_in_degrees().into_iter().map(|angle| {
                    if angle.is_nan() {
                        Cell::Empty
                    } else {
                        Cell::Number(angle)
                    }
                }))
                .collect()
        })
        .collect();
    Sheet {
        name: "Angles",
        header,
        rows,
    }
}

/// Write `sheet` as CSV. `destination` only labels errors.
pub fn write_sheet<W: Write>(
    sheet: &Sheet,
    writer: W,
    destination: &Path,
) -> Result<(), ExportError> {
    let mut wtr = csv::WriterBuilder::new().flexible(true).from_writer(writer);

    let cell_err = |row: usize, column: usize| {
        move |source: csv::Error| ExportError::WriteCell {
            sheet: sheet.name.to_string(),
            row,
            column,
            source,
        }
    };

    let header_cells = sheet.header.iter().cloned();
    let body_cells = sheet
        .rows
        .iter()
        .map(|row| row.iter().map(Cell::render).collect::<Vec<_>>());

    for (r, cells) in std::iter::once(header_cells.collect::<Vec<_>>())
        .chain(body_cells)
        .enumerate()
    {
        for (c, value) in cells.iter().enumerate() {
            wtr.write_field(value).map_err(cell_err(r, c))?;
        }
        wtr.write_record(None::<&[u8]>)
            .map_err(cell_err(r, cells.len()))?;
    }

    wtr.flush().map_err(|source| ExportError::Finish {
        path: destination.to_path_buf(),
        source,
    })
}

/// Write the angles sheet to `<root>/csv/<media stem>.csv` and return the path.
pub fn save_csv(video: &Video, layout: &StorageLayout) -> Result<PathBuf, ExportError> {
    ensure_dir(&layout.csv_dir())?;
    let path = layout.csv_path(video.video_file_name());
    let file = File::create(&path).map_err(|source| ExportError::Create {
        path: path.clone(),
        source,
    })?;
    write_sheet(&angles_sheet(video), file, &path)?;
    tracing::info!("Exported {} frames to {}", video.frames().len(), path.display());
    Ok(path)
}
