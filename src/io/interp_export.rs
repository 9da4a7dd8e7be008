use crate::core::interpretation::{InterpretedPoint, HEADINGS};
use crate::types::{SectionError, SectionResult};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Write points as delimited text with the fixed interpretation header.
/// The header is written even when there are no points.
pub fn write_points<'a, W, I>(writer: W, points: I) -> SectionResult<usize>
where
    W: Write,
    I: IntoIterator<Item = &'a InterpretedPoint>,
{
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    wtr.write_record(HEADINGS)?;

    let mut count = 0;
    for point in points {
        wtr.serialize(point)?;
        count += 1;
    }
    wtr.flush()?;
    Ok(count)
}

/// Read points written by [`write_points`]. Columns are matched by name.
pub fn read_points<R: Read>(reader: R) -> SectionResult<Vec<InterpretedPoint>> {
    let mut rdr = csv::Reader::from_reader(reader);

    let headers = rdr.headers()?.clone();
    if let Some(missing) = HEADINGS.iter().find(|h| !headers.iter().any(|c| c == **h)) {
        return Err(SectionError::InvalidInput(format!(
            "interpretation table has no '{}' column",
            missing
        )));
    }

    rdr.deserialize::<InterpretedPoint>()
        .map(|row| row.map_err(SectionError::from))
        .collect()
}

/// Export points to a CSV file, replacing it
pub fn export_csv<'a, P, I>(path: P, points: I) -> SectionResult<usize>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = &'a InterpretedPoint>,
{
    let file = File::create(path.as_ref())?;
    let count = write_points(file, points)?;
    log::info!(
        "💾 Exported {} interpreted points to {}",
        count,
        path.as_ref().display()
    );
    Ok(count)
}

/// Read points from a CSV file written by [`export_csv`]
pub fn import_csv<P: AsRef<Path>>(path: P) -> SectionResult<Vec<InterpretedPoint>> {
    let file = File::open(path.as_ref())?;
    let points = read_points(file)?;
    log::info!(
        "Imported {} interpreted points from {}",
        points.len(),
        path.as_ref().display()
    );
    Ok(points)
}
