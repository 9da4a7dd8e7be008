use crate::core::section_grid::{Axis, ColumnVariable, SectionGrid};
use crate::core::spatial_index::SpatialIndex;
use crate::io::dataset::InversionData;
use crate::types::{Fiducial, LineId, SectionError, SectionResult};
use ndarray::ArrayView1;
use serde::Serialize;

/// Physical location behind a click on a rendered section
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedClick {
    pub line: LineId,
    /// Section column nearest to the clicked distance
    pub column_index: usize,
    /// Distance along the line of that column
    pub distance_along_line: f64,
    /// Nearest dataset sample to the column, if one lies within tolerance
    pub sample_index: Option<usize>,
    pub fiducial: Option<Fiducial>,
    pub easting: f64,
    pub northing: f64,
    /// Ground elevation of the column
    pub elevation: f64,
    /// Clicked elevation
    pub click_elevation: f64,
    /// Depth of the click below ground
    pub depth: f64,
}

/// Index of the grid distance closest to `distance`. Only the distance axis
/// takes part; the first column wins a tie.
pub fn nearest_column(grid_distances: ArrayView1<'_, f64>, distance: f64) -> Option<usize> {
    grid_distances
        .iter()
        .enumerate()
        .filter(|(_, d)| !d.is_nan())
        .fold(None, |best: Option<(usize, f64)>, (i, d)| {
            let offset = (d - distance).abs();
            match best {
                Some((_, best_offset)) if best_offset <= offset => best,
                _ => Some((i, offset)),
            }
        })
        .map(|(i, _)| i)
}

/// Turns (distance, elevation) clicks on a section back into samples
pub struct ClickResolver<'a> {
    grid: &'a SectionGrid,
    dataset: &'a InversionData,
    samples: &'a SpatialIndex,
    fiducial_tolerance: f64,
}

impl<'a> ClickResolver<'a> {
    /// `samples` must index `dataset.coordinates()`
    pub fn new(
        grid: &'a SectionGrid,
        dataset: &'a InversionData,
        samples: &'a SpatialIndex,
        fiducial_tolerance: f64,
    ) -> Self {
        Self {
            grid,
            dataset,
            samples,
            fiducial_tolerance,
        }
    }

    /// Nearest dataset sample to (x, y) within the fiducial tolerance
    pub fn fiducial_at(&self, x: f64, y: f64) -> Option<(usize, Fiducial)> {
        self.samples
            .nearest_one(x, y, self.fiducial_tolerance)
            .map(|hit| (hit.index, self.dataset.fiducials()[hit.index]))
    }

    /// Resolve a click. Clicks beyond either end of the line resolve to the
    /// edge column; there is no distance cut-off.
    pub fn resolve(
        &self,
        line: LineId,
        click_distance: f64,
        click_elevation: f64,
    ) -> SectionResult<ResolvedClick> {
        if !click_distance.is_finite() || !click_elevation.is_finite() {
            return Err(SectionError::InvalidInput(format!(
                "click position must be finite, got ({}, {})",
                click_distance, click_elevation
            )));
        }

        let section = self.grid.line(line)?;
        let distances = section.axis(Axis::Distance);
        let column_index = nearest_column(distances, click_distance)
            .ok_or_else(|| SectionError::InvalidInput(format!("line {} has no columns", line)))?;

        let easting = section.mandatory_column(ColumnVariable::Easting)[column_index];
        let northing = section.mandatory_column(ColumnVariable::Northing)[column_index];
        let elevation = section.mandatory_column(ColumnVariable::Elevation)[column_index];
        let sample = self.fiducial_at(easting, northing);

        log::debug!(
            "Click ({:.1}, {:.1}) on line {} -> column {} (fiducial {:?})",
            click_distance,
            click_elevation,
            line,
            column_index,
            sample.map(|(_, fid)| fid)
        );

        Ok(ResolvedClick {
            line,
            column_index,
            distance_along_line: distances[column_index],
            sample_index: sample.map(|(i, _)| i),
            fiducial: sample.map(|(_, fid)| fid),
            easting,
            northing,
            elevation,
            click_elevation,
            depth: elevation - click_elevation,
        })
    }
}
