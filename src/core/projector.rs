use crate::core::line_locator::LineLocator;
use crate::core::section_grid::{Axis, LineSection};
use crate::core::spatial_index::SpatialIndex;
use crate::io::dataset::InversionData;
use crate::types::{Fiducial, InversionSource, LineId, SectionError, SectionResult};
use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Parameters for snapping samples onto a section's columns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionParams {
    /// Largest accepted distance (metres) between a sample and its column.
    /// `None` uses one horizontal grid cell of the section.
    pub max_distance: Option<f64>,
    /// Cell size used when the section is too short to measure its own spacing
    pub fallback_cell_size: f64,
}

impl Default for ProjectionParams {
    fn default() -> Self {
        Self {
            max_distance: None,
            fallback_cell_size: 40.0,
        }
    }
}

/// Maps (easting, northing) points to distance along a gridded line.
///
/// Each point takes the distance of the nearest section column. This snaps to
/// columns rather than projecting orthogonally onto the line, so the result is
/// only as precise as the horizontal grid resolution.
pub struct AlongLineProjector {
    index: SpatialIndex,
    grid_distances: Array1<f64>,
    max_distance: f64,
}

impl AlongLineProjector {
    pub fn from_section(section: &LineSection, params: &ProjectionParams) -> SectionResult<Self> {
        let max_distance = params.max_distance.unwrap_or_else(|| {
            section
                .horizontal_cell_size()
                .unwrap_or(params.fallback_cell_size)
        });
        let index = SpatialIndex::new(section.column_coordinates().view())?;

        Ok(Self {
            index,
            grid_distances: section.axis(Axis::Distance).to_owned(),
            max_distance,
        })
    }

    pub fn max_distance(&self) -> f64 {
        self.max_distance
    }

    /// Matched column for every row of `coords` (N×2), `None` beyond tolerance
    pub fn project_columns(&self, coords: ArrayView2<'_, f64>) -> SectionResult<Vec<Option<usize>>> {
        Ok(self.index.nearest(coords, self.max_distance)?.indices)
    }

    /// Distance along the line for every row of `coords`; NaN beyond tolerance
    pub fn project(&self, coords: ArrayView2<'_, f64>) -> SectionResult<Array1<f64>> {
        let columns = self.project_columns(coords)?;
        Ok(columns
            .iter()
            .map(|column| column.map_or(f64::NAN, |c| self.grid_distances[c]))
            .collect())
    }
}

/// One-shot projection of `coords` onto a section with an explicit tolerance
pub fn project(
    section: &LineSection,
    coords: ArrayView2<'_, f64>,
    max_distance: f64,
) -> SectionResult<Array1<f64>> {
    let params = ProjectionParams {
        max_distance: Some(max_distance),
        ..ProjectionParams::default()
    };
    AlongLineProjector::from_section(section, &params)?.project(coords)
}

/// Distance along the line of one sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AlongLineRecord {
    /// Position of the sample in its dataset
    pub point_index: usize,
    /// NaN when the sample is too far from every section column
    pub distance_along_line: f64,
    pub fiducial: Fiducial,
}

/// Along-line distances of one dataset's samples on one line
#[derive(Debug, Clone)]
pub struct DistanceAlongLine {
    pub line: LineId,
    pub source: InversionSource,
    records: Vec<AlongLineRecord>,
}

impl DistanceAlongLine {
    /// Select the samples of `line` in `dataset` and snap them onto the section
    /// the projector was built from.
    pub fn build(
        line: LineId,
        dataset: &InversionData,
        projector: &AlongLineProjector,
    ) -> SectionResult<Self> {
        let indices = LineLocator::indices_for_line(line, dataset)?;
        let all = dataset.coordinates();
        let coords = Array2::from_shape_fn((indices.len(), 2), |(i, j)| all[[indices[i], j]]);
        let distances = projector.project(coords.view())?;
        let fiducials = dataset.fiducials();

        let records: Vec<AlongLineRecord> = indices
            .iter()
            .zip(distances.iter())
            .map(|(&point_index, &distance_along_line)| AlongLineRecord {
                point_index,
                distance_along_line,
                fiducial: fiducials[point_index],
            })
            .collect();

        let dropped = records.iter().filter(|r| r.distance_along_line.is_nan()).count();
        if dropped > 0 {
            log::warn!(
                "Line {}: {} of {} {} samples lie beyond {:.1} m of the section",
                line,
                dropped,
                records.len(),
                dataset.source().short_name(),
                projector.max_distance()
            );
        }

        Ok(Self {
            line,
            source: dataset.source(),
            records,
        })
    }

    /// An empty record set, for lines with no section to project onto
    pub fn empty(line: LineId, source: InversionSource) -> Self {
        Self {
            line,
            source,
            records: Vec::new(),
        }
    }

    /// Every sample on the line, including those without a distance
    pub fn records(&self) -> &[AlongLineRecord] {
        &self.records
    }

    /// Samples that were matched to a section column
    pub fn valid_records(&self) -> impl Iterator<Item = &AlongLineRecord> + '_ {
        self.records.iter().filter(|r| !r.distance_along_line.is_nan())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record of one dataset sample
    pub fn get(&self, point_index: usize) -> SectionResult<&AlongLineRecord> {
        self.records
            .iter()
            .find(|r| r.point_index == point_index)
            .ok_or(SectionError::SampleOutOfRange {
                index: point_index,
                count: self.records.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::section_grid::tests::three_column_parts;
    use crate::io::dataset::tests::two_line_dataset;
    use ndarray::array;

    fn section() -> LineSection {
        LineSection::new(three_column_parts()).unwrap()
    }

    #[test]
    fn test_scenario_snaps_to_nearest_column() {
        let distances = project(&section(), array![[11.0, 1.0]].view(), 5.0).unwrap();
        assert_eq!(distances[0], 10.0);
    }

    #[test]
    fn test_scenario_beyond_tolerance_is_nan() {
        let distances = project(&section(), array![[100.0, 100.0]].view(), 5.0).unwrap();
        assert!(distances[0].is_nan());
    }

    #[test]
    fn test_stacked_columns_keep_a_usable_tolerance() {
        let mut parts = three_column_parts();
        parts.grid_distances = array![0.0, 0.0, 0.0];
        let stacked = LineSection::new(parts).unwrap();

        let projector = AlongLineProjector::from_section(&stacked, &ProjectionParams::default()).unwrap();
        assert_eq!(projector.max_distance(), 40.0);
        let distances = projector.project(array![[12.0, 3.0]].view()).unwrap();
        assert_eq!(distances[0], 0.0);
    }

    #[test]
    fn test_default_tolerance_is_one_cell() {
        let projector = AlongLineProjector::from_section(&section(), &ProjectionParams::default()).unwrap();
        assert_eq!(projector.max_distance(), 10.0);

        let distances = projector.project(array![[20.0, 9.0], [20.0, 11.0]].view()).unwrap();
        assert_eq!(distances[0], 20.0);
        assert!(distances[1].is_nan());
    }

    #[test]
    fn test_projection_is_repeatable() {
        let projector = AlongLineProjector::from_section(&section(), &ProjectionParams::default()).unwrap();
        let coords = array![[1.0, 2.0], [14.0, -3.0], [-40.0, 0.0], [19.0, 0.5]];
        let first = projector.project(coords.view()).unwrap();
        let second = projector.project(coords.view()).unwrap();
        for (a, b) in first.iter().zip(second.iter()) {
            assert!(a == b || (a.is_nan() && b.is_nan()));
        }
    }

    #[test]
    fn test_distance_along_line_keeps_unmatched_samples() {
        let data = two_line_dataset(InversionSource::Stochastic);
        let projector = AlongLineProjector::from_section(&section(), &ProjectionParams::default()).unwrap();

        let on_line = DistanceAlongLine::build(200101, &data, &projector).unwrap();
        assert_eq!(on_line.len(), 3);
        let distances: Vec<f64> = on_line.valid_records().map(|r| r.distance_along_line).collect();
        assert_eq!(distances, vec![0.0, 10.0, 20.0]);
        assert_eq!(on_line.get(1).unwrap().fiducial, 102.0);

        // The other line is far from this section: kept, but without distances
        let off_line = DistanceAlongLine::build(200401, &data, &projector).unwrap();
        assert_eq!(off_line.len(), 3);
        assert_eq!(off_line.valid_records().count(), 0);
    }
}
