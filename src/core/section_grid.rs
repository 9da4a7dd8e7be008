use crate::types::{InversionSource, LineId, SectionError, SectionResult};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Raster variables gridded onto a section (rows = elevations, columns = distances)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RasterVariable {
    Conductivity,
    ConductivityP10,
    ConductivityP50,
    ConductivityP90,
    InterfaceDepthHistogram,
}

/// Per-column scalars stored alongside the rasters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ColumnVariable {
    /// Ground (DEM) elevation of the column
    Elevation,
    /// Easting of the nearest original sample
    Easting,
    /// Northing of the nearest original sample
    Northing,
    DataResidual,
    DepthOfInvestigation,
    MisfitLowest,
    MisfitAverage,
}

/// The two axes every raster of a line shares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Distance,
    Elevation,
}

impl RasterVariable {
    pub fn name(&self) -> &'static str {
        match self {
            RasterVariable::Conductivity => "conductivity",
            RasterVariable::ConductivityP10 => "conductivity_p10",
            RasterVariable::ConductivityP50 => "conductivity_p50",
            RasterVariable::ConductivityP90 => "conductivity_p90",
            RasterVariable::InterfaceDepthHistogram => "interface_depth_histogram",
        }
    }
}

impl ColumnVariable {
    /// Columns without which a section cannot be projected onto or clicked
    pub const MANDATORY: [ColumnVariable; 3] = [
        ColumnVariable::Elevation,
        ColumnVariable::Easting,
        ColumnVariable::Northing,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ColumnVariable::Elevation => "elevation",
            ColumnVariable::Easting => "easting",
            ColumnVariable::Northing => "northing",
            ColumnVariable::DataResidual => "data_residual",
            ColumnVariable::DepthOfInvestigation => "depth_of_investigation",
            ColumnVariable::MisfitLowest => "misfit_lowest",
            ColumnVariable::MisfitAverage => "misfit_average",
        }
    }
}

/// Any variable a section can hold, addressed by its container name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GridVariable {
    Raster(RasterVariable),
    Column(ColumnVariable),
}

impl GridVariable {
    const KNOWN: [GridVariable; 12] = [
        GridVariable::Raster(RasterVariable::Conductivity),
        GridVariable::Raster(RasterVariable::ConductivityP10),
        GridVariable::Raster(RasterVariable::ConductivityP50),
        GridVariable::Raster(RasterVariable::ConductivityP90),
        GridVariable::Raster(RasterVariable::InterfaceDepthHistogram),
        GridVariable::Column(ColumnVariable::Elevation),
        GridVariable::Column(ColumnVariable::Easting),
        GridVariable::Column(ColumnVariable::Northing),
        GridVariable::Column(ColumnVariable::DataResidual),
        GridVariable::Column(ColumnVariable::DepthOfInvestigation),
        GridVariable::Column(ColumnVariable::MisfitLowest),
        GridVariable::Column(ColumnVariable::MisfitAverage),
    ];

    pub fn name(&self) -> &'static str {
        match self {
            GridVariable::Raster(r) => r.name(),
            GridVariable::Column(c) => c.name(),
        }
    }

    /// Parse a list of container variable names, failing on the first unknown one
    pub fn parse_list<S: AsRef<str>>(names: &[S]) -> SectionResult<Vec<GridVariable>> {
        names.iter().map(|n| n.as_ref().parse()).collect()
    }
}

impl FromStr for GridVariable {
    type Err = SectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GridVariable::KNOWN
            .iter()
            .copied()
            .find(|v| v.name() == s)
            .ok_or_else(|| SectionError::UnknownVariable(s.to_string()))
    }
}

impl std::fmt::Display for GridVariable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Horizontal and vertical cell size a section was gridded at (metres)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridResolution {
    pub horizontal: f64,
    pub vertical: f64,
}

impl Default for GridResolution {
    fn default() -> Self {
        Self {
            horizontal: 40.0,
            vertical: 5.0,
        }
    }
}

/// Unvalidated section contents, as produced by a gridder or read from a cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionParts {
    pub grid_distances: Array1<f64>,
    pub grid_elevations: Array1<f64>,
    pub rasters: BTreeMap<RasterVariable, Array2<f64>>,
    pub columns: BTreeMap<ColumnVariable, Array1<f64>>,
}

impl SectionParts {
    pub fn new(grid_distances: Array1<f64>, grid_elevations: Array1<f64>) -> Self {
        Self {
            grid_distances,
            grid_elevations,
            rasters: BTreeMap::new(),
            columns: BTreeMap::new(),
        }
    }

    pub fn with_raster(mut self, variable: RasterVariable, values: Array2<f64>) -> Self {
        self.rasters.insert(variable, values);
        self
    }

    pub fn with_column(mut self, variable: ColumnVariable, values: Array1<f64>) -> Self {
        self.columns.insert(variable, values);
        self
    }
}

/// Gridded section of one line. Every raster and column shares the same axes.
#[derive(Debug, Clone)]
pub struct LineSection {
    grid_distances: Array1<f64>,
    grid_elevations: Array1<f64>,
    rasters: BTreeMap<RasterVariable, Array2<f64>>,
    columns: BTreeMap<ColumnVariable, Array1<f64>>,
}

impl LineSection {
    /// Validate section parts. Any shape disagreement is fatal; nothing is
    /// truncated or padded to make it fit.
    pub fn new(parts: SectionParts) -> SectionResult<Self> {
        let SectionParts {
            grid_distances,
            grid_elevations,
            rasters,
            columns,
        } = parts;

        let n_dist = grid_distances.len();
        let n_elev = grid_elevations.len();

        if n_dist == 0 || n_elev == 0 {
            return Err(SectionError::ShapeMismatch(format!(
                "section axes must be non-empty (distances: {}, elevations: {})",
                n_dist, n_elev
            )));
        }
        if grid_distances.iter().any(|d| !d.is_finite()) {
            return Err(SectionError::ShapeMismatch(
                "grid_distances contains non-finite values".to_string(),
            ));
        }
        if grid_distances.windows(2).into_iter().any(|w| w[1] < w[0]) {
            return Err(SectionError::ShapeMismatch(
                "grid_distances must be monotonically increasing".to_string(),
            ));
        }
        if !is_monotonic(grid_elevations.view()) {
            return Err(SectionError::ShapeMismatch(
                "grid_elevations must be finite and monotonic".to_string(),
            ));
        }

        for (variable, raster) in &rasters {
            if raster.dim() != (n_elev, n_dist) {
                return Err(SectionError::ShapeMismatch(format!(
                    "raster '{}' has shape {:?}, axes require ({}, {})",
                    variable.name(),
                    raster.dim(),
                    n_elev,
                    n_dist
                )));
            }
        }
        for (variable, column) in &columns {
            if column.len() != n_dist {
                return Err(SectionError::ShapeMismatch(format!(
                    "column '{}' has length {}, grid_distances has {}",
                    variable.name(),
                    column.len(),
                    n_dist
                )));
            }
        }
        for variable in ColumnVariable::MANDATORY {
            if !columns.contains_key(&variable) {
                return Err(SectionError::ShapeMismatch(format!(
                    "mandatory column '{}' missing",
                    variable.name()
                )));
            }
        }

        Ok(Self {
            grid_distances,
            grid_elevations,
            rasters,
            columns,
        })
    }

    /// Copy the contents back out, e.g. for persisting
    pub fn to_parts(&self) -> SectionParts {
        SectionParts {
            grid_distances: self.grid_distances.clone(),
            grid_elevations: self.grid_elevations.clone(),
            rasters: self.rasters.clone(),
            columns: self.columns.clone(),
        }
    }

    pub fn axis(&self, which: Axis) -> ArrayView1<'_, f64> {
        match which {
            Axis::Distance => self.grid_distances.view(),
            Axis::Elevation => self.grid_elevations.view(),
        }
    }

    pub fn raster(&self, variable: RasterVariable) -> Option<ArrayView2<'_, f64>> {
        self.rasters.get(&variable).map(|r| r.view())
    }

    pub fn column(&self, variable: ColumnVariable) -> Option<ArrayView1<'_, f64>> {
        self.columns.get(&variable).map(|c| c.view())
    }

    /// Mandatory columns are guaranteed by construction
    pub fn mandatory_column(&self, variable: ColumnVariable) -> ArrayView1<'_, f64> {
        debug_assert!(ColumnVariable::MANDATORY.contains(&variable));
        self.columns[&variable].view()
    }

    pub fn contains(&self, variable: GridVariable) -> bool {
        match variable {
            GridVariable::Raster(r) => self.rasters.contains_key(&r),
            GridVariable::Column(c) => self.columns.contains_key(&c),
        }
    }

    /// Check that every requested variable was gridded for this line
    pub fn require(&self, line: LineId, requested: &[GridVariable]) -> SectionResult<()> {
        match requested.iter().find(|v| !self.contains(**v)) {
            Some(missing) => Err(SectionError::VariableNotLoaded {
                line,
                variable: missing.name().to_string(),
            }),
            None => Ok(()),
        }
    }

    pub fn n_columns(&self) -> usize {
        self.grid_distances.len()
    }

    /// (easting, northing) of every column as an N×2 array
    pub fn column_coordinates(&self) -> Array2<f64> {
        let easting = self.mandatory_column(ColumnVariable::Easting);
        let northing = self.mandatory_column(ColumnVariable::Northing);
        let mut coords = Array2::zeros((self.n_columns(), 2));
        coords.column_mut(0).assign(&easting);
        coords.column_mut(1).assign(&northing);
        coords
    }

    /// Median spacing between adjacent distinct columns, `None` when the
    /// section has fewer than two distinct distances
    pub fn horizontal_cell_size(&self) -> Option<f64> {
        let mut spacing: Vec<f64> = self
            .grid_distances
            .windows(2)
            .into_iter()
            .map(|w| (w[1] - w[0]).abs())
            .filter(|step| *step > 0.0)
            .collect();
        if spacing.is_empty() {
            return None;
        }
        spacing.sort_by(|a, b| a.total_cmp(b));
        Some(spacing[spacing.len() / 2])
    }
}

fn is_monotonic(values: ArrayView1<'_, f64>) -> bool {
    if values.iter().any(|v| !v.is_finite()) {
        return false;
    }
    let increasing = values.windows(2).into_iter().all(|w| w[1] >= w[0]);
    let decreasing = values.windows(2).into_iter().all(|w| w[1] <= w[0]);
    increasing || decreasing
}

/// Gridded sections of one inversion, keyed by line
#[derive(Debug, Clone)]
pub struct SectionGrid {
    source: InversionSource,
    resolution: GridResolution,
    lines: BTreeMap<LineId, LineSection>,
}

impl SectionGrid {
    pub fn new(source: InversionSource, resolution: GridResolution) -> Self {
        Self {
            source,
            resolution,
            lines: BTreeMap::new(),
        }
    }

    pub fn source(&self) -> InversionSource {
        self.source
    }

    pub fn resolution(&self) -> GridResolution {
        self.resolution
    }

    /// Add or replace the section of a line
    pub fn insert(&mut self, line: LineId, section: LineSection) -> Option<LineSection> {
        log::debug!(
            "Adding {} section for line {} ({} columns)",
            self.source.short_name(),
            line,
            section.n_columns()
        );
        self.lines.insert(line, section)
    }

    pub fn line(&self, line: LineId) -> SectionResult<&LineSection> {
        self.lines.get(&line).ok_or(SectionError::LineNotFound(line))
    }

    pub fn contains_line(&self, line: LineId) -> bool {
        self.lines.contains_key(&line)
    }

    pub fn line_ids(&self) -> impl Iterator<Item = LineId> + '_ {
        self.lines.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn variable(&self, line: LineId, name: RasterVariable) -> SectionResult<ArrayView2<'_, f64>> {
        self.line(line)?
            .raster(name)
            .ok_or_else(|| SectionError::VariableNotLoaded {
                line,
                variable: name.name().to_string(),
            })
    }

    pub fn axis(&self, line: LineId, which: Axis) -> SectionResult<ArrayView1<'_, f64>> {
        Ok(self.line(line)?.axis(which))
    }

    pub fn scalar_column(&self, line: LineId, name: ColumnVariable) -> SectionResult<ArrayView1<'_, f64>> {
        self.line(line)?
            .column(name)
            .ok_or_else(|| SectionError::VariableNotLoaded {
                line,
                variable: name.name().to_string(),
            })
    }
}
