use crate::core::spatial_index::SpatialIndex;
use crate::types::{
    Bounds, DatasetVariable, Fiducial, InversionSource, LineId, SectionError, SectionResult,
    VariableArray, VariableKind,
};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayView3};
use std::collections::{HashMap, HashSet};

/// Per-sample arrays every inversion container provides
#[derive(Debug, Clone)]
pub struct SampleColumns {
    pub fiducial: Array1<Fiducial>,
    pub easting: Array1<f64>,
    pub northing: Array1<f64>,
    /// Ground (DEM) elevation at the sample
    pub elevation: Array1<f64>,
    pub line: Array1<LineId>,
}

/// Typed, validated in-memory view of one inversion container.
///
/// Samples keep the container's acquisition order. Lines are addressed through a
/// lookup table: each sample stores the position of its line in [`lines`], and a
/// line may be listed in the table without owning any samples.
///
/// [`lines`]: InversionData::lines
#[derive(Debug, Clone)]
pub struct InversionData {
    name: String,
    source: InversionSource,
    fiducials: Array1<Fiducial>,
    coordinates: Array2<f64>,
    elevation: Array1<f64>,
    lines: Vec<LineId>,
    line_index: Array1<usize>,
    variables: HashMap<DatasetVariable, VariableArray>,
}

impl InversionData {
    /// Build from the per-sample arrays. The line lookup table is the sorted set
    /// of line numbers present in `samples.line`.
    pub fn new(
        name: impl Into<String>,
        source: InversionSource,
        samples: SampleColumns,
    ) -> SectionResult<Self> {
        let name = name.into();
        let n = samples.fiducial.len();

        for (label, len) in [
            ("easting", samples.easting.len()),
            ("northing", samples.northing.len()),
            ("elevation", samples.elevation.len()),
            ("line", samples.line.len()),
        ] {
            if len != n {
                return Err(SectionError::ShapeMismatch(format!(
                    "'{}' has {} samples, 'fiducial' has {}",
                    label, len, n
                )));
            }
        }

        let mut seen = HashSet::with_capacity(n);
        for &fid in samples.fiducial.iter() {
            if !fid.is_finite() {
                return Err(SectionError::InvalidInput(format!(
                    "non-finite fiducial in dataset '{}'",
                    name
                )));
            }
            // -0.0 and 0.0 name the same sample
            let key = if fid == 0.0 { 0.0f64 } else { fid };
            if !seen.insert(key.to_bits()) {
                return Err(SectionError::DuplicateFiducial(fid));
            }
        }

        let mut lines: Vec<LineId> = samples.line.to_vec();
        lines.sort_unstable();
        lines.dedup();
        let line_index = index_into_table(&lines, samples.line.view())?;

        let mut coordinates = Array2::zeros((n, 2));
        coordinates.column_mut(0).assign(&samples.easting);
        coordinates.column_mut(1).assign(&samples.northing);

        log::info!(
            "📦 Loaded {} dataset '{}': {} samples on {} lines",
            source.short_name(),
            name,
            n,
            lines.len()
        );

        Ok(Self {
            name,
            source,
            fiducials: samples.fiducial,
            coordinates,
            elevation: samples.elevation,
            lines,
            line_index,
            variables: HashMap::new(),
        })
    }

    /// Replace the line lookup table, e.g. with the container's own `line`
    /// variable. Every line that owns samples must appear in it.
    pub fn with_line_table(mut self, mut table: Vec<LineId>) -> SectionResult<Self> {
        let mut seen = HashSet::new();
        table.retain(|l| seen.insert(*l));

        let sample_lines: Vec<LineId> = self.line_index.iter().map(|&i| self.lines[i]).collect();
        self.line_index = index_into_table(&table, ArrayView1::from(&sample_lines[..]))?;
        self.lines = table;
        Ok(self)
    }

    /// Attach a variable, checking its shape class and sample axis
    pub fn insert_variable(
        &mut self,
        variable: DatasetVariable,
        values: VariableArray,
    ) -> SectionResult<()> {
        if values.kind() != variable.kind() {
            return Err(SectionError::InvalidInput(format!(
                "'{}' expects {:?} data, got {:?}",
                variable,
                variable.kind(),
                values.kind()
            )));
        }
        if variable.kind() != VariableKind::Axis && values.leading_len() != self.len() {
            return Err(SectionError::ShapeMismatch(format!(
                "'{}' has {} samples, dataset '{}' has {}",
                variable,
                values.leading_len(),
                self.name,
                self.len()
            )));
        }
        log::debug!("Dataset '{}': added variable '{}'", self.name, variable);
        self.variables.insert(variable, values);
        Ok(())
    }

    pub fn with_variable(mut self, variable: DatasetVariable, values: VariableArray) -> SectionResult<Self> {
        self.insert_variable(variable, values)?;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> InversionSource {
        self.source
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.fiducials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fiducials.is_empty()
    }

    pub fn fiducials(&self) -> ArrayView1<'_, Fiducial> {
        self.fiducials.view()
    }

    /// (easting, northing) of every sample as an N×2 array
    pub fn coordinates(&self) -> ArrayView2<'_, f64> {
        self.coordinates.view()
    }

    pub fn elevation(&self) -> ArrayView1<'_, f64> {
        self.elevation.view()
    }

    /// Line lookup table
    pub fn lines(&self) -> &[LineId] {
        &self.lines
    }

    /// Position of each sample's line in the lookup table
    pub fn line_index(&self) -> ArrayView1<'_, usize> {
        self.line_index.view()
    }

    pub fn fiducial(&self, index: usize) -> SectionResult<Fiducial> {
        self.fiducials
            .get(index)
            .copied()
            .ok_or(SectionError::SampleOutOfRange {
                index,
                count: self.len(),
            })
    }

    pub fn has_variable(&self, variable: DatasetVariable) -> bool {
        self.variables.contains_key(&variable)
    }

    fn get(&self, variable: DatasetVariable) -> SectionResult<&VariableArray> {
        self.variables
            .get(&variable)
            .ok_or_else(|| SectionError::MissingVariable(variable.name().to_string()))
    }

    pub fn scalar(&self, variable: DatasetVariable) -> SectionResult<ArrayView1<'_, f64>> {
        match self.get(variable)? {
            VariableArray::Scalar(a) => Ok(a.view()),
            other => Err(kind_error(variable, other)),
        }
    }

    pub fn profile(&self, variable: DatasetVariable) -> SectionResult<ArrayView2<'_, f64>> {
        match self.get(variable)? {
            VariableArray::Profile(a) => Ok(a.view()),
            other => Err(kind_error(variable, other)),
        }
    }

    pub fn histogram(&self, variable: DatasetVariable) -> SectionResult<ArrayView3<'_, f64>> {
        match self.get(variable)? {
            VariableArray::Histogram(a) => Ok(a.view()),
            other => Err(kind_error(variable, other)),
        }
    }

    pub fn axis(&self, variable: DatasetVariable) -> SectionResult<ArrayView1<'_, f64>> {
        match self.get(variable)? {
            VariableArray::Axis(a) => Ok(a.view()),
            other => Err(kind_error(variable, other)),
        }
    }

    /// Number of models in each sample's posterior ensemble: the total count
    /// of the first depth cell of the first sample's conductivity histogram.
    pub fn posterior_sample_count(&self) -> SectionResult<f64> {
        let histogram = self.histogram(DatasetVariable::Log10ConductivityHistogram)?;
        let (samples, depths, _) = histogram.dim();
        if samples == 0 || depths == 0 {
            return Err(SectionError::InvalidInput(
                "conductivity histogram is empty".to_string(),
            ));
        }
        let count: f64 = histogram.slice(ndarray::s![0, 0, ..]).sum();
        if count <= 0.0 {
            return Err(SectionError::InvalidInput(
                "conductivity histogram has no counts".to_string(),
            ));
        }
        Ok(count)
    }

    /// Bounding box of all finite sample coordinates
    pub fn bounds(&self) -> Option<Bounds> {
        let mut bounds: Option<Bounds> = None;
        for row in self.coordinates.rows() {
            let (x, y) = (row[0], row[1]);
            if !x.is_finite() || !y.is_finite() {
                continue;
            }
            bounds = Some(match bounds {
                None => Bounds {
                    min_easting: x,
                    max_easting: x,
                    min_northing: y,
                    max_northing: y,
                },
                Some(b) => Bounds {
                    min_easting: b.min_easting.min(x),
                    max_easting: b.max_easting.max(x),
                    min_northing: b.min_northing.min(y),
                    max_northing: b.max_northing.max(y),
                },
            });
        }
        bounds
    }

    /// Nearest-neighbour index over the sample coordinates
    pub fn spatial_index(&self) -> SectionResult<SpatialIndex> {
        SpatialIndex::new(self.coordinates.view())
    }
}

fn index_into_table(table: &[LineId], sample_lines: ArrayView1<'_, LineId>) -> SectionResult<Array1<usize>> {
    let positions: HashMap<LineId, usize> = table.iter().enumerate().map(|(i, &l)| (l, i)).collect();
    sample_lines
        .iter()
        .map(|line| {
            positions.get(line).copied().ok_or_else(|| {
                SectionError::InvalidInput(format!("line {} missing from line lookup table", line))
            })
        })
        .collect::<SectionResult<Vec<usize>>>()
        .map(Array1::from)
}

fn kind_error(variable: DatasetVariable, found: &VariableArray) -> SectionError {
    SectionError::InvalidInput(format!(
        "'{}' holds {:?} data, not {:?}",
        variable,
        found.kind(),
        variable.kind()
    ))
}
