use ndarray::{Array1, Array2, Array3};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Survey flight line number (e.g. 200101)
pub type LineId = i64;

/// External sample identifier, unique within one inversion dataset
pub type Fiducial = f64;

/// Inversion that produced a dataset or gridded section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InversionSource {
    /// Laterally constrained inversion (LCI), one model per sample
    Deterministic,
    /// RJ-MCMC inversion (GARJMCMCTDEM), a posterior ensemble per sample
    Stochastic,
}

impl InversionSource {
    /// Short name written into interpretation records and cache file names
    pub fn short_name(&self) -> &'static str {
        match self {
            InversionSource::Deterministic => "lci",
            InversionSource::Stochastic => "rj",
        }
    }
}

impl FromStr for InversionSource {
    type Err = SectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lci" | "deterministic" => Ok(InversionSource::Deterministic),
            "rj" | "stochastic" => Ok(InversionSource::Stochastic),
            other => Err(SectionError::InvalidInput(format!("unknown inversion source '{}'", other))),
        }
    }
}

impl std::fmt::Display for InversionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InversionSource::Deterministic => write!(f, "Laterally Constrained Inversion (LCI)"),
            InversionSource::Stochastic => write!(f, "GARJMCMCTDEM"),
        }
    }
}

/// Shape class of a dataset variable, sample axis first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    /// One value per sample
    Scalar,
    /// One value per sample and depth cell
    Profile,
    /// Counts per sample, depth cell and conductivity bin
    Histogram,
    /// Axis shared by all samples (depth cells, conductivity bins)
    Axis,
}

/// Variables an inversion container may expose beyond the sample coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DatasetVariable {
    Conductivity,
    DataResidual,
    DepthOfInvestigation,
    ConductivityP10,
    ConductivityP50,
    ConductivityP90,
    InterfaceDepthHistogram,
    MisfitLowest,
    MisfitAverage,
    Log10ConductivityHistogram,
    LayerCentreDepth,
    ConductivityCells,
}

impl DatasetVariable {
    pub const ALL: [DatasetVariable; 12] = [
        DatasetVariable::Conductivity,
        DatasetVariable::DataResidual,
        DatasetVariable::DepthOfInvestigation,
        DatasetVariable::ConductivityP10,
        DatasetVariable::ConductivityP50,
        DatasetVariable::ConductivityP90,
        DatasetVariable::InterfaceDepthHistogram,
        DatasetVariable::MisfitLowest,
        DatasetVariable::MisfitAverage,
        DatasetVariable::Log10ConductivityHistogram,
        DatasetVariable::LayerCentreDepth,
        DatasetVariable::ConductivityCells,
    ];

    /// Variable name as stored in the inversion container
    pub fn name(&self) -> &'static str {
        match self {
            DatasetVariable::Conductivity => "conductivity",
            DatasetVariable::DataResidual => "data_residual",
            DatasetVariable::DepthOfInvestigation => "depth_of_investigation",
            DatasetVariable::ConductivityP10 => "conductivity_p10",
            DatasetVariable::ConductivityP50 => "conductivity_p50",
            DatasetVariable::ConductivityP90 => "conductivity_p90",
            DatasetVariable::InterfaceDepthHistogram => "interface_depth_histogram",
            DatasetVariable::MisfitLowest => "misfit_lowest",
            DatasetVariable::MisfitAverage => "misfit_average",
            DatasetVariable::Log10ConductivityHistogram => "log10conductivity_histogram",
            DatasetVariable::LayerCentreDepth => "layer_centre_depth",
            DatasetVariable::ConductivityCells => "conductivity_cells",
        }
    }

    pub fn kind(&self) -> VariableKind {
        match self {
            DatasetVariable::DataResidual
            | DatasetVariable::DepthOfInvestigation
            | DatasetVariable::MisfitLowest
            | DatasetVariable::MisfitAverage => VariableKind::Scalar,
            DatasetVariable::Conductivity
            | DatasetVariable::ConductivityP10
            | DatasetVariable::ConductivityP50
            | DatasetVariable::ConductivityP90
            | DatasetVariable::InterfaceDepthHistogram => VariableKind::Profile,
            DatasetVariable::Log10ConductivityHistogram => VariableKind::Histogram,
            DatasetVariable::LayerCentreDepth | DatasetVariable::ConductivityCells => {
                VariableKind::Axis
            }
        }
    }
}

impl FromStr for DatasetVariable {
    type Err = SectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DatasetVariable::ALL
            .iter()
            .copied()
            .find(|v| v.name() == s)
            .ok_or_else(|| SectionError::UnknownVariable(s.to_string()))
    }
}

impl std::fmt::Display for DatasetVariable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed storage for a dataset variable
#[derive(Debug, Clone)]
pub enum VariableArray {
    Scalar(Array1<f64>),
    Profile(Array2<f64>),
    Histogram(Array3<f64>),
    Axis(Array1<f64>),
}

impl VariableArray {
    pub fn kind(&self) -> VariableKind {
        match self {
            VariableArray::Scalar(_) => VariableKind::Scalar,
            VariableArray::Profile(_) => VariableKind::Profile,
            VariableArray::Histogram(_) => VariableKind::Histogram,
            VariableArray::Axis(_) => VariableKind::Axis,
        }
    }

    /// Length of the leading axis
    pub fn leading_len(&self) -> usize {
        match self {
            VariableArray::Scalar(a) | VariableArray::Axis(a) => a.len(),
            VariableArray::Profile(a) => a.nrows(),
            VariableArray::Histogram(a) => a.dim().0,
        }
    }
}

/// Projected bounding box in metres
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_easting: f64,
    pub max_easting: f64,
    pub min_northing: f64,
    pub max_northing: f64,
}

impl Bounds {
    /// Grow the box by `buffer` metres on every side
    pub fn expanded(&self, buffer: f64) -> Self {
        Self {
            min_easting: self.min_easting - buffer,
            max_easting: self.max_easting + buffer,
            min_northing: self.min_northing - buffer,
            max_northing: self.max_northing + buffer,
        }
    }
}

/// Display state of an annotation or flight line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Highlight {
    Default,
    Selected,
}

/// Error types for section processing
#[derive(Debug, thiserror::Error)]
pub enum SectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Section cache error: {0}")]
    Cache(#[from] bincode::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Line {0} not found")]
    LineNotFound(LineId),

    #[error("Variable '{variable}' not loaded for line {line}")]
    VariableNotLoaded { line: LineId, variable: String },

    #[error("Layer {0} has no depth slice")]
    LayerNotFound(usize),

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Variable '{0}' not present in dataset")]
    MissingVariable(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Spatial index has no reference points")]
    EmptyReference,

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Sample index {index} out of range for {count} samples")]
    SampleOutOfRange { index: usize, count: usize },

    #[error("Duplicate fiducial {0}")]
    DuplicateFiducial(Fiducial),
}

impl SectionError {
    /// Errors caused by a selection mismatch (unknown line, layer or variable)
    /// rather than corrupt data; callers report these and carry on.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            SectionError::LineNotFound(_)
                | SectionError::LayerNotFound(_)
                | SectionError::VariableNotLoaded { .. }
                | SectionError::UnknownVariable(_)
                | SectionError::MissingVariable(_)
                | SectionError::SampleOutOfRange { .. }
        )
    }
}

/// Result type for section operations
pub type SectionResult<T> = Result<T, SectionError>;
