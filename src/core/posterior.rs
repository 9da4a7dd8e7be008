use crate::io::dataset::InversionData;
use crate::types::{DatasetVariable, Fiducial, InversionSource, SectionError, SectionResult};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::Serialize;

/// Plot extent of a probability map: (cond_min, cond_max, depth_min, depth_max)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PosteriorExtent {
    pub cond_min: f64,
    pub cond_max: f64,
    pub depth_min: f64,
    pub depth_max: f64,
}

/// Posterior conductivity-vs-depth summary of one stochastic sample
#[derive(Debug, Clone, Serialize)]
pub struct PosteriorProfile {
    pub point_index: usize,
    pub fiducial: Fiducial,
    /// Depth of each layer centre (m)
    pub depth_cells: Array1<f64>,
    pub p10: Array1<f64>,
    pub p50: Array1<f64>,
    pub p90: Array1<f64>,
    /// log10 conductivity at the centre of each histogram bin
    pub conductivity_cells: Array1<f64>,
    /// Fraction of the ensemble in each (depth, conductivity) cell
    pub pdf: Array2<f64>,
    pub extent: PosteriorExtent,
}

impl PosteriorProfile {
    /// Pull the percentile profiles and probability map of one sample out of
    /// a stochastic inversion dataset.
    pub fn extract(data: &InversionData, point_index: usize) -> SectionResult<Self> {
        if data.source() != InversionSource::Stochastic {
            return Err(SectionError::InvalidInput(format!(
                "posterior profiles need a stochastic dataset, '{}' is {}",
                data.name(),
                data.source().short_name()
            )));
        }
        let fiducial = data.fiducial(point_index)?;

        let depth_cells = data.axis(DatasetVariable::LayerCentreDepth)?;
        let conductivity_cells = data.axis(DatasetVariable::ConductivityCells)?;
        let histogram = data.histogram(DatasetVariable::Log10ConductivityHistogram)?;

        let (_, n_depth, n_cond) = histogram.dim();
        if n_depth != depth_cells.len() || n_cond != conductivity_cells.len() {
            return Err(SectionError::ShapeMismatch(format!(
                "histogram cells ({}, {}) do not match depth/conductivity axes ({}, {})",
                n_depth,
                n_cond,
                depth_cells.len(),
                conductivity_cells.len()
            )));
        }

        let n_samples = data.posterior_sample_count()?;
        let pdf = histogram
            .index_axis(Axis(0), point_index)
            .mapv(|count| count / n_samples);

        let percentile = |variable: DatasetVariable| -> SectionResult<Array1<f64>> {
            let row = data.profile(variable)?.row(point_index).to_owned();
            if row.len() != n_depth {
                return Err(SectionError::ShapeMismatch(format!(
                    "'{}' has {} depth cells, histogram has {}",
                    variable,
                    row.len(),
                    n_depth
                )));
            }
            Ok(row)
        };
        let p10 = percentile(DatasetVariable::ConductivityP10)?;
        let p50 = percentile(DatasetVariable::ConductivityP50)?;
        let p90 = percentile(DatasetVariable::ConductivityP90)?;

        let (cond_min, cond_max) = finite_range(conductivity_cells);
        let (depth_min, depth_max) = finite_range(depth_cells);

        log::debug!(
            "Posterior profile for fiducial {} ({} depth cells, {} conductivity bins)",
            fiducial,
            n_depth,
            n_cond
        );

        Ok(Self {
            point_index,
            fiducial,
            depth_cells: depth_cells.to_owned(),
            p10,
            p50,
            p90,
            conductivity_cells: conductivity_cells.to_owned(),
            pdf,
            extent: PosteriorExtent {
                cond_min,
                cond_max,
                depth_min,
                depth_max,
            },
        })
    }

    /// Largest cell probability, the top of the colour scale
    pub fn max_probability(&self) -> f64 {
        self.pdf.iter().copied().fold(0.0, f64::max)
    }
}

fn finite_range(values: ArrayView1<'_, f64>) -> (f64, f64) {
    values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::NAN, f64::NAN), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}
