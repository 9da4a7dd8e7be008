use crate::core::flight_lines::MapParams;
use crate::core::interpretation::BoundaryTemplate;
use crate::core::projector::ProjectionParams;
use crate::core::section_assembler::StyleParams;
use crate::core::section_grid::{GridResolution, GridVariable};
use crate::types::{InversionSource, LineId, SectionError, SectionResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where a source's gridded sections live and what they must contain.
/// Unset fields fall back to the defaults of the source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub cache_dir: Option<PathBuf>,
    pub variables: Option<Vec<String>>,
    pub resolution: Option<GridResolution>,
}

impl SourceConfig {
    pub fn cache_dir(&self, source: InversionSource) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("sections").join(source.short_name()))
    }

    /// Variables every cached line must hold
    pub fn variables(&self, source: InversionSource) -> SectionResult<Vec<GridVariable>> {
        match &self.variables {
            Some(names) => GridVariable::parse_list(names.as_slice()),
            None => GridVariable::parse_list(default_variables(source)),
        }
    }

    pub fn resolution(&self, source: InversionSource) -> GridResolution {
        self.resolution.unwrap_or(match source {
            InversionSource::Deterministic => GridResolution::default(),
            InversionSource::Stochastic => GridResolution {
                horizontal: 50.0,
                vertical: 2.0,
            },
        })
    }
}

fn default_variables(source: InversionSource) -> &'static [&'static str] {
    match source {
        InversionSource::Deterministic => &["conductivity", "data_residual", "depth_of_investigation"],
        InversionSource::Stochastic => &[
            "conductivity_p10",
            "conductivity_p50",
            "conductivity_p90",
            "interface_depth_histogram",
            "misfit_lowest",
            "misfit_average",
        ],
    }
}

/// Settings for turning clicks into interpreted points
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpretationParams {
    /// Largest distance (m) between a section column and the sample whose
    /// fiducial is recorded
    pub fiducial_tolerance: f64,
    /// Default export target for interpreted points
    pub output_path: Option<PathBuf>,
}

impl Default for InterpretationParams {
    fn default() -> Self {
        Self {
            fiducial_tolerance: 100.0,
            output_path: None,
        }
    }
}

/// Complete configuration of an interpretation session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub deterministic: SourceConfig,
    pub stochastic: SourceConfig,
    /// Lines to load; empty loads every cached line
    pub lines: Vec<LineId>,
    pub projection: ProjectionParams,
    pub interpretation: InterpretationParams,
    pub style: StyleParams,
    pub boundary: BoundaryTemplate,
    pub map: MapParams,
}

impl SessionConfig {
    pub fn from_toml_str(text: &str) -> SectionResult<Self> {
        let config: SessionConfig =
            toml::from_str(text).map_err(|e| SectionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> SectionResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&text)?;
        log::info!("Loaded session configuration from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn to_toml_string(&self) -> SectionResult<String> {
        toml::to_string_pretty(self).map_err(|e| SectionError::Config(e.to_string()))
    }

    pub fn source(&self, source: InversionSource) -> &SourceConfig {
        match source {
            InversionSource::Deterministic => &self.deterministic,
            InversionSource::Stochastic => &self.stochastic,
        }
    }

    /// Check value ranges and variable names. Unknown variable names fail here,
    /// before any cache is touched.
    pub fn validate(&self) -> SectionResult<()> {
        for source in [InversionSource::Deterministic, InversionSource::Stochastic] {
            let cfg = self.source(source);
            cfg.variables(source)?;
            let res = cfg.resolution(source);
            if !(res.horizontal > 0.0 && res.vertical > 0.0) {
                return Err(SectionError::Config(format!(
                    "{} resolution must be positive, got {} x {}",
                    source.short_name(),
                    res.horizontal,
                    res.vertical
                )));
            }
        }

        if let Some(d) = self.projection.max_distance {
            if !(d >= 0.0) {
                return Err(SectionError::Config(format!(
                    "projection.max_distance must be non-negative, got {}",
                    d
                )));
            }
        }
        if !(self.projection.fallback_cell_size > 0.0) {
            return Err(SectionError::Config(
                "projection.fallback_cell_size must be positive".to_string(),
            ));
        }
        if !(self.interpretation.fiducial_tolerance >= 0.0) {
            return Err(SectionError::Config(
                "interpretation.fiducial_tolerance must be non-negative".to_string(),
            ));
        }
        if !(self.map.buffer >= 0.0) {
            return Err(SectionError::Config("map.buffer must be non-negative".to_string()));
        }
        if !(self.map.zmin.is_finite() && self.map.zmax.is_finite() && self.map.zmin < self.map.zmax) {
            return Err(SectionError::Config(format!(
                "map colour range must satisfy zmin < zmax, got {} to {}",
                self.map.zmin, self.map.zmax
            )));
        }
        self.style.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::section_grid::RasterVariable;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.deterministic.resolution(InversionSource::Deterministic),
            GridResolution {
                horizontal: 40.0,
                vertical: 5.0
            }
        );
        assert_eq!(config.stochastic.resolution(InversionSource::Stochastic).vertical, 2.0);
        assert_eq!(config.interpretation.fiducial_tolerance, 100.0);
        assert_eq!(config.style.marker_offset, 20.0);
        assert_eq!(config.map.buffer, 500.0);
        assert_eq!(config.boundary.basis_of_interpretation, "IAEM");
        assert_eq!(
            config.stochastic.cache_dir(InversionSource::Stochastic),
            PathBuf::from("sections/rj")
        );
    }

    #[test]
    fn test_from_toml() {
        let config = SessionConfig::from_toml_str(
            r#"
            lines = [200101, 912011]

            [deterministic]
            cache_dir = "/data/injune/lci"
            resolution = { horizontal = 20.0, vertical = 2.5 }

            [stochastic]
            variables = ["conductivity_p10", "conductivity_p90"]

            [style]
            vmax = 0.5

            [boundary]
            name = "Top Precipice interface"
            overlying_code = 6416
            "#,
        )
        .unwrap();

        assert_eq!(config.lines, vec![200101, 912011]);
        assert_eq!(
            config.deterministic.cache_dir(InversionSource::Deterministic),
            PathBuf::from("/data/injune/lci")
        );
        assert_eq!(config.deterministic.resolution(InversionSource::Deterministic).horizontal, 20.0);
        assert_eq!(
            config.stochastic.variables(InversionSource::Stochastic).unwrap(),
            vec![
                GridVariable::Raster(RasterVariable::ConductivityP10),
                GridVariable::Raster(RasterVariable::ConductivityP90)
            ]
        );
        assert_eq!(config.style.vmax, 0.5);
        assert_eq!(config.style.vmin, 0.01);
        assert_eq!(config.boundary.overlying_code, Some(6416));
        assert_eq!(config.boundary.bound_conf, "M");
    }

    #[test]
    fn test_unknown_variable_fails_fast() {
        let result = SessionConfig::from_toml_str("[stochastic]\nvariables = [\"conductivity_p95\"]\n");
        assert!(matches!(result, Err(SectionError::UnknownVariable(_))));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            SessionConfig::from_toml_str("[style]\nvmin = 2.0\nvmax = 1.0\n"),
            Err(SectionError::Config(_))
        ));
        assert!(matches!(
            SessionConfig::from_toml_str("lines = \"all\""),
            Err(SectionError::Config(_))
        ));
        assert!(matches!(
            SessionConfig::from_toml_str("[map]\nzmin = 0.0\nzmax = -2.0\n"),
            Err(SectionError::Config(_))
        ));
    }

    #[test]
    fn test_map_background_layer() {
        let config = SessionConfig::from_toml_str("[map]\nlayer = 12\n").unwrap();
        assert_eq!(config.map.layer, 12);
        assert_eq!((config.map.zmin, config.map.zmax), (-2.0, 0.0));
        assert_eq!(config.map.buffer, 500.0);
    }
}
