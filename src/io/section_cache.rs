use crate::core::layer_grid::LayerGrids;
use crate::core::section_grid::{GridResolution, GridVariable, LineSection, SectionGrid, SectionParts};
use crate::types::{InversionSource, LineId, SectionError, SectionResult};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

const CACHE_FORMAT_VERSION: u32 = 1;
const CACHE_SUFFIX: &str = ".section.gz";
const LAYER_GRIDS_FILE: &str = "layer_grids.gz";

/// On-disk layout of one gridded line
#[derive(Debug, Serialize, Deserialize)]
struct CachedSection {
    version: u32,
    source: InversionSource,
    line: LineId,
    resolution: GridResolution,
    created: DateTime<Utc>,
    section: SectionParts,
}

/// On-disk layout of the plan-view depth slices
#[derive(Debug, Serialize, Deserialize)]
struct CachedLayerGrids {
    version: u32,
    created: DateTime<Utc>,
    grids: LayerGrids,
}

/// Directory of pre-gridded sections, one gzip-compressed bincode file per
/// source and line. Files are read whole and re-validated on load.
#[derive(Debug, Clone)]
pub struct SectionCache {
    dir: PathBuf,
}

impl SectionCache {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, source: InversionSource, line: LineId) -> PathBuf {
        self.dir
            .join(format!("{}_{}{}", source.short_name(), line, CACHE_SUFFIX))
    }

    /// Persist one line, creating the cache directory if needed
    pub fn save_line(
        &self,
        source: InversionSource,
        resolution: GridResolution,
        line: LineId,
        section: &LineSection,
    ) -> SectionResult<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(source, line);

        let cached = CachedSection {
            version: CACHE_FORMAT_VERSION,
            source,
            line,
            resolution,
            created: Utc::now(),
            section: section.to_parts(),
        };

        let file = File::create(&path)?;
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        bincode::serialize_into(&mut encoder, &cached)?;
        encoder.finish()?;

        log::debug!("Saved {} section for line {} to {}", source.short_name(), line, path.display());
        Ok(path)
    }

    /// Persist every line of a grid
    pub fn save_grid(&self, grid: &SectionGrid) -> SectionResult<usize> {
        let mut saved = 0;
        for line in grid.line_ids() {
            self.save_line(grid.source(), grid.resolution(), line, grid.line(line)?)?;
            saved += 1;
        }
        log::info!(
            "💾 Saved {} {} sections to {}",
            saved,
            grid.source().short_name(),
            self.dir.display()
        );
        Ok(saved)
    }

    pub fn layer_grids_path(&self) -> PathBuf {
        self.dir.join(LAYER_GRIDS_FILE)
    }

    /// Persist the plan-view depth slices next to the sections
    pub fn save_layer_grids(&self, grids: &LayerGrids) -> SectionResult<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.layer_grids_path();

        let cached = CachedLayerGrids {
            version: CACHE_FORMAT_VERSION,
            created: Utc::now(),
            grids: grids.clone(),
        };
        let file = File::create(&path)?;
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        bincode::serialize_into(&mut encoder, &cached)?;
        encoder.finish()?;

        log::info!("💾 Saved {} layer grids to {}", grids.len(), path.display());
        Ok(path)
    }

    /// Depth slices saved with `save_layer_grids`, `None` when the cache has none
    pub fn load_layer_grids(&self) -> SectionResult<Option<LayerGrids>> {
        let path = self.layer_grids_path();
        if !path.exists() {
            return Ok(None);
        }

        let file = File::open(&path)?;
        let cached: CachedLayerGrids = bincode::deserialize_from(GzDecoder::new(BufReader::new(file)))?;
        if cached.version != CACHE_FORMAT_VERSION {
            return Err(SectionError::InvalidInput(format!(
                "{}: cache format version {} (expected {})",
                path.display(),
                cached.version,
                CACHE_FORMAT_VERSION
            )));
        }
        cached.grids.validate()?;

        log::info!(
            "📂 Loaded {} layer grids from {} (gridded {})",
            cached.grids.len(),
            path.display(),
            cached.created.format("%Y-%m-%d %H:%M")
        );
        Ok(Some(cached.grids))
    }

    /// Load one line and check that every requested variable is present
    pub fn load_line(
        &self,
        source: InversionSource,
        line: LineId,
        requested: &[GridVariable],
    ) -> SectionResult<(GridResolution, LineSection)> {
        let path = self.path_for(source, line);
        if !path.exists() {
            return Err(SectionError::LineNotFound(line));
        }

        let file = File::open(&path)?;
        let cached: CachedSection = bincode::deserialize_from(GzDecoder::new(BufReader::new(file)))?;

        if cached.version != CACHE_FORMAT_VERSION {
            return Err(SectionError::InvalidInput(format!(
                "{}: cache format version {} (expected {})",
                path.display(),
                cached.version,
                CACHE_FORMAT_VERSION
            )));
        }
        if cached.source != source || cached.line != line {
            return Err(SectionError::InvalidInput(format!(
                "{}: holds {} line {}, expected {} line {}",
                path.display(),
                cached.source.short_name(),
                cached.line,
                source.short_name(),
                line
            )));
        }

        let section = LineSection::new(cached.section)?;
        section.require(line, requested)?;
        log::debug!(
            "Loaded {} section for line {} (gridded {})",
            source.short_name(),
            line,
            cached.created.format("%Y-%m-%d %H:%M")
        );
        Ok((cached.resolution, section))
    }

    /// Line numbers with a cached section for `source`
    pub fn available_lines(&self, source: InversionSource) -> SectionResult<Vec<LineId>> {
        let prefix = format!("{}_", source.short_name());
        let mut lines = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if let Some(line) = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(CACHE_SUFFIX))
                .and_then(|id| id.parse::<LineId>().ok())
            {
                lines.push(line);
            }
        }
        lines.sort_unstable();
        Ok(lines)
    }

    /// Load a whole grid. Any unreadable or inconsistent line fails the load;
    /// an empty `lines` list loads every cached line.
    pub fn load_grid(
        &self,
        source: InversionSource,
        lines: &[LineId],
        requested: &[GridVariable],
    ) -> SectionResult<SectionGrid> {
        let lines = if lines.is_empty() {
            self.available_lines(source)?
        } else {
            lines.to_vec()
        };
        log::info!(
            "📂 Loading {} {} sections from {}",
            lines.len(),
            source.short_name(),
            self.dir.display()
        );

        #[cfg(feature = "parallel")]
        let loaded: Vec<(LineId, (GridResolution, LineSection))> = lines
            .par_iter()
            .map(|&line| self.load_line(source, line, requested).map(|s| (line, s)))
            .collect::<SectionResult<_>>()?;

        #[cfg(not(feature = "parallel"))]
        let loaded: Vec<(LineId, (GridResolution, LineSection))> = lines
            .iter()
            .map(|&line| self.load_line(source, line, requested).map(|s| (line, s)))
            .collect::<SectionResult<_>>()?;

        let resolution = loaded
            .first()
            .map(|(_, (resolution, _))| *resolution)
            .unwrap_or_default();

        let mut grid = SectionGrid::new(source, resolution);
        for (line, (line_resolution, section)) in loaded {
            if line_resolution != resolution {
                return Err(SectionError::ShapeMismatch(format!(
                    "line {} gridded at {:?}, other lines at {:?}",
                    line, line_resolution, resolution
                )));
            }
            grid.insert(line, section);
        }
        Ok(grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::layer_grid::tests::two_layer_grids;
    use crate::core::section_grid::tests::three_column_parts;
    use crate::core::section_grid::{Axis, RasterVariable};
    use ndarray::Array2;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_line() {
        let dir = TempDir::new().unwrap();
        let cache = SectionCache::new(dir.path());
        let mut parts = three_column_parts();
        parts.rasters.get_mut(&RasterVariable::Conductivity).unwrap()[[1, 1]] = f64::NAN;
        let section = LineSection::new(parts).unwrap();

        cache
            .save_line(InversionSource::Deterministic, GridResolution::default(), 200101, &section)
            .unwrap();
        let requested = GridVariable::parse_list(&["conductivity", "data_residual"]).unwrap();
        let (resolution, loaded) = cache
            .load_line(InversionSource::Deterministic, 200101, &requested)
            .unwrap();

        assert_eq!(resolution, GridResolution::default());
        assert_eq!(loaded.axis(Axis::Distance), section.axis(Axis::Distance));
        let raster = loaded.raster(RasterVariable::Conductivity).unwrap();
        assert!(raster[[1, 1]].is_nan());
        assert_eq!(raster[[0, 0]], 0.1);
    }

    #[test]
    fn test_missing_requested_variable() {
        let dir = TempDir::new().unwrap();
        let cache = SectionCache::new(dir.path());
        let section = LineSection::new(three_column_parts()).unwrap();
        cache
            .save_line(InversionSource::Stochastic, GridResolution::default(), 200101, &section)
            .unwrap();

        let requested = GridVariable::parse_list(&["conductivity_p50"]).unwrap();
        let err = cache
            .load_line(InversionSource::Stochastic, 200101, &requested)
            .unwrap_err();
        assert!(matches!(err, SectionError::VariableNotLoaded { line: 200101, .. }));
    }

    #[test]
    fn test_corrupt_shapes_fail_the_load() {
        let dir = TempDir::new().unwrap();
        let cache = SectionCache::new(dir.path());

        // Write a payload whose raster disagrees with its axes
        let mut parts = three_column_parts();
        parts.rasters.insert(RasterVariable::ConductivityP10, Array2::zeros((2, 2)));
        let cached = CachedSection {
            version: CACHE_FORMAT_VERSION,
            source: InversionSource::Deterministic,
            line: 200101,
            resolution: GridResolution::default(),
            created: Utc::now(),
            section: parts,
        };
        let file = File::create(cache.path_for(InversionSource::Deterministic, 200101)).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        bincode::serialize_into(&mut encoder, &cached).unwrap();
        encoder.finish().unwrap();

        let result = cache.load_grid(InversionSource::Deterministic, &[200101], &[]);
        assert!(matches!(result, Err(SectionError::ShapeMismatch(_))));
    }

    #[test]
    fn test_layer_grids_beside_sections() {
        let dir = TempDir::new().unwrap();
        let cache = SectionCache::new(dir.path());
        assert!(cache.load_layer_grids().unwrap().is_none());

        let grids = two_layer_grids();
        cache.save_layer_grids(&grids).unwrap();
        let section = LineSection::new(three_column_parts()).unwrap();
        cache
            .save_line(InversionSource::Deterministic, GridResolution::default(), 200101, &section)
            .unwrap();

        let loaded = cache.load_layer_grids().unwrap().expect("saved layer grids");
        assert_eq!(loaded.bounds(), grids.bounds());
        assert_eq!(loaded.layer(2).unwrap(), grids.layer(2).unwrap());
        assert!(loaded.layer(1).unwrap()[[1, 2]].is_nan());

        // The slice file is not mistaken for a section
        assert_eq!(
            cache.available_lines(InversionSource::Deterministic).unwrap(),
            vec![200101]
        );
    }

    #[test]
    fn test_load_grid_all_available_lines() {
        let dir = TempDir::new().unwrap();
        let cache = SectionCache::new(dir.path());
        let mut grid = SectionGrid::new(InversionSource::Deterministic, GridResolution::default());
        grid.insert(200101, LineSection::new(three_column_parts()).unwrap());
        grid.insert(200401, LineSection::new(three_column_parts()).unwrap());
        assert_eq!(cache.save_grid(&grid).unwrap(), 2);

        assert_eq!(
            cache.available_lines(InversionSource::Deterministic).unwrap(),
            vec![200101, 200401]
        );
        assert!(cache.available_lines(InversionSource::Stochastic).unwrap().is_empty());

        let loaded = cache.load_grid(InversionSource::Deterministic, &[], &[]).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(matches!(
            cache.load_grid(InversionSource::Deterministic, &[999], &[]),
            Err(SectionError::LineNotFound(999))
        ));
    }
}
