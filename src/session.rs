//! Interpretation session: the loaded datasets and grids of one survey plus
//! the points picked on them.

use crate::config::SessionConfig;
use crate::core::click_resolver::{ClickResolver, ResolvedClick};
use crate::core::flight_lines::{FlightLineMap, MapParams};
use crate::core::interpretation::{BoundaryTemplate, InterpretationStore, InterpretedPoint, PointId};
use crate::core::layer_grid::LayerGrids;
use crate::core::posterior::PosteriorProfile;
use crate::core::projector::{AlongLineProjector, DistanceAlongLine};
use crate::core::section_assembler::{SectionAssembler, SectionLayers, SectionMode};
use crate::core::section_grid::{LineSection, SectionGrid};
use crate::core::spatial_index::SpatialIndex;
use crate::io::dataset::InversionData;
use crate::io::interp_export;
use crate::io::section_cache::SectionCache;
use crate::types::{InversionSource, LineId, SectionError, SectionResult};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

type DistanceCache = HashMap<(InversionSource, LineId), Arc<DistanceAlongLine>>;

struct LoadedSource {
    data: InversionData,
    grid: SectionGrid,
    samples: SpatialIndex,
}

impl LoadedSource {
    fn new(data: InversionData, grid: SectionGrid, expected: InversionSource) -> SectionResult<Self> {
        if data.source() != expected || grid.source() != expected {
            return Err(SectionError::InvalidInput(format!(
                "expected {} data and grid, got {} data and {} grid",
                expected.short_name(),
                data.source().short_name(),
                grid.source().short_name()
            )));
        }
        let samples = data.spatial_index()?;
        Ok(Self { data, grid, samples })
    }
}

/// Owns everything one interpretation session works on.
///
/// Datasets and grids are read-only once loaded. Along-line distances are
/// computed on first use and shared between readers; recording or removing
/// interpretations needs exclusive access.
pub struct Session {
    config: SessionConfig,
    deterministic: LoadedSource,
    stochastic: LoadedSource,
    posterior_samples: Option<f64>,
    distances: RwLock<DistanceCache>,
    interpretations: InterpretationStore,
    layer_grids: Option<LayerGrids>,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        deterministic: InversionData,
        stochastic: InversionData,
        deterministic_grid: SectionGrid,
        stochastic_grid: SectionGrid,
    ) -> SectionResult<Self> {
        config.validate()?;
        let deterministic = LoadedSource::new(deterministic, deterministic_grid, InversionSource::Deterministic)?;
        let stochastic = LoadedSource::new(stochastic, stochastic_grid, InversionSource::Stochastic)?;

        let posterior_samples = match stochastic.data.posterior_sample_count() {
            Ok(n) => Some(n),
            Err(e) => {
                log::warn!("Layer probability sections unavailable: {}", e);
                None
            }
        };

        log::info!(
            "🚀 Session ready: {} {} lines, {} {} lines",
            deterministic.grid.len(),
            deterministic.grid.source().short_name(),
            stochastic.grid.len(),
            stochastic.grid.source().short_name()
        );

        let interpretations = InterpretationStore::new(config.boundary.clone());
        Ok(Self {
            config,
            deterministic,
            stochastic,
            posterior_samples,
            distances: RwLock::new(HashMap::new()),
            interpretations,
            layer_grids: None,
        })
    }

    /// Load both grids from their section caches, plus any depth slices in
    /// the deterministic cache, and start a session
    pub fn open(
        config: SessionConfig,
        deterministic: InversionData,
        stochastic: InversionData,
    ) -> SectionResult<Self> {
        config.validate()?;
        let deterministic_grid = load_cached_grid(&config, InversionSource::Deterministic)?;
        let stochastic_grid = load_cached_grid(&config, InversionSource::Stochastic)?;
        let layer_grids = SectionCache::new(config.deterministic.cache_dir(InversionSource::Deterministic))
            .load_layer_grids()?;

        let mut session = Self::new(config, deterministic, stochastic, deterministic_grid, stochastic_grid)?;
        session.layer_grids = layer_grids;
        Ok(session)
    }

    /// Attach plan-view depth slices for the overview map background
    pub fn with_layer_grids(mut self, grids: LayerGrids) -> Self {
        self.layer_grids = Some(grids);
        self
    }

    pub fn layer_grids(&self) -> Option<&LayerGrids> {
        self.layer_grids.as_ref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn loaded(&self, source: InversionSource) -> &LoadedSource {
        match source {
            InversionSource::Deterministic => &self.deterministic,
            InversionSource::Stochastic => &self.stochastic,
        }
    }

    pub fn dataset(&self, source: InversionSource) -> &InversionData {
        &self.loaded(source).data
    }

    pub fn grid(&self, source: InversionSource) -> &SectionGrid {
        &self.loaded(source).grid
    }

    /// Lines gridded by either inversion, ascending
    pub fn lines(&self) -> Vec<LineId> {
        let lines: BTreeSet<LineId> = self
            .deterministic
            .grid
            .line_ids()
            .chain(self.stochastic.grid.line_ids())
            .collect();
        lines.into_iter().collect()
    }

    /// Section whose columns define distance along `line`: the deterministic
    /// one, or the stochastic one for lines only the stochastic grid covers
    fn frame(&self, line: LineId) -> SectionResult<&LineSection> {
        if self.deterministic.grid.contains_line(line) {
            self.deterministic.grid.line(line)
        } else {
            self.stochastic.grid.line(line)
        }
    }

    fn compute_distances(&self, source: InversionSource, line: LineId) -> SectionResult<DistanceAlongLine> {
        let projector = AlongLineProjector::from_section(self.frame(line)?, &self.config.projection)?;
        DistanceAlongLine::build(line, self.dataset(source), &projector)
    }

    /// Distance along `line` of every `source` sample on it, computed against
    /// the line's frame section and cached for the session
    pub fn distance_along_line(
        &self,
        source: InversionSource,
        line: LineId,
    ) -> SectionResult<Arc<DistanceAlongLine>> {
        if let Some(cached) = self
            .distances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(source, line))
        {
            return Ok(Arc::clone(cached));
        }

        let computed = Arc::new(self.compute_distances(source, line)?);
        let mut cache = self.distances.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(cache.entry((source, line)).or_insert(computed)))
    }

    /// Fill the distance cache for every gridded line that `source` has
    /// samples listed for. Returns the number of lines computed.
    pub fn precompute_distances(&self, source: InversionSource) -> SectionResult<usize> {
        let known: HashSet<LineId> = self.dataset(source).lines().iter().copied().collect();
        let lines: Vec<LineId> = self
            .lines()
            .into_iter()
            .filter(|line| known.contains(line))
            .collect();

        #[cfg(feature = "parallel")]
        let computed: Vec<DistanceAlongLine> = lines
            .par_iter()
            .map(|&line| self.compute_distances(source, line))
            .collect::<SectionResult<_>>()?;

        #[cfg(not(feature = "parallel"))]
        let computed: Vec<DistanceAlongLine> = lines
            .iter()
            .map(|&line| self.compute_distances(source, line))
            .collect::<SectionResult<_>>()?;

        let count = computed.len();
        let mut cache = self.distances.write().unwrap_or_else(PoisonError::into_inner);
        for distances in computed {
            cache.insert((source, distances.line), Arc::new(distances));
        }
        log::info!("Computed {} distances along {} lines", source.short_name(), count);
        Ok(count)
    }

    /// Number of (source, line) entries in the distance cache
    pub fn cached_distance_count(&self) -> usize {
        self.distances.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Stochastic markers for a gridded line; a line the stochastic dataset
    /// does not list has none
    fn stochastic_markers(&self, line: LineId) -> SectionResult<Arc<DistanceAlongLine>> {
        match self.distance_along_line(InversionSource::Stochastic, line) {
            Err(SectionError::LineNotFound(_)) if self.frame(line).is_ok() => {
                Ok(Arc::new(DistanceAlongLine::empty(line, InversionSource::Stochastic)))
            }
            other => other,
        }
    }

    /// Renderable layers of `line` in `mode`, with the interpretation rows in
    /// `selected` highlighted
    pub fn build_section(
        &self,
        line: LineId,
        mode: SectionMode,
        selected: &HashSet<PointId>,
    ) -> SectionResult<SectionLayers> {
        let assembler = SectionAssembler::new(
            &self.deterministic.grid,
            &self.stochastic.grid,
            self.posterior_samples,
        )?;
        let markers = self.stochastic_markers(line)?;
        let points = self.interpretations.for_line(line);
        assembler.build_section(line, mode, &self.config.style, &markers, &points, selected)
    }

    /// Resolve a click on a `source` section
    pub fn resolve_click(
        &self,
        line: LineId,
        source: InversionSource,
        click_distance: f64,
        click_elevation: f64,
    ) -> SectionResult<ResolvedClick> {
        let loaded = self.loaded(source);
        ClickResolver::new(
            &loaded.grid,
            &loaded.data,
            &loaded.samples,
            self.config.interpretation.fiducial_tolerance,
        )
        .resolve(line, click_distance, click_elevation)
    }

    /// Resolve a click and append it as an interpreted point
    pub fn record_interpretation(
        &mut self,
        line: LineId,
        source: InversionSource,
        click_distance: f64,
        click_elevation: f64,
    ) -> SectionResult<(PointId, InterpretedPoint)> {
        let click = self.resolve_click(line, source, click_distance, click_elevation)?;
        let (id, point) = self.interpretations.record(&click, source);
        Ok((id, point.clone()))
    }

    pub fn remove_interpretation(&mut self, id: PointId) -> Option<InterpretedPoint> {
        self.interpretations.remove(id)
    }

    /// Attributes stamped onto points recorded from now on
    pub fn set_boundary(&mut self, template: BoundaryTemplate) {
        self.interpretations.set_template(template);
    }

    pub fn interpretations(&self) -> &InterpretationStore {
        &self.interpretations
    }

    pub fn interpretations_for_line(&self, line: LineId) -> Vec<(PointId, &InterpretedPoint)> {
        self.interpretations.for_line(line)
    }

    /// Write all points to `path`, or to the configured output path
    pub fn export_interpretations(&self, path: Option<&Path>) -> SectionResult<usize> {
        let path = path
            .or(self.config.interpretation.output_path.as_deref())
            .ok_or_else(|| SectionError::Config("no output path for interpreted points".to_string()))?;
        interp_export::export_csv(path, self.interpretations.iter().map(|(_, p)| p))
    }

    /// Append the points of an earlier export
    pub fn import_interpretations<P: AsRef<Path>>(&mut self, path: P) -> SectionResult<usize> {
        let points = interp_export::import_csv(path)?;
        Ok(self.interpretations.extend(points))
    }

    pub fn posterior_profile(&self, point_index: usize) -> SectionResult<PosteriorProfile> {
        PosteriorProfile::extract(&self.stochastic.data, point_index)
    }

    /// Posterior profile of the `marker`-th sample marker drawn on `line`
    pub fn posterior_profile_at_marker(&self, line: LineId, marker: usize) -> SectionResult<PosteriorProfile> {
        let markers = self.stochastic_markers(line)?;
        let record = markers
            .valid_records()
            .nth(marker)
            .ok_or_else(|| SectionError::SampleOutOfRange {
                index: marker,
                count: markers.valid_records().count(),
            })?;
        self.posterior_profile(record.point_index)
    }

    /// Overview map of the session's lines that the deterministic dataset
    /// lists, over the depth slice of `layer` (the configured layer when
    /// `None`) if the session has layer grids
    pub fn flight_line_map(&self, selected: Option<LineId>, layer: Option<usize>) -> SectionResult<FlightLineMap> {
        let known: HashSet<LineId> = self.deterministic.data.lines().iter().copied().collect();
        let lines: Vec<LineId> = self.lines().into_iter().filter(|l| known.contains(l)).collect();
        let params = MapParams {
            layer: layer.unwrap_or(self.config.map.layer),
            ..self.config.map.clone()
        };
        FlightLineMap::build(
            &self.deterministic.data,
            &self.stochastic.data,
            Some(&lines),
            selected,
            self.layer_grids.as_ref(),
            &params,
        )
    }

    /// Swap in a regridded source. Cached distances are discarded.
    pub fn replace_grid(&mut self, grid: SectionGrid) -> SectionGrid {
        let source = grid.source();
        log::info!("Replacing {} grid ({} lines)", source.short_name(), grid.len());
        let slot = match source {
            InversionSource::Deterministic => &mut self.deterministic.grid,
            InversionSource::Stochastic => &mut self.stochastic.grid,
        };
        let previous = std::mem::replace(slot, grid);
        self.distances
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        previous
    }
}

fn load_cached_grid(config: &SessionConfig, source: InversionSource) -> SectionResult<SectionGrid> {
    let source_config = config.source(source);
    let cache = SectionCache::new(source_config.cache_dir(source));
    let grid = cache.load_grid(source, &config.lines, &source_config.variables(source)?)?;

    let expected = source_config.resolution(source);
    if !grid.is_empty() && grid.resolution() != expected {
        log::warn!(
            "{} sections were gridded at {:?}, configuration expects {:?}",
            source.short_name(),
            grid.resolution(),
            expected
        );
    }
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::layer_grid::tests::two_layer_grids;
    use crate::core::section_grid::tests::three_column_parts;
    use crate::core::section_grid::{ColumnVariable, GridResolution, LineSection, RasterVariable};
    use crate::io::dataset::tests::two_line_dataset;
    use ndarray::{array, Array2};

    fn session() -> Session {
        let mut lci = SectionGrid::new(InversionSource::Deterministic, GridResolution::default());
        lci.insert(200101, LineSection::new(three_column_parts()).unwrap());
        let mut rj = SectionGrid::new(InversionSource::Stochastic, GridResolution::default());
        rj.insert(200101, LineSection::new(three_column_parts()).unwrap());
        Session::new(
            SessionConfig::default(),
            two_line_dataset(InversionSource::Deterministic),
            two_line_dataset(InversionSource::Stochastic),
            lci,
            rj,
        )
        .unwrap()
    }

    #[test]
    fn test_session_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Session>();
    }

    #[test]
    fn test_distance_cache_reused_and_invalidated() {
        let mut session = session();
        let first = session.distance_along_line(InversionSource::Stochastic, 200101).unwrap();
        let second = session.distance_along_line(InversionSource::Stochastic, 200101).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(session.cached_distance_count(), 1);

        let grid = session.grid(InversionSource::Deterministic).clone();
        session.replace_grid(grid);
        assert_eq!(session.cached_distance_count(), 0);
    }

    #[test]
    fn test_grids_must_match_sources() {
        let grid = SectionGrid::new(InversionSource::Stochastic, GridResolution::default());
        let result = Session::new(
            SessionConfig::default(),
            two_line_dataset(InversionSource::Deterministic),
            two_line_dataset(InversionSource::Stochastic),
            grid.clone(),
            grid,
        );
        assert!(matches!(result, Err(SectionError::InvalidInput(_))));
    }

    #[test]
    fn test_record_and_remove() {
        let mut session = session();
        let (id, point) = session
            .record_interpretation(200101, InversionSource::Deterministic, 9.0, 50.0)
            .unwrap();
        assert_eq!(point.depth, 45.0);
        assert_eq!(point.fiducial, Some(102.0));
        assert_eq!(session.interpretations_for_line(200101).len(), 1);

        assert!(session.remove_interpretation(id).is_some());
        assert!(session.interpretations().is_empty());
    }

    #[test]
    fn test_export_needs_a_path() {
        let session = session();
        assert!(matches!(
            session.export_interpretations(None),
            Err(SectionError::Config(_))
        ));
    }

    #[test]
    fn test_stochastic_only_lines_keep_their_markers() {
        let mut lci = SectionGrid::new(InversionSource::Deterministic, GridResolution::default());
        lci.insert(200101, LineSection::new(three_column_parts()).unwrap());

        // Line 200401 runs north along easting 500; only the RJ grid has it
        let p50 = Array2::from_elem((4, 3), 0.05);
        let north = three_column_parts()
            .with_column(ColumnVariable::Easting, array![500.0, 500.0, 500.0])
            .with_column(ColumnVariable::Northing, array![0.0, 10.0, 20.0])
            .with_raster(RasterVariable::ConductivityP50, p50.clone());
        let unlisted = three_column_parts().with_raster(RasterVariable::ConductivityP50, p50);
        let mut rj = SectionGrid::new(InversionSource::Stochastic, GridResolution::default());
        rj.insert(200401, LineSection::new(north).unwrap());
        rj.insert(912011, LineSection::new(unlisted).unwrap());

        let session = Session::new(
            SessionConfig::default(),
            two_line_dataset(InversionSource::Deterministic),
            two_line_dataset(InversionSource::Stochastic),
            lci,
            rj,
        )
        .unwrap();
        assert_eq!(session.lines(), vec![200101, 200401, 912011]);

        let none = HashSet::new();
        let layers = session
            .build_section(200401, SectionMode::StochasticP50, &none)
            .expect("rj-only line renders");
        assert_eq!(layers.sample_markers.len(), 1);
        assert_eq!(layers.sample_markers.x[0], 0.0);
        assert_eq!(layers.sample_markers.labels[0], "fiducial = 201");

        // Gridded, but the RJ dataset has no samples listed on it
        let layers = session
            .build_section(912011, SectionMode::StochasticP50, &none)
            .expect("unlisted line renders");
        assert!(layers.sample_markers.is_empty());

        assert!(matches!(
            session.build_section(200401, SectionMode::DeterministicGrid, &none),
            Err(SectionError::LineNotFound(200401))
        ));
    }

    #[test]
    fn test_map_only_traces_listed_session_lines() {
        let mut lci = SectionGrid::new(InversionSource::Deterministic, GridResolution::default());
        lci.insert(999999, LineSection::new(three_column_parts()).unwrap());
        let session = Session::new(
            SessionConfig::default(),
            two_line_dataset(InversionSource::Deterministic),
            two_line_dataset(InversionSource::Stochastic),
            lci,
            SectionGrid::new(InversionSource::Stochastic, GridResolution::default()),
        )
        .unwrap();

        assert_eq!(session.lines(), vec![999999]);
        let map = session.flight_line_map(None, None).unwrap();
        assert!(map.lines.is_empty());
        assert!(map.extent.is_some());
        assert!(map.background.is_none());
    }

    #[test]
    fn test_map_background_layer_choice() {
        let session = session().with_layer_grids(two_layer_grids());

        let map = session.flight_line_map(Some(200101), None).unwrap();
        assert_eq!(map.lines.len(), 1);
        assert_eq!(map.lines[0].highlight, crate::types::Highlight::Selected);
        assert_eq!(map.background.as_ref().unwrap().layer, 1);

        let deeper = session.flight_line_map(None, Some(2)).unwrap();
        assert_eq!(deeper.background.unwrap().z.dim(), (2, 3));

        assert!(matches!(
            session.flight_line_map(None, Some(5)),
            Err(SectionError::LayerNotFound(5))
        ));
    }
}
