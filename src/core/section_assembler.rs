//! Renderable cross-section layers for one line and display mode.
//!
//! A section is drawn in a fixed order: the background raster, the ground
//! surface, the stochastic sample markers and finally the interpreted points.
//! The residual trace and colour bar belong to the panels around it.

use crate::core::interpretation::{InterpretedPoint, PointId};
use crate::core::projector::DistanceAlongLine;
use crate::core::section_grid::{Axis, ColumnVariable, LineSection, RasterVariable, SectionGrid};
use crate::core::spatial_index::SpatialIndex;
use crate::types::{Fiducial, Highlight, InversionSource, LineId, SectionError, SectionResult};
use ndarray::{Array1, Array2, ArrayView2, Zip};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

/// Cross-section display modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SectionMode {
    /// log10 conductivity of the deterministic inversion
    #[serde(rename = "lci")]
    DeterministicGrid,
    /// log10 median conductivity of the stochastic inversion
    #[serde(rename = "rj-p50")]
    StochasticP50,
    /// Confidence derived from the p10/p90 conductivity spread
    #[serde(rename = "rj-conf")]
    StochasticConfidence,
    /// Layer-interface probability
    #[serde(rename = "rj-lpp")]
    StochasticLayerProbability,
}

impl SectionMode {
    pub const ALL: [SectionMode; 4] = [
        SectionMode::DeterministicGrid,
        SectionMode::StochasticP50,
        SectionMode::StochasticConfidence,
        SectionMode::StochasticLayerProbability,
    ];

    pub fn selector(&self) -> &'static str {
        match self {
            SectionMode::DeterministicGrid => "lci",
            SectionMode::StochasticP50 => "rj-p50",
            SectionMode::StochasticConfidence => "rj-conf",
            SectionMode::StochasticLayerProbability => "rj-lpp",
        }
    }

    /// Inversion whose grid backs the mode
    pub fn source(&self) -> InversionSource {
        match self {
            SectionMode::DeterministicGrid => InversionSource::Deterministic,
            _ => InversionSource::Stochastic,
        }
    }

    /// Rasters the background layer is computed from
    pub fn rasters(&self) -> &'static [RasterVariable] {
        match self {
            SectionMode::DeterministicGrid => &[RasterVariable::Conductivity],
            SectionMode::StochasticP50 => &[RasterVariable::ConductivityP50],
            SectionMode::StochasticConfidence => {
                &[RasterVariable::ConductivityP10, RasterVariable::ConductivityP90]
            }
            SectionMode::StochasticLayerProbability => &[RasterVariable::InterfaceDepthHistogram],
        }
    }

    /// Modes coloured by log10 conductivity
    pub fn is_conductivity(&self) -> bool {
        matches!(self, SectionMode::DeterministicGrid | SectionMode::StochasticP50)
    }
}

impl FromStr for SectionMode {
    type Err = SectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SectionMode::ALL
            .iter()
            .copied()
            .find(|m| m.selector() == s)
            .ok_or_else(|| SectionError::InvalidInput(format!("unknown section mode '{}'", s)))
    }
}

impl std::fmt::Display for SectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.selector())
    }
}

/// Colour scaling and annotation placement for rendered sections
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleParams {
    /// Conductivity (S/m) at the bottom of the colour scale
    pub vmin: f64,
    /// Conductivity (S/m) at the top of the colour scale
    pub vmax: f64,
    pub confidence_lower: f64,
    pub confidence_upper: f64,
    /// Height of the sample markers above the highest ground point (m)
    pub marker_offset: f64,
    /// Largest distance between an interpreted point and a section column (m)
    pub interpretation_tolerance: f64,
    pub colorbar_ticks: usize,
}

impl Default for StyleParams {
    fn default() -> Self {
        Self {
            vmin: 0.01,
            vmax: 1.0,
            confidence_lower: 0.01,
            confidence_upper: 0.99,
            marker_offset: 20.0,
            interpretation_tolerance: 100.0,
            colorbar_ticks: 5,
        }
    }
}

impl StyleParams {
    pub fn validate(&self) -> SectionResult<()> {
        if !(self.vmin > 0.0 && self.vmax > self.vmin) {
            return Err(SectionError::Config(format!(
                "colour range needs 0 < vmin < vmax, got {} .. {}",
                self.vmin, self.vmax
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_lower)
            || !(0.0..=1.0).contains(&self.confidence_upper)
            || self.confidence_lower > self.confidence_upper
        {
            return Err(SectionError::Config(format!(
                "confidence band must lie within [0, 1], got {} .. {}",
                self.confidence_lower, self.confidence_upper
            )));
        }
        if self.interpretation_tolerance < 0.0 {
            return Err(SectionError::Config(
                "interpretation_tolerance must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Confidence in the conductivity of each cell: the p10/p90 ratio clipped to
/// `[lower, upper]`. A ratio of 1 means no spread; it falls as the log spread
/// between the percentiles widens. Cells with a missing or non-positive
/// percentile are NaN.
pub fn confidence(
    p10: ArrayView2<'_, f64>,
    p90: ArrayView2<'_, f64>,
    lower: f64,
    upper: f64,
) -> SectionResult<Array2<f64>> {
    if p10.dim() != p90.dim() {
        return Err(SectionError::ShapeMismatch(format!(
            "p10 raster {:?} and p90 raster {:?} differ",
            p10.dim(),
            p90.dim()
        )));
    }

    let cell = |lo: &f64, hi: &f64| {
        if *lo > 0.0 && *hi > 0.0 && lo.is_finite() && hi.is_finite() {
            (lo / hi).clamp(lower, upper)
        } else {
            f64::NAN
        }
    };

    #[cfg(feature = "parallel")]
    let out = Zip::from(&p10).and(&p90).par_map_collect(cell);

    #[cfg(not(feature = "parallel"))]
    let out = Zip::from(&p10).and(&p90).map_collect(cell);

    Ok(out)
}

fn log10_positive(raster: ArrayView2<'_, f64>) -> Array2<f64> {
    raster.mapv(|v| if v > 0.0 { v.log10() } else { f64::NAN })
}

fn fiducial_label(fiducial: Option<Fiducial>) -> String {
    match fiducial {
        Some(fid) => format!("fiducial = {}", fid),
        None => "fiducial = n/a".to_string(),
    }
}

/// Heatmap behind everything else
#[derive(Debug, Clone, Serialize)]
pub struct BackgroundRaster {
    /// Values on (elevation, distance)
    pub z: Array2<f64>,
    pub x: Array1<f64>,
    pub y: Array1<f64>,
    pub zmin: f64,
    pub zmax: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Trace {
    pub x: Array1<f64>,
    pub y: Array1<f64>,
}

/// Point annotations with hover labels
#[derive(Debug, Clone, Default, Serialize)]
pub struct MarkerLayer {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub labels: Vec<String>,
}

impl MarkerLayer {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    fn push(&mut self, x: f64, y: f64, label: String) {
        self.x.push(x);
        self.y.push(y);
        self.labels.push(label);
    }
}

/// Interpreted points snapped onto the section
#[derive(Debug, Clone, Default, Serialize)]
pub struct InterpretedLayer {
    pub ids: Vec<PointId>,
    pub markers: MarkerLayer,
    pub highlights: Vec<Highlight>,
}

impl InterpretedLayer {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColourBar {
    pub title: String,
    /// Tick positions in log10 conductivity
    pub tick_values: Vec<f64>,
    pub tick_labels: Vec<String>,
}

impl ColourBar {
    /// Ticks evenly spaced in log10 between vmin and vmax, labelled in S/m
    pub fn conductivity(style: &StyleParams) -> Self {
        let ticks = Array1::linspace(style.vmin.log10(), style.vmax.log10(), style.colorbar_ticks);
        let tick_labels = ticks
            .iter()
            .map(|t| format!("{}", (10f64.powf(*t) * 1000.0).round() / 1000.0))
            .collect();
        Self {
            title: "conductivity".to_string(),
            tick_values: ticks.to_vec(),
            tick_labels,
        }
    }
}

/// Layers of the section panel, bottom first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LayerKind {
    Background,
    Surface,
    SampleMarkers,
    InterpretedPoints,
}

/// Everything needed to draw one line in one display mode
#[derive(Debug, Clone, Serialize)]
pub struct SectionLayers {
    pub line: LineId,
    pub mode: SectionMode,
    pub background: BackgroundRaster,
    pub surface: Trace,
    pub sample_markers: MarkerLayer,
    pub interpreted: InterpretedLayer,
    /// Residual panel above the section; `None` when not gridded
    pub residual: Option<Trace>,
    pub colour_bar: Option<ColourBar>,
}

impl SectionLayers {
    pub fn draw_order(&self) -> [LayerKind; 4] {
        [
            LayerKind::Background,
            LayerKind::Surface,
            LayerKind::SampleMarkers,
            LayerKind::InterpretedPoints,
        ]
    }
}

/// Builds section layers from the deterministic and stochastic grids
pub struct SectionAssembler<'a> {
    deterministic: &'a SectionGrid,
    stochastic: &'a SectionGrid,
    posterior_samples: Option<f64>,
}

impl<'a> SectionAssembler<'a> {
    /// `posterior_samples` is the ensemble size of the stochastic inversion,
    /// needed only for the layer-probability mode.
    pub fn new(
        deterministic: &'a SectionGrid,
        stochastic: &'a SectionGrid,
        posterior_samples: Option<f64>,
    ) -> SectionResult<Self> {
        for (grid, expected) in [
            (deterministic, InversionSource::Deterministic),
            (stochastic, InversionSource::Stochastic),
        ] {
            if grid.source() != expected {
                return Err(SectionError::InvalidInput(format!(
                    "expected a {} grid, got {}",
                    expected.short_name(),
                    grid.source().short_name()
                )));
            }
        }
        Ok(Self {
            deterministic,
            stochastic,
            posterior_samples,
        })
    }

    pub fn grid(&self, source: InversionSource) -> &'a SectionGrid {
        match source {
            InversionSource::Deterministic => self.deterministic,
            InversionSource::Stochastic => self.stochastic,
        }
    }

    /// Assemble the layers of `line`.
    ///
    /// `markers` holds the stochastic samples on the shared along-line frame;
    /// `points` the interpretation rows to overlay, and `selected` the ids
    /// drawn highlighted. Markers or points that do not land on the section
    /// leave their layers empty.
    pub fn build_section(
        &self,
        line: LineId,
        mode: SectionMode,
        style: &StyleParams,
        markers: &DistanceAlongLine,
        points: &[(PointId, &InterpretedPoint)],
        selected: &HashSet<PointId>,
    ) -> SectionResult<SectionLayers> {
        let grid = self.grid(mode.source());
        let section = grid.line(line)?;

        let background = self.background(line, mode, style)?;
        let surface_elevation = section.mandatory_column(ColumnVariable::Elevation);
        let surface = Trace {
            x: section.axis(Axis::Distance).to_owned(),
            y: surface_elevation.to_owned(),
        };

        let surface_top = surface_elevation
            .iter()
            .copied()
            .filter(|e| e.is_finite())
            .reduce(f64::max);

        let mut sample_markers = MarkerLayer::default();
        if let Some(top) = surface_top {
            for record in markers.valid_records() {
                sample_markers.push(
                    record.distance_along_line,
                    top + style.marker_offset,
                    fiducial_label(Some(record.fiducial)),
                );
            }
        }

        let interpreted = interpreted_layer(line, section, points, selected, style)?;

        let residual = match mode.source() {
            InversionSource::Deterministic => section
                .column(ColumnVariable::DataResidual)
                .map(|r| r.to_owned()),
            InversionSource::Stochastic => section
                .column(ColumnVariable::MisfitLowest)
                .map(|m| m.mapv(|v| if v > 0.0 { v.log10() } else { f64::NAN })),
        }
        .map(|y| Trace {
            x: surface.x.clone(),
            y,
        });

        let colour_bar = mode.is_conductivity().then(|| ColourBar::conductivity(style));

        log::debug!(
            "Section {} [{}]: {} markers, {} interpreted points",
            line,
            mode,
            sample_markers.len(),
            interpreted.len()
        );

        Ok(SectionLayers {
            line,
            mode,
            background,
            surface,
            sample_markers,
            interpreted,
            residual,
            colour_bar,
        })
    }

    fn background(&self, line: LineId, mode: SectionMode, style: &StyleParams) -> SectionResult<BackgroundRaster> {
        let grid = self.grid(mode.source());
        let (z, zmin, zmax) = match mode {
            SectionMode::DeterministicGrid | SectionMode::StochasticP50 => {
                let raster = grid.variable(line, mode.rasters()[0])?;
                (log10_positive(raster), style.vmin.log10(), style.vmax.log10())
            }
            SectionMode::StochasticConfidence => {
                let p10 = grid.variable(line, RasterVariable::ConductivityP10)?;
                let p90 = grid.variable(line, RasterVariable::ConductivityP90)?;
                let conf = confidence(p10, p90, style.confidence_lower, style.confidence_upper)?;
                (conf, 0.1, 0.9)
            }
            SectionMode::StochasticLayerProbability => {
                let histogram = grid.variable(line, RasterVariable::InterfaceDepthHistogram)?;
                let n = self
                    .posterior_samples
                    .filter(|n| *n > 0.0)
                    .ok_or_else(|| SectionError::MissingVariable("log10conductivity_histogram".to_string()))?;
                (histogram.mapv(|count| count / n), 0.01, 0.7)
            }
        };

        Ok(BackgroundRaster {
            z,
            x: grid.axis(line, Axis::Distance)?.to_owned(),
            y: grid.axis(line, Axis::Elevation)?.to_owned(),
            zmin,
            zmax,
        })
    }
}

/// Snap the points of `line` onto the nearest section column within tolerance
fn interpreted_layer(
    line: LineId,
    section: &LineSection,
    points: &[(PointId, &InterpretedPoint)],
    selected: &HashSet<PointId>,
    style: &StyleParams,
) -> SectionResult<InterpretedLayer> {
    let mut layer = InterpretedLayer::default();
    let on_line: Vec<&(PointId, &InterpretedPoint)> = points.iter().filter(|(_, p)| p.line == line).collect();
    if on_line.is_empty() {
        return Ok(layer);
    }

    let columns = match SpatialIndex::new(section.column_coordinates().view()) {
        Ok(index) => index,
        Err(SectionError::EmptyReference) => return Ok(layer),
        Err(e) => return Err(e),
    };
    let distances = section.axis(Axis::Distance);

    for (id, point) in on_line {
        if let Some(hit) = columns.nearest_one(point.x, point.y, style.interpretation_tolerance) {
            layer.ids.push(*id);
            layer
                .markers
                .push(distances[hit.index], point.elevation, fiducial_label(point.fiducial));
            layer.highlights.push(if selected.contains(id) {
                Highlight::Selected
            } else {
                Highlight::Default
            });
        }
    }
    Ok(layer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::interpretation::tests::click;
    use crate::core::interpretation::{BoundaryTemplate, InterpretationStore};
    use crate::core::projector::{AlongLineProjector, ProjectionParams};
    use crate::core::section_grid::tests::three_column_parts;
    use crate::core::section_grid::GridResolution;
    use crate::io::dataset::tests::two_line_dataset;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn grids() -> (SectionGrid, SectionGrid) {
        let mut lci = SectionGrid::new(InversionSource::Deterministic, GridResolution::default());
        lci.insert(200101, LineSection::new(three_column_parts()).unwrap());

        let parts = three_column_parts()
            .with_raster(RasterVariable::ConductivityP10, Array2::from_elem((4, 3), 0.05))
            .with_raster(RasterVariable::ConductivityP50, Array2::from_elem((4, 3), 0.1))
            .with_raster(RasterVariable::ConductivityP90, Array2::from_elem((4, 3), 0.5))
            .with_raster(RasterVariable::InterfaceDepthHistogram, Array2::from_elem((4, 3), 250.0))
            .with_column(ColumnVariable::MisfitLowest, array![10.0, 100.0, 1.0]);
        let mut rj = SectionGrid::new(
            InversionSource::Stochastic,
            GridResolution {
                horizontal: 50.0,
                vertical: 2.0,
            },
        );
        rj.insert(200101, LineSection::new(parts).unwrap());
        (lci, rj)
    }

    fn markers(lci: &SectionGrid) -> DistanceAlongLine {
        let data = two_line_dataset(InversionSource::Stochastic);
        let projector =
            AlongLineProjector::from_section(lci.line(200101).unwrap(), &ProjectionParams::default()).unwrap();
        DistanceAlongLine::build(200101, &data, &projector).unwrap()
    }

    #[test]
    fn test_confidence_clipped_and_monotonic() {
        let p10 = array![[1.0, 1.0, 1.0, 1.0]];
        let p90 = array![[1.0, 2.0, 10.0, 1e6]];
        let conf = confidence(p10.view(), p90.view(), 0.01, 0.99).unwrap();

        assert_eq!(conf[[0, 0]], 0.99);
        assert_relative_eq!(conf[[0, 1]], 0.5);
        assert_relative_eq!(conf[[0, 2]], 0.1);
        assert_eq!(conf[[0, 3]], 0.01);
        for w in conf.row(0).to_vec().windows(2) {
            assert!(w[1] <= w[0]);
        }
    }

    #[test]
    fn test_confidence_missing_percentiles_are_nan() {
        let p10 = array![[f64::NAN, 0.0, 0.2]];
        let p90 = array![[1.0, 1.0, -1.0]];
        let conf = confidence(p10.view(), p90.view(), 0.01, 0.99).unwrap();
        assert!(conf.iter().all(|c| c.is_nan()));

        let short = array![[1.0, 1.0]];
        assert!(confidence(p10.view(), short.view(), 0.01, 0.99).is_err());
    }

    #[test]
    fn test_mode_selectors() {
        for mode in SectionMode::ALL {
            assert_eq!(mode.selector().parse::<SectionMode>().unwrap(), mode);
        }
        assert_eq!(SectionMode::DeterministicGrid.source(), InversionSource::Deterministic);
        assert_eq!(SectionMode::StochasticConfidence.rasters().len(), 2);
        assert!("rj-p95".parse::<SectionMode>().is_err());
    }

    #[test]
    fn test_deterministic_section_layers() {
        let (lci, rj) = grids();
        let assembler = SectionAssembler::new(&lci, &rj, None).unwrap();
        let style = StyleParams::default();

        let mut store = InterpretationStore::new(BoundaryTemplate::default());
        let (kept, _) = store.record(&click(200101, 1, 10.0), InversionSource::Deterministic);
        let (far, _) = store.record(&click(200101, 2, 900.0), InversionSource::Deterministic);
        store.record(&click(200401, 0, 0.0), InversionSource::Deterministic);
        let selected: HashSet<PointId> = [kept, far].into_iter().collect();

        let layers = assembler
            .build_section(
                200101,
                SectionMode::DeterministicGrid,
                &style,
                &markers(&lci),
                &store.iter().collect::<Vec<_>>(),
                &selected,
            )
            .unwrap();

        assert_relative_eq!(layers.background.z[[0, 0]], -1.0);
        assert_relative_eq!(layers.background.zmin, -2.0);
        assert_relative_eq!(layers.background.zmax, 0.0);
        assert_eq!(layers.surface.y.to_vec(), vec![100.0, 95.0, 90.0]);

        assert_eq!(layers.sample_markers.x, vec![0.0, 10.0, 20.0]);
        assert!(layers.sample_markers.y.iter().all(|&y| y == 120.0));
        assert_eq!(layers.sample_markers.labels[1], "fiducial = 102");

        assert_eq!(layers.interpreted.ids, vec![kept]);
        assert_eq!(layers.interpreted.markers.x, vec![10.0]);
        assert_eq!(layers.interpreted.markers.y, vec![50.3]);
        assert_eq!(layers.interpreted.highlights, vec![Highlight::Selected]);

        assert_eq!(layers.residual.as_ref().unwrap().y.to_vec(), vec![1.2, 0.9, 1.1]);
        assert_eq!(layers.draw_order()[0], LayerKind::Background);
        assert_eq!(layers.draw_order()[3], LayerKind::InterpretedPoints);
    }

    #[test]
    fn test_colour_bar_ticks() {
        let bar = ColourBar::conductivity(&StyleParams::default());
        assert_eq!(bar.tick_values.len(), 5);
        assert_relative_eq!(bar.tick_values[0], -2.0);
        assert_relative_eq!(bar.tick_values[2], -1.0);
        assert_eq!(bar.tick_labels, vec!["0.01", "0.032", "0.1", "0.316", "1"]);
    }

    #[test]
    fn test_stochastic_modes() {
        let (lci, rj) = grids();
        let assembler = SectionAssembler::new(&lci, &rj, Some(1000.0)).unwrap();
        let style = StyleParams::default();
        let empty = DistanceAlongLine::empty(200101, InversionSource::Stochastic);
        let none = HashSet::new();

        let conf = assembler
            .build_section(200101, SectionMode::StochasticConfidence, &style, &empty, &[], &none)
            .unwrap();
        assert_relative_eq!(conf.background.z[[2, 1]], 0.1);
        assert_eq!((conf.background.zmin, conf.background.zmax), (0.1, 0.9));
        assert!(conf.colour_bar.is_none());
        assert!(conf.sample_markers.is_empty());
        assert!(conf.interpreted.is_empty());

        let lpp = assembler
            .build_section(200101, SectionMode::StochasticLayerProbability, &style, &empty, &[], &none)
            .unwrap();
        assert_relative_eq!(lpp.background.z[[0, 0]], 0.25);

        let p50 = assembler
            .build_section(200101, SectionMode::StochasticP50, &style, &empty, &[], &none)
            .unwrap();
        let misfit = p50.residual.unwrap().y;
        for (got, want) in misfit.iter().zip([1.0, 2.0, 0.0]) {
            assert_relative_eq!(*got, want, epsilon = 1e-12);
        }
        assert!(p50.colour_bar.is_some());
    }

    #[test]
    fn test_layer_probability_needs_sample_count() {
        let (lci, rj) = grids();
        let assembler = SectionAssembler::new(&lci, &rj, None).unwrap();
        let empty = DistanceAlongLine::empty(200101, InversionSource::Stochastic);
        let result = assembler.build_section(
            200101,
            SectionMode::StochasticLayerProbability,
            &StyleParams::default(),
            &empty,
            &[],
            &HashSet::new(),
        );
        assert!(matches!(result, Err(SectionError::MissingVariable(_))));
    }

    #[test]
    fn test_missing_raster_is_reported() {
        let (lci, _) = grids();
        let mut rj = SectionGrid::new(InversionSource::Stochastic, GridResolution::default());
        rj.insert(200101, LineSection::new(three_column_parts()).unwrap());
        let assembler = SectionAssembler::new(&lci, &rj, None).unwrap();

        let err = assembler
            .build_section(
                200101,
                SectionMode::StochasticP50,
                &StyleParams::default(),
                &DistanceAlongLine::empty(200101, InversionSource::Stochastic),
                &[],
                &HashSet::new(),
            )
            .unwrap_err();
        assert!(matches!(err, SectionError::VariableNotLoaded { .. }));
        assert!(err.is_user_facing());
    }

    #[test]
    fn test_grid_sources_checked() {
        let (lci, rj) = grids();
        assert!(SectionAssembler::new(&rj, &lci, None).is_err());
    }
}
