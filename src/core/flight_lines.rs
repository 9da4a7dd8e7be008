use crate::core::layer_grid::{LayerGrids, MapBackground};
use crate::core::line_locator::LineLocator;
use crate::io::dataset::InversionData;
use crate::types::{Bounds, Highlight, LineId, SectionResult};
use serde::{Deserialize, Serialize};

/// Overview map settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapParams {
    /// Margin around the survey extent (m)
    pub buffer: f64,
    /// Model layer drawn as the background depth slice
    pub layer: usize,
    /// Background colour range in log10 S/m
    pub zmin: f64,
    pub zmax: f64,
}

impl Default for MapParams {
    fn default() -> Self {
        Self {
            buffer: 500.0,
            layer: 1,
            zmin: -2.0,
            zmax: 0.0,
        }
    }
}

/// Plan-view trace of one flight line, in acquisition order
#[derive(Debug, Clone, Serialize)]
pub struct FlightLine {
    pub line: LineId,
    pub easting: Vec<f64>,
    pub northing: Vec<f64>,
    pub highlight: Highlight,
}

impl FlightLine {
    pub fn len(&self) -> usize {
        self.easting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.easting.is_empty()
    }
}

/// Flight lines to draw on the overview map, with the selected line highlighted
#[derive(Debug, Clone, Serialize)]
pub struct FlightLineMap {
    pub lines: Vec<FlightLine>,
    /// Survey extent plus the buffer; `None` without any finite coordinate
    pub extent: Option<Bounds>,
    /// Conductivity depth slice drawn beneath the lines
    pub background: Option<MapBackground>,
}

impl FlightLineMap {
    /// Trace `lines` (every line in the table when `None`) through the
    /// samples of `traced`, framing the map on the samples of `framed`. With
    /// `layer_grids`, the slice of `params.layer` becomes the background.
    pub fn build(
        traced: &InversionData,
        framed: &InversionData,
        lines: Option<&[LineId]>,
        selected: Option<LineId>,
        layer_grids: Option<&LayerGrids>,
        params: &MapParams,
    ) -> SectionResult<Self> {
        let lines = lines.unwrap_or_else(|| traced.lines());
        let coords = traced.coordinates();

        let mut polylines = Vec::with_capacity(lines.len());
        for &line in lines {
            let (easting, northing): (Vec<f64>, Vec<f64>) = LineLocator::indices_for_line(line, traced)?
                .into_iter()
                .map(|i| (coords[[i, 0]], coords[[i, 1]]))
                .filter(|(x, y)| x.is_finite() && y.is_finite())
                .unzip();

            polylines.push(FlightLine {
                line,
                easting,
                northing,
                highlight: if selected == Some(line) {
                    Highlight::Selected
                } else {
                    Highlight::Default
                },
            });
        }

        Ok(Self {
            lines: polylines,
            extent: framed.bounds().map(|b| b.expanded(params.buffer)),
            background: layer_grids
                .map(|grids| grids.depth_slice(params.layer, params.zmin, params.zmax))
                .transpose()?,
        })
    }

    pub fn get(&self, line: LineId) -> Option<&FlightLine> {
        self.lines.iter().find(|l| l.line == line)
    }
}
