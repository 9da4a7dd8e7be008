//! Plan-view conductivity depth slices of the deterministic inversion, drawn
//! behind the flight lines on the overview map.

use crate::types::{Bounds, SectionError, SectionResult};
use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Conductivity grids, one per model layer, sharing one extent.
///
/// Rows run north to south and columns west to east, so row 0 lies on
/// `bounds.max_northing`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerGrids {
    bounds: Bounds,
    layers: BTreeMap<usize, Array2<f64>>,
}

impl LayerGrids {
    pub fn new(bounds: Bounds) -> SectionResult<Self> {
        check_bounds(&bounds)?;
        Ok(Self {
            bounds,
            layers: BTreeMap::new(),
        })
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Add or replace the conductivity slice (S/m) of `layer`. Every slice
    /// must have the shape of the first one.
    pub fn insert(&mut self, layer: usize, conductivity: Array2<f64>) -> SectionResult<Option<Array2<f64>>> {
        let (rows, cols) = conductivity.dim();
        if rows == 0 || cols == 0 {
            return Err(SectionError::ShapeMismatch(format!("layer {} slice is empty", layer)));
        }
        let others = self
            .layers
            .iter()
            .find(|(n, _)| **n != layer)
            .map(|(_, slice)| slice.dim());
        if let Some(shape) = others {
            if shape != (rows, cols) {
                return Err(SectionError::ShapeMismatch(format!(
                    "layer {} slice is {}x{}, other layers are {}x{}",
                    layer, rows, cols, shape.0, shape.1
                )));
            }
        }
        Ok(self.layers.insert(layer, conductivity))
    }

    pub fn with_layer(mut self, layer: usize, conductivity: Array2<f64>) -> SectionResult<Self> {
        self.insert(layer, conductivity)?;
        Ok(self)
    }

    pub fn layer(&self, layer: usize) -> SectionResult<ArrayView2<'_, f64>> {
        self.layers
            .get(&layer)
            .map(|slice| slice.view())
            .ok_or(SectionError::LayerNotFound(layer))
    }

    pub fn layer_numbers(&self) -> impl Iterator<Item = usize> + '_ {
        self.layers.keys().copied()
    }

    /// (rows, columns) shared by every slice
    pub fn shape(&self) -> Option<(usize, usize)> {
        self.layers.values().next().map(|slice| slice.dim())
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Re-check a deserialized set of grids
    pub(crate) fn validate(&self) -> SectionResult<()> {
        check_bounds(&self.bounds)?;
        let mut shapes = self.layers.iter().map(|(layer, slice)| (*layer, slice.dim()));
        if let Some((_, first)) = shapes.next() {
            if first.0 == 0 || first.1 == 0 {
                return Err(SectionError::ShapeMismatch("layer slices are empty".to_string()));
            }
            if let Some((layer, shape)) = shapes.find(|(_, shape)| *shape != first) {
                return Err(SectionError::ShapeMismatch(format!(
                    "layer {} slice is {}x{}, other layers are {}x{}",
                    layer, shape.0, shape.1, first.0, first.1
                )));
            }
        }
        Ok(())
    }

    /// log10 conductivity of one layer with cell-centre coordinates, ready to
    /// draw as a heatmap between `zmin` and `zmax`
    pub fn depth_slice(&self, layer: usize, zmin: f64, zmax: f64) -> SectionResult<MapBackground> {
        let slice = self.layer(layer)?;
        let (rows, cols) = slice.dim();
        let b = &self.bounds;

        Ok(MapBackground {
            layer,
            z: slice.mapv(|c| if c > 0.0 && c.is_finite() { c.log10() } else { f64::NAN }),
            x: Array1::linspace(b.min_easting, b.max_easting, cols),
            y: Array1::linspace(b.max_northing, b.min_northing, rows),
            zmin,
            zmax,
        })
    }
}

fn check_bounds(bounds: &Bounds) -> SectionResult<()> {
    let finite = [
        bounds.min_easting,
        bounds.max_easting,
        bounds.min_northing,
        bounds.max_northing,
    ]
    .iter()
    .all(|v| v.is_finite());
    if !finite || bounds.min_easting > bounds.max_easting || bounds.min_northing > bounds.max_northing {
        return Err(SectionError::InvalidInput(format!("invalid layer grid bounds {:?}", bounds)));
    }
    Ok(())
}

/// Heatmap layer behind the flight lines
#[derive(Debug, Clone, Serialize)]
pub struct MapBackground {
    pub layer: usize,
    /// log10 conductivity; NaN where the slice has no positive value
    pub z: Array2<f64>,
    /// Easting of each column
    pub x: Array1<f64>,
    /// Northing of each row, north first
    pub y: Array1<f64>,
    pub zmin: f64,
    pub zmax: f64,
}
