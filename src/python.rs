//! Python bindings: a session wrapper answering UI requests with dicts of
//! numpy arrays.

use crate::config::SessionConfig;
use crate::core::section_assembler::SectionMode;
use crate::core::spatial_index::nearest_neighbours as nearest_neighbours_impl;
use crate::io::dataset::{InversionData, SampleColumns};
use crate::session::Session;
use crate::types::{
    DatasetVariable, Highlight, InversionSource, LineId, SectionError, VariableArray, VariableKind,
};
use ndarray::{Array, Array1, ArrayD, Dimension};
use numpy::{PyReadonlyArray1, PyReadonlyArray2, PyReadonlyArrayDyn, ToPyArray};
use pyo3::exceptions::{PyKeyError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};
use std::collections::HashSet;
use std::path::PathBuf;

impl From<SectionError> for PyErr {
    fn from(err: SectionError) -> PyErr {
        match err {
            SectionError::LineNotFound(_)
            | SectionError::LayerNotFound(_)
            | SectionError::VariableNotLoaded { .. }
            | SectionError::UnknownVariable(_)
            | SectionError::MissingVariable(_) => PyKeyError::new_err(err.to_string()),
            SectionError::Io(_) | SectionError::Cache(_) | SectionError::Csv(_) => {
                PyRuntimeError::new_err(err.to_string())
            }
            _ => PyValueError::new_err(err.to_string()),
        }
    }
}

/// Keys of a dataset dict that are not inversion variables
const SAMPLE_KEYS: [&str; 7] = ["name", "fiducial", "easting", "northing", "elevation", "line", "line_table"];

fn into_dim<D: Dimension>(array: ArrayD<f64>, key: &str) -> PyResult<Array<f64, D>> {
    array
        .into_dimensionality::<D>()
        .map_err(|e| PyValueError::new_err(format!("'{}': {}", key, e)))
}

/// Build a dataset from a dict of numpy arrays keyed by container variable name
fn dataset_from_dict(source: InversionSource, dict: &PyDict) -> PyResult<InversionData> {
    let name: String = match dict.get_item("name")? {
        Some(value) => value.extract()?,
        None => source.to_string(),
    };
    let required = |key: &str| -> PyResult<&PyAny> {
        dict.get_item(key)?
            .ok_or_else(|| PyKeyError::new_err(format!("dataset has no '{}' array", key)))
    };
    let column = |key: &str| -> PyResult<Array1<f64>> {
        let values: PyReadonlyArray1<f64> = required(key)?.extract()?;
        Ok(values.as_array().to_owned())
    };

    let line: PyReadonlyArray1<LineId> = required("line")?.extract()?;
    let samples = SampleColumns {
        fiducial: column("fiducial")?,
        easting: column("easting")?,
        northing: column("northing")?,
        elevation: column("elevation")?,
        line: line.as_array().to_owned(),
    };

    let mut data = InversionData::new(name, source, samples)?;
    if let Some(table) = dict.get_item("line_table")? {
        data = data.with_line_table(table.extract::<Vec<LineId>>()?)?;
    }

    for (key, value) in dict.iter() {
        let key: String = key.extract()?;
        if SAMPLE_KEYS.contains(&key.as_str()) {
            continue;
        }
        let variable: DatasetVariable = key.parse()?;
        let array = value.extract::<PyReadonlyArrayDyn<f64>>()?.as_array().to_owned();
        let values = match variable.kind() {
            VariableKind::Scalar => VariableArray::Scalar(into_dim(array, &key)?),
            VariableKind::Axis => VariableArray::Axis(into_dim(array, &key)?),
            VariableKind::Profile => VariableArray::Profile(into_dim(array, &key)?),
            VariableKind::Histogram => VariableArray::Histogram(into_dim(array, &key)?),
        };
        data.insert_variable(variable, values)?;
    }
    Ok(data)
}

/// Interpretation session over cached sections
#[pyclass(name = "Session")]
struct PySession {
    inner: Session,
}

#[pymethods]
impl PySession {
    #[new]
    #[pyo3(signature = (deterministic, stochastic, config_path = None))]
    fn new(deterministic: &PyDict, stochastic: &PyDict, config_path: Option<String>) -> PyResult<Self> {
        let config = match config_path {
            Some(path) => SessionConfig::from_toml_file(path)?,
            None => SessionConfig::default(),
        };
        let deterministic = dataset_from_dict(InversionSource::Deterministic, deterministic)?;
        let stochastic = dataset_from_dict(InversionSource::Stochastic, stochastic)?;
        Ok(Self {
            inner: Session::open(config, deterministic, stochastic)?,
        })
    }

    fn lines(&self) -> Vec<LineId> {
        self.inner.lines()
    }

    #[pyo3(signature = (line, mode, selected = None))]
    fn build_section(
        &self,
        py: Python,
        line: LineId,
        mode: &str,
        selected: Option<Vec<u64>>,
    ) -> PyResult<PyObject> {
        let mode: SectionMode = mode.parse()?;
        let selected: HashSet<u64> = selected.unwrap_or_default().into_iter().collect();
        let layers = self.inner.build_section(line, mode, &selected)?;

        let result = PyDict::new(py);
        result.set_item("z", layers.background.z.to_pyarray(py))?;
        result.set_item("x", layers.background.x.to_pyarray(py))?;
        result.set_item("y", layers.background.y.to_pyarray(py))?;
        result.set_item("zmin", layers.background.zmin)?;
        result.set_item("zmax", layers.background.zmax)?;
        result.set_item("surface_x", layers.surface.x.to_pyarray(py))?;
        result.set_item("surface_y", layers.surface.y.to_pyarray(py))?;
        result.set_item("marker_x", layers.sample_markers.x.to_pyarray(py))?;
        result.set_item("marker_y", layers.sample_markers.y.to_pyarray(py))?;
        result.set_item("marker_labels", layers.sample_markers.labels)?;
        result.set_item("interp_ids", layers.interpreted.ids)?;
        result.set_item("interp_x", layers.interpreted.markers.x.to_pyarray(py))?;
        result.set_item("interp_y", layers.interpreted.markers.y.to_pyarray(py))?;
        result.set_item("interp_labels", layers.interpreted.markers.labels)?;
        let highlighted: Vec<bool> = layers
            .interpreted
            .highlights
            .iter()
            .map(|h| *h == Highlight::Selected)
            .collect();
        result.set_item("interp_selected", highlighted)?;
        if let Some(residual) = layers.residual {
            result.set_item("residual_x", residual.x.to_pyarray(py))?;
            result.set_item("residual_y", residual.y.to_pyarray(py))?;
        }
        if let Some(bar) = layers.colour_bar {
            result.set_item("tickvals", bar.tick_values)?;
            result.set_item("ticktext", bar.tick_labels)?;
        }
        Ok(result.into())
    }

    fn resolve_click(
        &self,
        py: Python,
        line: LineId,
        source: &str,
        distance: f64,
        elevation: f64,
    ) -> PyResult<PyObject> {
        let click = self.inner.resolve_click(line, source.parse()?, distance, elevation)?;
        let result = PyDict::new(py);
        result.set_item("line", click.line)?;
        result.set_item("column_index", click.column_index)?;
        result.set_item("distance_along_line", click.distance_along_line)?;
        result.set_item("sample_index", click.sample_index)?;
        result.set_item("fiducial", click.fiducial)?;
        result.set_item("easting", click.easting)?;
        result.set_item("northing", click.northing)?;
        result.set_item("elevation", click.elevation)?;
        result.set_item("depth", click.depth)?;
        Ok(result.into())
    }

    fn record_interpretation(&mut self, line: LineId, source: &str, distance: f64, elevation: f64) -> PyResult<u64> {
        let (id, _) = self
            .inner
            .record_interpretation(line, source.parse()?, distance, elevation)?;
        Ok(id)
    }

    fn remove_interpretation(&mut self, id: u64) -> bool {
        self.inner.remove_interpretation(id).is_some()
    }

    fn interpretation_count(&self) -> usize {
        self.inner.interpretations().len()
    }

    #[pyo3(signature = (path = None))]
    fn export_interpretations(&self, path: Option<String>) -> PyResult<usize> {
        let path = path.map(PathBuf::from);
        Ok(self.inner.export_interpretations(path.as_deref())?)
    }

    fn import_interpretations(&mut self, path: String) -> PyResult<usize> {
        Ok(self.inner.import_interpretations(path)?)
    }

    fn posterior_profile(&self, py: Python, point_index: usize) -> PyResult<PyObject> {
        let profile = self.inner.posterior_profile(point_index)?;
        let result = PyDict::new(py);
        result.set_item("fiducial", profile.fiducial)?;
        result.set_item("depth_cells", profile.depth_cells.to_pyarray(py))?;
        result.set_item("cond_p10", profile.p10.to_pyarray(py))?;
        result.set_item("cond_p50", profile.p50.to_pyarray(py))?;
        result.set_item("cond_p90", profile.p90.to_pyarray(py))?;
        result.set_item("conductivity_cells", profile.conductivity_cells.to_pyarray(py))?;
        result.set_item("conductivity_pdf", profile.pdf.to_pyarray(py))?;
        let extent = profile.extent;
        result.set_item(
            "conductivity_extent",
            (extent.cond_min, extent.cond_max, extent.depth_min, extent.depth_max),
        )?;
        Ok(result.into())
    }

    #[pyo3(signature = (selected = None, layer = None))]
    fn flight_line_map(&self, py: Python, selected: Option<LineId>, layer: Option<usize>) -> PyResult<PyObject> {
        let map = self.inner.flight_line_map(selected, layer)?;
        let lines = PyList::empty(py);
        for flight_line in map.lines {
            let entry = PyDict::new(py);
            entry.set_item("line", flight_line.line)?;
            entry.set_item("easting", flight_line.easting)?;
            entry.set_item("northing", flight_line.northing)?;
            entry.set_item("selected", flight_line.highlight == Highlight::Selected)?;
            lines.append(entry)?;
        }
        let result = PyDict::new(py);
        result.set_item("lines", lines)?;
        result.set_item(
            "extent",
            map.extent
                .map(|b| (b.min_easting, b.max_easting, b.min_northing, b.max_northing)),
        )?;
        if let Some(background) = map.background {
            result.set_item("layer", background.layer)?;
            result.set_item("z", background.z.to_pyarray(py))?;
            result.set_item("x", background.x.to_pyarray(py))?;
            result.set_item("y", background.y.to_pyarray(py))?;
            result.set_item("zmin", background.zmin)?;
            result.set_item("zmax", background.zmax)?;
        }
        Ok(result.into())
    }
}

/// Nearest reference point for each query point; misses have index -1 and
/// infinite distance
#[pyfunction]
fn nearest_neighbours(
    py: Python,
    query: PyReadonlyArray2<f64>,
    reference: PyReadonlyArray2<f64>,
    max_distance: f64,
) -> PyResult<PyObject> {
    let result = nearest_neighbours_impl(query.as_array(), reference.as_array(), max_distance)?;
    let indices: Array1<i64> = result
        .indices
        .iter()
        .map(|i| i.map_or(-1, |i| i as i64))
        .collect();

    let out = PyDict::new(py);
    out.set_item("distances", result.distances.to_pyarray(py))?;
    out.set_item("indices", indices.to_pyarray(py))?;
    Ok(out.into())
}

#[pymodule]
fn aemsection(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PySession>()?;
    m.add_function(wrap_pyfunction!(nearest_neighbours, m)?)?;
    Ok(())
}
