use crate::core::click_resolver::ResolvedClick;
use crate::types::{Fiducial, InversionSource, LineId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier of a recorded point, stable across removals
pub type PointId = u64;

/// Column order of the interpreted-points table
pub const HEADINGS: [&str; 26] = [
    "fiducial",
    "inversion_name",
    "X",
    "Y",
    "ELEVATION",
    "DEM",
    "DEPTH",
    "UNCERTAINTY",
    "Type",
    "BoundaryNm",
    "BoundConf",
    "BasisOfInt",
    "OvrConf",
    "OvrStrtUnt",
    "OvrStrtCod",
    "UndStrtUnt",
    "UndStrtCod",
    "WithinType",
    "WithinStrt",
    "WithinStNo",
    "WithinConf",
    "InterpRef",
    "Comment",
    "SURVEY_LINE",
    "Operator",
    "point_index",
];

/// Stratigraphic attributes stamped onto every point of one modelled boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryTemplate {
    /// Boundary name, e.g. "Top Precipice interface"
    pub name: String,
    pub boundary_type: String,
    pub bound_conf: String,
    pub basis_of_interpretation: String,
    pub overlying_conf: String,
    pub overlying_unit: String,
    pub overlying_code: Option<u32>,
    pub underlying_unit: String,
    pub underlying_code: Option<u32>,
    pub within_type: String,
    pub within_strat: String,
    pub within_strat_no: String,
    pub within_conf: String,
    pub interp_ref: String,
    pub comment: String,
    pub operator: String,
}

impl Default for BoundaryTemplate {
    fn default() -> Self {
        Self {
            name: String::new(),
            boundary_type: String::new(),
            bound_conf: "M".to_string(),
            basis_of_interpretation: "IAEM".to_string(),
            overlying_conf: "M".to_string(),
            overlying_unit: String::new(),
            overlying_code: None,
            underlying_unit: String::new(),
            underlying_code: None,
            within_type: String::new(),
            within_strat: String::new(),
            within_strat_no: String::new(),
            within_conf: String::new(),
            interp_ref: String::new(),
            comment: String::new(),
            operator: String::new(),
        }
    }
}

/// One row of the interpreted-points table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpretedPoint {
    pub fiducial: Option<Fiducial>,
    pub inversion_name: String,
    #[serde(rename = "X")]
    pub x: f64,
    #[serde(rename = "Y")]
    pub y: f64,
    /// Interpreted elevation (mAHD)
    #[serde(rename = "ELEVATION")]
    pub elevation: f64,
    /// Ground elevation at the point
    #[serde(rename = "DEM")]
    pub dem: f64,
    #[serde(rename = "DEPTH")]
    pub depth: f64,
    #[serde(rename = "UNCERTAINTY")]
    pub uncertainty: Option<f64>,
    #[serde(rename = "Type")]
    pub boundary_type: String,
    #[serde(rename = "BoundaryNm")]
    pub boundary_name: String,
    #[serde(rename = "BoundConf")]
    pub bound_conf: String,
    #[serde(rename = "BasisOfInt")]
    pub basis_of_interpretation: String,
    #[serde(rename = "OvrConf")]
    pub overlying_conf: String,
    #[serde(rename = "OvrStrtUnt")]
    pub overlying_unit: String,
    #[serde(rename = "OvrStrtCod")]
    pub overlying_code: Option<u32>,
    #[serde(rename = "UndStrtUnt")]
    pub underlying_unit: String,
    #[serde(rename = "UndStrtCod")]
    pub underlying_code: Option<u32>,
    #[serde(rename = "WithinType")]
    pub within_type: String,
    #[serde(rename = "WithinStrt")]
    pub within_strat: String,
    #[serde(rename = "WithinStNo")]
    pub within_strat_no: String,
    #[serde(rename = "WithinConf")]
    pub within_conf: String,
    #[serde(rename = "InterpRef")]
    pub interp_ref: String,
    #[serde(rename = "Comment")]
    pub comment: String,
    #[serde(rename = "SURVEY_LINE")]
    pub line: LineId,
    #[serde(rename = "Operator")]
    pub operator: String,
    /// Section column the point was picked on
    pub point_index: usize,
}

impl InterpretedPoint {
    /// Build a row from a resolved click. Position and depth are rounded to
    /// whole metres; uncertainty is left unset.
    pub fn from_click(
        click: &ResolvedClick,
        source: InversionSource,
        template: &BoundaryTemplate,
    ) -> Self {
        Self {
            fiducial: click.fiducial,
            inversion_name: source.short_name().to_string(),
            x: click.easting.round(),
            y: click.northing.round(),
            elevation: click.click_elevation,
            dem: click.elevation,
            depth: click.depth.round(),
            uncertainty: None,
            boundary_type: template.boundary_type.clone(),
            boundary_name: template.name.clone(),
            bound_conf: template.bound_conf.clone(),
            basis_of_interpretation: template.basis_of_interpretation.clone(),
            overlying_conf: template.overlying_conf.clone(),
            overlying_unit: template.overlying_unit.clone(),
            overlying_code: template.overlying_code,
            underlying_unit: template.underlying_unit.clone(),
            underlying_code: template.underlying_code,
            within_type: template.within_type.clone(),
            within_strat: template.within_strat.clone(),
            within_strat_no: template.within_strat_no.clone(),
            within_conf: template.within_conf.clone(),
            interp_ref: template.interp_ref.clone(),
            comment: template.comment.clone(),
            line: click.line,
            operator: template.operator.clone(),
            point_index: click.column_index,
        }
    }
}

/// Append-only collection of the points picked in a session.
/// Rows can be deleted, but ids are never reused.
#[derive(Debug, Clone, Default)]
pub struct InterpretationStore {
    template: BoundaryTemplate,
    points: BTreeMap<PointId, InterpretedPoint>,
    next_id: PointId,
}

impl InterpretationStore {
    pub fn new(template: BoundaryTemplate) -> Self {
        Self {
            template,
            points: BTreeMap::new(),
            next_id: 0,
        }
    }

    pub fn template(&self) -> &BoundaryTemplate {
        &self.template
    }

    /// Attributes for points recorded from now on
    pub fn set_template(&mut self, template: BoundaryTemplate) {
        self.template = template;
    }

    /// Append a point picked from a click
    pub fn record(&mut self, click: &ResolvedClick, source: InversionSource) -> (PointId, &InterpretedPoint) {
        let point = InterpretedPoint::from_click(click, source, &self.template);
        log::info!(
            "📍 Interpreted '{}' on line {} at {:.0} mAHD (depth {:.0} m)",
            self.template.name,
            point.line,
            point.elevation,
            point.depth
        );
        self.insert(point)
    }

    /// Append an already-built point, e.g. one read back from an export
    pub fn insert(&mut self, point: InterpretedPoint) -> (PointId, &InterpretedPoint) {
        let id = self.next_id;
        self.next_id += 1;
        let stored = self.points.entry(id).or_insert(point);
        (id, stored)
    }

    pub fn extend<I: IntoIterator<Item = InterpretedPoint>>(&mut self, points: I) -> usize {
        let before = self.points.len();
        for point in points {
            self.insert(point);
        }
        self.points.len() - before
    }

    pub fn remove(&mut self, id: PointId) -> Option<InterpretedPoint> {
        self.points.remove(&id)
    }

    pub fn get(&self, id: PointId) -> Option<&InterpretedPoint> {
        self.points.get(&id)
    }

    /// All points in recording order
    pub fn iter(&self) -> impl Iterator<Item = (PointId, &InterpretedPoint)> + '_ {
        self.points.iter().map(|(&id, p)| (id, p))
    }

    pub fn for_line(&self, line: LineId) -> Vec<(PointId, &InterpretedPoint)> {
        self.iter().filter(|(_, p)| p.line == line).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn click(line: LineId, column_index: usize, easting: f64) -> ResolvedClick {
        ResolvedClick {
            line,
            column_index,
            distance_along_line: column_index as f64 * 10.0,
            sample_index: Some(column_index),
            fiducial: Some(100.0 + column_index as f64),
            easting,
            northing: 0.4,
            elevation: 95.0,
            click_elevation: 50.3,
            depth: 44.7,
        }
    }

    fn template() -> BoundaryTemplate {
        BoundaryTemplate {
            name: "Top Precipice interface".to_string(),
            boundary_type: "INTRA_Paleozoic".to_string(),
            overlying_unit: "Evergreen Formation".to_string(),
            overlying_code: Some(6416),
            underlying_unit: "Precipice Sandstone".to_string(),
            underlying_code: Some(15540),
            operator: "A. Geologist".to_string(),
            ..BoundaryTemplate::default()
        }
    }

    #[test]
    fn test_record_from_click() {
        let mut store = InterpretationStore::new(template());
        let (id, point) = store.record(&click(200101, 1, 10.6), InversionSource::Deterministic);

        assert_eq!(id, 0);
        assert_eq!(point.inversion_name, "lci");
        assert_eq!(point.x, 11.0);
        assert_eq!(point.y, 0.0);
        assert_eq!(point.depth, 45.0);
        assert_eq!(point.elevation, 50.3);
        assert_eq!(point.dem, 95.0);
        assert_eq!(point.uncertainty, None);
        assert_eq!(point.boundary_name, "Top Precipice interface");
        assert_eq!(point.underlying_code, Some(15540));
        assert_eq!(point.point_index, 1);
    }

    #[test]
    fn test_ids_survive_removal() {
        let mut store = InterpretationStore::new(template());
        store.record(&click(200101, 0, 0.0), InversionSource::Deterministic);
        store.record(&click(200401, 1, 10.0), InversionSource::Deterministic);
        assert!(store.remove(0).is_some());

        let (id, _) = store.record(&click(200101, 2, 20.0), InversionSource::Stochastic);
        assert_eq!(id, 2);
        assert_eq!(store.len(), 2);
        assert_eq!(store.for_line(200101).len(), 1);
        assert_eq!(store.for_line(200101)[0].1.inversion_name, "rj");
    }

    #[test]
    fn test_headings_match_serialised_fields() {
        assert_eq!(HEADINGS.len(), 26);
        assert_eq!(HEADINGS[0], "fiducial");
        assert_eq!(HEADINGS[23], "SURVEY_LINE");
    }
}
