//! Core section modules

pub mod spatial_index;
pub mod line_locator;
pub mod projector;
pub mod section_grid;
pub mod section_assembler;
pub mod click_resolver;
pub mod interpretation;
pub mod posterior;
pub mod layer_grid;
pub mod flight_lines;

// Re-export main types
pub use spatial_index::{SpatialIndex, NearestNeighbours, Neighbour, nearest_neighbours};
pub use line_locator::LineLocator;
pub use projector::{AlongLineProjector, AlongLineRecord, DistanceAlongLine, ProjectionParams};
pub use section_grid::{Axis, ColumnVariable, GridResolution, GridVariable, LineSection, RasterVariable, SectionGrid, SectionParts};
pub use section_assembler::{SectionAssembler, SectionLayers, SectionMode, StyleParams, LayerKind, confidence};
pub use click_resolver::{ClickResolver, ResolvedClick};
pub use interpretation::{BoundaryTemplate, InterpretationStore, InterpretedPoint, PointId};
pub use posterior::{PosteriorExtent, PosteriorProfile};
pub use layer_grid::{LayerGrids, MapBackground};
pub use flight_lines::{FlightLine, FlightLineMap, MapParams};
