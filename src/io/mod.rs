//! I/O modules for inversion datasets, section caches and interpretation tables

pub mod dataset;
pub mod section_cache;
pub mod interp_export;

pub use dataset::{InversionData, SampleColumns};
pub use section_cache::SectionCache;
pub use interp_export::{export_csv, import_csv};
