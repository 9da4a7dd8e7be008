//! aemsection: line sections for airborne electromagnetic inversions
//!
//! Turns pre-gridded deterministic (LCI) and stochastic (RJ-MCMC) inversion
//! results into renderable cross-sections along survey flight lines, and maps
//! clicks on those sections back to samples for stratigraphic interpretation.

pub mod types;
pub mod config;
pub mod io;
pub mod core;
pub mod session;

#[cfg(feature = "python")]
mod python;

// Re-export main types
pub use types::{
    SectionError, SectionResult, InversionSource, LineId, Fiducial,
    DatasetVariable, VariableArray, VariableKind, Bounds, Highlight
};

pub use config::SessionConfig;
pub use io::{InversionData, SampleColumns, SectionCache};
pub use session::Session;
