pub mod config;
pub mod detectors;
pub mod error;
pub mod features;
pub mod filters;
pub mod fixture;
pub mod io;
pub mod plot;
pub mod signal;

pub use config::*;
pub use detectors::*;
pub use error::{EcgError, EcgResult};
pub use features::*;
pub use filters::*;
pub use signal::*;
