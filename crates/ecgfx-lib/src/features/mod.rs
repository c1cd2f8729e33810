pub mod fiducial;

pub use fiducial::*;
