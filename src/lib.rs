//! Detection and tracking of moving point signals in kymographs.
//!
//! Every frame is reduced to a spatial profile, fitted with a variable
//! number of Gaussians, and the resulting peaks are linked to existing
//! tracks by minimum cost assignment.

pub mod core;
pub mod util;

pub use crate::core::{Detector, DetectorConfig, Kymograph, Registry};
