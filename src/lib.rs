//! Pigmix - pigment calibration and colour matching
//!
//! Batch front end for the `kubelka` pipeline: configuration, JSON table
//! I/O and the calibrate / formulate / match runs.
//! This library exposes modules for integration testing.

pub mod error;
pub mod models;
pub mod services;
