//! kubelka: Kubelka-Munk pigment calibration and colour matching
//!
//! The pipeline runs in four stages, each usable on its own:
//!
//! 1. [`intermediate`]: turn dark/light reflectance pairs of a monochrome
//!    sample set into the auxiliaries `a, b, Sx, Kx, Kx/Sx`.
//! 2. [`regression`]: fit per-wavelength polynomials of `K`, `S` and `K/S`
//!    against concentration, picking the degree by leave-one-out.
//! 3. [`mixer`] and [`formulate`]: mix pigment models with the base and
//!    predict reflectance over the card's backgrounds.
//! 4. [`optimize`]: invert the forward model to match target reflectances.
//!
//! Spectra are sampled on an integer nanometre grid with 1 nm steps
//! ([`Spectrum`]). All tables keep their input order.
//!
//! # Example
//!
//! ```
//! use kubelka::formulate::km_reflectance;
//!
//! // A very thick layer hides its background.
//! let over_black = km_reflectance(0.0, 0.2, 1e4);
//! let over_white = km_reflectance(1.0, 0.2, 1e4);
//! assert!((over_black - over_white).abs() < 1e-9);
//! ```

pub mod colorimetry;
pub mod constants;
pub mod error;
pub mod formulate;
pub mod intermediate;
pub mod metrics;
pub mod mixer;
pub mod optimize;
pub mod pigment;
pub mod regression;
pub mod spectrum;
pub mod table;


pub use colorimetry::{Colorimeter, LabValue, SpectralColorimeter};
pub use constants::{extract_constants, extract_targets, CalibrationConstants, CardReference};
pub use error::{KmError, Result};
pub use formulate::Formulator;
pub use intermediate::{Calibrator, DerivationMethod, IntermediateTable};
pub use mixer::{BaseKm, KmMixer, ModelTable};
pub use optimize::{MatchHistory, Minimizer, MinimizerOptions, OptimizationResult};
pub use pigment::{Background, Colorant, Concentrations, Pigment};
pub use regression::{select_best, FitRecord, KmQuantity, RegressionEngine, SampleWeights};
pub use spectrum::Spectrum;
pub use table::{ReflectanceTable, SpectralSample};
