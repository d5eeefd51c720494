pub mod calibration;
pub mod formulation;
pub mod matching;
pub mod table_io;

pub use calibration::CalibrationService;
pub use formulation::formulate;
pub use matching::MatchingService;
pub use table_io::{read_json, read_mixtures, read_table, write_json};
