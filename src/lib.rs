pub use crate::driver::SignalGenerator;
pub use crate::error::{Error, Result};
pub use crate::properties::Properties;

/// Calorimeter signal generator.
pub mod calo;
/// Lifecycle and identifier bookkeeping shared by all signal generators.
pub mod driver;
/// Error type shared by the whole crate.
pub mod error;
/// Analog response of drift cells operated in Geiger regime.
pub mod geiger;
/// Geometry identifiers and the geometry service used by the drivers.
pub mod geometry;
/// Simulated step hits.
pub mod hit;
/// Typed configuration properties.
pub mod properties;
/// Driver construction by type name.
pub mod registry;
/// Analog signals and their pulse shapes.
pub mod signal;
/// Tabulated functions with linear interpolation.
pub mod tabulated;
/// Drift cell signal generator.
pub mod tracker;
/// Resolution of unit symbols carried by configuration values.
///
/// Each function returns `None` when the symbol is unknown or belongs to
/// another dimension.
pub mod units;
