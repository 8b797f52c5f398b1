pub mod config;
pub mod error;
pub mod startup;

pub use error::LoaderError;
pub use payload_updater_lib as updater;
