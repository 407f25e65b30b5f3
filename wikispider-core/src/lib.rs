pub mod crawl;
pub mod data;
pub mod error;
pub mod model;
pub mod settings;
pub mod telemetry;

pub use error::CoreError;
