pub mod crawler;
pub mod error;
pub mod frontier;
pub mod gate;
pub mod result;
pub mod rules;
pub mod telemetry;

pub use crawler::{Crawler, ResultCallback};
pub use error::{ScanError, StorageError, VisitRejection};
pub use gate::{LinkGate, LinkRecord, MemoryGate};
pub use result::{CrawlSummary, PageVisit};
pub use rules::is_eligible;
pub use telemetry::{NoopTelemetry, Telemetry};
