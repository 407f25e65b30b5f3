pub mod commands;
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use commands::command_argument_builder;
pub use handlers::{LinkStore, apply_overrides, handle_crawl, parse_log_level};

// Re-export crawl functionality from wikispider-core
pub use wikispider_core::crawl::{CrawlOptions, execute_crawl, generate_crawl_report};
