pub mod cache;
pub mod cleaner;
pub mod config;
pub mod dataset;
pub mod error;
pub mod fetch;
pub mod metrics;
pub mod output;
pub mod pipeline;
pub mod session;
pub mod summary;
pub mod table;
