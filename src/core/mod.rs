pub mod config;
pub mod connection;
pub mod enumerator;
pub mod error;
pub mod filters;
pub mod monitor;
pub mod process;
pub mod report;
pub mod resolver;
pub mod snapshot;
pub mod summary;
pub mod writer;
