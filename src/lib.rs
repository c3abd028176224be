pub mod config;
pub mod embedding;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod retrieval;
pub mod search;
pub mod sources;
pub mod store;
pub mod types;
pub mod vector;
