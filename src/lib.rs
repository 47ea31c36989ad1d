pub mod accumulator;
pub mod aggregator;
pub mod aligner;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod parser;
pub mod partial;
pub mod pipeline;
pub mod scheduler;
pub mod season;
pub mod store;
pub mod table;
