pub mod compute;
pub mod config;
pub mod error;
pub mod geo;
pub mod matcher;
pub mod output;
pub mod parser;
pub mod stats;
pub mod topology;
