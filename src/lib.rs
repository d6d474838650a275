pub mod analyzers;
pub mod cleaning;
pub mod config;
pub mod error;
pub mod output;
pub mod parametrize;
pub mod parser;
pub mod pipeline;
pub mod simulate;
pub mod stats;
