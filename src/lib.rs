pub mod aggregate;
pub mod archive;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod fiscal;
pub mod hscodes;
pub mod pipeline;
pub mod portal;
pub mod scrape;
pub mod series;

pub use config::Config;
pub use error::{Result, ScrapeError};
pub use fiscal::{FiscalYear, TradeType};
pub use pipeline::{Pipeline, PipelineError, PipelineOutput, Progress, TradeRequest};
