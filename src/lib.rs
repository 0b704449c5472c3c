//! Scrape, stage, reshape and load Indonesian provincial GDP, GDP per capita
//! and HDI tables.

pub mod artifact;
pub mod config;
pub mod dataset;
pub mod db;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod load;
pub mod model;
pub mod pipeline;
pub mod run;
pub mod table;
pub mod transform;

pub use config::Settings;
pub use dataset::Dataset;
pub use error::{Error, Result};
pub use run::RunContext;
