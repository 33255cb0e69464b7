mod defaults;

pub mod config;
pub mod logger;
pub mod reader;

pub use config::Config;
