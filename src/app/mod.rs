pub mod config;

pub use config::{Config, ProviderEntry, ProviderSettings};
