//! Configuration system for the Sunshaft light scattering stage.
//!
//! Effect tunables and demo scene settings persist to disk as a RON file.
//! Supports CLI overrides via clap, hot-reload detection, and forward/backward
//! compatible serialization.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    ColorFormat, Config, DebugConfig, EffectConfig, OutputConfig, SceneConfig, default_config_dir,
};
pub use error::ConfigError;
