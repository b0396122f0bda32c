// Configuration management module
// Handles TOML configuration, validation and interactive setup

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    CompletionConfig, Config, ConfigError, OllamaConfig, RetrievalConfig, StorageConfig,
};
