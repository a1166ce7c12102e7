// Configuration management module
// TOML-backed settings for the embedding endpoint, chunking, index and fetching

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, EmbeddingProvider, FetchConfig, HostedConfig, IndexConfig, OllamaConfig,
};
