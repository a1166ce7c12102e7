
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use super::{Config, ConfigError, EmbeddingProvider, HostedConfig, OllamaConfig};
use crate::embeddings::OllamaClient;
use crate::embeddings::chunking::ChunkingConfig;
use std::time::Duration;

#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 Embed Index Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config()?;

    eprintln!("{}", style("Embedding Provider").bold().yellow());
    eprintln!("Choose the endpoint used to embed document chunks and queries.");
    eprintln!();

    let providers = &["ollama (local)", "hosted (OpenAI-compatible API)"];
    let default_index = match config.provider {
        EmbeddingProvider::Ollama => 0,
        EmbeddingProvider::Hosted => 1,
    };
    let provider_index = Select::new()
        .with_prompt("Embedding provider")
        .default(default_index)
        .items(providers)
        .interact()?;

    config.provider = if provider_index == 0 {
        EmbeddingProvider::Ollama
    } else {
        EmbeddingProvider::Hosted
    };

    match config.provider {
        EmbeddingProvider::Ollama => {
            configure_ollama(&mut config.ollama)?;

            eprintln!();
            eprintln!("{}", style("Testing configuration...").yellow());

            match test_ollama_connection(&config.ollama) {
                Ok(()) => eprintln!("{}", style("✓ Ollama connection successful!").green()),
                Err(e) => {
                    eprintln!("{} {}", style("⚠ Warning:").yellow(), e);
                    eprintln!(
                        "You can continue, but make sure Ollama is running with the model pulled before ingesting."
                    );
                }
            }
        }
        EmbeddingProvider::Hosted => {
            configure_hosted(&mut config.hosted)?;
            eprintln!(
                "The API key is read from ${} (or --api-key) when commands run; it is never saved.",
                config.hosted.api_key_env
            );
        }
    }

    eprintln!();
    eprintln!("{}", style("Chunking").bold().yellow());
    configure_chunking(&mut config.chunking)?;

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedding:").bold().yellow());
    eprintln!("  Provider: {}", style(config.provider).cyan());
    match config.provider {
        EmbeddingProvider::Ollama => {
            match config.ollama.ollama_url() {
                Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
                Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
            }
            eprintln!("  Model: {}", style(&config.ollama.model).cyan());
            eprintln!("  Batch Size: {}", style(config.ollama.batch_size).cyan());
        }
        EmbeddingProvider::Hosted => {
            match config.hosted.embeddings_url() {
                Ok(url) => eprintln!("  Endpoint: {}", style(url).cyan()),
                Err(e) => eprintln!("  Endpoint: {} ({})", style("Invalid").red(), e),
            }
            eprintln!("  Model: {}", style(&config.hosted.model).cyan());
            eprintln!("  Batch Size: {}", style(config.hosted.batch_size).cyan());
            eprintln!("  API key variable: {}", style(&config.hosted.api_key_env).cyan());
        }
    }

    eprintln!();
    eprintln!("{}", style("Chunking:").bold().yellow());
    eprintln!("  Max Size: {} chars", style(config.chunking.max_size).cyan());
    eprintln!("  Overlap: {} chars", style(config.chunking.overlap).cyan());

    eprintln!();
    eprintln!("{}", style("Index:").bold().yellow());
    eprintln!(
        "  Default Path: {}",
        style(config.default_index_path().display()).cyan()
    );
    eprintln!("  Metric: {}", style(config.index.metric).cyan());
    eprintln!("  Default k: {}", style(config.index.default_k).cyan());

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config() -> Result<Config> {
    Config::load_default().map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No existing configuration found. Using defaults.").yellow()
            );
            Ok(Config::default())
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = OllamaConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..OllamaConfig::default()
            };
            temp_config.validate()
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let model = prompt_model(&ollama.model)?;
    let batch_size = prompt_batch_size(ollama.batch_size)?;

    ollama.set_protocol(protocol)?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;
    ollama.set_model(model)?;
    ollama.set_batch_size(batch_size)?;

    Ok(())
}

fn configure_hosted(hosted: &mut HostedConfig) -> Result<()> {
    let base_url: String = Input::new()
        .with_prompt("API base URL")
        .default(hosted.base_url.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = HostedConfig {
                base_url: input.clone(),
                ..HostedConfig::default()
            };
            temp_config.embeddings_url().map(|_| ())
        })
        .interact_text()?;

    let model = prompt_model(&hosted.model)?;
    let batch_size = prompt_batch_size(hosted.batch_size)?;

    hosted.set_base_url(base_url)?;
    hosted.set_model(model)?;
    hosted.set_batch_size(batch_size)?;

    Ok(())
}

fn configure_chunking(chunking: &mut ChunkingConfig) -> Result<()> {
    let max_size: usize = Input::new()
        .with_prompt("Maximum chunk size (characters)")
        .default(chunking.max_size)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if *input == 0 {
                Err("Chunk size must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let overlap: usize = Input::new()
        .with_prompt("Overlap between chunks (characters)")
        .default(chunking.overlap.min(max_size.saturating_sub(1)))
        .validate_with(|input: &usize| -> Result<(), &str> {
            if *input >= max_size {
                Err("Overlap must be smaller than the chunk size")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    *chunking = ChunkingConfig::new(max_size, overlap)?;
    Ok(())
}

fn prompt_model(current: &str) -> Result<String> {
    Ok(Input::new()
        .with_prompt("Embedding model")
        .default(current.to_string())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?)
}

fn prompt_batch_size(current: u32) -> Result<u32> {
    Ok(Input::new()
        .with_prompt("Batch size for embedding generation")
        .default(current)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 1000 {
                Err("Batch size must be 1000 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?)
}

fn test_ollama_connection(ollama: &OllamaConfig) -> crate::Result<()> {
    OllamaClient::new(ollama)?
        .with_timeout(Duration::from_secs(5))
        .with_retry_attempts(1)
        .health_check()
}
