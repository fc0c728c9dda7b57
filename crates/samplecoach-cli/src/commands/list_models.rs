//! The `samplecoach list-models` command.

use std::path::PathBuf;

use anyhow::Result;

use samplecoach_providers::config::load_config_from;
use samplecoach_providers::create_provider;

pub fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let provider = create_provider(&config.provider)?;
    let models = provider.available_models();

    if models.is_empty() {
        println!("Provider {} lists no models.", provider.name());
        return Ok(());
    }

    println!("Provider: {}", provider.name());
    for model in &models {
        let marker = if model.id == config.model { " (configured)" } else { "" };
        println!(
            "  {}: {} ({}K context){marker}",
            model.id,
            model.name,
            model.max_context / 1000,
        );
    }

    Ok(())
}
