//! The `samplecoach init` command.

use std::path::Path;

use anyhow::Result;

use samplecoach_core::model::QuestionSet;

pub fn execute() -> Result<()> {
    // Create samplecoach.toml
    if Path::new("samplecoach.toml").exists() {
        println!("samplecoach.toml already exists, skipping.");
    } else {
        std::fs::write("samplecoach.toml", SAMPLE_CONFIG)?;
        println!("Created samplecoach.toml");
    }

    // Create the default question set
    std::fs::create_dir_all("questions")?;
    let questions_path = Path::new("questions/default.json");
    if questions_path.exists() {
        println!("questions/default.json already exists, skipping.");
    } else {
        let json = serde_json::to_string_pretty(&QuestionSet::builtin())?;
        std::fs::write(questions_path, json + "\n")?;
        println!("Created questions/default.json");
    }

    println!("\nNext steps:");
    println!("  1. Set SAMPLECOACH_OPENAI_KEY or edit samplecoach.toml");
    println!("  2. Run: samplecoach validate --questions questions/default.json");
    println!(
        "  3. Run: samplecoach run --samples samples.csv --sample-column text --goal-column goal"
    );

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# samplecoach configuration

model = "gpt-3.5-turbo"

# free = 20, trial = 60, paid = 3500 requests per window, or a number
rate_tier = "paid"
tokens_per_window = 3500000
window_secs = 60
concurrency = 50

max_retries = 5
retry_base_delay_ms = 1000

output_dir = "./samplecoach-results"

[provider]
type = "openai"
api_key = "${OPENAI_API_KEY}"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_config_parses() {
        let config = samplecoach_providers::config::parse_config_str(SAMPLE_CONFIG).unwrap();
        assert_eq!(config.model, "gpt-3.5-turbo");
        assert_eq!(config.rate_tier, samplecoach_providers::RateTier::Paid);
        assert!(config.validate().is_ok());
    }
}
