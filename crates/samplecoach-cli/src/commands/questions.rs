//! The `samplecoach questions` command.

use anyhow::Result;

use samplecoach_core::model::QuestionSet;

pub fn execute() -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&QuestionSet::builtin())?);
    Ok(())
}
