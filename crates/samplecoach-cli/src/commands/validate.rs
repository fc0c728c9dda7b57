//! The `samplecoach validate` command.

use std::path::PathBuf;

use anyhow::Result;

use samplecoach_core::parser::{parse_question_set, validate_question_set};

pub fn execute(questions_path: PathBuf) -> Result<()> {
    let set = parse_question_set(&questions_path)?;

    println!(
        "Question set: {} ({} questions, {} active)",
        questions_path.display(),
        set.len(),
        set.active_count()
    );

    let warnings = validate_question_set(&set);
    for w in &warnings {
        let prefix = w
            .question_key
            .as_ref()
            .map(|key| format!("  [{key}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }

    if warnings.is_empty() {
        println!("Question set valid.");
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}
