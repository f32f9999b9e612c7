//! Indexes command implementation.

use super::state;
use std::path::Path;

/// Runs the indexes command.
pub fn run(path: &Path, all: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = state::open(path)?;
    let definitions: Vec<_> = store
        .index_definitions()
        .into_iter()
        .filter(|d| all || !d.builtin)
        .collect();

    if format == "json" {
        return state::print_json(&definitions);
    }

    println!("{:<24} {:<8} {:<10} {:<24} unique", "name", "kind", "values", "field");
    for def in &definitions {
        let values = def.value_kind.map_or_else(|| "-".to_string(), |k| k.to_string());
        println!(
            "{:<24} {:<8} {:<10} {:<24} {}",
            def.name,
            def.kind.to_string(),
            values,
            def.field.as_deref().unwrap_or("(computed)"),
            if def.unique { "yes" } else { "no" }
        );
    }
    Ok(())
}
