//! Voices command implementation.

use anyhow::Result;
use runtime::SpeechPipeline;
use tts_core::ServerConfig;

/// Run the voices command.
pub fn run(config: &ServerConfig) -> Result<()> {
    let catalog = SpeechPipeline::catalog_from_config(config)?;

    println!("Default language: {}", catalog.default_language());
    for entry in &catalog.manifest().languages {
        println!();
        println!("{}:", entry.language);
        for model in &entry.models {
            println!("  {:<14} {}", model.id, model.speakers.join(", "));
        }
    }
    Ok(())
}
