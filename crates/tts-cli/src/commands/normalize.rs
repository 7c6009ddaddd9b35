//! Normalize command implementation.

use anyhow::Result;
use text_normalizer::Normalizer;
use tts_core::TextNormalizer;

/// Run the normalize command.
pub fn run(input: &str, json: bool) -> Result<()> {
    let normalizer = Normalizer::new();
    let result = normalizer.normalize(input)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("Input:      {input}");
    println!("Normalized: {}", result.text);

    if !result.markers.is_empty() {
        println!("Markers:");
        for marker in &result.markers {
            println!("  [{}-{}] {:?}", marker.offset, marker.end, marker.directive);
        }
    }

    Ok(())
}
