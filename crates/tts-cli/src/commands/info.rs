//! Info command implementation.

use tts_core::ServerConfig;

/// Run the info command.
pub fn run(config: &ServerConfig) {
    println!("Speech Synthesis Service");
    println!("========================");
    println!();
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
    println!();
    println!("Configuration:");
    println!("  Listen:        {}", config.bind_addr());
    println!("  Output dir:    {}", config.output_dir.display());
    println!("  Workers:       {}", config.max_workers);
    println!("  Max text:      {} chars", config.max_text_chars);
    println!("  Sample rate:   {} Hz", config.sample_rate);
    println!(
        "  Defaults:      {} / {} (enhance: {})",
        config.defaults.language, config.defaults.speaker, config.defaults.enhance_noise
    );
    println!("  Preload:       {}", config.preload.len());
    println!();
    println!("Crates:");
    println!("  tts-core: Core types, traits and configuration");
    println!("  text-normalizer: Markup parsing and text normalization");
    println!("  audio-codec: WAV encoding and noise reduction");
    println!("  runtime: Catalog, model cache, dispatcher and audio store");
    println!("  tts-server: HTTP server");
    println!("  tts-cli: This CLI tool");
}
