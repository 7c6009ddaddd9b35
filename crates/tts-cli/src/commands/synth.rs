//! Synthesis command implementation.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use audio_codec::write_wav;
use runtime::SpeechPipeline;
use tts_core::{Lang, ServerConfig, SynthesisRequest};

/// Options for the synth command.
#[derive(Debug)]
pub struct SynthOptions {
    pub input: String,
    pub output: PathBuf,
    pub lang: Option<String>,
    pub model: Option<String>,
    pub speaker: Option<String>,
    pub enhance: bool,
}

impl SynthOptions {
    fn request(&self, text: String, config: &ServerConfig) -> Result<SynthesisRequest> {
        let mut request = SynthesisRequest::new(text)
            .with_speaker(
                self.speaker
                    .clone()
                    .unwrap_or_else(|| config.defaults.speaker.clone()),
            )
            .with_enhance_noise(self.enhance);
        if let Some(lang) = &self.lang {
            request = request.with_lang(lang.parse::<Lang>()?);
        }
        if let Some(model) = &self.model {
            request = request.with_model(model.clone());
        }
        Ok(request)
    }
}

/// Text argument, or the contents of the file after `@`.
fn read_input(input: &str) -> Result<String> {
    match input.strip_prefix('@') {
        Some(path) => {
            info!(path, "Reading text from file");
            std::fs::read_to_string(path).with_context(|| format!("cannot read {path}"))
        }
        None => Ok(input.to_string()),
    }
}

/// Run the synthesis command.
pub fn run(config: &ServerConfig, options: SynthOptions) -> Result<()> {
    let start = Instant::now();

    let text = read_input(&options.input)?;
    if text.trim().is_empty() {
        bail!("input text is empty");
    }

    // The pipeline needs a store; keep it next to the output file.
    let mut config = config.clone();
    config.output_dir = options
        .output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf();
    let pipeline = SpeechPipeline::new_mock(&config)?;

    let request = options.request(text, &config)?;
    let validated = pipeline.validate(&request)?;

    info!(
        text_len = request.text.len(),
        key = %validated.key,
        speaker = %validated.speaker,
        output = %options.output.display(),
        "Starting synthesis"
    );

    let synth_start = Instant::now();
    let audio = pipeline.render(&validated)?;
    let synth_duration = synth_start.elapsed();

    debug!(
        samples = audio.num_samples(),
        sample_rate = audio.sample_rate,
        synth_ms = synth_duration.as_millis() as u64,
        "Synthesis completed"
    );

    write_wav(&options.output, &audio)?;

    let audio_secs = audio.duration_secs();
    let rtf = if audio_secs > 0.0 {
        synth_duration.as_secs_f64() / audio_secs
    } else {
        0.0
    };

    println!("Synthesis complete!");
    println!();
    println!("Input:     {} chars", request.text.chars().count());
    println!("Voice:     {} / {}", validated.key, validated.speaker);
    println!("Enhanced:  {}", if options.enhance { "yes" } else { "no" });
    println!("Output:    {}", options.output.display());
    println!();
    println!("Audio:");
    println!("  Duration:    {audio_secs:.2} sec");
    println!("  Samples:     {}", audio.num_samples());
    println!("  Sample rate: {} Hz", audio.sample_rate);
    println!();
    println!("Performance:");
    println!("  Synthesis:   {} ms", synth_duration.as_millis());
    println!("  Total:       {} ms", start.elapsed().as_millis());
    println!("  RTF:         {rtf:.3}x");

    info!(output = %options.output.display(), duration_s = audio_secs, rtf, "Synthesis saved to file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(output: PathBuf) -> SynthOptions {
        SynthOptions {
            input: "Hello there".to_string(),
            output,
            lang: Some("en".to_string()),
            model: None,
            speaker: Some("lj".to_string()),
            enhance: false,
        }
    }

    #[test]
    fn test_synth_writes_wav() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.wav");
        let config = ServerConfig {
            sample_rate: 8_000,
            ..Default::default()
        };

        run(&config, options(output.clone())).unwrap();

        let audio = audio_codec::read_wav(&output).unwrap();
        assert_eq!(audio.sample_rate, 8_000);
        assert!(audio.num_samples() > 0);
    }

    #[test]
    fn test_input_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.txt");
        std::fs::write(&path, "Текст из файла").unwrap();

        let text = read_input(&format!("@{}", path.display())).unwrap();
        assert_eq!(text, "Текст из файла");
        assert_eq!(read_input("plain").unwrap(), "plain");
    }

    #[test]
    fn test_unknown_speaker_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path().join("out.wav"));
        opts.speaker = Some("xenia".to_string());

        let err = run(&ServerConfig::default(), opts).unwrap_err();
        assert!(err.to_string().contains("Unsupported speaker"));
        assert!(!dir.path().join("out.wav").exists());
    }
}
