//! Audio store: persists generated audio and serves it back by name.
//!
//! Names are `<uuid-v4>.wav`. `load` only accepts names of exactly that shape,
//! so a client can never address anything outside the store directory.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use audio_codec::{WAV_EXTENSION, encode_wav};
use tracing::{debug, info, instrument};
use tts_core::{AudioArtifact, RawAudio, TtsError, TtsResult};
use uuid::Uuid;

/// Attempts at finding an unused name before giving up.
const MAX_NAME_ATTEMPTS: usize = 4;

/// Directory-backed audio store.
#[derive(Debug, Clone)]
pub struct AudioStore {
    root: PathBuf,
}

impl AudioStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> TtsResult<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| {
            TtsError::storage(format!("cannot create {}: {e}", dir.display()))
        })?;
        let root = dir.canonicalize()?;
        info!(root = %root.display(), "Audio store ready");
        Ok(Self { root })
    }

    /// Store directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Encode and persist `audio` under a fresh name.
    #[instrument(skip(self, audio), fields(samples = audio.num_samples()))]
    pub fn save(&self, audio: &RawAudio) -> TtsResult<AudioArtifact> {
        let bytes = encode_wav(audio)?;

        for _ in 0..MAX_NAME_ATTEMPTS {
            let filename = format!("{}.{WAV_EXTENSION}", Uuid::new_v4());
            let path = self.root.join(&filename);

            // create_new fails instead of overwriting if the name is taken.
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(TtsError::storage(format!("cannot create {filename}: {e}")));
                }
            };

            if let Err(e) = file.write_all(&bytes).and_then(|()| file.sync_all()) {
                let _ = std::fs::remove_file(&path);
                return Err(TtsError::storage(format!("cannot write {filename}: {e}")));
            }

            let duration_secs = audio.duration_secs();
            info!(filename = %filename, duration_s = duration_secs, bytes = bytes.len(), "Audio saved");
            return Ok(AudioArtifact {
                filename,
                bytes,
                duration_secs,
            });
        }

        Err(TtsError::storage("could not allocate a unique file name"))
    }

    /// Read a stored file. Blocking.
    pub fn load_blocking(&self, filename: &str) -> TtsResult<Vec<u8>> {
        let path = self.path_of(filename)?;
        std::fs::read(&path).map_err(|e| read_error(filename, e))
    }

    /// Read a stored file without blocking the event loop.
    pub async fn load(&self, filename: &str) -> TtsResult<Vec<u8>> {
        let path = self.path_of(filename)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| read_error(filename, e))?;
        debug!(filename, bytes = bytes.len(), "Audio loaded");
        Ok(bytes)
    }

    /// Whether `filename` has the shape of a name this store generates.
    pub fn is_valid_name(filename: &str) -> bool {
        let Some(stem) = filename
            .strip_suffix(WAV_EXTENSION)
            .and_then(|s| s.strip_suffix('.'))
        else {
            return false;
        };
        // Round-trip through the parser to reject alternative spellings
        // (braces, urn prefix, upper case, simple form).
        Uuid::parse_str(stem).is_ok_and(|id| id.hyphenated().to_string() == stem)
    }

    fn path_of(&self, filename: &str) -> TtsResult<PathBuf> {
        if !Self::is_valid_name(filename) {
            debug!(filename, "Rejecting name not issued by the store");
            return Err(TtsError::not_found(filename));
        }
        Ok(self.root.join(filename))
    }
}

fn read_error(filename: &str, e: std::io::Error) -> TtsError {
    if e.kind() == ErrorKind::NotFound {
        TtsError::not_found(filename)
    } else {
        TtsError::storage(format!("cannot read {filename}: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio() -> RawAudio {
        RawAudio::new((0..800).map(|i| (i as f32 / 40.0).sin() * 0.3).collect(), 8_000)
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::open(dir.path()).unwrap();

        let artifact = store.save(&audio()).unwrap();
        assert!(AudioStore::is_valid_name(&artifact.filename));
        assert!((artifact.duration_secs - 0.1).abs() < 1e-9);

        let bytes = store.load_blocking(&artifact.filename).unwrap();
        assert_eq!(bytes, artifact.bytes);
    }

    #[test]
    fn test_names_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::open(dir.path()).unwrap();
        let a = store.save(&audio()).unwrap();
        let b = store.save(&audio()).unwrap();
        assert_ne!(a.filename, b.filename);
    }

    #[test]
    fn test_name_validation() {
        let id = Uuid::new_v4();
        assert!(AudioStore::is_valid_name(&format!("{id}.wav")));

        assert!(!AudioStore::is_valid_name(&format!("{}.wav", id.simple())));
        assert!(!AudioStore::is_valid_name(&format!("{}.wav", id.to_string().to_uppercase())));
        assert!(!AudioStore::is_valid_name(&format!("{id}.mp3")));
        assert!(!AudioStore::is_valid_name(&format!("{id}wav")));
        assert!(!AudioStore::is_valid_name("../secrets"));
        assert!(!AudioStore::is_valid_name(&format!("../{id}.wav")));
        assert!(!AudioStore::is_valid_name(".wav"));
    }

    #[test]
    fn test_unknown_and_traversal_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::open(dir.path().join("out")).unwrap();
        std::fs::write(dir.path().join("secrets"), b"top secret").unwrap();

        for name in ["../secrets", "secrets", "/etc/passwd", "", "..%2Fsecrets"] {
            assert!(
                matches!(store.load_blocking(name), Err(TtsError::NotFound(_))),
                "{name} should be rejected"
            );
        }

        let missing = format!("{}.wav", Uuid::new_v4());
        assert!(matches!(
            store.load_blocking(&missing),
            Err(TtsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_async_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::open(dir.path()).unwrap();
        let artifact = store.save(&audio()).unwrap();
        assert_eq!(store.load(&artifact.filename).await.unwrap(), artifact.bytes);
    }
}
