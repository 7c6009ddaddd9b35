//! Voice catalog: which (language, model, speaker) selections exist.
//!
//! Built once at startup and read-only afterwards, so lookups take no locks.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use tts_core::config::{LanguageEntry, ModelEntry};
use tts_core::{CatalogConfig, Lang, TtsError, TtsResult, VoiceKey};

const RU_SPEAKERS: &[&str] = &["random", "kseniya", "baya", "aidar", "eugene", "xenia"];
const EN_SPEAKERS: &[&str] = &["random", "lj"];
const DE_SPEAKERS: &[&str] = &["random", "thorsten"];

static BUILTIN_MANIFEST: Lazy<CatalogConfig> = Lazy::new(|| {
    let entry = |language, models: &[&str], speakers: &[&str]| LanguageEntry {
        language,
        models: models
            .iter()
            .map(|id| ModelEntry {
                id: id.to_string(),
                speakers: speakers.iter().map(|s| s.to_string()).collect(),
            })
            .collect(),
    };
    CatalogConfig {
        languages: vec![
            entry(Lang::Ru, &["v4_ru", "v3_1_ru"], RU_SPEAKERS),
            entry(Lang::En, &["v3_en", "lj_v2"], EN_SPEAKERS),
            entry(Lang::De, &["v3_de", "thorsten_v2"], DE_SPEAKERS),
        ],
    }
});

/// A catalog lookup that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVoice {
    /// Backend to load.
    pub key: VoiceKey,
    /// Speaker within that backend.
    pub speaker: String,
}

/// Language → models → speakers manifest.
#[derive(Debug, Clone)]
pub struct Catalog {
    manifest: CatalogConfig,
    default_lang: Lang,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Catalog {
    /// The built-in manifest.
    pub fn builtin() -> Self {
        Self {
            manifest: BUILTIN_MANIFEST.clone(),
            default_lang: Lang::Ru,
        }
    }

    /// Build from a manifest, rejecting empty or duplicated entries.
    pub fn from_config(manifest: CatalogConfig) -> TtsResult<Self> {
        let first = manifest
            .languages
            .first()
            .ok_or_else(|| TtsError::config("catalog must list at least one language"))?
            .language;

        let mut langs = HashSet::new();
        for entry in &manifest.languages {
            if !langs.insert(entry.language) {
                return Err(TtsError::config(format!(
                    "catalog lists language '{}' twice",
                    entry.language
                )));
            }
            if entry.models.is_empty() {
                return Err(TtsError::config(format!(
                    "catalog language '{}' has no models",
                    entry.language
                )));
            }
            let mut ids = HashSet::new();
            for model in &entry.models {
                if !ids.insert(model.id.as_str()) {
                    return Err(TtsError::config(format!(
                        "catalog lists model '{}' twice",
                        model.id
                    )));
                }
                if model.speakers.is_empty() {
                    return Err(TtsError::config(format!(
                        "catalog model '{}' has no speakers",
                        model.id
                    )));
                }
            }
        }

        Ok(Self {
            manifest,
            default_lang: first,
        })
    }

    /// Set the language used when a request names none.
    pub fn with_default_language(mut self, lang: Lang) -> TtsResult<Self> {
        self.entry(lang)?;
        self.default_lang = lang;
        Ok(self)
    }

    /// Language used when a request names none.
    pub fn default_language(&self) -> Lang {
        self.default_lang
    }

    /// The underlying manifest.
    pub fn manifest(&self) -> &CatalogConfig {
        &self.manifest
    }

    /// Languages in manifest order.
    pub fn languages(&self) -> impl Iterator<Item = Lang> + '_ {
        self.manifest.languages.iter().map(|e| e.language)
    }

    /// Model identifiers for a language; the first one is the default.
    pub fn models(&self, lang: Lang) -> TtsResult<Vec<&str>> {
        Ok(self.entry(lang)?.models.iter().map(|m| m.id.as_str()).collect())
    }

    /// Speakers of a model, if the key is in the catalog.
    pub fn speakers(&self, key: &VoiceKey) -> Option<&[String]> {
        self.manifest
            .languages
            .iter()
            .find(|e| e.language == key.lang)?
            .models
            .iter()
            .find(|m| m.id == key.model_id)
            .map(|m| m.speakers.as_slice())
    }

    /// Every key in the catalog.
    pub fn keys(&self) -> impl Iterator<Item = VoiceKey> + '_ {
        self.manifest.languages.iter().flat_map(|e| {
            e.models
                .iter()
                .map(move |m| VoiceKey::new(e.language, m.id.clone()))
        })
    }

    /// Validate a selection, filling in the default language and model.
    pub fn resolve(
        &self,
        lang: Option<Lang>,
        model_id: Option<&str>,
        speaker: &str,
    ) -> TtsResult<ResolvedVoice> {
        let lang = lang.unwrap_or(self.default_lang);
        let entry = self.entry(lang)?;

        let model = match model_id.map(str::trim).filter(|m| !m.is_empty()) {
            None => &entry.models[0],
            Some(id) => entry.models.iter().find(|m| m.id == id).ok_or_else(|| {
                TtsError::unknown_voice(format!(
                    "Unsupported model for {lang}. Supported: {:?}",
                    entry.models.iter().map(|m| m.id.as_str()).collect::<Vec<_>>()
                ))
            })?,
        };

        if !model.speakers.iter().any(|s| s == speaker) {
            return Err(TtsError::unknown_voice(format!(
                "Unsupported speaker for {}. Supported: {:?}",
                model.id, model.speakers
            )));
        }

        Ok(ResolvedVoice {
            key: VoiceKey::new(lang, model.id.clone()),
            speaker: speaker.to_string(),
        })
    }

    fn entry(&self, lang: Lang) -> TtsResult<&LanguageEntry> {
        self.manifest
            .languages
            .iter()
            .find(|e| e.language == lang)
            .ok_or_else(|| {
                TtsError::unknown_voice(format!(
                    "Unsupported language. Supported: {:?}",
                    self.languages().map(|l| l.code()).collect::<Vec<_>>()
                ))
            })
    }
}
