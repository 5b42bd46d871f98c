//! Model registry: language code to loaded translator.
//!
//! The registry is built once at startup and never changes afterwards, so it
//! is shared between request handlers without locking.
//!
//! # Example
//! ```
//! use std::sync::Arc;
//! use indic_nmt::registry::ModelRegistry;
//! use indic_nmt::translate::Translator;
//!
//! struct Echo;
//! impl Translator for Echo {
//!     fn translate(&self, text: &str) -> indic_nmt::Result<String> {
//!         Ok(text.to_string())
//!     }
//! }
//!
//! let registry = ModelRegistry::from_translators([
//!     ("hi".to_string(), Arc::new(Echo) as Arc<dyn Translator>),
//! ]);
//! assert!(registry.contains("hi"));
//! assert!(registry.get("fr").is_none());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ModelsConfig;
use crate::error::{NmtError, Result};
use crate::inference::{parse_device, GenerationOverrides, MarianTranslator};
use crate::translate::Translator;

/// Immutable mapping from language code to translator
#[derive(Clone, Default)]
pub struct ModelRegistry {
    /// Language code -> translator (model + tokenizer)
    translators: HashMap<String, Arc<dyn Translator>>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("languages", &self.languages())
            .finish()
    }
}

impl ModelRegistry {
    /// Load every configured language from disk.
    ///
    /// Fails on the first language whose artifacts cannot be loaded; a
    /// partially populated registry is never returned.
    pub fn load(models: &ModelsConfig, overrides: &GenerationOverrides) -> Result<Self> {
        if models.languages.is_empty() {
            return Err(NmtError::Config("No languages configured".to_string()));
        }

        let device = parse_device(&models.device)?;
        tracing::info!(device = %models.device, "Loading {} language model(s)", models.languages.len());

        let mut translators: HashMap<String, Arc<dyn Translator>> = HashMap::new();
        for language in &models.languages {
            if translators.contains_key(language) {
                tracing::warn!("Language '{language}' listed twice, loading once");
                continue;
            }

            let dir = models.path_for(language);
            if !dir.is_dir() {
                return Err(NmtError::model_load(
                    language,
                    &dir,
                    "artifact directory not found",
                ));
            }

            let translator = MarianTranslator::load(language, &dir, &device, overrides)?;
            translators.insert(language.clone(), Arc::new(translator));
        }

        Ok(Self { translators })
    }

    /// Build a registry from already constructed translators
    pub fn from_translators(
        translators: impl IntoIterator<Item = (String, Arc<dyn Translator>)>,
    ) -> Self {
        Self {
            translators: translators.into_iter().collect(),
        }
    }

    /// Get the translator for a language code
    pub fn get(&self, language: &str) -> Option<Arc<dyn Translator>> {
        self.translators.get(language).cloned()
    }

    /// Check if a language is served
    pub fn contains(&self, language: &str) -> bool {
        self.translators.contains_key(language)
    }

    /// Served language codes, sorted
    pub fn languages(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.translators.keys().map(String::as_str).collect();
        codes.sort_unstable();
        codes
    }

    /// Sorted `(code, description)` pairs
    pub fn describe(&self) -> Vec<(String, String)> {
        self.languages()
            .into_iter()
            .filter_map(|code| {
                self.translators
                    .get(code)
                    .map(|t| (code.to_string(), t.describe()))
            })
            .collect()
    }

    /// Number of served languages
    pub fn len(&self) -> usize {
        self.translators.len()
    }

    /// No languages are served
    pub fn is_empty(&self) -> bool {
        self.translators.is_empty()
    }
}
