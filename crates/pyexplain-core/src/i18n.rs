//! Localized explanations keyed by error kind.
//!
//! English is the knowledge base itself; other languages ship a catalog that
//! overrides explanation and fix for the kinds it covers.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::categorize::last_segment;

const SPANISH_JSON: &str = include_str!("../data/i18n/es.json");

static SPANISH: LazyLock<HashMap<String, Translation>> = LazyLock::new(|| load(SPANISH_JSON));

/// Languages with an explanation catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "en")]
    English,
    #[serde(rename = "es")]
    Spanish,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Spanish => "es",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Spanish => "Español",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Raised when parsing a language code the catalog does not know.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported language: {0} (supported: en, es)")]
pub struct UnsupportedLanguage(pub String);

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Language::English),
            "es" | "spanish" | "español" => Ok(Language::Spanish),
            other => Err(UnsupportedLanguage(other.to_string())),
        }
    }
}

/// Every language [`translate`] understands.
pub fn supported_languages() -> &'static [Language] {
    &[Language::English, Language::Spanish]
}

/// Localized explanation and fix for one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translation {
    pub explanation: String,
    pub fix: String,
}

#[derive(Deserialize)]
struct Catalog {
    entries: HashMap<String, Translation>,
}

fn load(json: &str) -> HashMap<String, Translation> {
    match serde_json::from_str::<Catalog>(json) {
        Ok(catalog) => catalog.entries,
        Err(err) => {
            tracing::error!(error = %err, "translation catalog failed to load");
            HashMap::new()
        }
    }
}

/// Translation of `error_kind` into `language`, if the catalog has one.
/// English always returns `None`: the knowledge base is already English.
pub fn translate(error_kind: &str, language: Language) -> Option<Translation> {
    let catalog = match language {
        Language::English => return None,
        Language::Spanish => &*SPANISH,
    };
    catalog
        .get(error_kind)
        .or_else(|| catalog.get(last_segment(error_kind)))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_language_codes() {
        assert_eq!("en".parse::<Language>(), Ok(Language::English));
        assert_eq!("ES".parse::<Language>(), Ok(Language::Spanish));
        assert_eq!(
            "fr".parse::<Language>(),
            Err(UnsupportedLanguage("fr".to_string()))
        );
    }

    #[test]
    fn test_supported_languages() {
        let codes: Vec<_> = supported_languages().iter().map(|l| l.code()).collect();
        assert_eq!(codes, vec!["en", "es"]);
    }

    #[test]
    fn test_spanish_catalog_loads() {
        let catalog = load(SPANISH_JSON);
        assert!(catalog.len() >= 15);
        for (kind, entry) in &catalog {
            assert!(!entry.explanation.is_empty(), "{kind}");
            assert!(!entry.fix.is_empty(), "{kind}");
        }
    }

    #[test]
    fn test_translate() {
        let t = translate("ZeroDivisionError", Language::Spanish).unwrap();
        assert!(t.explanation.contains("cero"));
        assert!(translate("ZeroDivisionError", Language::English).is_none());
        assert!(translate("TotallyMadeUpError", Language::Spanish).is_none());
        assert!(translate("builtins.KeyError", Language::Spanish).is_some());
    }

    #[test]
    fn test_language_serde_uses_codes() {
        assert_eq!(serde_json::to_string(&Language::Spanish).unwrap(), "\"es\"");
        let lang: Language = serde_json::from_str("\"en\"").unwrap();
        assert_eq!(lang, Language::English);
    }
}
