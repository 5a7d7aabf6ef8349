//! Knowledge base: error kind -> explanation, fix, tags, emoji.
//!
//! The built-in table is parsed once from the embedded
//! `data/knowledge_base.json` and never mutated afterwards. The decode engine
//! only sees it through [`KnowledgeLookup`], so callers can swap in their own
//! table without touching the engine.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::categorize::last_segment;
use crate::domain::KnowledgeError;

const BUILTIN_JSON: &str = include_str!("../data/knowledge_base.json");

/// Emoji used when a kind has no entry.
pub const FALLBACK_EMOJI: &str = "❓";

static BUILTIN: LazyLock<Arc<KnowledgeBase>> = LazyLock::new(|| {
    match KnowledgeBase::from_json(BUILTIN_JSON) {
        Ok(kb) => Arc::new(kb),
        Err(err) => {
            tracing::error!(error = %err, "built-in knowledge base failed to load");
            Arc::new(KnowledgeBase::empty())
        }
    }
});

/// Read-only lookup capability the decode engine depends on.
pub trait KnowledgeLookup: Send + Sync {
    fn lookup(&self, error_kind: &str) -> Option<&KnowledgeEntry>;

    /// Identifies the snapshot records were decoded against.
    fn version(&self) -> &str;
}

/// What the knowledge base knows about one error kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub explanation: String,
    pub fix: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub emoji: String,
}

impl KnowledgeEntry {
    /// Generic entry for a kind the table does not cover.
    pub fn fallback(error_kind: &str) -> Self {
        Self {
            explanation: format!(
                "An error occurred: `{error_kind}`. This error type is not in the knowledge base yet, so here is what Python reported."
            ),
            fix: "Check the documentation for this error type and read the original message for clues."
                .to_string(),
            tags: Vec::new(),
            emoji: FALLBACK_EMOJI.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct RawKnowledgeBase {
    version: String,
    entries: BTreeMap<String, KnowledgeEntry>,
}

/// The built-in [`KnowledgeLookup`] implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeBase {
    version: String,
    digest: String,
    entries: BTreeMap<String, KnowledgeEntry>,
}

impl KnowledgeBase {
    /// Parse and validate a table in the `data/knowledge_base.json` layout.
    pub fn from_json(json: &str) -> Result<Self, KnowledgeError> {
        let raw: RawKnowledgeBase = serde_json::from_str(json)?;
        for (kind, entry) in &raw.entries {
            if entry.explanation.trim().is_empty() {
                return Err(KnowledgeError::InvalidEntry {
                    kind: kind.clone(),
                    field: "explanation",
                });
            }
            if entry.fix.trim().is_empty() {
                return Err(KnowledgeError::InvalidEntry {
                    kind: kind.clone(),
                    field: "fix",
                });
            }
        }
        Ok(Self {
            version: raw.version,
            digest: hex::encode(Sha256::digest(json.as_bytes())),
            entries: raw.entries,
        })
    }

    pub fn empty() -> Self {
        Self {
            version: "empty".to_string(),
            digest: hex::encode(Sha256::digest(b"")),
            entries: BTreeMap::new(),
        }
    }

    /// The process-wide table parsed from the embedded data file.
    pub fn builtin() -> Arc<KnowledgeBase> {
        Arc::clone(&BUILTIN)
    }

    /// SHA-256 hex digest of the source JSON.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Covered kinds in sorted order.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl KnowledgeLookup for KnowledgeBase {
    fn lookup(&self, error_kind: &str) -> Option<&KnowledgeEntry> {
        let kind = error_kind.trim();
        self.entries
            .get(kind)
            .or_else(|| self.entries.get(last_segment(kind)))
    }

    fn version(&self) -> &str {
        &self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_parses_and_validates() {
        let kb = KnowledgeBase::from_json(BUILTIN_JSON).unwrap();
        assert_eq!(kb.version(), "2024.1");
        assert!(kb.len() >= 40);
        for kind in kb.kinds() {
            let entry = kb.lookup(kind).unwrap();
            assert!(entry.explanation.len() > 10, "{kind} explanation too short");
            assert!(entry.fix.len() > 10, "{kind} fix too short");
            assert!(!entry.emoji.is_empty(), "{kind} has no emoji");
        }
    }

    #[test]
    fn test_common_errors_present() {
        let kb = KnowledgeBase::builtin();
        for kind in [
            "ValueError",
            "TypeError",
            "KeyError",
            "IndexError",
            "NameError",
            "AttributeError",
            "SyntaxError",
            "IndentationError",
            "ZeroDivisionError",
        ] {
            assert!(kb.lookup(kind).is_some(), "{kind} not covered");
        }
        assert!(kb
            .lookup("ValueError")
            .unwrap()
            .explanation
            .to_lowercase()
            .contains("value"));
        assert!(kb
            .lookup("TypeError")
            .unwrap()
            .explanation
            .to_lowercase()
            .contains("type"));
    }

    #[test]
    fn test_qualified_lookup_uses_last_segment() {
        let kb = KnowledgeBase::builtin();
        let entry = kb.lookup("json.decoder.JSONDecodeError").unwrap();
        assert!(entry.explanation.contains("JSON"));
        assert!(kb.lookup("NonExistentError").is_none());
    }

    #[test]
    fn test_digest_identifies_snapshot() {
        let kb = KnowledgeBase::builtin();
        assert_eq!(kb.digest().len(), 64);
        assert_eq!(kb.digest(), KnowledgeBase::from_json(BUILTIN_JSON).unwrap().digest());
        let other = KnowledgeBase::from_json(r#"{"version":"x","entries":{}}"#).unwrap();
        assert_ne!(kb.digest(), other.digest());
    }

    #[test]
    fn test_validation_rejects_empty_fields() {
        let err = KnowledgeBase::from_json(
            r#"{"version":"x","entries":{"Boom":{"explanation":"Something broke.","fix":"  "}}}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            KnowledgeError::InvalidEntry { ref kind, field: "fix" } if kind == "Boom"
        ));
        assert!(matches!(
            KnowledgeBase::from_json("[]"),
            Err(KnowledgeError::Parse(_))
        ));
    }

    #[test]
    fn test_fallback_entry_names_kind() {
        let entry = KnowledgeEntry::fallback("TotallyMadeUpError");
        assert!(entry.explanation.contains("TotallyMadeUpError"));
        assert!(!entry.fix.is_empty());
        assert!(entry.tags.is_empty());
        assert_eq!(entry.emoji, FALLBACK_EMOJI);
    }
}
