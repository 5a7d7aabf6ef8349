//! Error-kind categorization.
//!
//! The closed [`Category`] set is code; the mapping from kind names onto it is
//! data (`data/categories.json`). Resolution: exact-name table first, then the
//! ordered rule list (first match wins), then [`Category::Other`]. Qualified
//! names are matched on their last dotted segment.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use serde::{Deserialize, Serialize};

use crate::domain::CategoryTableError;

const BUILTIN_JSON: &str = include_str!("../data/categories.json");

static BUILTIN: LazyLock<Arc<CategoryTable>> = LazyLock::new(|| {
    match CategoryTable::from_json(BUILTIN_JSON) {
        Ok(table) => Arc::new(table),
        Err(err) => {
            tracing::error!(error = %err, "built-in category table failed to load");
            Arc::new(CategoryTable::empty())
        }
    }
});

/// Coarse error family shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Syntax Errors")]
    Syntax,
    #[serde(rename = "Name Errors")]
    Name,
    #[serde(rename = "Type Errors")]
    Type,
    #[serde(rename = "Arithmetic Errors")]
    Arithmetic,
    #[serde(rename = "Lookup Errors")]
    Lookup,
    #[serde(rename = "Import Errors")]
    Import,
    #[serde(rename = "File Errors")]
    File,
    #[serde(rename = "Runtime Errors")]
    Runtime,
    #[serde(rename = "Other")]
    Other,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Syntax,
        Category::Name,
        Category::Type,
        Category::Arithmetic,
        Category::Lookup,
        Category::Import,
        Category::File,
        Category::Runtime,
        Category::Other,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::Syntax => "Syntax Errors",
            Category::Name => "Name Errors",
            Category::Type => "Type Errors",
            Category::Arithmetic => "Arithmetic Errors",
            Category::Lookup => "Lookup Errors",
            Category::Import => "Import Errors",
            Category::File => "File Errors",
            Category::Runtime => "Runtime Errors",
            Category::Other => "Other",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Category::ALL.iter().copied().find(|c| c.label() == label)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a rule pattern is compared against a kind name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Contains,
    Prefix,
    Suffix,
}

/// One ordered heuristic rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRule {
    pub match_kind: MatchKind,
    pub pattern: String,
    pub category: Category,
}

impl CategoryRule {
    fn matches(&self, name: &str) -> bool {
        match self.match_kind {
            MatchKind::Contains => name.contains(&self.pattern),
            MatchKind::Prefix => name.starts_with(&self.pattern),
            MatchKind::Suffix => name.ends_with(&self.pattern),
        }
    }
}

#[derive(Deserialize)]
struct RawTable {
    version: String,
    #[serde(default)]
    exact: HashMap<String, String>,
    #[serde(default)]
    rules: Vec<RawRule>,
}

#[derive(Deserialize)]
struct RawRule {
    #[serde(rename = "match")]
    match_kind: MatchKind,
    pattern: String,
    category: String,
}

/// Immutable kind-to-category mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTable {
    version: String,
    exact: HashMap<String, Category>,
    rules: Vec<CategoryRule>,
}

impl CategoryTable {
    /// Parse a table in the `data/categories.json` layout.
    pub fn from_json(json: &str) -> Result<Self, CategoryTableError> {
        let raw: RawTable = serde_json::from_str(json)?;
        let resolve = |label: &str| {
            Category::from_label(label)
                .ok_or_else(|| CategoryTableError::UnknownCategory(label.to_string()))
        };
        let exact = raw
            .exact
            .into_iter()
            .map(|(name, label)| resolve(&label).map(|category| (name, category)))
            .collect::<Result<HashMap<_, _>, CategoryTableError>>()?;
        let rules = raw
            .rules
            .into_iter()
            .map(|rule| {
                resolve(&rule.category).map(|category| CategoryRule {
                    match_kind: rule.match_kind,
                    pattern: rule.pattern,
                    category,
                })
            })
            .collect::<Result<Vec<_>, CategoryTableError>>()?;
        Ok(Self {
            version: raw.version,
            exact,
            rules,
        })
    }

    /// A table that maps everything to [`Category::Other`].
    pub fn empty() -> Self {
        Self {
            version: "empty".to_string(),
            exact: HashMap::new(),
            rules: Vec::new(),
        }
    }

    /// The process-wide table parsed from the embedded data file.
    pub fn builtin() -> Arc<CategoryTable> {
        Arc::clone(&BUILTIN)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }

    /// Map `error_kind` to its category. Total and deterministic.
    ///
    /// The exact table is consulted for the qualified name, then for its last
    /// dotted segment. Rules only ever see the last segment.
    pub fn categorize(&self, error_kind: &str) -> Category {
        let qualified = error_kind.trim();
        let name = last_segment(qualified);
        if name.is_empty() {
            return Category::Other;
        }
        if let Some(category) = self.exact.get(qualified).or_else(|| self.exact.get(name)) {
            return *category;
        }
        self.rules
            .iter()
            .find(|rule| rule.matches(name))
            .map(|rule| rule.category)
            .unwrap_or(Category::Other)
    }
}

/// Categorize with the built-in table.
pub fn categorize(error_kind: &str) -> Category {
    BUILTIN.categorize(error_kind)
}

/// `pkg.mod.FooError` -> `FooError`.
pub(crate) fn last_segment(name: &str) -> &str {
    let name = name.trim();
    name.rsplit('.').next().unwrap_or(name)
}
