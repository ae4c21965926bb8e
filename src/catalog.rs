//! Protocol catalog interface.
//!
//! Protocol content lives in the external markdown CMS; this core only needs
//! the per-language listing of `{slug, title, category, frequency}`. The
//! catalog is treated as immutable within a request and fetched fresh each
//! time a prompt or resolution is built.

use serde::{Deserialize, Serialize};

/// Catalog language. The farm operates in Hebrew by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    #[serde(rename = "he")]
    He,
    #[serde(rename = "en")]
    En,
}

/// One assignable operational protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protocol {
    pub slug: String,
    pub title: String,
    pub category: String,
    #[serde(default)]
    pub frequency: Option<String>,
}

/// Read-only view of the protocol catalog.
pub trait ProtocolCatalog: Send + Sync {
    /// All protocols for a language. Order is the content store's order.
    fn protocols(&self, lang: Language) -> Vec<Protocol>;

    /// Lookup map from slug to display title.
    fn title_map(&self, lang: Language) -> std::collections::HashMap<String, String> {
        self.protocols(lang)
            .into_iter()
            .map(|p| (p.slug, p.title))
            .collect()
    }
}

/// Catalog backed by a JSON export from the content store.
///
/// The file holds `{"he": [...], "en": [...]}` and is re-read on every call
/// so a refreshed export is picked up without a restart. The catalog is small
/// (dozens of entries) so this is cheap.
pub struct FileCatalog {
    path: std::path::PathBuf,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    he: Vec<Protocol>,
    #[serde(default)]
    en: Vec<Protocol>,
}

impl FileCatalog {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> CatalogFile {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Protocol catalog unreadable");
                return CatalogFile::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(file) => file,
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Protocol catalog malformed");
                CatalogFile::default()
            }
        }
    }
}

impl ProtocolCatalog for FileCatalog {
    fn protocols(&self, lang: Language) -> Vec<Protocol> {
        let file = self.load();
        match lang {
            Language::He => file.he,
            Language::En => file.en,
        }
    }
}

/// Fixed in-memory catalog, used in tests and local development.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    pub entries: Vec<Protocol>,
}

impl StaticCatalog {
    pub fn new(entries: Vec<Protocol>) -> Self {
        Self { entries }
    }
}

impl ProtocolCatalog for StaticCatalog {
    fn protocols(&self, _lang: Language) -> Vec<Protocol> {
        self.entries.clone()
    }
}

#[cfg(test)]
pub(crate) fn test_catalog() -> StaticCatalog {
    StaticCatalog::new(vec![
        Protocol {
            slug: "oxygen-check".to_string(),
            title: "Oxygen Check".to_string(),
            category: "water-quality".to_string(),
            frequency: Some("daily".to_string()),
        },
        Protocol {
            slug: "feed-fattening".to_string(),
            title: "Feeding - Fattening Tanks".to_string(),
            category: "feeding".to_string(),
            frequency: Some("daily".to_string()),
        },
        Protocol {
            slug: "daily-clean".to_string(),
            title: "Daily Cleaning".to_string(),
            category: "maintenance".to_string(),
            frequency: None,
        },
    ])
}
