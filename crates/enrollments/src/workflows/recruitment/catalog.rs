use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::domain::{Category, DomainName};

const DEFAULT_SELECTION_LIMIT: usize = 2;

/// One competition track and where its records live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEntry {
    pub name: DomainName,
    pub category: Category,
    /// Table suffix appended to the configured prefix.
    pub table: String,
}

/// Raw catalog file layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    pub domains: Vec<DomainEntry>,
    #[serde(default)]
    pub selection_limits: BTreeMap<Category, usize>,
    #[serde(default)]
    pub closed: Vec<DomainName>,
}

/// Static domain → category/table mapping plus the closed-domain deny-list.
#[derive(Debug, Clone)]
pub struct DomainCatalog {
    entries: BTreeMap<DomainName, DomainEntry>,
    selection_limits: BTreeMap<Category, usize>,
    closed: BTreeSet<DomainName>,
}

impl DomainCatalog {
    pub fn from_file_layout(layout: CatalogFile) -> Result<Self, CatalogError> {
        let mut entries = BTreeMap::new();
        let mut tables = BTreeSet::new();
        for entry in layout.domains {
            if entry.name.as_str().is_empty() {
                return Err(CatalogError::Invalid("domain name cannot be empty".to_string()));
            }
            if entry.table.trim().is_empty() {
                return Err(CatalogError::Invalid(format!(
                    "domain {} has no table",
                    entry.name
                )));
            }
            if !tables.insert(entry.table.clone()) {
                return Err(CatalogError::Invalid(format!(
                    "table '{}' is mapped to more than one domain",
                    entry.table
                )));
            }
            if let Some(previous) = entries.insert(entry.name.clone(), entry) {
                return Err(CatalogError::Invalid(format!(
                    "domain {} is listed twice",
                    previous.name
                )));
            }
        }

        for closed in &layout.closed {
            if !entries.contains_key(closed) {
                return Err(CatalogError::Invalid(format!(
                    "closed domain {closed} is not in the catalog"
                )));
            }
        }

        Ok(Self {
            entries,
            selection_limits: layout.selection_limits,
            closed: layout.closed.into_iter().collect(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let layout: CatalogFile = serde_json::from_str(&raw)?;
        Self::from_file_layout(layout)
    }

    /// Built-in catalog: ten domains across tech, management and design.
    pub fn standard() -> Self {
        let domain = |name: &str, category, table: &str| DomainEntry {
            name: DomainName::new(name),
            category,
            table: table.to_string(),
        };

        let layout = CatalogFile {
            domains: vec![
                domain("WEB", Category::Tech, "web"),
                domain("APP", Category::Tech, "app"),
                domain("IOT", Category::Tech, "iot"),
                domain("AI/ML", Category::Tech, "ai"),
                domain("RND", Category::Tech, "rnd"),
                domain("EVENTS", Category::Management, "events"),
                domain("PNM", Category::Management, "pnm"),
                domain("UI/UX", Category::Design, "ui"),
                domain("GRAPHIC DESIGN", Category::Design, "graphic"),
                domain("VIDEO EDITING", Category::Design, "video"),
            ],
            selection_limits: BTreeMap::from([(Category::Tech, 3)]),
            closed: Vec::new(),
        };

        let mut entries = BTreeMap::new();
        for entry in layout.domains {
            entries.insert(entry.name.clone(), entry);
        }
        Self {
            entries,
            selection_limits: layout.selection_limits,
            closed: BTreeSet::new(),
        }
    }

    /// Adds names to the deny-list. Unknown names are returned so callers can log them.
    pub fn close<I, S>(&mut self, names: I) -> Vec<DomainName>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unknown = Vec::new();
        for raw in names {
            let name = DomainName::new(raw.as_ref());
            if self.entries.contains_key(&name) {
                self.closed.insert(name);
            } else {
                unknown.push(name);
            }
        }
        unknown
    }

    pub fn entry(&self, domain: &DomainName) -> Option<&DomainEntry> {
        self.entries.get(domain)
    }

    pub fn category_of(&self, domain: &DomainName) -> Option<Category> {
        self.entry(domain).map(|entry| entry.category)
    }

    pub fn is_closed(&self, domain: &DomainName) -> bool {
        self.closed.contains(domain)
    }

    pub fn selection_limit(&self, category: Category) -> usize {
        self.selection_limits
            .get(&category)
            .copied()
            .unwrap_or(DEFAULT_SELECTION_LIMIT)
    }

    pub fn domains(&self) -> impl Iterator<Item = &DomainEntry> {
        self.entries.values()
    }
}

impl Default for DomainCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("catalog is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid catalog: {0}")]
    Invalid(String),
}
