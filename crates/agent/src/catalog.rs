//! In-memory item catalog served to the bridge.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AgentError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Anything else the catalog file carries is passed through as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CatalogItem {
    fn matches(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
            || self.tags.iter().any(|t| t.to_lowercase().contains(needle))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    items: Vec<CatalogItem>,
}

impl Catalog {
    pub fn new(items: Vec<CatalogItem>) -> Self {
        Self { items }
    }

    /// Load a JSON array of items from `path`.
    pub async fn load(path: &Path) -> Result<Self, AgentError> {
        let raw = tokio::fs::read(path).await.map_err(|source| AgentError::CatalogRead {
            path: path.display().to_string(),
            source,
        })?;
        let items: Vec<CatalogItem> =
            serde_json::from_slice(&raw).map_err(|source| AgentError::CatalogParse {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self::new(items))
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Case-insensitive match on name and tags.
    ///
    /// Returns at most `limit` items in catalog order, plus the total
    /// number of matches.
    pub fn search(&self, query: &str, limit: usize) -> (Vec<&CatalogItem>, usize) {
        let needle = query.trim().to_lowercase();
        let matches: Vec<&CatalogItem> = self.items.iter().filter(|item| item.matches(&needle)).collect();
        let total = matches.len();
        (matches.into_iter().take(limit).collect(), total)
    }

    pub fn get(&self, id: &str) -> Option<&CatalogItem> {
        self.items.iter().find(|item| item.id == id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use serde_json::json;

    use super::*;

    pub(crate) fn sample() -> Catalog {
        serde_json::from_value::<Vec<CatalogItem>>(json!([
            {"id": "fox-01", "name": "Red Fox", "tags": ["animal", "forest"], "url": "https://cdn/fox.png"},
            {"id": "owl-01", "name": "Snowy Owl", "tags": ["animal", "bird"]},
            {"id": "pine-01", "name": "Pine Forest", "tags": ["landscape"]},
        ]))
        .map(Catalog::new)
        .unwrap()
    }

    #[test]
    fn search_matches_name_and_tags_case_insensitively() {
        let catalog = sample();

        let (items, total) = catalog.search("FOREST", 20);
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["fox-01", "pine-01"]);
        assert_eq!(total, 2);
    }

    #[test]
    fn search_limit_caps_items_not_total() {
        let catalog = sample();
        let (items, total) = catalog.search("animal", 1);
        assert_eq!(items.len(), 1);
        assert_eq!(total, 2);
    }

    #[test]
    fn extra_fields_survive() {
        let catalog = sample();
        let fox = catalog.get("fox-01").unwrap();
        assert_eq!(fox.extra.get("url"), Some(&json!("https://cdn/fox.png")));
        assert!(catalog.get("missing").is_none());
    }

    #[tokio::test]
    async fn load_reads_json_file() {
        let path = std::env::temp_dir().join(format!("atelier-catalog-{}.json", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, r#"[{"id":"a","name":"Alpha"}]"#).await.unwrap();

        let catalog = Catalog::load(&path).await.unwrap();
        assert_eq!(catalog.item_count(), 1);
        assert!(catalog.get("a").unwrap().tags.is_empty());

        tokio::fs::write(&path, "{not json").await.unwrap();
        assert!(matches!(Catalog::load(&path).await, Err(AgentError::CatalogParse { .. })));

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn missing_file_is_a_read_error() {
        let result = Catalog::load(Path::new("/nonexistent/atelier/catalog.json")).await;
        assert!(matches!(result, Err(AgentError::CatalogRead { .. })));
    }
}
