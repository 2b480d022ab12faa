//! Static item/zone catalog, loaded once from a JSON export of the game
//! data sheets. Read-only lookups.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ItemInfo {
    pub name: String,
    pub category: String,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    items: HashMap<u32, ItemInfo>,
    #[serde(default)]
    zones: HashMap<u32, String>,
}

#[derive(Debug, Default)]
pub struct StaticCatalog {
    items: HashMap<u32, ItemInfo>,
    zones: HashMap<u32, String>,
}

impl StaticCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading catalog {}", path.display()))?;
        let file: CatalogFile = serde_json::from_str(&raw).context("parsing catalog json")?;
        Ok(Self { items: file.items, zones: file.zones })
    }

    pub fn item(&self, item_id: u32) -> Option<&ItemInfo> {
        self.items.get(&item_id)
    }

    pub fn zone(&self, zone_id: u32) -> Option<&str> {
        self.zones.get(&zone_id).map(|s| s.as_str())
    }

    pub fn add_item(&mut self, item_id: u32, name: &str, category: &str) {
        self.items.insert(item_id, ItemInfo { name: name.to_string(), category: category.to_string() });
    }

    pub fn add_zone(&mut self, zone_id: u32, name: &str) {
        self.zones.insert(zone_id, name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_resolve_and_miss() {
        let mut cat = StaticCatalog::empty();
        cat.add_item(4551, "Potion", "Medicine");
        cat.add_zone(129, "Limsa Lominsa Lower Decks");

        assert_eq!(cat.item(4551).unwrap().name, "Potion");
        assert_eq!(cat.zone(129), Some("Limsa Lominsa Lower Decks"));
        assert!(cat.item(1).is_none());
        assert!(cat.zone(1).is_none());
    }
}
