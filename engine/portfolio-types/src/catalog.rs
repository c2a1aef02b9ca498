//! Static instrument catalog
//!
//! The catalog is owned by an external collaborator; the engine only reads it
//! to decide whether an instrument id is known and to group holdings by sector.

use crate::error::EngineResult;
use crate::ids::InstrumentId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Immutable instrument metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub id: InstrumentId,
    pub ticker: String,
    pub sector: String,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    instruments: Vec<Instrument>,
}

/// Lookup table from instrument id to metadata
#[derive(Debug, Clone, Default)]
pub struct InstrumentCatalog {
    instruments: BTreeMap<InstrumentId, Instrument>,
}

impl InstrumentCatalog {
    pub fn new(instruments: impl IntoIterator<Item = Instrument>) -> Self {
        Self { instruments: instruments.into_iter().map(|i| (i.id, i)).collect() }
    }

    /// An empty catalog accepts every id
    pub fn permissive() -> Self {
        Self::default()
    }

    pub fn from_toml_str(content: &str) -> EngineResult<Self> {
        let file: CatalogFile = toml::from_str(content)?;
        Ok(Self::new(file.instruments))
    }

    pub fn load(path: &Path) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_toml_str(&content)?;
        tracing::debug!("Loaded {} instruments from {:?}", catalog.len(), path);
        Ok(catalog)
    }

    pub fn get(&self, id: InstrumentId) -> Option<&Instrument> {
        self.instruments.get(&id)
    }

    pub fn contains(&self, id: InstrumentId) -> bool {
        self.instruments.contains_key(&id)
    }

    /// Whether ticks and events for `id` should be processed
    pub fn accepts(&self, id: InstrumentId) -> bool {
        self.instruments.is_empty() || self.contains(id)
    }

    pub fn sector_of(&self, id: InstrumentId) -> Option<&str> {
        self.get(id).map(|i| i.sector.as_str())
    }

    pub fn ticker_of(&self, id: InstrumentId) -> Option<&str> {
        self.get(id).map(|i| i.ticker.as_str())
    }

    /// Resolve a numeric id or a ticker (case-insensitive)
    pub fn resolve(&self, symbol: &str) -> Option<InstrumentId> {
        let symbol = symbol.trim();
        if let Ok(id) = symbol.parse::<InstrumentId>() {
            return self.accepts(id).then_some(id);
        }
        self.instruments.values().find(|i| i.ticker.eq_ignore_ascii_case(symbol)).map(|i| i.id)
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instrument> {
        self.instruments.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [[instruments]]
        id = 1
        ticker = "ADANIENT"
        sector = "Infrastructure"
        display_name = "Adani Enterprises"

        [[instruments]]
        id = 24
        ticker = "INFY"
        sector = "Tech"
        display_name = "Infosys"
    "#;

    #[test]
    fn test_parse_catalog() {
        let catalog = InstrumentCatalog::from_toml_str(SAMPLE).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.ticker_of(InstrumentId(24)), Some("INFY"));
        assert_eq!(catalog.sector_of(InstrumentId(1)), Some("Infrastructure"));
        assert!(catalog.accepts(InstrumentId(1)));
        assert!(!catalog.accepts(InstrumentId(99)));
    }

    #[test]
    fn test_resolve_symbol() {
        let catalog = InstrumentCatalog::from_toml_str(SAMPLE).unwrap();
        assert_eq!(catalog.resolve("infy"), Some(InstrumentId(24)));
        assert_eq!(catalog.resolve(" 1 "), Some(InstrumentId(1)));
        assert_eq!(catalog.resolve("99"), None);
        assert_eq!(catalog.resolve("TCS"), None);
    }

    #[test]
    fn test_permissive_catalog_accepts_everything() {
        let catalog = InstrumentCatalog::permissive();
        assert!(catalog.accepts(InstrumentId(12345)));
        assert!(catalog.get(InstrumentId(1)).is_none());
    }

    #[test]
    fn test_malformed_catalog_is_config_error() {
        let err = InstrumentCatalog::from_toml_str("instruments = 3").unwrap_err();
        assert!(matches!(err, crate::EngineError::Config(_)));
    }
}
