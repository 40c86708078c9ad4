//! Market Data Store
//!
//! Out-of-band cache of fetched market data, keyed by symbol. Saving merges
//! into what is already stored: per symbol, fields present in the new record
//! overwrite, the others are kept.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use crate::error::Result;
use crate::model::{CryptoData, merge_crypto_data};

/// Market data storage trait
pub trait MarketDataStore: Send + Sync {
    /// Load everything stored under `key`. A missing entry is empty, not an error.
    fn load(&self, key: &str) -> Result<CryptoData>;

    /// Merge `data` into the entry under `key`, returning where it was written
    fn save(&self, key: &str, data: &CryptoData) -> Result<String>;
}

/// Pretty-printed JSON files under one directory
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl MarketDataStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<CryptoData> {
        let path = self.path_for(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(CryptoData::new()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&raw) {
            Ok(data) => Ok(data),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Corrupt data file, starting empty");
                Ok(CryptoData::new())
            }
        }
    }

    fn save(&self, key: &str, data: &CryptoData) -> Result<String> {
        fs::create_dir_all(&self.dir)?;

        let mut merged = self.load(key)?;
        merge_crypto_data(&mut merged, data.clone());

        let path = self.path_for(key);
        fs::write(&path, serde_json::to_string_pretty(&merged)?)?;

        tracing::debug!(path = %path.display(), symbols = merged.len(), "Market data saved");
        Ok(path.display().to_string())
    }
}

/// In-memory store (for tests and offline runs)
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, CryptoData>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `data` under `key`
    pub fn with_entry(key: impl Into<String>, data: CryptoData) -> Self {
        let store = Self::new();
        store
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), data);
        store
    }
}

impl MarketDataStore for MemoryStore {
    fn load(&self, key: &str) -> Result<CryptoData> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned().unwrap_or_default())
    }

    fn save(&self, key: &str, data: &CryptoData) -> Result<String> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        merge_crypto_data(entries.entry(key.to_string()).or_default(), data.clone());
        Ok(format!("memory://{key}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Candle, CoinData, Quote};
    use rust_decimal_macros::dec;

    fn btc_quote() -> Quote {
        Quote {
            id: "bitcoin".into(),
            symbol: "btc".into(),
            name: "Bitcoin".into(),
            current_price: Some(dec!(97500)),
            market_cap: None,
            total_volume: None,
            high_24h: None,
            low_24h: None,
            price_change_percentage_24h: None,
            last_updated: None,
        }
    }

    fn single(symbol: &str, data: CoinData) -> CryptoData {
        CryptoData::from([(symbol.to_string(), data)])
    }

    fn price_then_ohlcv(store: &dyn MarketDataStore) {
        store
            .save(
                "crypto_data.json",
                &single(
                    "BTC",
                    CoinData {
                        price: Some(btc_quote()),
                        ..Default::default()
                    },
                ),
            )
            .unwrap();
        store
            .save(
                "crypto_data.json",
                &single(
                    "BTC",
                    CoinData {
                        ohlcv: Some(vec![Candle {
                            time: 1,
                            open: 1.0,
                            high: 2.0,
                            low: 0.5,
                            close: 1.5,
                            volume: None,
                        }]),
                        ..Default::default()
                    },
                ),
            )
            .unwrap();

        let loaded = store.load("crypto_data.json").unwrap();
        let btc = &loaded["BTC"];
        assert_eq!(btc.price.as_ref().unwrap().current_price, Some(dec!(97500)));
        assert_eq!(btc.ohlcv.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_json_store_merges_per_symbol() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested"));
        price_then_ohlcv(&store);

        let raw = fs::read_to_string(dir.path().join("nested/crypto_data.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(value["BTC"].get("price").is_some());
        assert!(value["BTC"].get("ohlcv").is_some());
    }

    #[test]
    fn test_memory_store_merges_per_symbol() {
        price_then_ohlcv(&MemoryStore::new());
    }

    #[test]
    fn test_missing_and_corrupt_files_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.load("absent.json").unwrap().is_empty());

        fs::write(dir.path().join("bad.json"), "{ not json").unwrap();
        assert!(store.load("bad.json").unwrap().is_empty());
    }

    #[test]
    fn test_save_returns_location() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let location = store.save("out.json", &CryptoData::new()).unwrap();
        assert!(location.ends_with("out.json"));
        assert_eq!(MemoryStore::new().save("k", &CryptoData::new()).unwrap(), "memory://k");
    }
}
