use crate::error::LoadError;
use crate::model::{ItemId, ItemMapping, Quote, Snapshot, Volume24h};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let display = path.display().to_string();
    let raw = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: display.clone(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| LoadError::Json {
        path: display,
        source,
    })
}

fn read_enveloped<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let mut value: Value = read_json(path)?;
    let payload = if value.get("data").is_some() {
        value["data"].take()
    } else {
        value
    };
    serde_json::from_value(payload).map_err(|source| LoadError::Json {
        path: path.display().to_string(),
        source,
    })
}

pub fn load_catalog(path: impl AsRef<Path>) -> Result<Vec<ItemMapping>, LoadError> {
    read_json(path.as_ref())
}

pub fn load_snapshot(path: impl AsRef<Path>, taken_at: i64) -> Result<Snapshot, LoadError> {
    let quotes: BTreeMap<ItemId, Quote> = read_enveloped(path.as_ref())?;
    Ok(Snapshot::new(taken_at, quotes))
}

pub fn load_volumes(path: impl AsRef<Path>) -> Result<HashMap<ItemId, Volume24h>, LoadError> {
    read_enveloped(path.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_wrapped_and_bare_snapshots() {
        let wrapped = write(r#"{"data":{"4151":{"high":1500000,"highTime":1,"low":1450000,"lowTime":2}}}"#);
        let bare = write(r#"{"4151":{"high":1500000,"highTime":1,"low":1450000,"lowTime":2}}"#);
        let a = load_snapshot(wrapped.path(), 10).unwrap();
        let b = load_snapshot(bare.path(), 10).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.quotes[&4151].mid(), Some(1_475_000.0));
    }

    #[test]
    fn loads_catalog_and_volumes() {
        let catalog = write(r#"[{"id":2,"name":"Cannonball","limit":11000,"value":5,"members":true}]"#);
        let items = load_catalog(catalog.path()).unwrap();
        assert_eq!(items[0].trade_limit(), 11_000.0);

        let volumes = write(r#"{"data":{"2":{"highPriceVolume":100,"lowPriceVolume":null}}}"#);
        let v = load_volumes(volumes.path()).unwrap();
        assert_eq!(v[&2].total(), 100.0);
    }

    #[test]
    fn reports_path_on_failure() {
        let err = load_catalog("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.json"));
        let bad = write("[{");
        assert!(matches!(load_catalog(bad.path()), Err(LoadError::Json { .. })));
    }
}
