//! Loading and saving state files.

use saldb_core::{Snapshot, Store, StoreConfig};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

/// Opens the store saved at `path` using the registry recorded in it.
pub fn open(path: &Path) -> Result<Arc<Store>, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No state file found at {:?}", path).into());
    }
    let snapshot = Snapshot::read(BufReader::new(File::open(path)?))?;
    let registry = snapshot.registry()?;
    Ok(Store::from_snapshot(registry, StoreConfig::default(), snapshot)?)
}

/// Writes `store` back to `path`, replacing the file only once the new
/// state is fully written.
pub fn save(store: &Store, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let staging = path.with_extension("saving");
    store.save_to_path(&staging)?;
    fs::rename(&staging, path)?;
    Ok(())
}

/// Serializes `value` as pretty JSON to stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
