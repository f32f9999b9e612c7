//! Saved state: the revision table, tag table and index definitions.
//!
//! State is written as one CBOR document. Index contents are not saved;
//! they are rebuilt from the revision table on load.
//!
//! ```text
//! Snapshot
//! ├── version
//! ├── schemas, types        declarations in effect when saved
//! ├── indexes               IndexDefinition per index
//! ├── revisions[]           meta + object versions + tag changes
//! └── tags                  name -> revision id
//! ```

use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::index::{IndexDefinition, IndexManager, IndexSpec};
use crate::object::{ObjectGraph, ObjectId, PersistentObject, StoredObject};
use crate::revision::{Delta, Revision, RevisionMeta, RevisionStore, TagChange};
use crate::schema::{Registry, Schema, TypeDef};
use crate::store::{Store, StoreState};
use crate::types::RevisionId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serializable image of a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    version: u32,
    schemas: Vec<Schema>,
    types: Vec<(String, TypeDef)>,
    indexes: Vec<IndexDefinition>,
    revisions: Vec<StoredRevision>,
    tags: BTreeMap<String, RevisionId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRevision {
    meta: RevisionMeta,
    objects: Vec<(ObjectId, Option<StoredObject>)>,
    tags: BTreeMap<String, TagChange>,
}

impl Snapshot {
    /// Decodes a snapshot.
    ///
    /// # Errors
    ///
    /// `Codec` for malformed input or an unsupported version.
    pub fn read(reader: impl Read) -> CoreResult<Self> {
        let snapshot: Self =
            ciborium::from_reader(reader).map_err(|e| CoreError::codec(e.to_string()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(CoreError::codec(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        Ok(snapshot)
    }

    /// Encodes the snapshot.
    pub fn write(&self, writer: impl Write) -> CoreResult<()> {
        ciborium::into_writer(self, writer).map_err(|e| CoreError::codec(e.to_string()))
    }

    /// Rebuilds a registry from the saved declarations.
    ///
    /// Field indexes are re-declared. Computed indexes cannot be restored
    /// without their discriminator and are skipped with a warning.
    pub fn registry(&self) -> CoreResult<Registry> {
        let mut registry = Registry::new();
        for schema in &self.schemas {
            registry.register_schema(schema.clone())?;
        }
        for (name, ty) in &self.types {
            registry.register_type(name.clone(), ty.clone())?;
        }
        for def in self.indexes.iter().filter(|d| !d.builtin) {
            match IndexSpec::from_definition(def) {
                Some(spec) => registry.register_index(spec)?,
                None => warn!(index = %def.name, "computed index cannot be restored"),
            }
        }
        Ok(registry)
    }

    /// Returns the saved index definitions.
    #[must_use]
    pub fn indexes(&self) -> &[IndexDefinition] {
        &self.indexes
    }

    /// Returns the number of saved revisions.
    #[must_use]
    pub fn revision_count(&self) -> usize {
        self.revisions.len()
    }
}

impl Store {
    /// Captures the current state.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let registry = self.registry();
        let state = self.read_state();
        let revisions = state
            .revisions
            .iter()
            .map(|revision| StoredRevision {
                meta: revision.meta.clone(),
                objects: revision
                    .delta
                    .objects
                    .iter()
                    .map(|(id, version)| (*id, version.as_ref().map(|o| o.to_stored())))
                    .collect(),
                tags: revision.delta.tags.clone(),
            })
            .collect();
        Snapshot {
            version: SNAPSHOT_VERSION,
            schemas: registry.schemas().cloned().collect(),
            types: registry
                .types()
                .map(|(name, ty)| (name.to_string(), ty.clone()))
                .collect(),
            indexes: state.indexes.definitions(),
            revisions,
            tags: state.revisions.tags().clone(),
        }
    }

    /// Writes the current state to `writer`.
    pub fn save(&self, writer: impl Write) -> CoreResult<()> {
        let snapshot = self.snapshot();
        snapshot.write(writer)?;
        info!(revisions = snapshot.revision_count(), "state saved");
        Ok(())
    }

    /// Writes the current state to the file at `path`.
    pub fn save_to_path(&self, path: &Path) -> CoreResult<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.save(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Opens a store from state written by [`Store::save`].
    ///
    /// # Errors
    ///
    /// `Codec` if the state is malformed or names types the registry does
    /// not declare.
    pub fn load(registry: Registry, config: StoreConfig, reader: impl Read) -> CoreResult<Arc<Self>> {
        Self::from_snapshot(registry, config, Snapshot::read(reader)?)
    }

    /// Opens a store from the file at `path`.
    pub fn load_from_path(registry: Registry, config: StoreConfig, path: &Path) -> CoreResult<Arc<Self>> {
        Self::load(registry, config, BufReader::new(File::open(path)?))
    }

    /// Opens a store from a decoded snapshot.
    pub fn from_snapshot(
        mut registry: Registry,
        config: StoreConfig,
        snapshot: Snapshot,
    ) -> CoreResult<Arc<Self>> {
        registry.initialize()?;

        let mut graph = ObjectGraph::new();
        let mut revisions = Vec::with_capacity(snapshot.revisions.len());
        for stored in snapshot.revisions {
            let at = stored.meta.id;
            let mut delta = Delta::new();
            delta.tags = stored.tags;
            for (id, object) in stored.objects {
                let version = match object {
                    Some(object) => {
                        let ty = registry.type_def(&object.type_name).map_err(|_| {
                            CoreError::codec(format!(
                                "object {id} has undeclared type `{}`",
                                object.type_name
                            ))
                        })?;
                        Some(Arc::new(PersistentObject::from_stored(object, ty)?))
                    }
                    None => None,
                };
                graph.put(at, id, version.clone());
                delta.objects.insert(id, version);
            }
            revisions.push(Revision {
                meta: stored.meta,
                delta,
            });
        }
        let revisions = RevisionStore::from_parts(revisions, snapshot.tags)?;

        let mut indexes = IndexManager::new(registry.index_specs()?, config.tokenizer.clone());
        indexes.rebuild(&graph, revisions.history())?;
        for def in snapshot.indexes.iter().filter(|d| !d.builtin) {
            if indexes.contains(&def.name) {
                continue;
            }
            match IndexSpec::from_definition(def) {
                Some(spec) => {
                    let spec = registry.prepare_index(spec)?;
                    indexes.add_index(spec, &graph, revisions.history())?;
                }
                None => warn!(
                    index = %def.name,
                    "saved index is computed and not declared by the registry; skipped"
                ),
            }
        }

        info!(
            revisions = revisions.len(),
            latest = revisions.latest().as_u64(),
            "state loaded"
        );
        let state = StoreState {
            revisions,
            graph,
            indexes,
        };
        Ok(Arc::new(Self::from_state(Arc::new(registry), config, state)))
    }
}
