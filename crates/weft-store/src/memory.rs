use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tracing::debug;

use weft_types::{CausalHash, Entity, Hash32, HashJwt};

use crate::error::{StoreError, StoreResult};
use crate::traits::{EntityOps, Location, StoreConnection, SyncStore};

/// In-memory entity store for tests and embedding.
///
/// All state lives behind one `Mutex`; a connection is a clone of the shared
/// handle, and a transaction holds the lock for its whole closure, so each
/// connection sees batches atomically. Rollback of a failed transaction is
/// not implemented -- real backends provide it.
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entities in main storage.
    pub fn main_len(&self) -> usize {
        self.shared.lock().expect("lock poisoned").main.len()
    }

    /// Number of entities staged in the temp table.
    pub fn temp_len(&self) -> usize {
        self.shared.lock().expect("lock poisoned").temp.len()
    }

    /// Returns `true` if both main and temp are empty.
    pub fn is_empty(&self) -> bool {
        let state = self.shared.lock().expect("lock poisoned");
        state.main.is_empty() && state.temp.is_empty()
    }

    /// Where an entity currently lives.
    pub fn location_of(&self, hash: Hash32) -> Location {
        let state = self.shared.lock().expect("lock poisoned");
        if state.main.contains_key(&hash) {
            Location::Main
        } else if state.temp.contains_key(&hash) {
            Location::Temp
        } else {
            Location::Absent
        }
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock().expect("lock poisoned");
        f.debug_struct("MemoryStore")
            .field("main", &state.main.len())
            .field("temp", &state.temp.len())
            .finish()
    }
}

impl SyncStore for MemoryStore {
    type Conn = MemoryConnection;

    fn connect(&self) -> StoreResult<MemoryConnection> {
        Ok(MemoryConnection {
            shared: Arc::clone(&self.shared),
        })
    }
}

/// A connection to a [`MemoryStore`].
pub struct MemoryConnection {
    shared: Arc<Mutex<StoreState>>,
}

impl StoreConnection for MemoryConnection {
    fn transaction<T, F>(&mut self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut dyn EntityOps) -> StoreResult<T>,
    {
        let mut state = self.shared.lock().expect("lock poisoned");
        f(&mut *state)
    }
}

#[derive(Default)]
struct StoreState {
    main: HashMap<Hash32, Entity>,
    temp: HashMap<Hash32, TempRow>,
    /// Reverse index: missing dependency -> temp rows waiting on it.
    waiters: HashMap<Hash32, BTreeSet<Hash32>>,
}

struct TempRow {
    entity: Entity,
    missing: BTreeMap<Hash32, HashJwt>,
}

impl StoreState {
    /// Flush temp rows whose missing sets were emptied by `first` (and by
    /// anything that flush itself promotes) reaching main.
    fn settle_waiters(&mut self, first: Hash32) {
        let mut newly_main = VecDeque::from([first]);
        while let Some(hash) = newly_main.pop_front() {
            let Some(dependents) = self.waiters.remove(&hash) else {
                continue;
            };
            for dependent in dependents {
                let satisfied = match self.temp.get_mut(&dependent) {
                    Some(row) => {
                        row.missing.remove(&hash);
                        row.missing.is_empty()
                    }
                    None => false,
                };
                if satisfied {
                    if let Some(row) = self.temp.remove(&dependent) {
                        debug!(entity = %dependent.short_hex(), "promoted temp entity to main");
                        self.main.insert(dependent, row.entity);
                        newly_main.push_back(dependent);
                    }
                }
            }
        }
    }
}

impl EntityOps for StoreState {
    fn entity_location(&mut self, hash: Hash32) -> StoreResult<Location> {
        if self.main.contains_key(&hash) {
            Ok(Location::Main)
        } else if self.temp.contains_key(&hash) {
            Ok(Location::Temp)
        } else {
            Ok(Location::Absent)
        }
    }

    fn expect_entity(&mut self, hash: Hash32) -> StoreResult<Entity> {
        if let Some(entity) = self.main.get(&hash) {
            return Ok(entity.clone());
        }
        if let Some(row) = self.temp.get(&hash) {
            return Ok(row.entity.clone());
        }
        Err(StoreError::EntityAbsent(hash))
    }

    fn save_temp_entity_in_main(&mut self, hash: Hash32, entity: &Entity) -> StoreResult<()> {
        for dep in entity.dependencies() {
            if !self.main.contains_key(&dep.hash()) {
                return Err(StoreError::DependencyNotInMain {
                    entity: hash,
                    dependency: dep.hash(),
                });
            }
        }
        self.temp.remove(&hash);
        // Main rows are immutable; a re-save of the same content is a no-op.
        self.main.entry(hash).or_insert_with(|| entity.clone());
        self.settle_waiters(hash);
        Ok(())
    }

    fn insert_temp_entity(
        &mut self,
        hash: Hash32,
        entity: &Entity,
        missing: &BTreeMap<Hash32, HashJwt>,
    ) -> StoreResult<()> {
        if missing.is_empty() {
            return Err(StoreError::EmptyMissingSet(hash));
        }
        for dep in missing.keys() {
            self.waiters.entry(*dep).or_default().insert(hash);
        }
        self.temp.insert(
            hash,
            TempRow {
                entity: entity.clone(),
                missing: missing.clone(),
            },
        );
        Ok(())
    }

    fn load_causal_parents_by_hash(&mut self, hash: CausalHash) -> StoreResult<Vec<CausalHash>> {
        match self.main.get(&hash.hash()) {
            Some(Entity::Causal { parents, .. }) => {
                Ok(parents.iter().map(HashJwt::causal_hash).collect())
            }
            _ => Ok(Vec::new()),
        }
    }
}
