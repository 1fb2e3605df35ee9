use std::collections::{BTreeMap, BTreeSet, VecDeque};

use weft_types::{CausalHash, Entity, Hash32, HashJwt};

use crate::error::StoreResult;

/// Where an entity currently lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Location {
    /// In the main object/causal tables; all dependencies transitively in main.
    Main,
    /// Staged in the temp table, with a non-empty missing-dependency set.
    Temp,
    /// Not present in any table.
    Absent,
}

/// Handle to a store; hands out connections.
///
/// The sync engine opens its own connections: the push path uses one, and
/// each long-lived pull worker (inserter, elaborator) holds its own, since
/// a connection must not be shared between tasks.
pub trait SyncStore: Send + Sync {
    type Conn: StoreConnection + 'static;

    fn connect(&self) -> StoreResult<Self::Conn>;
}

/// A single store connection. Transactions are exclusive per connection;
/// related mutations must be grouped into one `transaction` call so that
/// observers on other connections never see a partial batch.
pub trait StoreConnection: Send {
    fn transaction<T, F>(&mut self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut dyn EntityOps) -> StoreResult<T>;
}

/// Entity operations available inside a transaction.
///
/// Implementations must maintain the closure invariant: an entity may only
/// be written to main once every one of its dependencies is in main, and a
/// write to main promotes any temp rows whose recorded missing sets become
/// empty as a result (cascading).
pub trait EntityOps {
    fn entity_location(&mut self, hash: Hash32) -> StoreResult<Location>;

    /// Whether the entity is present in main or temp storage.
    fn entity_exists(&mut self, hash: Hash32) -> StoreResult<bool> {
        Ok(self.entity_location(hash)? != Location::Absent)
    }

    /// Load an entity from main or temp storage; errors if absent.
    fn expect_entity(&mut self, hash: Hash32) -> StoreResult<Entity>;

    /// Write an entity to main storage.
    ///
    /// Precondition: every dependency of `entity` is in main. Cascades
    /// through waiting temp rows as described above.
    fn save_temp_entity_in_main(&mut self, hash: Hash32, entity: &Entity) -> StoreResult<()>;

    /// Stage an entity in the temp table with its missing dependencies.
    ///
    /// `missing` maps each not-yet-in-main dependency hash to the fetch
    /// token the entity carried for it, and must be non-empty.
    fn insert_temp_entity(
        &mut self,
        hash: Hash32,
        entity: &Entity,
        missing: &BTreeMap<Hash32, HashJwt>,
    ) -> StoreResult<()>;

    /// Parents of a causal in main storage; empty for roots and for hashes
    /// that are unknown or not causals.
    fn load_causal_parents_by_hash(&mut self, hash: CausalHash) -> StoreResult<Vec<CausalHash>>;

    /// Insert a downloaded entity wherever it belongs, reporting where it
    /// ended up.
    ///
    /// An entity already present is left untouched. Otherwise its
    /// dependencies decide: all in main means the entity goes straight to
    /// main, while any dependency not in main (absent *or* still staged)
    /// lands the entity in temp with the laggards recorded as missing.
    fn insert_entity(&mut self, hash: Hash32, entity: &Entity) -> StoreResult<Location> {
        match self.entity_location(hash)? {
            Location::Main => Ok(Location::Main),
            Location::Temp => Ok(Location::Temp),
            Location::Absent => {
                let mut missing = BTreeMap::new();
                for dep in entity.dependencies() {
                    if self.entity_location(dep.hash())? != Location::Main {
                        missing.insert(dep.hash(), dep);
                    }
                }
                if missing.is_empty() {
                    self.save_temp_entity_in_main(hash, entity)?;
                    Ok(Location::Main)
                } else {
                    self.insert_temp_entity(hash, entity, &missing)?;
                    Ok(Location::Temp)
                }
            }
        }
    }

    /// Given freshly staged temp hashes, return fetch tokens for every
    /// dependency that is currently absent.
    ///
    /// Walks through temp entities transitively: a dependency that is itself
    /// staged is expanded rather than reported, a dependency in main is
    /// satisfied, and an absent dependency contributes the token its
    /// dependent carried for it. May return a superset of what is strictly
    /// required, never omits a required hash.
    fn elaborate_hashes(&mut self, hashes: &BTreeSet<Hash32>) -> StoreResult<Vec<HashJwt>> {
        let mut visited: BTreeSet<Hash32> = BTreeSet::new();
        let mut worklist: VecDeque<Hash32> = hashes.iter().copied().collect();
        let mut absent: BTreeMap<Hash32, HashJwt> = BTreeMap::new();
        while let Some(hash) = worklist.pop_front() {
            if !visited.insert(hash) {
                continue;
            }
            if self.entity_location(hash)? != Location::Temp {
                continue;
            }
            let entity = self.expect_entity(hash)?;
            for dep in entity.dependencies() {
                match self.entity_location(dep.hash())? {
                    Location::Main => {}
                    Location::Temp => worklist.push_back(dep.hash()),
                    Location::Absent => {
                        absent.entry(dep.hash()).or_insert(dep);
                    }
                }
            }
        }
        Ok(absent.into_values().collect())
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Location::Main => "main",
            Location::Temp => "temp",
            Location::Absent => "absent",
        })
    }
}
