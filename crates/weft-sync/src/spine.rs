//! Breadth-first search over the local causal parent DAG.

use std::collections::{HashSet, VecDeque};

use weft_store::{EntityOps, StoreResult};
use weft_types::CausalHash;

/// Search for the chain of causals connecting `earlier` to `later`.
///
/// Walks parent edges breadth-first starting from `later`. Returns
/// `Some(vec![])` when the two heads are equal; otherwise `Some(path)` where
/// `path` runs oldest to newest, starting at the matched `earlier` and
/// stopping short of `later`; `None` when `earlier` is not an ancestor.
///
/// Histories can be wide with merges, so new frontier paths go to the back
/// of the queue: the search depth stays bounded by the true spine length and
/// the result is a shortest chain. Callers should run this inside a single
/// read transaction so the walk sees one snapshot.
pub fn causal_spine_between(
    ops: &mut dyn EntityOps,
    earlier: CausalHash,
    later: CausalHash,
) -> StoreResult<Option<Vec<CausalHash>>> {
    if earlier == later {
        return Ok(Some(Vec::new()));
    }

    let mut visited: HashSet<CausalHash> = HashSet::from([later]);
    // Each frontier entry is a path of causals, newest first, rooted at a
    // parent of `later`.
    let mut frontier: VecDeque<Vec<CausalHash>> = VecDeque::new();
    for parent in ops.load_causal_parents_by_hash(later)? {
        if parent == earlier {
            return Ok(Some(vec![earlier]));
        }
        if visited.insert(parent) {
            frontier.push_back(vec![parent]);
        }
    }

    while let Some(path) = frontier.pop_front() {
        let Some(&tip) = path.last() else { continue };
        for parent in ops.load_causal_parents_by_hash(tip)? {
            if parent == earlier {
                let mut spine = Vec::with_capacity(path.len() + 1);
                spine.push(earlier);
                spine.extend(path.iter().rev().copied());
                return Ok(Some(spine));
            }
            if visited.insert(parent) {
                let mut extended = path.clone();
                extended.push(parent);
                frontier.push_back(extended);
            }
        }
    }

    Ok(None)
}
