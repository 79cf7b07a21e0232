//! Executable query plan handed to the execution collaborator.

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::Xxh64;

use super::ast::Block;
use super::params::Params;
use super::render::render_block;

const PLAN_HASH_SEED: u64 = 0x6771_6c63_7970_6865;

/// Clause tree plus bound parameters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    /// Ordered clauses.
    pub clauses: Block,
    /// Parameter values referenced by the clauses.
    pub parameters: Params,
}

impl QueryPlan {
    /// Bundles clauses and parameters.
    pub fn new(clauses: Block, parameters: Params) -> Self {
        Self {
            clauses,
            parameters,
        }
    }

    /// Cypher text of the plan.
    pub fn cypher(&self) -> String {
        render_block(&self.clauses)
    }

    /// Stable hash of the rendered text and the parameters.
    pub fn plan_hash(&self) -> u64 {
        let mut hasher = Xxh64::new(PLAN_HASH_SEED);
        hasher.update(self.cypher().as_bytes());
        hasher.update(&[0]);
        // Params is a BTreeMap so serialization order is fixed.
        if let Ok(encoded) = serde_json::to_vec(&self.parameters) {
            hasher.update(&encoded);
        }
        hasher.digest()
    }
}
