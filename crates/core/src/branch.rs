//! Branch tree describing how levels hang together.
//! This module exists to answer coarse level-graph questions without any map knowledge:
//! which level a connector kind most likely leads to, and how many crossings separate two levels.
//! It does not own connector positions or learned destinations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TravelError;
use crate::types::{BranchId, ConnectorKind, LevelId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub name: String,
    pub abbrev: String,
    pub depth: u8,
    /// Level holding this branch's entrance; `None` for the root branch.
    pub parent: Option<LevelId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchTable {
    branches: BTreeMap<BranchId, Branch>,
}

impl BranchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Main dungeon with two side branches, handy for tools and tests.
    pub fn standard() -> Self {
        let mut table = Self::new();
        let dungeon = BranchId(0);
        table.insert(Branch {
            id: dungeon,
            name: "Dungeon".to_string(),
            abbrev: "D".to_string(),
            depth: 12,
            parent: None,
        });
        table.insert(Branch {
            id: BranchId(1),
            name: "Lair".to_string(),
            abbrev: "Lair".to_string(),
            depth: 5,
            parent: Some(LevelId { branch: dungeon, depth: 4 }),
        });
        table.insert(Branch {
            id: BranchId(2),
            name: "Orcish Mines".to_string(),
            abbrev: "Orc".to_string(),
            depth: 3,
            parent: Some(LevelId { branch: dungeon, depth: 6 }),
        });
        table
    }

    pub fn insert(&mut self, branch: Branch) {
        self.branches.insert(branch.id, branch);
    }

    pub fn get(&self, id: BranchId) -> Option<&Branch> {
        self.branches.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Branch> {
        self.branches.values()
    }

    pub fn find_by_abbrev(&self, abbrev: &str) -> Option<&Branch> {
        self.branches.values().find(|branch| branch.abbrev.eq_ignore_ascii_case(abbrev))
    }

    pub fn contains(&self, level: LevelId) -> bool {
        self.get(level.branch).is_some_and(|branch| level.depth >= 1 && level.depth <= branch.depth)
    }

    pub fn validate(&self, level: LevelId) -> Result<(), TravelError> {
        if self.contains(level) {
            Ok(())
        } else {
            Err(TravelError::InvalidState(format!("level {level} does not exist")))
        }
    }

    pub fn parent_of(&self, branch: BranchId) -> Option<LevelId> {
        self.get(branch).and_then(|b| b.parent)
    }

    pub fn describe(&self, level: LevelId) -> String {
        match self.get(level.branch) {
            Some(branch) => format!("{}:{}", branch.abbrev, level.depth),
            None => level.to_string(),
        }
    }

    /// `level` followed by the entrance level of each enclosing branch, up to the root.
    pub fn trackback(&self, level: LevelId) -> Vec<LevelId> {
        let mut chain = vec![level];
        let mut current = level;
        while let Some(parent) = self.parent_of(current.branch) {
            if chain.iter().any(|seen| seen.branch == parent.branch) {
                break;
            }
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// Number of connector crossings between two levels along the branch tree.
    pub fn level_distance(&self, a: LevelId, b: LevelId) -> Option<u32> {
        if a == b {
            return Some(0);
        }
        let chain_a = self.trackback(a);
        let chain_b = self.trackback(b);

        for (ia, at_a) in chain_a.iter().enumerate() {
            let Some(ib) = chain_b.iter().position(|at_b| at_b.branch == at_a.branch) else {
                continue;
            };
            // Leaving a branch from depth d takes d crossings: d-1 climbs plus the exit.
            let climb_a: u32 = chain_a[..ia].iter().map(|l| u32::from(l.depth)).sum();
            let climb_b: u32 = chain_b[..ib].iter().map(|l| u32::from(l.depth)).sum();
            let across = u32::from(at_a.depth.abs_diff(chain_b[ib].depth));
            return Some(climb_a + climb_b + across);
        }
        None
    }

    /// Best guess of the level a connector of `kind` on `from` leads to.
    pub fn guess_destination(&self, from: LevelId, kind: ConnectorKind) -> Option<LevelId> {
        let branch = self.get(from.branch)?;
        match kind {
            ConnectorKind::StairsDown | ConnectorKind::HatchDown => {
                (from.depth < branch.depth).then(|| LevelId { depth: from.depth + 1, ..from })
            }
            ConnectorKind::StairsUp | ConnectorKind::HatchUp => {
                if from.depth > 1 {
                    Some(LevelId { depth: from.depth - 1, ..from })
                } else {
                    branch.parent
                }
            }
            ConnectorKind::BranchEntry(target) => {
                self.get(target).map(|_| LevelId { branch: target, depth: 1 })
            }
            ConnectorKind::BranchExit => branch.parent,
            ConnectorKind::Portal => None,
        }
    }
}
