//! Change detector.
//!
//! Compares a freshly fetched bulletin against the persisted checkpoint and
//! reports which bonds have not been seen before. Pure: no I/O, no clock.

use tracing::debug;

use crate::types::{BondRecord, VersionedState};

/// Result of comparing one bulletin revision against the checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub is_new_version: bool,
    /// Bonds whose stock id was absent from the previous snapshot, in
    /// bulletin order.
    pub new_bonds: Vec<BondRecord>,
    /// Size of the bulletin that was compared.
    pub total_bonds: usize,
    pub next_state: VersionedState,
}

impl Detection {
    /// Every bond in the bulletin is new. Typical of a first run against an
    /// empty checkpoint; callers decide whether to act on it.
    pub fn all_new(&self) -> bool {
        !self.new_bonds.is_empty() && self.new_bonds.len() == self.total_bonds
    }
}

pub struct ChangeDetector;

impl ChangeDetector {
    /// Plain string comparison of version tokens.
    pub fn is_new_version(current_version: &str, previous: &VersionedState) -> bool {
        current_version != previous.version
    }

    /// Diff `current_bonds` against `previous`.
    ///
    /// An unchanged version short-circuits: nothing is new and the
    /// checkpoint is returned as-is, whatever the bond list contains.
    /// Otherwise the next checkpoint is rebuilt from `current_bonds` alone and
    /// a bond counts as new only if its stock id was not previously known.
    pub fn detect(
        current_version: &str,
        current_bonds: &[BondRecord],
        previous: &VersionedState,
    ) -> Detection {
        if !Self::is_new_version(current_version, previous) {
            return Detection {
                is_new_version: false,
                new_bonds: Vec::new(),
                total_bonds: current_bonds.len(),
                next_state: previous.clone(),
            };
        }

        let new_bonds: Vec<BondRecord> = current_bonds
            .iter()
            .filter(|b| !previous.knows(&b.stock_id))
            .cloned()
            .collect();

        debug!(
            previous = %previous.version,
            current = %current_version,
            bonds = current_bonds.len(),
            new = new_bonds.len(),
            "Bulletin version changed"
        );

        Detection {
            is_new_version: true,
            new_bonds,
            total_bonds: current_bonds.len(),
            next_state: VersionedState::from_bonds(current_version, current_bonds),
        }
    }
}
