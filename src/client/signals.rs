use crate::registry::RegistrySnapshot;

/// A lightweight snapshot of runtime "signals" for orchestration.
///
/// Facts only: how far the SN counter got and what is still pending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalsSnapshot {
    pub last_sn: u64,
    pub registry: RegistrySnapshot,
}

impl SignalsSnapshot {
    pub fn pending(&self) -> usize {
        self.registry.pending
    }

    /// Number of pending calls tagged with `key`.
    pub fn pending_in_group(&self, key: &str) -> usize {
        self.registry.groups.get(key).copied().unwrap_or(0)
    }
}
