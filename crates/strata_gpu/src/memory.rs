//! Memory policy delivered by the GPU memory manager
//!
//! The renderer never decides how much memory it may use. It keeps the
//! latest policy and releases its caches when it becomes invisible.

/// How much of the cached content may stay resident
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PriorityCutoff {
    /// Keep nothing
    #[default]
    AllowNothing,
    /// Keep only what is needed to draw the visible content
    AllowRequiredOnly,
    /// Also keep content likely to become visible soon
    AllowNiceToHave,
    AllowEverything,
}

/// Allocation handed to the renderer by the memory manager
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryAllocation {
    pub bytes_limit_when_visible: u64,
    pub priority_cutoff_when_visible: PriorityCutoff,
    pub bytes_limit_when_not_visible: u64,
    pub priority_cutoff_when_not_visible: PriorityCutoff,
    /// Whether the surface should keep its backbuffer while hidden
    pub suggest_have_backbuffer: bool,
    /// Apply the allocation once without replacing the retained policy
    pub enforce_but_do_not_keep_as_policy: bool,
}

impl Default for MemoryAllocation {
    fn default() -> Self {
        Self {
            bytes_limit_when_visible: 64 * 1024 * 1024,
            priority_cutoff_when_visible: PriorityCutoff::AllowEverything,
            bytes_limit_when_not_visible: 0,
            priority_cutoff_when_not_visible: PriorityCutoff::AllowNothing,
            suggest_have_backbuffer: true,
            enforce_but_do_not_keep_as_policy: false,
        }
    }
}

/// Policy retained by the renderer for the layer tree to query
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ManagedMemoryPolicy {
    pub bytes_limit_when_visible: u64,
    pub priority_cutoff_when_visible: PriorityCutoff,
    pub bytes_limit_when_not_visible: u64,
    pub priority_cutoff_when_not_visible: PriorityCutoff,
}

impl ManagedMemoryPolicy {
    /// Byte limit for the given visibility
    pub fn bytes_limit(&self, visible: bool) -> u64 {
        if visible {
            self.bytes_limit_when_visible
        } else {
            self.bytes_limit_when_not_visible
        }
    }

    pub fn priority_cutoff(&self, visible: bool) -> PriorityCutoff {
        if visible {
            self.priority_cutoff_when_visible
        } else {
            self.priority_cutoff_when_not_visible
        }
    }
}

impl From<&MemoryAllocation> for ManagedMemoryPolicy {
    fn from(allocation: &MemoryAllocation) -> Self {
        Self {
            bytes_limit_when_visible: allocation.bytes_limit_when_visible,
            priority_cutoff_when_visible: allocation.priority_cutoff_when_visible,
            bytes_limit_when_not_visible: allocation.bytes_limit_when_not_visible,
            priority_cutoff_when_not_visible: allocation.priority_cutoff_when_not_visible,
        }
    }
}

impl Default for ManagedMemoryPolicy {
    fn default() -> Self {
        Self::from(&MemoryAllocation::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_mirrors_allocation() {
        let allocation = MemoryAllocation {
            bytes_limit_when_visible: 100,
            priority_cutoff_when_visible: PriorityCutoff::AllowNiceToHave,
            bytes_limit_when_not_visible: 10,
            priority_cutoff_when_not_visible: PriorityCutoff::AllowRequiredOnly,
            suggest_have_backbuffer: false,
            enforce_but_do_not_keep_as_policy: false,
        };
        let policy = ManagedMemoryPolicy::from(&allocation);
        assert_eq!(policy.bytes_limit(true), 100);
        assert_eq!(policy.bytes_limit(false), 10);
        assert_eq!(policy.priority_cutoff(false), PriorityCutoff::AllowRequiredOnly);
    }

    #[test]
    fn hidden_default_keeps_nothing() {
        let policy = ManagedMemoryPolicy::default();
        assert_eq!(policy.bytes_limit(false), 0);
        assert_eq!(policy.priority_cutoff(false), PriorityCutoff::AllowNothing);
        assert!(PriorityCutoff::AllowEverything > PriorityCutoff::AllowRequiredOnly);
    }
}
