//! CPU topology detection and placement for the stepping thread.
//!
//! The stepping thread is the only hot thread in the core: it runs a fixed
//! period tick and is sensitive to scheduling jitter. When there is room it
//! gets a core of its own, leaving core 0 to the render thread, the protocol
//! servers and the OS.
//!
//! # Detection
//!
//! Uses `num_cpus` for physical/logical core counts and `core_affinity` for
//! pinning. On most systems, core IDs 0..N map to separate physical cores
//! before SMT siblings are enumerated.

use core_affinity::CoreId;
use serde::Deserialize;

/// CPU topology information detected at runtime.
#[derive(Debug, Clone)]
pub struct CpuTopology {
    /// Total logical cores (including SMT/hyperthreads).
    pub logical_cores: usize,
    /// Total physical cores.
    pub physical_cores: usize,
    /// Whether SMT (hyperthreading) is enabled.
    pub has_smt: bool,
    /// Available core IDs for pinning.
    pub available_cores: Vec<usize>,
}

impl CpuTopology {
    /// Detects the CPU topology of the current system.
    #[must_use]
    pub fn detect() -> Self {
        let logical_cores = num_cpus::get();
        let physical_cores = num_cpus::get_physical();
        let has_smt = logical_cores > physical_cores;

        let available_cores = core_affinity::get_core_ids()
            .map(|ids| ids.into_iter().map(|id| id.id).collect())
            .unwrap_or_else(|| (0..logical_cores).collect());

        Self {
            logical_cores,
            physical_cores,
            has_smt,
            available_cores,
        }
    }

    /// Picks a core for the stepping thread.
    #[must_use]
    pub fn select_placement(&self) -> ThreadPlacement {
        if self.physical_cores >= 2 {
            // Heuristic: core 1 is a different physical core than core 0.
            if let Some(&core) = self.available_cores.get(1) {
                return ThreadPlacement {
                    stepping_core: Some(core),
                    strategy: PlacementStrategy::Dedicated,
                };
            }
        }
        ThreadPlacement::unpinned()
    }
}

/// Placement decision for the stepping thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadPlacement {
    /// Core ID for the stepping thread (None = unpinned).
    pub stepping_core: Option<usize>,
    pub strategy: PlacementStrategy,
}

impl ThreadPlacement {
    #[must_use]
    pub const fn unpinned() -> Self {
        Self {
            stepping_core: None,
            strategy: PlacementStrategy::NoPin,
        }
    }

    #[must_use]
    pub const fn manual(stepping_core: Option<usize>) -> Self {
        Self {
            stepping_core,
            strategy: PlacementStrategy::Manual,
        }
    }
}

/// Strategy used for thread placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementStrategy {
    /// 2+ physical cores: stepping thread on its own core.
    Dedicated,
    /// No pinning (fallback).
    NoPin,
    /// Manual assignment by user.
    Manual,
}

impl std::fmt::Display for PlacementStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dedicated => write!(f, "dedicated"),
            Self::NoPin => write!(f, "no-pin"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Configuration for CPU pinning behavior (`CpuPinning` in settings).
#[derive(Debug, Clone, Default, Deserialize)]
pub enum CpuConfig {
    /// Auto-detect topology and choose a placement.
    #[default]
    Auto,
    /// User-specified core.
    Manual {
        /// Core for the stepping thread (None = unpinned).
        #[serde(default)]
        stepping_core: Option<usize>,
    },
    /// Disable CPU pinning entirely.
    Disabled,
}

impl CpuConfig {
    /// Resolves the config to a concrete thread placement.
    #[must_use]
    pub fn resolve(&self) -> ThreadPlacement {
        match self {
            Self::Auto => CpuTopology::detect().select_placement(),
            Self::Manual { stepping_core } => ThreadPlacement::manual(*stepping_core),
            Self::Disabled => ThreadPlacement::unpinned(),
        }
    }
}

/// Pins the current thread to the specified core.
///
/// Returns `true` if pinning succeeded, `false` otherwise.
/// Pinning may fail if the core ID is invalid or the OS denies the request.
pub fn pin_to_core(core_id: usize) -> bool {
    let core = CoreId { id: core_id };
    core_affinity::set_for_current(core)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_detection_returns_valid_counts() {
        let topo = CpuTopology::detect();

        assert!(topo.logical_cores > 0, "should have at least 1 logical core");
        assert!(topo.physical_cores > 0, "should have at least 1 physical core");
        assert!(
            topo.logical_cores >= topo.physical_cores,
            "logical >= physical"
        );
        assert!(!topo.available_cores.is_empty(), "should have available cores");
    }

    #[test]
    fn placement_returns_available_core() {
        let topo = CpuTopology::detect();
        let placement = topo.select_placement();

        if let Some(core) = placement.stepping_core {
            assert!(topo.available_cores.contains(&core));
            assert_eq!(placement.strategy, PlacementStrategy::Dedicated);
        } else {
            assert_eq!(placement.strategy, PlacementStrategy::NoPin);
        }
    }

    #[test]
    fn single_core_is_never_pinned() {
        let topo = CpuTopology {
            logical_cores: 1,
            physical_cores: 1,
            has_smt: false,
            available_cores: vec![0],
        };
        assert_eq!(topo.select_placement(), ThreadPlacement::unpinned());
    }

    #[test]
    fn cpu_config_disabled_returns_unpinned() {
        let placement = CpuConfig::Disabled.resolve();
        assert!(placement.stepping_core.is_none());
        assert_eq!(placement.strategy, PlacementStrategy::NoPin);
    }

    #[test]
    fn cpu_config_manual_uses_specified_core() {
        let placement = CpuConfig::Manual {
            stepping_core: Some(5),
        }
        .resolve();
        assert_eq!(placement.stepping_core, Some(5));
        assert_eq!(placement.strategy, PlacementStrategy::Manual);
    }
}
