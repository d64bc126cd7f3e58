//! Checker configuration
//!
//! One modeling core, several diagnostic front-ends: the lifecycle machine
//! always runs, and the flags here only gate which *reports* are emitted.
//! A host engine registers the checker once and lets several named
//! sub-checkers toggle individual bug kinds.
//!
//! # Example
//! ```
//! use heaplens_checker::config::{CheckerConfig, Platform};
//!
//! let config = CheckerConfig::default()
//!     .with_optimistic(true)
//!     .with_mismatched_deallocator(true)
//!     .with_platform(Platform::FreeBsd);
//! assert!(config.optimistic());
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::{CheckerError, Result};

/// Target platform of the analyzed translation unit.
///
/// Only consulted for the kernel-allocator zero flag: three-argument
/// `malloc()` (BSD kernels) and two-argument `kmalloc()` (Linux) take a
/// flags word whose "give me zeroed memory" bit differs per platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Platform {
    FreeBsd,
    NetBsd,
    OpenBsd,
    Linux,
    /// Any platform whose zero-flag value is unknown. Kernel allocations
    /// fall back to plain (uninitialized) malloc modeling.
    #[default]
    Other,
}

impl Platform {
    /// Derive the platform from a target triple
    /// (`x86_64-unknown-freebsd`). Unlisted OS components map to
    /// [`Platform::Other`]; a malformed triple is an error.
    pub fn from_target_triple(triple: &str) -> Result<Platform> {
        let mut parts = triple.split('-');
        let (Some(_arch), Some(_vendor), Some(os)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(CheckerError::config(format!(
                "malformed target triple '{}'",
                triple
            )));
        };
        Ok(match os {
            os if os.starts_with("freebsd") => Platform::FreeBsd,
            os if os.starts_with("netbsd") => Platform::NetBsd,
            os if os.starts_with("openbsd") => Platform::OpenBsd,
            "linux" => Platform::Linux,
            _ => Platform::Other,
        })
    }

    /// The M_ZERO / __GFP_ZERO flag value for this platform, if known.
    pub fn kernel_zero_flag(self) -> Option<u64> {
        match self {
            Platform::FreeBsd => Some(0x0100),
            Platform::NetBsd => Some(0x0002),
            Platform::OpenBsd => Some(0x0008),
            Platform::Linux => Some(0x8000),
            Platform::Other => None,
        }
    }
}

/// Configuration for [`HeapLifecycleChecker`](crate::features::heap_lifecycle::HeapLifecycleChecker).
///
/// The five `*_enabled` switches correspond to the independently
/// registerable diagnostic front-ends; `optimistic` additionally lets
/// ownership-annotated user functions participate in classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckerConfig {
    optimistic: bool,
    malloc_enabled: bool,
    new_delete_enabled: bool,
    new_delete_leaks_enabled: bool,
    mismatched_deallocator_enabled: bool,
    inner_pointer_enabled: bool,
    platform: Platform,
}

impl Default for CheckerConfig {
    /// All diagnostic front-ends on, pessimistic mode, unknown platform.
    fn default() -> Self {
        Self {
            optimistic: false,
            malloc_enabled: true,
            new_delete_enabled: true,
            new_delete_leaks_enabled: true,
            mismatched_deallocator_enabled: true,
            inner_pointer_enabled: true,
            platform: Platform::Other,
        }
    }
}

impl CheckerConfig {
    /// Configuration with every diagnostic front-end disabled.
    ///
    /// Modeling still runs; useful as a base when enabling a single
    /// front-end for focused runs.
    pub fn modeling_only() -> Self {
        Self {
            optimistic: false,
            malloc_enabled: false,
            new_delete_enabled: false,
            new_delete_leaks_enabled: false,
            mismatched_deallocator_enabled: false,
            inner_pointer_enabled: false,
            platform: Platform::Other,
        }
    }

    /// Enable/disable ownership-attribute classification
    /// (`ownership_returns` / `ownership_takes` / `ownership_holds`).
    pub fn with_optimistic(mut self, on: bool) -> Self {
        self.optimistic = on;
        self
    }

    /// Gate C allocator diagnostics (malloc/free and relatives).
    pub fn with_malloc(mut self, on: bool) -> Self {
        self.malloc_enabled = on;
        self
    }

    /// Gate `new`/`delete` misuse diagnostics.
    pub fn with_new_delete(mut self, on: bool) -> Self {
        self.new_delete_enabled = on;
        self
    }

    /// Gate `new`/`delete` leak diagnostics.
    pub fn with_new_delete_leaks(mut self, on: bool) -> Self {
        self.new_delete_leaks_enabled = on;
        self
    }

    /// Gate allocator/deallocator pairing diagnostics.
    pub fn with_mismatched_deallocator(mut self, on: bool) -> Self {
        self.mismatched_deallocator_enabled = on;
        self
    }

    /// Gate container inner-pointer diagnostics.
    pub fn with_inner_pointer(mut self, on: bool) -> Self {
        self.inner_pointer_enabled = on;
        self
    }

    /// Set the target platform for kernel-allocator flags.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn optimistic(&self) -> bool {
        self.optimistic
    }

    pub fn malloc_enabled(&self) -> bool {
        self.malloc_enabled
    }

    pub fn new_delete_enabled(&self) -> bool {
        self.new_delete_enabled
    }

    pub fn new_delete_leaks_enabled(&self) -> bool {
        self.new_delete_leaks_enabled
    }

    pub fn mismatched_deallocator_enabled(&self) -> bool {
        self.mismatched_deallocator_enabled
    }

    pub fn inner_pointer_enabled(&self) -> bool {
        self.inner_pointer_enabled
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }
}
