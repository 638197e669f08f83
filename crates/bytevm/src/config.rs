//! Host-tunable VM configuration.
//!
//! Grounded on the teacher's `ResourceLimits`/`ResourceTracker` pair
//! (`monty::resource`, referenced from `lib.rs`'s module list): the host
//! constructs a value in code and hands it to the VM constructor, rather than
//! this crate reading a config file from disk.

use crate::dialect::DialectVersion;

/// The two things a host embedding this interpreter needs to tune (§4.8).
#[derive(Debug, Clone)]
pub struct VmConfig {
    pub dialect: DialectVersion,
    /// Guards the native Rust call stack against runaway guest recursion,
    /// since `Vm::run_frame` recurses into itself for nested calls. `None`
    /// disables the check (matching the teacher's `NoLimitTracker`).
    pub max_recursion_depth: Option<usize>,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            dialect: DialectVersion::V32,
            max_recursion_depth: Some(1000),
        }
    }
}

impl VmConfig {
    #[must_use]
    pub fn new(dialect: DialectVersion) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }
}
