//! Process-wide tracing/logging setup.

/// Initialize tracing/logging (JSON, `info` unless `RUST_LOG` says otherwise).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

pub mod tracing;

pub use tracing::{LogFormat, init_with};
