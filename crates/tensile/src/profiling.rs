//! Phase timing for compilation, enabled with `TENSILE_PROFILE=1`.
//!
//! Deliberately small: one stderr line per recorded phase when enabled,
//! nothing when disabled. The pipeline driver and the backend wrap their
//! stages in [`phase`] guards.

use std::time::Instant;

use crate::env;

pub struct PhaseGuard {
    label: &'static str,
    start: Option<Instant>,
}

/// Starts timing a named phase; the guard reports on drop.
pub fn phase(label: &'static str) -> PhaseGuard {
    let start = env::profile_enabled().then(Instant::now);
    PhaseGuard { label, start }
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        if let Some(start) = self.start {
            eprintln!("[tensile] {}: {:.1?}", self.label, start.elapsed());
        }
    }
}
