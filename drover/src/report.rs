//! Plain-text state report aggregated from every core-managed vehicle.

use std::fmt::{self, Write};

use crate::vehicle::kinematics::Vector3r;

/// Accumulates a human-readable report, one heading per vehicle.
#[derive(Debug, Clone, Default)]
pub struct StateReporter {
    output: String,
}

impl StateReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.output.clear();
    }

    /// Starts a section. `level` 0 is a top-level heading.
    pub fn write_heading(&mut self, heading: &str, level: usize) {
        let rule = if level == 0 { '=' } else { '-' };
        let _ = writeln!(self.output, "{heading}");
        let _ = writeln!(self.output, "{}", rule.to_string().repeat(heading.len().max(1)));
    }

    /// Writes one `name: value` line.
    pub fn write_value(&mut self, name: &str, value: impl fmt::Display) {
        let _ = writeln!(self.output, "  {name}: {value}");
    }

    pub fn write_vector(&mut self, name: &str, v: &Vector3r) {
        let _ = writeln!(self.output, "  {name}: ({:.3}, {:.3}, {:.3})", v.x, v.y, v.z);
    }

    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.output.is_empty()
    }
}
