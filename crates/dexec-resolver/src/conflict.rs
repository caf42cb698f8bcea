//! Version conflicts settled by the "highest version wins" merge.

use std::fmt;

use dexec_core::version::NuGetVersion;

/// Every conflict seen during one transitive resolution.
#[derive(Debug, Default, Clone)]
pub struct ConflictReport {
    pub conflicts: Vec<VersionConflict>,
}

/// A package requested at `requested` but resolved at `resolved`.
#[derive(Debug, Clone)]
pub struct VersionConflict {
    pub package: String,
    pub requested: NuGetVersion,
    pub resolved: NuGetVersion,
    pub requested_by: String,
}

impl ConflictReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, conflict: VersionConflict) {
        self.conflicts.push(conflict);
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    /// Point every request at the package's final version and drop the
    /// requests that got what they asked for.
    pub fn settle(&mut self, final_version: impl Fn(&str) -> Option<NuGetVersion>) {
        for c in &mut self.conflicts {
            if let Some(v) = final_version(&c.package) {
                c.resolved = v;
            }
        }
        self.conflicts.retain(|c| c.requested != c.resolved);
    }
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conflicts.is_empty() {
            return write!(f, "No version conflicts.");
        }
        writeln!(f, "Version conflicts ({}):", self.conflicts.len())?;
        for c in &self.conflicts {
            writeln!(f, "  {c}")?;
        }
        Ok(())
    }
}

impl fmt::Display for VersionConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} requested {} by {} but resolved {} (highest wins)",
            self.package, self.requested, self.requested_by, self.resolved
        )
    }
}
