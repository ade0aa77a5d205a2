//! Hierarchical component paths for log lines.
//!
//! Every component builds its full path once at construction time
//! (parent path + `"->"` + local name) and passes it explicitly to each
//! log call, so a fault line always identifies the exact owning component
//! (`Maslow->BeltTL->Motor`).

use std::fmt;

pub const PATH_SEPARATOR: &str = "->";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPath {
    full: String,
    name_start: usize,
}

impl LogPath {
    /// Root component path. `name` must not be empty.
    pub fn root(name: &str) -> Self {
        debug_assert!(!name.is_empty(), "component name must not be empty");
        Self {
            full: name.to_string(),
            name_start: 0,
        }
    }

    /// Child path: `parent->name`.
    pub fn child(&self, name: &str) -> Self {
        debug_assert!(!name.is_empty(), "component name must not be empty");
        let mut full = String::with_capacity(self.full.len() + PATH_SEPARATOR.len() + name.len());
        full.push_str(&self.full);
        full.push_str(PATH_SEPARATOR);
        let name_start = full.len();
        full.push_str(name);
        Self { full, name_start }
    }

    /// The full path, e.g. `Maslow->BeltTL->Encoder`.
    pub fn as_str(&self) -> &str {
        &self.full
    }

    /// The last component, e.g. `Encoder`.
    pub fn name(&self) -> &str {
        &self.full[self.name_start..]
    }
}

impl fmt::Display for LogPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_nested_paths() {
        let root = LogPath::root("Maslow");
        let belt = root.child("BeltTL");
        let encoder = belt.child("Encoder");
        assert_eq!(root.as_str(), "Maslow");
        assert_eq!(belt.as_str(), "Maslow->BeltTL");
        assert_eq!(encoder.as_str(), "Maslow->BeltTL->Encoder");
        assert_eq!(encoder.name(), "Encoder");
        assert_eq!(root.name(), "Maslow");
    }
}
