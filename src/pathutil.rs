//! Path normalization helpers (spec.md §1).
//!
//! Grounded on the teacher's `config` layer, which always joins configured
//! data directories against a fixed set of suffixes rather than trusting
//! paths verbatim from a config file.

use std::path::{Component, Path, PathBuf};

/// Join `base` and `child`, rejecting (by stripping) any `..` or root
/// component in `child` so a config-supplied relative path can never escape
/// `base`.
pub fn join_contained(base: &Path, child: &Path) -> PathBuf {
    let mut out = base.to_path_buf();
    for component in child.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    out
}

/// Lexically normalize `path`: collapse `.` and resolve `..` against
/// preceding components without touching the filesystem (unlike
/// `std::fs::canonicalize`, this works on paths that don't exist yet).
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component.as_os_str());
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_contained_strips_traversal() {
        let base = Path::new("/var/lib/corevault");
        let joined = join_contained(base, Path::new("../../etc/passwd"));
        assert_eq!(joined, Path::new("/var/lib/corevault/etc/passwd"));
    }

    #[test]
    fn normalize_collapses_dots() {
        assert_eq!(
            normalize(Path::new("/a/b/../c/./d")),
            Path::new("/a/c/d")
        );
    }

    #[test]
    fn normalize_keeps_leading_parent_on_relative_path() {
        assert_eq!(normalize(Path::new("../a")), Path::new("../a"));
    }
}
