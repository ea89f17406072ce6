//! Path selection
//!
//! Callers pick what to download with a flat set of relative paths. Both the
//! selection set and the paths produced while walking a tree go through
//! [`normalize_path`], so `a\b`, `./a/b/` and `a//b` all name the same entry.

use std::collections::HashSet;

/// Relative path of the tree root
pub const ROOT: &str = ".";

/// Separator used in every normalized relative path
pub const SEPARATOR: char = '/';

/// Canonicalize a relative path
///
/// Backslashes become `/`, empty and `.` components are dropped and `..`
/// pops the previous component. Leading `..` components are kept, so they
/// never match anything inside the tree. The empty path normalizes to `.`.
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();

    for component in unified.split(SEPARATOR) {
        match component {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        ROOT.to_string()
    } else {
        parts.join("/")
    }
}

/// Join a child name onto a normalized relative directory
pub fn join_relative(dir: &str, name: &str) -> String {
    if dir == ROOT {
        normalize_path(name)
    } else {
        normalize_path(&format!("{}{}{}", dir, SEPARATOR, name))
    }
}

/// Whether a directory entry name is safe to materialize as one local path
/// component
pub fn is_safe_entry_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

/// Outcome of matching one path against a selection set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selection {
    /// The path itself is in the set
    pub selected: bool,
    /// Some member of the set lies below this directory
    pub has_selected_descendant: bool,
}

impl Selection {
    /// Whether the entry needs any attention at all
    pub fn is_relevant(&self) -> bool {
        self.selected || self.has_selected_descendant
    }
}

/// Classify a normalized relative path against a selection set
///
/// Pure function of its arguments. A selected directory always reports a
/// selected descendant, because selecting a directory selects everything
/// below it.
pub fn classify(relative_path: &str, is_directory: bool, selection: &SelectionSet) -> Selection {
    let selected = selection.contains(relative_path);

    let mut has_selected_descendant = false;
    if is_directory {
        if selected {
            has_selected_descendant = true;
        } else if relative_path == ROOT {
            has_selected_descendant = !selection.is_empty();
        } else {
            let prefix = format!("{}{}", relative_path, SEPARATOR);
            has_selected_descendant = selection
                .iter()
                .any(|path| path.len() > prefix.len() && path.starts_with(&prefix));
        }
    }

    Selection {
        selected,
        has_selected_descendant,
    }
}

/// Immutable set of normalized relative paths to materialize
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    paths: HashSet<String>,
}

impl SelectionSet {
    /// Build a selection set, normalizing every path
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            paths: paths
                .into_iter()
                .map(|p| normalize_path(p.as_ref()))
                .collect(),
        }
    }

    pub fn contains(&self, relative_path: &str) -> bool {
        self.paths.contains(relative_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    /// Whether the root itself is selected, i.e. the whole tree
    pub fn selects_root(&self) -> bool {
        self.contains(ROOT)
    }

    /// Classify a path against this set, see [`classify`]
    pub fn classify(&self, relative_path: &str, is_directory: bool) -> Selection {
        classify(relative_path, is_directory, self)
    }

    /// Whether a file at `relative_path` would be downloaded: the path or
    /// one of its ancestor directories is selected
    pub fn covers(&self, relative_path: &str) -> bool {
        if self.selects_root() {
            return true;
        }

        let path = normalize_path(relative_path);
        let mut end = path.len();
        loop {
            if self.contains(&path[..end]) {
                return true;
            }
            match path[..end].rfind(SEPARATOR) {
                Some(idx) => end = idx,
                None => return false,
            }
        }
    }
}

impl<S: AsRef<str>> FromIterator<S> for SelectionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::from_paths(iter)
    }
}
