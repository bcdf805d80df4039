//! Mapping between source files and loaded classes.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::context::{file_uri_to_path, path_to_file_uri};

/// Resolves source files for the adapter. URIs are in the debugger's
/// convention (`file:` URIs for files on disk).
pub trait SourceLookupProvider: Send + Sync {
    /// Called on launch/attach with the client's `sourcePaths`.
    fn initialize(&self, _source_paths: &[String]) {}

    /// Fully qualified class names declared at each of `lines` in `uri`.
    /// Returns one entry per line; an empty string when unknown.
    fn fully_qualified_names(&self, uri: &str, lines: &[i64]) -> Vec<String>;

    /// URI of the source declaring `fully_qualified_name`, given the path of
    /// the source relative to a source root.
    fn source_file_uri(&self, fully_qualified_name: &str, relative_path: &str) -> Option<String>;

    fn source_contents(&self, uri: &str) -> Option<String>;
}

/// Looks sources up on disk under a list of source roots.
///
/// Class names are derived from the `package` declaration and the file stem,
/// so nested and secondary top-level classes resolve to the primary class.
#[derive(Debug, Default)]
pub struct FileSystemSourceLookup {
    roots: RwLock<Vec<PathBuf>>,
}

impl FileSystemSourceLookup {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots: RwLock::new(roots),
        }
    }

    fn class_name_for(&self, path: &Path) -> Option<String> {
        let stem = path.file_stem()?.to_str()?;

        for root in self.roots.read().iter() {
            if let Ok(relative) = path.strip_prefix(root) {
                let mut segments: Vec<String> = relative
                    .parent()
                    .into_iter()
                    .flat_map(|parent| parent.iter())
                    .filter_map(|segment| segment.to_str().map(str::to_string))
                    .collect();
                segments.push(stem.to_string());
                return Some(segments.join("."));
            }
        }

        let text = std::fs::read_to_string(path).ok()?;
        Some(match package_of(&text) {
            Some(package) => format!("{package}.{stem}"),
            None => stem.to_string(),
        })
    }
}

fn package_of(text: &str) -> Option<String> {
    text.lines().map(str::trim).find_map(|line| {
        let rest = line.strip_prefix("package")?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let package = rest.trim().strip_suffix(';')?.trim();
        Some(package.to_string())
    })
}

impl SourceLookupProvider for FileSystemSourceLookup {
    fn initialize(&self, source_paths: &[String]) {
        *self.roots.write() = source_paths.iter().map(PathBuf::from).collect();
    }

    fn fully_qualified_names(&self, uri: &str, lines: &[i64]) -> Vec<String> {
        let name = file_uri_to_path(uri)
            .and_then(|path| self.class_name_for(&path))
            .unwrap_or_default();
        vec![name; lines.len()]
    }

    fn source_file_uri(&self, _fully_qualified_name: &str, relative_path: &str) -> Option<String> {
        self.roots
            .read()
            .iter()
            .map(|root| root.join(relative_path))
            .find(|candidate| candidate.is_file())
            .and_then(|path| path_to_file_uri(&path))
    }

    fn source_contents(&self, uri: &str) -> Option<String> {
        let path = file_uri_to_path(uri)?;
        match std::fs::read_to_string(&path) {
            Ok(text) => Some(text),
            Err(err) => {
                tracing::debug!(
                    target: "javadbg.dap",
                    path = %path.display(),
                    error = %err,
                    "failed to read source"
                );
                None
            }
        }
    }
}
