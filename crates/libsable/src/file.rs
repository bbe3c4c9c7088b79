//! Source file representation for the Sable compiler.
//!
//! A [`SourceFile`] couples a module path with the file's contents. Both
//! halves are reference counted so the struct can be cloned freely into
//! spans, symbols and diagnostics without copying the source text.

use std::{path::PathBuf, sync::Arc};

/// A source file with its module path and code content.
///
/// The path is stored as components (`["net", "server"]` names the module
/// `net.server`); the components are joined with `/` when a file-system
/// style path is needed for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceFile {
    /// The module path as a vector of path components
    pub path: Arc<Vec<String>>,
    /// The source code content of the file
    pub code: Arc<String>,
}

impl SourceFile {
    /// Creates a new source file with the given path components and code.
    pub fn new(path: Vec<String>, code: String) -> Self {
        Self {
            path: path.into(),
            code: code.into(),
        }
    }

    /// Returns a reference to the module path components.
    pub fn path(&self) -> &Vec<String> {
        &self.path
    }

    /// Returns the module name, a dotted join of the path components.
    pub fn module_name(&self) -> String {
        self.path.join(".")
    }

    /// Returns a display name for diagnostics (`net/server.sbl`).
    pub fn display_name(&self) -> String {
        let buffer = PathBuf::from_iter(self.path.iter());
        format!("{}.{}", buffer.to_string_lossy(), crate::error::SABLE_LANG_EXT)
    }

    /// Returns a reference to the source code content.
    pub fn code(&self) -> &String {
        self.code.as_ref()
    }

    /// Computes the 1-based line and column of a byte offset.
    ///
    /// Offsets past the end of the file resolve to the last position.
    pub fn line_col(&self, offset: usize) -> (u32, u32) {
        let mut line = 1u32;
        let mut col = 1u32;
        for (index, ch) in self.code.char_indices() {
            if index >= offset {
                break;
            }
            if ch == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        (line, col)
    }
}

impl std::fmt::Display for SourceFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_lookup() {
        let file = SourceFile::new(vec!["main".into()], "ab\ncd\ne".to_string());
        assert_eq!(file.line_col(0), (1, 1));
        assert_eq!(file.line_col(1), (1, 2));
        assert_eq!(file.line_col(3), (2, 1));
        assert_eq!(file.line_col(6), (3, 1));
    }

    #[test]
    fn module_name_join() {
        let file = SourceFile::new(vec!["net".into(), "server".into()], String::new());
        assert_eq!(file.module_name(), "net.server");
        assert_eq!(file.display_name(), "net/server.sbl");
    }
}
