// Source lookups for stepping
//
// Operation steps report the column of the call that triggered them. The
// engine has no parser for Java sources, so columns come from a pluggable
// context.

use std::path::{Path, PathBuf};
use tracing::debug;

pub trait SourceContext: Send + Sync {
    /// 1-based column of the call to `method_name` on `line` of the source
    /// declaring `class_name`
    fn operation_column(&self, class_name: &str, line: i32, method_name: &str) -> Option<u32>;
}

/// Reports no source positions
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSourceContext;

impl SourceContext for NoSourceContext {
    fn operation_column(&self, _class_name: &str, _line: i32, _method_name: &str) -> Option<u32> {
        None
    }
}

/// Reads `.java` files below a list of source roots
#[derive(Debug, Clone, Default)]
pub struct SourceRoots {
    roots: Vec<PathBuf>,
}

impl SourceRoots {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    /// "com.example.Main$Inner" -> "com/example/Main.java"
    pub fn relative_path(class_name: &str) -> PathBuf {
        let outer = class_name.split('$').next().unwrap_or(class_name);
        PathBuf::from(format!("{}.java", outer.replace('.', "/")))
    }

    pub fn find(&self, class_name: &str) -> Option<PathBuf> {
        let relative = Self::relative_path(class_name);
        self.roots
            .iter()
            .map(|root| root.join(&relative))
            .find(|path| path.is_file())
    }

    fn read_line(path: &Path, line: i32) -> Option<String> {
        let index = usize::try_from(line).ok()?.checked_sub(1)?;
        let text = std::fs::read_to_string(path).ok()?;
        text.lines().nth(index).map(str::to_string)
    }
}

/// Column of `name(` in a line, skipping matches inside longer identifiers
pub fn call_column(line: &str, name: &str) -> Option<u32> {
    if name.is_empty() {
        return None;
    }
    let mut search = 0;
    while let Some(offset) = line[search..].find(name) {
        let start = search + offset;
        let end = start + name.len();
        let boundary = line[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '_' || c == '$'));
        if boundary && line[end..].trim_start().starts_with('(') {
            return Some(line[..start].chars().count() as u32 + 1);
        }
        search = end;
    }
    None
}

impl SourceContext for SourceRoots {
    fn operation_column(&self, class_name: &str, line: i32, method_name: &str) -> Option<u32> {
        let path = self.find(class_name)?;
        let text = Self::read_line(&path, line)?;
        let column = call_column(&text, method_name);
        debug!("{}:{} call {} -> column {:?}", path.display(), line, method_name, column);
        column
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_column() {
        assert_eq!(call_column("    int x = compute(a, b);", "compute"), Some(13));
        assert_eq!(call_column("precompute(); compute ();", "compute"), Some(15));
        assert_eq!(call_column("int compute = 1;", "compute"), None);
    }

    #[test]
    fn test_relative_path_drops_inner_class() {
        assert_eq!(
            SourceRoots::relative_path("com.example.Main$Worker"),
            PathBuf::from("com/example/Main.java")
        );
    }

    #[test]
    fn test_reads_column_from_source_root() {
        let dir = tempfile::tempdir().unwrap();
        let package = dir.path().join("com/example");
        std::fs::create_dir_all(&package).unwrap();
        std::fs::write(
            package.join("Main.java"),
            "package com.example;\n\nclass Main {\n    void run() { helper(); }\n}\n",
        )
        .unwrap();

        let roots = SourceRoots::new(vec![dir.path().to_path_buf()]);
        assert_eq!(roots.operation_column("com.example.Main", 4, "helper"), Some(18));
        assert_eq!(roots.operation_column("com.example.Main", 40, "helper"), None);
        assert_eq!(roots.operation_column("com.example.Other", 4, "helper"), None);
    }
}
