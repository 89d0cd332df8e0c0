//! Source model that scans files for marker annotations.
//!
//! Recognises Java and Kotlin style declarations:
//!
//! ```text
//! package com.acme;
//!
//! @Marker("1a2b")
//! public final class Widget { ... }
//! ```
//!
//! Parsing is regex based. Results are cached per file and invalidated when
//! the modification time or size changes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::SystemTime;

use dashmap::DashMap;
use ignore::WalkBuilder;
use ignore::overrides::OverrideBuilder;
use regex::Regex;
use regex::bytes::Regex as BytesRegex;

use super::{DeclarationCriteria, SourceError, SourceModel, SourceResult};
use crate::types::{DeclarationRef, MarkerValue, Scope, normalize_path};

static PACKAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*package\s+([A-Za-z_][\w.]*)\s*;?").expect("valid package regex")
});

static DECLARATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^[ \t]*@(?P<kind>[A-Za-z_][\w.]*)\s*\(\s*(?:value\s*=\s*)?"(?P<value>[^"]*)"\s*\)(?:\s*@[\w.]+(?:\([^)]*\))?)*\s*(?P<mods>(?:(?:public|protected|private|internal|abstract|final|static|sealed|open|data|enum|annotation|inner|value)\s+)*)(?P<keyword>class|interface|enum|record|object)\s+(?P<name>[A-Za-z_]\w*)"#,
    )
    .expect("valid declaration regex")
});

/// Any named type declaration, annotated or not. Runs over masked source.
static TYPE_HEADER_RE: LazyLock<BytesRegex> = LazyLock::new(|| {
    BytesRegex::new(
        r"\b(?:(?:enum|annotation|data|sealed|inner|value)\s+)?(?:class|interface|enum|record|object)\s+([A-Za-z_]\w*)",
    )
    .expect("valid type header regex")
});

/// One annotated declaration found in a file.
#[derive(Debug, Clone)]
struct ParsedDeclaration {
    qualified_name: String,
    marker_kind: String,
    value: MarkerValue,
    is_concrete: bool,
    is_public: bool,
    is_top_level: bool,
}

#[derive(Debug)]
struct CachedFile {
    modified: Option<SystemTime>,
    len: u64,
    declarations: Arc<Vec<ParsedDeclaration>>,
}

/// Regex-backed [`SourceModel`] over a directory tree.
pub struct AnnotationSourceModel {
    root: PathBuf,
    extensions: Vec<String>,
    ignore_patterns: Vec<String>,
    cache: DashMap<PathBuf, CachedFile>,
}

impl AnnotationSourceModel {
    pub fn new(root: impl Into<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            root: root.into(),
            extensions,
            ignore_patterns: Vec::new(),
            cache: DashMap::new(),
        }
    }

    /// Gitignore-style patterns excluded from project scans.
    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn has_source_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e == ext))
    }

    fn walk(&self) -> SourceResult<Vec<PathBuf>> {
        let mut overrides = OverrideBuilder::new(&self.root);
        for pattern in &self.ignore_patterns {
            overrides.add(&format!("!{pattern}"))?;
        }
        let overrides = overrides.build()?;

        let mut files = Vec::new();
        for entry in WalkBuilder::new(&self.root)
            .overrides(overrides)
            .build()
        {
            let entry = entry?;
            if entry.file_type().is_some_and(|t| t.is_file())
                && self.has_source_extension(entry.path())
            {
                files.push(normalize_path(entry.path()));
            }
        }
        files.sort();
        Ok(files)
    }

    /// Parsed declarations of a file, served from cache when unchanged.
    fn parsed(&self, file: &Path) -> SourceResult<Arc<Vec<ParsedDeclaration>>> {
        let file = normalize_path(file);
        let metadata = match std::fs::metadata(&file) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.cache.remove(&file);
                return Err(SourceError::NotFound { path: file });
            }
            Err(e) => return Err(e.into()),
        };
        let modified = metadata.modified().ok();
        let len = metadata.len();

        if let Some(cached) = self.cache.get(&file) {
            if cached.modified.is_some() && cached.modified == modified && cached.len == len {
                return Ok(Arc::clone(&cached.declarations));
            }
        }

        let content = std::fs::read_to_string(&file)?;
        let kotlin = file.extension().is_some_and(|e| e == "kt");
        let declarations = Arc::new(parse_declarations(&content, kotlin));
        self.cache.insert(
            file,
            CachedFile {
                modified,
                len,
                declarations: Arc::clone(&declarations),
            },
        );
        Ok(declarations)
    }
}

impl SourceModel for AnnotationSourceModel {
    fn files(&self, scope: &Scope) -> SourceResult<Vec<PathBuf>> {
        match scope {
            Scope::Project => self.walk(),
            Scope::Files(files) => Ok(files
                .iter()
                .filter(|p| self.has_source_extension(p) && p.is_file())
                .cloned()
                .collect()),
        }
    }

    fn marked_declarations(
        &self,
        file: &Path,
        marker_kind: &str,
    ) -> SourceResult<Vec<DeclarationRef>> {
        let declarations = match self.parsed(file) {
            Ok(d) => d,
            // A vanished file carries no markers.
            Err(SourceError::NotFound { .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let file = normalize_path(file);
        Ok(declarations
            .iter()
            .filter(|d| d.marker_kind == marker_kind)
            .map(|d| DeclarationRef::new(d.qualified_name.clone(), file.clone()))
            .collect())
    }

    fn marker_value(
        &self,
        decl: &DeclarationRef,
        marker_kind: &str,
    ) -> SourceResult<Option<MarkerValue>> {
        let declarations = self.parsed(decl.file())?;
        Ok(declarations
            .iter()
            .find(|d| d.qualified_name == decl.qualified_name() && d.marker_kind == marker_kind)
            .map(|d| d.value.clone()))
    }

    fn module_of(&self, file: &Path) -> Option<String> {
        let relative = file.strip_prefix(&self.root).ok()?;
        let mut components = relative.components();
        let first = components.next()?;
        // Files directly under the root belong to the root module.
        components.next()?;
        Some(first.as_os_str().to_string_lossy().into_owned())
    }

    fn find_declarations(
        &self,
        scope: &Scope,
        criteria: &DeclarationCriteria,
    ) -> SourceResult<Vec<DeclarationRef>> {
        let mut out = Vec::new();
        for file in self.files(scope)? {
            let declarations = match self.parsed(&file) {
                Ok(d) => d,
                Err(SourceError::NotFound { .. }) => continue,
                Err(e) => return Err(e),
            };
            out.extend(
                declarations
                    .iter()
                    .filter(|d| d.marker_kind == criteria.marker_kind)
                    .filter(|d| criteria.accepts(d.is_concrete, d.is_public, d.is_top_level))
                    .map(|d| DeclarationRef::new(d.qualified_name.clone(), file.clone())),
            );
        }
        Ok(out)
    }
}

fn parse_declarations(content: &str, kotlin: bool) -> Vec<ParsedDeclaration> {
    let masked = mask_literals(content);
    let enclosing = enclosing_types(&masked);
    let package = PACKAGE_RE
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    DECLARATION_RE
        .captures_iter(content)
        .filter_map(|caps| {
            let name = caps.name("name")?;
            // Matches inside comments or string literals have no header.
            let outer = enclosing.get(&name.start())?;
            let mods: Vec<&str> = caps["mods"].split_whitespace().collect();
            let keyword = &caps["keyword"];
            let kind = &caps["kind"];

            let is_concrete = !matches!(keyword, "interface") && !mods.contains(&"abstract");
            let is_public = if kotlin {
                !mods
                    .iter()
                    .any(|m| matches!(*m, "private" | "protected" | "internal"))
            } else {
                mods.contains(&"public")
            };

            let mut parts: Vec<&str> = package.iter().map(String::as_str).collect();
            parts.extend(outer.iter().map(String::as_str));
            parts.push(name.as_str());

            Some(ParsedDeclaration {
                qualified_name: parts.join("."),
                // `@com.acme.Marker` and `@Marker` name the same kind.
                marker_kind: kind.rsplit('.').next().unwrap_or(kind).to_string(),
                value: caps["value"].to_string(),
                is_concrete,
                is_public,
                is_top_level: outer.is_empty(),
            })
        })
        .collect()
}

/// Copy of `content` with comments and the inside of string and char
/// literals blanked out. Byte offsets and line breaks are preserved.
fn mask_literals(content: &str) -> Vec<u8> {
    fn blank(out: &mut [u8], start: usize, end: usize) {
        for b in &mut out[start..end] {
            if *b != b'\n' {
                *b = b' ';
            }
        }
    }

    let bytes = content.as_bytes();
    let mut out = bytes.to_vec();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                let end = bytes[i..]
                    .iter()
                    .position(|&b| b == b'\n')
                    .map_or(bytes.len(), |p| i + p);
                blank(&mut out, i, end);
                i = end;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = bytes[i + 2..]
                    .windows(2)
                    .position(|w| w == b"*/")
                    .map_or(bytes.len(), |p| i + 2 + p + 2);
                blank(&mut out, i, end);
                i = end;
            }
            quote @ (b'"' | b'\'') => {
                let mut j = i + 1;
                while j < bytes.len() && bytes[j] != quote && bytes[j] != b'\n' {
                    if bytes[j] == b'\\' {
                        j += 1;
                    }
                    j += 1;
                }
                let close = j.min(bytes.len());
                blank(&mut out, i + 1, close);
                i = close + 1;
            }
            _ => i += 1,
        }
    }
    out
}

/// Names of the types enclosing each type header, keyed by the byte offset
/// of the header's name.
///
/// A header owns the first `{` that follows it unless a `;`, a `}` or
/// another header comes first (Kotlin types may have no body).
fn enclosing_types(masked: &[u8]) -> HashMap<usize, Vec<String>> {
    let mut headers = TYPE_HEADER_RE
        .captures_iter(masked)
        .filter_map(|caps| caps.get(1))
        .map(|m| (m.start(), String::from_utf8_lossy(m.as_bytes()).into_owned()))
        .peekable();

    let mut out = HashMap::new();
    // (type name, brace depth of its body)
    let mut chain: Vec<(String, usize)> = Vec::new();
    let mut pending: Option<String> = None;
    let mut depth = 0usize;

    for (i, &b) in masked.iter().enumerate() {
        while let Some((start, name)) = headers.next_if(|(start, _)| *start <= i) {
            out.insert(start, chain.iter().map(|(n, _)| n.clone()).collect());
            pending = Some(name);
        }
        match b {
            b'{' => {
                depth += 1;
                if let Some(name) = pending.take() {
                    chain.push((name, depth));
                }
            }
            b'}' => {
                depth = depth.saturating_sub(1);
                while chain.last().is_some_and(|(_, d)| *d > depth) {
                    chain.pop();
                }
                pending = None;
            }
            b';' => pending = None,
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const WIDGET: &str = r#"package com.acme;

import com.acme.Marker;

@Marker("1a2b")
public final class Widget {
    @Marker(value = "nested-1")
    static class Inner {}
}
"#;

    #[test]
    fn test_parse_java_declarations() {
        let decls = parse_declarations(WIDGET, false);
        assert_eq!(decls.len(), 2);

        assert_eq!(decls[0].qualified_name, "com.acme.Widget");
        assert_eq!(decls[0].value, "1a2b");
        assert!(decls[0].is_public && decls[0].is_concrete && decls[0].is_top_level);

        assert_eq!(decls[1].qualified_name, "com.acme.Widget.Inner");
        assert!(!decls[1].is_top_level);
        assert!(!decls[1].is_public);
    }

    #[test]
    fn test_nested_names_follow_enclosing_types() {
        let src = r#"package com.acme;

public class Outer {
    void render() { String s = "}"; char c = '{'; }

    @Marker("a")
    public static class Left {
        @Marker("b")
        static class Leaf {}
    }

    // class Ghost { is only a comment
    @Marker("c")
    public static class Right {
        @Marker("d")
        static class Leaf {}
    }
}

@Marker("e")
class Sibling {}
"#;
        let decls = parse_declarations(src, false);
        let names: Vec<&str> = decls.iter().map(|d| d.qualified_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "com.acme.Outer.Left",
                "com.acme.Outer.Left.Leaf",
                "com.acme.Outer.Right",
                "com.acme.Outer.Right.Leaf",
                "com.acme.Sibling",
            ]
        );
        assert!(decls[4].is_top_level);
        assert!(!decls[0].is_top_level);
    }

    #[test]
    fn test_commented_out_declaration_is_skipped() {
        let src = "/*\n@Marker(\"old\")\nclass Retired {}\n*/\n@Marker(\"new\")\nclass Current {}\n";
        let decls = parse_declarations(src, false);
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].qualified_name, "Current");
    }

    #[test]
    fn test_kotlin_bodyless_and_enum_classes() {
        let src = "package app\n\n@Marker(\"p\")\ndata class Point(val x: Int)\n\n@Marker(\"c\")\nenum class Color { RED, GREEN }\n";
        let decls = parse_declarations(src, true);
        let names: Vec<&str> = decls.iter().map(|d| d.qualified_name.as_str()).collect();
        assert_eq!(names, vec!["app.Point", "app.Color"]);
        assert!(decls.iter().all(|d| d.is_top_level));
    }

    #[test]
    fn test_parse_kotlin_defaults_to_public() {
        let src = "package app\n\n@Marker(\"k1\")\ndata class Point(val x: Int)\n\n@Marker(\"k2\")\ninternal object Hidden\n";
        let decls = parse_declarations(src, true);
        assert_eq!(decls.len(), 2);
        assert!(decls[0].is_public);
        assert!(!decls[1].is_public);
    }

    #[test]
    fn test_abstract_and_interface_are_not_concrete() {
        let src = "@Marker(\"a\")\npublic abstract class Base {}\n@Marker(\"b\")\npublic interface Api {}\n";
        let decls = parse_declarations(src, false);
        assert!(decls.iter().all(|d| !d.is_concrete));
    }

    #[test]
    fn test_model_reads_files_and_resolves_values() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("core/src");
        fs::create_dir_all(&src).unwrap();
        let file = src.join("Widget.java");
        fs::write(&file, WIDGET).unwrap();
        fs::write(src.join("notes.txt"), "@Marker(\"x\") class Nope").unwrap();

        let model = AnnotationSourceModel::new(dir.path(), vec!["java".to_string()]);
        let files = model.files(&Scope::Project).unwrap();
        assert_eq!(files.len(), 1);

        let decls = model.marked_declarations(&file, "Marker").unwrap();
        assert_eq!(decls.len(), 2);
        let value = model.marker_value(&decls[0], "Marker").unwrap();
        assert_eq!(value.as_deref(), Some("1a2b"));
        assert_eq!(model.module_of(&file).as_deref(), Some("core"));

        let strict = model
            .find_declarations(&Scope::Project, &DeclarationCriteria::new("Marker"))
            .unwrap();
        assert_eq!(strict.len(), 1);
    }

    #[test]
    fn test_missing_file_has_no_markers() {
        let dir = TempDir::new().unwrap();
        let model = AnnotationSourceModel::new(dir.path(), vec!["java".to_string()]);
        let decls = model
            .marked_declarations(&dir.path().join("Gone.java"), "Marker")
            .unwrap();
        assert!(decls.is_empty());
    }
}
