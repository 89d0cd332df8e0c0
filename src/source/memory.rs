//! In-memory source model.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use super::{DeclarationCriteria, SourceError, SourceModel, SourceResult};
use crate::types::{DeclarationRef, MarkerValue, Scope, normalize_path};

/// One declaration as held by [`MemorySourceModel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryDeclaration {
    pub qualified_name: String,
    /// `(marker kind, literal value)`. A `None` value models a marker whose
    /// literal does not resolve.
    pub markers: Vec<(String, Option<MarkerValue>)>,
    pub is_concrete: bool,
    pub is_public: bool,
    pub is_top_level: bool,
}

impl MemoryDeclaration {
    /// A concrete, public, top-level type with no markers.
    pub fn new(qualified_name: impl Into<String>) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            markers: Vec::new(),
            is_concrete: true,
            is_public: true,
            is_top_level: true,
        }
    }

    pub fn marker(mut self, kind: impl Into<String>, value: impl Into<MarkerValue>) -> Self {
        self.markers.push((kind.into(), Some(value.into())));
        self
    }

    pub fn unresolved_marker(mut self, kind: impl Into<String>) -> Self {
        self.markers.push((kind.into(), None));
        self
    }

    pub fn abstract_type(mut self) -> Self {
        self.is_concrete = false;
        self
    }

    pub fn private(mut self) -> Self {
        self.is_public = false;
        self
    }

    pub fn nested(mut self) -> Self {
        self.is_top_level = false;
        self
    }

    fn carries(&self, kind: &str) -> bool {
        self.markers.iter().any(|(k, _)| k == kind)
    }
}

/// A source model backed by a map of file path to declarations.
///
/// Files can be marked as failing to simulate parse errors, and the whole
/// model can be invalidated to simulate a torn-down project context.
#[derive(Debug, Default)]
pub struct MemorySourceModel {
    files: RwLock<BTreeMap<PathBuf, Vec<MemoryDeclaration>>>,
    modules: RwLock<BTreeMap<PathBuf, String>>,
    failing: RwLock<HashSet<PathBuf>>,
    invalidated: AtomicBool,
}

impl MemorySourceModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the declarations of `path`.
    pub fn set_file(&self, path: impl AsRef<Path>, decls: Vec<MemoryDeclaration>) {
        self.files
            .write()
            .insert(normalize_path(path.as_ref()), decls);
    }

    pub fn remove_file(&self, path: impl AsRef<Path>) {
        self.files.write().remove(&normalize_path(path.as_ref()));
    }

    pub fn set_module(&self, path: impl AsRef<Path>, module: impl Into<String>) {
        self.modules
            .write()
            .insert(normalize_path(path.as_ref()), module.into());
    }

    /// Make every query touching `path` fail with a parse error.
    pub fn fail_file(&self, path: impl AsRef<Path>, failing: bool) {
        let path = normalize_path(path.as_ref());
        let mut set = self.failing.write();
        if failing {
            set.insert(path);
        } else {
            set.remove(&path);
        }
    }

    pub fn invalidate(&self) {
        self.invalidated.store(true, Ordering::SeqCst);
    }

    fn check(&self, path: &Path) -> SourceResult<()> {
        if self.invalidated.load(Ordering::SeqCst) {
            return Err(SourceError::Invalidated {
                reason: "memory model invalidated".to_string(),
            });
        }
        if self.failing.read().contains(path) {
            return Err(SourceError::Parse {
                path: path.to_path_buf(),
                reason: "simulated failure".to_string(),
            });
        }
        Ok(())
    }
}

impl SourceModel for MemorySourceModel {
    fn files(&self, scope: &Scope) -> SourceResult<Vec<PathBuf>> {
        if self.invalidated.load(Ordering::SeqCst) {
            return Err(SourceError::Invalidated {
                reason: "memory model invalidated".to_string(),
            });
        }
        let files = self.files.read();
        Ok(files
            .keys()
            .filter(|path| scope.contains(path))
            .cloned()
            .collect())
    }

    fn marked_declarations(
        &self,
        file: &Path,
        marker_kind: &str,
    ) -> SourceResult<Vec<DeclarationRef>> {
        let file = normalize_path(file);
        self.check(&file)?;
        let files = self.files.read();
        let Some(decls) = files.get(&file) else {
            return Ok(Vec::new());
        };
        Ok(decls
            .iter()
            .filter(|d| d.carries(marker_kind))
            .map(|d| DeclarationRef::new(d.qualified_name.clone(), file.clone()))
            .collect())
    }

    fn marker_value(
        &self,
        decl: &DeclarationRef,
        marker_kind: &str,
    ) -> SourceResult<Option<MarkerValue>> {
        self.check(decl.file())?;
        let files = self.files.read();
        let found = files
            .get(decl.file())
            .and_then(|decls| {
                decls
                    .iter()
                    .find(|d| d.qualified_name == decl.qualified_name())
            })
            .ok_or_else(|| SourceError::UnknownDeclaration(decl.qualified_name().to_string()))?;
        Ok(found
            .markers
            .iter()
            .find(|(k, _)| k == marker_kind)
            .and_then(|(_, v)| v.clone()))
    }

    fn module_of(&self, file: &Path) -> Option<String> {
        self.modules.read().get(&normalize_path(file)).cloned()
    }

    fn find_declarations(
        &self,
        scope: &Scope,
        criteria: &DeclarationCriteria,
    ) -> SourceResult<Vec<DeclarationRef>> {
        let mut out = Vec::new();
        for path in self.files(scope)? {
            self.check(&path)?;
            let files = self.files.read();
            let Some(decls) = files.get(&path) else {
                continue;
            };
            out.extend(
                decls
                    .iter()
                    .filter(|d| d.carries(&criteria.marker_kind))
                    .filter(|d| criteria.accepts(d.is_concrete, d.is_public, d.is_top_level))
                    .map(|d| DeclarationRef::new(d.qualified_name.clone(), path.clone())),
            );
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marked_declarations_and_values() {
        let model = MemorySourceModel::new();
        model.set_file(
            "X.java",
            vec![
                MemoryDeclaration::new("p.X").marker("Marker", "1a2b"),
                MemoryDeclaration::new("p.Plain"),
            ],
        );

        let decls = model.marked_declarations(Path::new("X.java"), "Marker").unwrap();
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].qualified_name(), "p.X");
        assert_eq!(
            model.marker_value(&decls[0], "Marker").unwrap().as_deref(),
            Some("1a2b")
        );
    }

    #[test]
    fn test_find_declarations_applies_criteria() {
        let model = MemorySourceModel::new();
        model.set_file(
            "A.java",
            vec![
                MemoryDeclaration::new("p.A").marker("Gen", "a"),
                MemoryDeclaration::new("p.B").marker("Gen", "b").abstract_type(),
                MemoryDeclaration::new("p.A.Inner").marker("Gen", "c").nested(),
            ],
        );

        let strict = model
            .find_declarations(&Scope::Project, &DeclarationCriteria::new("Gen"))
            .unwrap();
        assert_eq!(strict.len(), 1);

        let loose = model
            .find_declarations(&Scope::Project, &DeclarationCriteria::new("Gen").any_shape())
            .unwrap();
        assert_eq!(loose.len(), 3);
    }

    #[test]
    fn test_invalidated_model_is_fatal() {
        let model = MemorySourceModel::new();
        model.set_file("A.java", vec![]);
        model.invalidate();
        let err = model.files(&Scope::Project).unwrap_err();
        assert!(err.is_fatal());
    }
}
