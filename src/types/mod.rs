//! Core value types shared by the index, the transaction layer and the
//! regeneration pipeline.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A project-unique identifier literal attached to a type declaration.
pub type MarkerValue = String;

/// Handle to one declaration: owning qualified name plus containing file.
///
/// Produced by a [`SourceModel`](crate::source::SourceModel); the index and
/// the pipeline only ever pass these around.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeclarationRef {
    qualified_name: String,
    file: PathBuf,
}

impl DeclarationRef {
    pub fn new(qualified_name: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            file: file.into(),
        }
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Last segment of the qualified name.
    pub fn simple_name(&self) -> &str {
        self.qualified_name
            .rsplit('.')
            .next()
            .unwrap_or(&self.qualified_name)
    }
}

impl fmt::Display for DeclarationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.qualified_name, self.file.display())
    }
}

/// The region of the workspace a change or a regeneration cycle covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Every file the source model knows about.
    Project,
    /// An explicit set of files.
    Files(BTreeSet<PathBuf>),
}

impl Scope {
    pub fn file(path: impl AsRef<Path>) -> Self {
        Scope::Files(BTreeSet::from([normalize_path(path.as_ref())]))
    }

    pub fn files<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Scope::Files(
            paths
                .into_iter()
                .map(|p| normalize_path(p.as_ref()))
                .collect(),
        )
    }

    /// Union of two scopes. `Project` absorbs everything.
    pub fn union(self, other: Scope) -> Scope {
        match (self, other) {
            (Scope::Project, _) | (_, Scope::Project) => Scope::Project,
            (Scope::Files(mut a), Scope::Files(b)) => {
                a.extend(b);
                Scope::Files(a)
            }
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        match self {
            Scope::Project => true,
            Scope::Files(files) => files.contains(&normalize_path(path)),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Scope::Files(files) if files.is_empty())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Project => write!(f, "project"),
            Scope::Files(files) if files.len() == 1 => {
                let only = files.iter().next().map(|p| p.display().to_string());
                write!(f, "{}", only.unwrap_or_default())
            }
            Scope::Files(files) => write!(f, "{} files", files.len()),
        }
    }
}

/// Registry key for a handler factory. Re-registering the same kind
/// replaces the previous factory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FactoryKind(Cow<'static, str>);

impl FactoryKind {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FactoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lexically normalize a path: drops `.` segments and folds `..` into the
/// preceding component. Does not touch the file system.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
