//! Source-model provider interface.
//!
//! The index and the regeneration pipeline never parse code themselves. They
//! ask a [`SourceModel`] which declarations carry a marker, what the marker's
//! literal value is, and which declarations match a factory's structural
//! criteria.
//!
//! Two providers ship with the crate:
//! - [`AnnotationSourceModel`] scans real files for `@Marker("...")`-style
//!   annotations on type declarations.
//! - [`MemorySourceModel`] holds declarations in memory; embedders and tests
//!   drive it directly.

mod annotation;
mod error;
mod memory;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{DeclarationRef, MarkerValue, Scope};

pub use annotation::AnnotationSourceModel;
pub use error::{SourceError, SourceResult};
pub use memory::{MemoryDeclaration, MemorySourceModel};

/// Structural filter a handler factory uses to pick its declarations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclarationCriteria {
    /// Marker kind the declaration must carry.
    pub marker_kind: String,
    /// Skip interfaces and abstract types.
    #[serde(default = "default_true")]
    pub concrete_only: bool,
    #[serde(default = "default_true")]
    pub public_only: bool,
    /// Skip nested declarations.
    #[serde(default = "default_true")]
    pub top_level_only: bool,
}

fn default_true() -> bool {
    true
}

impl DeclarationCriteria {
    /// Concrete, public, top-level types carrying `marker_kind`.
    pub fn new(marker_kind: impl Into<String>) -> Self {
        Self {
            marker_kind: marker_kind.into(),
            concrete_only: true,
            public_only: true,
            top_level_only: true,
        }
    }

    /// Accept every declaration carrying the marker, whatever its shape.
    pub fn any_shape(mut self) -> Self {
        self.concrete_only = false;
        self.public_only = false;
        self.top_level_only = false;
        self
    }

    /// Check the structural flags of a declaration against these criteria.
    pub fn accepts(&self, is_concrete: bool, is_public: bool, is_top_level: bool) -> bool {
        (!self.concrete_only || is_concrete)
            && (!self.public_only || is_public)
            && (!self.top_level_only || is_top_level)
    }
}

/// Read access to the parsed source tree.
///
/// Implementations must be safe to query from several threads at once; the
/// full index build fans out over files with rayon.
pub trait SourceModel: Send + Sync {
    /// Enumerate the source files covered by `scope`.
    fn files(&self, scope: &Scope) -> SourceResult<Vec<PathBuf>>;

    /// Declarations in `file` that carry a marker of `marker_kind`.
    fn marked_declarations(
        &self,
        file: &Path,
        marker_kind: &str,
    ) -> SourceResult<Vec<DeclarationRef>>;

    /// Literal value of the `marker_kind` marker on `decl`, if it resolves.
    fn marker_value(
        &self,
        decl: &DeclarationRef,
        marker_kind: &str,
    ) -> SourceResult<Option<MarkerValue>>;

    /// Owning module / compilation unit of a file, used to group re-index work.
    fn module_of(&self, _file: &Path) -> Option<String> {
        None
    }

    /// Declarations within `scope` matching a factory's structural criteria.
    fn find_declarations(
        &self,
        scope: &Scope,
        criteria: &DeclarationCriteria,
    ) -> SourceResult<Vec<DeclarationRef>>;
}
