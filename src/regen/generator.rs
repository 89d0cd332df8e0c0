//! Criteria-driven factory over an artifact generator.
//!
//! Most regeneration needs have the same shape: "for every declaration of
//! this shape carrying marker K, render one companion file". A
//! [`GeneratorFactory`] covers that shape given an [`ArtifactGenerator`].

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use super::{DiscoveryError, Handler, HandlerError, HandlerFactory};
use crate::source::{DeclarationCriteria, SourceModel};
use crate::transaction::WriteIntent;
use crate::types::{DeclarationRef, FactoryKind, Scope};

/// Computes the path and content of a derived artifact.
pub trait ArtifactGenerator: Send + Sync {
    /// Where the artifact for `decl` lives.
    fn artifact_path(&self, decl: &DeclarationRef) -> PathBuf;

    /// The artifact's bytes. Called at commit time, not at discovery.
    fn render(&self, decl: &DeclarationRef, source: &dyn SourceModel) -> anyhow::Result<Vec<u8>>;
}

pub struct GeneratorFactory {
    kind: FactoryKind,
    criteria: DeclarationCriteria,
    generator: Arc<dyn ArtifactGenerator>,
}

impl GeneratorFactory {
    pub fn new(
        kind: FactoryKind,
        criteria: DeclarationCriteria,
        generator: Arc<dyn ArtifactGenerator>,
    ) -> Self {
        Self {
            kind,
            criteria,
            generator,
        }
    }
}

#[async_trait]
impl HandlerFactory for GeneratorFactory {
    fn kind(&self) -> FactoryKind {
        self.kind.clone()
    }

    async fn discover(
        &self,
        scope: &Scope,
        source: Arc<dyn SourceModel>,
    ) -> Result<Vec<Arc<dyn Handler>>, DiscoveryError> {
        let criteria = self.criteria.clone();
        let scope = scope.clone();
        let lookup = Arc::clone(&source);
        let declarations =
            tokio::task::spawn_blocking(move || lookup.find_declarations(&scope, &criteria))
                .await
                .map_err(|e| DiscoveryError::Worker(e.to_string()))??;

        Ok(declarations
            .into_iter()
            .map(|declaration| {
                Arc::new(GeneratedArtifact {
                    declaration,
                    generator: Arc::clone(&self.generator),
                    source: Arc::clone(&source),
                }) as Arc<dyn Handler>
            })
            .collect())
    }
}

struct GeneratedArtifact {
    declaration: DeclarationRef,
    generator: Arc<dyn ArtifactGenerator>,
    source: Arc<dyn SourceModel>,
}

#[async_trait]
impl Handler for GeneratedArtifact {
    fn declaration(&self) -> &DeclarationRef {
        &self.declaration
    }

    async fn run(&self) -> Result<Vec<WriteIntent>, HandlerError> {
        let path = self.generator.artifact_path(&self.declaration);
        let declaration = self.declaration.clone();
        let generator = Arc::clone(&self.generator);
        let source = Arc::clone(&self.source);
        Ok(vec![WriteIntent::new(path, move || {
            generator.render(&declaration, source.as_ref())
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MemoryDeclaration, MemorySourceModel};
    use std::path::Path;

    struct NameFile;

    impl ArtifactGenerator for NameFile {
        fn artifact_path(&self, decl: &DeclarationRef) -> PathBuf {
            Path::new("gen").join(format!("{}.txt", decl.simple_name()))
        }

        fn render(&self, decl: &DeclarationRef, _source: &dyn SourceModel) -> anyhow::Result<Vec<u8>> {
            Ok(decl.qualified_name().as_bytes().to_vec())
        }
    }

    #[tokio::test]
    async fn test_discovers_matching_declarations_only() {
        let model = Arc::new(MemorySourceModel::new());
        model.set_file(
            "A.java",
            vec![
                MemoryDeclaration::new("p.A").marker("Gen", "1"),
                MemoryDeclaration::new("p.Base").marker("Gen", "2").abstract_type(),
                MemoryDeclaration::new("p.Other").marker("Marker", "3"),
            ],
        );

        let factory = GeneratorFactory::new(
            FactoryKind::from_static("names"),
            DeclarationCriteria::new("Gen"),
            Arc::new(NameFile),
        );
        let handlers = factory
            .discover(&Scope::Project, model as Arc<dyn SourceModel>)
            .await
            .unwrap();

        assert_eq!(handlers.len(), 1);
        assert_eq!(handlers[0].declaration().qualified_name(), "p.A");

        let intents = handlers[0].run().await.unwrap();
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].target(), Path::new("gen/A.txt"));
    }

    #[tokio::test]
    async fn test_discovery_surfaces_source_errors() {
        let model = Arc::new(MemorySourceModel::new());
        model.set_file("A.java", vec![]);
        model.invalidate();

        let factory = GeneratorFactory::new(
            FactoryKind::from_static("names"),
            DeclarationCriteria::new("Gen"),
            Arc::new(NameFile),
        );
        let result = factory
            .discover(&Scope::Project, model as Arc<dyn SourceModel>)
            .await;
        assert!(matches!(result, Err(DiscoveryError::Source(_))));
    }
}
