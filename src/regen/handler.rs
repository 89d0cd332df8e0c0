//! Pluggable regeneration units.

use std::sync::Arc;

use async_trait::async_trait;

use super::{DiscoveryError, HandlerError};
use crate::source::SourceModel;
use crate::transaction::WriteIntent;
use crate::types::{DeclarationRef, FactoryKind, Scope};

/// One regeneration unit bound to a declaration.
#[async_trait]
pub trait Handler: Send + Sync {
    fn declaration(&self) -> &DeclarationRef;

    /// Compute the writes this declaration needs. Handlers never write
    /// themselves; the pipeline registers the returned intents.
    async fn run(&self) -> Result<Vec<WriteIntent>, HandlerError>;
}

/// Discovers eligible declarations and wraps each into a [`Handler`].
///
/// Factories are registered by [`kind`](HandlerFactory::kind); adding a
/// factory of an already registered kind replaces the earlier one.
#[async_trait]
pub trait HandlerFactory: Send + Sync {
    fn kind(&self) -> FactoryKind;

    async fn discover(
        &self,
        scope: &Scope,
        source: Arc<dyn SourceModel>,
    ) -> Result<Vec<Arc<dyn Handler>>, DiscoveryError>;
}
