//! Context object injected into packing and unpacking sessions.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::identity::IdentityService;

/// Shared services and settings for one or more sessions.
///
/// Cloning is cheap; clones share the identity service.
#[derive(Debug, Clone)]
pub struct EngineContext {
    pub identity: Arc<IdentityService>,
    pub config: EngineConfig,
}

impl EngineContext {
    pub fn new(identity: Arc<IdentityService>, config: EngineConfig) -> Self {
        Self { identity, config }
    }

    /// Context backed by the process-wide identity service.
    pub fn shared() -> Self {
        Self::new(IdentityService::global(), EngineConfig::default())
    }

    /// Context with a private identity service, mainly for tests.
    pub fn isolated() -> Self {
        Self::new(Arc::new(IdentityService::new()), EngineConfig::default())
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }
}

impl Default for EngineContext {
    fn default() -> Self {
        Self::shared()
    }
}
