//! Per-purpose payload handlers.

use std::collections::HashMap;
use std::sync::Arc;

use agora_storage::PointerRecord;
use agora_types::{PointerPurpose, Result};
use async_trait::async_trait;

/// Consumes a fetched payload for one pointer purpose.
///
/// Returning an error leaves the delivery unrecorded so the next mailbox
/// cycle retries it; handlers must therefore tolerate seeing the same
/// payload again after a failure.
#[async_trait]
pub trait PurposeHandler: Send + Sync {
    async fn handle(&self, pointer: &PointerRecord, payload: &[u8]) -> Result<()>;
}

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<PointerPurpose, Arc<dyn PurposeHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `purpose`, returning the one it replaces.
    pub fn register(
        &mut self,
        purpose: PointerPurpose,
        handler: Arc<dyn PurposeHandler>,
    ) -> Option<Arc<dyn PurposeHandler>> {
        self.handlers.insert(purpose, handler)
    }

    pub fn get(&self, purpose: PointerPurpose) -> Option<Arc<dyn PurposeHandler>> {
        self.handlers.get(&purpose).cloned()
    }

    pub fn is_registered(&self, purpose: PointerPurpose) -> bool {
        self.handlers.contains_key(&purpose)
    }
}
