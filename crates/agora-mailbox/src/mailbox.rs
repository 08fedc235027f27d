//! Idempotent processing of discovered pointers.
//!
//! A delivery is identified by its payload location. The dedup check runs
//! before any fetch, and a location is recorded only after its handler
//! succeeded, so each payload is handled successfully at most once.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agora_storage::{MailboxEntry, PointerRecord, Repository};
use agora_types::{AgoraError, PayloadLocation, Result, Timestamp};

use crate::handler::HandlerRegistry;
use crate::transport::{with_deadline, ContentStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// A dedup record already exists; nothing was fetched.
    AlreadyProcessed,
    /// Fetched, handled and recorded.
    Delivered,
    /// Another call is processing the same location right now.
    InFlight,
    /// No handler is registered for the pointer's purpose.
    Unhandled,
}

impl fmt::Display for ProcessOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyProcessed => write!(f, "already_processed"),
            Self::Delivered => write!(f, "delivered"),
            Self::InFlight => write!(f, "in_flight"),
            Self::Unhandled => write!(f, "unhandled"),
        }
    }
}

/// Claim on a location for the duration of one `process` call.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<PayloadLocation>>,
    location: PayloadLocation,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.location);
        }
    }
}

pub struct MessageMailbox {
    repo: Arc<Repository>,
    content: Arc<dyn ContentStore>,
    handlers: HandlerRegistry,
    in_flight: Mutex<HashSet<PayloadLocation>>,
    network_timeout: Duration,
}

impl MessageMailbox {
    pub fn new(
        repo: Arc<Repository>,
        content: Arc<dyn ContentStore>,
        handlers: HandlerRegistry,
        network_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            content,
            handlers,
            in_flight: Mutex::new(HashSet::new()),
            network_timeout,
        }
    }

    pub fn is_processed(&self, location: &PayloadLocation) -> Result<bool> {
        self.repo.with(|store| store.mailbox()?.is_processed(location))
    }

    /// Handles one discovered pointer.
    ///
    /// # Errors
    ///
    /// Fetch and handler failures are returned as-is and leave no dedup
    /// record, so the pointer is retried on the next cycle.
    pub async fn process(&self, pointer: &PointerRecord) -> Result<ProcessOutcome> {
        let location = &pointer.payload_location;

        let Some(_claim) = self.claim(location)? else {
            tracing::debug!(%location, "delivery already in flight");
            return Ok(ProcessOutcome::InFlight);
        };

        if self.is_processed(location)? {
            tracing::trace!(%location, "delivery already processed");
            return Ok(ProcessOutcome::AlreadyProcessed);
        }

        let Some(handler) = self.handlers.get(pointer.purpose) else {
            tracing::debug!(%location, purpose = %pointer.purpose, "no handler registered");
            return Ok(ProcessOutcome::Unhandled);
        };

        let payload = with_deadline(self.network_timeout, "payload fetch", self.content.fetch(location)).await?;

        if let Err(e) = handler.handle(pointer, &payload).await {
            tracing::warn!(%location, pointer_id = %pointer.pointer_id, error = %e, "handler failed, delivery will be retried");
            return Err(e);
        }

        let entry = MailboxEntry {
            payload_location: location.clone(),
            timestamp: Timestamp::now(),
        };
        if !self.repo.with(|store| store.mailbox()?.record(&entry))? {
            tracing::debug!(%location, "delivery recorded concurrently");
        }
        tracing::info!(%location, purpose = %pointer.purpose, bytes = payload.len(), "message delivered");
        Ok(ProcessOutcome::Delivered)
    }

    fn claim(&self, location: &PayloadLocation) -> Result<Option<InFlightGuard<'_>>> {
        let mut set = self.in_flight.lock().map_err(|_| AgoraError::Persistence {
            reason: "mailbox in-flight lock poisoned".into(),
        })?;
        if !set.insert(location.clone()) {
            return Ok(None);
        }
        Ok(Some(InFlightGuard {
            set: &self.in_flight,
            location: location.clone(),
        }))
    }
}
