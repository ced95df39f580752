//! Deferred cross-process invalidation.
//!
//! Writes never broadcast inline. Each write that touched a process-cached
//! row records an [`Invalidation`] in the context's [`InvalidationQueue`];
//! the queue is drained once at the end of the unit of work and handed to
//! an [`InvalidationTransport`] in a single batch. Receivers drop the named
//! rows from their identity maps, so their next read misses through to the
//! shared tier or storage.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::common::{Result, RowId};

/// "Row `id` of `table` changed; forget it."
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Invalidation {
    pub table: String,
    pub id: String,
}

impl Invalidation {
    pub fn new(table: impl Into<String>, id: &RowId) -> Self {
        Self {
            table: table.into(),
            id: id.as_str().to_string(),
        }
    }

    pub fn row_id(&self) -> RowId {
        RowId::new(self.id.clone())
    }
}

/// Pending outbox of one context, in first-written order without
/// duplicates.
#[derive(Debug, Default)]
pub struct InvalidationQueue {
    pending: Vec<Invalidation>,
    seen: HashSet<Invalidation>,
}

impl InvalidationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the message was already pending.
    pub fn push(&mut self, invalidation: Invalidation) -> bool {
        if !self.seen.insert(invalidation.clone()) {
            return false;
        }
        self.pending.push(invalidation);
        true
    }

    pub fn pending(&self) -> &[Invalidation] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take every pending message, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<Invalidation> {
        self.seen.clear();
        std::mem::take(&mut self.pending)
    }
}

/// Carries invalidation batches between processes.
///
/// Delivery is fire-and-forget and at-least-once; receivers must tolerate
/// duplicates and messages about rows they never cached.
pub trait InvalidationTransport {
    fn send(&self, batch: &[Invalidation]) -> Result<()>;

    /// Messages delivered since the last call.
    fn receive(&self) -> Result<Vec<Invalidation>>;
}

/// In-memory broadcast between contexts of one process.
///
/// Every [`BusEndpoint`] has its own mailbox. A batch sent through one
/// endpoint lands in every other endpoint's mailbox.
#[derive(Debug, Default)]
pub struct LocalBus {
    mailboxes: Mutex<HashMap<usize, VecDeque<Invalidation>>>,
    next_endpoint: Mutex<usize>,
}

impl LocalBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attach a new endpoint with an empty mailbox.
    pub fn endpoint(self: &Arc<Self>) -> BusEndpoint {
        let id = {
            let mut next = self.next_endpoint.lock();
            let id = *next;
            *next += 1;
            id
        };
        self.mailboxes.lock().insert(id, VecDeque::new());
        BusEndpoint {
            bus: Arc::clone(self),
            id,
        }
    }

    pub fn endpoint_count(&self) -> usize {
        self.mailboxes.lock().len()
    }
}

/// One context's connection to a [`LocalBus`].
///
/// Dropping the endpoint detaches its mailbox.
#[derive(Debug)]
pub struct BusEndpoint {
    bus: Arc<LocalBus>,
    id: usize,
}

impl InvalidationTransport for BusEndpoint {
    fn send(&self, batch: &[Invalidation]) -> Result<()> {
        let mut mailboxes = self.bus.mailboxes.lock();
        for (id, mailbox) in mailboxes.iter_mut() {
            if *id != self.id {
                mailbox.extend(batch.iter().cloned());
            }
        }
        Ok(())
    }

    fn receive(&self) -> Result<Vec<Invalidation>> {
        let mut mailboxes = self.bus.mailboxes.lock();
        Ok(mailboxes
            .get_mut(&self.id)
            .map(|mailbox| mailbox.drain(..).collect())
            .unwrap_or_default())
    }
}

impl Drop for BusEndpoint {
    fn drop(&mut self) {
        self.bus.mailboxes.lock().remove(&self.id);
    }
}
