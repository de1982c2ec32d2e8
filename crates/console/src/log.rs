//! Message log - ordered, persisted console history for one server
//!
//! Write-through: the full snapshot is stored after every append. The log is
//! a ring buffer so the persisted snapshot stays bounded.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

use crate::error::StoreError;
use crate::message::ConsoleMessage;
use crate::store::{get_json, keys, put_json, KvStore};

pub const DEFAULT_LOG_CAPACITY: usize = 1000;

pub struct MessageLog {
    server_id: String,
    entries: VecDeque<ConsoleMessage>,
    capacity: usize,
    store: Arc<dyn KvStore>,
}

impl MessageLog {
    /// Load the persisted log for `server_id`, or start an empty one
    pub fn load(
        store: Arc<dyn KvStore>,
        server_id: &str,
        capacity: usize,
    ) -> Result<Self, StoreError> {
        let capacity = capacity.max(1);
        let saved: Vec<ConsoleMessage> =
            get_json(store.as_ref(), &keys::log(server_id))?.unwrap_or_default();

        let mut entries: VecDeque<ConsoleMessage> = saved.into();
        while entries.len() > capacity {
            entries.pop_front();
        }

        debug!(
            component = "message_log",
            event = "log.loaded",
            server_id = %server_id,
            entries = entries.len(),
        );

        Ok(Self {
            server_id: server_id.to_string(),
            entries,
            capacity,
            store,
        })
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn messages(&self) -> impl Iterator<Item = &ConsoleMessage> {
        self.entries.iter()
    }

    /// Append and persist. The message stays in memory even if the write fails.
    pub fn append(&mut self, message: ConsoleMessage) -> Result<&VecDeque<ConsoleMessage>, StoreError> {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(message);
        put_json(self.store.as_ref(), &keys::log(&self.server_id), &self.entries)?;
        Ok(&self.entries)
    }

    /// Drop all history and the persisted snapshot
    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.entries.clear();
        self.store.delete(&keys::log(&self.server_id))
    }
}
