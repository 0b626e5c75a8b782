//! Queue of decoded responses and the set of keys held down

use std::collections::{HashSet, VecDeque};

use serde::Serialize;
use xid_protocol::{DeviceConfig, Response};

/// A response after the port's key map was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct KeyResponse {
    /// Device port the event came from
    pub port: u8,
    /// Logical key, `None` when the key map has no entry for the raw code
    pub key: Option<u8>,
    /// Key code as the device reported it
    pub raw_key: u8,
    /// Press (true) or release (false)
    pub pressed: bool,
    /// Milliseconds since the last RT timer reset
    pub reaction_time_ms: u32,
}

impl KeyResponse {
    /// Map a decoded packet through `config`'s key map
    pub fn mapped(response: Response, config: &DeviceConfig) -> Self {
        Self {
            port: response.port,
            key: config.mapped_key(response.port, response.key),
            raw_key: response.key,
            pressed: response.pressed,
            reaction_time_ms: response.reaction_time_ms,
        }
    }
}

/// FIFO of responses plus key-down tracking
#[derive(Debug, Clone, Default)]
pub struct ResponseQueue {
    queue: VecDeque<KeyResponse>,
    keys_down: HashSet<(u8, u8)>,
}

impl ResponseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a response
    ///
    /// Keys are tracked by their raw code so that two unmapped keys never
    /// collapse into one.
    pub fn push(&mut self, response: KeyResponse) {
        let key = (response.port, response.raw_key);
        if response.pressed {
            self.keys_down.insert(key);
        } else {
            self.keys_down.remove(&key);
        }
        self.queue.push_back(response);
    }

    /// Oldest queued response
    pub fn pop(&mut self) -> Option<KeyResponse> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of keys currently held down
    pub fn keys_down(&self) -> usize {
        self.keys_down.len()
    }

    /// Drop all queued responses and forget held keys
    pub fn clear(&mut self) {
        self.queue.clear();
        self.keys_down.clear();
    }
}
