//! Change and write observers.
//!
//! Observers are called synchronously, in registration order, after the
//! buffer's state lock has been released. The registry is snapshotted before
//! dispatch, so a callback may register or remove observers (or read the
//! buffer) without deadlocking; such changes apply from the next event.

use crate::buffer::DataBuffer;
use parking_lot::RwLock;
use std::fmt;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Callback receiving the buffer and an affected range.
pub type ChangeCallback = Arc<dyn Fn(&DataBuffer, Range<u64>) + Send + Sync>;

/// Callback receiving the buffer and the written path, if any.
pub type WriteCallback = Arc<dyn Fn(&DataBuffer, Option<&Path>) + Send + Sync>;

/// Handle identifying a registered observer.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(Uuid);

impl ObserverId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Converts to a UUID.
    #[must_use]
    pub fn to_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Debug for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObserverId({})", self.0)
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone)]
enum Observer {
    WillChange(ChangeCallback),
    DidChange(ChangeCallback),
    DidWrite(WriteCallback),
}

/// Registered observers of one buffer.
#[derive(Default)]
pub(crate) struct Observers {
    entries: RwLock<Vec<(ObserverId, Observer)>>,
}

impl Observers {
    fn add(&self, observer: Observer) -> ObserverId {
        let id = ObserverId::new();
        self.entries.write().push((id, observer));
        id
    }

    pub(crate) fn add_will_change(&self, callback: ChangeCallback) -> ObserverId {
        self.add(Observer::WillChange(callback))
    }

    pub(crate) fn add_did_change(&self, callback: ChangeCallback) -> ObserverId {
        self.add(Observer::DidChange(callback))
    }

    pub(crate) fn add_did_write(&self, callback: WriteCallback) -> ObserverId {
        self.add(Observer::DidWrite(callback))
    }

    /// Removes an observer, returning `false` if it was not registered.
    pub(crate) fn remove(&self, id: ObserverId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(entry, _)| *entry != id);
        entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    fn snapshot(&self) -> Vec<Observer> {
        self.entries
            .read()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect()
    }

    pub(crate) fn will_change(&self, buffer: &DataBuffer, range: Range<u64>) {
        for observer in self.snapshot() {
            if let Observer::WillChange(callback) = observer {
                callback(buffer, range.clone());
            }
        }
    }

    pub(crate) fn did_change(&self, buffer: &DataBuffer, range: Range<u64>) {
        for observer in self.snapshot() {
            if let Observer::DidChange(callback) = observer {
                callback(buffer, range.clone());
            }
        }
    }

    pub(crate) fn did_write(&self, buffer: &DataBuffer, path: Option<&Path>) {
        for observer in self.snapshot() {
            if let Observer::DidWrite(callback) = observer {
                callback(buffer, path);
            }
        }
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("count", &self.len())
            .finish()
    }
}
