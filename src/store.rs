use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{BoxError, StoreError};

/// Durable, append-only record of committed commands.
///
/// The [`Processor`](crate::Processor) calls [`replay`](EventStore::replay)
/// exactly once at construction, then [`append`](EventStore::append) once
/// per successful command, always under its write lock.
pub trait EventStore<C> {
    /// Feed every stored command to `apply`, oldest first. Returns the number
    /// of commands replayed.
    ///
    /// Stops at the first record that cannot be decoded or applied.
    fn replay(
        &mut self,
        apply: &mut dyn FnMut(C) -> Result<(), BoxError>,
    ) -> Result<u64, StoreError>;

    /// Durably record `command`. A record is either fully written or not at all.
    fn append(&mut self, command: &C) -> Result<(), StoreError>;

    /// Make every appended record durable and release the medium.
    fn close(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Volatile in-memory store.
///
/// Clones share one buffer, so a store can be handed to a processor and
/// later to a fresh one to exercise replay without touching disk.
///
/// # Examples
///
/// ```
/// use memimg::{EventStore, MemoryStore};
///
/// let mut store = MemoryStore::<u32>::new();
/// store.replay(&mut |_| Ok(())).unwrap();
/// store.append(&1).unwrap();
/// store.append(&2).unwrap();
///
/// let mut seen = Vec::new();
/// let mut again = store.reopen();
/// again.replay(&mut |c| { seen.push(c); Ok(()) }).unwrap();
/// assert_eq!(seen, vec![1, 2]);
/// ```
#[derive(Debug)]
pub struct MemoryStore<C> {
    buffer: Arc<Mutex<Vec<C>>>,
    replayed: bool,
}

impl<C> Default for MemoryStore<C> {
    fn default() -> Self {
        MemoryStore {
            buffer: Arc::new(Mutex::new(Vec::new())),
            replayed: false,
        }
    }
}

impl<C: Clone> MemoryStore<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh, not yet replayed handle over the same buffer.
    pub fn reopen(&self) -> Self {
        MemoryStore {
            buffer: Arc::clone(&self.buffer),
            replayed: false,
        }
    }

    /// Copy of every recorded command.
    pub fn commands(&self) -> Vec<C> {
        self.buffer.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }
}

impl<C: Clone> EventStore<C> for MemoryStore<C> {
    fn replay(
        &mut self,
        apply: &mut dyn FnMut(C) -> Result<(), BoxError>,
    ) -> Result<u64, StoreError> {
        if self.replayed {
            return Err(StoreError::AlreadyReplayed);
        }
        self.replayed = true;

        let commands = self.commands();
        let mut count = 0;
        for command in commands {
            count += 1;
            apply(command).map_err(|source| StoreError::Replay {
                line: count,
                source,
            })?;
        }
        Ok(count)
    }

    fn append(&mut self, command: &C) -> Result<(), StoreError> {
        if !self.replayed {
            return Err(StoreError::NotReplayed);
        }
        self.buffer.lock().push(command.clone());
        Ok(())
    }
}
