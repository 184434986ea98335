use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{BoxError, Panicked, RollbackError, UndoFailure};

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

/// Identity of an object whose fields take part in transactions.
///
/// Together with a field name it keys an entry in the [`Journal`]. Every
/// [`TxField`](crate::TxField) mints its own identity; hand-written
/// participants call [`OwnerId::next`] once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(u64);

impl OwnerId {
    /// Allocate a process-unique identity.
    pub fn next() -> Self {
        OwnerId(NEXT_OWNER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type UndoFn = Box<dyn FnOnce() -> Result<(), BoxError> + Send>;

struct Entry {
    owner: OwnerId,
    field: Cow<'static, str>,
    undo: UndoFn,
}

/// Undo registry for the transaction currently in flight.
///
/// A journal is owned by the [`Processor`](crate::Processor) and lent to each
/// command as `&mut Journal`, so the borrow checker enforces that at most one
/// transaction records into it at a time.
///
/// Only the first value remembered for a given `(owner, field)` pair is kept:
/// rollback restores values as of [`begin`](Journal::begin), never an
/// intermediate value written later in the same transaction.
#[derive(Default)]
pub struct Journal {
    entries: Vec<Entry>,
    keys: HashSet<(OwnerId, Cow<'static, str>)>,
}

impl fmt::Debug for Journal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Journal")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl Journal {
    pub fn new() -> Self {
        Journal::default()
    }

    /// Start a new transaction, discarding any previous undo set.
    pub fn begin(&mut self) {
        self.entries.clear();
        self.keys.clear();
    }

    /// Register how to restore `field` of `owner` to `value`.
    ///
    /// `undo` is called with `value` on rollback. Does nothing if the pair was
    /// already remembered in this transaction.
    pub fn remember<T, F>(
        &mut self,
        owner: OwnerId,
        field: impl Into<Cow<'static, str>>,
        value: T,
        undo: F,
    ) where
        T: Send + 'static,
        F: FnOnce(T) -> Result<(), BoxError> + Send + 'static,
    {
        let field = field.into();
        if !self.keys.insert((owner, field.clone())) {
            return;
        }
        self.entries.push(Entry {
            owner,
            field,
            undo: Box::new(move || undo(value)),
        });
    }

    /// Whether `(owner, field)` already has an undo entry in this transaction.
    pub fn contains(&self, owner: OwnerId, field: &str) -> bool {
        self.keys.contains(&(owner, Cow::Borrowed(field)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop the undo set after the transaction has been made durable.
    pub fn commit(&mut self) {
        self.begin();
    }

    /// Run every registered undo action, newest first, and clear the journal.
    ///
    /// A failing action (returned error or panic) is logged and the remaining
    /// actions still run. If any failed, the state is no longer trustworthy
    /// and a [`RollbackError`] listing every failure is returned.
    pub fn rollback(&mut self) -> Result<(), RollbackError> {
        self.keys.clear();
        let entries = std::mem::take(&mut self.entries);
        let attempted = entries.len();
        let mut failures = Vec::new();

        for Entry { owner, field, undo } in entries.into_iter().rev() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(undo)).unwrap_or_else(|payload| {
                Err(Box::new(Panicked::from_payload(payload)) as BoxError)
            });
            if let Err(source) = outcome {
                log::warn!("error retracting {owner}.{field}: {source}");
                failures.push(UndoFailure {
                    owner,
                    field: field.into_owned(),
                    source,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RollbackError {
                attempted,
                failures,
            })
        }
    }
}
