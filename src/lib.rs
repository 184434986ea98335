//! A memory-image engine: the whole application state lives in memory, is
//! changed only by [`Command`]s, and is made durable by appending each
//! successful command to an [`EventStore`] that is replayed at startup.
//!
//! - [`Journal`] records how to undo every write made by the command in
//!   flight.
//! - [`TxField`] is the validated mutable value domain types build on; every
//!   write registers its undo with the journal.
//! - [`EventLog`] stores one command per text line; [`MemoryStore`] keeps
//!   them in memory.
//! - [`Processor`] ties them together: replay on open, then
//!   apply-then-append for commands with rollback on failure, and lock-free
//!   [`Query`] execution.
//!
//! Failures come back as a [`Failure`]: `Command` (rolled back, keep going)
//! or `System` (memory and log may disagree, stop and rebuild).

mod codec;
mod command;
mod error;
mod event_log;
mod field;
mod journal;
mod processor;
mod store;
mod validate;

pub use codec::{Codec, JsonCodec};
pub use command::{Command, Query};
pub use error::{BoxError, Failure, RollbackError, StoreError, UndoFailure, ValidationError};
pub use event_log::{EventLog, EventLogBuilder, LockMode, SyncPolicy};
pub use field::TxField;
pub use journal::{Journal, OwnerId};
pub use processor::Processor;
pub use store::{EventStore, MemoryStore};
pub use validate::{Predicate, RegexValidator, Validator};
