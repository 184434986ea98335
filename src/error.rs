//! Error taxonomy.
//!
//! Three layers of failure exist:
//!
//! - [`ValidationError`]: a [`TxField`](crate::TxField) refused a new value.
//!   Always recoverable; surfaces to callers as part of a command failure.
//! - [`StoreError`]: the durable medium could not be opened, read, decoded or
//!   written.
//! - [`Failure`]: the tagged outcome of [`Processor::execute`](crate::Processor::execute)
//!   and [`Processor::query`](crate::Processor::query), distinguishing
//!   recoverable command failures from fatal system failures.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::journal::OwnerId;

/// Boxed error used for domain failures raised by commands, queries, codecs
/// and undo actions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A transactional field rejected a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Name of the field that rejected the value.
    pub field: String,
    /// Validator message.
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A single undo action that failed during rollback.
#[derive(Debug)]
pub struct UndoFailure {
    pub owner: OwnerId,
    pub field: String,
    pub source: BoxError,
}

impl fmt::Display for UndoFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}: {}", self.owner, self.field, self.source)
    }
}

/// One or more undo actions failed. The system state is no longer known to
/// match the state at transaction start.
#[derive(Debug)]
pub struct RollbackError {
    /// Number of undo actions that were run.
    pub attempted: usize,
    /// Failed actions in the order they were run. Never empty.
    pub failures: Vec<UndoFailure>,
}

impl fmt::Display for RollbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} undo action(s) failed",
            self.failures.len(),
            self.attempted
        )?;
        if let Some(first) = self.failures.first() {
            write!(f, ", first: {first}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RollbackError {}

/// Errors raised by an [`EventStore`](crate::EventStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The medium is neither an existing readable and writable file, nor a
    /// missing file whose parent directory is writable or can be created.
    #[error("inaccessible event log {}: {source}", .path.display())]
    Inaccessible { path: PathBuf, source: io::Error },

    /// Another writer holds the exclusive lock.
    #[error("another writer holds the lock on {}", .path.display())]
    Locked { path: PathBuf },

    #[error("event log I/O error: {0}")]
    Io(#[from] io::Error),

    /// A command could not be encoded into a record.
    #[error("failed to encode command: {0}")]
    Encode(#[source] BoxError),

    /// A stored record could not be decoded. Replay cannot continue past it.
    #[error("failed to decode record at line {line}: {source}")]
    Decode { line: u64, source: BoxError },

    /// A decoded record failed to apply during replay.
    #[error("failed to replay record at line {line}: {source}")]
    Replay { line: u64, source: BoxError },

    /// `append` was called before `replay`.
    #[error("event store must be replayed before appending")]
    NotReplayed,

    /// `replay` was called a second time.
    #[error("event store has already been replayed")]
    AlreadyReplayed,

    /// `append` was called after `close`.
    #[error("event store is closed")]
    Closed,
}

/// Failure outcome of executing a command or query.
#[derive(Debug, Error)]
pub enum Failure {
    /// The command or query raised an ordinary error. Any partial mutation
    /// was rolled back and the processor is safe to keep using.
    #[error("error while {context} {name}: {source}")]
    Command {
        context: &'static str,
        name: String,
        source: BoxError,
    },

    /// Appending to the log failed, or rollback failed. The in-memory system
    /// and the durable log may have diverged; stop issuing commands until
    /// the medium is repaired and the processor rebuilt from it.
    #[error("system failure while {context} {name}: {source}")]
    System {
        context: &'static str,
        name: String,
        source: BoxError,
    },
}

impl Failure {
    pub(crate) fn command(context: &'static str, name: &str, source: BoxError) -> Self {
        Failure::Command {
            context,
            name: name.to_string(),
            source,
        }
    }

    pub(crate) fn system(context: &'static str, name: &str, source: BoxError) -> Self {
        Failure::System {
            context,
            name: name.to_string(),
            source,
        }
    }

    /// `true` for [`Failure::System`].
    pub fn is_fatal(&self) -> bool {
        matches!(self, Failure::System { .. })
    }

    /// The underlying error.
    pub fn source_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        match self {
            Failure::Command { source, .. } | Failure::System { source, .. } => source.as_ref(),
        }
    }
}

/// Error built from a caught panic payload.
#[derive(Debug, Error)]
#[error("panicked: {0}")]
pub(crate) struct Panicked(pub String);

impl Panicked {
    pub(crate) fn from_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Panicked(message)
    }
}
