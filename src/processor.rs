use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};

use parking_lot::Mutex;

use crate::command::{Command, Query};
use crate::error::{BoxError, Failure, Panicked, StoreError};
use crate::journal::Journal;
use crate::store::EventStore;

/// Everything the command path mutates, guarded by one lock.
struct Writer<E> {
    store: E,
    journal: Journal,
    halted: bool,
}

/// The memory-image engine.
///
/// Owns the system `S`, the [`EventStore`] holding every committed command
/// of type `C`, and the [`Journal`] used to undo failed commands.
///
/// Commands are serialized: at most one transaction (begin, apply, then
/// append or rollback) is in flight at a time. Queries take no lock and may
/// run alongside a command, observing its uncommitted writes.
///
/// After a [`Failure::System`] the processor is halted: further commands are
/// refused until the medium is repaired and a new processor is opened from
/// it. Queries keep working.
///
/// # Examples
///
/// ```
/// use memimg::{BoxError, Command, Journal, MemoryStore, Processor, TxField};
///
/// struct Counter {
///     value: TxField<u64>,
/// }
///
/// #[derive(Clone)]
/// struct Add(u64);
///
/// impl Command<Counter> for Add {
///     type Output = u64;
///
///     fn apply(&self, counter: &Counter, journal: &mut Journal) -> Result<u64, BoxError> {
///         let next = counter.value.get() + self.0;
///         counter.value.set(next, journal)?;
///         Ok(next)
///     }
/// }
///
/// let counter = Counter { value: TxField::new("value", 0u64, |v| *v < 10).unwrap() };
/// let processor = Processor::open(counter, MemoryStore::new()).unwrap();
///
/// assert_eq!(processor.execute(Add(4)).unwrap(), 4);
/// let failure = processor.execute(Add(20)).unwrap_err();
/// assert!(!failure.is_fatal());
/// assert_eq!(processor.read(|c| Ok(c.value.get())).unwrap(), 4);
/// ```
pub struct Processor<S, C, E> {
    system: S,
    writer: Mutex<Writer<E>>,
    _command: PhantomData<fn(C) -> C>,
}

impl<S, C, E> fmt::Debug for Processor<S, C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor")
            .field("system", &std::any::type_name::<S>())
            .field("halted", &self.writer.try_lock().map(|w| w.halted))
            .finish()
    }
}

impl<S, C, E> Processor<S, C, E>
where
    C: Command<S>,
    E: EventStore<C>,
{
    /// Rebuild `system` by replaying `store`, then accept commands.
    ///
    /// `system` must be in the same initial state it was in when the store
    /// was first written.
    ///
    /// # Errors
    ///
    /// Any record that cannot be read, decoded or applied aborts construction.
    pub fn open(system: S, store: E) -> Result<Self, StoreError> {
        let writer = Mutex::new(Writer {
            store,
            journal: Journal::new(),
            halted: false,
        });

        {
            let mut guard = writer.lock();
            let Writer { store, journal, .. } = &mut *guard;
            let replayed = store.replay(&mut |command: C| {
                journal.begin();
                let applied = apply_guarded(&command, &system, journal);
                journal.commit();
                applied.map(drop)
            });
            match replayed {
                Ok(count) => log::debug!("processor ready after replaying {count} command(s)"),
                Err(e) => {
                    log::error!("error replaying commands: {e}");
                    return Err(e);
                }
            }
        }

        Ok(Processor {
            system,
            writer,
            _command: PhantomData,
        })
    }

    /// Apply `command` and record it.
    ///
    /// # Errors
    ///
    /// - [`Failure::Command`] if the command fails. Its writes are rolled back
    ///   and nothing is recorded.
    /// - [`Failure::System`] if recording fails (the writes stay applied but
    ///   are not durable), if rollback fails, or if the processor was already
    ///   halted by an earlier system failure.
    pub fn execute(&self, command: C) -> Result<C::Output, Failure> {
        let mut guard = self.writer.lock();
        let Writer {
            store,
            journal,
            halted,
        } = &mut *guard;

        if *halted {
            return Err(Failure::system(
                "accepting command",
                command.name(),
                "processor halted after an earlier system failure".into(),
            ));
        }

        journal.begin();
        match apply_guarded(&command, &self.system, journal) {
            Ok(output) => {
                journal.commit();
                if let Err(e) = store.append(&command) {
                    log::error!("error recording command {}: {e}", command.name());
                    *halted = true;
                    return Err(Failure::system(
                        "recording command",
                        command.name(),
                        Box::new(e),
                    ));
                }
                Ok(output)
            }
            Err(source) => {
                if let Err(e) = journal.rollback() {
                    log::error!(
                        "error rolling back command {} after `{source}`: {e}",
                        command.name()
                    );
                    *halted = true;
                    return Err(Failure::system(
                        "rolling back command",
                        command.name(),
                        Box::new(e),
                    ));
                }
                log::debug!("error executing command {}: {source}", command.name());
                Err(Failure::command("executing command", command.name(), source))
            }
        }
    }

    /// Run `query` against the current state. Takes no lock.
    ///
    /// # Errors
    ///
    /// [`Failure::Command`] if the query fails or panics.
    pub fn query<Q: Query<S>>(&self, query: &Q) -> Result<Q::Output, Failure> {
        extract_guarded(query.name(), || query.extract(&self.system))
    }

    /// Run a closure as a query. Same semantics as [`query`](Processor::query).
    pub fn read<R>(&self, f: impl FnOnce(&S) -> Result<R, BoxError>) -> Result<R, Failure> {
        extract_guarded("query", || f(&self.system))
    }

    /// The system, for direct reads outside the failure-reporting wrapper.
    pub fn system(&self) -> &S {
        &self.system
    }

    /// Close the store and hand the system back.
    pub fn close(self) -> Result<S, StoreError> {
        let Processor { system, writer, .. } = self;
        let mut writer = writer.into_inner();
        writer.store.close()?;
        Ok(system)
    }
}

impl<S, C, E> Processor<S, C, E> {
    /// Whether a system failure has stopped the command path.
    pub fn is_halted(&self) -> bool {
        self.writer.lock().halted
    }
}

fn apply_guarded<S, C: Command<S>>(
    command: &C,
    system: &S,
    journal: &mut Journal,
) -> Result<C::Output, BoxError> {
    panic::catch_unwind(AssertUnwindSafe(|| command.apply(system, journal)))
        .unwrap_or_else(|payload| Err(Box::new(Panicked::from_payload(payload)) as BoxError))
}

fn extract_guarded<R>(
    name: &str,
    extract: impl FnOnce() -> Result<R, BoxError>,
) -> Result<R, Failure> {
    panic::catch_unwind(AssertUnwindSafe(extract))
        .unwrap_or_else(|payload| Err(Box::new(Panicked::from_payload(payload)) as BoxError))
        .map_err(|source| {
            log::debug!("error executing {name}: {source}");
            Failure::command("executing", name, source)
        })
}
