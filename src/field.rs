use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::ValidationError;
use crate::journal::{Journal, OwnerId};
use crate::validate::{Predicate, Validator};

/// A validated, undo-aware mutable value.
///
/// Domain entities hold their mutable state in `TxField`s. Every
/// [`set`](TxField::set) validates the new value, records the value held at
/// transaction start in the [`Journal`], and only then stores the new value,
/// so a failed command leaves no trace after rollback.
///
/// Reads take a shared lock and never observe a torn write, which is what
/// lets queries run alongside an in-flight command.
///
/// # Examples
///
/// ```
/// use memimg::{Journal, TxField};
///
/// let balance = TxField::new("balance", 0i64, |b| *b >= 0).unwrap();
/// let mut journal = Journal::new();
///
/// journal.begin();
/// balance.set(100, &mut journal).unwrap();
/// balance.set(40, &mut journal).unwrap();
/// assert!(balance.set(-1, &mut journal).is_err());
/// assert_eq!(balance.get(), 40);
///
/// journal.rollback().unwrap();
/// assert_eq!(balance.get(), 0);
/// ```
pub struct TxField<T> {
    owner: OwnerId,
    name: &'static str,
    value: Arc<RwLock<T>>,
    validator: Option<Box<dyn Validator<T>>>,
}

impl<T: fmt::Debug> fmt::Debug for TxField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxField")
            .field("owner", &self.owner)
            .field("name", &self.name)
            .field("value", &*self.value.read())
            .finish()
    }
}

impl<T> TxField<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a field guarded by a boolean predicate.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if `initial` fails the predicate.
    pub fn new<F>(name: &'static str, initial: T, predicate: F) -> Result<Self, ValidationError>
    where
        T: fmt::Debug,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self::with_validator(name, initial, Predicate(predicate))
    }

    /// Create a field guarded by an arbitrary [`Validator`].
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if `initial` is rejected.
    pub fn with_validator<V>(
        name: &'static str,
        initial: T,
        validator: V,
    ) -> Result<Self, ValidationError>
    where
        V: Validator<T> + 'static,
    {
        validator
            .validate(&initial)
            .map_err(|message| ValidationError::new(name, message))?;
        Ok(TxField {
            owner: OwnerId::next(),
            name,
            value: Arc::new(RwLock::new(initial)),
            validator: Some(Box::new(validator)),
        })
    }

    /// Create a field that accepts any value.
    pub fn unchecked(name: &'static str, initial: T) -> Self {
        TxField {
            owner: OwnerId::next(),
            name,
            value: Arc::new(RwLock::new(initial)),
            validator: None,
        }
    }

    /// Current value. No bookkeeping.
    pub fn get(&self) -> T {
        self.value.read().clone()
    }

    /// Borrow the current value under the read lock.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&*self.value.read())
    }

    /// Validate `value`, remember the pre-transaction value, then store `value`.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] and leaves the field unchanged if
    /// `value` is rejected.
    pub fn set(&self, value: T, journal: &mut Journal) -> Result<(), ValidationError> {
        self.validate(&value)?;
        let mut current = self.value.write();
        if !journal.contains(self.owner, self.name) {
            let cell = Arc::clone(&self.value);
            journal.remember(self.owner, self.name, current.clone(), move |previous| {
                *cell.write() = previous;
                Ok(())
            });
        }
        *current = value;
        Ok(())
    }

    /// Modify a copy of the current value with `f`, then [`set`](TxField::set) it.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] and leaves the field unchanged if the
    /// modified value is rejected.
    pub fn update<R>(
        &self,
        journal: &mut Journal,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R, ValidationError> {
        let mut next = self.get();
        let out = f(&mut next);
        self.set(next, journal)?;
        Ok(out)
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn validate(&self, value: &T) -> Result<(), ValidationError> {
        match &self.validator {
            Some(validator) => validator
                .validate(value)
                .map_err(|message| ValidationError::new(self.name, message)),
            None => Ok(()),
        }
    }
}
