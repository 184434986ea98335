use crate::error::BoxError;
use crate::journal::Journal;

/// A serializable mutation of the system `S`.
///
/// `apply` receives the system by shared reference: all mutable state lives
/// in interior-mutable, journal-aware primitives such as
/// [`TxField`](crate::TxField), and every write goes through the `journal`
/// so that a failed command can be rolled back.
///
/// Applying a command must be deterministic and free of external side
/// effects; replay re-applies every logged command to rebuild state.
pub trait Command<S: ?Sized> {
    type Output;

    fn apply(&self, system: &S, journal: &mut Journal) -> Result<Self::Output, BoxError>;

    /// Label used in failure messages and logs.
    fn name(&self) -> &str {
        short_type_name::<Self>()
    }
}

/// A read-only request against the system `S`. Queries are never logged.
///
/// Implemented for closures `Fn(&S) -> Result<R, BoxError>`:
///
/// ```
/// use memimg::{BoxError, Query};
///
/// let len = |v: &Vec<i32>| -> Result<usize, BoxError> { Ok(v.len()) };
/// assert_eq!(len.extract(&vec![1, 2, 3]).unwrap(), 3);
/// ```
pub trait Query<S: ?Sized> {
    type Output;

    fn extract(&self, system: &S) -> Result<Self::Output, BoxError>;

    fn name(&self) -> &str {
        short_type_name::<Self>()
    }
}

impl<S: ?Sized, R, F> Query<S> for F
where
    F: Fn(&S) -> Result<R, BoxError>,
{
    type Output = R;

    fn extract(&self, system: &S) -> Result<R, BoxError> {
        self(system)
    }

    fn name(&self) -> &str {
        "query"
    }
}

/// `type_name` without the module path, keeping generic arguments as-is.
fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let path_end = full.find('<').unwrap_or(full.len());
    let start = full[..path_end].rfind("::").map_or(0, |i| i + 2);
    &full[start..]
}
