use std::fmt::Debug;

use regex::Regex;

/// Checks a candidate value for a [`TxField`](crate::TxField).
///
/// Returns `Err(message)` to reject the value. Implemented for any
/// `Fn(&T) -> Result<(), String>` closure.
///
/// # Examples
///
/// ```
/// use memimg::Validator;
///
/// let positive = |v: &i64| {
///     if *v > 0 { Ok(()) } else { Err(format!("{v} is not positive")) }
/// };
/// assert!(positive.validate(&1).is_ok());
/// assert_eq!(positive.validate(&0), Err("0 is not positive".to_string()));
/// ```
pub trait Validator<T: ?Sized>: Send + Sync {
    fn validate(&self, value: &T) -> Result<(), String>;
}

impl<T: ?Sized, F> Validator<T> for F
where
    F: Fn(&T) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, value: &T) -> Result<(), String> {
        self(value)
    }
}

/// Adapts a boolean predicate into a [`Validator`].
pub struct Predicate<F>(pub F);

impl<T, F> Validator<T> for Predicate<F>
where
    T: Debug + ?Sized,
    F: Fn(&T) -> bool + Send + Sync,
{
    fn validate(&self, value: &T) -> Result<(), String> {
        if (self.0)(value) {
            Ok(())
        } else {
            Err(format!("invalid value: {value:?}"))
        }
    }
}

/// Accepts strings that match a regular expression in full.
///
/// # Examples
///
/// ```
/// use memimg::{RegexValidator, Validator};
///
/// let id = RegexValidator::new(r"[a-z][a-z0-9_]*", "invalid account id").unwrap();
/// assert!(id.validate("checking_1").is_ok());
/// assert_eq!(
///     id.validate("Checking 1"),
///     Err("invalid account id: Checking 1".to_string())
/// );
/// ```
#[derive(Debug, Clone)]
pub struct RegexValidator {
    regex: Regex,
    message: String,
}

impl RegexValidator {
    /// Compile `pattern`, anchored so that the whole value must match.
    pub fn new(pattern: &str, message: impl Into<String>) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{pattern})$"))?;
        Ok(RegexValidator {
            regex,
            message: message.into(),
        })
    }
}

impl Validator<str> for RegexValidator {
    fn validate(&self, value: &str) -> Result<(), String> {
        if self.regex.is_match(value) {
            Ok(())
        } else {
            Err(format!("{}: {value}", self.message))
        }
    }
}

impl Validator<String> for RegexValidator {
    fn validate(&self, value: &String) -> Result<(), String> {
        Validator::<str>::validate(self, value.as_str())
    }
}
