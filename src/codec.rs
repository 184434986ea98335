use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::BoxError;

/// Converts commands to and from single-line text records.
///
/// `decode(encode(c))` must yield a command that applies the same mutations
/// as `c`. Encoders do not need to avoid line breaks: the
/// [`EventLog`](crate::EventLog) replaces them before writing.
pub trait Codec<C>: Send {
    fn encode(&self, command: &C) -> Result<String, BoxError>;
    fn decode(&self, line: &str) -> Result<C, BoxError>;
}

/// JSON codec for any serde-serializable command type.
///
/// An internally tagged enum makes a convenient open set of command
/// variants:
///
/// ```
/// use memimg::{Codec, JsonCodec};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// #[serde(tag = "type")]
/// enum Cmd {
///     Add { value: i64 },
///     Clear,
/// }
///
/// let codec = JsonCodec::<Cmd>::new();
/// let line = codec.encode(&Cmd::Add { value: 3 }).unwrap();
/// assert_eq!(line, r#"{"type":"Add","value":3}"#);
/// assert_eq!(codec.decode(&line).unwrap(), Cmd::Add { value: 3 });
/// ```
pub struct JsonCodec<C> {
    _command: PhantomData<fn() -> C>,
}

impl<C> JsonCodec<C> {
    pub fn new() -> Self {
        JsonCodec {
            _command: PhantomData,
        }
    }
}

impl<C> Default for JsonCodec<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for JsonCodec<C> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<C> std::fmt::Debug for JsonCodec<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JsonCodec")
    }
}

impl<C> Codec<C> for JsonCodec<C>
where
    C: Serialize + DeserializeOwned,
{
    fn encode(&self, command: &C) -> Result<String, BoxError> {
        Ok(serde_json::to_string(command)?)
    }

    fn decode(&self, line: &str) -> Result<C, BoxError> {
        Ok(serde_json::from_str(line)?)
    }
}
