//! The pack/parse contract every component satisfies.

use crate::aggregate::{NamedAggregate, PositionalAggregate};
use crate::error::TranscodeError;
use crate::options::{Deliver, PackOptions, ParseOptions, Source};
use crate::size::Size;
use crate::value::Value;
use std::sync::Arc;

/// Result of a pack call. `buffer` holds the standalone fragment; it is empty when
/// the bytes went into a caller-supplied `data_view`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packed {
    pub buffer: Vec<u8>,
    pub size: Size,
}

impl Packed {
    pub(crate) fn in_place(size: Size) -> Self {
        Packed {
            buffer: Vec::new(),
            size,
        }
    }
}

/// Result of a parse call.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub data: Value,
    pub size: Size,
}

/// Explicit tag carried by aggregate-producing Structs, used by [`crate::embed::Embed`]
/// to pick a flattening target.
#[derive(Clone, Copy)]
pub enum Aggregate<'a> {
    Named(&'a NamedAggregate),
    Positional(&'a PositionalAggregate),
}

pub trait Struct: Send + Sync {
    fn pack(&self, source: Source<'_>, options: PackOptions<'_, '_>) -> Result<Packed, TranscodeError>;

    fn parse(
        &self,
        data: &[u8],
        options: ParseOptions<'_>,
        deliver: Option<Deliver<'_>>,
    ) -> Result<Parsed, TranscodeError>;

    /// `Some` for named and positional aggregates (including repeats).
    fn aggregate(&self) -> Option<Aggregate<'_>> {
        None
    }

    /// Packs `value` at the top level into a fresh buffer.
    fn to_bytes(&self, value: Value) -> Result<Vec<u8>, TranscodeError> {
        Ok(self.pack(Source::Value(value), PackOptions::default())?.buffer)
    }

    /// Parses a value from the start of `data`.
    fn from_bytes(&self, data: &[u8]) -> Result<Value, TranscodeError> {
        Ok(self.parse(data, ParseOptions::default(), None)?.data)
    }

    fn shared(self) -> StructRef
    where
        Self: Sized + 'static,
    {
        Arc::new(self)
    }
}

pub type StructRef = Arc<dyn Struct>;
