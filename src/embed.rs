//! Flattening: an embedded aggregate's fields become siblings of the embedding field.
//!
//! Inside an aggregate, `Embed` runs the wrapped aggregate's field primitives directly
//! against the enclosing document instead of building a document of its own. The
//! aggregate's repetition policy resolves against the enclosing document's parent.
//! The embed's own field never receives a value. At top level (no active context) it
//! behaves exactly like the wrapped Struct.

use crate::concat::concat_fragments;
use crate::context::Context;
use crate::error::TranscodeError;
use crate::options::{Deliver, PackOptions, ParseOptions, Source};
use crate::size::Size;
use crate::structure::{Aggregate, Packed, Parsed, Struct, StructRef};
use crate::value::Value;
use std::cell::Cell;

pub struct Embed {
    inner: StructRef,
}

impl Embed {
    /// Fails with `Configuration` unless `inner` is a named or positional aggregate.
    pub fn new(inner: StructRef) -> Result<Self, TranscodeError> {
        if inner.aggregate().is_none() {
            return Err(TranscodeError::Configuration(
                "Embed requires a named or positional aggregate".to_string(),
            ));
        }
        Ok(Embed { inner })
    }
}

fn shape_mismatch(embedded: &str, enclosing: &Context<'_>) -> TranscodeError {
    let found = if enclosing.is_named() { "named" } else { "positional" };
    TranscodeError::Configuration(format!(
        "cannot embed a {} aggregate into a {} document",
        embedded, found
    ))
}

impl Struct for Embed {
    fn pack(&self, source: Source<'_>, options: PackOptions<'_, '_>) -> Result<Packed, TranscodeError> {
        let Some(ctx) = options.context else {
            return self.inner.pack(source, options);
        };
        match self.inner.aggregate() {
            Some(Aggregate::Named(agg)) => {
                if !ctx.is_named() {
                    return Err(shape_mismatch("named", ctx));
                }
                let endianness = agg.transcoders().resolve_endianness(options.endianness);
                agg.pack_fields(ctx, options.data_view, options.offset, endianness)
            }
            Some(Aggregate::Positional(agg)) => {
                if !ctx.is_positional() {
                    return Err(shape_mismatch("positional", ctx));
                }
                let endianness = agg.transcoders().resolve_endianness(options.endianness);
                let mut view = options.data_view;
                let mut fragments = Vec::new();
                let size = match source {
                    Source::Fetch(fetch) => agg.pack_loop(
                        fetch,
                        ctx,
                        ctx.parent(),
                        view.as_deref_mut(),
                        options.offset,
                        endianness,
                        &mut fragments,
                    )?,
                    Source::Value(Value::List(items)) => {
                        let cursor = Cell::new(0usize);
                        let mut fetch = || {
                            let index = cursor.get();
                            let value = items
                                .get(index)
                                .cloned()
                                .ok_or(TranscodeError::InsufficientData { consumed: index })?;
                            cursor.set(index + 1);
                            Ok(value)
                        };
                        agg.pack_loop(
                            &mut fetch,
                            ctx,
                            ctx.parent(),
                            view.as_deref_mut(),
                            options.offset,
                            endianness,
                            &mut fragments,
                        )?
                    }
                    Source::Value(other) => {
                        return Err(TranscodeError::TypeMismatch {
                            expected: "list",
                            found: other.type_name().to_string(),
                        })
                    }
                };
                match view {
                    Some(_) => Ok(Packed::in_place(size)),
                    None => Ok(Packed {
                        buffer: concat_fragments(&fragments, size)?,
                        size,
                    }),
                }
            }
            None => self.inner.pack(source, options),
        }
    }

    fn parse(
        &self,
        data: &[u8],
        options: ParseOptions<'_>,
        deliver: Option<Deliver<'_>>,
    ) -> Result<Parsed, TranscodeError> {
        let Some(ctx) = options.context else {
            return self.inner.parse(data, options, deliver);
        };
        let size: Size = match self.inner.aggregate() {
            Some(Aggregate::Named(agg)) => {
                if !ctx.is_named() {
                    return Err(shape_mismatch("named", ctx));
                }
                let endianness = agg.transcoders().resolve_endianness(options.endianness);
                agg.parse_fields(data, options.offset, endianness, ctx)?
            }
            Some(Aggregate::Positional(agg)) => {
                if !ctx.is_positional() {
                    return Err(shape_mismatch("positional", ctx));
                }
                let endianness = agg.transcoders().resolve_endianness(options.endianness);
                let mut push = |value: Value| ctx.push(value);
                agg.parse_loop(data, options.offset, endianness, ctx, ctx.parent(), &mut push)?
            }
            None => return self.inner.parse(data, options, deliver),
        };
        Ok(Parsed {
            data: Value::Null,
            size,
        })
    }

    fn aggregate(&self) -> Option<Aggregate<'_>> {
        self.inner.aggregate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{NamedAggregate, PositionalAggregate};
    use crate::field::Primitive;
    use crate::options::Transcoders;

    fn uint8() -> StructRef {
        Primitive::uint(8, Transcoders::new()).unwrap().shared()
    }

    #[test]
    fn test_rejects_non_aggregate() {
        assert!(matches!(Embed::new(uint8()), Err(TranscodeError::Configuration(_))));
    }

    #[test]
    fn test_passthrough_without_context() {
        let inner = NamedAggregate::new([("a", uint8())], Transcoders::new()).unwrap().shared();
        let embed = Embed::new(inner).unwrap();
        let value = Value::map([("a", Value::Uint(9))]);
        assert_eq!(embed.to_bytes(value.clone()).unwrap(), vec![9]);
        assert_eq!(embed.from_bytes(&[9]).unwrap(), value);
    }

    #[test]
    fn test_shape_mismatch_at_call_time() {
        let inner = PositionalAggregate::new([uint8()], Transcoders::new()).shared();
        let outer = NamedAggregate::new(
            [("x", Embed::new(inner).unwrap().shared())],
            Transcoders::new(),
        )
        .unwrap();
        let err = outer.from_bytes(&[1]).unwrap_err();
        assert!(matches!(err.root(), TranscodeError::Configuration(_)));
        assert_eq!(err.path(), "x");
    }

    #[test]
    fn test_positional_splice() {
        let inner = PositionalAggregate::new([uint8(), uint8()], Transcoders::new()).shared();
        let outer = PositionalAggregate::new(
            [uint8(), Embed::new(inner).unwrap().shared(), uint8()],
            Transcoders::new(),
        );
        let value = Value::list([1u64, 2, 3, 4].map(Value::Uint));
        let bytes = outer.to_bytes(value.clone()).unwrap();
        assert_eq!(bytes, vec![1, 2, 3, 4]);
        assert_eq!(outer.from_bytes(&bytes).unwrap(), value);
    }
}
