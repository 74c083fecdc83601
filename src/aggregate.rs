//! Aggregates: named (keyed document) and positional (list document) composites, and
//! the repetition policies that drive a positional aggregate's single pass.
//!
//! Both kinds split their work in two layers. `pack`/`parse` own the document: they
//! create a [`Context`] linked to the caller's, run the children, and move the
//! finished document out. The field-level primitives (`pack_fields`/`parse_fields`,
//! `pack_loop`/`parse_loop`) take the document as an argument so that
//! [`crate::embed::Embed`] can run them against an enclosing document instead.

use crate::codec::Endianness;
use crate::concat::concat_fragments;
use crate::context::Context;
use crate::error::TranscodeError;
use crate::options::{Deliver, Fetcher, Numeric, PackOptions, ParseOptions, Source, Transcoders};
use crate::size::Size;
use crate::structure::{Aggregate, Packed, Parsed, Struct, StructRef};
use crate::value::Value;
use std::cell::Cell;
use std::collections::HashSet;
use tracing::trace;

/// Ordered `(name, child)` fields building a keyed document.
pub struct NamedAggregate {
    fields: Vec<(String, StructRef)>,
    transcoders: Transcoders,
}

impl NamedAggregate {
    /// Fails with `Configuration` on duplicate field names.
    pub fn new<N, I>(fields: I, transcoders: Transcoders) -> Result<Self, TranscodeError>
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, StructRef)>,
    {
        let fields: Vec<(String, StructRef)> = fields.into_iter().map(|(n, s)| (n.into(), s)).collect();
        let mut seen = HashSet::new();
        for (name, _) in &fields {
            if !seen.insert(name.as_str()) {
                return Err(TranscodeError::Configuration(format!("Duplicate field name: {}", name)));
            }
        }
        Ok(NamedAggregate { fields, transcoders })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub(crate) fn transcoders(&self) -> &Transcoders {
        &self.transcoders
    }

    /// Packs every field from `document`, in declaration order.
    pub(crate) fn pack_fields(
        &self,
        document: &Context<'_>,
        view: Option<&mut [u8]>,
        offset: Size,
        endianness: Option<Endianness>,
    ) -> Result<Packed, TranscodeError> {
        let mut view = view;
        let mut fragments = Vec::new();
        let mut size = Size::ZERO;
        for (name, child) in &self.fields {
            let mut fetch = || document.require(name);
            let packed = child
                .pack(
                    Source::Fetch(&mut fetch),
                    PackOptions {
                        data_view: view.as_deref_mut(),
                        offset: offset + size,
                        endianness,
                        context: Some(document),
                    },
                )
                .map_err(|e| e.in_field(name))?;
            trace!(field = %name, offset = (offset + size).bits(), bits = packed.size.bits(), "packed field");
            size = size.try_add(packed.size)?;
            if view.is_none() {
                fragments.push(packed);
            }
        }
        match view {
            Some(_) => Ok(Packed::in_place(size)),
            None => Ok(Packed {
                buffer: concat_fragments(&fragments, size)?,
                size,
            }),
        }
    }

    /// Parses every field into `document`, in declaration order. Returns the bits consumed.
    pub(crate) fn parse_fields(
        &self,
        data: &[u8],
        offset: Size,
        endianness: Option<Endianness>,
        document: &Context<'_>,
    ) -> Result<Size, TranscodeError> {
        let mut size = Size::ZERO;
        for (name, child) in &self.fields {
            let mut deliver = |value: Value| document.set(name, value);
            let parsed = child
                .parse(
                    data,
                    ParseOptions {
                        offset: offset + size,
                        endianness,
                        context: Some(document),
                    },
                    Some(&mut deliver),
                )
                .map_err(|e| e.in_field(name))?;
            trace!(field = %name, offset = (offset + size).bits(), bits = parsed.size.bits(), "parsed field");
            size += parsed.size;
        }
        Ok(size)
    }
}

impl Struct for NamedAggregate {
    fn pack(&self, source: Source<'_>, options: PackOptions<'_, '_>) -> Result<Packed, TranscodeError> {
        let endianness = self.transcoders.resolve_endianness(options.endianness);
        let encoded = self.transcoders.fetch_and_encode(source, options.context)?;
        if !matches!(encoded, Value::Map(_)) {
            return Err(TranscodeError::TypeMismatch {
                expected: "map",
                found: encoded.type_name().to_string(),
            });
        }
        let document = Context::new(encoded, options.context);
        self.pack_fields(&document, options.data_view, options.offset, endianness)
    }

    fn parse(
        &self,
        data: &[u8],
        options: ParseOptions<'_>,
        deliver: Option<Deliver<'_>>,
    ) -> Result<Parsed, TranscodeError> {
        let endianness = self.transcoders.resolve_endianness(options.endianness);
        let document = Context::named(options.context);
        let size = self.parse_fields(data, options.offset, endianness, &document)?;
        let decoded = document.into_document();
        let data = self
            .transcoders
            .decode_and_deliver(decoded, options.context, deliver)?;
        Ok(Parsed { data, size })
    }

    fn aggregate(&self) -> Option<Aggregate<'_>> {
        Some(Aggregate::Named(self))
    }
}

/// How many passes a repeat makes over its children.
#[derive(Debug, Clone)]
pub enum Repetition {
    /// Exactly this many passes (resolved as an element count).
    Count(Numeric),
    /// Passes until exactly this many bytes are covered.
    Bytes(Numeric),
}

/// Repetition policy plus hooks for [`PositionalAggregate::repeat`].
#[derive(Debug, Clone, Default)]
pub struct RepeatOptions {
    pub count: Option<Numeric>,
    pub bytes: Option<Numeric>,
    pub transcoders: Transcoders,
}

impl RepeatOptions {
    pub fn count(count: impl Into<Numeric>) -> Self {
        RepeatOptions {
            count: Some(count.into()),
            ..Default::default()
        }
    }

    pub fn bytes(bytes: impl Into<Numeric>) -> Self {
        RepeatOptions {
            bytes: Some(bytes.into()),
            ..Default::default()
        }
    }

    pub fn transcoders(mut self, transcoders: Transcoders) -> Self {
        self.transcoders = transcoders;
        self
    }
}

/// Ordered anonymous children building a list document, optionally repeated.
pub struct PositionalAggregate {
    children: Vec<StructRef>,
    transcoders: Transcoders,
    repetition: Option<Repetition>,
}

impl PositionalAggregate {
    pub fn new<I>(children: I, transcoders: Transcoders) -> Self
    where
        I: IntoIterator<Item = StructRef>,
    {
        PositionalAggregate {
            children: children.into_iter().collect(),
            transcoders,
            repetition: None,
        }
    }

    /// A positional aggregate whose children are traversed `count` times, or until
    /// exactly `bytes` bytes are covered. Exactly one of the two must be given.
    pub fn repeat<I>(options: RepeatOptions, children: I) -> Result<Self, TranscodeError>
    where
        I: IntoIterator<Item = StructRef>,
    {
        let repetition = match (options.count, options.bytes) {
            (Some(count), None) => Repetition::Count(count),
            (None, Some(bytes)) => Repetition::Bytes(bytes),
            (None, None) => {
                return Err(TranscodeError::Configuration(
                    "One of count or bytes must be specified in options".to_string(),
                ))
            }
            (Some(_), Some(_)) => {
                return Err(TranscodeError::Configuration(
                    "Only one of count or bytes may be specified in options".to_string(),
                ))
            }
        };
        Ok(PositionalAggregate {
            children: children.into_iter().collect(),
            transcoders: options.transcoders,
            repetition: Some(repetition),
        })
    }

    pub fn repetition(&self) -> Option<&Repetition> {
        self.repetition.as_ref()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub(crate) fn transcoders(&self) -> &Transcoders {
        &self.transcoders
    }

    /// One traversal of the children, pulling one value per child from `fetch`.
    /// Without a view, each child's fragment is pushed onto `store`.
    fn pack_pass(
        &self,
        fetch: Fetcher<'_>,
        context: &Context<'_>,
        view: Option<&mut [u8]>,
        offset: Size,
        endianness: Option<Endianness>,
        store: &mut Vec<Packed>,
    ) -> Result<Size, TranscodeError> {
        let mut view = view;
        let mut size = Size::ZERO;
        for child in &self.children {
            let packed = child.pack(
                Source::Fetch(&mut *fetch),
                PackOptions {
                    data_view: view.as_deref_mut(),
                    offset: offset + size,
                    endianness,
                    context: Some(context),
                },
            )?;
            size = size.try_add(packed.size)?;
            if view.is_none() {
                store.push(packed);
            }
        }
        Ok(size)
    }

    /// Runs passes under the repetition policy. Counts and budgets resolve against
    /// `parent`, the context enclosing the list document.
    pub(crate) fn pack_loop(
        &self,
        fetch: Fetcher<'_>,
        context: &Context<'_>,
        parent: Option<&Context<'_>>,
        view: Option<&mut [u8]>,
        offset: Size,
        endianness: Option<Endianness>,
        store: &mut Vec<Packed>,
    ) -> Result<Size, TranscodeError> {
        let mut view = view;
        let mut size = Size::ZERO;
        match &self.repetition {
            None => self.pack_pass(fetch, context, view, offset, endianness, store),
            Some(Repetition::Count(count)) => {
                let count = count.resolve_count(parent)?;
                for _ in 0..count {
                    let pass =
                        self.pack_pass(&mut *fetch, context, view.as_deref_mut(), offset + size, endianness, store)?;
                    if pass == Size::ZERO {
                        return Err(no_progress());
                    }
                    size = size.try_add(pass)?;
                }
                Ok(size)
            }
            Some(Repetition::Bytes(bytes)) => {
                let budget = Size::try_from_bytes(bytes.resolve_bytes(parent)?)?;
                while size < budget {
                    let pass =
                        self.pack_pass(&mut *fetch, context, view.as_deref_mut(), offset + size, endianness, store)?;
                    if pass == Size::ZERO {
                        return Err(no_progress());
                    }
                    size = size.try_add(pass)?;
                }
                if size > budget {
                    return Err(TranscodeError::Overrun {
                        budget,
                        reached: size,
                        unconsumed: 0,
                    });
                }
                Ok(size)
            }
        }
    }

    fn parse_pass(
        &self,
        data: &[u8],
        offset: Size,
        endianness: Option<Endianness>,
        context: &Context<'_>,
        deliver: Deliver<'_>,
    ) -> Result<Size, TranscodeError> {
        let mut size = Size::ZERO;
        for child in &self.children {
            let parsed = child.parse(
                data,
                ParseOptions {
                    offset: offset + size,
                    endianness,
                    context: Some(context),
                },
                Some(&mut *deliver),
            )?;
            size += parsed.size;
        }
        Ok(size)
    }

    pub(crate) fn parse_loop(
        &self,
        data: &[u8],
        offset: Size,
        endianness: Option<Endianness>,
        context: &Context<'_>,
        parent: Option<&Context<'_>>,
        deliver: Deliver<'_>,
    ) -> Result<Size, TranscodeError> {
        let mut size = Size::ZERO;
        match &self.repetition {
            None => self.parse_pass(data, offset, endianness, context, deliver),
            Some(Repetition::Count(count)) => {
                let count = count.resolve_count(parent)?;
                for _ in 0..count {
                    let pass = self.parse_pass(data, offset + size, endianness, context, &mut *deliver)?;
                    if pass == Size::ZERO {
                        return Err(no_progress());
                    }
                    size = size.try_add(pass)?;
                }
                Ok(size)
            }
            Some(Repetition::Bytes(bytes)) => {
                let budget = Size::try_from_bytes(bytes.resolve_bytes(parent)?)?;
                while size < budget {
                    let pass = self.parse_pass(data, offset + size, endianness, context, &mut *deliver)?;
                    if pass == Size::ZERO {
                        return Err(no_progress());
                    }
                    size = size.try_add(pass)?;
                }
                if size > budget {
                    return Err(TranscodeError::Overrun {
                        budget,
                        reached: size,
                        unconsumed: 0,
                    });
                }
                Ok(size)
            }
        }
    }
}

fn no_progress() -> TranscodeError {
    TranscodeError::Configuration("repeat pass consumed no bits".to_string())
}

impl Struct for PositionalAggregate {
    fn pack(&self, source: Source<'_>, options: PackOptions<'_, '_>) -> Result<Packed, TranscodeError> {
        let endianness = self.transcoders.resolve_endianness(options.endianness);
        let encoded = self.transcoders.fetch_and_encode(source, options.context)?;
        let total = match &encoded {
            Value::List(items) => items.len(),
            other => {
                return Err(TranscodeError::TypeMismatch {
                    expected: "list",
                    found: other.type_name().to_string(),
                })
            }
        };
        let document = Context::new(encoded, options.context);
        let cursor = Cell::new(0usize);
        let mut fetch = || {
            let index = cursor.get();
            let value = document
                .at(index)
                .ok_or(TranscodeError::InsufficientData { consumed: index })?;
            cursor.set(index + 1);
            Ok(value)
        };
        let mut view = options.data_view;
        let mut fragments = Vec::new();
        let size = self.pack_loop(
            &mut fetch,
            &document,
            options.context,
            view.as_deref_mut(),
            options.offset,
            endianness,
            &mut fragments,
        )?;

        if let Some(Repetition::Bytes(_)) = &self.repetition {
            if cursor.get() < total {
                let unconsumed = total - cursor.get();
                // Size of one more pass, to report how far past the budget the source reaches.
                let mut scratch = Vec::new();
                let reached = self
                    .pack_pass(&mut fetch, &document, None, options.offset + size, endianness, &mut scratch)
                    .map(|extra| size + extra)
                    .unwrap_or(size);
                return Err(TranscodeError::Overrun {
                    budget: size,
                    reached,
                    unconsumed,
                });
            }
        }

        match view {
            Some(_) => Ok(Packed::in_place(size)),
            None => Ok(Packed {
                buffer: concat_fragments(&fragments, size)?,
                size,
            }),
        }
    }

    fn parse(
        &self,
        data: &[u8],
        options: ParseOptions<'_>,
        deliver: Option<Deliver<'_>>,
    ) -> Result<Parsed, TranscodeError> {
        let endianness = self.transcoders.resolve_endianness(options.endianness);
        let document = Context::positional(options.context);
        let size = {
            let mut push = |value: Value| document.push(value);
            self.parse_loop(data, options.offset, endianness, &document, options.context, &mut push)?
        };
        let decoded = document.into_document();
        let data = self
            .transcoders
            .decode_and_deliver(decoded, options.context, deliver)?;
        Ok(Parsed { data, size })
    }

    fn aggregate(&self) -> Option<Aggregate<'_>> {
        Some(Aggregate::Positional(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Primitive;

    fn uint(bits: usize) -> StructRef {
        Primitive::uint(bits, Transcoders::new()).unwrap().shared()
    }

    fn bits(width: usize) -> StructRef {
        Primitive::bits(width, Transcoders::new()).unwrap().shared()
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = NamedAggregate::new([("a", uint(8)), ("a", uint(16))], Transcoders::new());
        assert!(matches!(err, Err(TranscodeError::Configuration(_))));
    }

    #[test]
    fn test_repeat_needs_exactly_one_policy() {
        assert!(matches!(
            PositionalAggregate::repeat(RepeatOptions::default(), [uint(8)]),
            Err(TranscodeError::Configuration(_))
        ));
        let both = RepeatOptions {
            count: Some(Numeric::from(1)),
            bytes: Some(Numeric::from(1)),
            ..Default::default()
        };
        assert!(matches!(
            PositionalAggregate::repeat(both, [uint(8)]),
            Err(TranscodeError::Configuration(_))
        ));
    }

    #[test]
    fn test_size_is_sum_in_both_modes() {
        let agg = NamedAggregate::new([("a", bits(3)), ("b", uint(16)), ("c", bits(5))], Transcoders::new())
            .unwrap();
        let value = Value::map([("a", Value::Uint(5)), ("b", Value::Uint(0xBEEF)), ("c", Value::Uint(17))]);

        let standalone = agg.pack(Source::Value(value.clone()), PackOptions::default()).unwrap();
        assert_eq!(standalone.size, Size::from_bits(24));

        let mut shared = vec![0u8; 3];
        let in_place = agg
            .pack(Source::Value(value), PackOptions::into_view(&mut shared, Size::ZERO))
            .unwrap();
        assert_eq!(in_place.size, standalone.size);
        assert_eq!(shared, standalone.buffer);
    }

    #[test]
    fn test_zero_width_repeat_pass_rejected() {
        let agg = PositionalAggregate::repeat(
            RepeatOptions::bytes(2),
            [crate::field::Padding::pass().shared()],
        )
        .unwrap();
        let err = agg.parse(&[0, 0], ParseOptions::default(), None).unwrap_err();
        assert!(matches!(err, TranscodeError::Configuration(_)));
    }

    #[test]
    fn test_zero_width_counted_pass_rejected() {
        let agg = PositionalAggregate::repeat(
            RepeatOptions::count(3),
            [crate::field::Padding::pass().shared()],
        )
        .unwrap();
        let err = agg.parse(&[0], ParseOptions::default(), None).unwrap_err();
        assert!(matches!(err, TranscodeError::Configuration(_)));
        let err = agg.to_bytes(Value::List(vec![])).unwrap_err();
        assert!(matches!(err, TranscodeError::Configuration(_)));

        let none = PositionalAggregate::repeat(
            RepeatOptions::count(0),
            [crate::field::Padding::pass().shared()],
        )
        .unwrap();
        assert_eq!(none.from_bytes(&[]).unwrap(), Value::List(vec![]));
    }

    #[test]
    fn test_decode_hook_sees_plain_document() {
        let agg = PositionalAggregate::new(
            [uint(8), uint(8)],
            Transcoders::new().decode(|v, _| {
                let sum: u64 = v.as_list().unwrap_or(&[]).iter().filter_map(Value::as_u64).sum();
                Ok(Value::Uint(sum))
            }),
        );
        assert_eq!(agg.from_bytes(&[2, 3]).unwrap(), Value::Uint(5));
    }
}
