//! Per-call options, per-field transcoders and size specifiers.

use crate::codec::Endianness;
use crate::context::Context;
use crate::error::TranscodeError;
use crate::size::Size;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Options threaded through a pack call.
#[derive(Default)]
pub struct PackOptions<'v, 'c> {
    /// Shared output region. `None` makes the Struct return a standalone fragment.
    pub data_view: Option<&'v mut [u8]>,
    /// Absolute bit position of the field. Standalone fragments still start at bit 0
    /// of their own buffer; the offset then only decides byte alignment.
    pub offset: Size,
    /// Overrides the field's own endianness when set.
    pub endianness: Option<Endianness>,
    pub context: Option<&'c Context<'c>>,
}

impl<'v, 'c> PackOptions<'v, 'c> {
    /// Packs into `view` starting at `offset`.
    pub fn into_view(view: &'v mut [u8], offset: Size) -> Self {
        PackOptions {
            data_view: Some(view),
            offset,
            ..Default::default()
        }
    }

    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = Some(endianness);
        self
    }
}

/// Options threaded through a parse call.
#[derive(Default, Clone, Copy)]
pub struct ParseOptions<'c> {
    pub offset: Size,
    pub endianness: Option<Endianness>,
    pub context: Option<&'c Context<'c>>,
}

impl<'c> ParseOptions<'c> {
    pub fn at(offset: Size) -> Self {
        ParseOptions {
            offset,
            ..Default::default()
        }
    }

    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = Some(endianness);
        self
    }
}

/// Converts a caller value into its encoded form while packing.
pub type Encoder =
    Arc<dyn Fn(Value, Option<&Context<'_>>) -> Result<Value, TranscodeError> + Send + Sync>;
/// Converts an encoded value into the caller's form while parsing.
pub type Decoder =
    Arc<dyn Fn(Value, Option<&Context<'_>>) -> Result<Value, TranscodeError> + Send + Sync>;

/// Optional encode/decode hooks and a default endianness for one Struct.
#[derive(Clone, Default)]
pub struct Transcoders {
    pub(crate) encode: Option<Encoder>,
    pub(crate) decode: Option<Decoder>,
    pub(crate) endianness: Option<Endianness>,
}

impl Transcoders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode<F>(mut self, f: F) -> Self
    where
        F: Fn(Value, Option<&Context<'_>>) -> Result<Value, TranscodeError> + Send + Sync + 'static,
    {
        self.encode = Some(Arc::new(f));
        self
    }

    pub fn decode<F>(mut self, f: F) -> Self
    where
        F: Fn(Value, Option<&Context<'_>>) -> Result<Value, TranscodeError> + Send + Sync + 'static,
    {
        self.decode = Some(Arc::new(f));
        self
    }

    pub fn endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = Some(endianness);
        self
    }

    pub fn little_endian(self) -> Self {
        self.endianness(Endianness::Little)
    }

    pub fn big_endian(self) -> Self {
        self.endianness(Endianness::Big)
    }

    /// Identity hooks that log every value passing through at debug level.
    pub fn inspect() -> Self {
        Transcoders::new()
            .encode(|value, context| {
                tracing::debug!(?value, has_context = context.is_some(), "inspect encode");
                Ok(value)
            })
            .decode(|value, context| {
                tracing::debug!(?value, has_context = context.is_some(), "inspect decode");
                Ok(value)
            })
    }

    /// Resolves the pack source (pulling from the fetcher if needed) and applies `encode`.
    pub(crate) fn fetch_and_encode(
        &self,
        source: Source<'_>,
        context: Option<&Context<'_>>,
    ) -> Result<Value, TranscodeError> {
        let decoded = source.resolve()?;
        match &self.encode {
            Some(encode) => encode(decoded, context),
            None => Ok(decoded),
        }
    }

    /// Applies `decode` to a parsed value and hands the result to `deliver`.
    pub(crate) fn decode_and_deliver(
        &self,
        encoded: Value,
        context: Option<&Context<'_>>,
        deliver: Option<Deliver<'_>>,
    ) -> Result<Value, TranscodeError> {
        let decoded = match &self.decode {
            Some(decode) => decode(encoded, context)?,
            None => encoded,
        };
        if let Some(deliver) = deliver {
            deliver(decoded.clone())?;
        }
        Ok(decoded)
    }

    /// Effective endianness: the caller's choice wins over this field's default.
    pub(crate) fn resolve_endianness(&self, inherited: Option<Endianness>) -> Option<Endianness> {
        inherited.or(self.endianness)
    }
}

impl fmt::Debug for Transcoders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transcoders")
            .field("encode", &self.encode.is_some())
            .field("decode", &self.decode.is_some())
            .field("endianness", &self.endianness)
            .finish()
    }
}

/// Pull function supplying one value on demand while packing.
pub type Fetcher<'f> = &'f mut dyn FnMut() -> Result<Value, TranscodeError>;
/// Push function receiving one decoded value while parsing.
pub type Deliver<'d> = &'d mut dyn FnMut(Value) -> Result<(), TranscodeError>;

/// What a Struct packs: a value in hand, or a fetcher to pull it from.
pub enum Source<'f> {
    Value(Value),
    Fetch(Fetcher<'f>),
}

impl Source<'_> {
    pub fn resolve(self) -> Result<Value, TranscodeError> {
        match self {
            Source::Value(v) => Ok(v),
            Source::Fetch(fetch) => fetch(),
        }
    }
}

impl From<Value> for Source<'_> {
    fn from(v: Value) -> Self {
        Source::Value(v)
    }
}

pub type SizeFn =
    Arc<dyn Fn(Option<&Context<'_>>) -> Result<usize, TranscodeError> + Send + Sync>;

/// A size that is fixed, given as bits + bytes, or computed from the context.
///
/// Plain numbers are read in the unit of the Struct using them: bits for padding,
/// bytes for byte spans and repeat budgets, elements for repeat counts.
#[derive(Clone)]
pub enum Numeric {
    Fixed(usize),
    Span { bits: usize, bytes: usize },
    Derived(SizeFn),
}

impl Numeric {
    pub fn bits(bits: usize) -> Self {
        Numeric::Span { bits, bytes: 0 }
    }

    pub fn bytes(bytes: usize) -> Self {
        Numeric::Span { bits: 0, bytes }
    }

    pub fn derived<F>(f: F) -> Self
    where
        F: Fn(Option<&Context<'_>>) -> Result<usize, TranscodeError> + Send + Sync + 'static,
    {
        Numeric::Derived(Arc::new(f))
    }

    /// Reads a sibling or ancestor field (nearest first) as the size.
    pub fn field(name: &str) -> Self {
        let name = name.to_string();
        Numeric::derived(move |context| {
            let ctx = crate::context::active(context, "a field-derived size")?;
            let value = ctx.lookup(&name).ok_or_else(|| TranscodeError::MissingField {
                field: name.clone(),
                available: ctx.keys(),
            })?;
            let n = value.as_u64().ok_or_else(|| TranscodeError::TypeMismatch {
                expected: "uint",
                found: value.type_name().to_string(),
            })?;
            usize::try_from(n).map_err(|_| TranscodeError::ValueOutOfRange {
                value: n.to_string(),
                bits: usize::BITS as usize,
            })
        })
    }

    /// Resolves as a bit count.
    pub fn resolve_bits(&self, context: Option<&Context<'_>>) -> Result<Size, TranscodeError> {
        match self {
            Numeric::Fixed(n) => Ok(Size::from_bits(*n)),
            Numeric::Span { bits, bytes } => Size::try_from_bytes(*bytes)?.try_add(Size::from_bits(*bits)),
            Numeric::Derived(f) => f(context).map(Size::from_bits),
        }
    }

    /// Resolves as a whole number of bytes.
    pub fn resolve_bytes(&self, context: Option<&Context<'_>>) -> Result<usize, TranscodeError> {
        match self {
            Numeric::Fixed(n) => Ok(*n),
            Numeric::Span { bits, bytes } if bits % 8 == 0 => Ok(bits / 8 + bytes),
            Numeric::Span { .. } => Err(TranscodeError::Configuration(
                "byte size given with a fractional number of bytes".to_string(),
            )),
            Numeric::Derived(f) => f(context),
        }
    }

    /// Resolves as an element count.
    pub fn resolve_count(&self, context: Option<&Context<'_>>) -> Result<usize, TranscodeError> {
        match self {
            Numeric::Fixed(n) => Ok(*n),
            Numeric::Span { .. } => Err(TranscodeError::Configuration(
                "a repeat count cannot be a bit/byte span".to_string(),
            )),
            Numeric::Derived(f) => f(context),
        }
    }
}

impl From<usize> for Numeric {
    fn from(n: usize) -> Self {
        Numeric::Fixed(n)
    }
}

impl fmt::Debug for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Numeric::Fixed(n) => write!(f, "Fixed({})", n),
            Numeric::Span { bits, bytes } => write!(f, "Span {{ bits: {}, bytes: {} }}", bits, bytes),
            Numeric::Derived(_) => f.write_str("Derived(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_units() {
        assert_eq!(Numeric::from(12).resolve_bits(None).unwrap(), Size::from_bits(12));
        assert_eq!(
            Numeric::Span { bits: 4, bytes: 1 }.resolve_bits(None).unwrap(),
            Size::from_bits(12)
        );
        assert_eq!(Numeric::Span { bits: 16, bytes: 1 }.resolve_bytes(None).unwrap(), 3);
        assert!(matches!(
            Numeric::bits(4).resolve_bytes(None),
            Err(TranscodeError::Configuration(_))
        ));
        assert!(matches!(
            Numeric::bytes(2).resolve_count(None),
            Err(TranscodeError::Configuration(_))
        ));
    }

    #[test]
    fn test_field_numeric_reads_context() {
        let root = Context::new(Value::map([("len", Value::Uint(4))]), None);
        let child = Context::new(Value::List(vec![]), Some(&root));
        assert_eq!(Numeric::field("len").resolve_bytes(Some(&child)).unwrap(), 4);
        assert!(matches!(
            Numeric::field("len").resolve_bytes(None),
            Err(TranscodeError::Configuration(_))
        ));
    }

    #[test]
    fn test_caller_endianness_wins() {
        let t = Transcoders::new().little_endian();
        assert_eq!(t.resolve_endianness(None), Some(Endianness::Little));
        assert_eq!(t.resolve_endianness(Some(Endianness::Big)), Some(Endianness::Big));
    }
}
