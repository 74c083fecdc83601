//! Leaf Structs: fixed-width primitives, padding and verbatim byte spans.

use crate::codec::{self, Kind};
use crate::context::Context;
use crate::error::TranscodeError;
use crate::options::{Deliver, Numeric, PackOptions, ParseOptions, Source, Transcoders};
use crate::size::Size;
use crate::structure::{Packed, Parsed, Struct};
use crate::value::Value;
use std::sync::Arc;

/// Fixed-width numeric or text field backed by the primitive codec.
#[derive(Debug, Clone)]
pub struct Primitive {
    kind: Kind,
    bits: usize,
    transcoders: Transcoders,
}

impl Primitive {
    /// Fails with `Configuration` when `bits` is not a permitted width for `kind`.
    pub fn new(kind: Kind, bits: usize, transcoders: Transcoders) -> Result<Self, TranscodeError> {
        if !codec::is_permitted(kind, bits) {
            return Err(TranscodeError::Configuration(format!(
                "Invalid size: {} bits for {:?}",
                bits, kind
            )));
        }
        Ok(Primitive {
            kind,
            bits,
            transcoders,
        })
    }

    pub fn bits(bits: usize, transcoders: Transcoders) -> Result<Self, TranscodeError> {
        Self::new(Kind::Bits, bits, transcoders)
    }

    pub fn uint(bits: usize, transcoders: Transcoders) -> Result<Self, TranscodeError> {
        Self::new(Kind::Uint, bits, transcoders)
    }

    pub fn int(bits: usize, transcoders: Transcoders) -> Result<Self, TranscodeError> {
        Self::new(Kind::Int, bits, transcoders)
    }

    pub fn float(bits: usize, transcoders: Transcoders) -> Result<Self, TranscodeError> {
        Self::new(Kind::Float, bits, transcoders)
    }

    pub fn utf8(bits: usize, transcoders: Transcoders) -> Result<Self, TranscodeError> {
        Self::new(Kind::Utf8, bits, transcoders)
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn width(&self) -> Size {
        Size::from_bits(self.bits)
    }
}

impl Struct for Primitive {
    fn pack(&self, source: Source<'_>, options: PackOptions<'_, '_>) -> Result<Packed, TranscodeError> {
        let endianness = self
            .transcoders
            .resolve_endianness(options.endianness)
            .unwrap_or_default();
        let encoded = self.transcoders.fetch_and_encode(source, options.context)?;
        match options.data_view {
            Some(view) => {
                let written =
                    codec::serialize(self.kind, &encoded, self.bits, view, options.offset, endianness)?;
                Ok(Packed::in_place(Size::from_bits(written)))
            }
            None => {
                let mut buffer = vec![0u8; self.width().byte_len()];
                let written =
                    codec::serialize(self.kind, &encoded, self.bits, &mut buffer, Size::ZERO, endianness)?;
                Ok(Packed {
                    buffer,
                    size: Size::from_bits(written),
                })
            }
        }
    }

    fn parse(
        &self,
        data: &[u8],
        options: ParseOptions<'_>,
        deliver: Option<Deliver<'_>>,
    ) -> Result<Parsed, TranscodeError> {
        let endianness = self
            .transcoders
            .resolve_endianness(options.endianness)
            .unwrap_or_default();
        let encoded = codec::deserialize(self.kind, self.bits, data, options.offset, endianness)?;
        let data = self
            .transcoders
            .decode_and_deliver(encoded, options.context, deliver)?;
        Ok(Parsed {
            data,
            size: self.width(),
        })
    }
}

pub type FillFn = Arc<dyn Fn(Option<&Context<'_>>) -> Result<u64, TranscodeError> + Send + Sync>;
pub type ConstantFn =
    Arc<dyn Fn(Option<&Context<'_>>) -> Result<Value, TranscodeError> + Send + Sync>;

/// Reserved bits. Round trips do not preserve their content.
#[derive(Clone)]
pub struct Padding {
    size: Numeric,
    fill: Option<FillFn>,
    constant: Option<ConstantFn>,
}

impl Padding {
    /// Plain numbers are bits.
    pub fn new(bits: impl Into<Numeric>) -> Self {
        Padding {
            size: bits.into(),
            fill: None,
            constant: None,
        }
    }

    /// Zero-width no-op.
    pub fn pass() -> Self {
        Padding::new(0)
    }

    /// Fill generator used while packing. The value is written low byte first across
    /// whole bytes, then masked to the remaining bits.
    pub fn encode<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&Context<'_>>) -> Result<u64, TranscodeError> + Send + Sync + 'static,
    {
        self.fill = Some(Arc::new(f));
        self
    }

    /// Constant generator used while parsing; the underlying bits are not read.
    pub fn decode<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&Context<'_>>) -> Result<Value, TranscodeError> + Send + Sync + 'static,
    {
        self.constant = Some(Arc::new(f));
        self
    }

    fn write_fill(
        &self,
        region: &mut [u8],
        offset: Size,
        size: Size,
        context: Option<&Context<'_>>,
    ) -> Result<(), TranscodeError> {
        let Some(fill) = &self.fill else {
            return Ok(());
        };
        let mut fill = fill(context)?;
        let start = offset.bits();
        for i in 0..size.whole_bytes() {
            codec::write_bits(region, start + i * 8, 8, fill & 0xFF)?;
            fill >>= 8;
        }
        let remainder = size.remainder_bits();
        if remainder > 0 {
            let tail = start + size.whole_bytes() * 8;
            codec::write_bits(region, tail, remainder, fill & ((1u64 << remainder) - 1))?;
        }
        Ok(())
    }
}

impl Struct for Padding {
    fn pack(&self, _source: Source<'_>, options: PackOptions<'_, '_>) -> Result<Packed, TranscodeError> {
        let size = self.size.resolve_bits(options.context)?;
        match options.data_view {
            Some(view) => {
                codec::ensure_available(view.len(), options.offset.bits(), size.bits())?;
                self.write_fill(view, options.offset, size, options.context)?;
                Ok(Packed::in_place(size))
            }
            None => {
                let mut buffer = vec![0u8; size.byte_len()];
                self.write_fill(&mut buffer, Size::ZERO, size, options.context)?;
                Ok(Packed { buffer, size })
            }
        }
    }

    fn parse(
        &self,
        data: &[u8],
        options: ParseOptions<'_>,
        deliver: Option<Deliver<'_>>,
    ) -> Result<Parsed, TranscodeError> {
        let size = self.size.resolve_bits(options.context)?;
        codec::ensure_available(data.len(), options.offset.bits(), size.bits())?;
        let data = match &self.constant {
            Some(constant) => {
                let value = constant(options.context)?;
                if let Some(deliver) = deliver {
                    deliver(value.clone())?;
                }
                value
            }
            None => Value::Null,
        };
        Ok(Parsed { data, size })
    }
}

/// Verbatim copy of a run of bytes. Byte-aligned only.
#[derive(Debug, Clone)]
pub struct ByteSpan {
    length: Numeric,
    transcoders: Transcoders,
}

impl ByteSpan {
    /// Plain numbers are bytes.
    pub fn new(length: impl Into<Numeric>, transcoders: Transcoders) -> Self {
        ByteSpan {
            length: length.into(),
            transcoders,
        }
    }
}

impl Struct for ByteSpan {
    fn pack(&self, source: Source<'_>, options: PackOptions<'_, '_>) -> Result<Packed, TranscodeError> {
        let length = self.length.resolve_bytes(options.context)?;
        let bytes = match self.transcoders.fetch_and_encode(source, options.context)? {
            Value::Bytes(b) => b,
            other => {
                return Err(TranscodeError::TypeMismatch {
                    expected: "bytes",
                    found: other.type_name().to_string(),
                })
            }
        };
        if bytes.len() != length {
            return Err(TranscodeError::LengthMismatch {
                expected: length,
                actual: bytes.len(),
            });
        }
        if !options.offset.is_byte_aligned() {
            return Err(TranscodeError::Misaligned {
                bit_offset: options.offset.bits(),
            });
        }
        let size = Size::try_from_bytes(length)?;
        match options.data_view {
            None => Ok(Packed {
                buffer: bytes,
                size,
            }),
            Some(view) => {
                codec::ensure_available(view.len(), options.offset.bits(), size.bits())?;
                let at = options.offset.whole_bytes();
                view[at..at + length].copy_from_slice(&bytes);
                Ok(Packed::in_place(size))
            }
        }
    }

    fn parse(
        &self,
        data: &[u8],
        options: ParseOptions<'_>,
        deliver: Option<Deliver<'_>>,
    ) -> Result<Parsed, TranscodeError> {
        let length = self.length.resolve_bytes(options.context)?;
        if !options.offset.is_byte_aligned() {
            return Err(TranscodeError::Misaligned {
                bit_offset: options.offset.bits(),
            });
        }
        let size = Size::try_from_bytes(length)?;
        codec::ensure_available(data.len(), options.offset.bits(), size.bits())?;
        let at = options.offset.whole_bytes();
        let encoded = Value::Bytes(data[at..at + length].to_vec());
        let data = self
            .transcoders
            .decode_and_deliver(encoded, options.context, deliver)?;
        Ok(Parsed { data, size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Endianness;

    #[test]
    fn test_invalid_width_is_configuration_error() {
        assert!(matches!(
            Primitive::uint(12, Transcoders::new()),
            Err(TranscodeError::Configuration(_))
        ));
        assert!(matches!(
            Primitive::float(16, Transcoders::new()),
            Err(TranscodeError::Configuration(_))
        ));
        assert!(Primitive::bits(12, Transcoders::new()).is_ok());
    }

    #[test]
    fn test_primitive_hooks_and_deliver() {
        let field = Primitive::uint(
            8,
            Transcoders::new()
                .encode(|v, _| Ok(Value::Uint(v.as_u64().unwrap_or(0) * 2)))
                .decode(|v, _| Ok(Value::Uint(v.as_u64().unwrap_or(0) / 2))),
        )
        .unwrap();
        assert_eq!(field.to_bytes(Value::Uint(21)).unwrap(), vec![42]);

        let mut seen = Vec::new();
        let mut deliver = |v: Value| -> Result<(), TranscodeError> {
            seen.push(v);
            Ok(())
        };
        let parsed = field
            .parse(&[42], ParseOptions::default(), Some(&mut deliver))
            .unwrap();
        assert_eq!(parsed.data, Value::Uint(21));
        assert_eq!(parsed.size, Size::from_bytes(1));
        assert_eq!(seen, vec![Value::Uint(21)]);
    }

    #[test]
    fn test_primitive_endianness_override() {
        let field = Primitive::uint(16, Transcoders::new().little_endian()).unwrap();
        assert_eq!(field.to_bytes(Value::Uint(0x0102)).unwrap(), vec![0x02, 0x01]);
        let mut out = [0u8; 2];
        field
            .pack(
                Source::Value(Value::Uint(0x0102)),
                PackOptions::into_view(&mut out, Size::ZERO).with_endianness(Endianness::Big),
            )
            .unwrap();
        assert_eq!(out, [0x01, 0x02]);
    }

    #[test]
    fn test_padding_fill_and_constant() {
        let padding = Padding::new(12)
            .encode(|_| Ok(0xABC))
            .decode(|_| Ok(Value::from("pad")));
        let packed = padding.pack(Source::Value(Value::Null), PackOptions::default()).unwrap();
        assert_eq!(packed.size, Size::from_bits(12));
        // low byte first, then the low nibble of what is left
        assert_eq!(packed.buffer, vec![0xBC, 0xA0]);

        let parsed = padding.parse(&[0, 0], ParseOptions::default(), None).unwrap();
        assert_eq!(parsed.data, Value::from("pad"));
        assert_eq!(parsed.size, Size::from_bits(12));
    }

    #[test]
    fn test_padding_remainder_stays_in_field_bits() {
        let padding = Padding::new(12).encode(|_| Ok(0xABC));
        let mut out = vec![0u8; 3];
        padding
            .pack(Source::Value(Value::Null), PackOptions::into_view(&mut out, Size::from_bits(4)))
            .unwrap();
        // bits 4..12 hold 0xBC, bits 12..16 hold 0xA
        assert_eq!(out, vec![0x0B, 0xCA, 0x00]);
    }

    #[test]
    fn test_padding_without_hooks_leaves_bytes() {
        let padding = Padding::new(Numeric::bytes(1));
        let mut out = [0x5Au8; 2];
        padding
            .pack(Source::Value(Value::Null), PackOptions::into_view(&mut out, Size::ZERO))
            .unwrap();
        assert_eq!(out, [0x5A, 0x5A]);
        let parsed = padding.parse(&out, ParseOptions::default(), None).unwrap();
        assert_eq!(parsed.data, Value::Null);
    }

    #[test]
    fn test_byte_span_length_mismatch() {
        let span = ByteSpan::new(3, Transcoders::new());
        let err = span.to_bytes(Value::Bytes(vec![1, 2])).unwrap_err();
        assert!(matches!(err, TranscodeError::LengthMismatch { expected: 3, actual: 2 }));
        assert_eq!(span.to_bytes(Value::Bytes(vec![1, 2, 3])).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_byte_span_misaligned_parse() {
        let span = ByteSpan::new(1, Transcoders::new());
        let err = span
            .parse(&[0, 0], ParseOptions::at(Size::from_bits(4)), None)
            .unwrap_err();
        assert!(matches!(err, TranscodeError::Misaligned { bit_offset: 4 }));
    }
}
