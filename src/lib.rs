//! # bitweave: declarative binary structure transcoding
//!
//! Describe a wire or file format as a tree of Structs, then pack an in-memory
//! [`Value`] document into bytes and parse bytes back into an equivalent document,
//! at bit-level precision where the format needs it.
//!
//! ## Building blocks
//!
//! - **Leaves**: [`Primitive`] (bit-fields, unsigned/signed integers, floats, UTF-8
//!   text), [`Padding`] (reserved bits), [`ByteSpan`] (verbatim bytes)
//! - **Aggregates**: [`NamedAggregate`] (keyed document), [`PositionalAggregate`]
//!   (list document), repeats via [`PositionalAggregate::repeat`]
//! - **Control**: [`Branch`] (tagged union), [`Embed`] (flatten an aggregate into the
//!   enclosing document)
//! - **Frames**: [`parse_frame`] / [`pack_frame`] for runs of records
//!
//! Sizes, offsets, counts and branch choices may depend on values already packed or
//! parsed: every aggregate exposes its in-progress document as a [`Context`] whose
//! lookups walk up through the enclosing aggregates.
//!
//! ## Example
//!
//! ```
//! use bitweave::{NamedAggregate, PositionalAggregate, Primitive, RepeatOptions, Numeric};
//! use bitweave::{Struct, Transcoders, Value};
//!
//! let item = Primitive::uint(8, Transcoders::new()).unwrap().shared();
//! let packet = NamedAggregate::new(
//!     [
//!         ("count", Primitive::uint(8, Transcoders::new()).unwrap().shared()),
//!         (
//!             "items",
//!             PositionalAggregate::repeat(RepeatOptions::count(Numeric::field("count")), [item])
//!                 .unwrap()
//!                 .shared(),
//!         ),
//!     ],
//!     Transcoders::new(),
//! )
//! .unwrap();
//!
//! let value = Value::map([
//!     ("count", Value::Uint(2)),
//!     ("items", Value::list([Value::Uint(7), Value::Uint(9)])),
//! ]);
//! let bytes = packet.to_bytes(value.clone()).unwrap();
//! assert_eq!(bytes, vec![2, 7, 9]);
//! assert_eq!(packet.from_bytes(&bytes).unwrap(), value);
//! ```
//!
//! Diagnostics go through `tracing`; the crate never installs a subscriber.

pub mod aggregate;
pub mod branch;
pub mod codec;
pub mod concat;
pub mod context;
pub mod dump;
pub mod embed;
pub mod error;
pub mod field;
pub mod frame;
pub mod options;
pub mod size;
pub mod structure;
pub mod value;

pub use aggregate::{NamedAggregate, PositionalAggregate, RepeatOptions, Repetition};
pub use branch::{Branch, Discriminant};
pub use codec::{Endianness, Kind};
pub use concat::concat_fragments;
pub use context::Context;
pub use dump::format_value;
pub use embed::Embed;
pub use error::TranscodeError;
pub use field::{ByteSpan, Padding, Primitive};
pub use frame::{pack_frame, parse_frame, FrameParseResult, ParsedRecord};
pub use options::{Deliver, Fetcher, Numeric, PackOptions, ParseOptions, Source, Transcoders};
pub use size::Size;
pub use structure::{Aggregate, Packed, Parsed, Struct, StructRef};
pub use value::Value;
