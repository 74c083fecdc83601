//! Context chain and embedding: upward lookups across aggregate levels, and flattening
//! embedded aggregates into the enclosing document.

use bitweave::{
    Embed, NamedAggregate, Numeric, Padding, PositionalAggregate, Primitive, RepeatOptions,
    Struct, StructRef, TranscodeError, Transcoders, Value,
};
use std::sync::{Arc, Mutex};

fn uint(bits: usize) -> StructRef {
    Primitive::uint(bits, Transcoders::new()).expect("uint").shared()
}

fn named(fields: Vec<(&str, StructRef)>) -> NamedAggregate {
    NamedAggregate::new(fields, Transcoders::new()).expect("named")
}

#[test]
fn test_grandparent_field_visible_two_levels_down() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let copy_tag = {
        let seen = Arc::clone(&seen);
        Padding::pass().decode(move |context| {
            let ctx = context.ok_or_else(|| TranscodeError::Configuration("no context".into()))?;
            let tag = ctx.lookup("tag").unwrap_or(Value::Null);
            seen.lock().map_err(|e| TranscodeError::Hook(e.to_string()))?.push(tag.clone());
            Ok(tag)
        })
    };
    let s = named(vec![
        ("tag", uint(8)),
        ("mid", named(vec![("leaf", named(vec![("copy", copy_tag.shared())]).shared())]).shared()),
    ]);

    let parsed = s.from_bytes(&[0x2A]).expect("parse");
    assert_eq!(*seen.lock().expect("lock"), vec![Value::Uint(0x2A)]);
    assert_eq!(
        parsed,
        Value::map([
            ("tag", Value::Uint(0x2A)),
            ("mid", Value::map([("leaf", Value::map([("copy", Value::Uint(0x2A))]))])),
        ])
    );
}

#[test]
fn test_count_from_grandparent() {
    let s = named(vec![
        ("n", uint(8)),
        (
            "body",
            named(vec![(
                "items",
                PositionalAggregate::repeat(RepeatOptions::count(Numeric::field("n")), [uint(8)])
                    .expect("repeat")
                    .shared(),
            )])
            .shared(),
        ),
    ]);
    let value = Value::map([
        ("n", Value::Uint(3)),
        ("body", Value::map([("items", Value::list([7u64, 8, 9].map(Value::Uint)))])),
    ]);
    let bytes = s.to_bytes(value.clone()).expect("pack");
    assert_eq!(bytes, vec![3, 7, 8, 9]);
    assert_eq!(s.from_bytes(&bytes).expect("parse"), value);
}

#[test]
fn test_derived_size_reads_nearest_first() {
    let size = Numeric::derived(|context| {
        let ctx = context.ok_or_else(|| TranscodeError::Configuration("no context".into()))?;
        let units = ctx.lookup("units").and_then(|v| v.as_u64()).unwrap_or(0);
        Ok(units as usize * 4)
    });
    let s = named(vec![
        ("units", uint(8)),
        (
            "inner",
            named(vec![
                ("units", Primitive::bits(4, Transcoders::new()).expect("bits").shared()),
                ("pad", Padding::new(size).shared()),
            ])
            .shared(),
        ),
    ]);
    // inner.units (1) shadows the outer units (9): 4 bits of padding, not 36
    let parsed = s.parse(&[9, 0x10], Default::default(), None).expect("parse");
    assert_eq!(parsed.size.bits(), 16);
}

#[test]
fn test_embed_flattens_into_parent() {
    let ab = named(vec![("a", uint(8)), ("b", uint(8))]).shared();
    let s = named(vec![("c", uint(8)), ("ab", Embed::new(ab).expect("embed").shared())]);

    let parsed = s.from_bytes(&[1, 2, 3]).expect("parse");
    let expected = Value::map([("c", Value::Uint(1)), ("a", Value::Uint(2)), ("b", Value::Uint(3))]);
    assert_eq!(parsed, expected);
    assert!(parsed.as_map().expect("map").get("ab").is_none());

    assert_eq!(s.to_bytes(expected).expect("pack"), vec![1, 2, 3]);
}

#[test]
fn test_embedded_fields_are_siblings() {
    let header = named(vec![("len", uint(8))]).shared();
    let s = named(vec![
        ("header", Embed::new(header).expect("embed").shared()),
        ("data", bitweave::ByteSpan::new(Numeric::field("len"), Transcoders::new()).shared()),
    ]);
    let value = Value::map([("len", Value::Uint(2)), ("data", Value::Bytes(vec![0xAB, 0xCD]))]);
    let bytes = s.to_bytes(value.clone()).expect("pack");
    assert_eq!(bytes, vec![2, 0xAB, 0xCD]);
    assert_eq!(s.from_bytes(&bytes).expect("parse"), value);
}

#[test]
fn test_embedded_repeat_counts_against_enclosing_parent() {
    let tail = PositionalAggregate::repeat(RepeatOptions::count(Numeric::field("n")), [uint(8)])
        .expect("repeat")
        .shared();
    let s = named(vec![
        ("n", uint(8)),
        (
            "list",
            PositionalAggregate::new([uint(8), Embed::new(tail).expect("embed").shared()], Transcoders::new())
                .shared(),
        ),
    ]);
    let value = Value::map([("n", Value::Uint(2)), ("list", Value::list([9u64, 5, 6].map(Value::Uint)))]);
    let bytes = s.to_bytes(value.clone()).expect("pack");
    assert_eq!(bytes, vec![2, 9, 5, 6]);
    assert_eq!(s.from_bytes(&bytes).expect("parse"), value);
}

#[test]
fn test_embed_shape_mismatch() {
    let positional = PositionalAggregate::new([uint(8)], Transcoders::new()).shared();
    let s = named(vec![("p", Embed::new(positional).expect("embed").shared())]);
    let err = s.to_bytes(Value::map([("p", Value::list([Value::Uint(1)]))])).unwrap_err();
    assert!(matches!(err.root(), TranscodeError::Configuration(_)));
}
