//! Parse fuzz target: feed arbitrary bytes to a frame parse over a record that uses
//! every component: bit-fields, a 64-bit length driving a byte span, a byte-budget
//! repeat and a counted repeat of zero-width children, a branch and an embed. Parsing must not panic; it returns Ok or a TranscodeError.
//! Build with: cargo fuzz run parse_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use bitweave::{
    parse_frame, Branch, ByteSpan, Embed, NamedAggregate, Numeric, Padding, PositionalAggregate, Primitive,
    RepeatOptions, Struct, StructRef, Transcoders,
};
#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fn record() -> Option<NamedAggregate> {
    let uint = |bits| Primitive::uint(bits, Transcoders::new()).ok().map(|p| p.shared());
    let bits = |width| Primitive::bits(width, Transcoders::new()).ok().map(|p| p.shared());
    let header: StructRef = NamedAggregate::new(
        [("kind", bits(4)?), ("flags", bits(4)?), ("len", uint(64)?)],
        Transcoders::new(),
    )
    .ok()?
    .shared();
    let body = Branch::on_field(
        "kind",
        [
            (0, ByteSpan::new(Numeric::field("len"), Transcoders::new()).shared()),
            (
                1,
                PositionalAggregate::repeat(RepeatOptions::bytes(Numeric::field("len")), [uint(16)?])
                    .ok()?
                    .shared(),
            ),
            (2, Padding::new(Numeric::derived(|_| Ok(8))).shared()),
            (
                3,
                PositionalAggregate::repeat(
                    RepeatOptions::count(Numeric::field("len")),
                    [Padding::pass().decode(|_| Ok(bitweave::Value::Null)).shared()],
                )
                .ok()?
                .shared(),
            ),
        ],
    )
    .default_choice(uint(8)?);
    NamedAggregate::new(
        [("header", Embed::new(header).ok()?.shared()), ("body", body.shared())],
        Transcoders::new(),
    )
    .ok()
}

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    if let Some(record) = record() {
        let _ = parse_frame(&record, data);
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run parse_fuzz");
}
