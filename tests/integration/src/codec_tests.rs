//! Codec Tests - NDR shapes across module boundaries
//!
//! These tests combine the codec pieces the way a stub layer does:
//! - Conformant structures with embedded pointers and hoisted sizes
//! - Full pointers shared between fields and across nesting levels
//! - Unions with pointer arms and unknown discriminants
//! - Hostile declared lengths
//! - Both byte orders

mod common;

use bytes::Bytes;
use common::*;
use midl_ndr::{
    from_bytes, from_bytes_exact, to_bytes, ConformantArray, ConformantVaryingArray, FixedArray,
    FullPtr, NdrContext, NdrDecode, NdrEncode, NdrError, NdrReader, NdrUnion, NdrWString,
    NdrWriter, RefPtr, UnionArm, UniquePtr, FIRST_REFERENT_ID, REFERENT_ID_STEP,
};

fn contexts() -> [NdrContext; 2] {
    [NdrContext::new(), NdrContext::big_endian()]
}

fn sample() -> Sample {
    let unit = FullPtr::new(Unit::new("m/s", -3));
    Sample::new("wind", unit, vec![12, -7, 30])
}

fn read_u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

/// Test: Conformant array followed by another field
/// The cursor ends right after the elements; the next field aligns itself.
#[test]
fn test_conformant_array_then_field() {
    init_logging();

    for ctx in contexts() {
        let values = [1u16, 2, 3];
        let mut w = NdrWriter::new(ctx);
        w.write_conformant_array(3, &values).unwrap();
        w.write_u32(0xCAFE_F00D);
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), 4 + 6 + 2 + 4);
        assert_eq!(&bytes[10..12], &[0, 0]);

        let mut r = NdrReader::new(ctx, &bytes);
        let decoded: Vec<u16> = r.read_conformant_array().unwrap();
        assert_eq!(decoded, vec![1, 2, 3]);
        assert_eq!(r.position(), 10);
        assert_eq!(r.read_u32().unwrap(), 0xCAFE_F00D);
        assert_eq!(r.remaining(), 0);
    }
}

/// Test: Declared count carried separately from the array
#[test]
fn test_conformant_u32_array_with_separate_count() {
    let values = ConformantArray::new(vec![1u32, 2, 3]);
    let bytes = to_bytes(NdrContext::new(), &values).unwrap();
    assert_eq!(read_u32_at(&bytes, 0), 3);
    assert_eq!(bytes.len(), 16);

    let mut r = NdrReader::new(NdrContext::new(), &bytes);
    let count = r.read_size().unwrap();
    assert_eq!(count, 3);
    let elements: Vec<u32> = r.read_array_elements(count).unwrap();
    assert_eq!(elements, vec![1, 2, 3]);
    assert_eq!(r.position(), 16);
}

/// Test: Null unique pointer is an id of zero and nothing else
#[test]
fn test_null_unique_pointer() {
    let absent: UniquePtr<Unit> = UniquePtr::null();
    let bytes = to_bytes(NdrContext::new(), &absent).unwrap();
    assert_eq!(&bytes[..], &[0, 0, 0, 0]);

    let decoded: UniquePtr<Unit> = from_bytes_exact(NdrContext::new(), &bytes).unwrap();
    assert!(decoded.is_null());
    assert_ne!(decoded, UniquePtr::new(Unit::default()));

    let mut unlabelled = sample();
    unlabelled.label = UniquePtr::null();
    let with_label = to_bytes(NdrContext::new(), &sample()).unwrap();
    let without_label = to_bytes(NdrContext::new(), &unlabelled).unwrap();
    assert_eq!(read_u32_at(&without_label, 8), 0);
    // "wind" + terminator: 12 bytes of header and 10 of characters, padded
    assert_eq!(with_label.len() - without_label.len(), 24);

    let decoded: Sample = from_bytes(NdrContext::new(), &without_label).unwrap();
    assert!(decoded.label.is_null());
    assert_eq!(decoded, unlabelled);
}

/// Test: Conformant structure layout
/// max_count is hoisted ahead of the structure, pointers are deferred past
/// the array and the shared unit is written once.
#[test]
fn test_conformant_struct_layout() {
    let bytes = to_bytes(NdrContext::new(), &sample()).unwrap();

    assert_eq!(read_u32_at(&bytes, 0), 3); // hoisted max_count
    assert_eq!(read_u32_at(&bytes, 4), 3); // count
    assert_eq!(read_u32_at(&bytes, 8), FIRST_REFERENT_ID);
    let unit_id = FIRST_REFERENT_ID + REFERENT_ID_STEP;
    assert_eq!(read_u32_at(&bytes, 12), unit_id);
    assert_eq!(read_u32_at(&bytes, 16), unit_id);
    assert_eq!(read_u32_at(&bytes, 20) as i32, 12);
    assert_eq!(read_u32_at(&bytes, 28) as i32, 30);

    // label string header follows the fixed part
    assert_eq!(read_u32_at(&bytes, 32), 5);
    assert_eq!(read_u32_at(&bytes, 36), 0);
    assert_eq!(read_u32_at(&bytes, 40), 5);

    let symbol_units: Vec<u16> = "m/s".encode_utf16().collect();
    let occurrences = bytes
        .windows(6)
        .filter(|window| {
            window
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .eq(symbol_units.iter().copied())
        })
        .count();
    assert_eq!(occurrences, 1);
}

/// Test: Round-trip in both byte orders
#[test]
fn test_round_trip_both_byte_orders() {
    let value = sample();
    for ctx in contexts() {
        let bytes = to_bytes(ctx, &value).unwrap();
        let decoded: Sample = from_bytes_exact(ctx, &bytes).unwrap();
        assert_eq!(decoded, value);
    }

    let le = to_bytes(NdrContext::new(), &value).unwrap();
    let be = to_bytes(NdrContext::big_endian(), &value).unwrap();
    assert_eq!(le.len(), be.len());
    assert_ne!(le, be);
}

/// Test: Aliasing survives a round-trip as identity, not just equality
#[test]
fn test_aliasing_preserved_as_identity() {
    for ctx in contexts() {
        let bytes = to_bytes(ctx, &sample()).unwrap();
        let decoded: Sample = from_bytes(ctx, &bytes).unwrap();
        assert!(decoded.unit.ptr_eq(&decoded.display_unit));
        assert_eq!(decoded.unit.get().map(|u| u.symbol.as_str()), Some("m/s"));
    }

    // equal content behind distinct instances stays distinct
    let mut split = sample();
    split.display_unit = FullPtr::new(Unit::new("m/s", -3));
    let bytes = to_bytes(NdrContext::new(), &split).unwrap();
    assert_ne!(read_u32_at(&bytes, 12), read_u32_at(&bytes, 16));
    let decoded: Sample = from_bytes(NdrContext::new(), &bytes).unwrap();
    assert!(!decoded.unit.ptr_eq(&decoded.display_unit));
    assert_eq!(decoded.unit, decoded.display_unit);
}

/// Test: Aliasing across separately encoded values sharing one writer
#[test]
fn test_aliasing_across_top_level_values() {
    let unit = FullPtr::new(Unit::new("kg", 0));
    let first = Sample::new("a", unit.clone(), vec![1]);
    let second = Sample::new("b", unit, vec![2, 3]);

    let mut w = NdrWriter::new(NdrContext::new());
    w.write_data(&first).unwrap();
    w.write_deferred().unwrap();
    w.write_data(&second).unwrap();
    w.write_deferred().unwrap();
    let bytes = w.into_bytes();

    let mut r = NdrReader::new(NdrContext::new(), &bytes);
    let a: Sample = r.read_data().unwrap();
    r.read_deferred().unwrap();
    let b: Sample = r.read_data().unwrap();
    r.read_deferred().unwrap();
    assert_eq!(r.remaining(), 0);

    assert!(a.unit.ptr_eq(&b.unit));
    assert!(b.unit.ptr_eq(&b.display_unit));
    assert_eq!(b.values, vec![2, 3]);
}

/// Test: Counter larger than the data pads with default elements
#[test]
fn test_counter_pads_struct_array() {
    let mut short = sample();
    short.count = 5;
    let bytes = to_bytes(NdrContext::new(), &short).unwrap();
    assert_eq!(read_u32_at(&bytes, 0), 5);

    let decoded: Sample = from_bytes(NdrContext::new(), &bytes).unwrap();
    assert_eq!(decoded.values, vec![12, -7, 30, 0, 0]);

    // and a smaller one truncates
    let mut long = sample();
    long.count = 1;
    let decoded: Sample =
        from_bytes(NdrContext::new(), &to_bytes(NdrContext::new(), &long).unwrap()).unwrap();
    assert_eq!(decoded.values, vec![12]);
}

/// Test: Alignment and zero padding
#[test]
fn test_alignment_invariant() {
    let unit = Unit::new("Pa", 2);
    let mut w = NdrWriter::new(NdrContext::new());
    w.write_u8(0xFF);
    w.write_u64(u64::MAX);
    w.write_u8(0xFF);
    w.write_data(&unit).unwrap();
    assert_eq!(w.position() % 4, 0);
    w.write_u8(0xFF);
    w.write_f64(1.5);
    let bytes = w.into_bytes();

    assert!(bytes[1..8].iter().all(|&b| b == 0));
    assert!(bytes[17..20].iter().all(|&b| b == 0));
    assert_eq!(bytes.len() % 8, 0);

    let mut r = NdrReader::new(NdrContext::new(), &bytes);
    assert_eq!(r.read_u8().unwrap(), 0xFF);
    assert_eq!(r.read_u64().unwrap(), u64::MAX);
    assert_eq!(r.read_u8().unwrap(), 0xFF);
    assert_eq!(r.read_data::<Unit>().unwrap(), unit);
    assert_eq!(r.read_u8().unwrap(), 0xFF);
    assert_eq!(r.read_f64().unwrap(), 1.5);
}

/// Test: Hostile lengths fail before anything is allocated for them
#[test]
fn test_bounded_allocation() {
    init_logging();

    // conformant array of hypers claiming a quarter billion elements
    let mut w = NdrWriter::new(NdrContext::new());
    w.write_size(0x1000_0000).unwrap();
    w.write_u64(7);
    let bytes = w.into_bytes();
    let err = from_bytes::<ConformantArray<u64>>(NdrContext::new(), &bytes).unwrap_err();
    assert!(is_buffer_overflow(&err), "unexpected error: {:?}", err);

    // string with a huge actual_count
    let mut w = NdrWriter::new(NdrContext::new());
    w.write_size(u32::MAX as u64).unwrap();
    w.write_size(0).unwrap();
    w.write_size(u32::MAX as u64).unwrap();
    w.write_u16(u16::from(b'x'));
    let err = from_bytes::<NdrWString>(NdrContext::new(), &w.into_bytes()).unwrap_err();
    assert!(matches!(
        err,
        NdrError::BufferOverflow {
            declared,
            remaining: 2
        } if declared == u64::from(u32::MAX)
    ));

    // hoisted count inside a structure
    let mut bytes = to_bytes(NdrContext::new(), &sample()).unwrap().to_vec();
    bytes[0..4].copy_from_slice(&0x4000_0000u32.to_le_bytes());
    let err = from_bytes::<Sample>(NdrContext::new(), &bytes).unwrap_err();
    assert!(is_buffer_overflow(&err), "unexpected error: {:?}", err);
}

/// Test: Variance outside the bound is rejected
#[test]
fn test_conformance_mismatch() {
    let mut w = NdrWriter::new(NdrContext::new());
    w.write_size(2).unwrap(); // max_count
    w.write_size(1).unwrap(); // offset
    w.write_size(2).unwrap(); // actual_count
    w.write_u32(1);
    w.write_u32(2);
    let err = from_bytes::<ConformantVaryingArray<u32>>(NdrContext::new(), &w.into_bytes())
        .unwrap_err();
    assert!(matches!(
        err,
        NdrError::ConformanceMismatch {
            max_count: 2,
            offset: 1,
            actual_count: 2
        }
    ));

    let partial = ConformantVaryingArray::with_max(8, vec![5u32, 6]);
    let bytes = to_bytes(NdrContext::new(), &partial).unwrap();
    let decoded: ConformantVaryingArray<u32> = from_bytes(NdrContext::new(), &bytes).unwrap();
    assert_eq!(decoded, partial);
}

/// Test: Truncated input is reported, never panics
#[test]
fn test_truncated_input() {
    let bytes = to_bytes(NdrContext::new(), &sample()).unwrap();
    for len in 0..bytes.len() {
        let result = from_bytes::<Sample>(NdrContext::new(), &bytes[..len]);
        assert!(result.is_err(), "decoded from {} of {} bytes", len, bytes.len());
    }

    let err = from_bytes::<Sample>(NdrContext::new(), &bytes[..6]).unwrap_err();
    assert!(matches!(
        err,
        NdrError::TruncatedInput {
            needed: 4,
            remaining: 2
        }
    ));
}

/// Test: Union arms, including a pointer arm
#[test]
fn test_union_arms_round_trip() {
    let readings = [
        Reading::Integer(-42),
        Reading::Real(273.15),
        Reading::Label(UniquePtr::new(NdrWString::new("calm"))),
        Reading::Label(UniquePtr::null()),
    ];
    for ctx in contexts() {
        for reading in &readings {
            let bytes = to_bytes(ctx, reading).unwrap();
            let decoded: Reading = from_bytes_exact(ctx, &bytes).unwrap();
            assert_eq!(&decoded, reading);
        }
    }

    let bytes = to_bytes(NdrContext::new(), &Reading::Real(1.0)).unwrap();
    assert_eq!(&bytes[..2], &[2, 0]);
    assert!(bytes[2..8].iter().all(|&b| b == 0));
    assert_eq!(bytes.len(), 16);
}

/// Test: Unknown discriminant captures its arm slot
#[test]
fn test_union_forward_compatibility() {
    let newer = Reading::Other {
        tag: 9,
        raw: Bytes::from_static(&[1, 2, 3, 4, 5, 6, 7, 8]),
    };
    let bytes = to_bytes(NdrContext::new(), &newer).unwrap();
    assert_eq!(&bytes[..2], &[9, 0]);
    assert_eq!(bytes.len(), 16);

    let decoded: Reading = from_bytes(NdrContext::new(), &bytes).unwrap();
    assert_eq!(decoded, newer);
    assert!(decoded.is_unknown());

    // a known variant cannot be forged with an unknown tag and vice versa
    let forged = Reading::Other {
        tag: 1,
        raw: Bytes::new(),
    };
    assert!(matches!(
        to_bytes(NdrContext::new(), &forged),
        Err(NdrError::MalformedUnion(_))
    ));
}

/// Two readings followed by a string pointer and an aliased unit
#[derive(Debug, Clone, PartialEq)]
struct Report {
    first: Reading,
    second: Reading,
    station: UniquePtr<NdrWString>,
    unit: FullPtr<Unit>,
    display_unit: FullPtr<Unit>,
}

impl NdrEncode for Report {
    fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> midl_ndr::Result<()> {
        w.write_struct_align(8);
        w.write_data(&self.first)?;
        w.write_data(&self.second)?;
        w.write_data(&self.station)?;
        w.write_data(&self.unit)?;
        w.write_data(&self.display_unit)?;
        w.write_trailing_gap(8);
        Ok(())
    }

    fn ndr_align() -> usize {
        8
    }
}

impl NdrDecode for Report {
    fn ndr_decode(r: &mut NdrReader<'_>) -> midl_ndr::Result<Self> {
        r.read_struct_align(8);
        let first = r.read_data()?;
        let second = r.read_data()?;
        let station = r.read_data()?;
        let unit = r.read_data()?;
        let display_unit = r.read_data()?;
        r.read_trailing_gap(8);
        Ok(Self {
            first,
            second,
            station,
            unit,
            display_unit,
        })
    }

    fn ndr_align() -> usize {
        8
    }
}

/// Test: Unknown arm in the middle of a struct leaves later fields intact
#[test]
fn test_unknown_arm_inside_struct() {
    let unit = FullPtr::new(Unit::new("hPa", 2));
    let report = Report {
        first: Reading::Other {
            tag: 0x44,
            raw: Bytes::from_static(b"wet"),
        },
        second: Reading::Real(1013.25),
        station: UniquePtr::new(NdrWString::new("harbour")),
        display_unit: unit.clone(),
        unit,
    };

    for ctx in contexts() {
        let bytes = to_bytes(ctx, &report).unwrap();
        let decoded: Report = from_bytes(ctx, &bytes).unwrap();

        assert_eq!(
            decoded.first,
            Reading::Other {
                tag: 0x44,
                raw: Bytes::from_static(b"wet\0\0\0\0\0"),
            }
        );
        assert_eq!(decoded.second, Reading::Real(1013.25));
        assert_eq!(decoded.station.get().map(NdrWString::as_str), Some("harbour"));
        assert!(decoded.unit.ptr_eq(&decoded.display_unit));
        assert_eq!(decoded.unit.get().map(|u| u.scale), Some(2));
    }
}

#[derive(Debug, PartialEq)]
struct OddSwitch;

fn decode_odd(_: &mut NdrReader<'_>) -> midl_ndr::Result<OddSwitch> {
    Ok(OddSwitch)
}

impl NdrUnion for OddSwitch {
    const SWITCH_WIDTH: usize = 3;
    const ALIGN: usize = 4;
    const ARMS: &'static [UnionArm<Self>] = &[UnionArm {
        tag: 0,
        decode: decode_odd,
    }];

    fn discriminant(&self) -> i64 {
        0
    }

    fn encode_arm<'a>(&'a self, _: &mut NdrWriter<'a>) -> midl_ndr::Result<()> {
        Ok(())
    }

    fn unknown(_: i64, _: Bytes) -> Self {
        OddSwitch
    }

    fn is_unknown(&self) -> bool {
        false
    }
}

/// Test: Structurally invalid unions fail instead of degrading
#[test]
fn test_malformed_union() {
    let bytes = [0u8; 8];
    let mut r = NdrReader::new(NdrContext::new(), &bytes);
    assert!(matches!(
        r.read_union::<OddSwitch>(),
        Err(NdrError::MalformedUnion(_))
    ));
    assert_eq!(r.position(), 0);

    let mut w = NdrWriter::new(NdrContext::new());
    assert!(matches!(
        w.write_union(&OddSwitch),
        Err(NdrError::MalformedUnion(_))
    ));
}

/// Test: Reference pointers and fixed arrays are written inline
#[test]
fn test_ref_pointer_and_fixed_array() {
    let value = RefPtr::new(FixedArray::new([7u16, 8, 9]));
    let bytes = to_bytes(NdrContext::new(), &value).unwrap();
    assert_eq!(&bytes[..], &[7, 0, 8, 0, 9, 0]);

    let decoded: RefPtr<FixedArray<u16, 3>> = from_bytes_exact(NdrContext::new(), &bytes).unwrap();
    assert_eq!(decoded.into_inner(), FixedArray::new([7, 8, 9]));
}

/// Test: Deep pointer chains do not grow the call stack
#[test]
fn test_deep_pointer_chain() {
    #[derive(Debug, Default)]
    struct Node {
        depth: u32,
        next: UniquePtr<Node>,
    }

    impl midl_ndr::NdrEncode for Node {
        fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> midl_ndr::Result<()> {
            w.write_u32(self.depth);
            w.write_data(&self.next)
        }
    }

    impl midl_ndr::NdrDecode for Node {
        fn ndr_decode(r: &mut NdrReader<'_>) -> midl_ndr::Result<Self> {
            Ok(Node {
                depth: r.read_u32()?,
                next: r.read_data()?,
            })
        }

        fn ndr_min_size() -> usize {
            8
        }
    }

    const DEPTH: u32 = 20_000;
    let mut head = Node::default();
    for depth in 1..=DEPTH {
        head = Node {
            depth,
            next: UniquePtr::new(head),
        };
    }

    let bytes = to_bytes(NdrContext::new(), &head).unwrap();
    assert_eq!(bytes.len(), (DEPTH as usize + 1) * 8);

    let decoded: Node = from_bytes(NdrContext::new(), &bytes).unwrap();
    let mut depth = 0;
    let mut cursor = &decoded;
    while let Some(next) = cursor.next.get() {
        assert_eq!(cursor.depth, DEPTH - depth);
        depth += 1;
        cursor = next;
    }
    assert_eq!(depth, DEPTH);

    // tear down iteratively
    for node in [head, decoded] {
        let mut next = node.next;
        while let Some(inner) = next.get() {
            let following = inner.next.clone();
            drop(next);
            next = following;
        }
    }
}
