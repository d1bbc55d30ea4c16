//! Shared fixtures for the integration tests
//!
//! A small "calculator" interface with six typed operations (opnums 0..=5),
//! a few NDR shapes that mix pointers, conformant arrays and unions, and a
//! latency recorder for the concurrency tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use bytes::Bytes;
use dcerpc::{
    ChannelConfig, DataRepresentation, Dispatcher, Interface, InterfaceBuilder, LocalChannel,
    Operation, RpcError, SyntaxId, Uuid,
};
use midl_ndr::{
    ConformantArray, FullPtr, NdrDecode, NdrEncode, NdrError, NdrReader, NdrUnion, NdrWString,
    NdrWriter, Result, UnionArm, UniquePtr,
};
use parking_lot::Mutex;
use tracing::Level;

pub const CALC_UUID: &str = "6f1c2a4e-93b0-4d8e-b5a7-0c3e9d21f468";
pub const CALC_VERSION: u16 = 1;

static LOGGING: Once = Once::new();

/// Install a quiet test subscriber once per process.
pub fn init_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(Level::WARN)
            .with_test_writer()
            .try_init();
    });
}

pub fn calc_syntax() -> SyntaxId {
    SyntaxId::new(Uuid::parse(CALC_UUID).unwrap(), CALC_VERSION, 0)
}

// ============================================================================
// Calculator operations
// ============================================================================

/// Opnum 0: no parameters, returns a constant
pub struct Ping;

impl Operation for Ping {
    const OPNUM: u16 = 0;
    const NAME: &'static str = "Ping";
    type Request = u32;
    type Response = u32;
}

/// Opnum 1: sum of a conformant array
pub struct Sum;

impl Operation for Sum {
    const OPNUM: u16 = 1;
    const NAME: &'static str = "Sum";
    type Request = ConformantArray<u32>;
    type Response = u64;
}

/// Opnum 2: upper-cases a string
pub struct Upper;

impl Operation for Upper {
    const OPNUM: u16 = 2;
    const NAME: &'static str = "Upper";
    type Request = NdrWString;
    type Response = NdrWString;
}

/// Opnum 3: scales every value of a [`Sample`]
pub struct Scale;

impl Operation for Scale {
    const OPNUM: u16 = 3;
    const NAME: &'static str = "Scale";
    type Request = Sample;
    type Response = Sample;
}

/// Opnum 4: negates a [`Reading`]
pub struct Negate;

impl Operation for Negate {
    const OPNUM: u16 = 4;
    const NAME: &'static str = "Negate";
    type Request = Reading;
    type Response = Reading;
}

/// Opnum 5: always fails in the handler
pub struct Fail;

impl Operation for Fail {
    const OPNUM: u16 = 5;
    const NAME: &'static str = "Fail";
    type Request = u32;
    type Response = u32;
}

pub const PING_REPLY: u32 = 0x5049_4e47;

pub fn calc_interface() -> Interface {
    InterfaceBuilder::from_syntax(calc_syntax())
        .typed::<Ping, _, _>(|_: u32| async { Ok(PING_REPLY) })
        .typed::<Sum, _, _>(|values: ConformantArray<u32>| async move {
            Ok(values.elements.iter().map(|&v| u64::from(v)).sum())
        })
        .typed::<Upper, _, _>(|s: NdrWString| async move {
            Ok(NdrWString::new(s.as_str().to_uppercase()))
        })
        .typed::<Scale, _, _>(|sample: Sample| async move { Ok(sample.scaled(2)) })
        .typed::<Negate, _, _>(|reading: Reading| async move {
            Ok(match reading {
                Reading::Integer(v) => Reading::Integer(-v),
                Reading::Real(v) => Reading::Real(-v),
                other => other,
            })
        })
        .typed::<Fail, _, _>(|code: u32| async move {
            Err(RpcError::Handler(format!("refusing {}", code)))
        })
        .build()
}

pub fn calc_dispatcher() -> Arc<Dispatcher> {
    let dispatcher = Arc::new(Dispatcher::new());
    dispatcher.register(calc_interface());
    dispatcher
}

pub fn connect(dispatcher: &Arc<Dispatcher>, data_rep: DataRepresentation) -> LocalChannel {
    let config = ChannelConfig {
        data_rep,
        ..Default::default()
    };
    LocalChannel::with_config(Arc::clone(dispatcher), calc_syntax(), config).unwrap()
}

// ============================================================================
// NDR shapes
// ============================================================================

/// A labelled series of values sharing an optional unit
///
/// ```text
/// typedef struct {
///     long count;
///     [unique, string] wchar_t *label;
///     [ptr] UNIT *unit;
///     [ptr] UNIT *display_unit;
///     [size_is(count)] long values[];
/// } SAMPLE;
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sample {
    pub count: u32,
    pub label: UniquePtr<NdrWString>,
    pub unit: FullPtr<Unit>,
    pub display_unit: FullPtr<Unit>,
    pub values: Vec<i32>,
}

impl Sample {
    pub fn new(label: &str, unit: FullPtr<Unit>, values: Vec<i32>) -> Self {
        Self {
            count: values.len() as u32,
            label: UniquePtr::new(NdrWString::new(label)),
            display_unit: unit.clone(),
            unit,
            values,
        }
    }

    pub fn scaled(&self, factor: i32) -> Self {
        Self {
            values: self.values.iter().map(|v| v * factor).collect(),
            ..self.clone()
        }
    }
}

impl NdrEncode for Sample {
    fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        w.with_conformance(vec![u64::from(self.count)], |w| {
            w.write_struct_align(4);
            w.write_u32(self.count);
            w.write_data(&self.label)?;
            w.write_data(&self.unit)?;
            w.write_data(&self.display_unit)?;
            w.write_conformant_array(u64::from(self.count), &self.values)?;
            w.write_trailing_gap(4);
            Ok(())
        })
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for Sample {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        r.with_conformance(1, |r| {
            r.read_struct_align(4);
            let count = r.read_u32()?;
            let label = r.read_data()?;
            let unit = r.read_data()?;
            let display_unit = r.read_data()?;
            let values = r.read_conformant_array()?;
            r.read_trailing_gap(4);
            Ok(Self {
                count,
                label,
                unit,
                display_unit,
                values,
            })
        })
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        20
    }
}

/// Unit of measure, shared between samples
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Unit {
    pub scale: i16,
    pub symbol: NdrWString,
}

impl Unit {
    pub fn new(symbol: &str, scale: i16) -> Self {
        Self {
            scale,
            symbol: NdrWString::new(symbol),
        }
    }
}

impl NdrEncode for Unit {
    fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        w.write_struct_align(4);
        w.write_i16(self.scale);
        w.write_data(&self.symbol)?;
        w.write_trailing_gap(4);
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for Unit {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        r.read_struct_align(4);
        let scale = r.read_i16()?;
        let symbol = r.read_data()?;
        r.read_trailing_gap(4);
        Ok(Self { scale, symbol })
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        16
    }
}

/// `[switch_type(short)] union` of a measurement
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Integer(i32),
    Real(f64),
    Label(UniquePtr<NdrWString>),
    Other { tag: i64, raw: Bytes },
}

impl Default for Reading {
    fn default() -> Self {
        Reading::Integer(0)
    }
}

fn decode_integer(r: &mut NdrReader<'_>) -> Result<Reading> {
    r.read_i32().map(Reading::Integer)
}

fn decode_real(r: &mut NdrReader<'_>) -> Result<Reading> {
    r.read_f64().map(Reading::Real)
}

fn decode_label(r: &mut NdrReader<'_>) -> Result<Reading> {
    r.read_data().map(Reading::Label)
}

impl NdrUnion for Reading {
    const SWITCH_WIDTH: usize = 2;
    const ALIGN: usize = 8;
    const ARMS: &'static [UnionArm<Self>] = &[
        UnionArm {
            tag: 1,
            decode: decode_integer,
        },
        UnionArm {
            tag: 2,
            decode: decode_real,
        },
        UnionArm {
            tag: 3,
            decode: decode_label,
        },
    ];
    const UNKNOWN_ARM_SIZE: Option<usize> = Some(8);

    fn discriminant(&self) -> i64 {
        match self {
            Reading::Integer(_) => 1,
            Reading::Real(_) => 2,
            Reading::Label(_) => 3,
            Reading::Other { tag, .. } => *tag,
        }
    }

    fn encode_arm<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        match self {
            Reading::Integer(v) => w.write_i32(*v),
            Reading::Real(v) => w.write_f64(*v),
            Reading::Label(label) => w.write_data(label)?,
            Reading::Other { raw, .. } => w.write_bytes(raw),
        }
        Ok(())
    }

    fn unknown(tag: i64, raw: Bytes) -> Self {
        Reading::Other { tag, raw }
    }

    fn is_unknown(&self) -> bool {
        matches!(self, Reading::Other { .. })
    }
}

impl NdrEncode for Reading {
    fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        w.write_union(self)
    }

    fn ndr_align() -> usize {
        8
    }
}

impl NdrDecode for Reading {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        r.read_union()
    }

    fn ndr_align() -> usize {
        8
    }

    fn ndr_min_size() -> usize {
        2
    }
}

pub fn is_buffer_overflow(e: &NdrError) -> bool {
    matches!(e, NdrError::BufferOverflow { .. })
}

// ============================================================================
// Concurrency statistics
// ============================================================================

/// Success/failure counters with latency bounds
#[derive(Default)]
pub struct ConcurrentStats {
    success: AtomicU64,
    failure: AtomicU64,
    total_latency_us: AtomicU64,
    bounds: Mutex<Option<(Duration, Duration)>>,
}

impl ConcurrentStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, latency: Duration) {
        self.success.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        let mut bounds = self.bounds.lock();
        *bounds = Some(match *bounds {
            None => (latency, latency),
            Some((min, max)) => (min.min(latency), max.max(latency)),
        });
    }

    pub fn record_failure(&self) {
        self.failure.fetch_add(1, Ordering::Relaxed);
    }

    pub fn success_count(&self) -> u64 {
        self.success.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failure.load(Ordering::Relaxed)
    }

    pub fn avg_latency(&self) -> Duration {
        let count = self.success_count();
        if count == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.total_latency_us.load(Ordering::Relaxed) / count)
    }

    pub fn min_latency(&self) -> Duration {
        self.bounds.lock().map_or(Duration::ZERO, |(min, _)| min)
    }

    pub fn max_latency(&self) -> Duration {
        self.bounds.lock().map_or(Duration::ZERO, |(_, max)| max)
    }
}
