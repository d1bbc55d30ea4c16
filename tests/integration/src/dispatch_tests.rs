//! Dispatch Tests - Operation dispatch through request PDUs
//!
//! These tests drive the dispatcher the way a transport would:
//! - Typed calls through a bound channel in both byte orders
//! - Unknown opnums, failing and panicking handlers
//! - Malformed stub data and malformed PDUs
//! The dispatcher must answer every call and keep serving afterwards.

mod common;

use std::sync::Arc;

use bytes::Bytes;
use common::*;
use dcerpc::{
    DataRepresentation, Dispatcher, FaultStatus, InterfaceBuilder, LocalChannel, Operation, Pdu,
    RequestPdu, RpcCall, RpcChannel, RpcChannelExt, RpcError, SyntaxId, Uuid,
};
use midl_ndr::{ConformantArray, FullPtr, NdrContext, NdrWString, NdrWriter, UniquePtr};

fn data_reps() -> [DataRepresentation; 2] {
    [DataRepresentation::ndr(), DataRepresentation::big_endian()]
}

/// Test: Interface with opnums 0..=5 rejects 9999 and keeps serving
#[tokio::test]
async fn test_unknown_operation_id() {
    init_logging();

    let dispatcher = calc_dispatcher();
    let uuid = calc_syntax().uuid;

    let result = dispatcher.dispatch(&uuid, 9999, Bytes::new()).await;
    assert!(matches!(result, Err(RpcError::UnknownOperation(9999))));

    let reply = dispatcher
        .dispatch(&uuid, Ping::OPNUM, Bytes::from_static(&[0, 0, 0, 0]))
        .await
        .unwrap();
    assert_eq!(reply.as_ref(), &PING_REPLY.to_le_bytes());

    // through a channel the same call becomes a fault
    let channel = connect(&dispatcher, DataRepresentation::ndr());
    let err = channel.invoke(9999, None, Bytes::new()).await.unwrap_err();
    assert!(matches!(err, RpcError::Fault(status) if status == FaultStatus::OpRngError as u32));
    assert_eq!(channel.call::<Ping>(&0).await.unwrap(), PING_REPLY);

    let stats = dispatcher.stats().snapshot();
    assert_eq!(stats.unknown_operations, 2);
    assert_eq!(stats.requests_failed, 1);
    assert_eq!(stats.requests_processed, 1);
}

/// Test: Every calculator operation in both byte orders
#[tokio::test]
async fn test_typed_operations() {
    init_logging();

    let dispatcher = calc_dispatcher();
    for data_rep in data_reps() {
        let channel = connect(&dispatcher, data_rep);

        assert_eq!(channel.call::<Ping>(&1).await.unwrap(), PING_REPLY);

        let values = ConformantArray::new(vec![u32::MAX, u32::MAX, 2]);
        assert_eq!(
            channel.call::<Sum>(&values).await.unwrap(),
            2 * u64::from(u32::MAX) + 2
        );

        let upper = channel.call::<Upper>(&NdrWString::new("grüße")).await.unwrap();
        assert_eq!(upper.as_str(), "GRÜSSE");

        let reading = Reading::Real(-0.25);
        assert_eq!(channel.call::<Negate>(&reading).await.unwrap(), Reading::Real(0.25));
    }
}

/// Test: Aliased referents in a request come back aliased in the response
#[tokio::test]
async fn test_aliasing_through_dispatch() {
    let dispatcher = calc_dispatcher();
    let channel = connect(&dispatcher, DataRepresentation::big_endian());

    let unit = FullPtr::new(Unit::new("°C", 0));
    let sample = Sample::new("outside", unit, vec![-4, 0, 17]);
    let scaled = channel.call::<Scale>(&sample).await.unwrap();

    assert_eq!(scaled.values, vec![-8, 0, 34]);
    assert_eq!(scaled.label.get().map(|l| l.as_str()), Some("outside"));
    assert!(scaled.unit.ptr_eq(&scaled.display_unit));
    assert!(!scaled.unit.ptr_eq(&sample.unit));
}

/// Test: A newer union arm passes through a server that does not know it
#[tokio::test]
async fn test_unknown_union_arm_passes_through() {
    let dispatcher = calc_dispatcher();
    let channel = connect(&dispatcher, DataRepresentation::ndr());

    let newer = Reading::Other {
        tag: 0x44,
        raw: Bytes::from_static(b"humidity"),
    };
    assert_eq!(channel.call::<Negate>(&newer).await.unwrap(), newer);

    let label = Reading::Label(UniquePtr::new(NdrWString::new("gusty")));
    assert_eq!(channel.call::<Negate>(&label).await.unwrap(), label);
}

/// Test: A failing handler produces a fault, not a broken dispatcher
#[tokio::test]
async fn test_handler_failure_is_fault() {
    let dispatcher = calc_dispatcher();
    let channel = connect(&dispatcher, DataRepresentation::ndr());

    let err = channel.call::<Fail>(&7).await.unwrap_err();
    assert!(matches!(err, RpcError::Fault(status) if status == FaultStatus::RpcError as u32));
    assert_eq!(channel.call::<Ping>(&0).await.unwrap(), PING_REPLY);
}

/// Test: Stub data that does not decode is reported as bad stub data
#[tokio::test]
async fn test_malformed_stub_data() {
    init_logging();

    let dispatcher = calc_dispatcher();
    let channel = connect(&dispatcher, DataRepresentation::ndr());

    // array claiming a million elements, carrying one
    let mut w = NdrWriter::new(NdrContext::new());
    w.write_size(1_000_000).unwrap();
    w.write_u32(1);
    let err = channel.invoke(Sum::OPNUM, None, w.into_bytes()).await.unwrap_err();
    assert!(matches!(err, RpcError::Fault(status) if status == FaultStatus::BadStubData as u32));

    // truncated string
    let err = channel
        .invoke(Upper::OPNUM, None, Bytes::from_static(&[4, 0, 0, 0, 0, 0]))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Fault(status) if status == FaultStatus::BadStubData as u32));

    // discriminant cut short
    let err = channel
        .invoke(Negate::OPNUM, None, Bytes::from_static(&[1]))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Fault(status) if status == FaultStatus::BadStubData as u32));

    let values = ConformantArray::new(vec![40, 2]);
    assert_eq!(channel.call::<Sum>(&values).await.unwrap(), 42);
    assert_eq!(dispatcher.stats().snapshot().requests_failed, 3);
}

/// Test: A panicking handler is contained
#[tokio::test]
async fn test_panicking_handler() {
    init_logging();

    const FRAGILE: &str = "0d8a4f71-2c55-4b1e-9e0b-7f6d3a2c1b90";
    let fragile = InterfaceBuilder::new(FRAGILE, 1, 0)
        .unwrap()
        .operation(0, |call: RpcCall| async move {
            if call.stub_data.is_empty() {
                panic!("empty request");
            }
            Ok(call.stub_data)
        })
        .build();
    let syntax = fragile.syntax;

    let dispatcher = calc_dispatcher();
    dispatcher.register(fragile);
    let channel = LocalChannel::connect(Arc::clone(&dispatcher), syntax).unwrap();

    let err = channel.invoke(0, None, Bytes::new()).await.unwrap_err();
    assert!(matches!(err, RpcError::Fault(_)));
    assert_eq!(
        channel.invoke(0, None, Bytes::from_static(b"ok")).await.unwrap().as_ref(),
        b"ok"
    );
    assert_eq!(dispatcher.stats().snapshot().handler_panics, 1);

    // the calculator on the same dispatcher is unaffected
    let calc = connect(&dispatcher, DataRepresentation::ndr());
    assert_eq!(calc.call::<Ping>(&0).await.unwrap(), PING_REPLY);
}

/// Test: Every prefix of a valid request PDU gets an answer
#[tokio::test]
async fn test_truncated_pdus_always_answered() {
    let dispatcher = calc_dispatcher();
    dispatcher.bind(0, &calc_syntax()).unwrap();

    let sample = Sample::new("series", FullPtr::new(Unit::new("V", 0)), vec![1, 2, 3, 4]);
    let stub = midl_ndr::to_bytes(NdrContext::new(), &sample).unwrap();
    let pdu = RequestPdu::new(42, Scale::OPNUM, stub).encode().unwrap();

    for len in 0..pdu.len() {
        let reply = dispatcher.handle_pdu(&pdu[..len]).await;
        match Pdu::decode(&reply).unwrap() {
            Pdu::Fault(_) => {}
            other => panic!("prefix of {} bytes answered with {:?}", len, other),
        }
    }

    match Pdu::decode(&dispatcher.handle_pdu(&pdu).await).unwrap() {
        Pdu::Response(response) => {
            assert_eq!(response.header.call_id, 42);
            let scaled: Sample = midl_ndr::from_bytes(NdrContext::new(), &response.stub_data).unwrap();
            assert_eq!(scaled.values, vec![2, 4, 6, 8]);
        }
        other => panic!("expected response, got {:?}", other),
    }
}

/// Test: Interfaces are separated by UUID and version
#[tokio::test]
async fn test_interface_lookup() {
    let dispatcher = Arc::new(Dispatcher::new());
    let uuid = calc_syntax().uuid;

    assert!(matches!(
        dispatcher.dispatch(&uuid, 0, Bytes::new()).await,
        Err(RpcError::InterfaceNotFound(_))
    ));

    dispatcher.register(calc_interface());
    assert!(LocalChannel::connect(Arc::clone(&dispatcher), SyntaxId::new(uuid, 2, 0)).is_err());
    assert!(LocalChannel::connect(
        Arc::clone(&dispatcher),
        SyntaxId::new(Uuid::parse("00000000-0000-0000-0000-000000000001").unwrap(), 1, 0)
    )
    .is_err());
    assert!(LocalChannel::connect(Arc::clone(&dispatcher), calc_syntax()).is_ok());
}
