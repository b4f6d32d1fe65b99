//! Error taxonomy: variants, display texts and propagation policy.

use std::sync::Arc;

use statestream::{
    Group, KindRegistry, LogKind, MuxConfig, MuxError, Opcode, OpenMode, Session, SessionError,
    WireError, WireWrite, BASE_OP_LIMIT,
};

#[test]
fn pool_exhausted_mentions_the_limit() {
    let error = MuxError::PoolExhausted { limit: 4 };
    let message = error.to_string();
    assert!(message.contains("exhausted"));
    assert!(message.contains('4'));
}

#[test]
fn oversize_op_mentions_both_sizes() {
    let error = MuxError::OversizeOp {
        size: 9000,
        capacity: 8192,
    };
    let message = error.to_string();
    assert!(message.contains("9000"));
    assert!(message.contains("8192"));
}

#[test]
fn session_errors_carry_their_operands() {
    let unknown = SessionError::UnknownOpcode { kind: 5, op: 33 };
    assert!(unknown.to_string().contains("33"));

    let dangling = SessionError::DanglingHandle { handle: 42 };
    assert!(dangling.to_string().contains("42"));

    let mismatch = SessionError::KindMismatch {
        handle: 3,
        expected: 5,
        actual: 7,
    };
    let message = mismatch.to_string();
    assert!(message.contains("corrupt"));
    assert!(message.contains('7'));
}

#[test]
fn skippable_errors_are_exactly_the_per_opcode_ones() {
    assert!(SessionError::UnknownOpcode { kind: 1, op: 2 }.is_skippable());
    assert!(SessionError::DanglingHandle { handle: 1 }.is_skippable());
    assert!(SessionError::UnknownKind { kind: 1 }.is_skippable());

    assert!(!SessionError::StreamClosed.is_skippable());
    assert!(!SessionError::KindMismatch {
        handle: 1,
        expected: 1,
        actual: 2
    }
    .is_skippable());
    assert!(!SessionError::Mux(MuxError::LogClosed).is_skippable());
    assert!(!SessionError::Wire(WireError::BadString).is_skippable());
}

#[test]
fn mux_and_wire_errors_convert_into_session_errors() {
    let from_mux: SessionError = MuxError::PoolExhausted { limit: 2 }.into();
    assert!(matches!(
        from_mux,
        SessionError::Mux(MuxError::PoolExhausted { limit: 2 })
    ));

    let from_wire: SessionError = WireError::BadString.into();
    assert!(matches!(from_wire, SessionError::Wire(WireError::BadString)));
}

#[test]
fn errors_are_send_and_clonable() {
    fn assert_send<T: Send>() {}
    assert_send::<SessionError>();
    assert_send::<MuxError>();
    assert_send::<WireError>();

    let error = SessionError::DanglingHandle { handle: 9 };
    assert_eq!(error.clone(), error);
}

#[test]
fn writes_on_an_unopened_session_report_stream_closed() {
    let mut registry = KindRegistry::new();
    Group::register(&mut registry);
    let session = Session::new(Arc::new(registry), MuxConfig::default());

    let result = session.log_op(
        LogKind::Update,
        Opcode::new(Group::KIND, BASE_OP_LIMIT),
        |_writer| Ok(()),
    );
    assert_eq!(result, Err(SessionError::StreamClosed));
}

#[test]
fn writes_after_close_report_stream_closed() {
    let mut registry = KindRegistry::new();
    Group::register(&mut registry);
    let session = Session::new(Arc::new(registry), MuxConfig::default());
    session.open("out", OpenMode::Write).unwrap();
    session.close();

    let result = session.log_op(
        LogKind::Update,
        Opcode::new(Group::KIND, BASE_OP_LIMIT),
        |_writer| Ok(()),
    );
    assert_eq!(result, Err(SessionError::StreamClosed));
}

#[test]
fn oversize_opcode_surfaces_through_the_session() {
    let mut registry = KindRegistry::new();
    Group::register(&mut registry);
    let session = Session::new(
        Arc::new(registry),
        MuxConfig {
            buffer_capacity: 32,
            pool_limit: 4,
        },
    );
    session.open("out", OpenMode::Write).unwrap();

    let big = vec![0u8; 64];
    let result = session.log_op(
        LogKind::Update,
        Opcode::new(Group::KIND, BASE_OP_LIMIT),
        |writer| writer.write_all(&big),
    );
    assert_eq!(
        result,
        Err(SessionError::Mux(MuxError::OversizeOp {
            size: 64,
            capacity: 32
        }))
    );
}

#[test]
fn save_on_closed_session_is_refused() {
    let mut registry = KindRegistry::new();
    Group::register(&mut registry);
    let session = Session::new(Arc::new(registry), MuxConfig::default());

    let entity: statestream::EntityRef = Arc::new(Group::new());
    let result = session.save(&entity);
    assert_eq!(result, Err(SessionError::StreamClosed));
}
