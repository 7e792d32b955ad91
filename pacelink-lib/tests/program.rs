//! Programming requests end to end: store, validation, send, echo, audit

mod common;

use common::*;
use pacelink_lib::program::{AuditLog, AuditRecord, JsonStore, MemoryStore, ProgrammingRequest};
use pacelink_lib::receiver::{Receiver, ReceiverExit};
use std::sync::Mutex;

#[derive(Default)]
struct CollectingAudit {
    records: Mutex<Vec<AuditRecord>>,
}

impl AuditLog for CollectingAudit {
    fn record(&self, record: &AuditRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}

fn store_with(mode: Mode, parameters: ParameterSet) -> MemoryStore {
    let mut store = MemoryStore::new();
    store.select_mode("alice", mode);
    store.save_parameters("alice", mode, parameters);
    store
}

#[test]
fn test_inverted_rate_limits_write_nothing() {
    let link = LoopbackLink::new("loop0");
    let session = attached(&link);
    let audit = CollectingAudit::default();
    let store = store_with(
        Mode::Vvi,
        ParameterSet::nominal()
            .with(Parameter::LowerRateLimit, 130u32)
            .with(Parameter::UpperRateLimit, 100u32),
    );

    let result = ProgrammingRequest::new(&session).with_audit(&audit).program(&store, "alice");
    assert!(matches!(result, Err(PacerError::RateLimitsInverted { .. })));
    assert!(link.written().is_empty());
    assert_eq!(link.clears(), 0);
    assert!(audit.records.lock().unwrap().is_empty());
    assert_eq!(session.state(), LinkState::Idle);
}

#[test]
fn test_missing_parameters_write_nothing() {
    let link = LoopbackLink::new("loop0");
    let session = attached(&link);
    let store = store_with(
        Mode::Aai,
        ParameterSet::new().with(Parameter::LowerRateLimit, 60u32),
    );

    match ProgrammingRequest::new(&session).program(&store, "alice") {
        Err(PacerError::MissingParameters { mode, missing }) => {
            assert_eq!(mode, Mode::Aai);
            assert!(missing.contains(&Parameter::UpperRateLimit));
            assert!(!missing.contains(&Parameter::LowerRateLimit));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(link.written().is_empty());
}

#[test]
fn test_unreadable_rate_limits_write_nothing() {
    let store = JsonStore::from_json(
        r#"{
            "parameters": { "alice": { "AAI": {
                "Lower Rate Limit": "sixty", "Upper Rate Limit": "",
                "Atrial Amplitude": "3.5", "Atrial Pulse Width": "0.4",
                "Atrial Sensitivity": "0.75", "ARP": "250", "PVARP": "250",
                "Hysteresis": "0", "Rate Smoothing": "0"
            } } },
            "states": { "alice": "AAI" }
        }"#,
    )
    .unwrap();
    let link = LoopbackLink::new("loop0");
    let session = attached(&link);

    match ProgrammingRequest::new(&session).program(&store, "alice") {
        Err(PacerError::MissingParameters { mode, missing }) => {
            assert_eq!(mode, Mode::Aai);
            assert_eq!(missing, vec![Parameter::LowerRateLimit, Parameter::UpperRateLimit]);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(link.written().is_empty());
    assert_eq!(session.state(), LinkState::Idle);
}

#[test]
fn test_program_returns_frame_and_audits() {
    let link = LoopbackLink::new("loop0");
    let session = attached(&link);
    let audit = CollectingAudit::default();
    let store = store_with(Mode::Aai, aai_parameters());

    let frame = ProgrammingRequest::new(&session)
        .with_audit(&audit)
        .program(&store, "alice")
        .unwrap();
    assert_eq!(frame.to_vec(), link.written());
    assert_eq!(&frame[2..5], &[3, 60, 120]);

    let records = audit.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].mode, Mode::Aai);
    assert_eq!(records[0].user, "alice");
    assert_eq!(records[0].frame, frame);
    assert_eq!(records[0].port.as_deref(), Some("loop0"));
}

#[test]
fn test_out_of_range_is_sent_anyway() {
    let link = LoopbackLink::new("loop0");
    let session = attached(&link);
    let store = store_with(
        Mode::Voo,
        ParameterSet::nominal().with(Parameter::VentricularAmplitude, 9.0),
    );

    let frame = ProgrammingRequest::new(&session).program(&store, "alice").unwrap();
    let echo = frame::decode_echo(&frame).unwrap();
    assert_eq!(echo.parameters.number(Parameter::VentricularAmplitude), Some(9.0));
}

#[tokio::test]
async fn test_program_and_confirm() {
    let link = LoopbackLink::echoing("loop0");
    let session = attached(&link);
    let receiver = Receiver::start(session.clone());
    let store = store_with(Mode::Aai, aai_parameters());

    let confirmation = ProgrammingRequest::new(&session)
        .program_and_confirm(&store, "alice")
        .await
        .unwrap();
    assert!(confirmation.matches);
    assert_eq!(confirmation.echo.mode(), Some(Mode::Aai));
    assert_eq!(session.state(), LinkState::Idle);

    assert_eq!(receiver.stop().await, ReceiverExit::Stopped);
    assert!(!session.is_connected());
}

#[tokio::test]
async fn test_program_and_confirm_silent_device() {
    let link = LoopbackLink::new("loop0");
    let session = attached(&link);
    let receiver = Receiver::start(session.clone());
    let store = store_with(Mode::Aoo, ParameterSet::nominal());

    let result = ProgrammingRequest::new(&session).program_and_confirm(&store, "alice").await;
    assert!(matches!(result, Err(PacerError::EchoTimeout(_))));
    assert!(session.is_connected());
    assert_eq!(session.state(), LinkState::Idle);
    receiver.stop().await;
}

#[test]
fn test_program_from_console_file() {
    let path = std::env::temp_dir().join(format!("pacelink-store-{}.json", std::process::id()));
    std::fs::write(
        &path,
        r#"{
            "parameters": { "bob": { "default": {
                "Lower Rate Limit": "50", "Upper Rate Limit": "110",
                "Ventricular Amplitude": "4.0", "Ventricular Pulse Width": "0.5",
                "Atrial Amplitude": "4.0", "Atrial Pulse Width": "0.5",
                "VRP": "300", "ARP": "250"
            } } },
            "states": { "bob": "VOO" }
        }"#,
    )
    .unwrap();
    let store = JsonStore::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let link = LoopbackLink::new("loop0");
    let session = attached(&link);
    let frame = ProgrammingRequest::new(&session).program(&store, "bob").unwrap();
    // VOO, LRL 50, URL 110; atrial fields are not part of VOO
    assert_eq!(&frame[2..5], &[2, 50, 110]);
    assert_eq!(&frame[5..9], &[0, 0, 0, 0]);
    assert_eq!(f32::from_le_bytes(frame[17..21].try_into().unwrap()), 4.0);
}

#[test]
fn test_missing_store_file() {
    assert!(matches!(
        JsonStore::load("/nonexistent/pacemaker_data.json"),
        Err(PacerError::Store(_))
    ));
}
