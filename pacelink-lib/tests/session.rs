//! Link session tests against an in-memory loopback link

mod common;

use common::*;
use std::time::Duration;

#[test]
fn test_send_without_link() {
    let session = Session::new(fast_config());
    assert_eq!(session.state(), LinkState::Disconnected);
    assert!(matches!(
        session.send(Mode::Aai, &aai_parameters()),
        Err(PacerError::NotConnected)
    ));
    assert!(matches!(session.receive_step(), Err(PacerError::NotConnected)));
}

#[test]
fn test_send_writes_one_frame() {
    let link = LoopbackLink::new("loop0");
    let session = attached(&link);
    assert_eq!(session.state(), LinkState::Idle);
    assert_eq!(session.port_name().as_deref(), Some("loop0"));

    // stale bytes from before the send must not be mistaken for the answer
    link.device_sends(&[0x16, 0x01, 0x03]);
    let sent = session.send(Mode::Aai, &aai_parameters()).unwrap();

    let written = link.written();
    assert_eq!(written.len(), 42);
    assert_eq!(written, sent.frame.to_vec());
    assert_eq!(&written[..5], &[0x16, 0x01, 3, 60, 120]);
    assert_eq!(f32::from_le_bytes(written[5..9].try_into().unwrap()), 3.5);
    assert_eq!(link.clears(), 1);
    assert_eq!(link.pending_inbound(), 0);
    assert_eq!(session.state(), LinkState::AwaitingEcho { mode: Mode::Aai });
}

#[tokio::test]
async fn test_echo_completes_send() {
    let link = LoopbackLink::echoing("loop0");
    let session = attached(&link);

    let sent = session.send(Mode::Aai, &aai_parameters()).unwrap();
    let frame = sent.frame.clone();
    let report = session.receive_step().unwrap();
    assert_eq!(report.bytes_read, 42);
    assert_eq!(report.echoes, 1);
    assert_eq!(session.state(), LinkState::Idle);

    let echo = session.await_echo(sent).await.unwrap();
    assert_eq!(echo.mode(), Some(Mode::Aai));
    assert!(echo.confirms(&frame));
    assert_eq!(echo.parameters.number(Parameter::UpperRateLimit), Some(120.0));
}

#[tokio::test]
async fn test_echo_timeout_keeps_link_open() {
    let link = LoopbackLink::new("loop0");
    let session = attached(&link);

    let sent = session.send(Mode::Voo, &ParameterSet::nominal()).unwrap();
    let result = session.await_echo(sent).await;
    assert!(matches!(result, Err(PacerError::EchoTimeout(d)) if d == Duration::from_millis(150)));
    assert_eq!(session.state(), LinkState::Idle);
    assert!(session.is_connected());
}

#[test]
fn test_receive_step_expires_stale_echo() {
    let link = LoopbackLink::new("loop0");
    let session = attached(&link);

    session.send(Mode::Voo, &ParameterSet::nominal()).unwrap();
    assert!(!session.receive_step().unwrap().echo_timed_out);
    std::thread::sleep(Duration::from_millis(200));
    assert!(session.receive_step().unwrap().echo_timed_out);
    assert_eq!(session.state(), LinkState::Idle);
}

#[test]
fn test_echo_for_other_mode_is_ignored() {
    let link = LoopbackLink::new("loop0");
    let session = attached(&link);

    session.send(Mode::Aai, &aai_parameters()).unwrap();
    link.device_sends(&frame::encode(Mode::Vvi, &ParameterSet::nominal()));
    let report = session.receive_step().unwrap();
    assert_eq!(report.frames, 1);
    assert_eq!(report.echoes, 0);
    assert_eq!(session.state(), LinkState::AwaitingEcho { mode: Mode::Aai });
}

#[test]
fn test_telemetry_reaches_sink() {
    let link = LoopbackLink::new("loop0");
    let session = attached(&link);
    let sink = session.sink();

    let t = telemetry_bytes(1.25, -0.5);
    link.device_sends(&[0x00, 0x16]);
    link.device_sends(&t[..30]);
    let report = session.receive_step().unwrap();
    assert_eq!(report.samples, 0);
    assert_eq!(report.discarded, 2);
    assert!(sink.is_empty());

    link.device_sends(&t[30..]);
    link.device_sends(&telemetry_bytes(2.0, 3.0));
    let report = session.receive_step().unwrap();
    assert_eq!(report.samples, 2);
    assert_eq!(report.discarded, 0);
    assert_eq!(
        sink.drain_all(),
        vec![
            Sample {
                atrial: 1.25,
                ventricular: -0.5
            },
            Sample {
                atrial: 2.0,
                ventricular: 3.0
            },
        ]
    );
}

#[test]
fn test_sink_overflow_through_session() {
    let link = LoopbackLink::new("loop0");
    let session = attached(&link);

    for i in 0..20 {
        link.device_sends(&telemetry_bytes(i as f32, 0.0));
    }
    session.receive_step().unwrap();
    let sink = session.sink();
    assert_eq!(sink.len(), 16);
    assert_eq!(sink.overwritten(), 4);
    assert_eq!(sink.peek_latest().map(|s| s.atrial), Some(19.0));
}

#[test]
fn test_io_failure_resets_to_disconnected() {
    let link = LoopbackLink::new("loop0");
    let session = attached(&link);

    link.unplug();
    let err = session.receive_step().unwrap_err();
    assert!(err.is_link_failure());
    assert_eq!(session.state(), LinkState::Disconnected);
    assert_eq!(session.port_name(), None);
    assert!(matches!(session.receive_step(), Err(PacerError::NotConnected)));
}

#[test]
fn test_write_failure_resets_to_disconnected() {
    let link = LoopbackLink::new("loop0");
    let session = attached(&link);

    link.unplug();
    assert!(matches!(
        session.send(Mode::Aoo, &ParameterSet::nominal()),
        Err(PacerError::PortIo(_))
    ));
    assert!(!session.is_connected());
}

#[test]
fn test_disconnect_is_idempotent() {
    let link = LoopbackLink::new("loop0");
    let session = attached(&link);
    session.disconnect();
    session.disconnect();
    assert_eq!(session.state(), LinkState::Disconnected);
}

#[test]
fn test_presence() {
    let port = PortInfo {
        name: "/dev/ttyACM0".to_string(),
        port_type: "USB".to_string(),
        vid: Some(0x1366),
        pid: Some(0x1015),
        serial_number: Some("000621000000".to_string()),
        manufacturer: Some("SEGGER".to_string()),
        product: Some("J-Link".to_string()),
    };
    let link = LoopbackLink::new("/dev/ttyACM0");
    let session = Session::new(fast_config());

    assert_eq!(session.presence_among(&[]), Presence::Absent);
    assert_eq!(
        session.presence_among(std::slice::from_ref(&port)),
        Presence::Available(port.clone())
    );

    session.attach(link.boxed(), Some(port.clone()));
    assert_eq!(session.presence_among(std::slice::from_ref(&port)), Presence::Present);
    assert_eq!(
        session.presence_among(&[PortInfo::named("/dev/ttyS0")]),
        Presence::Lost(port)
    );
    assert_eq!(session.state(), LinkState::Disconnected);
}

#[test]
fn test_clones_share_the_link() {
    let link = LoopbackLink::new("loop0");
    let session = attached(&link);
    let other = session.clone();

    link.device_sends(&telemetry_bytes(7.0, 8.0));
    other.receive_step().unwrap();
    assert_eq!(session.sink().len(), 1);
    other.disconnect();
    assert!(!session.is_connected());
}
