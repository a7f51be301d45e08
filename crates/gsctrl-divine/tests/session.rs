//! Session behaviour driven through the mock transport factory.
//!
//! All tests run on paused time, so watchdog and poll timers fire as soon as
//! every task is idle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{Instant, sleep};

use gsctrl_core::{
    ConnectionStatus, ControllerId, DeviceEvent, Error, Feedback, Transport, VariableValue,
};
use gsctrl_divine::codec::{self, Request};
use gsctrl_divine::state::{Indicator, Level};
use gsctrl_divine::{DeviceConfig, DeviceState, DivineBuilder, DivineSession};
use gsctrl_test_harness::{MockConnection, MockTransportFactory, frames};

const RESYNC: [u8; 4] = [0, 0, 0, 0];
const RECOVERY: [u8; 6] = [0x00, 0x10, 0, 0, 0, 0];

fn frame(request: Request) -> Vec<u8> {
    codec::encode(&request, &ControllerId::default(), false).unwrap()
}

fn start_with(builder: DivineBuilder) -> (DivineSession, Arc<MockTransportFactory>, MockConnection) {
    let factory = Arc::new(MockTransportFactory::new());
    let session = builder
        .host("10.0.0.5")
        .build_with_factory(factory.clone())
        .unwrap();
    let conn = factory.last().unwrap();
    (session, factory, conn)
}

fn start() -> (DivineSession, Arc<MockTransportFactory>, MockConnection) {
    start_with(DivineBuilder::new())
}

fn drain(events: &mut broadcast::Receiver<DeviceEvent>) -> Vec<DeviceEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

fn feedbacks(events: &[DeviceEvent]) -> Vec<Vec<Feedback>> {
    events
        .iter()
        .filter_map(|event| match event {
            DeviceEvent::FeedbacksChanged(f) => Some(f.clone()),
            _ => None,
        })
        .collect()
}

fn statuses(events: &[DeviceEvent]) -> Vec<ConnectionStatus> {
    events
        .iter()
        .filter_map(|event| match event {
            DeviceEvent::StatusChanged { status, .. } => Some(*status),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Startup and polling
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn opens_configured_address() {
    let (session, factory, conn) = start();
    assert_eq!(factory.open_count(), 1);
    assert_eq!(conn.host, "10.0.0.5");
    assert_eq!(conn.port, 41161);
    assert_eq!(
        session.status().await.unwrap(),
        (ConnectionStatus::Connecting, None)
    );
}

#[tokio::test(start_paused = true)]
async fn listening_sends_get_info_then_polls_config() {
    let (_session, _factory, conn) = start();
    let start = Instant::now();

    conn.listening().await;
    conn.transport.wait_sent(1).await;
    assert_eq!(conn.transport.sent_data()[0], frame(Request::GetInfo));

    conn.transport.wait_sent(2).await;
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6));
    assert_eq!(conn.transport.sent_data()[1], frame(Request::GetConfig));
}

#[tokio::test(start_paused = true)]
async fn poll_skipped_when_transport_destroyed() {
    let (_session, _factory, conn) = start();
    conn.listening().await;
    conn.transport.wait_sent(1).await;

    conn.transport.destroy();
    sleep(Duration::from_secs(6)).await;
    assert_eq!(conn.transport.sent_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn fast_meters_changes_request_flags() {
    let (_session, _factory, conn) = start_with(DivineBuilder::new().fast_meters(true));
    conn.listening().await;
    conn.transport.wait_sent(2).await;

    let sent = conn.transport.sent_data();
    assert_eq!(sent[0][11], 0x00);
    assert_eq!(sent[1][10], 0x07);
    assert_eq!(sent[1][11], 0x01);
}

// ---------------------------------------------------------------------------
// Status transitions
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn transport_ok_requests_resync_once() {
    let (session, _factory, conn) = start();
    let mut events = session.subscribe();

    conn.status(ConnectionStatus::Ok, None).await;
    conn.transport.wait_sent(1).await;
    assert_eq!(
        conn.transport.sent_data()[0],
        frame(Request::GetReport(RESYNC.to_vec()))
    );

    // A repeated status is a no-op.
    conn.status(ConnectionStatus::Ok, None).await;
    sleep(Duration::from_secs(1)).await;
    assert_eq!(conn.transport.sent_count(), 1);
    assert_eq!(statuses(&drain(&mut events)), vec![ConnectionStatus::Ok]);
}

#[tokio::test(start_paused = true)]
async fn transport_failure_is_adopted_verbatim() {
    let (session, _factory, conn) = start();
    conn.status(ConnectionStatus::ConnectionFailure, Some("host unreachable"))
        .await;
    assert_eq!(
        session.status().await.unwrap(),
        (
            ConnectionStatus::ConnectionFailure,
            Some("host unreachable".to_string())
        )
    );
    assert_eq!(conn.transport.sent_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn transport_error_leaves_status_alone() {
    let (session, _factory, conn) = start();
    let mut events = session.subscribe();
    conn.error("connection refused").await;
    assert_eq!(
        session.status().await.unwrap(),
        (ConnectionStatus::Connecting, None)
    );
    assert!(drain(&mut events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn first_data_promotes_to_ok_and_requests_report() {
    let (session, _factory, conn) = start();
    conn.listening().await;
    conn.transport.wait_sent(1).await;

    conn.data(&frames::CAPTURED_STATUS_REPORT).await;
    conn.transport.wait_sent(2).await;
    assert_eq!(
        conn.transport.sent_data()[1],
        frame(Request::GetReport(RECOVERY.to_vec()))
    );
    assert_eq!(session.status().await.unwrap().0, ConnectionStatus::Ok);

    // Already ok: no further report request.
    conn.data(&frames::CAPTURED_STATUS_REPORT).await;
    sleep(Duration::from_secs(1)).await;
    assert_eq!(conn.transport.sent_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn watchdog_fails_exactly_once() {
    let (session, _factory, conn) = start();
    conn.listening().await;
    conn.data(&frames::CAPTURED_STATUS_REPORT).await;
    assert_eq!(session.status().await.unwrap().0, ConnectionStatus::Ok);
    let mut events = session.subscribe();

    sleep(Duration::from_secs(11)).await;
    assert_eq!(
        session.status().await.unwrap(),
        (
            ConnectionStatus::ConnectionFailure,
            Some("No data for 10 seconds".to_string())
        )
    );

    sleep(Duration::from_secs(60)).await;
    assert_eq!(
        statuses(&drain(&mut events)),
        vec![ConnectionStatus::ConnectionFailure]
    );
}

#[tokio::test(start_paused = true)]
async fn data_recovers_from_watchdog_failure() {
    let (session, _factory, conn) = start_with(DivineBuilder::new().data_timeout(Duration::from_secs(2)));
    conn.listening().await;
    sleep(Duration::from_secs(3)).await;
    assert_eq!(
        session.status().await.unwrap(),
        (
            ConnectionStatus::ConnectionFailure,
            Some("No data for 2 seconds".to_string())
        )
    );

    let before = conn.transport.sent_count();
    conn.data(&frames::CAPTURED_DIVINE_REPORT).await;
    assert_eq!(session.status().await.unwrap(), (ConnectionStatus::Ok, None));
    conn.transport.wait_sent(before + 1).await;
    assert_eq!(
        conn.transport.sent_data()[before],
        frame(Request::GetReport(RECOVERY.to_vec()))
    );
}

#[tokio::test(start_paused = true)]
async fn unrecognized_data_rearms_watchdog() {
    let (session, _factory, conn) = start();
    conn.listening().await;

    sleep(Duration::from_secs(8)).await;
    conn.data(&[0x47, 0x53, 0x20]).await;
    assert_eq!(session.status().await.unwrap().0, ConnectionStatus::Ok);

    sleep(Duration::from_secs(7)).await;
    assert_eq!(session.status().await.unwrap().0, ConnectionStatus::Ok);

    sleep(Duration::from_secs(4)).await;
    assert_eq!(
        session.status().await.unwrap().0,
        ConnectionStatus::ConnectionFailure
    );
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn status_report_updates_state_and_feedbacks() {
    let (session, _factory, conn) = start();
    let mut events = session.subscribe();
    conn.listening().await;

    conn.data(&frames::status_frame([0; 8], 10, 64, 0)).await;
    let state = session.state().await.unwrap();
    assert_eq!(state.indicator(Indicator::PotPosition), Some(10.0));
    assert_eq!(state.indicator(Indicator::Volume), Some(64.0));
    assert_eq!(state.indicator(Indicator::Temperature), Some(44.0));

    let first = drain(&mut events);
    assert_eq!(
        feedbacks(&first),
        vec![vec![Feedback::Meter, Feedback::Indicator]]
    );
    let variables = first
        .iter()
        .find_map(|event| match event {
            DeviceEvent::VariablesUpdated(vars) => Some(vars.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(variables["volume_dB"], VariableValue::Number(-31.5));
    assert_eq!(variables["temp"], VariableValue::Number(44.0));
    assert_eq!(variables["potPosition"], VariableValue::Number(10.0));

    let mut levels = [0; 8];
    levels[0] = 6;
    conn.data(&frames::status_frame(levels, 10, 64, 0)).await;
    let state = session.state().await.unwrap();
    assert_eq!(state.level(Level::Input1), Some(-3.0));
    assert_eq!(feedbacks(&drain(&mut events)), vec![vec![Feedback::Meter]]);
}

#[tokio::test(start_paused = true)]
async fn info_report_publishes_identity() {
    let (session, _factory, conn) = start();
    let mut events = session.subscribe();
    conn.data(&frames::CAPTURED_INFO_REPORT).await;

    let state = session.state().await.unwrap();
    let identity = state.identity.unwrap();
    assert_eq!(identity.host_name, "DIV-01-91e980");

    let published = drain(&mut events);
    assert!(published.iter().any(|event| matches!(
        event,
        DeviceEvent::VariablesUpdated(vars)
            if vars.get("friendlyName") == Some(&VariableValue::from("Divine-Marcin"))
    )));
}

#[tokio::test(start_paused = true)]
async fn config_report_publishes_nothing() {
    let (session, _factory, conn) = start();
    conn.status(ConnectionStatus::Ok, None).await;
    assert_eq!(session.status().await.unwrap().0, ConnectionStatus::Ok);
    let mut events = session.subscribe();

    conn.data(&frames::config_frame(0x0D, 1, [0x91, 0xE9, 0x80], [10, 0, 0, 1], 41161))
        .await;
    assert_eq!(session.state().await.unwrap(), DeviceState::default());
    assert!(drain(&mut events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn mix_selection_publishing() {
    let (session, _factory, conn) = start();
    conn.status(ConnectionStatus::Ok, None).await;
    let mut events = session.subscribe();

    conn.data(&frames::CAPTURED_DIVINE_REPORT).await;
    conn.data(&frames::CAPTURED_DIVINE_REPORT).await;
    conn.data(&frames::CAPTURED_FULL_REPORT).await;
    conn.data(&frames::composite_frame(4, 2)).await;
    conn.data(&frames::composite_frame(4, 2)).await;
    conn.data(&frames::divine_frame(2)).await;
    assert_eq!(session.state().await.unwrap().mix_select(), Some(2));

    let labels: Vec<VariableValue> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            DeviceEvent::VariablesUpdated(mut vars) => vars.remove("mixSelectLabel"),
            _ => None,
        })
        .collect();
    // Repeated divine reports are suppressed; short and composite are not.
    assert_eq!(
        labels,
        vec![
            VariableValue::from("Channels 1-4"),
            VariableValue::from("Channels 1-4"),
            VariableValue::from("Channel 2"),
            VariableValue::from("Channel 2"),
        ]
    );
}

// ---------------------------------------------------------------------------
// Sending
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn invalid_controller_id_blocks_all_sends() {
    let (session, _factory, conn) = start_with(DivineBuilder::new().controller_id("1234567"));
    conn.listening().await;
    conn.data(&frames::CAPTURED_STATUS_REPORT).await;
    session.send_control(&[0x01]).await.unwrap();

    sleep(Duration::from_secs(6)).await;
    assert_eq!(conn.transport.sent_count(), 0);
    // Receiving still works.
    assert_eq!(session.status().await.unwrap().0, ConnectionStatus::Ok);
}

#[tokio::test(start_paused = true)]
async fn send_control_encodes_set_control() {
    let (session, _factory, conn) = start();
    session.send_control(&[0xAA, 0xBB]).await.unwrap();
    conn.transport.wait_sent(1).await;

    let sent = conn.transport.sent_data();
    assert_eq!(sent[0], frame(Request::SetControl(vec![0xAA, 0xBB])));
    assert_eq!(sent[0][8], 18);
}

#[tokio::test(start_paused = true)]
async fn send_control_rejects_oversized_payload() {
    let (session, _factory, _conn) = start();
    let result = session.send_control(&[0; 240]).await;
    assert!(matches!(result, Err(Error::InvalidParameter(_))));
}

#[tokio::test(start_paused = true)]
async fn sends_are_spaced_by_queue_interval() {
    let (session, _factory, conn) =
        start_with(DivineBuilder::new().queue_interval(Duration::from_millis(100)));
    let start = Instant::now();
    for n in 0..3 {
        session.send_control(&[n]).await.unwrap();
    }
    conn.transport.wait_sent(3).await;
    assert!(start.elapsed() >= Duration::from_millis(200));

    let payloads: Vec<u8> = conn.transport.sent_data().iter().map(|f| f[16]).collect();
    assert_eq!(payloads, vec![0, 1, 2]);
}

#[tokio::test(start_paused = true)]
async fn destroyed_transport_drops_queued_sends() {
    let (session, factory, conn) = start();
    conn.transport.destroy();

    session.send_control(&[0x01]).await.unwrap();
    session.send_control(&[0x02]).await.unwrap();
    assert_eq!(conn.transport.sent_count(), 0);

    // The queue keeps running once a live transport is back.
    let config = DeviceConfig {
        host: Some("10.0.0.6".into()),
        ..DeviceConfig::default()
    };
    session.reconfigure(config).await.unwrap();
    let second = factory.last().unwrap();
    second.transport.wait_sent(1).await;
    session.send_control(&[0x03]).await.unwrap();
    second.transport.wait_sent(2).await;
    assert_eq!(
        second.transport.sent_data(),
        vec![frame(Request::GetInfo), frame(Request::SetControl(vec![0x03]))]
    );
    assert_eq!(conn.transport.sent_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_sends_are_not_retried() {
    let (session, _factory, conn) = start();
    conn.transport.set_fail_sends(true);
    conn.listening().await;
    sleep(Duration::from_millis(50)).await;
    conn.transport.set_fail_sends(false);

    session.send_control(&[0x01]).await.unwrap();
    conn.transport.wait_sent(1).await;
    assert_eq!(
        conn.transport.sent_data(),
        vec![frame(Request::SetControl(vec![0x01]))]
    );
}

// ---------------------------------------------------------------------------
// Reconfiguration and teardown
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn reconfigure_same_address_keeps_transport() {
    let (session, factory, conn) =
        start_with(DivineBuilder::new().queue_interval(Duration::from_millis(100)));
    conn.listening().await;
    conn.transport.wait_sent(1).await;

    // Queues a report request behind the 100ms spacing.
    conn.data(&frames::CAPTURED_DIVINE_REPORT).await;
    assert_eq!(session.state().await.unwrap().mix_select(), Some(7));

    let config = DeviceConfig {
        host: Some("10.0.0.5".into()),
        controller_id: "0A0B0C0D".into(),
        ..DeviceConfig::default()
    };
    session.reconfigure(config).await.unwrap();
    assert_eq!(factory.open_count(), 1);
    assert_eq!(session.state().await.unwrap(), DeviceState::default());

    conn.transport.wait_sent(2).await;
    sleep(Duration::from_secs(1)).await;
    let sent = conn.transport.sent_data();
    assert_eq!(sent.len(), 2, "pending report request should be dropped");
    assert_eq!(sent[1][10], 0x05);
    assert_eq!(&sent[1][12..16], &[0x0A, 0x0B, 0x0C, 0x0D]);
}

#[tokio::test(start_paused = true)]
async fn reconfigure_new_port_reconnects() {
    let (session, factory, first) = start();
    first.listening().await;
    first.data(&frames::CAPTURED_INFO_REPORT).await;
    assert!(session.state().await.unwrap().identity.is_some());

    let config = DeviceConfig {
        host: Some("10.0.0.5".into()),
        port: 5000,
        ..DeviceConfig::default()
    };
    session.reconfigure(config).await.unwrap();

    assert_eq!(factory.open_count(), 2);
    assert!(first.transport.is_destroyed());
    assert!(session.state().await.unwrap().identity.is_none());

    let second = factory.last().unwrap();
    assert_eq!(second.port, 5000);
    second.transport.wait_sent(1).await;
    assert_eq!(second.transport.sent_data()[0], frame(Request::GetInfo));

    // The old transport's events no longer reach the session.
    assert!(!first.data(&frames::CAPTURED_INFO_REPORT).await);
}

#[tokio::test(start_paused = true)]
async fn reconnect_resets_status_to_connecting() {
    let (session, factory, first) = start();
    first.listening().await;
    first.data(&frames::CAPTURED_STATUS_REPORT).await;
    assert_eq!(session.status().await.unwrap().0, ConnectionStatus::Ok);
    let mut events = session.subscribe();

    let config = DeviceConfig {
        host: Some("10.0.0.8".into()),
        ..DeviceConfig::default()
    };
    session.reconfigure(config).await.unwrap();
    assert_eq!(factory.open_count(), 2);
    assert_eq!(
        session.status().await.unwrap(),
        (ConnectionStatus::Connecting, None)
    );
    assert_eq!(statuses(&drain(&mut events)), vec![ConnectionStatus::Connecting]);
}

#[tokio::test(start_paused = true)]
async fn no_host_stays_idle_until_configured() {
    let factory = Arc::new(MockTransportFactory::new());
    let session = DivineBuilder::new()
        .build_with_factory(factory.clone())
        .unwrap();
    sleep(Duration::from_secs(30)).await;
    assert_eq!(factory.open_count(), 0);
    assert_eq!(
        session.status().await.unwrap(),
        (ConnectionStatus::Connecting, None)
    );

    let config = DeviceConfig {
        host: Some("10.0.0.7".into()),
        ..DeviceConfig::default()
    };
    session.reconfigure(config).await.unwrap();
    assert_eq!(factory.open_count(), 1);
    assert_eq!(factory.last().unwrap().host, "10.0.0.7");
}

#[tokio::test(start_paused = true)]
async fn open_failure_reports_connection_failure() {
    let factory = Arc::new(MockTransportFactory::new());
    factory.set_fail_opens(true);
    let session = DivineBuilder::new()
        .host("10.0.0.5")
        .build_with_factory(factory.clone())
        .unwrap();

    let (status, message) = session.status().await.unwrap();
    assert_eq!(status, ConnectionStatus::ConnectionFailure);
    assert!(message.unwrap().contains("refused"));
}

#[tokio::test(start_paused = true)]
async fn shutdown_destroys_transport() {
    let (session, _factory, conn) = start();
    conn.listening().await;
    session.shutdown().await.unwrap();
    assert!(conn.transport.is_destroyed());
}

#[tokio::test(start_paused = true)]
async fn dropping_handle_stops_session() {
    let (session, _factory, conn) = start();
    conn.listening().await;
    conn.transport.wait_sent(1).await;

    drop(session);
    sleep(Duration::from_millis(10)).await;
    assert!(conn.transport.is_destroyed());

    sleep(Duration::from_secs(30)).await;
    assert_eq!(conn.transport.sent_count(), 1);
}
