// Command loop scenarios over in-memory streams
//
// Time is paused, so the 1.5 s motion window and the 5 s retry delay are
// checked without actually waiting.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pi_car_client::config::ClientConfig;
use pi_car_client::motor::{LinePattern, MockLines, MotionActuator};
use pi_car_client::runtime::{CommandLoop, Connector, Exit};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};
use tokio::time::{Instant, sleep};

/// Hands out queued connection results, refusing once the queue is empty
#[derive(Default)]
struct ScriptedConnector {
    script: VecDeque<io::Result<DuplexStream>>,
    attempts: Arc<Mutex<Vec<(SocketAddr, Instant)>>>,
}

impl ScriptedConnector {
    fn refuse(&mut self) {
        self.script
            .push_back(Err(io::ErrorKind::ConnectionRefused.into()));
    }

    /// Queue a successful connection and return the server end
    fn accept(&mut self) -> DuplexStream {
        let (client, server) = duplex(64);
        self.script.push_back(Ok(client));
        server
    }
}

impl Connector for ScriptedConnector {
    type Stream = DuplexStream;

    async fn connect(&mut self, addr: SocketAddr) -> io::Result<DuplexStream> {
        self.attempts.lock().unwrap().push((addr, Instant::now()));
        self.script
            .pop_front()
            .unwrap_or_else(|| Err(io::ErrorKind::ConnectionRefused.into()))
    }
}

struct Harness {
    command_loop: CommandLoop<MockLines, ScriptedConnector>,
    lines: MockLines,
    attempts: Arc<Mutex<Vec<(SocketAddr, Instant)>>>,
}

fn harness(connector: ScriptedConnector) -> Harness {
    let lines = MockLines::new();
    let actuator = MotionActuator::new(lines.clone()).unwrap();
    let attempts = connector.attempts.clone();
    Harness {
        command_loop: CommandLoop::new(ClientConfig::default(), actuator, connector),
        lines,
        attempts,
    }
}

/// Paused time lands on timer deadlines, allow for millisecond rounding
fn assert_elapsed(start: Instant, expected: Duration) {
    let elapsed = start.elapsed();
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_millis(5),
        "expected {:?}, got {:?}",
        expected,
        elapsed
    );
}

async fn assert_closed(server: &mut DuplexStream) {
    let mut buf = [0u8; 8];
    assert_eq!(server.read(&mut buf).await.unwrap(), 0, "connection still open");
}

#[tokio::test(start_paused = true)]
async fn test_forward_then_auto_stop() {
    let mut connector = ScriptedConnector::default();
    let mut server = connector.accept();
    let mut h = harness(connector);
    assert_eq!(h.lines.current(), LinePattern::STOP);

    h.command_loop.step().await;
    assert!(h.command_loop.is_connected());

    server.write_all(b"f").await.unwrap();
    let start = Instant::now();
    let observer = h.lines.clone();
    let sample = async {
        sleep(Duration::from_millis(1400)).await;
        observer.current()
    };

    let (exit, during) = tokio::join!(h.command_loop.step(), sample);
    assert_eq!(exit, None);
    assert_eq!(during, LinePattern::FORWARD);
    assert_eq!(h.lines.current(), LinePattern::STOP);
    assert_elapsed(start, Duration::from_millis(1500));
    assert!(h.command_loop.is_connected());
    assert_eq!(
        h.lines.history(),
        vec![LinePattern::STOP, LinePattern::FORWARD, LinePattern::STOP]
    );
}

#[tokio::test(start_paused = true)]
async fn test_commands_run_in_arrival_order() {
    let mut connector = ScriptedConnector::default();
    let mut server = connector.accept();
    let mut h = harness(connector);
    h.command_loop.step().await;

    for (byte, pattern) in [
        (b"b", LinePattern::BACKWARD),
        (b"l", LinePattern::TURN_LEFT),
        (b"r", LinePattern::TURN_RIGHT),
    ] {
        server.write_all(byte).await.unwrap();
        h.command_loop.step().await;
        let history = h.lines.history();
        assert_eq!(history[history.len() - 2], pattern);
        assert_eq!(history[history.len() - 1], LinePattern::STOP);
    }
}

#[tokio::test(start_paused = true)]
async fn test_refused_retries_every_five_seconds() {
    let mut connector = ScriptedConnector::default();
    for _ in 0..4 {
        connector.refuse();
    }
    let _server = connector.accept();
    let mut h = harness(connector);
    let start = Instant::now();

    for _ in 0..4 {
        assert_eq!(h.command_loop.step().await, None);
        assert!(!h.command_loop.is_connected());
    }
    h.command_loop.step().await;
    assert!(h.command_loop.is_connected());

    let attempts = h.attempts.lock().unwrap().clone();
    assert_eq!(attempts.len(), 5);
    for (i, (addr, at)) in attempts.iter().enumerate() {
        assert_eq!(*addr, ClientConfig::default().server);
        let offset = *at - start;
        let expected = Duration::from_secs(5 * i as u64);
        assert!(offset >= expected && offset < expected + Duration::from_millis(5));
    }
    assert_eq!(h.command_loop.connect_attempts(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_quit_releases_and_terminates() {
    let mut connector = ScriptedConnector::default();
    let mut server = connector.accept();
    let _spare = connector.accept();
    let mut h = harness(connector);

    server.write_all(b"q").await.unwrap();
    let exit = h.command_loop.run().await;

    assert_eq!(exit, Exit::Quit);
    assert_eq!(h.command_loop.exit(), Some(Exit::Quit));
    assert!(h.lines.is_released());
    assert_eq!(h.lines.current(), LinePattern::STOP);
    assert_closed(&mut server).await;

    // No reconnect after quit
    assert_eq!(h.command_loop.step().await, Some(Exit::Quit));
    assert_eq!(h.attempts.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_peer_close_reconnects_immediately() {
    let mut connector = ScriptedConnector::default();
    let server = connector.accept();
    let _second = connector.accept();
    let mut h = harness(connector);

    h.command_loop.step().await;
    drop(server);
    let start = Instant::now();

    h.command_loop.step().await;
    assert!(!h.command_loop.is_connected());
    h.command_loop.step().await;
    assert!(h.command_loop.is_connected());

    assert_elapsed(start, Duration::ZERO);
    let attempts = h.attempts.lock().unwrap().clone();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].0, attempts[1].0);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_utf8_drops_connection_and_backs_off() {
    let mut connector = ScriptedConnector::default();
    let mut server = connector.accept();
    let mut h = harness(connector);
    h.command_loop.step().await;

    server.write_all(&[0xff, 0xfe]).await.unwrap();
    let start = Instant::now();
    h.command_loop.step().await;

    assert!(!h.command_loop.is_connected());
    assert_elapsed(start, Duration::from_secs(5));
    assert_closed(&mut server).await;
    // Stop is re-sent before backing off
    assert_eq!(h.lines.history(), vec![LinePattern::STOP, LinePattern::STOP]);
}

#[tokio::test(start_paused = true)]
async fn test_coalesced_commands_are_ignored() {
    let mut connector = ScriptedConnector::default();
    let mut server = connector.accept();
    let mut h = harness(connector);
    h.command_loop.step().await;

    server.write_all(b"ff").await.unwrap();
    let start = Instant::now();
    h.command_loop.step().await;

    // Nothing driven, but the window and the stop still run
    assert_elapsed(start, Duration::from_millis(1500));
    assert_eq!(h.lines.history(), vec![LinePattern::STOP, LinePattern::STOP]);
    assert!(h.command_loop.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_actuator_failure_backs_off() {
    let mut connector = ScriptedConnector::default();
    let mut server = connector.accept();
    let mut h = harness(connector);
    h.command_loop.step().await;

    h.lines.set_fail_writes(true);
    server.write_all(b"f").await.unwrap();
    let start = Instant::now();
    h.command_loop.step().await;

    assert!(!h.command_loop.is_connected());
    assert_elapsed(start, Duration::from_secs(5));
    assert_closed(&mut server).await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_auto_stop_is_retried_during_backoff() {
    let mut connector = ScriptedConnector::default();
    let mut server = connector.accept();
    let mut h = harness(connector);
    h.command_loop.step().await;

    server.write_all(b"f").await.unwrap();
    let start = Instant::now();

    // Writes fail from 1.0 s to 1.6 s, which swallows the auto-stop at 1.5 s
    let lines = h.lines.clone();
    let glitch = async {
        sleep(Duration::from_millis(1000)).await;
        lines.set_fail_writes(true);
        sleep(Duration::from_millis(600)).await;
        lines.set_fail_writes(false);
    };
    let observer = h.lines.clone();
    let sample = async {
        sleep(Duration::from_millis(5600)).await;
        observer.current()
    };

    let (exit, (), during_backoff) = tokio::join!(h.command_loop.step(), glitch, sample);
    assert_eq!(exit, None);
    assert_eq!(during_backoff, LinePattern::STOP);
    assert!(!h.command_loop.is_connected());
    assert_elapsed(start, Duration::from_millis(6500));
    assert_closed(&mut server).await;
    assert_eq!(
        h.lines.history(),
        vec![LinePattern::STOP, LinePattern::FORWARD, LinePattern::STOP]
    );
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_while_connected() {
    let mut connector = ScriptedConnector::default();
    let mut server = connector.accept();
    let mut h = harness(connector);

    server.write_all(b"f").await.unwrap();
    let exit = h
        .command_loop
        .run_until(sleep(Duration::from_millis(700)))
        .await;

    // Interrupted mid-window: forward was active, teardown stopped it
    assert_eq!(exit, Exit::Interrupted);
    assert!(h.lines.is_released());
    assert_eq!(
        h.lines.history(),
        vec![LinePattern::STOP, LinePattern::FORWARD, LinePattern::STOP]
    );
    assert_closed(&mut server).await;
}
