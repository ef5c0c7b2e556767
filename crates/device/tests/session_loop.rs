//! End-to-end session behavior against an in-memory board.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use sb_device::{
    open_connection, ChannelSink, ConnectionKind, Connector, DeviceConfig, DeviceMode,
    DeviceSession, NullSink, Phase, SessionError, SmsConnection, Transport, TransportError,
};
use tokio::sync::mpsc;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fake board
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const PONG: &str = r#"{"status":"ok","message":"pong","gsm":"disconnected"}"#;

enum Inbound {
    Bytes(Vec<u8>),
    Fail,
}

/// Test-side handle to one opened port.
#[derive(Clone)]
struct Board {
    tx: mpsc::UnboundedSender<Inbound>,
    written: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl Board {
    fn push(&self, line: &str) {
        let _ = self.tx.send(Inbound::Bytes(format!("{line}\n").into_bytes()));
    }

    fn push_raw(&self, bytes: &[u8]) {
        let _ = self.tx.send(Inbound::Bytes(bytes.to_vec()));
    }

    fn unplug(&self) {
        let _ = self.tx.send(Inbound::Fail);
    }

    fn written(&self) -> Vec<String> {
        self.written.lock().clone()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct FakePort {
    endpoint: String,
    answers_ping: bool,
    board: Board,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>,
}

#[async_trait]
impl Transport for FakePort {
    async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.board.is_closed() {
            return Err(TransportError::Fatal("port closed".into()));
        }
        let mut inbound = self.inbound.lock().await;
        match tokio::time::timeout(Duration::from_millis(100), inbound.recv()).await {
            Ok(Some(Inbound::Bytes(bytes))) => {
                buf[..bytes.len()].copy_from_slice(&bytes);
                Ok(bytes.len())
            }
            Ok(Some(Inbound::Fail)) | Ok(None) => {
                Err(TransportError::Fatal("device unplugged".into()))
            }
            Err(_) => Err(TransportError::Timeout),
        }
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.board.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Fatal("write rejected".into()));
        }
        let line = String::from_utf8_lossy(bytes).trim_end().to_string();
        if self.answers_ping && line == r#"{"cmd":"ping"}"# {
            self.board.push(PONG);
        }
        self.board.written.lock().push(line);
        Ok(())
    }

    async fn close(&self) {
        self.board.closed.store(true, Ordering::SeqCst);
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

struct FakeConnector {
    endpoints: Vec<String>,
    answering: Vec<String>,
    available: AtomicBool,
    opens: AtomicUsize,
    boards: Mutex<Vec<Board>>,
}

impl FakeConnector {
    fn new(endpoints: &[&str]) -> Arc<Self> {
        Self::answering(endpoints, endpoints)
    }

    /// Only endpoints in `answering` reply to a probe ping.
    fn answering(endpoints: &[&str], answering: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            endpoints: endpoints.iter().map(|s| s.to_string()).collect(),
            answering: answering.iter().map(|s| s.to_string()).collect(),
            available: AtomicBool::new(true),
            opens: AtomicUsize::new(0),
            boards: Mutex::new(Vec::new()),
        })
    }

    fn board(&self, index: usize) -> Board {
        self.boards.lock()[index].clone()
    }

    fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    fn set_available(&self, on: bool) {
        self.available.store(on, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for FakeConnector {
    fn endpoints(&self) -> Result<Vec<String>, TransportError> {
        Ok(self.endpoints.clone())
    }

    async fn open(
        &self,
        endpoint: &str,
        warm_up: Duration,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        tokio::time::sleep(warm_up).await;
        self.opens.fetch_add(1, Ordering::SeqCst);
        if !self.available.load(Ordering::SeqCst) || !self.endpoints.iter().any(|e| e == endpoint)
        {
            return Err(TransportError::Open {
                endpoint: endpoint.into(),
                reason: "No such file or directory".into(),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let board = Board {
            tx,
            written: Arc::default(),
            closed: Arc::default(),
            fail_writes: Arc::default(),
        };
        self.boards.lock().push(board.clone());
        Ok(Arc::new(FakePort {
            endpoint: endpoint.into(),
            answers_ping: self.answering.iter().any(|e| e == endpoint),
            board,
            inbound: tokio::sync::Mutex::new(rx),
        }))
    }
}

async fn connect(connector: &Arc<FakeConnector>) -> DeviceSession {
    DeviceSession::builder()
        .endpoint("/dev/ttyACM0")
        .warm_up(Duration::ZERO)
        .connector(connector.clone())
        .sink(Arc::new(NullSink))
        .connect()
        .await
        .unwrap()
}

/// Let the read loop and any spawned task catch up.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Readiness and sending
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test(start_paused = true)]
async fn send_wakes_radio_and_waits_for_gsm() {
    let connector = FakeConnector::new(&["/dev/ttyACM0"]);
    let session = Arc::new(connect(&connector).await);
    let board = connector.board(0);

    board.push(PONG);
    settle().await;
    assert!(session.is_connected());
    assert!(!session.is_ready());

    let s = session.clone();
    let send = tokio::spawn(async move { s.send("+15550001111", "hello").await });
    settle().await;
    assert_eq!(board.written(), vec![r#"{"cmd":"wakeup"}"#]);
    assert!(!send.is_finished());

    board.push(r#"{"event":"gsm_state","gsm":"connected"}"#);
    send.await.unwrap().unwrap();

    assert!(session.is_ready());
    assert_eq!(
        board.written(),
        vec![
            r#"{"cmd":"wakeup"}"#,
            r#"{"cmd":"send","number":"+15550001111","content":"hello"}"#,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn send_fails_when_radio_never_comes_up() {
    let connector = FakeConnector::new(&["/dev/ttyACM0"]);
    let session = connect(&connector).await;
    let board = connector.board(0);

    let started = tokio::time::Instant::now();
    let err = session.send("+15550001111", "hello").await.unwrap_err();

    assert!(matches!(err, SessionError::NotReady(d) if d == Duration::from_secs(30)));
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert_eq!(board.written(), vec![r#"{"cmd":"wakeup"}"#]);
}

#[tokio::test(start_paused = true)]
async fn ready_radio_sends_without_wakeup() {
    let connector = FakeConnector::new(&["/dev/ttyACM0"]);
    let session = connect(&connector).await;
    let board = connector.board(0);

    board.push(r#"{"status":"ready","message":"SMS gateway ready","gsm":"connected"}"#);
    settle().await;

    session.send("+15550001111", "hi").await.unwrap();
    assert_eq!(
        board.written(),
        vec![r#"{"cmd":"send","number":"+15550001111","content":"hi"}"#]
    );
}

#[tokio::test(start_paused = true)]
async fn write_failure_surfaces_without_reconnect() {
    let connector = FakeConnector::new(&["/dev/ttyACM0"]);
    let session = connect(&connector).await;
    let board = connector.board(0);

    board.fail_writes.store(true, Ordering::SeqCst);
    let err = session.ping().await.unwrap_err();
    assert!(matches!(err, SessionError::Write(_)));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(session.is_connected());
    assert!(!session.is_reconnecting());
    assert_eq!(connector.opens(), 1);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Received messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test(start_paused = true)]
async fn received_messages_reach_sink_in_order() {
    let connector = FakeConnector::new(&["/dev/ttyACM0"]);
    let (sink, mut received) = ChannelSink::new();
    let session = DeviceSession::builder()
        .endpoint("/dev/ttyACM0")
        .warm_up(Duration::ZERO)
        .connector(connector.clone())
        .sink(Arc::new(sink))
        .connect()
        .await
        .unwrap();
    let board = connector.board(0);

    // Both events in one read, the second split across two.
    board.push_raw(
        concat!(
            r#"{"event":"received","number":"+1555","content":"first","timestamp":"24/01/15,10:30:00+04","gsm":"connected"}"#,
            "\n",
            r#"{"event":"received","number":"+1666","#,
        )
        .as_bytes(),
    );
    board.push_raw(b"\"content\":\"second\"}\n");

    let first = received.recv().await.unwrap();
    let second = received.recv().await.unwrap();

    assert_eq!((first.number.as_str(), first.content.as_str()), ("+1555", "first"));
    assert_eq!(first.received_at, Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap());
    assert_eq!(first.device_timestamp.as_deref(), Some("24/01/15,10:30:00+04"));
    assert_eq!((second.number.as_str(), second.content.as_str()), ("+1666", "second"));
    assert!(second.device_timestamp.is_none());
    assert!(session.is_ready());
}

#[tokio::test(start_paused = true)]
async fn out_of_range_timestamp_falls_back_to_now() {
    let connector = FakeConnector::new(&["/dev/ttyACM0"]);
    let (sink, mut received) = ChannelSink::new();
    let session = DeviceSession::builder()
        .endpoint("/dev/ttyACM0")
        .warm_up(Duration::ZERO)
        .connector(connector.clone())
        .sink(Arc::new(sink))
        .connect()
        .await
        .unwrap();
    let board = connector.board(0);

    let before = Utc::now();
    board.push(
        r#"{"event":"received","number":"+1","content":"a","timestamp":"24/01/15,10:30:00+2147483647"}"#,
    );
    board.push(r#"{"event":"received","number":"+2","content":"b","gsm":"connected"}"#);

    let first = received.recv().await.unwrap();
    let second = received.recv().await.unwrap();

    assert_eq!(first.number, "+1");
    assert!(first.received_at >= before);
    assert_eq!(first.device_timestamp.as_deref(), Some("24/01/15,10:30:00+2147483647"));
    assert_eq!(second.number, "+2");
    // The loop is still dispatching after the bad frame.
    assert!(session.is_ready());
}

#[tokio::test(start_paused = true)]
async fn garbage_lines_do_not_stop_the_loop() {
    let connector = FakeConnector::new(&["/dev/ttyACM0"]);
    let session = connect(&connector).await;
    let board = connector.board(0);

    board.push("not json at all");
    board.push(r#"{"message":"no tag"}"#);
    board.push(r#"{"event":"gsm_state","gsm":"connected"}"#);
    settle().await;

    assert!(session.is_ready());
    assert!(session.is_connected());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Link loss and reconnection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test(start_paused = true)]
async fn transport_loss_clears_readiness_and_reconnects_once() {
    let connector = FakeConnector::new(&["/dev/ttyACM0"]);
    let session = connect(&connector).await;
    let first = connector.board(0);

    first.push(r#"{"event":"gsm_state","gsm":"connected"}"#);
    settle().await;
    assert!(session.is_ready());

    connector.set_available(false);
    first.unplug();
    settle().await;

    assert_eq!(session.phase(), Phase::Disconnected);
    assert!(!session.is_ready());
    assert!(session.is_reconnecting());
    assert_eq!(connector.opens(), 2);

    // The idle read loop keeps poking the supervisor; still one run.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(connector.opens(), 2);

    let err = session.ping().await.unwrap_err();
    assert!(matches!(err, SessionError::NotConnected));

    connector.set_available(true);
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(connector.opens(), 3);
    assert!(session.is_connected());
    assert!(!session.is_reconnecting());
    assert!(first.is_closed());
    // Readiness comes back only from the board.
    assert!(!session.is_ready());

    let second = connector.board(1);
    second.push(r#"{"event":"gsm_state","gsm":"connected"}"#);
    settle().await;
    assert!(session.is_ready());
    session.ping().await.unwrap();
    assert_eq!(second.written(), vec![r#"{"cmd":"ping"}"#]);
}

#[tokio::test(start_paused = true)]
async fn no_reconnect_when_disabled() {
    let connector = FakeConnector::new(&["/dev/ttyACM0"]);
    let session = DeviceSession::builder()
        .endpoint("/dev/ttyACM0")
        .warm_up(Duration::ZERO)
        .reconnect(false)
        .connector(connector.clone())
        .connect()
        .await
        .unwrap();

    connector.board(0).unplug();
    tokio::time::sleep(Duration::from_secs(20)).await;

    assert_eq!(session.phase(), Phase::Disconnected);
    assert!(!session.is_reconnecting());
    assert_eq!(connector.opens(), 1);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shutdown
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test(start_paused = true)]
async fn close_is_idempotent() {
    let connector = FakeConnector::new(&["/dev/ttyACM0"]);
    let session = connect(&connector).await;
    let board = connector.board(0);

    session.close().await;
    session.close().await;

    assert!(board.is_closed());
    assert!(!session.is_connected());
    let err = session.send("+1555", "late").await.unwrap_err();
    assert!(matches!(err, SessionError::NotConnected));

    // Nothing tries to bring the link back.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(connector.opens(), 1);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// open_connection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn config(mode: DeviceMode) -> DeviceConfig {
    DeviceConfig {
        mode,
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn mock_mode_never_touches_the_connector() {
    let connector = FakeConnector::new(&["/dev/ttyACM0"]);
    let conn = open_connection(&config(DeviceMode::Mock), connector.clone(), Arc::new(NullSink))
        .await
        .unwrap();

    assert_eq!(conn.kind(), ConnectionKind::Mock);
    assert_eq!(connector.opens(), 0);
}

#[tokio::test(start_paused = true)]
async fn auto_mode_connects_to_discovered_endpoint() {
    let connector = FakeConnector::answering(
        &["/dev/ttyS0", "/dev/ttyUSB0", "/dev/ttyACM0"],
        &["/dev/ttyACM0"],
    );
    let conn = open_connection(&config(DeviceMode::Auto), connector.clone(), Arc::new(NullSink))
        .await
        .unwrap();

    assert_eq!(conn.kind(), ConnectionKind::Serial);
    assert_eq!(conn.endpoint().as_deref(), Some("/dev/ttyACM0"));
    // Two probes, then the session's own open.
    assert_eq!(connector.opens(), 3);
    assert!(connector.board(0).is_closed());
    assert!(connector.board(1).is_closed());
    conn.close().await;
}

#[tokio::test(start_paused = true)]
async fn auto_mode_falls_back_to_mock_when_nothing_answers() {
    let connector = FakeConnector::new(&[]);
    let conn = open_connection(&config(DeviceMode::Auto), connector, Arc::new(NullSink))
        .await
        .unwrap();
    assert_eq!(conn.kind(), ConnectionKind::Mock);
    assert!(conn.is_ready());
}

#[tokio::test(start_paused = true)]
async fn explicit_port_falls_back_to_mock_when_open_fails() {
    let connector = FakeConnector::new(&["/dev/ttyACM0"]);
    let conn = open_connection(
        &config(DeviceMode::Port("/dev/ttyUSB9".into())),
        connector.clone(),
        Arc::new(NullSink),
    )
    .await
    .unwrap();

    assert_eq!(conn.kind(), ConnectionKind::Mock);
    assert_eq!(connector.opens(), 1);
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let connector = FakeConnector::new(&["/dev/ttyACM0"]);
    let cfg = DeviceConfig {
        retry_interval_ms: 0,
        ..config(DeviceMode::Mock)
    };
    let err = open_connection(&cfg, connector, Arc::new(NullSink))
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("retry_interval_ms"));
}
