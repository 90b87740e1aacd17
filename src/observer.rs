//! Observer: connection, subscribe handshake and dispatch.
//!
//! The observer owns at most one live connection, the list of event kinds it
//! announces to the notifier, and a [`ListenerRegistry`]. The announced kinds
//! and the registered listeners are set independently and never synced.
//!
//! ```rust,ignore
//! use scn_observer::{Observer, ObserverConfig};
//!
//! let mut obs = Observer::new(ObserverConfig::new("notifier:5555"), vec!["jobFinished".into()]);
//! obs.add_listener("jobFinished", |meta: &[u8]| println!("{}", String::from_utf8_lossy(meta)))?;
//! obs.connect()?;
//!
//! let (tx, rx) = obs.frame_channel();
//! let registry = obs.listeners();
//! let worker = std::thread::spawn(move || registry.handle_events(rx));
//! obs.read_frames(&tx)?;
//! drop(tx);
//! worker.join().unwrap();
//! ```

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::config::ObserverConfig;
use crate::error::{CodecError, NotifyResult, TransportError};
use crate::listener::{DispatchStats, Listener, ListenerRegistry};
use crate::transport::{Conn, ConnectionId, Dialer, MessageType, WsDialer};

struct LiveConnection {
    id: ConnectionId,
    conn: Box<dyn Conn>,
}

/// Client of the status change notifier.
pub struct Observer {
    config: ObserverConfig,
    dialer: Box<dyn Dialer>,
    events: Vec<String>,
    listeners: Arc<ListenerRegistry>,
    conn: Option<LiveConnection>,
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("config", &self.config)
            .field("events", &self.events)
            .field("listeners", &self.listeners)
            .field("connection_id", &self.connection_id())
            .finish_non_exhaustive()
    }
}

impl Observer {
    /// Create an observer that dials over WebSocket and announces `events`.
    #[must_use]
    pub fn new(config: ObserverConfig, events: Vec<String>) -> Self {
        Self::with_dialer(config, events, WsDialer)
    }

    /// Create an observer with a custom dialer.
    #[must_use]
    pub fn with_dialer(config: ObserverConfig, events: Vec<String>, dialer: impl Dialer + 'static) -> Self {
        Self {
            config,
            dialer: Box::new(dialer),
            events,
            listeners: Arc::new(ListenerRegistry::new()),
            conn: None,
        }
    }

    /// Create an observer around a connection the caller already dialed.
    ///
    /// No handshake is sent; call [`Observer::send_events`] to subscribe.
    /// Later calls to [`Observer::connect`] dial a fresh connection over
    /// WebSocket and replace this one.
    #[must_use]
    pub fn with_connection(config: ObserverConfig, events: Vec<String>, conn: Box<dyn Conn>) -> Self {
        let mut obs = Self::new(config, events);
        obs.conn = Some(LiveConnection {
            id: ConnectionId::new(),
            conn,
        });
        obs
    }

    /// The configuration this observer dials with.
    #[must_use]
    pub fn config(&self) -> &ObserverConfig {
        &self.config
    }

    /// Event kinds announced on connect, in announcement order.
    #[must_use]
    pub fn events(&self) -> &[String] {
        &self.events
    }

    /// Replace the announced event kinds.
    ///
    /// Takes effect on the next [`Observer::send_events`] or connect.
    pub fn set_events(&mut self, events: Vec<String>) {
        self.events = events;
    }

    /// Shared handle to the listener registry.
    #[must_use]
    pub fn listeners(&self) -> Arc<ListenerRegistry> {
        Arc::clone(&self.listeners)
    }

    /// Register the listener for an event kind.
    ///
    /// Registering does not add the kind to the announced events.
    pub fn add_listener(&self, kind: impl Into<String>, listener: impl Listener + 'static) -> NotifyResult<()> {
        self.listeners.register(kind, listener)
    }

    /// Whether a connection is currently held.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Id of the live connection, if any.
    #[must_use]
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.conn.as_ref().map(|c| c.id)
    }

    /// Snapshot of the dispatch counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.listeners.stats()
    }

    /// Dial the notifier and announce the subscribed event kinds.
    ///
    /// A dial failure leaves the observer as it was; call again to retry.
    /// Once dialed, the new connection replaces any previous one even if the
    /// handshake write then fails.
    pub fn connect(&mut self) -> NotifyResult<()> {
        self.config.validate()?;
        let url = self.config.url();

        let conn = self.dialer.dial(&url).inspect_err(|err| {
            debug!(url = %url, error = %err, "dial failed");
        })?;

        let id = ConnectionId::new();
        if let Some(prev) = self.conn.replace(LiveConnection { id, conn }) {
            debug!(connection_id = %prev.id, "replacing previous connection");
        }
        info!(connection_id = %id, url = %url, "connected to status change notifier");

        self.send_events()
    }

    /// Send the subscribe handshake: the announced kinds as one JSON array
    /// in a single binary frame.
    pub fn send_events(&mut self) -> NotifyResult<()> {
        let payload = serde_json::to_vec(&self.events).map_err(|e| CodecError::Encode {
            message: e.to_string(),
        })?;

        let live = self.conn.as_mut().ok_or(TransportError::NotConnected)?;
        live.conn.write_message(MessageType::Binary, &payload)?;
        debug!(connection_id = %live.id, events = self.events.len(), "subscribed");
        Ok(())
    }

    /// Dispatch `frames` until the stream ends.
    ///
    /// See [`ListenerRegistry::handle_events`].
    pub fn handle_events<I>(&self, frames: I)
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        self.listeners.handle_events(frames);
    }

    /// Bounded channel sized for feeding [`Observer::handle_events`].
    #[must_use]
    pub fn frame_channel(&self) -> (Sender<Vec<u8>>, Receiver<Vec<u8>>) {
        bounded(self.config.frame_queue_capacity.max(1))
    }

    /// Forward data frames from the live connection into `sink`.
    ///
    /// Returns the number of frames forwarded once the peer closes or the
    /// sink's receiver is gone. Control frames are skipped. The connection
    /// is dropped when the peer closes or a read fails.
    pub fn read_frames(&mut self, sink: &Sender<Vec<u8>>) -> NotifyResult<u64> {
        let live = self.conn.as_mut().ok_or(TransportError::NotConnected)?;
        let id = live.id;
        let mut forwarded = 0u64;

        loop {
            let (kind, data) = match live.conn.read_message() {
                Ok(frame) => frame,
                Err(TransportError::Closed) => {
                    info!(connection_id = %id, forwarded, "connection closed");
                    self.conn = None;
                    return Ok(forwarded);
                }
                Err(err) => {
                    warn!(connection_id = %id, error = %err, "read failed");
                    self.conn = None;
                    return Err(err.into());
                }
            };

            match kind {
                MessageType::Text | MessageType::Binary => {
                    if sink.send(data).is_err() {
                        debug!(connection_id = %id, "frame receiver dropped");
                        return Ok(forwarded);
                    }
                    forwarded += 1;
                }
                MessageType::Close => {
                    info!(connection_id = %id, forwarded, "peer closed connection");
                    self.conn = None;
                    return Ok(forwarded);
                }
                MessageType::Ping | MessageType::Pong => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::error::{ListenerError, NotifyError};
    use crate::transport::MockConn;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| (*s).to_string()).collect()
    }

    fn expect_handshake(conn: &mut MockConn, expected: &'static [u8], result: Result<(), TransportError>) {
        conn.expect_write_message()
            .withf(move |kind, data| *kind == MessageType::Binary && data.to_vec() == expected)
            .times(1)
            .return_once(move |_, _| result);
    }

    #[test]
    fn test_send_events_framing() {
        let table: [(&[&str], &'static [u8]); 2] = [
            (&["ev1", "ev3", "ev2"], br#"["ev1","ev3","ev2"]"#),
            (&["ev00", "ev03", "ev02"], br#"["ev00","ev03","ev02"]"#),
        ];

        for (events, bytes) in table {
            let mut conn = MockConn::new();
            expect_handshake(&mut conn, bytes, Ok(()));
            let mut obs = Observer::with_connection(ObserverConfig::default(), strings(events), Box::new(conn));
            obs.send_events().unwrap();
        }
    }

    #[test]
    fn test_with_connection_sends_nothing_until_asked() {
        // No expectations: any write would fail the test.
        let conn = MockConn::new();
        let obs = Observer::with_connection(ObserverConfig::default(), strings(&["a"]), Box::new(conn));
        assert!(obs.is_connected());
        assert!(obs.connection_id().is_some());
    }

    #[test]
    fn test_send_events_does_not_dedup() {
        let mut conn = MockConn::new();
        expect_handshake(&mut conn, br#"["a","a"]"#, Ok(()));
        let mut obs = Observer::with_connection(ObserverConfig::default(), strings(&["a", "a"]), Box::new(conn));
        obs.send_events().unwrap();
    }

    #[test]
    fn test_send_events_propagates_write_error() {
        let mut conn = MockConn::new();
        expect_handshake(&mut conn, br#"["ev00","ev03","ev02"]"#, Err(TransportError::frame("write error")));
        let mut obs = Observer::with_connection(
            ObserverConfig::default(),
            strings(&["ev00", "ev03", "ev02"]),
            Box::new(conn),
        );

        let err = obs.send_events().unwrap_err();
        assert_eq!(err.to_string(), "write error");
        assert!(obs.is_connected());
    }

    #[test]
    fn test_send_events_without_connection() {
        let mut obs = Observer::new(ObserverConfig::default(), strings(&["a"]));
        let err = obs.send_events().unwrap_err();
        assert_eq!(err, NotifyError::Transport(TransportError::NotConnected));
    }

    #[test]
    fn test_empty_subscription_is_empty_array() {
        let mut conn = MockConn::new();
        expect_handshake(&mut conn, b"[]", Ok(()));
        let mut obs = Observer::with_connection(ObserverConfig::default(), Vec::new(), Box::new(conn));
        obs.send_events().unwrap();
    }

    struct ScriptedDialer {
        attempts: Arc<AtomicUsize>,
        fail_first: usize,
        written: Arc<Mutex<Vec<Vec<u8>>>>,
        handshake_error: Option<TransportError>,
    }

    struct RecordingConn {
        written: Arc<Mutex<Vec<Vec<u8>>>>,
        inbound: VecDeque<Result<(MessageType, Vec<u8>), TransportError>>,
        write_error: Option<TransportError>,
    }

    impl Conn for RecordingConn {
        fn read_message(&mut self) -> Result<(MessageType, Vec<u8>), TransportError> {
            self.inbound.pop_front().unwrap_or(Err(TransportError::Closed))
        }

        fn write_message(&mut self, _kind: MessageType, data: &[u8]) -> Result<(), TransportError> {
            if let Some(err) = self.write_error.clone() {
                return Err(err);
            }
            self.written.lock().unwrap().push(data.to_vec());
            Ok(())
        }
    }

    impl Dialer for ScriptedDialer {
        fn dial(&self, url: &str) -> Result<Box<dyn Conn>, TransportError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.fail_first {
                return Err(TransportError::ConnectionFailed {
                    url: url.to_string(),
                    message: "connection refused".to_string(),
                });
            }
            Ok(Box::new(RecordingConn {
                written: Arc::clone(&self.written),
                inbound: VecDeque::new(),
                write_error: self.handshake_error.clone(),
            }))
        }
    }

    fn scripted(fail_first: usize, handshake_error: Option<TransportError>) -> (ScriptedDialer, Arc<AtomicUsize>, Arc<Mutex<Vec<Vec<u8>>>>) {
        let attempts = Arc::new(AtomicUsize::new(0));
        let written = Arc::new(Mutex::new(Vec::new()));
        let dialer = ScriptedDialer {
            attempts: Arc::clone(&attempts),
            fail_first,
            written: Arc::clone(&written),
            handshake_error,
        };
        (dialer, attempts, written)
    }

    #[test]
    fn test_connect_retry_until_available() {
        let (dialer, attempts, written) = scripted(9, None);
        let mut obs = Observer::with_dialer(ObserverConfig::new("h:1"), strings(&["someEventType"]), dialer);

        let mut connected = false;
        for _ in 0..10 {
            match obs.connect() {
                Ok(()) => {
                    connected = true;
                    break;
                }
                Err(err) => {
                    assert!(err.is_retryable());
                    assert!(!obs.is_connected());
                }
            }
        }

        assert!(connected);
        assert_eq!(attempts.load(Ordering::SeqCst), 10);
        assert_eq!(*written.lock().unwrap(), vec![br#"["someEventType"]"#.to_vec()]);
    }

    #[test]
    fn test_connect_keeps_connection_when_handshake_fails() {
        let (dialer, _, written) = scripted(0, Some(TransportError::Closed));
        let mut obs = Observer::with_dialer(ObserverConfig::new("h:1"), strings(&["a"]), dialer);

        let err = obs.connect().unwrap_err();
        assert_eq!(err, NotifyError::Transport(TransportError::Closed));
        assert!(obs.is_connected());
        assert!(written.lock().unwrap().is_empty());
    }

    #[test]
    fn test_reconnect_replaces_connection() {
        let (dialer, attempts, written) = scripted(0, None);
        let mut obs = Observer::with_dialer(ObserverConfig::new("h:1"), strings(&["a"]), dialer);

        obs.connect().unwrap();
        let first = obs.connection_id();
        obs.connect().unwrap();

        assert_ne!(first, obs.connection_id());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(written.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_connect_rejects_invalid_config() {
        let (dialer, attempts, _) = scripted(0, None);
        let mut obs = Observer::with_dialer(ObserverConfig::new(""), strings(&["a"]), dialer);
        assert!(matches!(obs.connect(), Err(NotifyError::Config(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_add_listener_does_not_change_events() {
        let obs = Observer::new(ObserverConfig::default(), strings(&["announced"]));
        obs.add_listener("handled", |_: &[u8]| {}).unwrap();
        assert_eq!(obs.events(), strings(&["announced"]).as_slice());
        assert!(obs.listeners().contains("handled"));

        let err = obs.add_listener("handled", |_: &[u8]| {}).unwrap_err();
        assert_eq!(
            err,
            NotifyError::Listener(ListenerError::Duplicate {
                kind: "handled".to_string()
            })
        );
    }

    #[test]
    fn test_handle_events_table() {
        let cases: [(&str, &[u8], bool); 3] = [
            ("doSomething", br#"{"kind": "doSomething"}"#, true),
            ("doAnother", br#"{"kind": "doAnother"}"#, true),
            ("doThis", br#"{"kind": "doThat"}"#, false),
        ];

        for (kind, frame, should_call) in cases {
            let obs = Observer::new(ObserverConfig::default(), Vec::new());
            let calls = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&calls);
            obs.add_listener(kind, move |_: &[u8]| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

            let (tx, rx) = obs.frame_channel();
            tx.send(frame.to_vec()).unwrap();
            drop(tx);
            obs.handle_events(rx);

            assert_eq!(calls.load(Ordering::SeqCst), usize::from(should_call), "kind {kind}");
        }
    }

    #[test]
    fn test_read_frames_forwards_data_and_stops_on_close() {
        let inbound = VecDeque::from(vec![
            Ok((MessageType::Binary, br#"{"kind":"a"}"#.to_vec())),
            Ok((MessageType::Ping, Vec::new())),
            Ok((MessageType::Text, br#"{"kind":"b"}"#.to_vec())),
            Ok((MessageType::Close, Vec::new())),
        ]);
        let conn = RecordingConn {
            written: Arc::new(Mutex::new(Vec::new())),
            inbound,
            write_error: None,
        };
        let mut obs = Observer::with_connection(ObserverConfig::default(), Vec::new(), Box::new(conn));

        let (tx, rx) = obs.frame_channel();
        assert_eq!(obs.read_frames(&tx).unwrap(), 2);
        assert!(!obs.is_connected());
        drop(tx);

        let frames: Vec<Vec<u8>> = rx.iter().collect();
        assert_eq!(frames, vec![br#"{"kind":"a"}"#.to_vec(), br#"{"kind":"b"}"#.to_vec()]);
    }

    #[test]
    fn test_read_frames_propagates_read_error() {
        let conn = RecordingConn {
            written: Arc::new(Mutex::new(Vec::new())),
            inbound: VecDeque::from(vec![Err(TransportError::frame("read error"))]),
            write_error: None,
        };
        let mut obs = Observer::with_connection(ObserverConfig::default(), Vec::new(), Box::new(conn));

        let (tx, _rx) = obs.frame_channel();
        let err = obs.read_frames(&tx).unwrap_err();
        assert_eq!(err.to_string(), "read error");
        assert!(!obs.is_connected());
    }

    #[test]
    fn test_read_frames_stops_when_receiver_dropped() {
        let conn = RecordingConn {
            written: Arc::new(Mutex::new(Vec::new())),
            inbound: VecDeque::from(vec![Ok((MessageType::Binary, b"{}".to_vec()))]),
            write_error: None,
        };
        let mut obs = Observer::with_connection(ObserverConfig::default(), Vec::new(), Box::new(conn));

        let (tx, rx) = obs.frame_channel();
        drop(rx);
        assert_eq!(obs.read_frames(&tx).unwrap(), 0);
        assert!(obs.is_connected());
    }
}
