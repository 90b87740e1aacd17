//! # scn-observer - status change notifier client
//!
//! Keeps a WebSocket connection to a status change notifier, announces which
//! event kinds it wants, and dispatches each inbound event to the listener
//! registered for its kind.
//!
//! ## Core Concepts
//!
//! - **Event**: one status change with a kind, creation time and raw JSON meta
//! - **Conn**: the duplex frame channel the observer depends on
//! - **ListenerRegistry**: at most one listener per event kind
//! - **Observer**: owns the connection, the announced kinds and the registry
//!
//! ## Usage
//!
//! ```rust,ignore
//! use scn_observer::{Observer, ObserverConfig};
//!
//! let mut obs = Observer::new(ObserverConfig::from_env()?, vec!["jobFinished".to_string()]);
//! obs.add_listener("jobFinished", |meta: &[u8]| {
//!     println!("job finished: {}", String::from_utf8_lossy(meta));
//! })?;
//!
//! // Retrying is up to the caller.
//! while obs.connect().is_err() {
//!     std::thread::sleep(std::time::Duration::from_secs(1));
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod event;
pub mod listener;
pub mod observer;
pub mod transport;

// Re-export primary types at crate root for convenience
pub use config::ObserverConfig;
pub use error::{CodecError, ConfigError, ListenerError, NotifyError, NotifyResult, TransportError};
pub use event::Event;
pub use listener::{DispatchOutcome, DispatchStats, Listener, ListenerRegistry};
pub use observer::Observer;
pub use transport::{Conn, ConnectionId, Dialer, MessageType, WsConn, WsDialer};
