use std::net::TcpStream;

use tracing::debug;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Error as WsError, Message, WebSocket};

use crate::error::TransportError;

use super::{Conn, Dialer, MessageType};

type WsStream = WebSocket<MaybeTlsStream<TcpStream>>;

/// A blocking WebSocket connection.
pub struct WsConn {
    ws: WsStream,
}

impl WsConn {
    /// Wrap an already-established socket.
    #[must_use]
    pub fn new(ws: WsStream) -> Self {
        Self { ws }
    }
}

impl std::fmt::Debug for WsConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConn").finish_non_exhaustive()
    }
}

fn map_ws_error(err: WsError) -> TransportError {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
        other => TransportError::frame(other.to_string()),
    }
}

impl Conn for WsConn {
    fn read_message(&mut self) -> Result<(MessageType, Vec<u8>), TransportError> {
        loop {
            let msg = self.ws.read().map_err(map_ws_error)?;
            let frame = match msg {
                Message::Text(text) => (MessageType::Text, text.as_str().as_bytes().to_vec()),
                Message::Binary(data) => (MessageType::Binary, data.to_vec()),
                Message::Ping(data) => (MessageType::Ping, data.to_vec()),
                Message::Pong(data) => (MessageType::Pong, data.to_vec()),
                Message::Close(_) => (MessageType::Close, Vec::new()),
                // Raw frames are only produced when writing.
                Message::Frame(_) => continue,
            };
            return Ok(frame);
        }
    }

    fn write_message(&mut self, kind: MessageType, data: &[u8]) -> Result<(), TransportError> {
        let msg = match kind {
            MessageType::Text => {
                let text = String::from_utf8(data.to_vec())
                    .map_err(|e| TransportError::frame(format!("text frame is not UTF-8: {e}")))?;
                Message::text(text)
            }
            MessageType::Binary => Message::binary(data.to_vec()),
            MessageType::Ping => Message::Ping(data.to_vec().into()),
            MessageType::Pong => Message::Pong(data.to_vec().into()),
            MessageType::Close => return self.ws.close(None).map_err(map_ws_error),
        };
        self.ws.send(msg).map_err(map_ws_error)
    }
}

/// Dials `ws://` endpoints with `tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsDialer;

impl Dialer for WsDialer {
    fn dial(&self, url: &str) -> Result<Box<dyn Conn>, TransportError> {
        let (ws, response) = tungstenite::connect(url).map_err(|e| TransportError::ConnectionFailed {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        debug!(url, status = %response.status(), "websocket handshake complete");
        Ok(Box::new(WsConn::new(ws)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dial_refused_is_connection_failed() {
        // Bind then drop to obtain a port nobody listens on.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let url = format!("ws://127.0.0.1:{port}/observers");

        let Err(err) = WsDialer.dial(&url) else {
            panic!("dial unexpectedly succeeded");
        };
        match err {
            TransportError::ConnectionFailed { url: failed, .. } => assert_eq!(failed, url),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_closed_errors_map_to_closed() {
        assert_eq!(map_ws_error(WsError::ConnectionClosed), TransportError::Closed);
        assert_eq!(map_ws_error(WsError::AlreadyClosed), TransportError::Closed);
    }
}
