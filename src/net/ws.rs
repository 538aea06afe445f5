//! Websocket push channels, one reader thread per channel.

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::runtime::EventSink;
use crate::stream::Transport;
use crate::types::{ChannelEvent, ChannelId, TargetId};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use tungstenite::client::IntoClientRequest;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

/// How often a blocked reader wakes up to check for `close`.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// `Transport` over websockets.
pub struct WsTransport {
    config: SyncConfig,
    sink: EventSink,
    /// Stop flags of channels that are still running.
    channels: HashMap<ChannelId, Arc<AtomicBool>>,
}

impl WsTransport {
    pub fn new(config: SyncConfig, sink: EventSink) -> Self {
        Self {
            config,
            sink,
            channels: HashMap::new(),
        }
    }

    pub fn open_channels(&self) -> usize {
        self.channels.len()
    }
}

impl Transport for WsTransport {
    fn open(&mut self, channel: ChannelId, target: &TargetId) -> Result<()> {
        let url = self.config.stream_url(target)?;
        let connect_timeout = self.config.request_timeout();
        let stop = Arc::new(AtomicBool::new(false));
        let sink = self.sink.clone();

        thread::Builder::new()
            .name(format!("jobstream-ws-{channel}"))
            .spawn({
                let stop = Arc::clone(&stop);
                move || read_channel(channel, url, connect_timeout, stop, sink)
            })
            .map_err(|e| SyncError::Transport(format!("failed to spawn reader: {e}")))?;

        self.channels.insert(channel, stop);
        Ok(())
    }

    fn close(&mut self, channel: ChannelId) {
        if let Some(stop) = self.channels.remove(&channel) {
            stop.store(true, Ordering::SeqCst);
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        for stop in self.channels.values() {
            stop.store(true, Ordering::SeqCst);
        }
    }
}

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

fn read_channel(
    channel: ChannelId,
    url: String,
    connect_timeout: Duration,
    stop: Arc<AtomicBool>,
    sink: EventSink,
) {
    debug!(channel = %channel, url = %url, "connecting websocket");
    let mut socket = match connect(&url, connect_timeout) {
        Ok(socket) => socket,
        Err(e) => {
            sink.channel_event(
                channel,
                ChannelEvent::Closed {
                    reason: Some(e.to_string()),
                },
            );
            return;
        }
    };

    if let Err(e) = set_read_timeout(&socket, STOP_POLL_INTERVAL) {
        warn!(channel = %channel, error = %e, "could not set read timeout");
    }
    if stop.load(Ordering::SeqCst) || !sink.channel_event(channel, ChannelEvent::Opened) {
        let _ = socket.close(None);
        return;
    }

    loop {
        if stop.load(Ordering::SeqCst) {
            let _ = socket.close(None);
            let _ = socket.flush();
            debug!(channel = %channel, "websocket closed locally");
            return;
        }

        let event = match socket.read() {
            Ok(Message::Text(text)) => ChannelEvent::Message(text),
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => ChannelEvent::Message(text),
                Err(_) => {
                    debug!(channel = %channel, "skipping non-utf8 binary frame");
                    continue;
                }
            },
            Ok(Message::Close(frame)) => ChannelEvent::Closed {
                reason: frame.map(|f| format!("{} {}", u16::from(f.code), f.reason)),
            },
            Ok(_) => continue,
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                continue
            }
            Err(e) => ChannelEvent::Closed {
                reason: Some(e.to_string()),
            },
        };

        let closed = matches!(event, ChannelEvent::Closed { .. });
        if !sink.channel_event(channel, event) || closed {
            return;
        }
    }
}

/// Open the TCP connection and run the websocket handshake, both bounded by
/// `timeout`.
fn connect(url: &str, timeout: Duration) -> Result<Socket> {
    let request = url
        .into_client_request()
        .map_err(|e| SyncError::Transport(format!("bad stream url {url}: {e}")))?;
    let uri = request.uri();
    let host = uri
        .host()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
        .ok_or_else(|| SyncError::Transport(format!("stream url has no host: {url}")))?;
    let port = uri
        .port_u16()
        .unwrap_or(if uri.scheme_str() == Some("wss") { 443 } else { 80 });

    let mut last_error = None;
    let mut stream = None;
    for addr in (host.as_str(), port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(s) => {
                stream = Some(s);
                break;
            }
            Err(e) => last_error = Some(e),
        }
    }
    let stream = match (stream, last_error) {
        (Some(stream), _) => stream,
        (None, Some(e)) => return Err(SyncError::Io(e)),
        (None, None) => {
            return Err(SyncError::Transport(format!("no address for {host}:{port}")))
        }
    };

    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    let (socket, _response) = tungstenite::client_tls(request, stream)
        .map_err(|e| SyncError::Transport(format!("websocket handshake failed: {e}")))?;
    Ok(socket)
}

fn set_read_timeout(socket: &Socket, timeout: Duration) -> std::io::Result<()> {
    match socket.get_ref() {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(Some(timeout)),
        MaybeTlsStream::Rustls(stream) => stream.get_ref().set_read_timeout(Some(timeout)),
        _ => Ok(()),
    }
}
