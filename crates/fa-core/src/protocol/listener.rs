//! TCP front end: one thread and one [`Session`] per connection.

use super::framing::FrameBuffer;
use super::messages::Request;
use super::session::{MonitorFactory, Session};
use crate::logging::generate_connection_id;
use fa_common::ProtocolError;
use fa_config::ListenerConfig;
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, info_span, warn};

const READ_CHUNK: usize = 4096;

/// Bind the configured address.
pub fn bind(config: &ListenerConfig) -> io::Result<TcpListener> {
    TcpListener::bind((config.address.as_str(), config.port))
}

/// Decrements the active connection count when the connection thread ends.
struct ConnectionSlot(Arc<AtomicUsize>);

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Accept connections forever.
///
/// Connections beyond `max_connections` are closed as soon as they are
/// accepted. Accept errors are logged and the loop continues.
pub fn serve(listener: TcpListener, config: &ListenerConfig, factory: MonitorFactory) {
    let active = Arc::new(AtomicUsize::new(0));
    let limit = config.max_message_bytes;
    match listener.local_addr() {
        Ok(addr) => info!(addr = %addr, max_connections = config.max_connections, "listening"),
        Err(err) => warn!(error = %err, "listening on unknown address"),
    }

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                warn!(error = %err, "accept failed");
                continue;
            }
        };
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        if active.load(Ordering::SeqCst) >= config.max_connections {
            warn!(peer = %peer, limit = config.max_connections, "connection limit reached, closing");
            drop(stream);
            continue;
        }
        active.fetch_add(1, Ordering::SeqCst);
        let slot = ConnectionSlot(Arc::clone(&active));
        let factory = Arc::clone(&factory);
        let conn_id = generate_connection_id();

        let spawned = thread::Builder::new()
            .name("fa-conn".into())
            .spawn(move || {
                let _slot = slot;
                let span = info_span!("conn", id = %conn_id, peer = %peer);
                let _enter = span.enter();
                info!("connection accepted");
                if let Err(err) = handle_connection(stream, factory, limit) {
                    debug!(error = %err, "connection ended with error");
                }
                info!("connection closed");
            });
        if let Err(err) = spawned {
            warn!(error = %err, "failed to spawn connection thread");
        }
    }
}

/// Run one connection until EOF or an I/O error. The session, and with it
/// any active monitor, is closed on return.
pub fn handle_connection(
    stream: TcpStream,
    factory: MonitorFactory,
    max_message_bytes: usize,
) -> io::Result<()> {
    let mut session = Session::new(factory);
    let mut frames = FrameBuffer::new(max_message_bytes);
    let mut reader = &stream;
    let mut writer = &stream;
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };

        for frame in frames.push(&chunk[..n]) {
            let value = match frame {
                Ok(value) => value,
                Err(err @ ProtocolError::MessageTooLarge { .. }) => {
                    warn!(error = %err, "message discarded");
                    continue;
                }
                Err(err) => {
                    debug!(error = %err, "malformed input dropped");
                    continue;
                }
            };
            let request = match Request::from_value(&value) {
                Ok(request) => request,
                Err(err) => {
                    debug!(error = %err, "request dropped");
                    continue;
                }
            };

            debug!(command = request.name(), "request");
            let response = session.handle(request);
            let bytes = response.to_bytes().map_err(io::Error::from)?;
            writer.write_all(&bytes)?;
        }
    }

    session.close();
    Ok(())
}
