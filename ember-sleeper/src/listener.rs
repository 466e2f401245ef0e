//! The sleeper TCP listener.
//!
//! One task per accepted connection, no shared mutable state beyond the
//! read-only directory lookups. Per-connection state machine:
//! `Handshake -> Status` or `Handshake -> Login`, terminal on close.
//!
//! The listener never proxies game traffic. A login against a sleeping
//! server triggers exactly one wake and then closes with an informational
//! kick; the real backend won't be reachable for tens of seconds, so
//! holding the socket open would only mislead the client.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::codec::{FrameDecoder, ProtocolError};
use crate::directory::{ServerDirectory, SleeperView, ViewState, WakeRefusal};
use crate::metrics::metrics;
use crate::packet::{PacketReader, write_frame, write_string};
use crate::status::sleeping_status;

const PACKET_HANDSHAKE: i32 = 0x00;
const PACKET_STATUS_REQUEST: i32 = 0x00;
const PACKET_STATUS_PING: i32 = 0x01;
const PACKET_LOGIN_START: i32 = 0x00;
const PACKET_LOGIN_DISCONNECT: i32 = 0x00;

const NEXT_STATE_STATUS: i32 = 1;
const NEXT_STATE_LOGIN: i32 = 2;

const KICK_NOT_FOUND: &str = "Server not found. Check the address.";
const KICK_ALREADY_STARTING: &str = "Server is already starting. Retry shortly.";
const KICK_NOT_WHITELISTED: &str = "You are not whitelisted on this server.";
const KICK_WAKING: &str = "Server is waking up. Retry in about a minute.";
const KICK_WAKE_FAILED: &str = "Could not wake the server. Try again later.";

#[derive(Debug)]
enum ConnError {
    Protocol(ProtocolError),
    Io(io::Error),
    Timeout,
    Closed,
}

impl fmt::Display for ConnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnError::Protocol(err) => write!(f, "{err}"),
            ConnError::Io(err) => write!(f, "io error: {err}"),
            ConnError::Timeout => f.write_str("read timed out"),
            ConnError::Closed => f.write_str("peer closed"),
        }
    }
}

impl From<ProtocolError> for ConnError {
    fn from(err: ProtocolError) -> Self {
        metrics().record_protocol_error();
        ConnError::Protocol(err)
    }
}

impl From<io::Error> for ConnError {
    fn from(err: io::Error) -> Self {
        ConnError::Io(err)
    }
}

/// Everything before the first `.` of the announced hostname, lowercased.
pub fn subdomain_of(server_address: &str) -> String {
    server_address
        .split('.')
        .next()
        .unwrap_or(server_address)
        .trim()
        .to_ascii_lowercase()
}

/// Accept loop. Bind separately so callers (and tests) can learn the port.
pub async fn serve(
    listener: TcpListener,
    directory: Arc<dyn ServerDirectory>,
    read_timeout: Duration,
) -> io::Result<()> {
    info!("sleeper: listening on {}", listener.local_addr()?);
    loop {
        let (stream, addr) = listener.accept().await?;
        let directory = directory.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, directory, read_timeout).await {
                debug!("sleeper: connection from {addr} closed: {err}");
            }
        });
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    directory: Arc<dyn ServerDirectory>,
    read_timeout: Duration,
) -> Result<(), ConnError> {
    let mut decoder = FrameDecoder::new();

    let frame = read_frame(&mut stream, &mut decoder, read_timeout).await?;
    let mut reader = PacketReader::new(&frame);
    if reader.read_varint()? != PACKET_HANDSHAKE {
        return Err(ProtocolError::Malformed("expected handshake".into()).into());
    }
    let _protocol_version = reader.read_varint()?;
    let address = reader.read_string(255)?;
    let _port = reader.read_u16()?;
    let next_state = reader.read_varint()?;
    let subdomain = subdomain_of(&address);

    match next_state {
        NEXT_STATE_STATUS => {
            serve_status(&mut stream, &mut decoder, &directory, &subdomain, read_timeout).await
        }
        NEXT_STATE_LOGIN => {
            serve_login(&mut stream, &mut decoder, &directory, &subdomain, read_timeout).await
        }
        other => Err(ProtocolError::Malformed(format!("next state {other}")).into()),
    }
}

/// Status sub-protocol: canned response plus verbatim ping echo, with zero
/// provisioner involvement; clients probe status far more often than they
/// join, and this path must stay effectively free.
async fn serve_status(
    stream: &mut TcpStream,
    decoder: &mut FrameDecoder,
    directory: &Arc<dyn ServerDirectory>,
    subdomain: &str,
    read_timeout: Duration,
) -> Result<(), ConnError> {
    let view = directory.lookup(subdomain).await;

    // At most a request and a ping; anything longer is not list-ping.
    for _ in 0..2 {
        let frame = match read_frame(stream, decoder, read_timeout).await {
            Ok(frame) => frame,
            // Clients may hang up right after the response.
            Err(ConnError::Closed) => return Ok(()),
            Err(err) => return Err(err),
        };
        let mut reader = PacketReader::new(&frame);
        match reader.read_varint()? {
            PACKET_STATUS_REQUEST => {
                let status = sleeping_status(view.as_ref().and_then(|v| v.motd.as_deref()));
                let json = serde_json::to_string(&status)
                    .map_err(|err| ProtocolError::Malformed(err.to_string()))?;
                let mut payload = Vec::new();
                write_string(&mut payload, &json);
                stream
                    .write_all(&write_frame(PACKET_STATUS_REQUEST, &payload))
                    .await?;
                metrics().record_status_served();
            }
            PACKET_STATUS_PING => {
                let nonce = reader.remaining();
                stream.write_all(&write_frame(PACKET_STATUS_PING, nonce)).await?;
                metrics().record_ping_echoed();
                return Ok(());
            }
            other => {
                return Err(ProtocolError::Malformed(format!("status packet {other}")).into());
            }
        }
    }
    Ok(())
}

/// Login sub-protocol: decide kick-or-wake from the login-start username.
async fn serve_login(
    stream: &mut TcpStream,
    decoder: &mut FrameDecoder,
    directory: &Arc<dyn ServerDirectory>,
    subdomain: &str,
    read_timeout: Duration,
) -> Result<(), ConnError> {
    let frame = read_frame(stream, decoder, read_timeout).await?;
    let mut reader = PacketReader::new(&frame);
    if reader.read_varint()? != PACKET_LOGIN_START {
        return Err(ProtocolError::Malformed("expected login start".into()).into());
    }
    let username = reader.read_string(16)?;

    let message = match directory.lookup(subdomain).await {
        None => KICK_NOT_FOUND,
        Some(view) => decide_login(directory, &view, subdomain, &username).await,
    };

    kick(stream, message).await
}

async fn decide_login(
    directory: &Arc<dyn ServerDirectory>,
    view: &SleeperView,
    subdomain: &str,
    username: &str,
) -> &'static str {
    if view.state == ViewState::Waking {
        return KICK_ALREADY_STARTING;
    }
    if !view.allows(username) {
        return KICK_NOT_WHITELISTED;
    }

    match directory
        .wake(&view.server_id, &view.software, &view.version)
        .await
    {
        Ok(()) => {
            info!("sleeper: {username} woke {subdomain} (server {})", view.server_id);
            metrics().record_wake_triggered();
            KICK_WAKING
        }
        Err(WakeRefusal::AlreadyStarting) => KICK_ALREADY_STARTING,
        Err(WakeRefusal::Failed(reason)) => {
            warn!("sleeper: wake of {subdomain} failed: {reason}");
            KICK_WAKE_FAILED
        }
    }
}

/// Send a login-disconnect with a JSON chat body, then close.
async fn kick(stream: &mut TcpStream, message: &str) -> Result<(), ConnError> {
    let chat = serde_json::json!({ "text": message }).to_string();
    let mut payload = Vec::new();
    write_string(&mut payload, &chat);
    stream
        .write_all(&write_frame(PACKET_LOGIN_DISCONNECT, &payload))
        .await?;
    stream.shutdown().await.ok();
    metrics().record_login_kicked();
    Ok(())
}

/// Pull bytes until the decoder yields a frame, bounding each read by the
/// idle timeout. The decoder enforces the undecoded-buffer cap.
async fn read_frame(
    stream: &mut TcpStream,
    decoder: &mut FrameDecoder,
    read_timeout: Duration,
) -> Result<Vec<u8>, ConnError> {
    loop {
        if let Some(frame) = decoder.next_frame()? {
            return Ok(frame);
        }
        let mut chunk = [0u8; 1024];
        let n = tokio::time::timeout(read_timeout, stream.read(&mut chunk))
            .await
            .map_err(|_| ConnError::Timeout)??;
        if n == 0 {
            return Err(ConnError::Closed);
        }
        decoder.extend(&chunk[..n])?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subdomain_derivation() {
        assert_eq!(subdomain_of("Skyblock.play.example.net"), "skyblock");
        assert_eq!(subdomain_of("bare"), "bare");
        assert_eq!(subdomain_of("MIXED.case"), "mixed");
    }
}
