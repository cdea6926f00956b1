//! TCP listener and per-connection handling.
//!
//! A connection goes `Connecting -> Active -> Disconnected`. While
//! connecting, the first frame must be a valid `hello`; afterwards inbound
//! frames are forwarded to the relay task and relay broadcasts are written
//! back to the client.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::bridge::{RelayHandle, SessionId, Submission};
use crate::common::error::{ProtocolError, ProtocolResult};
use crate::protocol::auth::Authenticator;
use crate::protocol::codec::{new_relay_connection, Inbound, RelayConnection};
use crate::protocol::frames::{ClientFrame, ServerFrame};

/// Lifecycle of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Waiting for the hello frame.
    Connecting,
    /// Registered with the relay.
    Active,
    /// Terminal.
    Disconnected,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => f.write_str("connecting"),
            Self::Active => f.write_str("active"),
            Self::Disconnected => f.write_str("disconnected"),
        }
    }
}

/// Everything a connection task needs.
#[derive(Clone)]
pub struct ConnectionContext {
    pub authenticator: Arc<dyn Authenticator>,
    pub relay: RelayHandle,
    pub handshake_timeout: Duration,
    pub max_frame_length: usize,
    pub shutdown_rx: watch::Receiver<bool>,
}

pub struct RelayServer {
    listener: TcpListener,
    context: Arc<ConnectionContext>,
}

impl RelayServer {
    pub async fn bind(addr: &str, context: ConnectionContext) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            context: Arc::new(context),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until shutdown, then wait for open connections to close.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.context.shutdown_rx.clone();
        let mut connections = JoinSet::new();

        info!("Listening on {}", self.local_addr()?);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let context = Arc::clone(&self.context);
                            connections.spawn(async move {
                                let peer = peer.to_string();
                                if let Err(e) = handle_connection(stream, peer.clone(), context).await {
                                    warn!(peer = %peer, error = %e, "Connection ended with error");
                                }
                            });
                        }
                        Err(e) => warn!("Failed to accept connection: {}", e),
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }

            while connections.try_join_next().is_some() {}
        }

        info!(open = connections.len(), "Listener closed, waiting for connections");
        while connections.join_next().await.is_some() {}
        Ok(())
    }
}

/// Serve a single client connection to completion.
pub async fn handle_connection<S>(
    stream: S,
    peer: String,
    context: Arc<ConnectionContext>,
) -> ProtocolResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut connection = new_relay_connection(stream, context.max_frame_length);
    let mut phase = ConnectionPhase::Connecting;
    debug!(peer = %peer, phase = %phase, "Connection opened");

    let (identity, version) = match handshake(&mut connection, &context).await {
        Ok(hello) => hello,
        Err(e) => {
            // Best effort, the peer may already be gone
            let _ = connection.send(ServerFrame::error(e.to_string())).await;
            return Err(e);
        }
    };

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let session = context
        .relay
        .connect(identity.clone(), version.clone(), outbound_tx)
        .await
        .ok_or_else(|| ProtocolError::Handshake {
            reason: "relay is not running".to_string(),
        })?;

    phase = ConnectionPhase::Active;
    info!(
        peer = %peer,
        session,
        identity = %identity,
        version = %version,
        phase = %phase,
        "Client authenticated"
    );

    let mut shutdown_rx = context.shutdown_rx.clone();
    let result: ProtocolResult<&str> = match connection
        .send(ServerFrame::Welcome {
            identity: identity.clone(),
        })
        .await
    {
        Err(e) => Err(e),
        Ok(()) => loop {
            tokio::select! {
                inbound = connection.next() => {
                    match inbound {
                        Some(Ok(Inbound::Frame(frame))) => {
                            if let Err(e) = dispatch(&mut connection, &context.relay, session, frame).await {
                                break Err(e);
                            }
                        }
                        Some(Ok(Inbound::Malformed { reason })) => {
                            warn!(peer = %peer, session, reason = %reason, "Malformed frame");
                            let frame = ServerFrame::error(format!("malformed frame: {}", reason));
                            if let Err(e) = connection.send(frame).await {
                                break Err(e);
                            }
                        }
                        Some(Err(e)) => break Err(e),
                        None => break Ok("client closed connection"),
                    }
                }
                frame = outbound_rx.recv() => {
                    match frame {
                        Some(frame) => {
                            if let Err(e) = connection.send(frame).await {
                                break Err(e);
                            }
                        }
                        None => break Ok("relay closed session"),
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break Ok("server shutting down");
                    }
                }
            }
        },
    };

    phase = ConnectionPhase::Disconnected;
    let reason = match &result {
        Ok(reason) => reason.to_string(),
        Err(e) => e.to_string(),
    };
    context.relay.disconnect(session, reason.clone());
    info!(peer = %peer, session, phase = %phase, reason = %reason, "Connection closed");

    result.map(|_| ())
}

/// Wait for a valid hello frame. Returns the identity and mod version.
async fn handshake<S>(
    connection: &mut RelayConnection<S>,
    context: &ConnectionContext,
) -> ProtocolResult<(String, String)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let first = tokio::time::timeout(context.handshake_timeout, connection.next())
        .await
        .map_err(|_| ProtocolError::HandshakeTimeout)?;

    match first {
        None => Err(ProtocolError::ClosedBeforeHandshake),
        Some(Err(e)) => Err(e),
        Some(Ok(Inbound::Frame(ClientFrame::Hello { token, version }))) => {
            let identity = context
                .authenticator
                .authenticate(&token)
                .map_err(|e| ProtocolError::Handshake {
                    reason: e.to_string(),
                })?;
            Ok((identity, version))
        }
        Some(Ok(Inbound::Frame(other))) => Err(ProtocolError::Handshake {
            reason: format!("expected hello, got {}", other.event_name()),
        }),
        Some(Ok(Inbound::Malformed { reason })) => Err(ProtocolError::Handshake { reason }),
    }
}

/// Forward one client frame to the relay.
async fn dispatch<S>(
    connection: &mut RelayConnection<S>,
    relay: &RelayHandle,
    session: SessionId,
    frame: ClientFrame,
) -> ProtocolResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match frame {
        ClientFrame::Hello { .. } => {
            connection
                .send(ServerFrame::error("already authenticated"))
                .await?;
        }
        ClientFrame::WynnMessage(raw) => {
            relay.submit(session, Submission::Main(raw));
        }
        ClientFrame::HrMessage(raw) => {
            relay.submit(session, Submission::Secondary(raw));
        }
        ClientFrame::DiscordOnlyWynnMessage(raw) => {
            relay.submit(session, Submission::Passthrough(raw));
        }
        ClientFrame::DiscordMessage(message) => {
            relay.submit(session, Submission::Platform(message));
        }
        ClientFrame::Sync => {
            relay.sync(session);
        }
        ClientFrame::ListOnline => {
            let identities = relay.list_online().await.unwrap_or_default();
            connection.send(ServerFrame::OnlineList(identities)).await?;
        }
    }
    Ok(())
}
