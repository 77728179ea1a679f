//! WebTransport server
//!
//! Each client opens one bidirectional stream. Commands arrive on it as
//! framed JSON; snapshots go back out on the same stream.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::sync::mpsc::UnboundedReceiver;
use wtransport::SendStream;

use crate::config::ServerConfig;
use crate::game::constants::net::MAX_CLIENT_MESSAGE_SIZE;
use crate::game::snapshot::Snapshot;
use crate::metrics::Metrics;
use crate::net::framing::{read_message, FramingError};
use crate::net::game_session::{run_broadcaster, start_game_loop, Clients, GameSession};
use crate::net::protocol::decode_command;
use crate::net::tls::TlsConfig;

pub struct WebTransportServer {
    config: ServerConfig,
    tls_config: TlsConfig,
    session: Arc<GameSession>,
    snapshots: UnboundedReceiver<Snapshot>,
    clients: Arc<Clients<SendStream>>,
    metrics: Arc<Metrics>,
}

impl WebTransportServer {
    pub async fn new(config: ServerConfig, metrics: Arc<Metrics>) -> anyhow::Result<Self> {
        let tls_config = TlsConfig::load(&config).await?;
        let (session, snapshots) = GameSession::new(config.game.clone(), metrics.clone());

        Ok(Self {
            config,
            tls_config,
            session,
            snapshots,
            clients: Arc::new(Clients::new()),
            metrics,
        })
    }

    /// Certificate hash for client pinning
    pub fn cert_hash(&self) -> &str {
        &self.tls_config.cert_hash
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.config.bind_address, self.config.port)
    }

    /// Run the server
    pub async fn run(self) -> anyhow::Result<()> {
        use wtransport::Endpoint;

        let bind_addr = self.bind_addr();
        let server_config = wtransport::ServerConfig::builder()
            .with_bind_address(bind_addr)
            .with_identity(self.tls_config.identity)
            .build();

        let server = Endpoint::server(server_config)?;

        tracing::info!("WebTransport server listening on {}", bind_addr);
        tracing::info!("Certificate hash: {}", self.tls_config.cert_hash);

        start_game_loop(self.session.clone());
        tokio::spawn(run_broadcaster(
            self.snapshots,
            self.clients.clone(),
            self.metrics.clone(),
        ));

        loop {
            let incoming = server.accept().await;

            let session = self.session.clone();
            let clients = self.clients.clone();
            let metrics = self.metrics.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(incoming, session, clients, metrics).await {
                    tracing::warn!("Connection error: {}", e);
                }
            });
        }
    }
}

/// Handle a single WebTransport connection
async fn handle_connection(
    incoming: wtransport::endpoint::IncomingSession,
    session: Arc<GameSession>,
    clients: Arc<Clients<SendStream>>,
    metrics: Arc<Metrics>,
) -> anyhow::Result<()> {
    let session_request = incoming.await?;

    tracing::debug!(
        "New connection from: {:?}, path: {}",
        session_request.authority(),
        session_request.path()
    );

    let connection = session_request.accept().await?;
    let (send, mut recv) = connection.accept_bi().await?;

    let connection_id = clients.register(send);
    metrics.connections_active.fetch_add(1, Ordering::Relaxed);
    tracing::debug!("Client {} connected", connection_id);

    let result = read_commands(&mut recv, &session, &metrics).await;

    clients.remove(connection_id);
    metrics.connections_active.fetch_sub(1, Ordering::Relaxed);
    tracing::debug!("Client {} disconnected", connection_id);

    result
}

/// Read framed commands until the stream closes. Malformed or invalid
/// messages are dropped without closing the stream.
async fn read_commands<R: AsyncRead + Unpin>(
    recv: &mut R,
    session: &GameSession,
    metrics: &Metrics,
) -> anyhow::Result<()> {
    loop {
        let data = match read_message(recv, MAX_CLIENT_MESSAGE_SIZE).await {
            Ok(data) => data,
            Err(FramingError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        metrics.messages_received.fetch_add(1, Ordering::Relaxed);
        metrics
            .bytes_received
            .fetch_add(data.len() as u64 + 4, Ordering::Relaxed);

        let command = match decode_command(&data) {
            Ok(command) => command,
            Err(e) => {
                metrics.messages_rejected.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Rejected client message: {}", e);
                continue;
            }
        };

        if let Err(e) = session.submit(command) {
            tracing::warn!("Dropping command: {}", e);
        }
    }
}
