//! TCP listener: one spawned task per accepted connection.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::{sleep, Duration};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::error::AppResult;
use crate::network::dispatcher::{handle_connection, ConnectionKind, RelayContext};
use crate::network::upload::UploadOutcome;
use crate::store::DeviceStateStore;

/// Back-off after a failed `accept` (e.g. file descriptor exhaustion).
const ACCEPT_BACKOFF_MS: u64 = 100;

/// Bound listener plus the context handed to every connection.
pub struct RelayServer {
    listener: TcpListener,
    ctx: RelayContext,
}

impl RelayServer {
    /// Bind `addr` (`host:port`, port 0 for an ephemeral one).
    pub async fn bind(addr: &str, ctx: RelayContext) -> AppResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Relay listening on {}", listener.local_addr()?);
        Ok(Self { listener, ctx })
    }

    /// Bind `server.host:server.port` with a context built from `config`.
    pub async fn from_config(config: &RelayConfig) -> AppResult<Self> {
        let ctx = RelayContext::from_config(config).await?;
        info!(
            detector = ctx.detector.name(),
            layout = ?ctx.layout,
            upload_dir = %ctx.archive.dir().display(),
            "Relay context ready"
        );
        Self::bind(&config.server.bind_addr(), ctx).await
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> AppResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle on the store shared by all connections.
    pub fn store(&self) -> Arc<DeviceStateStore> {
        Arc::clone(&self.ctx.store)
    }

    /// Serve until the process exits.
    pub async fn run(self) -> AppResult<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves. Connections already accepted keep
    /// running to completion on their own tasks.
    pub async fn run_until<F>(self, shutdown: F) -> AppResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Relay shutting down");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((socket, peer)) => {
                            let ctx = self.ctx.clone();
                            let span = info_span!("connection", %peer, id = %Uuid::new_v4());
                            tokio::spawn(
                                async move {
                                    match handle_connection(socket, peer, ctx).await {
                                        Ok(ConnectionKind::Upload(UploadOutcome::Rejected { .. })) => {}
                                        Ok(kind) => tracing::debug!(?kind, "Connection finished"),
                                        Err(e) if e.is_peer_fault() => warn!("Client {} error: {}", peer, e),
                                        Err(e) => error!("Client {} error: {}", peer, e),
                                    }
                                }
                                .instrument(span),
                            );
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                            sleep(Duration::from_millis(ACCEPT_BACKOFF_MS)).await;
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
