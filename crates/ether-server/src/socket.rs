//! TCP listener and accept loop.
//!
//! Every accepted stream is split: the read half goes to a [`Connection`]
//! running on its own task, the write half sits behind a [`StreamSink`] shared
//! with room fan-out.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ether_protocol::ConnectionId;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::{ServerError, ServerResult};
use crate::manager::RoomRegistry;
use crate::member::Member;
use crate::room::TerminationReason;
use crate::signals::ShutdownHandle;
use crate::sink::StreamSink;

/// TCP server for ether peers.
pub struct SocketServer {
    config: ServerConfig,
    listener: TcpListener,
    /// Limits concurrent connections.
    connection_semaphore: Arc<Semaphore>,
    next_id: AtomicU64,
    /// Tells spawned connections to end once rooms are torn down.
    drain: ShutdownHandle,
}

impl SocketServer {
    /// Validates the configuration and binds the listener.
    pub async fn bind(config: ServerConfig) -> ServerResult<Self> {
        config.validate()?;

        let listener = TcpListener::bind(config.listen_addr).await?;
        info!(
            addr = %listener.local_addr()?,
            max_connections = config.max_connections,
            "server listening"
        );

        let connection_semaphore = Arc::new(Semaphore::new(config.max_connections));
        Ok(Self {
            config,
            listener,
            connection_semaphore,
            next_id: AtomicU64::new(1),
            drain: ShutdownHandle::new(),
        })
    }

    /// Address actually bound; differs from the configured one for port 0.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Connections currently being served.
    pub fn active_connections(&self) -> usize {
        self.config.max_connections - self.connection_semaphore.available_permits()
    }

    /// Waits for a free slot, then for a peer.
    async fn accept(&self) -> ServerResult<(TcpStream, SocketAddr, OwnedSemaphorePermit)> {
        let permit = self
            .connection_semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ServerError::Shutdown)?;
        let (stream, peer) = self.listener.accept().await?;
        Ok((stream, peer, permit))
    }

    /// Runs the accept loop until the semaphore is closed.
    pub async fn run(&self, registry: Arc<RoomRegistry>) -> ServerResult<()> {
        loop {
            match self.accept().await {
                Ok((stream, peer, permit)) => self.spawn_connection(stream, peer, permit, &registry),
                Err(ServerError::Shutdown) => return Err(ServerError::Shutdown),
                Err(e) => {
                    // keep accepting; a single failed accept is not fatal
                    error!(error = %e, "failed to accept connection");
                }
            }
        }
    }

    /// Runs the accept loop until `shutdown` completes, then terminates every
    /// room so members are told before the process goes away, and finally
    /// ends the remaining connections.
    pub async fn run_until_shutdown<S>(
        &self,
        registry: Arc<RoomRegistry>,
        shutdown: S,
    ) -> ServerResult<()>
    where
        S: Future<Output = ()> + Send,
    {
        let result = tokio::select! {
            result = self.run(Arc::clone(&registry)) => result,
            _ = shutdown => {
                info!("shutdown signal received");
                Ok(())
            }
        };
        registry.terminate_all(TerminationReason::ServerShutdown).await;

        info!(active = self.active_connections(), "draining connections");
        self.drain.trigger();
        self.wait_for_connections().await;

        // rooms joined while the connections were winding down
        registry.terminate_all(TerminationReason::ServerShutdown).await;
        result
    }

    /// Waits until every connection task has returned its permit, bounded by
    /// the write timeout.
    async fn wait_for_connections(&self) {
        let permits = u32::try_from(self.config.max_connections).unwrap_or(u32::MAX);
        let all = self.connection_semaphore.acquire_many(permits);
        match tokio::time::timeout(self.config.connection.write_timeout, all).await {
            Ok(_) => debug!("all connections closed"),
            Err(_) => warn!(
                active = self.active_connections(),
                "connections still open after drain timeout"
            ),
        }
    }

    fn spawn_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        permit: OwnedSemaphorePermit,
        registry: &Arc<RoomRegistry>,
    ) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "could not disable Nagle");
        }

        let config = self.config.connection.clone();
        let (read, write) = stream.into_split();
        let sink = Arc::new(StreamSink::new(write, config.write_timeout));
        let member = Arc::new(Member::new(id, sink, config.knock_backlog));
        let connection = Connection::new(read, member, registry.clone(), config)
            .with_shutdown(self.drain.clone());

        let active = self.active_connections();
        let span = info_span!("conn", conn = %id, %peer);
        tokio::spawn(
            async move {
                let _permit = permit;
                debug!(active, "accepted");
                connection.serve().await;
            }
            .instrument(span),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ether_protocol::{
        RoomId, VERSION_0001, encode_handshake, encode_key_packet, encode_message_notice,
        encode_room_termination,
    };
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::signals::SignalHandler;

    async fn client(addr: SocketAddr, room: &[u8]) -> TcpStream {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut join = vec![0xC1, room.len() as u8];
        join.extend_from_slice(room);
        for frame in [
            encode_handshake(VERSION_0001).to_vec(),
            encode_key_packet(b"key").unwrap(),
            join,
        ] {
            stream.write_all(&frame).await.unwrap();
            assert_eq!(stream.read_u8().await.unwrap(), 0xA0);
        }
        stream
    }

    type Running = (
        SocketAddr,
        Arc<RoomRegistry>,
        SignalHandler,
        tokio::task::JoinHandle<ServerResult<()>>,
    );

    async fn start(config: ServerConfig) -> Running {
        let server = SocketServer::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let registry = Arc::new(RoomRegistry::new());
        let signals = SignalHandler::new();
        let shutdown = signals.shutdown();
        let task = tokio::spawn({
            let registry = Arc::clone(&registry);
            async move { server.run_until_shutdown(registry, shutdown.wait()).await }
        });
        (addr, registry, signals, task)
    }

    fn local() -> ServerConfig {
        ServerConfig::new("127.0.0.1:0".parse().unwrap())
    }

    #[tokio::test]
    async fn bind_rejects_invalid_config() {
        let result = SocketServer::bind(local().with_max_connections(0)).await;
        assert!(matches!(result, Err(ServerError::Config { .. })));
    }

    #[tokio::test]
    async fn peers_get_distinct_ids_and_relay() {
        let (addr, _registry, signals, task) = start(local()).await;
        let mut a = client(addr, b"r").await;
        let mut b = client(addr, b"r").await;

        a.write_all(&[0xDA, 0x01]).await.unwrap();
        assert_eq!(a.read_u8().await.unwrap(), 0xA0);

        // ids are handed out from 1 in accept order
        let expected =
            encode_message_notice(&RoomId::try_from("r").unwrap(), ConnectionId(1), &[0x01]).unwrap();
        let mut got = vec![0; expected.len()];
        b.read_exact(&mut got).await.unwrap();
        assert_eq!(got, expected);

        signals.trigger_shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn shutdown_terminates_rooms() {
        let (addr, registry, signals, task) = start(local()).await;
        let mut a = client(addr, b"lobby").await;
        assert_eq!(registry.len(), 1);

        signals.trigger_shutdown();
        task.await.unwrap().unwrap();

        let expected = encode_room_termination(&RoomId::try_from("lobby").unwrap());
        let mut got = vec![0; expected.len()];
        tokio::time::timeout(Duration::from_secs(2), a.read_exact(&mut got))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, expected);
        assert!(registry.is_empty());

        // the connection itself was ended, not left idling
        let mut rest = Vec::new();
        tokio::time::timeout(Duration::from_secs(2), a.read_to_end(&mut rest))
            .await
            .unwrap()
            .unwrap();
        assert!(rest.is_empty());
    }
}
