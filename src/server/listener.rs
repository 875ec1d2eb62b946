//! Accept Loop
//!
//! [`Server`] owns the listening socket and the worker pool. The accept loop
//! does nothing but accept and submit: protocol work always happens on a
//! pool worker, so a stalled client can never hold up new connections.

use crate::config::{Config, ConfigError};
use crate::connection::handle_connection;
use crate::pool::{PoolError, WorkerPool};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{lookup_host, TcpListener, TcpSocket};
use tracing::{debug, error, info, warn};

/// OS-level queue of connections not yet returned by `accept`.
pub const LISTEN_BACKLOG: u32 = 64;

/// Pause after a transient accept error before trying again.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Errors that stop the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to resolve {address}: {source}")]
    Resolve {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("{0} did not resolve to any address")]
    NoAddress(String),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("listener failed: {0}")]
    Accept(#[source] io::Error),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// A bound listener plus the pool that serves its connections.
///
/// # Example
///
/// ```no_run
/// use framecho::{Config, Server};
///
/// # async fn demo() -> Result<(), framecho::ServerError> {
/// let server = Server::bind(Config::default()).await?;
/// server
///     .run(async {
///         let _ = tokio::signal::ctrl_c().await;
///     })
///     .await
/// # }
/// ```
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    pool: Arc<WorkerPool>,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the listening socket and starts the worker pool.
    pub async fn bind(config: Config) -> Result<Self, ServerError> {
        config.validate()?;

        let address = config.bind_address();
        let addr = lookup_host(&address)
            .await
            .map_err(|source| ServerError::Resolve {
                address: address.clone(),
                source,
            })?
            .next()
            .ok_or_else(|| ServerError::NoAddress(address.clone()))?;

        let listener = listen(addr).map_err(|source| ServerError::Bind {
            address: addr,
            source,
        })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            address: addr,
            source,
        })?;

        let pool = Arc::new(WorkerPool::start(config.pool_size)?);

        info!(
            address = %local_addr,
            workers = config.pool_size,
            "Serving on port {}",
            local_addr.port()
        );

        Ok(Self {
            listener,
            pool,
            local_addr,
        })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle to the worker pool, for inspecting occupancy.
    pub fn pool(&self) -> Arc<WorkerPool> {
        Arc::clone(&self.pool)
    }

    /// Accepts connections until `shutdown` resolves, then closes the
    /// listener and waits for the pool to drain.
    ///
    /// Connections already accepted when shutdown starts are still served.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let Server {
            listener,
            pool,
            local_addr,
        } = self;

        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown signal received, stopping accept loop");
                    break Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "Accepted connection");
                        if let Err(e) = pool.submit(handle_connection(stream, peer)) {
                            error!(peer = %peer, error = %e, "Failed to queue connection");
                            break Err(ServerError::Pool(e));
                        }
                    }
                    Err(e) if is_fatal_accept_error(&e) => {
                        error!(error = %e, "Listener failed, shutting down");
                        break Err(ServerError::Accept(e));
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        };

        drop(listener);
        info!(address = %local_addr, "Listener closed");

        pool.shutdown().await;
        info!("Server shutdown complete");

        result
    }
}

fn listen(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}

/// Errors that mean the listener itself is unusable. Everything else
/// (aborted handshakes, descriptor exhaustion, ...) is worth retrying.
fn is_fatal_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::InvalidInput | io::ErrorKind::NotConnected
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolStats;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;

    struct TestServer {
        addr: SocketAddr,
        pool: Arc<WorkerPool>,
        stop: oneshot::Sender<()>,
        task: JoinHandle<Result<(), ServerError>>,
    }

    impl TestServer {
        fn stats(&self) -> &PoolStats {
            self.pool.stats()
        }

        async fn stop(self) -> Result<(), ServerError> {
            let _ = self.stop.send(());
            self.task.await.unwrap()
        }
    }

    async fn start_server(pool_size: usize) -> TestServer {
        let config = Config {
            port: 0,
            pool_size,
            ..Default::default()
        };
        let server = Server::bind(config).await.unwrap();
        let addr = server.local_addr();
        let pool = server.pool();

        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(server.run(async move {
            let _ = stopped.await;
        }));

        TestServer {
            addr,
            pool,
            stop,
            task,
        }
    }

    async fn wait_for(cond: impl Fn() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    /// True if the ready byte arrives within `wait`.
    async fn got_ready(client: &mut TcpStream, wait: Duration) -> bool {
        let mut byte = [0u8; 1];
        match tokio::time::timeout(wait, client.read_exact(&mut byte)).await {
            Ok(Ok(_)) => {
                assert_eq!(byte[0], b'*');
                true
            }
            _ => false,
        }
    }

    #[tokio::test]
    async fn test_bind_rejects_zero_pool() {
        let config = Config {
            port: 0,
            pool_size: 0,
            ..Default::default()
        };
        let err = Server::bind(config).await.unwrap_err();
        assert!(matches!(err, ServerError::Config(ConfigError::ZeroPoolSize)));
    }

    #[tokio::test]
    async fn test_bind_reports_address() {
        let config = Config {
            port: 0,
            pool_size: 1,
            ..Default::default()
        };
        let server = Server::bind(config).await.unwrap();
        assert!(server.local_addr().ip().is_loopback());
        assert_ne!(server.local_addr().port(), 0);
        assert_eq!(server.pool().size(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_end_to_end() {
        let server = start_server(4).await;

        let mut client = TcpStream::connect(server.addr).await.unwrap();
        assert!(got_ready(&mut client, Duration::from_secs(2)).await);

        client.write_all(b"^ab$cd^e$").await.unwrap();
        let mut buf = [0u8; 3];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x62, 0x63, 0x66]);

        client.write_all(b"^\xff$").await.unwrap();
        let mut wrapped = [0u8; 1];
        client.read_exact(&mut wrapped).await.unwrap();
        assert_eq!(wrapped[0], 0x00);

        drop(client);
        wait_for(|| server.stats().completed() == 1).await;

        server.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_empty_stream() {
        let server = start_server(2).await;

        let mut client = TcpStream::connect(server.addr).await.unwrap();
        client.shutdown().await.unwrap();

        let mut received = Vec::new();
        tokio::time::timeout(Duration::from_secs(2), client.read_to_end(&mut received))
            .await
            .expect("server did not close")
            .unwrap();
        assert_eq!(received, b"*");

        server.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_excess_connections_wait_for_a_worker() {
        const N: usize = 2;
        const K: usize = 3;

        let server = start_server(N).await;

        let mut clients = Vec::new();
        for _ in 0..N + K {
            clients.push(TcpStream::connect(server.addr).await.unwrap());
        }
        wait_for(|| server.stats().submitted() == (N + K) as u64).await;

        // Only N connections get picked up
        let mut served = Vec::new();
        let mut waiting = Vec::new();
        for mut client in clients {
            if got_ready(&mut client, Duration::from_millis(300)).await {
                served.push(client);
            } else {
                waiting.push(client);
            }
        }
        assert_eq!(served.len(), N);
        assert_eq!(waiting.len(), K);
        assert_eq!(server.stats().active(), N);
        assert_eq!(server.stats().queued(), K);

        // Freeing one slot lets exactly one waiting connection in
        drop(served.remove(0));
        wait_for(|| server.stats().completed() == 1).await;

        let mut newly_served = 0;
        for client in waiting.iter_mut() {
            if got_ready(client, Duration::from_millis(300)).await {
                newly_served += 1;
            }
        }
        assert_eq!(newly_served, 1);
        assert_eq!(server.stats().active(), N);

        drop(served);
        drop(waiting);
        wait_for(|| server.stats().completed() == (N + K) as u64).await;
        assert_eq!(server.stats().peak_active(), N);

        server.stop().await.unwrap();
    }

    /// Open descriptors in this process.
    #[cfg(target_os = "linux")]
    fn open_fds() -> usize {
        std::fs::read_dir("/proc/self/fd").unwrap().count()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_open_close_leaves_pool_idle() {
        const CONNECTIONS: u64 = 200;

        let server = start_server(4).await;
        #[cfg(target_os = "linux")]
        let fds_before = open_fds();

        for _ in 0..CONNECTIONS {
            let mut client = TcpStream::connect(server.addr).await.unwrap();
            assert!(got_ready(&mut client, Duration::from_secs(2)).await);
        }

        wait_for(|| server.stats().completed() == CONNECTIONS).await;
        assert_eq!(server.stats().active(), 0);
        assert_eq!(server.stats().queued(), 0);

        // Other tests share the process, so allow a little noise; a leak
        // would be two descriptors per connection.
        #[cfg(target_os = "linux")]
        {
            let fds_after = open_fds();
            assert!(
                fds_after <= fds_before + 32,
                "descriptors grew from {} to {}",
                fds_before,
                fds_after
            );
        }

        server.stop().await.unwrap();
    }

    #[test]
    fn test_accept_error_classification() {
        use io::ErrorKind;

        for kind in [
            ErrorKind::ConnectionAborted,
            ErrorKind::ConnectionReset,
            ErrorKind::Interrupted,
            ErrorKind::WouldBlock,
            ErrorKind::TimedOut,
        ] {
            assert!(!is_fatal_accept_error(&io::Error::from(kind)), "{:?}", kind);
        }

        // EMFILE: out of descriptors, retry after the backoff
        #[cfg(unix)]
        assert!(!is_fatal_accept_error(&io::Error::from_raw_os_error(24)));

        assert!(is_fatal_accept_error(&io::Error::from(ErrorKind::InvalidInput)));
        assert!(is_fatal_accept_error(&io::Error::from(ErrorKind::NotConnected)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shutdown_serves_queued_connections() {
        let server = start_server(1).await;
        let addr = server.addr;
        let pool = Arc::clone(&server.pool);

        let mut first = TcpStream::connect(addr).await.unwrap();
        assert!(got_ready(&mut first, Duration::from_secs(2)).await);

        let mut second = TcpStream::connect(addr).await.unwrap();
        wait_for(|| pool.stats().queued() == 1).await;

        let stopping = tokio::spawn(server.stop());

        // Listener goes away, but nothing already accepted is dropped
        wait_for(|| pool.is_shut_down()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!stopping.is_finished());

        first.write_all(b"^a$").await.unwrap();
        let mut buf = [0u8; 1];
        first.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf[0], b'b');
        drop(first);

        assert!(got_ready(&mut second, Duration::from_secs(2)).await);
        second.write_all(b"^y$").await.unwrap();
        second.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf[0], b'z');
        drop(second);

        stopping.await.unwrap().unwrap();
        assert_eq!(pool.stats().completed(), 2);
        assert!(TcpStream::connect(addr).await.is_err());
    }
}
