//! Tokio driver: one current-thread event loop owning the `ServerState`.

use crate::dns::state::{Ports, ServerState};
use lodestone_dns_application::ports::{AllowAll, Clock, RejectAll, Scheduler, Transport};
use lodestone_dns_domain::{Config, DomainError};
use std::cell::Cell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

const MAX_DATAGRAM: usize = 65_535;
const STREAM_TIMEOUT: Duration = Duration::from_secs(10);

type StreamReply = (SocketAddr, Vec<u8>);

/// Sends through the two bound sockets; stream exchanges run as local
/// tasks and hand their reply back to the loop.
struct SocketTransport {
    client: Rc<UdpSocket>,
    upstream: Rc<UdpSocket>,
    stream_replies: mpsc::UnboundedSender<StreamReply>,
}

impl Transport for SocketTransport {
    fn send_to_client(&self, client: SocketAddr, bytes: &[u8]) -> Result<(), DomainError> {
        self.client
            .try_send_to(bytes, client)
            .map(|_| ())
            .map_err(|_| DomainError::ServerUnreachable)
    }

    fn send_datagram(&self, server: SocketAddr, bytes: &[u8]) -> Result<(), DomainError> {
        self.upstream
            .try_send_to(bytes, server)
            .map(|_| ())
            .map_err(|_| DomainError::ServerUnreachable)
    }

    fn send_stream(&self, server: SocketAddr, bytes: &[u8]) -> Result<(), DomainError> {
        let message = bytes.to_vec();
        let replies = self.stream_replies.clone();
        tokio::task::spawn_local(async move {
            match tokio::time::timeout(STREAM_TIMEOUT, stream_exchange(server, &message)).await {
                Ok(Ok(reply)) => {
                    let _ = replies.send((server, reply));
                }
                Ok(Err(e)) => debug!(server = %server, error = %e, "Stream exchange failed"),
                Err(_) => debug!(server = %server, "Stream exchange timed out"),
            }
        });
        Ok(())
    }
}

async fn stream_exchange(server: SocketAddr, message: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut stream = TcpStream::connect(server).await?;
    stream.set_nodelay(true)?;
    let len = u16::try_from(message.len()).map_err(|_| std::io::ErrorKind::InvalidInput)?;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(message).await?;
    let mut prefix = [0u8; 2];
    stream.read_exact(&mut prefix).await?;
    let mut reply = vec![0u8; usize::from(u16::from_be_bytes(prefix))];
    stream.read_exact(&mut reply).await?;
    Ok(reply)
}

/// Records the armed deadline for the loop to sleep on.
#[derive(Clone, Default)]
struct TimerScheduler {
    deadline: Rc<Cell<Option<u64>>>,
}

impl Scheduler for TimerScheduler {
    fn arm(&self, deadline_ms: u64) {
        self.deadline.set(Some(deadline_ms));
    }

    fn disarm(&self) {
        self.deadline.set(None);
    }
}

#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

pub struct DnsServer {
    state: ServerState,
    client: Rc<UdpSocket>,
    upstream: Rc<UdpSocket>,
    deadline: Rc<Cell<Option<u64>>>,
    stream_replies: mpsc::UnboundedReceiver<StreamReply>,
    cleaning_interval: Duration,
}

impl DnsServer {
    /// Binds both sockets and builds the resolver state. Must run inside a
    /// `LocalSet`.
    pub async fn bind(config: Config) -> Result<Self, DomainError> {
        let client = UdpSocket::bind(config.server.listen_address.as_str())
            .await
            .map_err(|e| DomainError::ConfigError(format!("bind {}: {}", config.server.listen_address, e)))?;
        let upstream = UdpSocket::bind(config.server.upstream_bind_address.as_str())
            .await
            .map_err(|e| {
                DomainError::ConfigError(format!("bind {}: {}", config.server.upstream_bind_address, e))
            })?;
        let client = Rc::new(client);
        let upstream = Rc::new(upstream);
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = TimerScheduler::default();
        let deadline = scheduler.deadline.clone();

        if !config.resolver.server_keys.is_empty() {
            warn!("Server keys configured but no signature verifier is available; signed exchanges will fail");
        }
        let cleaning_interval = Duration::from_secs(config.cache.cleaning_interval_secs.max(1));
        let ports = Ports {
            transport: Box::new(SocketTransport {
                client: client.clone(),
                upstream: upstream.clone(),
                stream_replies: tx,
            }),
            scheduler: Box::new(scheduler),
            clock: Box::new(SystemClock),
            access: Box::new(AllowAll),
            verifier: Box::new(RejectAll),
        };
        let state = ServerState::new(config, ports)?;
        info!(
            listen = ?client.local_addr().ok(),
            upstream = ?upstream.local_addr().ok(),
            "DNS server bound"
        );
        Ok(Self {
            state,
            client,
            upstream,
            deadline,
            stream_replies: rx,
            cleaning_interval,
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.client.local_addr().ok()
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// Runs until interrupted.
    pub async fn run(mut self) -> Result<(), DomainError> {
        fatal_check(self.state.start_priming());

        let mut client_buf = vec![0u8; MAX_DATAGRAM];
        let mut upstream_buf = vec![0u8; MAX_DATAGRAM];
        let mut cleaning = tokio::time::interval(self.cleaning_interval);
        cleaning.set_missed_tick_behavior(MissedTickBehavior::Delay);
        cleaning.tick().await;

        loop {
            let armed = self.deadline.get();
            let wake = armed.map(|at| {
                let now = SystemClock.now_ms();
                Instant::now() + Duration::from_millis(at.saturating_sub(now))
            });
            let sleep_target = wake.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                received = self.client.recv_from(&mut client_buf) => match received {
                    Ok((len, from)) => fatal_check(self.state.handle_client_datagram(from, &client_buf[..len])),
                    Err(e) => debug!(error = %e, "Client socket receive failed"),
                },
                received = self.upstream.recv_from(&mut upstream_buf) => match received {
                    Ok((len, from)) => fatal_check(self.state.handle_upstream_datagram(from, &upstream_buf[..len])),
                    Err(e) => debug!(error = %e, "Upstream socket receive failed"),
                },
                Some((from, reply)) = self.stream_replies.recv() => {
                    fatal_check(self.state.handle_upstream_datagram(from, &reply));
                }
                _ = tokio::time::sleep_until(sleep_target), if wake.is_some() => {
                    self.deadline.set(None);
                    fatal_check(self.state.handle_timer());
                }
                _ = cleaning.tick() => {
                    if let Err(e) = self.state.purge_stale() {
                        fatal_check(Err(e));
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down");
                    return Ok(());
                }
            }
        }
    }
}

/// Runs the server on a current-thread runtime until interrupted.
pub fn serve(config: Config) -> Result<(), DomainError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| DomainError::ConfigError(format!("runtime: {}", e)))?;
    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, async move { DnsServer::bind(config).await?.run().await })
}

/// Aborts on `FatalInvariant`; other errors are only logged.
fn fatal_check(result: Result<(), DomainError>) {
    if let Err(e) = result {
        if e.is_fatal() {
            error!(error = %e, "Fatal invariant violated, aborting");
            std::process::abort();
        }
        warn!(error = %e, "Handler failed");
    }
}
