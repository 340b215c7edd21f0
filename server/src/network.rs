//! UDP transport: datagram framing, acknowledgements and connection tasks
//!
//! One receiver task reads the socket and routes each datagram to the task
//! of the connection it came from. A connection task handles its datagrams
//! strictly in order, writes everything queued on its [`ConnectionHandle`]
//! back to the socket, and gives up on the peer once it has been silent for
//! the connection timeout.

use crate::connection::{ConnectionHandle, Outbound};
use crate::error::ServerError;
use crate::handler;
use crate::matchmaker;
use crate::messages;
use crate::state::ServerState;
use dashmap::DashMap;
use log::{debug, error, info, trace, warn};
use shared::protocol::SendOption;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::Instant;

const MAX_DATAGRAM: usize = 65_535;

/// Reliable nonces remembered for duplicate detection
const NONCE_WINDOW: usize = 64;

/// Recently seen reliable nonces of one connection
#[derive(Debug, Default)]
pub struct NonceWindow {
    recent: VecDeque<u16>,
}

impl NonceWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the nonce; false if it was already seen recently
    pub fn first_seen(&mut self, nonce: u16) -> bool {
        if self.recent.contains(&nonce) {
            return false;
        }
        if self.recent.len() == NONCE_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(nonce);
        true
    }
}

fn read_nonce(datagram: &[u8]) -> Option<u16> {
    match datagram {
        [_, high, low, ..] => Some(u16::from_be_bytes([*high, *low])),
        _ => None,
    }
}

pub fn ack_datagram(nonce: u16) -> Vec<u8> {
    let [high, low] = nonce.to_be_bytes();
    vec![SendOption::Acknowledgement.as_u8(), high, low, 0xFF]
}

/// Writes queued outbound items as datagrams
#[derive(Debug, Default)]
pub struct Encoder {
    next_nonce: u16,
}

impl Encoder {
    pub fn encode(&mut self, outbound: Outbound) -> Vec<u8> {
        match outbound {
            Outbound::Data {
                bytes,
                reliable: true,
            } => {
                self.next_nonce = self.next_nonce.wrapping_add(1);
                let [high, low] = self.next_nonce.to_be_bytes();
                let mut datagram = Vec::with_capacity(bytes.len() + 3);
                datagram.extend_from_slice(&[SendOption::Reliable.as_u8(), high, low]);
                datagram.extend_from_slice(&bytes);
                datagram
            }
            Outbound::Data {
                bytes,
                reliable: false,
            } => {
                let mut datagram = Vec::with_capacity(bytes.len() + 1);
                datagram.push(SendOption::None.as_u8());
                datagram.extend_from_slice(&bytes);
                datagram
            }
            Outbound::Disconnect { reason, message } => {
                let mut datagram = vec![SendOption::Disconnect.as_u8(), 1];
                datagram.extend_from_slice(&messages::disconnect_payload(reason, message.as_deref()));
                datagram
            }
        }
    }
}

type Routes = DashMap<SocketAddr, mpsc::UnboundedSender<Vec<u8>>>;

/// Listening socket plus the routing table of live connections
pub struct Server {
    socket: Arc<UdpSocket>,
    state: Arc<ServerState>,
    routes: Arc<Routes>,
}

impl Server {
    pub async fn bind(state: Arc<ServerState>) -> Result<Self, ServerError> {
        let addr = state.config.listen_addr()?;
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        Ok(Server {
            socket,
            state,
            routes: Arc::new(Routes::new()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// Receives datagrams until the socket fails for good
    pub async fn run(self) -> Result<(), ServerError> {
        let mut buffer = vec![0u8; MAX_DATAGRAM];

        loop {
            let (len, addr) = match self.socket.recv_from(&mut buffer).await {
                Ok(received) => received,
                Err(e) => {
                    // ICMP errors from earlier sends surface here on some platforms
                    error!("Error receiving packet: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    continue;
                }
            };
            if len == 0 {
                continue;
            }
            self.route(addr, buffer[..len].to_vec());
        }
    }

    fn route(&self, addr: SocketAddr, datagram: Vec<u8>) {
        let datagram = match self.routes.get(&addr) {
            Some(route) => match route.send(datagram) {
                Ok(()) => return,
                Err(mpsc::error::SendError(datagram)) => datagram,
            },
            None => datagram,
        };

        if datagram[0] != SendOption::Hello.as_u8() {
            trace!("Ignoring datagram from unknown peer {}", addr);
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        // The task has not started yet, so this cannot fail
        let _ = tx.send(datagram);
        self.routes.insert(addr, tx);
        debug!("New connection from {}", addr);

        let task = ConnectionTask {
            socket: Arc::clone(&self.socket),
            state: Arc::clone(&self.state),
            routes: Arc::clone(&self.routes),
            addr,
        };
        tokio::spawn(task.run(rx));
    }
}

struct ConnectionTask {
    socket: Arc<UdpSocket>,
    state: Arc<ServerState>,
    routes: Arc<Routes>,
    addr: SocketAddr,
}

/// What a connection task does after an inbound datagram
enum Flow {
    Continue,
    Close,
}

impl ConnectionTask {
    async fn run(self, mut inbound: mpsc::UnboundedReceiver<Vec<u8>>) {
        let (handle, mut outbound) = ConnectionHandle::new(self.addr);
        let timeout = self.state.config.connection_timeout();
        let mut encoder = Encoder::default();
        let mut window = NonceWindow::new();
        let mut client_id = None;
        let mut deadline = Instant::now() + timeout;

        loop {
            tokio::select! {
                datagram = inbound.recv() => {
                    let Some(datagram) = datagram else { break };
                    deadline = Instant::now() + timeout;

                    let flow = self
                        .receive(&handle, &mut window, &mut client_id, &datagram)
                        .await;
                    if let Flow::Close = flow {
                        debug!("{} closed the connection", self.addr);
                        break;
                    }
                }
                item = outbound.recv() => {
                    let Some(item) = item else { break };
                    let closing = matches!(item, Outbound::Disconnect { .. });
                    self.send(&encoder.encode(item)).await;
                    if closing {
                        break;
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    info!("Connection {} timed out", self.addr);
                    break;
                }
            }
        }

        // A new connection from the same address may already own the route
        drop(inbound);
        self.routes.remove_if(&self.addr, |_, route| route.is_closed());
        drop(outbound);
        if let Some(client_id) = client_id {
            handler::handle_disconnect(&self.state, client_id).await;
        }
    }

    async fn send(&self, datagram: &[u8]) {
        if let Err(e) = self.socket.send_to(datagram, self.addr).await {
            warn!("Failed to send to {}: {}", self.addr, e);
        }
    }

    async fn receive(
        &self,
        handle: &ConnectionHandle,
        window: &mut NonceWindow,
        client_id: &mut Option<i32>,
        datagram: &[u8],
    ) -> Flow {
        let Some(option) = datagram.first().copied().and_then(SendOption::from_u8) else {
            trace!("Unknown send option from {}", self.addr);
            return Flow::Continue;
        };

        match option {
            SendOption::Hello => {
                let Some(nonce) = read_nonce(datagram) else {
                    return Flow::Continue;
                };
                self.send(&ack_datagram(nonce)).await;

                if client_id.is_none() && window.first_seen(nonce) {
                    // Skip the transport version byte
                    let payload = datagram.get(4..).unwrap_or_default();
                    *client_id = matchmaker::accept(&self.state, handle.clone(), payload);
                }
            }
            SendOption::Reliable => {
                let Some(nonce) = read_nonce(datagram) else {
                    return Flow::Continue;
                };
                self.send(&ack_datagram(nonce)).await;

                if window.first_seen(nonce) {
                    if let Some(id) = *client_id {
                        handler::handle_payload(&self.state, id, &datagram[3..], true).await;
                    }
                }
            }
            SendOption::None => {
                if let Some(id) = *client_id {
                    handler::handle_payload(&self.state, id, &datagram[1..], false).await;
                }
            }
            SendOption::Ping => {
                if let Some(nonce) = read_nonce(datagram) {
                    self.send(&ack_datagram(nonce)).await;
                }
            }
            SendOption::Acknowledgement => {}
            SendOption::Disconnect => return Flow::Close,
        }
        Flow::Continue
    }
}
