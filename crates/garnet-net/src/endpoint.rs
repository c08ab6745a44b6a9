//! The connection manager: one UDP endpoint running in server or client role.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use garnet_binary::{Readable, Writable};
use log::{debug, error, info, trace, warn};
use rand::Rng;

use crate::error::NetError;
use crate::peer::{Peer, QueuedPacket, SequenceStatus};
use crate::protocol::{
    Header, CLIENT_RETRY_SECS, FLAG_NO_ACK_CHECK, FLAG_RESENDING, HEADER_LEN, ID_MASK,
    INVALID_NOTICE_SECS, MAX_RECEIVED_SIZE,
};
use crate::reliability;

/// Whether an endpoint drives the server or the client side of connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// Delivery metadata handed to the received callback along with a payload.
#[derive(Debug, Clone, Copy)]
pub struct ReceiveMeta {
    /// The datagram arrived behind a newer one.
    pub out_of_order: bool,
    /// The sender marked the payload as a retransmission.
    pub resent: bool,
    /// The sender tracks this packet for retransmission.
    pub ack_checked: bool,
}

/// Callback invoked with `(payload, peer, metadata)` for every payload-bearing
/// datagram that survives validation.
pub type ReceivedCallback = Box<dyn FnMut(&[u8], Ipv4Addr, ReceiveMeta)>;

/// Callback invoked with a peer address on connect or disconnect.
pub type PeerCallback = Box<dyn FnMut(Ipv4Addr)>;

/// A reliable UDP endpoint.
///
/// Owns one non-blocking UDP socket (created lazily on the first tick) and
/// the state of every connected peer. The caller drives it by calling
/// [`Endpoint::tick`] periodically from a single thread; all callbacks fire
/// synchronously from inside that call.
pub struct Endpoint {
    role: Role,
    server_port: u16,
    client_port: u16,
    broadcast: bool,

    /// Accept new connections (server), or allow connecting to a server
    /// (client). Clearing this stops a client from retrying a connection.
    pub accept_new: bool,
    /// Drop out-of-order datagrams instead of surfacing them.
    pub ignore_out_of_sequence: bool,
    /// Re-queue payloads of packets unacknowledged past the lost-packet
    /// timeout.
    pub resend_timed_out_packets: bool,

    socket: Option<UdpSocket>,
    peers: HashMap<Ipv4Addr, Peer>,
    server_addr: Option<Ipv4Addr>,

    initialized: bool,
    valid: bool,
    invalid_notice_timer: f32,
    client_retry_timer: f32,

    on_received: Option<ReceivedCallback>,
    on_connected: Option<PeerCallback>,
    on_disconnected: Option<PeerCallback>,
}

impl Endpoint {
    /// Creates an endpoint without touching the network; the socket is set
    /// up on the first [`Endpoint::tick`].
    ///
    /// A server binds to `server_port`. A client binds to `client_port`
    /// (0 lets the OS choose) and talks to a server on `server_port`; with
    /// `broadcast` set it discovers the server by broadcasting its
    /// connection requests instead of needing [`Endpoint::connect_to`].
    pub fn new(role: Role, server_port: u16, client_port: u16, broadcast: bool) -> Self {
        Self {
            role,
            server_port,
            client_port,
            broadcast,
            accept_new: true,
            ignore_out_of_sequence: false,
            resend_timed_out_packets: true,
            socket: None,
            peers: HashMap::new(),
            server_addr: None,
            initialized: false,
            valid: false,
            invalid_notice_timer: INVALID_NOTICE_SECS,
            client_retry_timer: CLIENT_RETRY_SECS,
            on_received: None,
            on_connected: None,
            on_disconnected: None,
        }
    }

    /// Stores the server address a client will connect to. Ignored unless
    /// the endpoint runs as a client.
    pub fn connect_to(&mut self, address: Ipv4Addr) {
        if self.role != Role::Client {
            return;
        }
        debug!("storing server address {address}");
        self.server_addr = Some(address);
    }

    /// Drives the endpoint: transmissions, reception, connection upkeep.
    ///
    /// Expected to be called periodically from a game loop, with `dt` the
    /// seconds elapsed since the previous call. Never blocks or sleeps.
    pub fn tick(&mut self, dt: f32) {
        if !self.initialized {
            debug!("lazy initializing endpoint");
            if let Err(err) = self.initialize() {
                error!("{err}");
            }
            self.initialized = true;
        }

        if !self.valid {
            self.invalid_notice_timer -= dt;
            if self.invalid_notice_timer <= 0.0 {
                warn!("endpoint is in an invalid state, not doing anything");
                self.invalid_notice_timer = INVALID_NOTICE_SECS;
            }
            return;
        }

        let now = Instant::now();

        for peer in self.peers.values_mut() {
            let good_rtt = peer.good_rtt;
            peer.flow.advance(dt, good_rtt);
            peer.advance_send_timer(dt);
        }

        match self.role {
            Role::Server => self.tick_server(now),
            Role::Client => self.tick_client(dt, now),
        }
    }

    /// Queues `payload` for transmission to a connected peer. With
    /// `ack_checked` false the packet is exempt from retransmission
    /// tracking.
    pub fn send(&mut self, payload: &[u8], peer: Ipv4Addr, ack_checked: bool) {
        match self.peers.get_mut(&peer) {
            Some(state) => state.enqueue(QueuedPacket {
                payload: Bytes::copy_from_slice(payload),
                resending: false,
                ack_exempt: !ack_checked,
            }),
            None => warn!("tried to queue a packet to nonexistent recipient {peer}"),
        }
    }

    /// The smoothed round-trip time of an arbitrary connected peer, or zero
    /// when there are none.
    pub fn rtt(&self) -> Duration {
        self.peers.values().next().map_or(Duration::ZERO, |p| p.rtt)
    }

    /// The smoothed round-trip time of the given peer, or zero when it is
    /// not connected.
    pub fn rtt_to(&self, peer: Ipv4Addr) -> Duration {
        self.peers.get(&peer).map_or(Duration::ZERO, |p| p.rtt)
    }

    /// Whether an arbitrary connection runs in good mode. Mostly useful on
    /// the client, where at most one connection exists.
    pub fn connection_is_good(&self) -> bool {
        self.peers.values().next().is_some_and(|p| p.flow.is_good())
    }

    /// Whether the connection to the given peer runs in good mode.
    pub fn connection_is_good_to(&self, peer: Ipv4Addr) -> bool {
        self.peers.get(&peer).is_some_and(|p| p.flow.is_good())
    }

    /// Addresses of all connected peers.
    pub fn connected_peers(&self) -> Vec<Ipv4Addr> {
        self.peers.keys().copied().collect()
    }

    /// Number of queued packets awaiting transmission to the given peer.
    pub fn queue_len(&self, peer: Ipv4Addr) -> usize {
        self.peers.get(&peer).map_or(0, |p| p.send_queue.len())
    }

    /// Drops every queued packet for the given peer.
    pub fn clear_queue(&mut self, peer: Ipv4Addr) {
        if let Some(state) = self.peers.get_mut(&peer) {
            state.send_queue.clear();
        }
    }

    pub fn set_received_callback(
        &mut self,
        callback: impl FnMut(&[u8], Ipv4Addr, ReceiveMeta) + 'static,
    ) {
        self.on_received = Some(Box::new(callback));
    }

    pub fn set_connected_callback(&mut self, callback: impl FnMut(Ipv4Addr) + 'static) {
        self.on_connected = Some(Box::new(callback));
    }

    pub fn set_disconnected_callback(&mut self, callback: impl FnMut(Ipv4Addr) + 'static) {
        self.on_disconnected = Some(Box::new(callback));
    }

    /// Sets whether a client broadcasts its connection requests. Takes full
    /// effect before the lazy socket setup; afterwards it only changes the
    /// request's destination address.
    pub fn set_broadcast(&mut self, broadcast: bool) {
        self.broadcast = broadcast;
    }

    /// Tears everything down and re-enters the unconnected, uninitialised
    /// state, possibly under a different role or ports.
    pub fn reset(&mut self, role: Role, server_port: u16, client_port: u16, broadcast: bool) {
        self.role = role;
        self.server_port = server_port;
        self.client_port = client_port;
        self.broadcast = broadcast;
        self.socket = None;
        self.peers.clear();
        self.server_addr = None;
        self.initialized = false;
        self.valid = false;
        self.invalid_notice_timer = INVALID_NOTICE_SECS;
        self.client_retry_timer = CLIENT_RETRY_SECS;
    }

    pub fn role(&self) -> Role {
        self.role
    }

    fn initialize(&mut self) -> Result<(), NetError> {
        if self.valid {
            return Ok(());
        }
        let port = match self.role {
            Role::Server => self.server_port,
            Role::Client => self.client_port,
        };
        let socket =
            UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).map_err(NetError::SocketSetup)?;
        socket.set_nonblocking(true).map_err(NetError::SocketSetup)?;
        if self.broadcast {
            socket.set_broadcast(true).map_err(NetError::SocketSetup)?;
        }
        self.socket = Some(socket);
        self.valid = true;
        Ok(())
    }

    fn tick_server(&mut self, now: Instant) {
        let timed_out: Vec<Ipv4Addr> = self
            .peers
            .iter()
            .filter(|(_, peer)| peer.timed_out(now))
            .map(|(address, _)| *address)
            .collect();
        for address in timed_out {
            debug!("disconnected {address}");
            self.unregister_peer(address);
        }

        self.flush_sends(now);

        if let Err(err) = self.poll_socket(now) {
            log_drop(&err);
        }
    }

    fn tick_client(&mut self, dt: f32, now: Instant) {
        if !self.peers.is_empty() {
            let Some(server_addr) = self.server_addr else {
                return;
            };
            if self.peers.get(&server_addr).is_some_and(|p| p.timed_out(now)) {
                debug!("disconnected from server {server_addr}");
                self.unregister_peer(server_addr);
                return;
            }

            self.flush_sends(now);

            if let Err(err) = self.poll_socket(now) {
                log_drop(&err);
            }
        } else if self.accept_new {
            self.client_retry_timer += dt;
            if self.client_retry_timer >= CLIENT_RETRY_SECS
                && (self.server_addr.is_some() || self.broadcast)
            {
                self.client_retry_timer = 0.0;
                self.send_connect_request();
            }

            if let Err(err) = self.poll_connect_reply() {
                log_drop(&err);
            }
        }
    }

    /// Transmits one datagram to every peer whose send trigger is armed.
    fn flush_sends(&mut self, now: Instant) {
        let Some(socket) = self.socket.as_ref() else {
            return;
        };

        for (address, peer) in self.peers.iter_mut() {
            if !peer.trigger_send {
                continue;
            }
            peer.trigger_send = false;

            let packet = peer.next_outgoing();
            let sequence = peer.next_sequence();

            let mut flags = 0u32;
            if packet.ack_exempt {
                flags |= FLAG_NO_ACK_CHECK;
            } else if packet.resending {
                flags |= FLAG_RESENDING;
            }
            let header = Header {
                peer_id: peer.id,
                flags,
                sequence,
                ack: peer.remote_seq,
                ack_bits: peer.ack_bits,
            };

            let mut buf = BytesMut::with_capacity(HEADER_LEN + packet.payload.len());
            if let Err(err) = header.write(&mut buf) {
                error!("failed to encode header: {err}");
                continue;
            }
            buf.extend_from_slice(&packet.payload);
            let datagram = buf.freeze();

            let destination = SocketAddrV4::new(*address, peer.port);
            match socket.send_to(&datagram, destination) {
                Ok(sent) if sent == datagram.len() => {
                    trace!("sent packet {sequence} to {destination}");
                }
                Ok(_) => error!("short send of packet {sequence} to {destination}"),
                Err(err) => error!("failed to send packet to {destination}: {err}"),
            }

            // Lost sends stay in the history so acknowledgement accounting
            // and retransmission still line up.
            if packet.ack_exempt {
                peer.record_sent(sequence, None, true, now);
            } else {
                peer.record_sent(sequence, Some(datagram), false, now);
            }
        }
    }

    /// One non-blocking receive attempt. Returns `Ok(None)` when no datagram
    /// of at least header size from an IPv4 source is available.
    fn recv_datagram(&mut self) -> Result<Option<(Bytes, SocketAddrV4)>, NetError> {
        let Some(socket) = self.socket.as_ref() else {
            return Ok(None);
        };
        let mut buf = [0u8; MAX_RECEIVED_SIZE];
        match socket.recv_from(&mut buf) {
            Ok((len, SocketAddr::V4(source))) if len >= HEADER_LEN => {
                Ok(Some((Bytes::copy_from_slice(&buf[..len]), source)))
            }
            Ok(_) => Ok(None),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(NetError::Io(err)),
        }
    }

    /// Receives and processes one datagram on a connected endpoint.
    fn poll_socket(&mut self, now: Instant) -> Result<(), NetError> {
        let Some((data, source)) = self.recv_datagram()? else {
            return Ok(());
        };
        let address = *source.ip();

        // A client only listens to the server it connected to.
        if self.role == Role::Client {
            match self.server_addr {
                Some(server) if address == server && source.port() == self.server_port => {}
                _ => return Ok(()),
            }
        }

        self.handle_datagram(&data, address, source.port(), now)
    }

    /// Validates and applies one received datagram.
    fn handle_datagram(
        &mut self,
        data: &[u8],
        address: Ipv4Addr,
        port: u16,
        now: Instant,
    ) -> Result<(), NetError> {
        let mut reader = data;
        let header = Header::read(&mut reader)?;

        if header.is_connect() {
            if self.role == Role::Server && self.accept_new && !self.peers.contains_key(&address) {
                info!("establishing new connection with {address}");
                let id = self.generate_peer_id();
                self.register_peer(address, id, port);
                if let Some(peer) = self.peers.get_mut(&address) {
                    peer.trigger_send = true;
                }
            }
            return Ok(());
        }

        if header.is_ping() {
            match self.peers.get_mut(&address) {
                Some(peer) => peer.trigger_send = true,
                None => return Err(NetError::UnknownPeer(address)),
            }
        } else {
            match self.peers.get(&address) {
                None => return Err(NetError::UnknownPeer(address)),
                Some(peer) if peer.id != header.peer_id => {
                    return Err(NetError::IdMismatch {
                        peer: address,
                        got: header.peer_id,
                    });
                }
                Some(_) => {}
            }
        }

        trace!("valid packet {} received from {address}", header.sequence);

        let ignore_out_of_sequence = self.ignore_out_of_sequence;
        let resend_timed_out = self.resend_timed_out_packets;
        let Some(peer) = self.peers.get_mut(&address) else {
            return Ok(());
        };

        reliability::update_rtt(peer, header.ack, now);
        peer.last_recv_at = now;
        if resend_timed_out {
            reliability::requeue_timed_out(peer, header.ack, header.ack_bits, now);
        }

        let out_of_order = match peer.accept_sequence(header.sequence) {
            SequenceStatus::Duplicate => return Err(NetError::Duplicate(header.sequence)),
            SequenceStatus::InOrder => false,
            SequenceStatus::OutOfOrder => {
                if ignore_out_of_sequence {
                    return Ok(());
                }
                trace!("out of order packet {} from {address}", header.sequence);
                true
            }
        };

        let payload = &data[HEADER_LEN..];
        if !payload.is_empty() {
            let meta = ReceiveMeta {
                out_of_order,
                resent: header.is_resending(),
                ack_checked: !header.is_no_ack_check(),
            };
            if let Some(callback) = self.on_received.as_mut() {
                callback(payload, address, meta);
            }
        }
        Ok(())
    }

    /// Sends one minimal connection request toward the server or the
    /// broadcast address.
    fn send_connect_request(&mut self) {
        let Some(socket) = self.socket.as_ref() else {
            return;
        };
        debug!("establishing connection with server");

        let mut buf = BytesMut::with_capacity(HEADER_LEN);
        if let Err(err) = Header::connect_request().write(&mut buf) {
            error!("failed to encode connection request: {err}");
            return;
        }

        let target = if self.broadcast {
            Ipv4Addr::BROADCAST
        } else {
            match self.server_addr {
                Some(address) => address,
                None => return,
            }
        };
        let destination = SocketAddrV4::new(target, self.server_port);
        match socket.send_to(&buf, destination) {
            Ok(sent) if sent == buf.len() => {}
            Ok(_) => error!("short send of connection request to {destination}"),
            Err(err) => error!("failed to send connection request to {destination}: {err}"),
        }
    }

    /// Receives the server's reply to a connection request and registers the
    /// connection.
    fn poll_connect_reply(&mut self) -> Result<(), NetError> {
        let Some((data, source)) = self.recv_datagram()? else {
            return Ok(());
        };
        if source.port() != self.server_port {
            return Ok(());
        }

        let mut reader = &data[..];
        let header = Header::read(&mut reader)?;

        // In broadcast mode the first valid reply names the server.
        if self.broadcast {
            self.server_addr = Some(*source.ip());
        }
        match self.server_addr {
            Some(server) if server == *source.ip() => {}
            _ => return Ok(()),
        }

        info!("connection established with server {}", source.ip());
        self.register_peer(*source.ip(), header.peer_id & ID_MASK, self.server_port);
        Ok(())
    }

    /// Draws a fresh 28-bit id distinct from every live peer's id.
    fn generate_peer_id(&self) -> u32 {
        let mut rng = rand::rng();
        loop {
            let id = rng.random::<u32>() & ID_MASK;
            if !self.peers.values().any(|peer| peer.id == id) {
                return id;
            }
        }
    }

    fn register_peer(&mut self, address: Ipv4Addr, id: u32, port: u16) {
        // The server opens its sequence space at 0; the client at 1, so its
        // first packet is not eaten by the server's duplicate check against
        // a fresh remote sequence of 0.
        let initial_seq = match self.role {
            Role::Server => 0,
            Role::Client => 1,
        };
        self.peers.insert(address, Peer::new(id, initial_seq, port));
        if let Some(callback) = self.on_connected.as_mut() {
            callback(address);
        }
    }

    fn unregister_peer(&mut self, address: Ipv4Addr) {
        if self.peers.remove(&address).is_some() {
            if let Some(callback) = self.on_disconnected.as_mut() {
                callback(address);
            }
        } else {
            warn!("no registered connection for {address}");
        }
    }
}

fn log_drop(err: &NetError) {
    match err {
        NetError::Io(_) => warn!("receive failed: {err}"),
        _ => trace!("dropping datagram: {err}"),
    }
}
