//! Server network layer: UDP sessions in, group events out

use crate::config::ServerConfig;
use crate::directory::{InMemoryDirectory, PlayerDirectory};
use crate::dispatcher::{Dispatcher, Outbound};
use crate::loot::LogResolver;
use crate::persistence::LogPersistence;
use crate::registry::GroupRegistry;
use crate::service::GroupService;
use crate::session_manager::SessionManager;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{ObjectGuid, Packet, WorldPacket, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    SessionTimeout { guid: ObjectGuid },
    Shutdown,
}

/// Main server coordinating sessions and the group service
pub struct Server {
    socket: Arc<UdpSocket>,
    sessions: Arc<RwLock<SessionManager>>,
    directory: Arc<InMemoryDirectory>,
    service: Arc<GroupService>,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    outbound_rx: mpsc::UnboundedReceiver<Outbound>,
}

impl Server {
    pub async fn new(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(&config.addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (dispatcher, outbound_rx) = Dispatcher::new();

        let directory = Arc::new(InMemoryDirectory::new());
        let registry = Arc::new(GroupRegistry::new(Arc::new(LogPersistence)));
        let service = Arc::new(GroupService::new(
            registry,
            directory.clone(),
            dispatcher,
            Arc::new(LogResolver),
            config.group.clone(),
        ));

        Ok(Server {
            socket,
            sessions: Arc::new(RwLock::new(SessionManager::new(
                config.max_sessions,
                config.session_timeout,
            ))),
            directory,
            service,
            server_tx,
            server_rx,
            outbound_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn service(&self) -> Arc<GroupService> {
        Arc::clone(&self.service)
    }

    /// Sender that can stop [`Server::run`] with [`ServerMessage::Shutdown`].
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) = server_tx.send(ServerMessage::PacketReceived { packet, addr }) {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that delivers dispatcher output to logged-in players
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let sessions = Arc::clone(&self.sessions);
        let mut outbound_rx = std::mem::replace(&mut self.outbound_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(Outbound { recipient, packet }) = outbound_rx.recv().await {
                let addr = {
                    let sessions = sessions.read().await;
                    sessions.addr_of(recipient)
                };

                match addr {
                    Some(addr) => {
                        if let Err(e) = Self::send_packet_impl(&socket, &Packet::World(packet), addr).await {
                            error!("Failed to send to {}: {}", recipient, e);
                        }
                    }
                    None => debug!("{} has no session, dropping 0x{:04X}", recipient, packet.opcode),
                }
            }
        });
    }

    /// Spawns task that monitors session timeouts
    fn spawn_timeout_checker(&self) {
        let sessions = Arc::clone(&self.sessions);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut sessions = sessions.write().await;
                    sessions.check_timeouts()
                };

                for session in timed_out {
                    info!("Session {} for {} timed out", session.id, session.guid);
                    if let Err(e) = server_tx.send(ServerMessage::SessionTimeout { guid: session.guid }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    /// Runs one session's world packets in order.
    async fn run_session_worker(
        service: Arc<GroupService>,
        guid: ObjectGuid,
        mut packets: mpsc::UnboundedReceiver<WorldPacket>,
    ) {
        while let Some(packet) = packets.recv().await {
            service.handle(guid, &packet).await;
        }
        debug!("Worker for {} stopped", guid);
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    async fn send_packet(&self, packet: &Packet, addr: SocketAddr) {
        if let Err(e) = Self::send_packet_impl(&self.socket, packet, addr).await {
            error!("Failed to send packet to {}: {}", addr, e);
        }
    }

    async fn refuse(&self, addr: SocketAddr, reason: &str) {
        info!("Refusing login from {}: {}", addr, reason);
        let packet = Packet::Disconnected {
            reason: reason.to_string(),
        };
        self.send_packet(&packet, addr).await;
    }

    /// Marks the player offline everywhere once their session is gone.
    async fn end_session(&self, guid: ObjectGuid) {
        self.directory.logout(guid);
        self.service.session_closed(guid).await;
    }

    async fn close_session(&self, session_id: u32) {
        let session = {
            let mut sessions = self.sessions.write().await;
            sessions.remove_session(session_id)
        };
        if let Some(session) = session {
            self.end_session(session.guid).await;
        }
    }

    /// Processes incoming packets
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Login {
                client_version,
                profile,
            } => {
                info!(
                    "Login from {} as {:?} (version: {})",
                    addr, profile.name, client_version
                );

                if client_version != PROTOCOL_VERSION {
                    return self.refuse(addr, "Protocol version mismatch").await;
                }

                // Remove existing session from this address or for this character
                let existing = {
                    let sessions = self.sessions.read().await;
                    let by_addr = sessions.find_by_addr(addr);
                    let by_guid = self
                        .directory
                        .guid_by_name(&profile.name)
                        .and_then(|guid| sessions.find_by_guid(guid));
                    [by_addr, by_guid]
                };
                for session_id in existing.into_iter().flatten() {
                    self.close_session(session_id).await;
                }

                if self.sessions.read().await.is_full() {
                    return self.refuse(addr, "Server full").await;
                }
                let Some(guid) = self.directory.login(profile) else {
                    return self.refuse(addr, "Invalid name").await;
                };

                let (worker_tx, worker_rx) = mpsc::unbounded_channel();
                let session_id = {
                    let mut sessions = self.sessions.write().await;
                    sessions.add_session(addr, guid, worker_tx)
                };
                if session_id.is_none() {
                    self.directory.logout(guid);
                    return self.refuse(addr, "Server full").await;
                }
                tokio::spawn(Self::run_session_worker(self.service(), guid, worker_rx));

                self.send_packet(&Packet::LoggedIn { guid }, addr).await;
                self.service.session_opened(guid).await;
            }

            Packet::Heartbeat => {
                let mut sessions = self.sessions.write().await;
                if !sessions.touch(addr) {
                    debug!("Heartbeat from unknown address {}", addr);
                }
            }

            Packet::World(world) => {
                let mut sessions = self.sessions.write().await;
                let session = sessions
                    .find_by_addr(addr)
                    .and_then(|id| sessions.get_mut(id));
                match session {
                    Some(session) => {
                        if !session.submit(world) {
                            error!("Worker for {} is gone", session.guid);
                        }
                    }
                    None => warn!("World packet from {} without a session", addr),
                }
            }

            Packet::Logout => {
                let session_id = {
                    let sessions = self.sessions.read().await;
                    sessions.find_by_addr(addr)
                };

                if let Some(session_id) = session_id {
                    self.close_session(session_id).await;
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Main server loop
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut ready_check_tick = interval(Duration::from_secs(1));

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::SessionTimeout { guid }) => {
                            self.end_session(guid).await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = ready_check_tick.tick() => {
                    self.service.expire_ready_checks(Instant::now()).await;

                    let session_count = self.sessions.read().await.len();
                    if session_count > 0 {
                        debug!("{} sessions, {} groups", session_count, self.service.registry().group_count());
                    }
                },
            }
        }

        Ok(())
    }
}
