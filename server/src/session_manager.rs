//! Logged-in sessions and the address each player is reachable at
//!
//! This module handles the server-side bookkeeping of player sessions:
//! - Session lifecycle (login, logout, timeout)
//! - Routing between socket addresses and player GUIDs
//! - Capacity enforcement
//!
//! Every session owns a worker channel. Packets for one session are pushed
//! into it in arrival order and handled by a single task, so one player's
//! commands never overtake each other while different players run in
//! parallel.

use log::info;
use shared::{ObjectGuid, WorldPacket};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// A logged-in player and where to reach them
#[derive(Debug)]
pub struct Session {
    /// Server-assigned session identifier
    pub id: u32,
    pub guid: ObjectGuid,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this session
    pub last_seen: Instant,
    worker: mpsc::UnboundedSender<WorldPacket>,
}

impl Session {
    pub fn new(id: u32, guid: ObjectGuid, addr: SocketAddr, worker: mpsc::UnboundedSender<WorldPacket>) -> Self {
        Self {
            id,
            guid,
            addr,
            last_seen: Instant::now(),
            worker,
        }
    }

    /// Queues a world packet for this session's worker.
    ///
    /// Returns false once the worker has stopped.
    pub fn submit(&mut self, packet: WorldPacket) -> bool {
        self.last_seen = Instant::now();
        self.worker.send(packet).is_ok()
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Tracks every session by id, with address and GUID lookups
pub struct SessionManager {
    sessions: HashMap<u32, Session>,
    next_session_id: u32,
    max_sessions: usize,
    timeout: Duration,
}

impl SessionManager {
    pub fn new(max_sessions: usize, timeout: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            next_session_id: 1,
            max_sessions,
            timeout,
        }
    }

    /// Returns `None` when the server is at capacity.
    pub fn add_session(
        &mut self,
        addr: SocketAddr,
        guid: ObjectGuid,
        worker: mpsc::UnboundedSender<WorldPacket>,
    ) -> Option<u32> {
        if self.is_full() {
            return None;
        }

        let session_id = self.next_session_id;
        self.next_session_id += 1;

        info!("Session {} opened for {} from {}", session_id, guid, addr);
        self.sessions
            .insert(session_id, Session::new(session_id, guid, addr, worker));

        Some(session_id)
    }

    pub fn remove_session(&mut self, session_id: u32) -> Option<Session> {
        let session = self.sessions.remove(&session_id)?;
        info!("Session {} closed for {}", session.id, session.guid);
        Some(session)
    }

    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.sessions
            .iter()
            .find(|(_, session)| session.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn find_by_guid(&self, guid: ObjectGuid) -> Option<u32> {
        self.sessions
            .iter()
            .find(|(_, session)| session.guid == guid)
            .map(|(id, _)| *id)
    }

    /// Where to send packets for `guid`, if they are logged in.
    pub fn addr_of(&self, guid: ObjectGuid) -> Option<SocketAddr> {
        self.sessions
            .values()
            .find(|session| session.guid == guid)
            .map(|session| session.addr)
    }

    pub fn get_mut(&mut self, session_id: u32) -> Option<&mut Session> {
        self.sessions.get_mut(&session_id)
    }

    /// Marks the session at `addr` as alive.
    pub fn touch(&mut self, addr: SocketAddr) -> bool {
        match self.sessions.values_mut().find(|session| session.addr == addr) {
            Some(session) => {
                session.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Removes and returns every session that has gone quiet.
    pub fn check_timeouts(&mut self) -> Vec<Session> {
        let timeout = self.timeout;
        let timed_out: Vec<u32> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        timed_out
            .into_iter()
            .filter_map(|id| self.remove_session(id))
            .collect()
    }

    pub fn is_full(&self) -> bool {
        self.sessions.len() >= self.max_sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
