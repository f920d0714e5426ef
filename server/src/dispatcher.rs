//! Fire-and-forget delivery of server events.
//!
//! Events are encoded here and queued on an unbounded channel that the
//! network sender drains, so a mutation never waits on a socket.

use log::{debug, error};
use shared::{ObjectGuid, ServerEvent, WorldPacket};
use tokio::sync::mpsc;

/// One encoded packet bound for one player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub recipient: ObjectGuid,
    pub packet: WorldPacket,
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Dispatcher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, recipient: ObjectGuid, event: &ServerEvent) {
        if let Some(packet) = Self::encode(event) {
            self.push(recipient, packet);
        }
    }

    /// Encodes once and queues a copy for every recipient except `exclude`.
    pub fn broadcast(
        &self,
        recipients: impl IntoIterator<Item = ObjectGuid>,
        event: &ServerEvent,
        exclude: Option<ObjectGuid>,
    ) {
        let Some(packet) = Self::encode(event) else {
            return;
        };
        for recipient in recipients {
            if Some(recipient) != exclude {
                self.push(recipient, packet.clone());
            }
        }
    }

    /// Builds a separate event per recipient, for views that differ per player.
    pub fn send_each(
        &self,
        recipients: impl IntoIterator<Item = ObjectGuid>,
        build: impl Fn(ObjectGuid) -> ServerEvent,
    ) {
        for recipient in recipients {
            self.send(recipient, &build(recipient));
        }
    }

    fn encode(event: &ServerEvent) -> Option<WorldPacket> {
        match event.encode() {
            Ok(packet) => Some(packet),
            Err(e) => {
                error!("Failed to encode {:?}: {}", event.opcode(), e);
                None
            }
        }
    }

    fn push(&self, recipient: ObjectGuid, packet: WorldPacket) {
        if self.tx.send(Outbound { recipient, packet }).is_err() {
            debug!("Dispatch queue closed, dropping packet for {}", recipient);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Opcode, PartyOperation, PartyResult};

    fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            out.push(item);
        }
        out
    }

    #[test]
    fn test_send_encodes_event() {
        let (dispatcher, mut rx) = Dispatcher::new();
        let event = ServerEvent::OperationResult {
            operation: PartyOperation::Invite,
            name: "Thrall".to_string(),
            result: PartyResult::Ok,
            value: 0,
        };
        dispatcher.send(ObjectGuid(1), &event);

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, ObjectGuid(1));
        assert_eq!(sent[0].packet.opcode, Opcode::SmsgPartyCommandResult.value());
        assert_eq!(ServerEvent::decode(&sent[0].packet).unwrap(), event);
    }

    #[test]
    fn test_broadcast_skips_excluded() {
        let (dispatcher, mut rx) = Dispatcher::new();
        let recipients = [ObjectGuid(1), ObjectGuid(2), ObjectGuid(3)];
        dispatcher.broadcast(recipients, &ServerEvent::GroupDestroyed, Some(ObjectGuid(2)));

        let sent: Vec<ObjectGuid> = drain(&mut rx).into_iter().map(|o| o.recipient).collect();
        assert_eq!(sent, vec![ObjectGuid(1), ObjectGuid(3)]);
    }

    #[test]
    fn test_send_each_builds_per_recipient() {
        let (dispatcher, mut rx) = Dispatcher::new();
        dispatcher.send_each([ObjectGuid(5), ObjectGuid(6)], |recipient| ServerEvent::GroupDecline {
            name: format!("P{}", recipient.raw()),
        });

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 2);
        assert_eq!(
            ServerEvent::decode(&sent[1].packet).unwrap(),
            ServerEvent::GroupDecline {
                name: "P6".to_string()
            }
        );
    }

    #[test]
    fn test_closed_channel_is_swallowed() {
        let (dispatcher, rx) = Dispatcher::new();
        drop(rx);
        dispatcher.send(ObjectGuid(1), &ServerEvent::GroupUninvite);
    }
}
