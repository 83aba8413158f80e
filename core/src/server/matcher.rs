use std::collections::{HashMap, HashSet};

use crate::{
    envelope::{OnlineStats, PairedNotice, ServerMessage},
    types::{ConnId, Interests, Role},
};

/// An outbound message decided by the matchmaker, delivered by the hub.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    To { conn: ConnId, message: ServerMessage },
    Broadcast(ServerMessage),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingEntry {
    pub conn: ConnId,
    pub interests: Interests,
}

/// Waiting pool and pairing links. A connection is in at most one of the
/// two at any time; every method preserves that.
#[derive(Debug, Default)]
pub struct Matchmaker {
    connected: HashSet<ConnId>,
    waiting: Vec<WaitingEntry>,
    links: HashMap<ConnId, ConnId>,
}

impl Matchmaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn online(&self) -> u64 {
        self.connected.len() as u64
    }

    pub fn partner_of(&self, conn: ConnId) -> Option<ConnId> {
        self.links.get(&conn).copied()
    }

    pub fn is_waiting(&self, conn: ConnId) -> bool {
        self.waiting.iter().any(|entry| entry.conn == conn)
    }

    pub fn waiting(&self) -> &[WaitingEntry] {
        &self.waiting
    }

    fn stats(&self) -> Delivery {
        Delivery::Broadcast(ServerMessage::Stats(OnlineStats {
            users: self.online(),
        }))
    }

    pub fn connect(&mut self, conn: ConnId) -> Vec<Delivery> {
        self.connected.insert(conn);
        vec![self.stats()]
    }

    pub fn disconnect(&mut self, conn: ConnId) -> Vec<Delivery> {
        let mut deliveries = self.detach(conn);
        match self.connected.remove(&conn) {
            true => deliveries.push(self.stats()),
            false => {}
        }
        deliveries
    }

    pub fn leave(&mut self, conn: ConnId) -> Vec<Delivery> {
        self.detach(conn)
    }

    /// Pair `conn` with the first compatible waiting entry in insertion
    /// order, or park it in the pool. Entries for which `is_open` is false
    /// are evicted as the scan meets them.
    pub fn find(
        &mut self,
        conn: ConnId,
        interests: Interests,
        is_open: impl Fn(ConnId) -> bool,
    ) -> Vec<Delivery> {
        match self.connected.contains(&conn) {
            true => {}
            false => return Vec::new(),
        }
        let mut deliveries = self.detach(conn);

        let mut matched = None;
        let mut index = 0;
        while index < self.waiting.len() {
            let entry = &self.waiting[index];
            match (is_open(entry.conn), entry.interests.matches(&interests)) {
                (false, _) => {
                    tracing::debug!(conn = %entry.conn, "evicting stale waiting entry");
                    self.waiting.remove(index);
                }
                (true, true) => {
                    matched = Some(self.waiting.remove(index));
                    break;
                }
                (true, false) => index += 1,
            }
        }

        match matched {
            Some(waiting) => {
                self.links.insert(waiting.conn, conn);
                self.links.insert(conn, waiting.conn);
                tracing::info!(
                    initiator = %waiting.conn,
                    receiver = %conn,
                    interests = %interests,
                    "paired"
                );
                deliveries.push(Delivery::To {
                    conn: waiting.conn,
                    message: ServerMessage::Paired(PairedNotice {
                        role: Role::Initiator,
                    }),
                });
                deliveries.push(Delivery::To {
                    conn,
                    message: ServerMessage::Paired(PairedNotice {
                        role: Role::Receiver,
                    }),
                });
            }
            None => {
                tracing::debug!(%conn, interests = %interests, "waiting for a match");
                self.waiting.push(WaitingEntry { conn, interests });
                deliveries.push(Delivery::To {
                    conn,
                    message: ServerMessage::Waiting,
                });
            }
        }
        deliveries
    }

    /// Forward a handshake payload verbatim to the link partner, if any.
    pub fn relay(&self, conn: ConnId, payload: serde_json::Value) -> Vec<Delivery> {
        match self.partner_of(conn) {
            Some(partner) => vec![Delivery::To {
                conn: partner,
                message: ServerMessage::Signal(payload),
            }],
            None => {
                tracing::debug!(%conn, "signal without a partner dropped");
                Vec::new()
            }
        }
    }

    /// Drop `conn` from the pool and tear down its link on both sides,
    /// telling the partner exactly once.
    fn detach(&mut self, conn: ConnId) -> Vec<Delivery> {
        self.waiting.retain(|entry| entry.conn != conn);
        match self.links.remove(&conn) {
            Some(partner) => {
                self.links.remove(&partner);
                tracing::info!(%conn, %partner, "pairing torn down");
                vec![Delivery::To {
                    conn: partner,
                    message: ServerMessage::PeerLeft,
                }]
            }
            None => Vec::new(),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
