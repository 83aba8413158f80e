use std::collections::{HashMap, VecDeque};

use thiserror::Error;
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        oneshot,
    },
    task::JoinHandle,
};

use super::matcher::{Delivery, Matchmaker};
use crate::{
    envelope::ServerMessage,
    protocol::OUTBOUND_QUEUE_DEPTH,
    types::{ConnId, Interests},
};

#[derive(Debug, Error)]
pub enum HubError {
    #[error("matchmaking hub has stopped")]
    Stopped,
}

/// A freshly registered connection: its id and the queue of messages the
/// hub addresses to it. The queue closes when the hub drops the client.
#[derive(Debug)]
pub struct Registration {
    pub conn: ConnId,
    pub outbound: mpsc::Receiver<ServerMessage>,
}

#[derive(Debug)]
enum HubRequest {
    Register {
        reply: oneshot::Sender<Registration>,
    },
    Unregister {
        conn: ConnId,
    },
    Find {
        conn: ConnId,
        interests: Interests,
    },
    Leave {
        conn: ConnId,
    },
    Signal {
        conn: ConnId,
        payload: serde_json::Value,
    },
    Online {
        reply: oneshot::Sender<u64>,
    },
}

/// Cheap handle to the hub task. Requests are applied one at a time in
/// arrival order, so each find or leave is atomic with respect to the rest.
#[derive(Debug, Clone)]
pub struct HubHandle {
    requests: mpsc::UnboundedSender<HubRequest>,
}

impl HubHandle {
    fn submit(&self, request: HubRequest) -> Result<(), HubError> {
        self.requests.send(request).map_err(|_| HubError::Stopped)
    }

    pub async fn register(&self) -> Result<Registration, HubError> {
        let (reply, response) = oneshot::channel();
        self.submit(HubRequest::Register { reply })?;
        response.await.map_err(|_| HubError::Stopped)
    }

    pub fn unregister(&self, conn: ConnId) -> Result<(), HubError> {
        self.submit(HubRequest::Unregister { conn })
    }

    pub fn find(&self, conn: ConnId, interests: Interests) -> Result<(), HubError> {
        self.submit(HubRequest::Find { conn, interests })
    }

    pub fn leave(&self, conn: ConnId) -> Result<(), HubError> {
        self.submit(HubRequest::Leave { conn })
    }

    pub fn signal(&self, conn: ConnId, payload: serde_json::Value) -> Result<(), HubError> {
        self.submit(HubRequest::Signal { conn, payload })
    }

    pub async fn online(&self) -> Result<u64, HubError> {
        let (reply, response) = oneshot::channel();
        self.submit(HubRequest::Online { reply })?;
        response.await.map_err(|_| HubError::Stopped)
    }
}

struct Hub {
    matchmaker: Matchmaker,
    outbound: HashMap<ConnId, mpsc::Sender<ServerMessage>>,
    queue_depth: usize,
    next_conn: u64,
}

impl Hub {
    fn handle(&mut self, request: HubRequest) {
        let deliveries = match request {
            HubRequest::Register { reply } => {
                let conn = ConnId::new(self.next_conn);
                self.next_conn += 1;
                let (tx, outbound) = mpsc::channel(self.queue_depth);
                self.outbound.insert(conn, tx);
                match reply.send(Registration { conn, outbound }) {
                    Ok(()) => {
                        tracing::info!(%conn, "client connected");
                        self.matchmaker.connect(conn)
                    }
                    Err(_) => {
                        self.outbound.remove(&conn);
                        Vec::new()
                    }
                }
            }
            HubRequest::Unregister { conn } => {
                self.outbound.remove(&conn);
                let deliveries = self.matchmaker.disconnect(conn);
                tracing::info!(%conn, online = self.matchmaker.online(), "client disconnected");
                deliveries
            }
            HubRequest::Find { conn, interests } => {
                let outbound = &self.outbound;
                self.matchmaker.find(conn, interests, |candidate| {
                    outbound.get(&candidate).is_some_and(|tx| !tx.is_closed())
                })
            }
            HubRequest::Leave { conn } => self.matchmaker.leave(conn),
            HubRequest::Signal { conn, payload } => self.matchmaker.relay(conn, payload),
            HubRequest::Online { reply } => {
                let _ = reply.send(self.matchmaker.online());
                Vec::new()
            }
        };
        self.deliver(deliveries);
    }

    /// Queue every delivery without waiting. A client whose queue is full
    /// is dropped as if it had disconnected, and the resulting notices are
    /// delivered in turn.
    fn deliver(&mut self, deliveries: Vec<Delivery>) {
        let mut pending = VecDeque::from(deliveries);
        while let Some(delivery) = pending.pop_front() {
            let overflowed: Vec<ConnId> = match delivery {
                Delivery::To { conn, message } => match self.outbound.get(&conn) {
                    Some(tx) => match tx.try_send(message) {
                        Ok(()) => Vec::new(),
                        Err(TrySendError::Full(_)) => vec![conn],
                        Err(TrySendError::Closed(_)) => {
                            tracing::debug!(%conn, "recipient already gone");
                            Vec::new()
                        }
                    },
                    None => {
                        tracing::debug!(%conn, "no outbound queue for recipient");
                        Vec::new()
                    }
                },
                Delivery::Broadcast(message) => self
                    .outbound
                    .iter()
                    .filter_map(|(conn, tx)| match tx.try_send(message.clone()) {
                        Err(TrySendError::Full(_)) => Some(*conn),
                        Ok(()) | Err(TrySendError::Closed(_)) => None,
                    })
                    .collect(),
            };
            for conn in overflowed {
                self.outbound.remove(&conn);
                tracing::warn!(
                    %conn,
                    depth = self.queue_depth,
                    "outbound queue full, dropping client"
                );
                pending.extend(self.matchmaker.disconnect(conn));
            }
        }
    }
}

/// Start the hub task. It runs until every handle has been dropped.
pub fn spawn() -> (HubHandle, JoinHandle<()>) {
    spawn_with_queue_depth(OUTBOUND_QUEUE_DEPTH)
}

fn spawn_with_queue_depth(queue_depth: usize) -> (HubHandle, JoinHandle<()>) {
    let (requests, mut rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(async move {
        let mut hub = Hub {
            matchmaker: Matchmaker::new(),
            outbound: HashMap::new(),
            queue_depth,
            next_conn: 0,
        };
        while let Some(request) = rx.recv().await {
            hub.handle(request);
        }
        tracing::debug!("hub stopped");
    });
    (HubHandle { requests }, task)
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{envelope::PairedNotice, types::Role};

    async fn next_non_stats(registration: &mut Registration) -> ServerMessage {
        loop {
            let message = registration
                .outbound
                .recv()
                .await
                .expect("hub keeps the queue open while registered");
            match message {
                ServerMessage::Stats(_) => continue,
                other => return other,
            }
        }
    }

    #[tokio::test]
    async fn registration_broadcasts_online_count() {
        let (hub, _task) = spawn();
        let mut a = hub.register().await.expect("hub running");
        let first = a.outbound.recv().await.expect("stats for self");
        assert!(matches!(first, ServerMessage::Stats(stats) if stats.users == 1));

        let _b = hub.register().await.expect("hub running");
        let second = a.outbound.recv().await.expect("stats for newcomer");
        assert!(matches!(second, ServerMessage::Stats(stats) if stats.users == 2));
        assert_eq!(hub.online().await.expect("hub running"), 2);
    }

    #[tokio::test]
    async fn find_pairs_and_leave_notifies() {
        let (hub, _task) = spawn();
        let mut a = hub.register().await.expect("hub running");
        let mut b = hub.register().await.expect("hub running");

        hub.find(a.conn, Interests::new(["games"])).expect("hub running");
        assert_eq!(next_non_stats(&mut a).await, ServerMessage::Waiting);

        hub.find(b.conn, Interests::new(["games", "art"])).expect("hub running");
        assert_eq!(
            next_non_stats(&mut a).await,
            ServerMessage::Paired(PairedNotice {
                role: Role::Initiator
            })
        );
        assert_eq!(
            next_non_stats(&mut b).await,
            ServerMessage::Paired(PairedNotice {
                role: Role::Receiver
            })
        );

        hub.leave(b.conn).expect("hub running");
        assert_eq!(next_non_stats(&mut a).await, ServerMessage::PeerLeft);
    }

    #[tokio::test]
    async fn client_that_stops_reading_is_dropped_and_partner_told() {
        let (hub, _task) = spawn_with_queue_depth(4);
        let mut stalled = hub.register().await.expect("hub running");
        let mut partner = hub.register().await.expect("hub running");

        hub.find(stalled.conn, Interests::empty()).expect("hub running");
        hub.find(partner.conn, Interests::empty()).expect("hub running");
        assert_eq!(
            next_non_stats(&mut partner).await,
            ServerMessage::Paired(PairedNotice {
                role: Role::Receiver
            })
        );

        // stats, stats, waiting and paired fill the stalled queue.
        hub.signal(partner.conn, serde_json::json!({ "type": "offer" }))
            .expect("hub running");
        assert_eq!(next_non_stats(&mut partner).await, ServerMessage::PeerLeft);
        let stats = partner.outbound.recv().await.expect("stats after eviction");
        assert!(matches!(stats, ServerMessage::Stats(stats) if stats.users == 1));
        assert_eq!(hub.online().await.expect("hub running"), 1);

        let mut buffered = 0;
        while stalled.outbound.recv().await.is_some() {
            buffered += 1;
        }
        assert_eq!(buffered, 4);
    }

    #[tokio::test]
    async fn dropped_handles_stop_the_hub() {
        let (hub, task) = spawn();
        drop(hub);
        task.await.expect("hub task exits cleanly");
    }
}
