//! Server loop coordinating ingress, the simulation tick, and timers
//!
//! A single task owns the [`World`] and consumes one message channel; every
//! transport, timer, and health probe funnels through it. That serialization
//! is the concurrency model: two events for the same map can never interleave
//! because nothing mutates the world except this loop.

use crate::utils::now_ms;
use crate::world::{HealthStatus, Scheduled, World};
use log::{debug, info};
use rand::Rng;
use shared::{
    ClientEvent, ServerEvent, ELITE_MAX_DELAY_MS, ELITE_MIN_DELAY_MS, INACTIVITY_SWEEP_MS,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;

/// Messages feeding the world-owning loop.
pub enum ServerMessage {
    /// A transport accepted a socket and registered its writer.
    Connected {
        conn_id: u64,
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<ServerEvent>,
    },
    /// A socket closed or failed.
    Disconnected { conn_id: u64 },
    /// A parsed client frame.
    Event { conn_id: u64, event: ClientEvent },
    /// One-shot respawn timer fired.
    RespawnDue { map_id: String, monster_id: String },
    /// One-shot corpse-removal timer fired.
    RemoveCorpse { map_id: String, monster_id: String },
    /// The randomized elite promoter timer fired.
    ElitePromotion,
    /// The HTTP health endpoint wants a snapshot.
    HealthQuery {
        reply: oneshot::Sender<HealthStatus>,
    },
}

/// Owns the world and runs the main loop.
pub struct Server {
    world: World,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    tick_duration: Duration,
}

impl Server {
    pub fn new(world: World) -> Self {
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let tick_duration = Duration::from_millis(1_000 / world.config.tick_hz.max(1) as u64);

        Self {
            world,
            server_rx,
            server_tx,
            tick_duration,
        }
    }

    /// Sender for transports and timers to reach the loop.
    pub fn handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Self-rescheduling elite promoter with a uniform 2-7 minute delay.
    fn spawn_elite_timer(&self) {
        let tx = self.server_tx.clone();
        tokio::spawn(async move {
            loop {
                let delay_ms = {
                    let mut rng = rand::thread_rng();
                    rng.gen_range(ELITE_MIN_DELAY_MS..=ELITE_MAX_DELAY_MS)
                };
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                if tx.send(ServerMessage::ElitePromotion).is_err() {
                    break;
                }
            }
        });
    }

    /// Arms one-shot timers queued by the last handler. The callbacks are
    /// never cancelled; they re-check state when they fire.
    fn arm_timers(&mut self) {
        for task in self.world.drain_scheduled() {
            let tx = self.server_tx.clone();
            match task {
                Scheduled::Respawn {
                    map_id,
                    monster_id,
                    delay_ms,
                } => {
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        let _ = tx.send(ServerMessage::RespawnDue { map_id, monster_id });
                    });
                }
                Scheduled::RemoveCorpse {
                    map_id,
                    monster_id,
                    delay_ms,
                } => {
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        let _ = tx.send(ServerMessage::RemoveCorpse { map_id, monster_id });
                    });
                }
            }
        }
    }

    fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Connected {
                conn_id,
                addr,
                sender,
            } => self.world.handle_connect(conn_id, addr, sender),
            ServerMessage::Disconnected { conn_id } => self.world.handle_disconnect(conn_id),
            ServerMessage::Event { conn_id, event } => {
                self.world.handle_event(conn_id, event, now_ms())
            }
            ServerMessage::RespawnDue { map_id, monster_id } => {
                self.world.handle_respawn_due(&map_id, &monster_id, now_ms())
            }
            ServerMessage::RemoveCorpse { map_id, monster_id } => {
                self.world.handle_remove_corpse(&map_id, &monster_id)
            }
            ServerMessage::ElitePromotion => {
                debug!("Elite promoter sweep");
                self.world.promote_elites(now_ms());
            }
            ServerMessage::HealthQuery { reply } => {
                let _ = reply.send(self.world.health_status());
            }
        }
    }

    /// Main loop: ingress messages, the monster tick, and the inactivity
    /// sweep, serialized into one task.
    pub async fn run(mut self) {
        self.spawn_elite_timer();

        let mut tick = interval(self.tick_duration);
        let mut sweep = interval(Duration::from_millis(INACTIVITY_SWEEP_MS));

        info!(
            "Server loop started ({} Hz tick, {} ms player timeout)",
            self.world.config.tick_hz, self.world.config.player_timeout_ms
        );

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(message) => {
                            self.handle_message(message);
                            self.arm_timers();
                        }
                        None => {
                            info!("Server loop shutting down");
                            break;
                        }
                    }
                },
                _ = tick.tick() => {
                    self.world.tick(now_ms());
                },
                _ = sweep.tick() => {
                    self.world.sweep_inactive(now_ms());
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::WorldConfig;
    use shared::JoinData;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_loop_processes_ingress_in_order() {
        let world = World::with_seed(WorldConfig::default(), 1);
        let server = Server::new(world);
        let tx = server.handle();
        tokio::spawn(server.run());

        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        tx.send(ServerMessage::Connected {
            conn_id: 1,
            addr: test_addr(),
            sender: out_tx,
        })
        .unwrap();
        tx.send(ServerMessage::Event {
            conn_id: 1,
            event: ClientEvent::Join(JoinData {
                od_id: Some("od_1".to_string()),
                name: Some("Mira".to_string()),
                map_id: Some("henesys".to_string()),
                ..Default::default()
            }),
        })
        .unwrap();

        let first = tokio::time::timeout(Duration::from_secs(2), out_rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        assert!(matches!(first, ServerEvent::ServerStartTime { .. }));

        let second = tokio::time::timeout(Duration::from_secs(2), out_rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        assert!(matches!(second, ServerEvent::CurrentPlayers(_)));
    }

    #[tokio::test]
    async fn test_health_query_round_trip() {
        let world = World::with_seed(WorldConfig::default(), 1);
        let server = Server::new(world);
        let tx = server.handle();
        tokio::spawn(server.run());

        let (out_tx, _out_rx) = mpsc::unbounded_channel();
        tx.send(ServerMessage::Connected {
            conn_id: 1,
            addr: test_addr(),
            sender: out_tx,
        })
        .unwrap();
        tx.send(ServerMessage::Event {
            conn_id: 1,
            event: ClientEvent::Join(JoinData {
                od_id: Some("od_1".to_string()),
                name: Some("Mira".to_string()),
                map_id: Some("henesys".to_string()),
                ..Default::default()
            }),
        })
        .unwrap();

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(ServerMessage::HealthQuery { reply: reply_tx })
            .unwrap();

        let health = tokio::time::timeout(Duration::from_secs(2), reply_rx)
            .await
            .expect("timed out")
            .expect("loop dropped the query");
        assert_eq!(health.status, "ok");
        assert_eq!(health.total_players, 1);
        assert_eq!(health.maps.len(), 1);
        assert_eq!(health.maps[0].id, "henesys");
    }
}
