//! Authoritative world state and ingress dispatch
//!
//! The [`World`] owns every mutable piece of the game: the room registry,
//! connection registry, rate limiter, GM sessions, and the RNG. It is driven
//! exclusively by the single server loop, which serializes all mutations and
//! therefore gives every room a total order over its events without locks.
//!
//! Timers never mutate the world directly. Handlers push [`Scheduled`]
//! entries, the loop arms real timers for them, and the resulting callbacks
//! re-enter the world as messages that re-check room and monster existence
//! before acting.

use crate::connections::{ConnectionId, ConnectionManager};
use crate::rate_limiter::RateLimiter;
use crate::rooms::{Room, RoomRegistry};
use crate::utils::now_ms;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use shared::{ClientEvent, ServerEvent, DEFAULT_PLAYER_TIMEOUT_MS, DEFAULT_TICK_HZ};
use std::collections::HashSet;
use std::net::SocketAddr;
use tokio::sync::mpsc::UnboundedSender;

/// A guaranteed or high-chance drop granted outside the regular loot table.
#[derive(Debug, Clone)]
pub struct CelebrationDrop {
    pub name: String,
    /// Restricts the drop to one monster type when set.
    pub monster_type: Option<String>,
    pub rate: f64,
}

/// Tunables resolved from the environment at startup.
#[derive(Debug, Clone)]
pub struct WorldConfig {
    pub tick_hz: u32,
    pub player_timeout_ms: u64,
    /// Absent password disables the GM surface entirely.
    pub gm_password: Option<String>,
    pub celebration_drops: Vec<CelebrationDrop>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            tick_hz: DEFAULT_TICK_HZ,
            player_timeout_ms: DEFAULT_PLAYER_TIMEOUT_MS,
            gm_password: None,
            celebration_drops: vec![CelebrationDrop {
                name: "Salami Stick".to_string(),
                monster_type: Some("babySlime".to_string()),
                rate: 1.0,
            }],
        }
    }
}

/// Deferred work a handler wants armed as a one-shot timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scheduled {
    Respawn {
        map_id: String,
        monster_id: String,
        delay_ms: u64,
    },
    RemoveCorpse {
        map_id: String,
        monster_id: String,
        delay_ms: u64,
    },
}

/// Payload of the `GET /` health endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: String,
    pub total_players: usize,
    pub total_monsters: usize,
    pub maps: Vec<MapHealth>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MapHealth {
    pub id: String,
    pub players: usize,
    pub monsters: usize,
}

/// The authoritative game state. See the module docs for the threading model.
pub struct World {
    pub registry: RoomRegistry,
    pub connections: ConnectionManager,
    pub limiter: RateLimiter,
    pub gm_sessions: HashSet<ConnectionId>,
    pub config: WorldConfig,
    pub rng: StdRng,
    pub server_start_time: u64,
    next_monster_id: u64,
    pending: Vec<Scheduled>,
}

impl World {
    pub fn new(config: WorldConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic construction for tests.
    pub fn with_seed(config: WorldConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: WorldConfig, rng: StdRng) -> Self {
        Self {
            registry: RoomRegistry::new(),
            connections: ConnectionManager::new(),
            limiter: RateLimiter::new(),
            gm_sessions: HashSet::new(),
            config,
            rng,
            server_start_time: now_ms(),
            next_monster_id: 0,
            pending: Vec::new(),
        }
    }

    /// Mints the next `m_<n>` monster id.
    pub fn mint_monster_id(&mut self) -> String {
        self.next_monster_id += 1;
        format!("m_{}", self.next_monster_id)
    }

    /// Registers a new socket and greets it with the boot timestamp so the
    /// client can detect restarts.
    pub fn handle_connect(
        &mut self,
        conn_id: ConnectionId,
        addr: SocketAddr,
        sender: UnboundedSender<ServerEvent>,
    ) {
        self.connections.add(conn_id, addr, sender);
        self.connections.send(
            conn_id,
            ServerEvent::ServerStartTime {
                server_start_time: self.server_start_time,
            },
        );
    }

    /// Routes one typed ingress event to its subsystem handler.
    pub fn handle_event(&mut self, conn_id: ConnectionId, event: ClientEvent, now: u64) {
        match event {
            ClientEvent::Join(data) => self.handle_join(conn_id, data, now),
            ClientEvent::Rejoin(data) => self.handle_rejoin(conn_id, data, now),
            ClientEvent::UpdatePosition(data) => self.handle_update_position(conn_id, data, now),
            ClientEvent::ChangeMap(data) => self.handle_change_map(conn_id, data, now),
            ClientEvent::ChatMessage(data) => self.handle_chat(conn_id, data),
            ClientEvent::InitMapMonsters(data) => self.handle_init_map_monsters(conn_id, data, now),
            ClientEvent::AttackMonster(data) => self.handle_attack(conn_id, data, now),
            ClientEvent::TransformElite(data) => self.handle_transform_elite(conn_id, data, now),
            ClientEvent::ItemPickup(data) => self.handle_item_pickup(conn_id, data, now),
            ClientEvent::PlayerDropItem(data) => self.handle_player_drop(conn_id, data, now),
            ClientEvent::UpdateParty(data) => self.handle_update_party(conn_id, data),
            ClientEvent::UpdatePartyStats(data) => self.handle_update_party_stats(conn_id, data),
            ClientEvent::SharePartyGold(data) => self.handle_share_party_gold(conn_id, data),
            ClientEvent::PlayerVfx(data) => self.relay_vfx(conn_id, data),
            ClientEvent::PlayerProjectile(data) => self.relay_projectile(conn_id, data),
            ClientEvent::PlayerProjectileHit(data) => self.relay_projectile_hit(conn_id, data),
            ClientEvent::PlayerSkillVfx(data) => self.relay_skill_vfx(conn_id, data),
            ClientEvent::UpdateAppearance(data) => self.handle_update_appearance(conn_id, data),
            ClientEvent::PlayerDeath(data) => self.relay_death(conn_id, data),
            ClientEvent::PlayerRespawn(data) => self.relay_respawn(conn_id, data),
            ClientEvent::GmAuth(data) => self.handle_gm_auth(conn_id, data),
            ClientEvent::CheckGmAuth => self.handle_check_gm_auth(conn_id),
            ClientEvent::LatencyPing(data) => self.handle_latency_ping(conn_id, data),
            ClientEvent::RequestMonsters => self.handle_request_monsters(conn_id),
        }
    }

    /// Queues a one-shot timer for the server loop to arm.
    pub fn schedule(&mut self, task: Scheduled) {
        self.pending.push(task);
    }

    /// Hands the queued timers to the loop.
    pub fn drain_scheduled(&mut self) -> Vec<Scheduled> {
        std::mem::take(&mut self.pending)
    }

    /// Snapshot for the health endpoint.
    pub fn health_status(&self) -> HealthStatus {
        let mut maps: Vec<MapHealth> = self
            .registry
            .rooms
            .values()
            .map(|room| MapHealth {
                id: room.map_id.clone(),
                players: room.players.len(),
                monsters: room.live_monster_count(),
            })
            .collect();
        maps.sort_by(|a, b| a.id.cmp(&b.id));

        HealthStatus {
            status: "ok".to_string(),
            total_players: self.registry.total_players(),
            total_monsters: self.registry.total_monsters(),
            maps,
        }
    }

    /// Sends an event to a single connection.
    pub fn unicast(&self, conn_id: ConnectionId, event: ServerEvent) {
        self.connections.send(conn_id, event);
    }

    /// Sends an error reply to a misbehaving connection.
    pub fn send_error(&self, conn_id: ConnectionId, message: &str) {
        self.connections.send(
            conn_id,
            ServerEvent::Error {
                message: message.to_string(),
            },
        );
    }
}

/// Fans an event out to every player in the room, optionally excluding one
/// identity. Delivery order per connection matches call order, which is what
/// gives room members a consistent view.
pub fn broadcast_to_room(
    connections: &ConnectionManager,
    room: &Room,
    event: &ServerEvent,
    exclude_od: Option<&str>,
) {
    for player in room.players.values() {
        if exclude_od == Some(player.od_id.as_str()) {
            continue;
        }
        connections.send(player.conn, event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monster_ids_are_monotonic() {
        let mut world = World::with_seed(WorldConfig::default(), 7);
        assert_eq!(world.mint_monster_id(), "m_1");
        assert_eq!(world.mint_monster_id(), "m_2");
        assert_eq!(world.mint_monster_id(), "m_3");
    }

    #[test]
    fn test_health_status_empty_world() {
        let world = World::with_seed(WorldConfig::default(), 7);
        let health = world.health_status();

        assert_eq!(health.status, "ok");
        assert_eq!(health.total_players, 0);
        assert_eq!(health.total_monsters, 0);
        assert!(health.maps.is_empty());
    }

    #[test]
    fn test_health_status_serializes_expected_keys() {
        let world = World::with_seed(WorldConfig::default(), 7);
        let value = serde_json::to_value(world.health_status()).unwrap();

        assert_eq!(value["status"], "ok");
        assert!(value.get("totalPlayers").is_some());
        assert!(value.get("totalMonsters").is_some());
        assert!(value["maps"].is_array());
    }
}
