//! Per-map event fan-out
//!
//! Pure relays: chat, visual effects, projectiles, appearance, party updates,
//! and death/respawn notifications. Nothing here touches the simulation; the
//! server tags the sender's identity onto the payload and forwards it to the
//! rest of the room.

use crate::connections::ConnectionId;
use crate::world::{broadcast_to_room, World};
use serde_json::Value;
use shared::{
    ChatData, LatencyPingData, PartyStatsData, ServerEvent, UpdatePartyData,
};

/// Stamps the sender's identity into a relayed payload so receivers know
/// whose effect they are rendering. Non-object payloads pass unchanged.
fn tag_sender(mut payload: Value, od_id: &str) -> Value {
    if let Value::Object(map) = &mut payload {
        map.insert("odId".to_string(), Value::String(od_id.to_string()));
    }
    payload
}

impl World {
    fn sender_room(&self, conn_id: ConnectionId) -> Option<(String, String)> {
        let od_id = self.connections.od_of(conn_id)?;
        let map_id = self.registry.location_of(od_id)?;
        Some((od_id.to_string(), map_id.to_string()))
    }

    fn relay_to_others(&self, conn_id: ConnectionId, make: impl FnOnce(&str) -> ServerEvent) {
        let Some((od_id, map_id)) = self.sender_room(conn_id) else {
            return;
        };
        let Some(room) = self.registry.get(&map_id) else {
            return;
        };
        broadcast_to_room(&self.connections, room, &make(&od_id), Some(&od_id));
    }

    pub fn handle_chat(&mut self, conn_id: ConnectionId, data: ChatData) {
        let Some((od_id, map_id)) = self.sender_room(conn_id) else {
            return;
        };
        let Some(room) = self.registry.get(&map_id) else {
            return;
        };
        let name = room
            .players
            .get(&od_id)
            .map(|p| p.name.clone())
            .unwrap_or_default();

        let chat = ServerEvent::PlayerChat {
            od_id: od_id.clone(),
            name,
            message: data.message,
        };
        broadcast_to_room(&self.connections, room, &chat, Some(&od_id));
    }

    pub fn relay_vfx(&mut self, conn_id: ConnectionId, payload: Value) {
        self.relay_to_others(conn_id, |od| {
            ServerEvent::RemotePlayerVfx(tag_sender(payload, od))
        });
    }

    pub fn relay_projectile(&mut self, conn_id: ConnectionId, payload: Value) {
        self.relay_to_others(conn_id, |od| {
            ServerEvent::RemoteProjectile(tag_sender(payload, od))
        });
    }

    pub fn relay_projectile_hit(&mut self, conn_id: ConnectionId, payload: Value) {
        self.relay_to_others(conn_id, |od| {
            ServerEvent::RemoteProjectileHit(tag_sender(payload, od))
        });
    }

    pub fn relay_skill_vfx(&mut self, conn_id: ConnectionId, payload: Value) {
        self.relay_to_others(conn_id, |od| {
            ServerEvent::RemoteSkillVfx(tag_sender(payload, od))
        });
    }

    pub fn relay_death(&mut self, conn_id: ConnectionId, payload: Value) {
        self.relay_to_others(conn_id, |od| ServerEvent::PlayerDied(tag_sender(payload, od)));
    }

    pub fn relay_respawn(&mut self, conn_id: ConnectionId, payload: Value) {
        self.relay_to_others(conn_id, |od| {
            ServerEvent::PlayerRespawned(tag_sender(payload, od))
        });
    }

    /// Records an appearance diff on the stored player, then relays it.
    pub fn handle_update_appearance(&mut self, conn_id: ConnectionId, payload: Value) {
        let Some((od_id, map_id)) = self.sender_room(conn_id) else {
            return;
        };

        if let Some(player) = self
            .registry
            .get_mut(&map_id)
            .and_then(|room| room.players.get_mut(&od_id))
        {
            if let Value::Object(diff) = &payload {
                if let Some(v) = diff.get("equipped") {
                    player.equipped = v.clone();
                }
                if let Some(v) = diff.get("cosmeticEquipped") {
                    player.cosmetic_equipped = v.clone();
                }
                if let Some(v) = diff.get("customization") {
                    player.customization = v.clone();
                }
                if let Some(v) = diff.get("equippedMedal") {
                    player.equipped_medal = v.clone();
                }
                if let Some(v) = diff.get("displayMedals") {
                    player.display_medals = v.clone();
                }
                if let Some(Value::String(guild)) = diff.get("guild") {
                    player.guild = Some(guild.clone());
                }
            }
        }

        if let Some(room) = self.registry.get(&map_id) {
            broadcast_to_room(
                &self.connections,
                room,
                &ServerEvent::PlayerAppearanceUpdated(tag_sender(payload, &od_id)),
                Some(&od_id),
            );
        }
    }

    /// Records a party change and tells the room.
    pub fn handle_update_party(&mut self, conn_id: ConnectionId, data: UpdatePartyData) {
        let Some((od_id, map_id)) = self.sender_room(conn_id) else {
            return;
        };

        if let Some(player) = self
            .registry
            .get_mut(&map_id)
            .and_then(|room| room.players.get_mut(&od_id))
        {
            player.party_id = data.party_id.clone();
        }

        if let Some(room) = self.registry.get(&map_id) {
            broadcast_to_room(
                &self.connections,
                room,
                &ServerEvent::PlayerPartyUpdated {
                    od_id: od_id.clone(),
                    party_id: data.party_id,
                },
                Some(&od_id),
            );
        }
    }

    /// Records the sender's combat stats and relays them for party frames.
    pub fn handle_update_party_stats(&mut self, conn_id: ConnectionId, data: PartyStatsData) {
        let Some((od_id, map_id)) = self.sender_room(conn_id) else {
            return;
        };

        if let Some(player) = self
            .registry
            .get_mut(&map_id)
            .and_then(|room| room.players.get_mut(&od_id))
        {
            player.hp = data.hp;
            player.max_hp = data.max_hp;
            player.level = data.level;
            player.exp = data.exp;
            player.max_exp = data.max_exp;
        }

        if let Some(room) = self.registry.get(&map_id) {
            broadcast_to_room(
                &self.connections,
                room,
                &ServerEvent::PartyMemberStats {
                    od_id: od_id.clone(),
                    hp: data.hp,
                    max_hp: data.max_hp,
                    level: data.level,
                    exp: data.exp,
                    max_exp: data.max_exp,
                },
                Some(&od_id),
            );
        }
    }

    /// Liveness echo.
    pub fn handle_latency_ping(&mut self, conn_id: ConnectionId, data: Option<LatencyPingData>) {
        self.unicast(
            conn_id,
            ServerEvent::LatencyPong {
                timestamp: data.and_then(|d| d.timestamp),
            },
        );
    }
}
