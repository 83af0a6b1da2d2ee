//! Player presence lifecycle
//!
//! Handles the four membership transitions (join, rejoin, map change,
//! disconnect) plus the periodic inactivity sweep. A player exists in at most
//! one room at a time; every transition keeps the room registry, the
//! connection registry, and the rate limiter consistent with each other.

use crate::connections::ConnectionId;
use crate::rate_limiter::RateAction;
use crate::world::{broadcast_to_room, World};
use log::{info, warn};
use shared::{ChangeMapData, JoinData, Player, PositionData, RejoinData, ServerEvent};

impl World {
    /// Installs a new player into a room.
    ///
    /// Rejects the request outright when identity, name, or map are missing.
    /// An `odId` that is already present (a stale session, or the same
    /// character joining from a new socket) is removed first so the identity
    /// stays unique process-wide.
    pub fn handle_join(&mut self, conn_id: ConnectionId, data: JoinData, now: u64) {
        let (od_id, name, map_id) = match (&data.od_id, &data.name, &data.map_id) {
            (Some(od), Some(name), Some(map)) => (od.clone(), name.clone(), map.clone()),
            _ => {
                self.send_error(conn_id, "join requires odId, name, and mapId");
                return;
            }
        };

        if self.registry.location_of(&od_id).is_some() {
            self.remove_identity(&od_id);
        }

        let player = Player {
            od_id: od_id.clone(),
            name: name.clone(),
            map_id: map_id.clone(),
            x: data.x,
            y: data.y,
            facing: Default::default(),
            animation_state: String::new(),
            velocity_x: 0.0,
            velocity_y: 0.0,
            level: data.level,
            player_class: data.player_class,
            hp: 0,
            max_hp: 0,
            exp: 0,
            max_exp: 0,
            guild: data.guild,
            party_id: data.party_id,
            equipped: data.equipped,
            cosmetic_equipped: data.cosmetic_equipped,
            customization: data.customization,
            equipped_medal: data.equipped_medal,
            display_medals: data.display_medals,
            active_buffs: serde_json::Value::Null,
            pet: None,
            conn: conn_id,
            last_update: now,
        };

        self.connections.set_od(conn_id, &od_id);
        self.install_player(conn_id, player);
        info!("Player {} ({}) joined map {}", name, od_id, map_id);
    }

    /// Character switch on an existing socket: sheds every identity the
    /// connection owned (and the explicitly named old one), then joins.
    pub fn handle_rejoin(&mut self, conn_id: ConnectionId, data: RejoinData, now: u64) {
        if let Some(current) = self.connections.od_of(conn_id).map(String::from) {
            self.remove_identity(&current);
        }
        if let Some(old) = data.old_od_id.clone() {
            self.remove_identity(&old);
        }

        self.handle_join(conn_id, data.join, now);
    }

    /// Atomically moves a player between rooms.
    ///
    /// Changing to the current map is a membership confirmation: position is
    /// updated and the roster re-sent, but nobody sees a leave or join.
    pub fn handle_change_map(&mut self, conn_id: ConnectionId, data: ChangeMapData, now: u64) {
        let Some(od_id) = self.connections.od_of(conn_id).map(String::from) else {
            self.send_error(conn_id, "changeMap requires a joined player");
            return;
        };
        let Some(new_map_id) = data.new_map_id else {
            self.send_error(conn_id, "changeMap requires newMapId");
            return;
        };
        let Some(current_map) = self.registry.location_of(&od_id).map(String::from) else {
            return;
        };

        if current_map == new_map_id {
            if let Some(player) = self
                .registry
                .get_mut(&current_map)
                .and_then(|room| room.players.get_mut(&od_id))
            {
                player.x = data.x;
                player.y = data.y;
                player.last_update = now;
            }
            self.send_room_snapshot(conn_id, &current_map, &od_id);
            return;
        }

        let Some(mut player) = self.registry.remove_player(&od_id) else {
            return;
        };

        let left = ServerEvent::PlayerLeft {
            od_id: od_id.clone(),
        };
        let old_room_empty = match self.registry.get(&current_map) {
            Some(room) => {
                broadcast_to_room(&self.connections, room, &left, None);
                room.players.is_empty()
            }
            None => false,
        };
        if old_room_empty {
            self.registry.destroy_room(&current_map);
        }

        player.map_id = new_map_id.clone();
        player.x = data.x;
        player.y = data.y;
        player.last_update = now;

        info!(
            "Player {} moved from map {} to {}",
            od_id, current_map, new_map_id
        );
        self.install_player(conn_id, player);
    }

    /// Records a client position report and relays it to the room.
    pub fn handle_update_position(&mut self, conn_id: ConnectionId, data: PositionData, now: u64) {
        let Some(od_id) = self.connections.od_of(conn_id).map(String::from) else {
            return;
        };

        if !self.limiter.admit(&od_id, RateAction::Position, now) {
            warn!("Rate limit: dropping position update from {}", od_id);
            return;
        }

        let Some(map_id) = self.registry.location_of(&od_id).map(String::from) else {
            return;
        };

        let moved = {
            let Some(player) = self
                .registry
                .get_mut(&map_id)
                .and_then(|room| room.players.get_mut(&od_id))
            else {
                return;
            };

            player.x = data.x;
            player.y = data.y;
            player.facing = data.facing;
            player.animation_state = data.animation_state.clone();
            player.velocity_x = data.velocity_x;
            player.velocity_y = data.velocity_y;
            player.last_update = now;
            if let Some(buffs) = data.active_buffs {
                player.active_buffs = buffs;
            }
            if data.pet.is_some() {
                player.pet = data.pet;
            }

            ServerEvent::PlayerMoved {
                od_id: od_id.clone(),
                x: player.x,
                y: player.y,
                facing: player.facing,
                animation_state: player.animation_state.clone(),
                velocity_x: player.velocity_x,
                velocity_y: player.velocity_y,
                active_buffs: player.active_buffs.clone(),
                pet: player.pet.clone(),
            }
        };

        if let Some(room) = self.registry.get(&map_id) {
            broadcast_to_room(&self.connections, room, &moved, Some(&od_id));
        }
    }

    /// Tears down everything a closed socket owned.
    pub fn handle_disconnect(&mut self, conn_id: ConnectionId) {
        self.gm_sessions.remove(&conn_id);
        if let Some(od_id) = self.connections.od_of(conn_id).map(String::from) {
            self.remove_identity(&od_id);
        }
        self.connections.remove(conn_id);
    }

    /// Removes players whose last report is older than the configured
    /// timeout, exactly as if they had disconnected.
    pub fn sweep_inactive(&mut self, now: u64) {
        let timeout = self.config.player_timeout_ms;
        let stale: Vec<String> = self
            .registry
            .rooms
            .values()
            .flat_map(|room| room.players.values())
            .filter(|p| now.saturating_sub(p.last_update) > timeout)
            .map(|p| p.od_id.clone())
            .collect();

        for od_id in stale {
            warn!("Removing inactive player {}", od_id);
            self.remove_identity(&od_id);
        }
    }

    /// Removes one identity from its room, notifying the remaining members
    /// and destroying the room if it emptied.
    pub(crate) fn remove_identity(&mut self, od_id: &str) -> Option<Player> {
        let player = self.registry.remove_player(od_id)?;
        let map_id = player.map_id.clone();

        self.connections.clear_od(od_id);
        self.limiter.forget(od_id);

        let left = ServerEvent::PlayerLeft {
            od_id: od_id.to_string(),
        };
        let room_empty = match self.registry.get(&map_id) {
            Some(room) => {
                broadcast_to_room(&self.connections, room, &left, None);
                room.players.is_empty()
            }
            None => false,
        };
        if room_empty {
            self.registry.destroy_room(&map_id);
        }

        info!("Player {} left map {}", od_id, map_id);
        Some(player)
    }

    /// Puts a fully built player into their room and plays the join
    /// choreography: roster and monster list to the newcomer, `playerJoined`
    /// to everyone else.
    fn install_player(&mut self, conn_id: ConnectionId, player: Player) {
        let od_id = player.od_id.clone();
        let map_id = player.map_id.clone();

        self.registry.insert_player(player.clone());
        self.send_room_snapshot(conn_id, &map_id, &od_id);

        if let Some(room) = self.registry.get(&map_id) {
            broadcast_to_room(
                &self.connections,
                room,
                &ServerEvent::PlayerJoined(player),
                Some(&od_id),
            );
        }
    }

    /// Unicasts the current roster and live monsters of a room.
    fn send_room_snapshot(&self, conn_id: ConnectionId, map_id: &str, exclude_od: &str) {
        let Some(room) = self.registry.get(map_id) else {
            return;
        };

        let roster: Vec<Player> = room
            .players
            .values()
            .filter(|p| p.od_id != exclude_od)
            .cloned()
            .collect();

        self.unicast(conn_id, ServerEvent::CurrentPlayers(roster));
        self.unicast(conn_id, ServerEvent::CurrentMonsters(room.live_monsters()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::WorldConfig;
    use shared::ClientEvent;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn connect(world: &mut World, conn_id: u64) -> UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        world.handle_connect(conn_id, "127.0.0.1:9000".parse().unwrap(), tx);
        rx
    }

    fn join_data(od_id: &str, name: &str, map_id: &str) -> JoinData {
        JoinData {
            od_id: Some(od_id.to_string()),
            name: Some(name.to_string()),
            map_id: Some(map_id.to_string()),
            x: 100.0,
            y: 200.0,
            ..Default::default()
        }
    }

    fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_join_installs_player_and_greets() {
        let mut world = World::with_seed(WorldConfig::default(), 1);
        let mut rx = connect(&mut world, 1);

        world.handle_join(1, join_data("od_1", "Mira", "henesys"), 1_000);

        assert_eq!(world.registry.location_of("od_1"), Some("henesys"));
        assert_eq!(world.connections.od_of(1), Some("od_1"));

        let events = drain(&mut rx);
        assert!(matches!(events[0], ServerEvent::ServerStartTime { .. }));
        assert!(matches!(events[1], ServerEvent::CurrentPlayers(ref p) if p.is_empty()));
        assert!(matches!(events[2], ServerEvent::CurrentMonsters(ref m) if m.is_empty()));
    }

    #[test]
    fn test_join_rejects_missing_identity() {
        let mut world = World::with_seed(WorldConfig::default(), 1);
        let mut rx = connect(&mut world, 1);

        world.handle_join(
            1,
            JoinData {
                name: Some("Mira".to_string()),
                map_id: Some("henesys".to_string()),
                ..Default::default()
            },
            1_000,
        );

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerEvent::Error { .. })));
        assert_eq!(world.registry.total_players(), 0);
    }

    #[test]
    fn test_second_join_sees_first_and_first_is_notified() {
        let mut world = World::with_seed(WorldConfig::default(), 1);
        let mut rx1 = connect(&mut world, 1);
        let mut rx2 = connect(&mut world, 2);

        world.handle_join(1, join_data("od_1", "Mira", "henesys"), 1_000);
        drain(&mut rx1);

        world.handle_join(2, join_data("od_2", "Faye", "henesys"), 1_001);

        let events2 = drain(&mut rx2);
        assert!(events2
            .iter()
            .any(|e| matches!(e, ServerEvent::CurrentPlayers(p) if p.len() == 1)));

        let events1 = drain(&mut rx1);
        assert!(events1
            .iter()
            .any(|e| matches!(e, ServerEvent::PlayerJoined(p) if p.od_id == "od_2")));
    }

    #[test]
    fn test_join_disconnect_join_roundtrip() {
        let mut world = World::with_seed(WorldConfig::default(), 1);
        let _rx = connect(&mut world, 1);
        world.handle_join(1, join_data("od_1", "Mira", "henesys"), 1_000);
        world.handle_disconnect(1);

        assert_eq!(world.registry.total_players(), 0);
        assert!(world.registry.get("henesys").is_none());

        let _rx = connect(&mut world, 2);
        world.handle_join(2, join_data("od_1", "Mira", "henesys"), 2_000);

        assert_eq!(world.registry.location_of("od_1"), Some("henesys"));
        assert_eq!(world.registry.total_players(), 1);
    }

    #[test]
    fn test_rejoin_replaces_identity() {
        let mut world = World::with_seed(WorldConfig::default(), 1);
        let mut rx1 = connect(&mut world, 1);
        let mut rx2 = connect(&mut world, 2);

        world.handle_join(1, join_data("od_1", "Mira", "henesys"), 1_000);
        world.handle_join(2, join_data("od_2", "Faye", "henesys"), 1_000);
        drain(&mut rx1);
        drain(&mut rx2);

        world.handle_event(
            1,
            ClientEvent::Rejoin(RejoinData {
                join: join_data("od_3", "MiraMage", "henesys"),
                old_od_id: Some("od_1".to_string()),
            }),
            2_000,
        );

        assert_eq!(world.registry.location_of("od_1"), None);
        assert_eq!(world.registry.location_of("od_3"), Some("henesys"));
        assert_eq!(world.connections.od_of(1), Some("od_3"));

        let events2 = drain(&mut rx2);
        assert!(events2
            .iter()
            .any(|e| matches!(e, ServerEvent::PlayerLeft { od_id } if od_id == "od_1")));
        assert!(events2
            .iter()
            .any(|e| matches!(e, ServerEvent::PlayerJoined(p) if p.od_id == "od_3")));
    }

    #[test]
    fn test_change_map_moves_between_rooms() {
        let mut world = World::with_seed(WorldConfig::default(), 1);
        let mut rx1 = connect(&mut world, 1);
        let mut rx2 = connect(&mut world, 2);

        world.handle_join(1, join_data("od_1", "Mira", "henesys"), 1_000);
        world.handle_join(2, join_data("od_2", "Faye", "henesys"), 1_000);
        drain(&mut rx1);
        drain(&mut rx2);

        world.handle_change_map(
            1,
            ChangeMapData {
                new_map_id: Some("sleepywood".to_string()),
                x: 50.0,
                y: 60.0,
            },
            2_000,
        );

        assert_eq!(world.registry.location_of("od_1"), Some("sleepywood"));
        let events2 = drain(&mut rx2);
        assert!(events2
            .iter()
            .any(|e| matches!(e, ServerEvent::PlayerLeft { od_id } if od_id == "od_1")));

        // Old room still has od_2, so it survives; the new room exists.
        assert!(world.registry.get("henesys").is_some());
        assert!(world.registry.get("sleepywood").is_some());
    }

    #[test]
    fn test_change_map_to_same_map_is_membership_confirmation() {
        let mut world = World::with_seed(WorldConfig::default(), 1);
        let mut rx1 = connect(&mut world, 1);
        let mut rx2 = connect(&mut world, 2);

        world.handle_join(1, join_data("od_1", "Mira", "henesys"), 1_000);
        world.handle_join(2, join_data("od_2", "Faye", "henesys"), 1_000);
        drain(&mut rx1);
        drain(&mut rx2);

        world.handle_change_map(
            1,
            ChangeMapData {
                new_map_id: Some("henesys".to_string()),
                x: 10.0,
                y: 20.0,
            },
            2_000,
        );

        // The requester gets a fresh snapshot, nobody else sees churn.
        let events1 = drain(&mut rx1);
        assert!(events1
            .iter()
            .any(|e| matches!(e, ServerEvent::CurrentPlayers(_))));

        let events2 = drain(&mut rx2);
        assert!(!events2
            .iter()
            .any(|e| matches!(e, ServerEvent::PlayerLeft { .. } | ServerEvent::PlayerJoined(_))));
    }

    #[test]
    fn test_last_leaver_destroys_room() {
        let mut world = World::with_seed(WorldConfig::default(), 1);
        let _rx = connect(&mut world, 1);
        world.handle_join(1, join_data("od_1", "Mira", "henesys"), 1_000);

        world.handle_change_map(
            1,
            ChangeMapData {
                new_map_id: Some("sleepywood".to_string()),
                x: 0.0,
                y: 0.0,
            },
            2_000,
        );

        assert!(world.registry.get("henesys").is_none());
    }

    #[test]
    fn test_position_update_relays_to_others_only() {
        let mut world = World::with_seed(WorldConfig::default(), 1);
        let mut rx1 = connect(&mut world, 1);
        let mut rx2 = connect(&mut world, 2);

        world.handle_join(1, join_data("od_1", "Mira", "henesys"), 1_000);
        world.handle_join(2, join_data("od_2", "Faye", "henesys"), 1_000);
        drain(&mut rx1);
        drain(&mut rx2);

        world.handle_update_position(
            1,
            PositionData {
                x: 333.0,
                y: 444.0,
                ..Default::default()
            },
            2_000,
        );

        let events1 = drain(&mut rx1);
        assert!(!events1
            .iter()
            .any(|e| matches!(e, ServerEvent::PlayerMoved { .. })));

        let events2 = drain(&mut rx2);
        assert!(events2
            .iter()
            .any(|e| matches!(e, ServerEvent::PlayerMoved { od_id, x, .. } if od_id == "od_1" && *x == 333.0)));
    }

    #[test]
    fn test_inactivity_sweep_drops_stale_players() {
        let mut world = World::with_seed(WorldConfig::default(), 1);
        let _rx1 = connect(&mut world, 1);
        let _rx2 = connect(&mut world, 2);

        world.handle_join(1, join_data("od_1", "Mira", "henesys"), 1_000);
        world.handle_join(2, join_data("od_2", "Faye", "henesys"), 1_000);

        // od_2 keeps reporting, od_1 goes quiet.
        world.handle_update_position(2, PositionData::default(), 200_000);
        world.sweep_inactive(200_000);

        assert_eq!(world.registry.location_of("od_1"), None);
        assert_eq!(world.registry.location_of("od_2"), Some("henesys"));
    }
}
