//! Elite monster promotion
//!
//! A randomized timer sweeps all populated rooms and, with some luck,
//! upgrades one ordinary monster per room into a heavily stat-boosted elite.
//! Excluded map prefixes and special monsters never qualify, and a room holds
//! at most one elite at a time; the pointer clears when the elite dies.

use crate::connections::ConnectionId;
use crate::world::{broadcast_to_room, World};
use log::{info, warn};
use rand::Rng;
use shared::{
    is_excluded_map, ServerEvent, TransformEliteData, ELITE_CHANCE, ELITE_DAMAGE_MULTIPLIER,
    ELITE_HP_MULTIPLIER, TEST_DUMMY_TYPE,
};

fn eligible_for_promotion(monster: &shared::Monster) -> bool {
    !monster.is_dead
        && !monster.is_mini_boss
        && !monster.is_trial_boss
        && !monster.is_elite_monster
        && monster.monster_type != TEST_DUMMY_TYPE
}

impl World {
    /// One promoter sweep across every room, invoked by the randomized timer.
    pub fn promote_elites(&mut self, now: u64) {
        let rng = &mut self.rng;

        for room in self.registry.rooms.values_mut() {
            if room.players.is_empty()
                || is_excluded_map(&room.map_id)
                || room.elite_monster.is_some()
            {
                continue;
            }

            if !rng.gen_bool(ELITE_CHANCE) {
                continue;
            }

            let candidates: Vec<String> = room
                .monsters
                .values()
                .filter(|m| eligible_for_promotion(m))
                .map(|m| m.id.clone())
                .collect();
            if candidates.is_empty() {
                continue;
            }

            let chosen = candidates[rng.gen_range(0..candidates.len())].clone();
            let Some(monster) = room.monsters.get_mut(&chosen) else {
                continue;
            };

            let original_max_hp = monster.max_hp;
            let original_damage = monster.damage;
            monster.original_max_hp = Some(original_max_hp);
            monster.original_damage = Some(original_damage);
            monster.max_hp *= ELITE_HP_MULTIPLIER;
            monster.hp = monster.max_hp;
            monster.damage *= ELITE_DAMAGE_MULTIPLIER;
            monster.is_elite_monster = true;
            monster.last_update = now;

            let event = ServerEvent::MonsterTransformedElite {
                monster_id: monster.id.clone(),
                max_hp: monster.max_hp,
                hp: monster.hp,
                damage: monster.damage,
                original_max_hp,
                original_damage,
            };

            room.elite_monster = Some(chosen.clone());
            info!("Promoted {} to elite on map {}", chosen, room.map_id);
            broadcast_to_room(&self.connections, room, &event, None);
        }
    }

    /// Client-initiated elite transform for mini-events. Requires an
    /// authorized GM session; everyone else gets a single error reply.
    pub fn handle_transform_elite(
        &mut self,
        conn_id: ConnectionId,
        data: TransformEliteData,
        now: u64,
    ) {
        if !self.gm_sessions.contains(&conn_id) {
            warn!("Unauthorized transformElite from connection {}", conn_id);
            self.send_error(conn_id, "transformElite requires GM authorization");
            return;
        }

        let Some(od_id) = self.connections.od_of(conn_id).map(String::from) else {
            return;
        };
        let Some(map_id) = self.registry.location_of(&od_id).map(String::from) else {
            return;
        };
        let Some(monster_id) = data.monster_id else {
            return;
        };

        let event = {
            let Some(room) = self.registry.get_mut(&map_id) else {
                return;
            };
            let Some(monster) = room.monsters.get_mut(&monster_id) else {
                return;
            };

            let original_max_hp = data.original_max_hp.unwrap_or(monster.max_hp);
            let original_damage = data.original_damage.unwrap_or(monster.damage);
            monster.original_max_hp = Some(original_max_hp);
            monster.original_damage = Some(original_damage);
            if data.max_hp > 0 {
                monster.max_hp = data.max_hp;
                monster.hp = data.max_hp;
            }
            if data.damage > 0 {
                monster.damage = data.damage;
            }
            monster.is_elite_monster = true;
            monster.last_update = now;
            room.elite_monster = Some(monster_id.clone());

            ServerEvent::MonsterTransformedElite {
                monster_id: monster_id.clone(),
                max_hp: monster.max_hp,
                hp: monster.hp,
                damage: monster.damage,
                original_max_hp,
                original_damage,
            }
        };

        if let Some(room) = self.registry.get(&map_id) {
            broadcast_to_room(&self.connections, room, &event, None);
        }
    }
}
