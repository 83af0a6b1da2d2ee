//! Combat arbitration
//!
//! Attacks are validated (target, rate, damage), applied to the authoritative
//! monster HP, and tracked per attacker for loot attribution. The attacker's
//! optimistic HP prediction is reconciled with a unicast correction when it
//! drifts; the room-wide broadcast always carries server truth. Kills mint
//! loot, notify the room, and arm an idempotent respawn timer.

use crate::connections::ConnectionId;
use crate::loot::generate_drops;
use crate::rate_limiter::{validate_damage, RateAction};
use crate::world::{broadcast_to_room, Scheduled, World};
use log::{debug, info, warn};
use rand::Rng;
use shared::{
    AiState, AiType, AttackCorrection, AttackData, ServerEvent, EDGE_BUFFER,
    KNOCKBACK_DISPLACEMENT, KNOCKBACK_MS, KNOCKBACK_VELOCITY, MINI_BOSS_RESPAWN_DELAY_MS,
    PQ_CORPSE_REMOVE_MS, PREDICTION_TOLERANCE, RESPAWN_DELAY_MS,
};

impl World {
    /// Applies one validated attack to a monster in the attacker's room.
    pub fn handle_attack(&mut self, conn_id: ConnectionId, data: AttackData, now: u64) {
        let Some(od_id) = self.connections.od_of(conn_id).map(String::from) else {
            return;
        };
        let Some(map_id) = self.registry.location_of(&od_id).map(String::from) else {
            return;
        };

        let Some(monster_id) = data.monster_id.clone() else {
            self.reject_attack(conn_id, data.seq);
            return;
        };

        let target_gone = self
            .registry
            .get(&map_id)
            .and_then(|room| room.monsters.get(&monster_id))
            .map_or(true, |m| m.is_dead);
        if target_gone {
            self.reject_attack(conn_id, data.seq);
            return;
        }

        if !self.limiter.admit(&od_id, RateAction::Attack, now) {
            warn!("Rate limit: dropping attack from {}", od_id);
            return;
        }

        let (damage, altered) = validate_damage(data.damage);
        if damage == 0 {
            if altered {
                warn!("Rejected invalid damage {} from {}", data.damage, od_id);
            }
            return;
        }
        if altered {
            warn!("Capped damage {} from {} to {}", data.damage, od_id, damage);
        }

        let knockback_dir = data
            .player_direction
            .filter(|d| *d == 1.0 || *d == -1.0)
            .map(|d| d as f32);

        let (damaged, correction, killed) = {
            let Some(room) = self.registry.get_mut(&map_id) else {
                return;
            };

            room.ledgers
                .entry(monster_id.clone())
                .or_default()
                .record(&od_id, damage);

            let Some(monster) = room.monsters.get_mut(&monster_id) else {
                return;
            };

            monster.hp -= damage;
            monster.last_update = now;

            let mut knockback_velocity_x = 0.0;
            if monster.ai_type != AiType::Static {
                monster.ai_state = AiState::Chasing;
                monster.target_player = Some(od_id.clone());
                monster.last_interaction_time = now;

                if let Some(dir) = knockback_dir {
                    knockback_velocity_x = dir * KNOCKBACK_VELOCITY;
                    monster.velocity_x = knockback_velocity_x;
                    monster.x = (monster.x + dir * KNOCKBACK_DISPLACEMENT)
                        .clamp(monster.patrol_min_x, monster.patrol_max_x);
                    monster.knockback_end_time = now + KNOCKBACK_MS;
                }
            }

            let killed = monster.hp <= 0;

            // Death supersedes reconciliation; the kill event carries truth.
            let correction = match (data.seq, data.predicted_hp) {
                (Some(seq), Some(predicted))
                    if !killed && (monster.hp - predicted).abs() > PREDICTION_TOLERANCE =>
                {
                    Some(AttackCorrection {
                        seq: Some(seq),
                        kind: Some("hp_correction".to_string()),
                        reason: None,
                        correct_hp: Some(monster.hp),
                        max_hp: Some(monster.max_hp),
                    })
                }
                _ => None,
            };

            let damaged = ServerEvent::MonsterDamaged {
                id: monster_id.clone(),
                seq: data.seq,
                damage,
                current_hp: monster.hp.max(0),
                max_hp: monster.max_hp,
                attacker_id: od_id.clone(),
                knockback_velocity_x,
                is_critical: data.is_critical && !altered,
            };

            (damaged, correction, killed)
        };

        if let Some(room) = self.registry.get(&map_id) {
            broadcast_to_room(&self.connections, room, &damaged, None);
        }

        if killed {
            self.kill_monster(&map_id, &monster_id, now);
        } else if let Some(correction) = correction {
            self.unicast(conn_id, ServerEvent::AttackCorrection(correction));
        }
    }

    fn reject_attack(&self, conn_id: ConnectionId, seq: Option<u64>) {
        if seq.is_some() {
            self.unicast(
                conn_id,
                ServerEvent::AttackCorrection(AttackCorrection {
                    seq,
                    reason: Some("monster_not_found".to_string()),
                    ..Default::default()
                }),
            );
        }
    }

    /// Finalizes a monster death: loot attribution, drops, the room-wide
    /// kill event, and the respawn (or corpse-removal) timer.
    pub(crate) fn kill_monster(&mut self, map_id: &str, monster_id: &str, now: u64) {
        let (killed_event, snapshot) = {
            let Some(room) = self.registry.get_mut(map_id) else {
                return;
            };
            let Some(monster) = room.monsters.get_mut(monster_id) else {
                return;
            };

            monster.is_dead = true;
            monster.hp = 0;
            let snapshot = monster.clone();

            if room.elite_monster.as_deref() == Some(monster_id) {
                room.elite_monster = None;
            }

            let recipient = room
                .ledgers
                .get(monster_id)
                .and_then(|ledger| ledger.recipient())
                .map(String::from);

            let entry = room
                .topology
                .as_ref()
                .and_then(|t| t.monster_types.get(&snapshot.monster_type))
                .cloned();

            let party_members: Vec<String> = recipient
                .as_ref()
                .and_then(|od| room.players.get(od))
                .and_then(|looter| {
                    looter.party_id.as_ref().map(|pid| {
                        room.party_members(pid, &looter.od_id)
                            .iter()
                            .map(|m| m.od_id.clone())
                            .collect()
                    })
                })
                .unwrap_or_default();

            let drops = if recipient.is_some() {
                generate_drops(
                    &snapshot,
                    entry.as_ref(),
                    &self.config.celebration_drops,
                    &mut self.rng,
                    now,
                )
            } else {
                Vec::new()
            };

            for item in &drops {
                room.ground_items.insert(item.item_id.clone(), item.clone());
            }
            room.ledgers.remove(monster_id);

            let killed_event = ServerEvent::MonsterKilled {
                id: snapshot.id.clone(),
                monster_type: snapshot.monster_type.clone(),
                x: snapshot.x,
                y: snapshot.y,
                loot_recipient: recipient,
                drops,
                party_members,
                is_elite_monster: snapshot.is_elite_monster,
                is_shiny: snapshot.is_shiny,
            };

            (killed_event, snapshot)
        };

        info!(
            "Monster {} ({}) died on map {}",
            monster_id, snapshot.monster_type, map_id
        );

        if let Some(room) = self.registry.get(map_id) {
            broadcast_to_room(&self.connections, room, &killed_event, None);
        }

        if map_id.starts_with("pq") {
            // Party-quest maps clear the corpse and never respawn.
            self.schedule(Scheduled::RemoveCorpse {
                map_id: map_id.to_string(),
                monster_id: monster_id.to_string(),
                delay_ms: PQ_CORPSE_REMOVE_MS,
            });
        } else {
            let delay_ms = if snapshot.is_mini_boss {
                MINI_BOSS_RESPAWN_DELAY_MS
            } else {
                RESPAWN_DELAY_MS
            };
            self.schedule(Scheduled::Respawn {
                map_id: map_id.to_string(),
                monster_id: monster_id.to_string(),
                delay_ms,
            });
        }
    }

    /// Respawn timer callback. Checks that the room still exists before
    /// touching anything, so a room destroyed mid-wait yields a no-op.
    pub fn handle_respawn_due(&mut self, map_id: &str, monster_id: &str, now: u64) {
        let Some(room) = self.registry.get_mut(map_id) else {
            debug!("Respawn for {} fired into destroyed room {}", monster_id, map_id);
            return;
        };
        let Some(corpse) = room.monsters.remove(monster_id) else {
            return;
        };
        if room.players.is_empty() {
            return;
        }

        let (x, y) = match (corpse.surface_x, corpse.surface_width) {
            (Some(sx), Some(sw)) => {
                let lo = sx + EDGE_BUFFER;
                let hi = (sx + sw - EDGE_BUFFER).max(lo + 1.0);
                (self.rng.gen_range(lo..hi), corpse.spawn_y)
            }
            _ => (corpse.spawn_x, corpse.spawn_y),
        };

        let type_name = corpse.monster_type.clone();
        let (surface_x, surface_width) = (corpse.surface_x, corpse.surface_width);

        if let Some(monster) =
            self.spawn_monster_in(map_id, &type_name, x, y, surface_x, surface_width, now)
        {
            info!("Respawned {} as {} on map {}", type_name, monster.id, map_id);
            if let Some(room) = self.registry.get(map_id) {
                broadcast_to_room(
                    &self.connections,
                    room,
                    &ServerEvent::MonsterSpawned(monster),
                    None,
                );
            }
        }
    }

    /// Corpse removal callback for maps that never respawn.
    pub fn handle_remove_corpse(&mut self, map_id: &str, monster_id: &str) {
        if let Some(room) = self.registry.get_mut(map_id) {
            room.monsters.remove(monster_id);
        }
    }
}
