//! Server-driven monster simulation
//!
//! Monsters are spawned from client-supplied topology the first time a map is
//! initialized, then advanced by a fixed-cadence tick. The server integrates
//! X motion only; vertical motion is left to clients, with `y` and
//! `velocityY` carried through broadcasts as advisory values.

use crate::connections::ConnectionId;
use crate::world::{broadcast_to_room, World};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::Rng;
use shared::{
    is_excluded_map, AiState, AiType, Facing, InitMapMonstersData, MapTopology, Monster,
    MonsterPositionEntry, MonsterType, Player, ServerEvent, SpawnPosition, CHASE_RANGE,
    CHASE_SPEED_FACTOR, CHASE_TIMEOUT_MS, EDGE_BUFFER, MIN_PATROL_DISTANCE,
    PATROL_CHANGE_CHANCE, PATROL_EDGE_MARGIN, PATROL_FALLBACK_RADIUS, PIN_HALF_WIDTH,
    SHINY_CHANCE, SHINY_HP_MULTIPLIER, SPEED_MULTIPLIER, TEST_DUMMY_TYPE,
};
use std::collections::HashMap;

/// Patrol range derived from a spawn point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatrolBounds {
    pub min_x: f32,
    pub max_x: f32,
    /// True when the usable range was too narrow to patrol.
    pub pinned: bool,
}

/// Derives patrol bounds from the spawn surface, or from a radius around the
/// spawn X when no surface was reported.
///
/// A surface whose usable width (after edge buffers) falls below
/// [`MIN_PATROL_DISTANCE`] pins the monster to a ±[`PIN_HALF_WIDTH`] range
/// around the surface center.
pub fn compute_patrol_bounds(
    x: f32,
    surface_x: Option<f32>,
    surface_width: Option<f32>,
    map_width: f32,
) -> PatrolBounds {
    let limit = (map_width - EDGE_BUFFER).max(0.0);

    if let (Some(sx), Some(sw)) = (surface_x, surface_width) {
        let min_x = (sx + EDGE_BUFFER).clamp(0.0, limit);
        let max_x = (sx + sw - EDGE_BUFFER).clamp(0.0, limit);

        if max_x - min_x < MIN_PATROL_DISTANCE {
            let center = (min_x + max_x) / 2.0;
            return PatrolBounds {
                min_x: center - PIN_HALF_WIDTH,
                max_x: center + PIN_HALF_WIDTH,
                pinned: true,
            };
        }

        return PatrolBounds {
            min_x,
            max_x,
            pinned: false,
        };
    }

    let min_x = (x - PATROL_FALLBACK_RADIUS).max(0.0);
    let max_x = (x + PATROL_FALLBACK_RADIUS).min(limit);

    if max_x < min_x {
        return PatrolBounds {
            min_x: x - PIN_HALF_WIDTH,
            max_x: x + PIN_HALF_WIDTH,
            pinned: true,
        };
    }

    PatrolBounds {
        min_x,
        max_x,
        pinned: false,
    }
}

fn facing_from_direction(direction: i8) -> Facing {
    if direction < 0 {
        Facing::Left
    } else {
        Facing::Right
    }
}

/// Builds a fresh monster from its catalog entry, rolling direction and the
/// shiny upgrade.
#[allow(clippy::too_many_arguments)]
pub fn build_monster(
    id: String,
    type_name: &str,
    entry: &MonsterType,
    x: f32,
    y: f32,
    surface_x: Option<f32>,
    surface_width: Option<f32>,
    map_id: &str,
    map_width: f32,
    ground_y: f32,
    rng: &mut StdRng,
    now: u64,
) -> Monster {
    let bounds = compute_patrol_bounds(x, surface_x, surface_width, map_width);
    let direction: i8 = if rng.gen_bool(0.5) { 1 } else { -1 };

    let shiny_eligible = !entry.is_mini_boss
        && !entry.is_trial_boss
        && type_name != TEST_DUMMY_TYPE
        && !is_excluded_map(map_id);
    let is_shiny = shiny_eligible && rng.gen_bool(SHINY_CHANCE);

    let mut max_hp = entry.hp;
    if is_shiny {
        max_hp *= SHINY_HP_MULTIPLIER;
    }

    let ai_state = if entry.ai_type == AiType::Static || bounds.pinned {
        AiState::Idle
    } else {
        AiState::Patrolling
    };

    let spawn_x = if bounds.pinned {
        x.clamp(bounds.min_x, bounds.max_x)
    } else {
        x
    };

    Monster {
        id,
        monster_type: type_name.to_string(),
        x: spawn_x,
        y,
        velocity_x: 0.0,
        velocity_y: 0.0,
        direction,
        facing: facing_from_direction(direction),
        hp: max_hp,
        max_hp,
        damage: entry.damage,
        speed: entry.speed,
        ai_type: entry.ai_type,
        ai_state,
        is_dead: false,
        is_mini_boss: entry.is_mini_boss,
        is_elite_monster: false,
        is_trial_boss: entry.is_trial_boss,
        is_shiny,
        can_jump: entry.can_jump,
        is_jumping: false,
        jump_force: entry.jump_force,
        width: entry.width,
        height: entry.height,
        patrol_min_x: bounds.min_x,
        patrol_max_x: bounds.max_x,
        surface_x,
        surface_width,
        spawn_x,
        spawn_y: y,
        ground_y,
        target_player: None,
        original_max_hp: None,
        original_damage: None,
        knockback_end_time: 0,
        last_interaction_time: 0,
        last_update: now,
    }
}

/// Re-anchors a chasing monster at its current position with the patrol
/// radius it already had, so giving up a chase never snaps it back.
pub fn demote_to_patrol(monster: &mut Monster, map_width: f32) {
    let radius = ((monster.patrol_max_x - monster.patrol_min_x) / 2.0).max(PIN_HALF_WIDTH);
    let limit = (map_width - EDGE_BUFFER).max(0.0);

    monster.spawn_x = monster.x;
    monster.patrol_min_x = (monster.x - radius).max(0.0);
    monster.patrol_max_x = (monster.x + radius).min(limit);
    if monster.patrol_max_x < monster.patrol_min_x {
        monster.patrol_max_x = monster.patrol_min_x;
    }
    monster.ai_state = AiState::Patrolling;
    monster.target_player = None;
}

/// Advances one monster by one tick.
pub fn update_monster_ai(
    monster: &mut Monster,
    players: &HashMap<String, Player>,
    map_width: f32,
    now: u64,
    rng: &mut StdRng,
) {
    monster.last_update = now;

    if monster.ai_type == AiType::Static {
        monster.velocity_x = 0.0;
        return;
    }

    if monster.knockback_end_time > now {
        monster.velocity_x = 0.0;
        return;
    }

    if monster.ai_state == AiState::Chasing {
        if now.saturating_sub(monster.last_interaction_time) > CHASE_TIMEOUT_MS {
            demote_to_patrol(monster, map_width);
            return;
        }

        let target = monster
            .target_player
            .as_ref()
            .and_then(|od| players.get(od));

        match target {
            Some(target) if (monster.x - monster.spawn_x).abs() < CHASE_RANGE => {
                monster.direction = if target.x > monster.center_x() { 1 } else { -1 };
                monster.facing = facing_from_direction(monster.direction);

                let step = monster.direction as f32
                    * monster.speed
                    * SPEED_MULTIPLIER
                    * CHASE_SPEED_FACTOR;
                let limit = (map_width - monster.width).max(0.0);
                let new_x = (monster.x + step).clamp(0.0, limit);

                // Pursuit may leave the patrol surface; only the map edge stops it.
                monster.velocity_x = if (new_x - (monster.x + step)).abs() > f32::EPSILON {
                    0.0
                } else {
                    step
                };
                monster.x = new_x;
            }
            _ => {
                demote_to_patrol(monster, map_width);
            }
        }
        return;
    }

    // Patrol path. Ranges too narrow to walk keep the monster idle in place.
    if monster.patrol_max_x - monster.patrol_min_x < MIN_PATROL_DISTANCE {
        monster.velocity_x = 0.0;
        monster.ai_state = AiState::Idle;
        monster.x = monster.x.clamp(monster.patrol_min_x, monster.patrol_max_x);
        return;
    }

    if monster.x <= monster.patrol_min_x + PATROL_EDGE_MARGIN {
        monster.direction = 1;
    } else if monster.x >= monster.patrol_max_x - PATROL_EDGE_MARGIN {
        monster.direction = -1;
    } else if rng.gen_bool(PATROL_CHANGE_CHANCE) {
        monster.direction = -monster.direction;
    }

    let step = monster.direction as f32 * monster.speed * SPEED_MULTIPLIER;
    let new_x = monster.x + step;

    if new_x >= monster.patrol_min_x && new_x <= monster.patrol_max_x {
        monster.x = new_x;
        monster.velocity_x = step;
    } else {
        monster.x = new_x.clamp(monster.patrol_min_x, monster.patrol_max_x);
        monster.velocity_x = 0.0;
        monster.direction = -monster.direction;
    }

    monster.x = monster.x.clamp(0.0, (map_width - monster.width).max(0.0));
    monster.facing = facing_from_direction(monster.direction);
    monster.ai_state = AiState::Patrolling;
}

impl World {
    /// Records topology from the first `initMapMonsters` a map receives and
    /// populates its monster set. Later submissions are ignored.
    pub fn handle_init_map_monsters(
        &mut self,
        conn_id: ConnectionId,
        data: InitMapMonstersData,
        now: u64,
    ) {
        let Some(od_id) = self.connections.od_of(conn_id).map(String::from) else {
            return;
        };
        let Some(map_id) = self.registry.location_of(&od_id).map(String::from) else {
            return;
        };

        {
            let Some(room) = self.registry.get_mut(&map_id) else {
                return;
            };
            if room.topology.is_some() {
                debug!("Map {} already initialized, ignoring submission", map_id);
                return;
            }
            room.topology = Some(MapTopology {
                map_width: data.map_width,
                ground_y: data.ground_y,
                monster_types: data.monster_types.clone(),
                spawn_positions: data.spawn_positions.clone(),
            });
        }

        let mut spawns = data.spawn_positions.clone();
        if spawns.is_empty() {
            // No explicit spawners: scatter `count` of each type along the ground.
            for request in &data.monsters {
                let Some(entry) = data.monster_types.get(&request.monster_type) else {
                    warn!(
                        "Map {} requested unknown monster type {}",
                        map_id, request.monster_type
                    );
                    continue;
                };
                for _ in 0..request.count {
                    let hi = (data.map_width - EDGE_BUFFER).max(EDGE_BUFFER + 1.0);
                    let x = self.rng.gen_range(EDGE_BUFFER..hi);
                    spawns.push(SpawnPosition {
                        monster_type: request.monster_type.clone(),
                        x,
                        y: data.ground_y - entry.height,
                        surface_x: None,
                        surface_width: None,
                    });
                }
            }
        }

        let mut spawned = 0usize;
        for spawn in spawns {
            if let Some(monster) = self.spawn_monster_in(
                &map_id,
                &spawn.monster_type,
                spawn.x,
                spawn.y,
                spawn.surface_x,
                spawn.surface_width,
                now,
            ) {
                spawned += 1;
                if let Some(room) = self.registry.get(&map_id) {
                    broadcast_to_room(
                        &self.connections,
                        room,
                        &ServerEvent::MonsterSpawned(monster),
                        None,
                    );
                }
            }
        }

        info!("Initialized map {} with {} monsters", map_id, spawned);
    }

    /// Spawns one monster into a room, provided the room and its catalog
    /// entry still exist. Returns a snapshot for broadcasting.
    pub(crate) fn spawn_monster_in(
        &mut self,
        map_id: &str,
        type_name: &str,
        x: f32,
        y: f32,
        surface_x: Option<f32>,
        surface_width: Option<f32>,
        now: u64,
    ) -> Option<Monster> {
        let id = self.mint_monster_id();
        let room = self.registry.get_mut(map_id)?;
        let (entry, map_width, ground_y) = {
            let topology = room.topology.as_ref()?;
            (
                topology.monster_types.get(type_name)?.clone(),
                topology.map_width,
                topology.ground_y,
            )
        };

        let monster = build_monster(
            id,
            type_name,
            &entry,
            x,
            y,
            surface_x,
            surface_width,
            map_id,
            map_width,
            ground_y,
            &mut self.rng,
            now,
        );
        room.monsters.insert(monster.id.clone(), monster.clone());
        Some(monster)
    }

    /// One simulation step across every room. Rooms without players still
    /// tick; they just skip the broadcast.
    pub fn tick(&mut self, now: u64) {
        let rng = &mut self.rng;

        for room in self.registry.rooms.values_mut() {
            let Some(topology) = room.topology.as_ref() else {
                continue;
            };
            let map_width = topology.map_width;

            let players = &room.players;
            for monster in room.monsters.values_mut() {
                if monster.is_dead {
                    continue;
                }
                update_monster_ai(monster, players, map_width, now, rng);
            }

            if room.players.is_empty() {
                continue;
            }

            let entries: Vec<MonsterPositionEntry> = room
                .monsters
                .values()
                .filter(|m| !m.is_dead)
                .map(|m| MonsterPositionEntry {
                    id: m.id.clone(),
                    x: m.x,
                    y: m.y,
                    facing: m.facing,
                    direction: m.direction,
                    ai_state: m.ai_state,
                    velocity_x: m.velocity_x,
                    velocity_y: m.velocity_y,
                    t: now,
                })
                .collect();

            broadcast_to_room(
                &self.connections,
                room,
                &ServerEvent::MonsterPositions(entries),
                None,
            );
        }
    }

    /// Unicasts the requester's current live-monster list.
    pub fn handle_request_monsters(&mut self, conn_id: ConnectionId) {
        let Some(od_id) = self.connections.od_of(conn_id) else {
            return;
        };
        let Some(room) = self
            .registry
            .location_of(od_id)
            .and_then(|map_id| self.registry.get(map_id))
        else {
            return;
        };

        let monsters = room.live_monsters();
        self.unicast(conn_id, ServerEvent::CurrentMonsters(monsters));
    }
}
