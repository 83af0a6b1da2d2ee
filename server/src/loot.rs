//! Loot generation and ground-item authority
//!
//! Every item that can be picked up was minted here with a server-owned id.
//! Monster drops ride inside the `monsterKilled` payload; player drops get a
//! confirm so the dropper adopts the canonical id. Pickup is first-come-wins:
//! consuming an id twice is impossible because the first consumer removes it
//! from the room.

use crate::connections::ConnectionId;
use crate::rate_limiter::RateAction;
use crate::world::{broadcast_to_room, CelebrationDrop, World};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::Rng;
use shared::{
    GroundItem, ItemPickupData, Monster, MonsterType, PlayerDropData, ServerEvent, ShareGoldData,
    ELITE_GOLD_MULTIPLIER, ELITE_LOOT_RATE_MULTIPLIER, MONSTER_DROP_OWNER,
};

const DROP_VELOCITY_X: std::ops::Range<f32> = -2.0..2.0;
const DROP_VELOCITY_Y: std::ops::Range<f32> = -5.0..-3.0;

/// Guaranteed elite bonus drops.
const ELITE_GOLD_RANGE: std::ops::Range<i64> = 50_000..100_000;
const ELITE_TICKET_NAME: &str = "Gachapon Ticket";
const ELITE_SCROLL_NAME: &str = "Enhancement Scroll";

fn drop_suffix(rng: &mut StdRng) -> String {
    format!("{:04x}", rng.gen::<u16>())
}

/// Id for a monster drop: timestamp plus per-kill index plus noise.
pub fn monster_drop_id(now: u64, index: usize, rng: &mut StdRng) -> String {
    format!("drop_{}_{}_{}", now, index, drop_suffix(rng))
}

/// Id for a player-initiated drop.
pub fn player_drop_id(now: u64, rng: &mut StdRng) -> String {
    format!("pdrop_{}_{}", now, drop_suffix(rng))
}

fn mint_drop(
    drops: &mut Vec<GroundItem>,
    name: &str,
    amount: Option<i64>,
    base_x: f32,
    base_y: f32,
    rng: &mut StdRng,
    now: u64,
) {
    let index = drops.len();
    drops.push(GroundItem {
        item_id: monster_drop_id(now, index, rng),
        name: name.to_string(),
        x: base_x + index as f32 * 10.0,
        y: base_y,
        dropped_by: MONSTER_DROP_OWNER.to_string(),
        timestamp: now,
        velocity_x: rng.gen_range(DROP_VELOCITY_X),
        velocity_y: rng.gen_range(DROP_VELOCITY_Y),
        amount,
        is_gold: amount.map(|_| true),
        stats: None,
        rarity: None,
        enhancement: None,
        quantity: None,
        level_req: None,
        is_quest_item: None,
    });
}

/// Rolls a dead monster's loot.
///
/// Base table entries carrying a min/max pair are gold; elites roll the base
/// table at triple rate, scale gold twentyfold, and always add a gold pile,
/// gachapon tickets, and enhancement scrolls. Celebration drops are granted
/// on top for matching monster types.
pub fn generate_drops(
    monster: &Monster,
    entry: Option<&MonsterType>,
    celebrations: &[CelebrationDrop],
    rng: &mut StdRng,
    now: u64,
) -> Vec<GroundItem> {
    let mut drops = Vec::new();
    let base_x = monster.center_x();
    let base_y = monster.center_y();
    let rate_mult = if monster.is_elite_monster {
        ELITE_LOOT_RATE_MULTIPLIER
    } else {
        1.0
    };

    if let Some(entry) = entry {
        for loot in &entry.loot {
            if rng.gen::<f64>() >= loot.rate * rate_mult {
                continue;
            }

            let amount = match (loot.min, loot.max) {
                (Some(min), Some(max)) => {
                    let mut amount = rng.gen_range(min..=max.max(min));
                    if monster.is_elite_monster {
                        amount *= ELITE_GOLD_MULTIPLIER;
                    }
                    Some(amount)
                }
                _ => None,
            };

            mint_drop(&mut drops, &loot.name, amount, base_x, base_y, rng, now);
        }
    }

    if monster.is_elite_monster {
        let gold = rng.gen_range(ELITE_GOLD_RANGE);
        mint_drop(&mut drops, "Gold", Some(gold), base_x, base_y, rng, now);

        let tickets = rng.gen_range(2..=5);
        for _ in 0..tickets {
            mint_drop(&mut drops, ELITE_TICKET_NAME, None, base_x, base_y, rng, now);
        }

        let scrolls = rng.gen_range(4..=8);
        for _ in 0..scrolls {
            mint_drop(&mut drops, ELITE_SCROLL_NAME, None, base_x, base_y, rng, now);
        }
    }

    for celebration in celebrations {
        if let Some(required) = &celebration.monster_type {
            if required != &monster.monster_type {
                continue;
            }
        }
        if rng.gen::<f64>() < celebration.rate {
            mint_drop(&mut drops, &celebration.name, None, base_x, base_y, rng, now);
        }
    }

    drops
}

impl World {
    /// First-come-wins pickup of a ground item.
    pub fn handle_item_pickup(&mut self, conn_id: ConnectionId, data: ItemPickupData, now: u64) {
        let Some(od_id) = self.connections.od_of(conn_id).map(String::from) else {
            return;
        };

        if !self.limiter.admit(&od_id, RateAction::Pickup, now) {
            warn!("Rate limit: dropping pickup from {}", od_id);
            return;
        }

        let Some(map_id) = self.registry.location_of(&od_id).map(String::from) else {
            return;
        };

        let taken = {
            let Some(room) = self.registry.get_mut(&map_id) else {
                return;
            };
            let picker_name = room
                .players
                .get(&od_id)
                .map(|p| p.name.clone())
                .unwrap_or_default();
            room.ground_items
                .remove(&data.item_id)
                .map(|item| (item, picker_name))
        };

        match taken {
            Some((item, picker_name)) => {
                let item_name = if data.item_name.is_empty() {
                    item.name.clone()
                } else {
                    data.item_name.clone()
                };
                info!("Player {} picked up {} ({})", od_id, item_name, item.item_id);

                let picked = ServerEvent::ItemPickedUp {
                    item_id: item.item_id,
                    item_name,
                    x: data.x,
                    y: data.y,
                    picked_up_by: od_id.clone(),
                    picked_up_by_name: picker_name,
                };
                if let Some(room) = self.registry.get(&map_id) {
                    broadcast_to_room(&self.connections, room, &picked, None);
                }
            }
            None => {
                // Somebody else got there first; only the loser hears about it.
                self.unicast(
                    conn_id,
                    ServerEvent::ItemPickupRejected {
                        item_id: data.item_id,
                        item_name: data.item_name,
                        reason: "already_picked_up".to_string(),
                    },
                );
            }
        }
    }

    /// Mints a server id for a player-initiated drop and installs it.
    pub fn handle_player_drop(&mut self, conn_id: ConnectionId, data: PlayerDropData, now: u64) {
        let Some(od_id) = self.connections.od_of(conn_id).map(String::from) else {
            return;
        };
        let Some(map_id) = self.registry.location_of(&od_id).map(String::from) else {
            return;
        };

        let item = GroundItem {
            item_id: player_drop_id(now, &mut self.rng),
            name: data.name,
            x: data.x,
            y: data.y,
            dropped_by: od_id.clone(),
            timestamp: now,
            velocity_x: self.rng.gen_range(DROP_VELOCITY_X),
            velocity_y: self.rng.gen_range(DROP_VELOCITY_Y),
            amount: data.amount,
            is_gold: data.is_gold,
            stats: data.stats,
            rarity: data.rarity,
            enhancement: data.enhancement,
            quantity: data.quantity,
            level_req: data.level_req,
            is_quest_item: data.is_quest_item,
        };

        let confirm = ServerEvent::PlayerDropConfirm {
            id: item.item_id.clone(),
            velocity_x: item.velocity_x,
            velocity_y: item.velocity_y,
        };

        {
            let Some(room) = self.registry.get_mut(&map_id) else {
                return;
            };
            room.ground_items.insert(item.item_id.clone(), item.clone());
        }

        if let Some(room) = self.registry.get(&map_id) {
            broadcast_to_room(
                &self.connections,
                room,
                &ServerEvent::PlayerItemDropped(item),
                Some(&od_id),
            );
        }
        self.unicast(conn_id, confirm);
    }

    /// Splits picked-up gold across the looter's party members on this map.
    ///
    /// Every recipient is guaranteed at least one gold, so the split may
    /// over-distribute by up to member-count minus one.
    pub fn handle_share_party_gold(&mut self, conn_id: ConnectionId, data: ShareGoldData) {
        if data.total_amount <= 0 {
            return;
        }

        let Some(od_id) = self.connections.od_of(conn_id).map(String::from) else {
            return;
        };
        let Some(map_id) = self.registry.location_of(&od_id).map(String::from) else {
            return;
        };
        let Some(room) = self.registry.get(&map_id) else {
            return;
        };
        let Some(looter) = room.players.get(&od_id) else {
            return;
        };
        let Some(party_id) = looter.party_id.clone() else {
            return;
        };
        let from_name = looter.name.clone();

        let members: Vec<u64> = room
            .party_members(&party_id, &od_id)
            .iter()
            .map(|p| p.conn)
            .collect();

        let member_count = 1 + members.len();
        if member_count == 1 {
            return;
        }

        let share = ((data.total_amount + member_count as i64 - 1) / member_count as i64).max(1);
        for member_conn in members {
            self.connections.send(
                member_conn,
                ServerEvent::PartyGoldShare {
                    amount: share,
                    from_name: from_name.clone(),
                },
            );
        }

        let looter_share = (data.total_amount - share * (member_count as i64 - 1)).max(1);
        self.unicast(
            conn_id,
            ServerEvent::PartyGoldShareResult {
                original_amount: data.total_amount,
                your_share: looter_share,
                member_count,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use shared::{AiState, AiType, LootEntry};
    use std::collections::HashSet;

    fn test_monster(is_elite: bool) -> Monster {
        Monster {
            id: "m_1".to_string(),
            monster_type: "babySlime".to_string(),
            x: 500.0,
            y: 400.0,
            velocity_x: 0.0,
            velocity_y: 0.0,
            direction: 1,
            facing: Default::default(),
            hp: 0,
            max_hp: 200,
            damage: 10,
            speed: 1.0,
            ai_type: AiType::Patrolling,
            ai_state: AiState::Patrolling,
            is_dead: true,
            is_mini_boss: false,
            is_elite_monster: is_elite,
            is_trial_boss: false,
            is_shiny: false,
            can_jump: false,
            is_jumping: false,
            jump_force: 0.0,
            width: 40.0,
            height: 36.0,
            patrol_min_x: 350.0,
            patrol_max_x: 650.0,
            surface_x: None,
            surface_width: None,
            spawn_x: 500.0,
            spawn_y: 400.0,
            ground_y: 600.0,
            target_player: None,
            original_max_hp: None,
            original_damage: None,
            knockback_end_time: 0,
            last_interaction_time: 0,
            last_update: 0,
        }
    }

    fn entry_with_loot(loot: Vec<LootEntry>) -> MonsterType {
        MonsterType {
            hp: 200,
            damage: 10,
            speed: 1.0,
            width: 40.0,
            height: 36.0,
            ai_type: AiType::Patrolling,
            is_mini_boss: false,
            is_trial_boss: false,
            can_jump: false,
            jump_force: 0.0,
            loot,
        }
    }

    #[test]
    fn test_certain_loot_always_drops() {
        let mut rng = StdRng::seed_from_u64(9);
        let entry = entry_with_loot(vec![LootEntry {
            name: "Slime Goo".to_string(),
            rate: 1.0,
            min: None,
            max: None,
        }]);

        let drops = generate_drops(&test_monster(false), Some(&entry), &[], &mut rng, 1_000);
        assert_eq!(drops.len(), 1);
        assert_eq!(drops[0].name, "Slime Goo");
        assert_eq!(drops[0].dropped_by, MONSTER_DROP_OWNER);
        assert!(drops[0].amount.is_none());
    }

    #[test]
    fn test_gold_entries_roll_amounts_in_range() {
        let mut rng = StdRng::seed_from_u64(9);
        let entry = entry_with_loot(vec![LootEntry {
            name: "Gold".to_string(),
            rate: 1.0,
            min: Some(10),
            max: Some(20),
        }]);

        for _ in 0..200 {
            let drops = generate_drops(&test_monster(false), Some(&entry), &[], &mut rng, 1_000);
            let amount = drops[0].amount.unwrap();
            assert!((10..=20).contains(&amount));
            assert_eq!(drops[0].is_gold, Some(true));
        }
    }

    #[test]
    fn test_elite_scales_gold_and_adds_bundle() {
        let mut rng = StdRng::seed_from_u64(9);
        let entry = entry_with_loot(vec![LootEntry {
            name: "Gold".to_string(),
            rate: 1.0,
            min: Some(10),
            max: Some(20),
        }]);

        let drops = generate_drops(&test_monster(true), Some(&entry), &[], &mut rng, 1_000);

        // Table gold is scaled twentyfold.
        let table_gold = drops[0].amount.unwrap();
        assert!((200..=400).contains(&table_gold));

        // Guaranteed elite pile plus tickets and scrolls.
        let elite_gold = drops
            .iter()
            .skip(1)
            .find(|d| d.amount.is_some())
            .expect("elite gold pile");
        assert!((50_000..100_000).contains(&elite_gold.amount.unwrap()));

        let tickets = drops.iter().filter(|d| d.name == "Gachapon Ticket").count();
        assert!((2..=5).contains(&tickets));

        let scrolls = drops
            .iter()
            .filter(|d| d.name == "Enhancement Scroll")
            .count();
        assert!((4..=8).contains(&scrolls));
    }

    #[test]
    fn test_celebration_drop_respects_type_filter() {
        let mut rng = StdRng::seed_from_u64(9);
        let celebrations = vec![CelebrationDrop {
            name: "Salami Stick".to_string(),
            monster_type: Some("babySlime".to_string()),
            rate: 1.0,
        }];

        let drops = generate_drops(&test_monster(false), None, &celebrations, &mut rng, 1_000);
        assert_eq!(drops.len(), 1);
        assert_eq!(drops[0].name, "Salami Stick");

        let mut other = test_monster(false);
        other.monster_type = "stoneGolem".to_string();
        let drops = generate_drops(&other, None, &celebrations, &mut rng, 1_000);
        assert!(drops.is_empty());
    }

    #[test]
    fn test_drop_ids_are_unique_and_positions_staggered() {
        let mut rng = StdRng::seed_from_u64(9);
        let drops = generate_drops(&test_monster(true), None, &[], &mut rng, 1_000);

        let ids: HashSet<&str> = drops.iter().map(|d| d.item_id.as_str()).collect();
        assert_eq!(ids.len(), drops.len());

        let monster = test_monster(true);
        for (index, drop) in drops.iter().enumerate() {
            assert_eq!(drop.x, monster.center_x() + index as f32 * 10.0);
            assert!(drop.item_id.starts_with("drop_1000_"));
            assert!((-2.0..2.0).contains(&drop.velocity_x));
            assert!((-5.0..-3.0).contains(&drop.velocity_y));
        }
    }
}
