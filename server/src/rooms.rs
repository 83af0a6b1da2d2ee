//! Map-scoped rooms and the process-wide room registry
//!
//! A room owns everything that exists on one map: present players, live and
//! dead monsters, the client-supplied topology, pending ground items, damage
//! ledgers, and the current elite pointer. Rooms come into existence on first
//! join and are destroyed when the last player leaves; timers that fire into
//! a destroyed room must observe its absence and do nothing.

use log::info;
use shared::{GroundItem, MapTopology, Monster, Player};
use std::collections::HashMap;

/// Cumulative damage per attacker on one monster.
///
/// Consulted only at kill time to attribute loot. Ties on the total resolve
/// in favor of whoever reached that total first, so every update records a
/// monotonic sequence stamp.
#[derive(Debug, Default)]
pub struct DamageLedger {
    entries: Vec<LedgerEntry>,
    next_seq: u64,
}

#[derive(Debug)]
struct LedgerEntry {
    od_id: String,
    total: i64,
    reached_at: u64,
}

impl DamageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds damage to an attacker's running total.
    pub fn record(&mut self, od_id: &str, amount: i64) {
        let seq = self.next_seq;
        self.next_seq += 1;

        if let Some(entry) = self.entries.iter_mut().find(|e| e.od_id == od_id) {
            entry.total += amount;
            entry.reached_at = seq;
        } else {
            self.entries.push(LedgerEntry {
                od_id: od_id.to_string(),
                total: amount,
                reached_at: seq,
            });
        }
    }

    /// The attacker with the highest total; earliest to reach it wins ties.
    pub fn recipient(&self) -> Option<&str> {
        self.entries
            .iter()
            .max_by(|a, b| {
                a.total
                    .cmp(&b.total)
                    .then(b.reached_at.cmp(&a.reached_at))
            })
            .map(|e| e.od_id.as_str())
    }

    /// Total recorded for one attacker.
    pub fn total_for(&self, od_id: &str) -> i64 {
        self.entries
            .iter()
            .find(|e| e.od_id == od_id)
            .map(|e| e.total)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// All state owned by one map.
#[derive(Debug)]
pub struct Room {
    pub map_id: String,
    pub players: HashMap<String, Player>,
    pub monsters: HashMap<String, Monster>,
    pub topology: Option<MapTopology>,
    pub ground_items: HashMap<String, GroundItem>,
    pub ledgers: HashMap<String, DamageLedger>,
    /// Id of the room's current elite monster, if one is up.
    pub elite_monster: Option<String>,
}

impl Room {
    pub fn new(map_id: &str) -> Self {
        Self {
            map_id: map_id.to_string(),
            players: HashMap::new(),
            monsters: HashMap::new(),
            topology: None,
            ground_items: HashMap::new(),
            ledgers: HashMap::new(),
            elite_monster: None,
        }
    }

    /// Snapshot of monsters that still participate in the simulation.
    pub fn live_monsters(&self) -> Vec<Monster> {
        self.monsters
            .values()
            .filter(|m| !m.is_dead)
            .cloned()
            .collect()
    }

    pub fn live_monster_count(&self) -> usize {
        self.monsters.values().filter(|m| !m.is_dead).count()
    }

    /// Other players in this room sharing the given party, excluding `od_id`.
    pub fn party_members(&self, party_id: &str, exclude_od: &str) -> Vec<&Player> {
        self.players
            .values()
            .filter(|p| p.od_id != exclude_od && p.party_id.as_deref() == Some(party_id))
            .collect()
    }
}

/// Process-wide mapping of map ids to rooms, plus the player location index.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    pub rooms: HashMap<String, Room>,
    /// odId → mapId for every present player.
    locations: HashMap<String, String>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the room for `map_id`, creating an empty one if needed.
    pub fn ensure_room(&mut self, map_id: &str) -> &mut Room {
        self.rooms
            .entry(map_id.to_string())
            .or_insert_with(|| {
                info!("Created room {}", map_id);
                Room::new(map_id)
            })
    }

    /// Removes a room and everything it owns. Only called once the room has
    /// no present players; timers that still reference it will no-op.
    pub fn destroy_room(&mut self, map_id: &str) {
        if let Some(room) = self.rooms.remove(map_id) {
            info!(
                "Destroyed room {} ({} monsters, {} ground items cleared)",
                map_id,
                room.monsters.len(),
                room.ground_items.len()
            );
        }
    }

    pub fn get(&self, map_id: &str) -> Option<&Room> {
        self.rooms.get(map_id)
    }

    pub fn get_mut(&mut self, map_id: &str) -> Option<&mut Room> {
        self.rooms.get_mut(map_id)
    }

    /// Map the player is currently on.
    pub fn location_of(&self, od_id: &str) -> Option<&str> {
        self.locations.get(od_id).map(|s| s.as_str())
    }

    /// Installs a player into a room, keeping the location index consistent.
    pub fn insert_player(&mut self, player: Player) {
        let map_id = player.map_id.clone();
        let od_id = player.od_id.clone();
        self.ensure_room(&map_id).players.insert(od_id.clone(), player);
        self.locations.insert(od_id, map_id);
    }

    /// Removes a player wherever they are, returning the record.
    pub fn remove_player(&mut self, od_id: &str) -> Option<Player> {
        let map_id = self.locations.remove(od_id)?;
        self.rooms.get_mut(&map_id)?.players.remove(od_id)
    }

    pub fn total_players(&self) -> usize {
        self.rooms.values().map(|r| r.players.len()).sum()
    }

    pub fn total_monsters(&self) -> usize {
        self.rooms.values().map(|r| r.live_monster_count()).sum()
    }
}
