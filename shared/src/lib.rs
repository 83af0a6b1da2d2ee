//! # Shared Protocol Library
//!
//! Data structures, tuning constants, and the wire protocol shared between the
//! authoritative map server and its clients. Every frame on the wire is a JSON
//! object of the form `{"event": <name>, "data": <payload>}`; the event enums
//! in this crate are the single source of truth for those names and payloads.
//!
//! ## Contents
//!
//! - **Tuning constants**: simulation cadence, patrol geometry, combat caps,
//!   rate-limit windows, and loot multipliers. Shared so server logic and
//!   tests agree on exact values.
//! - **Game entities**: [`Player`], [`Monster`], [`GroundItem`], and the
//!   client-supplied [`MapTopology`] with its monster-type catalog.
//! - **Protocol**: [`ClientEvent`] (client → server) and [`ServerEvent`]
//!   (server → client), serialized with `serde` using camelCase names that
//!   match the deployed clients.
//!
//! ## Authority model
//!
//! The server owns monster simulation, damage arbitration, loot minting, and
//! ground-item consumption. Player position, player HP, and skill math are
//! client-owned; the server records and relays them. Vertical monster motion
//! is also client-integrated, so `y` and `velocityY` in monster broadcasts
//! are advisory.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// === Simulation tuning ===

/// Horizontal speed factor applied to catalog speed each tick.
///
/// Reconciles the 10 Hz server tick with the 60 Hz client integration running
/// at 0.7 local speed (4.2 = 60 * 0.7 / 10). Must be recomputed if the tick
/// cadence changes.
pub const SPEED_MULTIPLIER: f32 = 4.2;

/// Default server tick cadence in Hz.
pub const DEFAULT_TICK_HZ: u32 = 10;

/// Pixels kept clear of a surface edge when deriving patrol bounds.
pub const EDGE_BUFFER: f32 = 50.0;

/// Minimum usable patrol width; narrower surfaces pin the monster in place.
pub const MIN_PATROL_DISTANCE: f32 = 80.0;

/// Half-width of the pinned range used when a surface is too narrow.
pub const PIN_HALF_WIDTH: f32 = 10.0;

/// Patrol radius around the spawn point when no surface was supplied.
pub const PATROL_FALLBACK_RADIUS: f32 = 150.0;

/// Distance from a patrol bound at which direction is forced inward.
pub const PATROL_EDGE_MARGIN: f32 = 30.0;

/// Per-tick probability of a spontaneous patrol direction flip.
pub const PATROL_CHANGE_CHANCE: f64 = 0.02;

/// Chase speed is patrol speed scaled by this factor.
pub const CHASE_SPEED_FACTOR: f32 = 1.5;

/// Milliseconds without an attack before a chasing monster gives up.
pub const CHASE_TIMEOUT_MS: u64 = 5_000;

/// Maximum distance from the spawn point a chase may cover.
pub const CHASE_RANGE: f32 = 500.0;

/// Duration of the post-hit movement freeze.
pub const KNOCKBACK_MS: u64 = 500;

/// Horizontal velocity imparted per unit of attack direction.
pub const KNOCKBACK_VELOCITY: f32 = 6.0;

/// Immediate positional shove applied on hit, clamped to patrol bounds.
pub const KNOCKBACK_DISPLACEMENT: f32 = 30.0;

// === Combat and rate limiting ===

/// Absolute per-hit damage ceiling. The sole defense against forged damage.
pub const MAX_DAMAGE: i64 = 50_000;

/// Divergence between predicted and authoritative HP that triggers a
/// correction, exclusive.
pub const PREDICTION_TOLERANCE: i64 = 50;

/// Sliding rate-limit window length.
pub const RATE_WINDOW_MS: u64 = 1_000;

/// Attack admissions allowed per window.
pub const ATTACK_RATE_CAP: usize = 10;

/// Pickup admissions allowed per window.
pub const PICKUP_RATE_CAP: usize = 20;

/// Position-update admissions allowed per window.
pub const POSITION_RATE_CAP: usize = 30;

// === Spawning, loot, and promotion ===

/// Probability that an eligible monster spawns shiny.
pub const SHINY_CHANCE: f64 = 0.02;

/// Shiny monsters carry this many times the catalog HP.
pub const SHINY_HP_MULTIPLIER: i64 = 3;

/// Regular respawn delay after a kill.
pub const RESPAWN_DELAY_MS: u64 = 8_000;

/// Mini-boss respawn delay after a kill.
pub const MINI_BOSS_RESPAWN_DELAY_MS: u64 = 300_000;

/// Corpse lifetime on party-quest maps, which never respawn monsters.
pub const PQ_CORPSE_REMOVE_MS: u64 = 1_000;

/// Elite promotion sweep delay bounds.
pub const ELITE_MIN_DELAY_MS: u64 = 120_000;
pub const ELITE_MAX_DELAY_MS: u64 = 420_000;

/// Probability that an eligible room promotes a monster per sweep.
pub const ELITE_CHANCE: f64 = 0.3;

pub const ELITE_HP_MULTIPLIER: i64 = 100;
pub const ELITE_DAMAGE_MULTIPLIER: i64 = 3;

/// Elite kills roll the base loot table at this rate multiplier.
pub const ELITE_LOOT_RATE_MULTIPLIER: f64 = 3.0;

/// Elite gold drops are scaled by this factor.
pub const ELITE_GOLD_MULTIPLIER: i64 = 20;

/// Map-id prefixes excluded from shiny rolls and elite promotion.
pub const EXCLUDED_MAP_PREFIXES: &[&str] = &["dewdrop", "pq"];

/// Monster type excluded from shiny rolls and elite promotion.
pub const TEST_DUMMY_TYPE: &str = "testDummy";

/// Owner recorded on ground items minted from monster kills.
pub const MONSTER_DROP_OWNER: &str = "__monster__";

// === Presence ===

/// Interval of the stale-player sweep.
pub const INACTIVITY_SWEEP_MS: u64 = 10_000;

/// Default idle ceiling before a player is dropped as disconnected.
pub const DEFAULT_PLAYER_TIMEOUT_MS: u64 = 120_000;

/// Returns true when the map id starts with an excluded prefix.
pub fn is_excluded_map(map_id: &str) -> bool {
    EXCLUDED_MAP_PREFIXES
        .iter()
        .any(|prefix| map_id.starts_with(prefix))
}

/// Horizontal orientation of a player or monster sprite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    Left,
    Right,
}

impl Default for Facing {
    fn default() -> Self {
        Facing::Right
    }
}

/// Movement class assigned by the monster catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiType {
    Static,
    Patrolling,
}

impl Default for AiType {
    fn default() -> Self {
        AiType::Patrolling
    }
}

/// Current behavior of a live monster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiState {
    Idle,
    Patrolling,
    Chasing,
}

impl Default for AiState {
    fn default() -> Self {
        AiState::Idle
    }
}

/// A player as tracked by the server and mirrored to room members.
///
/// Position, HP, and appearance are client-reported; the server records them
/// for relay and for loot/party bookkeeping but never simulates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub od_id: String,
    pub name: String,
    pub map_id: String,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub facing: Facing,
    #[serde(default)]
    pub animation_state: String,
    #[serde(default)]
    pub velocity_x: f32,
    #[serde(default)]
    pub velocity_y: f32,
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub player_class: Option<String>,
    #[serde(default)]
    pub hp: i64,
    #[serde(default)]
    pub max_hp: i64,
    #[serde(default)]
    pub exp: i64,
    #[serde(default)]
    pub max_exp: i64,
    #[serde(default)]
    pub guild: Option<String>,
    #[serde(default)]
    pub party_id: Option<String>,
    #[serde(default)]
    pub equipped: Value,
    #[serde(default)]
    pub cosmetic_equipped: Value,
    #[serde(default)]
    pub customization: Value,
    #[serde(default)]
    pub equipped_medal: Value,
    #[serde(default)]
    pub display_medals: Value,
    #[serde(default)]
    pub active_buffs: Value,
    #[serde(default)]
    pub pet: Option<Value>,
    /// Connection handle owning this identity. Server-side only.
    #[serde(skip)]
    pub conn: u64,
    /// Milliseconds timestamp of the last position report. Server-side only.
    #[serde(skip)]
    pub last_update: u64,
}

/// A server-simulated monster.
///
/// The server integrates X motion only; `y` and `velocity_y` are carried
/// through from spawn data and knockback for clients to integrate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Monster {
    pub id: String,
    #[serde(rename = "type")]
    pub monster_type: String,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub velocity_x: f32,
    #[serde(default)]
    pub velocity_y: f32,
    /// Movement direction, -1 or +1.
    pub direction: i8,
    #[serde(default)]
    pub facing: Facing,
    pub hp: i64,
    pub max_hp: i64,
    #[serde(default)]
    pub damage: i64,
    #[serde(default)]
    pub speed: f32,
    #[serde(default)]
    pub ai_type: AiType,
    #[serde(default)]
    pub ai_state: AiState,
    #[serde(default)]
    pub is_dead: bool,
    #[serde(default)]
    pub is_mini_boss: bool,
    #[serde(default)]
    pub is_elite_monster: bool,
    #[serde(default)]
    pub is_trial_boss: bool,
    #[serde(default)]
    pub is_shiny: bool,
    #[serde(default)]
    pub can_jump: bool,
    #[serde(default)]
    pub is_jumping: bool,
    #[serde(default)]
    pub jump_force: f32,
    pub width: f32,
    pub height: f32,
    pub patrol_min_x: f32,
    pub patrol_max_x: f32,
    /// Surface the monster spawned on, kept so respawn can reapply it.
    #[serde(default)]
    pub surface_x: Option<f32>,
    #[serde(default)]
    pub surface_width: Option<f32>,
    pub spawn_x: f32,
    pub spawn_y: f32,
    pub ground_y: f32,
    #[serde(default)]
    pub target_player: Option<String>,
    /// Pre-promotion stats, set once the monster turns elite.
    #[serde(default)]
    pub original_max_hp: Option<i64>,
    #[serde(default)]
    pub original_damage: Option<i64>,
    #[serde(skip)]
    pub knockback_end_time: u64,
    #[serde(skip)]
    pub last_interaction_time: u64,
    #[serde(skip)]
    pub last_update: u64,
}

impl Monster {
    /// X coordinate of the monster's center.
    pub fn center_x(&self) -> f32 {
        self.x + self.width / 2.0
    }

    /// Y coordinate of the monster's center.
    pub fn center_y(&self) -> f32 {
        self.y + self.height / 2.0
    }
}

/// One entry of a monster type's loot table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LootEntry {
    pub name: String,
    pub rate: f64,
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
}

/// Catalog entry describing a monster type, supplied by the first client to
/// initialize a map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonsterType {
    pub hp: i64,
    #[serde(default)]
    pub damage: i64,
    pub speed: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub ai_type: AiType,
    #[serde(default)]
    pub is_mini_boss: bool,
    #[serde(default)]
    pub is_trial_boss: bool,
    #[serde(default)]
    pub can_jump: bool,
    #[serde(default)]
    pub jump_force: f32,
    #[serde(default)]
    pub loot: Vec<LootEntry>,
}

/// A spawn point reported in `initMapMonsters`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnPosition {
    #[serde(rename = "type")]
    pub monster_type: String,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub surface_x: Option<f32>,
    #[serde(default)]
    pub surface_width: Option<f32>,
}

/// Requested monster population when no explicit spawn positions exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnCount {
    #[serde(rename = "type")]
    pub monster_type: String,
    #[serde(default)]
    pub count: u32,
}

/// Map geometry and catalog, recorded once per room from the first
/// `initMapMonsters` it receives.
#[derive(Debug, Clone)]
pub struct MapTopology {
    pub map_width: f32,
    pub ground_y: f32,
    pub monster_types: HashMap<String, MonsterType>,
    pub spawn_positions: Vec<SpawnPosition>,
}

/// An item lying on the ground, owned by exactly one room and consumable at
/// most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundItem {
    pub item_id: String,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub dropped_by: String,
    pub timestamp: u64,
    #[serde(default)]
    pub velocity_x: f32,
    #[serde(default)]
    pub velocity_y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_gold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rarity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhancement: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level_req: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_quest_item: Option<bool>,
}

// === Ingress payloads ===

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinData {
    #[serde(default)]
    pub od_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub map_id: Option<String>,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub player_class: Option<String>,
    #[serde(default)]
    pub guild: Option<String>,
    #[serde(default)]
    pub party_id: Option<String>,
    #[serde(default)]
    pub customization: Value,
    #[serde(default)]
    pub equipped: Value,
    #[serde(default)]
    pub cosmetic_equipped: Value,
    #[serde(default)]
    pub equipped_medal: Value,
    #[serde(default)]
    pub display_medals: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejoinData {
    #[serde(flatten)]
    pub join: JoinData,
    #[serde(default)]
    pub old_od_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionData {
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub facing: Facing,
    #[serde(default)]
    pub animation_state: String,
    #[serde(default)]
    pub velocity_x: f32,
    #[serde(default)]
    pub velocity_y: f32,
    #[serde(default)]
    pub active_buffs: Option<Value>,
    #[serde(default)]
    pub pet: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeMapData {
    #[serde(default)]
    pub new_map_id: Option<String>,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatData {
    #[serde(default)]
    pub message: String,
}

fn default_map_width() -> f32 {
    1600.0
}

fn default_ground_y() -> f32 {
    600.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitMapMonstersData {
    #[serde(default)]
    pub map_id: Option<String>,
    #[serde(default)]
    pub monsters: Vec<SpawnCount>,
    #[serde(default)]
    pub spawn_positions: Vec<SpawnPosition>,
    #[serde(default = "default_map_width")]
    pub map_width: f32,
    #[serde(default = "default_ground_y")]
    pub ground_y: f32,
    #[serde(default)]
    pub monster_types: HashMap<String, MonsterType>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttackData {
    #[serde(default)]
    pub seq: Option<u64>,
    #[serde(default)]
    pub monster_id: Option<String>,
    #[serde(default)]
    pub damage: f64,
    #[serde(default)]
    pub is_critical: bool,
    #[serde(default)]
    pub attack_type: Option<String>,
    #[serde(default)]
    pub player_direction: Option<f64>,
    #[serde(default)]
    pub predicted_hp: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformEliteData {
    #[serde(default)]
    pub monster_id: Option<String>,
    #[serde(default)]
    pub max_hp: i64,
    #[serde(default)]
    pub damage: i64,
    #[serde(default)]
    pub original_max_hp: Option<i64>,
    #[serde(default)]
    pub original_damage: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPickupData {
    #[serde(default)]
    pub item_id: String,
    #[serde(default)]
    pub item_name: String,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerDropData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub stats: Option<Value>,
    #[serde(default)]
    pub rarity: Option<String>,
    #[serde(default)]
    pub enhancement: Option<i64>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub level_req: Option<i64>,
    #[serde(default)]
    pub is_quest_item: Option<bool>,
    #[serde(default)]
    pub is_gold: Option<bool>,
    #[serde(default)]
    pub amount: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePartyData {
    #[serde(default)]
    pub party_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyStatsData {
    #[serde(default)]
    pub hp: i64,
    #[serde(default)]
    pub max_hp: i64,
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub exp: i64,
    #[serde(default)]
    pub max_exp: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareGoldData {
    #[serde(default)]
    pub total_amount: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmAuthData {
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyPingData {
    #[serde(default)]
    pub timestamp: Option<f64>,
}

/// Every event a client may send.
///
/// Unknown or malformed frames fail deserialization at the transport edge and
/// produce a single `error` reply without touching game state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    Join(JoinData),
    Rejoin(RejoinData),
    UpdatePosition(PositionData),
    ChangeMap(ChangeMapData),
    ChatMessage(ChatData),
    InitMapMonsters(InitMapMonstersData),
    AttackMonster(AttackData),
    TransformElite(TransformEliteData),
    ItemPickup(ItemPickupData),
    PlayerDropItem(PlayerDropData),
    UpdateParty(UpdatePartyData),
    UpdatePartyStats(PartyStatsData),
    SharePartyGold(ShareGoldData),
    #[serde(rename = "playerVFX")]
    PlayerVfx(Value),
    PlayerProjectile(Value),
    PlayerProjectileHit(Value),
    #[serde(rename = "playerSkillVFX")]
    PlayerSkillVfx(Value),
    UpdateAppearance(Value),
    PlayerDeath(Value),
    PlayerRespawn(Value),
    GmAuth(GmAuthData),
    CheckGmAuth,
    LatencyPing(Option<LatencyPingData>),
    RequestMonsters,
}

/// One monster's line in a `monsterPositions` broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonsterPositionEntry {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub facing: Facing,
    pub direction: i8,
    pub ai_state: AiState,
    pub velocity_x: f32,
    pub velocity_y: f32,
    /// Server wall-clock milliseconds at broadcast time.
    pub t: u64,
}

/// Correction unicast to an attacker whose request failed or whose HP
/// prediction drifted past tolerance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttackCorrection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_hp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_hp: Option<i64>,
}

/// Every event the server may emit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    ServerStartTime { server_start_time: u64 },
    CurrentPlayers(Vec<Player>),
    PlayerJoined(Player),
    #[serde(rename_all = "camelCase")]
    PlayerMoved {
        od_id: String,
        x: f32,
        y: f32,
        facing: Facing,
        animation_state: String,
        velocity_x: f32,
        velocity_y: f32,
        active_buffs: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        pet: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    PlayerLeft { od_id: String },
    #[serde(rename_all = "camelCase")]
    PlayerChat {
        od_id: String,
        name: String,
        message: String,
    },
    CurrentMonsters(Vec<Monster>),
    MonsterSpawned(Monster),
    MonsterPositions(Vec<MonsterPositionEntry>),
    #[serde(rename_all = "camelCase")]
    MonsterDamaged {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        damage: i64,
        current_hp: i64,
        max_hp: i64,
        attacker_id: String,
        knockback_velocity_x: f32,
        is_critical: bool,
    },
    #[serde(rename_all = "camelCase")]
    MonsterKilled {
        id: String,
        #[serde(rename = "type")]
        monster_type: String,
        x: f32,
        y: f32,
        #[serde(skip_serializing_if = "Option::is_none")]
        loot_recipient: Option<String>,
        drops: Vec<GroundItem>,
        party_members: Vec<String>,
        is_elite_monster: bool,
        is_shiny: bool,
    },
    #[serde(rename_all = "camelCase")]
    MonsterTransformedElite {
        monster_id: String,
        max_hp: i64,
        hp: i64,
        damage: i64,
        original_max_hp: i64,
        original_damage: i64,
    },
    AttackCorrection(AttackCorrection),
    #[serde(rename_all = "camelCase")]
    ItemPickedUp {
        item_id: String,
        item_name: String,
        x: f32,
        y: f32,
        picked_up_by: String,
        picked_up_by_name: String,
    },
    #[serde(rename_all = "camelCase")]
    ItemPickupRejected {
        item_id: String,
        item_name: String,
        reason: String,
    },
    PlayerItemDropped(GroundItem),
    #[serde(rename_all = "camelCase")]
    PlayerDropConfirm {
        id: String,
        velocity_x: f32,
        velocity_y: f32,
    },
    #[serde(rename_all = "camelCase")]
    PartyMemberStats {
        od_id: String,
        hp: i64,
        max_hp: i64,
        level: u32,
        exp: i64,
        max_exp: i64,
    },
    #[serde(rename_all = "camelCase")]
    PlayerPartyUpdated {
        od_id: String,
        party_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    PartyGoldShare { amount: i64, from_name: String },
    #[serde(rename_all = "camelCase")]
    PartyGoldShareResult {
        original_amount: i64,
        your_share: i64,
        member_count: usize,
    },
    #[serde(rename = "remotePlayerVFX")]
    RemotePlayerVfx(Value),
    RemoteProjectile(Value),
    RemoteProjectileHit(Value),
    #[serde(rename = "remoteSkillVFX")]
    RemoteSkillVfx(Value),
    PlayerAppearanceUpdated(Value),
    PlayerDied(Value),
    PlayerRespawned(Value),
    GmAuthResult { success: bool, message: String },
    #[serde(rename_all = "camelCase")]
    GmAuthStatus { is_gm: bool },
    LatencyPong {
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_event_names_match_wire_protocol() {
        let frame = serde_json::to_value(ClientEvent::RequestMonsters).unwrap();
        assert_eq!(frame["event"], "requestMonsters");

        let frame = serde_json::to_value(ClientEvent::PlayerVfx(json!({"kind": "slash"}))).unwrap();
        assert_eq!(frame["event"], "playerVFX");

        let frame = serde_json::to_value(ClientEvent::PlayerSkillVfx(json!({}))).unwrap();
        assert_eq!(frame["event"], "playerSkillVFX");
    }

    #[test]
    fn test_join_payload_deserializes_with_missing_fields() {
        let frame = json!({
            "event": "join",
            "data": {"odId": "od_1", "name": "Mira", "mapId": "henesys", "x": 120.0, "y": 340.0}
        });

        let event: ClientEvent = serde_json::from_value(frame).unwrap();
        match event {
            ClientEvent::Join(data) => {
                assert_eq!(data.od_id.as_deref(), Some("od_1"));
                assert_eq!(data.name.as_deref(), Some("Mira"));
                assert_eq!(data.map_id.as_deref(), Some("henesys"));
                assert_eq!(data.party_id, None);
                assert_eq!(data.level, 0);
            }
            _ => panic!("Wrong event variant"),
        }
    }

    #[test]
    fn test_join_payload_tolerates_absent_identity() {
        let frame = json!({"event": "join", "data": {"x": 1.0, "y": 2.0}});
        let event: ClientEvent = serde_json::from_value(frame).unwrap();
        match event {
            ClientEvent::Join(data) => {
                assert!(data.od_id.is_none());
                assert!(data.map_id.is_none());
            }
            _ => panic!("Wrong event variant"),
        }
    }

    #[test]
    fn test_rejoin_flattens_join_fields() {
        let frame = json!({
            "event": "rejoin",
            "data": {"odId": "od_2", "name": "Faye", "mapId": "henesys", "oldOdId": "od_1"}
        });

        let event: ClientEvent = serde_json::from_value(frame).unwrap();
        match event {
            ClientEvent::Rejoin(data) => {
                assert_eq!(data.join.od_id.as_deref(), Some("od_2"));
                assert_eq!(data.old_od_id.as_deref(), Some("od_1"));
            }
            _ => panic!("Wrong event variant"),
        }
    }

    #[test]
    fn test_attack_payload_fields() {
        let frame = json!({
            "event": "attackMonster",
            "data": {
                "seq": 7,
                "monsterId": "m_4",
                "damage": 150.0,
                "isCritical": true,
                "playerDirection": 1,
                "predictedHp": 50
            }
        });

        let event: ClientEvent = serde_json::from_value(frame).unwrap();
        match event {
            ClientEvent::AttackMonster(data) => {
                assert_eq!(data.seq, Some(7));
                assert_eq!(data.monster_id.as_deref(), Some("m_4"));
                assert_eq!(data.damage, 150.0);
                assert!(data.is_critical);
                assert_eq!(data.player_direction, Some(1.0));
                assert_eq!(data.predicted_hp, Some(50));
            }
            _ => panic!("Wrong event variant"),
        }
    }

    #[test]
    fn test_server_event_serializes_camel_case() {
        let event = ServerEvent::MonsterDamaged {
            id: "m_1".to_string(),
            seq: Some(3),
            damage: 120,
            current_hp: 80,
            max_hp: 200,
            attacker_id: "od_1".to_string(),
            knockback_velocity_x: 6.0,
            is_critical: false,
        };

        let frame = serde_json::to_value(&event).unwrap();
        assert_eq!(frame["event"], "monsterDamaged");
        assert_eq!(frame["data"]["currentHp"], 80);
        assert_eq!(frame["data"]["attackerId"], "od_1");
        assert_eq!(frame["data"]["knockbackVelocityX"], 6.0);
    }

    #[test]
    fn test_monster_killed_omits_absent_recipient() {
        let event = ServerEvent::MonsterKilled {
            id: "m_9".to_string(),
            monster_type: "babySlime".to_string(),
            x: 10.0,
            y: 20.0,
            loot_recipient: None,
            drops: vec![],
            party_members: vec![],
            is_elite_monster: false,
            is_shiny: false,
        };

        let frame = serde_json::to_value(&event).unwrap();
        assert_eq!(frame["event"], "monsterKilled");
        assert!(frame["data"].get("lootRecipient").is_none());
        assert_eq!(frame["data"]["type"], "babySlime");
    }

    #[test]
    fn test_monster_type_catalog_defaults() {
        let entry: MonsterType = serde_json::from_value(json!({
            "hp": 200,
            "speed": 1.2,
            "width": 40,
            "height": 36
        }))
        .unwrap();

        assert_eq!(entry.ai_type, AiType::Patrolling);
        assert!(!entry.is_mini_boss);
        assert!(entry.loot.is_empty());
        assert_eq!(entry.damage, 0);
    }

    #[test]
    fn test_ground_item_hides_unset_equipment_attributes() {
        let item = GroundItem {
            item_id: "drop_1_0_ab12".to_string(),
            name: "Red Potion".to_string(),
            x: 0.0,
            y: 0.0,
            dropped_by: MONSTER_DROP_OWNER.to_string(),
            timestamp: 1,
            velocity_x: 0.5,
            velocity_y: -4.0,
            amount: None,
            is_gold: None,
            stats: None,
            rarity: None,
            enhancement: None,
            quantity: None,
            level_req: None,
            is_quest_item: None,
        };

        let value = serde_json::to_value(&item).unwrap();
        assert!(value.get("amount").is_none());
        assert!(value.get("rarity").is_none());
        assert_eq!(value["droppedBy"], MONSTER_DROP_OWNER);
    }

    #[test]
    fn test_excluded_map_prefixes() {
        assert!(is_excluded_map("dewdrop_cave"));
        assert!(is_excluded_map("pq_stage_3"));
        assert!(!is_excluded_map("henesys"));
        assert!(!is_excluded_map("deep_forest"));
    }

    #[test]
    fn test_unit_events_roundtrip_without_payload() {
        let text = serde_json::to_string(&ClientEvent::CheckGmAuth).unwrap();
        let parsed: ClientEvent = serde_json::from_str(&text).unwrap();
        assert!(matches!(parsed, ClientEvent::CheckGmAuth));

        let parsed: ClientEvent = serde_json::from_str(r#"{"event":"requestMonsters"}"#).unwrap();
        assert!(matches!(parsed, ClientEvent::RequestMonsters));
    }

    #[test]
    fn test_latency_ping_payload_is_optional() {
        let parsed: ClientEvent =
            serde_json::from_str(r#"{"event":"latencyPing","data":null}"#).unwrap();
        match parsed {
            ClientEvent::LatencyPing(data) => assert!(data.is_none()),
            _ => panic!("Wrong event variant"),
        }

        let parsed: ClientEvent =
            serde_json::from_str(r#"{"event":"latencyPing","data":{"timestamp":12.5}}"#).unwrap();
        match parsed {
            ClientEvent::LatencyPing(Some(data)) => assert_eq!(data.timestamp, Some(12.5)),
            _ => panic!("Wrong event variant"),
        }
    }

    #[test]
    fn test_malformed_frame_is_rejected() {
        let result: Result<ClientEvent, _> = serde_json::from_str(r#"{"event":"noSuchEvent"}"#);
        assert!(result.is_err());

        let result: Result<ClientEvent, _> = serde_json::from_str("not json at all");
        assert!(result.is_err());
    }
}
