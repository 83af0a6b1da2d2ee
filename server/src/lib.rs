//! # Map Server Library
//!
//! Authoritative session engine for a 2-D multiplayer side-scrolling action
//! game. Clients render and predict; this server owns the shared truth they
//! cannot be trusted with: who is on which map, where the monsters are, who
//! dealt the killing blow, what loot dropped, which ground items still exist,
//! and when a client's prediction has drifted from reality.
//!
//! ## Core Responsibilities
//!
//! ### Map-scoped rooms
//! Every map id names a room that owns its players, monsters, topology,
//! ground items, and damage ledgers. Broadcasts never cross rooms.
//!
//! ### Monster simulation
//! A fixed-cadence tick drives patrol, aggro, chase, and knockback recovery
//! for every live monster. The server integrates X motion only; vertical
//! physics belongs to clients.
//!
//! ### Combat arbitration
//! Attacks are rate-limited, damage-capped, applied to authoritative HP, and
//! tracked per attacker so kills attribute loot to the top contributor.
//! Client HP predictions are reconciled with unicast corrections.
//!
//! ### Loot authority
//! Drop ids are minted server-side and consumable exactly once; pickup is
//! first-come-wins with a private rejection for the loser.
//!
//! ### Event fan-out
//! Movement, chat, VFX, projectiles, and appearance changes relay to the
//! sender's room and nowhere else.
//!
//! ## Architecture
//!
//! A single task owns all game state ([`world::World`]) and consumes one
//! message channel fed by the transports and timers ([`network::Server`]).
//! Per-room mutations therefore observe a total order without locks. Two
//! framings carry the same JSON event protocol concurrently: WebSocket
//! (sharing a port with the HTTP health endpoint) and newline-delimited JSON
//! over TCP ([`transport`]).
//!
//! Scheduled work (respawns, corpse removal, elite promotion, the inactivity
//! sweep) is never cancelled; every callback re-checks room and monster
//! existence when it fires, so a room destroyed mid-wait yields a no-op.
//!
//! ## Module Organization
//!
//! - [`world`] - state container, ingress dispatch, health snapshots
//! - [`rooms`] - room registry and damage ledgers
//! - [`presence`] - join, rejoin, map change, disconnect, inactivity sweep
//! - [`simulation`] - monster spawning and the AI tick
//! - [`combat`] - attack arbitration, kills, respawn timers
//! - [`loot`] - drop generation, pickup, party gold split
//! - [`relay`] - per-room visual/chat fan-out
//! - [`elite`] - randomized elite promotion
//! - [`gm`] - GM session authentication
//! - [`rate_limiter`] - sliding-window admission and damage validation
//! - [`connections`] - socket registry and outbound routing
//! - [`network`] - the world-owning server loop
//! - [`transport`] - WebSocket/HTTP and TCP framings

pub mod combat;
pub mod connections;
pub mod elite;
pub mod gm;
pub mod loot;
pub mod network;
pub mod presence;
pub mod rate_limiter;
pub mod relay;
pub mod rooms;
pub mod simulation;
pub mod transport;
pub mod utils;
pub mod world;
