//! v1 cross-boundary contracts for the claim engine, API, persistence, and live stream.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION_V1: &str = "1.0";

/// A WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerRole {
    #[default]
    Player,
    Admin,
    Creator,
}

impl PlayerRole {
    pub fn can_create_spots(self) -> bool {
        matches!(self, Self::Admin | Self::Creator)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerMode {
    #[default]
    LoggedIn,
    Guest,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerStats {
    pub total_xp: u64,
    pub level: u64,
    pub xp_to_next_level: u64,
    #[serde(default)]
    pub collected_loot_count: u64,
}

impl Default for PlayerStats {
    fn default() -> Self {
        Self {
            total_xp: 0,
            level: 1,
            xp_to_next_level: 100,
            collected_loot_count: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InventoryItem {
    pub name: String,
    pub quantity: u32,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Inventory {
    #[serde(default)]
    pub items: BTreeMap<String, InventoryItem>,
}

impl Inventory {
    pub fn quantity_of(&self, item_id: &str) -> u32 {
        self.items.get(item_id).map_or(0, |item| item.quantity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Player {
    pub id: String,
    pub mode: PlayerMode,
    pub role: PlayerRole,
    pub display_name: String,
    pub color: String,
    #[serde(default)]
    pub stats: PlayerStats,
    #[serde(default)]
    pub inventory: Inventory,
    pub last_seen_position: Option<Position>,
    pub last_seen_at: Option<DateTime<Utc>>,
    /// Last accepted automatic log per spot id.
    #[serde(default)]
    pub last_auto_log_at: BTreeMap<String, DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Player {
    pub fn identity(&self) -> Identity {
        Identity {
            player_id: self.id.clone(),
            role: self.role,
            display_name: self.display_name.clone(),
            mode: self.mode,
        }
    }
}

/// Authenticated actor handed to the engine by the credential layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub player_id: String,
    pub role: PlayerRole,
    pub display_name: String,
    pub mode: PlayerMode,
}

impl Identity {
    pub fn is_logged_in(&self) -> bool {
        self.mode == PlayerMode::LoggedIn
    }

    pub fn is_admin(&self) -> bool {
        self.role == PlayerRole::Admin
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ClaimInfo {
    pub total_claim_points: f64,
    #[serde(default)]
    pub per_player_claim_points: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Spot {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub position: Position,
    pub base_xp: u64,
    pub auto_xp: u64,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub claim_info: ClaimInfo,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogType {
    Manual,
    Auto,
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => f.write_str("MANUAL"),
            Self::Auto => f.write_str("AUTO"),
        }
    }
}

/// Append-only audit record of one accepted visit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub id: String,
    pub spot_id: String,
    pub player_id: String,
    #[serde(rename = "type")]
    pub log_type: LogType,
    pub distance_at_log: Option<f64>,
    pub note: Option<String>,
    pub xp_gained: u64,
    pub claim_points_gained: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RoutePoint {
    pub position: Position,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RouteState {
    Active,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Route {
    pub id: String,
    pub player_id: String,
    #[serde(default)]
    pub points: Vec<RoutePoint>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Route {
    pub fn state(&self) -> RouteState {
        if self.ended_at.is_some() {
            RouteState::Stopped
        } else {
            RouteState::Active
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PresenceSnapshot {
    pub player_id: String,
    pub display_name: String,
    pub position: Position,
    pub color: String,
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeatmapEntry {
    pub spot_id: String,
    pub position: Position,
    pub player_claim_points: f64,
    pub claim_share: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NewPlayer {
    pub display_name: Option<String>,
    pub role: Option<PlayerRole>,
    pub mode: Option<PlayerMode>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewSpot {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub position: Position,
    pub base_xp: Option<u64>,
    pub auto_xp: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemReward {
    pub name: String,
    pub quantity: Option<u32>,
    pub description: Option<String>,
}

/// A client-discovered loot pickup submitted for reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LootClaim {
    pub loot_id: String,
    pub xp_reward: Option<i64>,
    pub item_reward: Option<ItemReward>,
    pub distance: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogOutcome {
    pub log: LogEntry,
    pub xp_gained: u64,
    pub claim_points_gained: f64,
    pub updated_player: Player,
    pub updated_spot_claim_info: ClaimInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LootOutcome {
    pub loot_id: String,
    pub xp_gained: u64,
    pub item_gained: Option<InventoryItem>,
    pub distance: Option<f64>,
    pub updated_player: Player,
}

/// Whole-state checkpoint exchanged with the durable store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreSnapshot {
    pub schema_version: String,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub players: BTreeMap<String, Player>,
    #[serde(default)]
    pub spots: BTreeMap<String, Spot>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    #[serde(default)]
    pub routes: BTreeMap<String, Route>,
}

impl StoreSnapshot {
    pub fn empty(saved_at: DateTime<Utc>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            saved_at,
            players: BTreeMap::new(),
            spots: BTreeMap::new(),
            logs: Vec::new(),
            routes: BTreeMap::new(),
        }
    }
}

impl fmt::Display for StoreSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "saved_at={} players={} spots={} logs={} routes={}",
            self.saved_at.to_rfc3339(),
            self.players.len(),
            self.spots.len(),
            self.logs.len(),
            self.routes.len()
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    pub schema_version: String,
    pub auto_log_cooldown_secs: u64,
    pub default_base_xp: u64,
    pub default_auto_xp: u64,
    pub default_player_color: String,
    pub broadcast_capacity: usize,
    pub persist_debounce_ms: u64,
    /// Seal a player's active routes when they start a new one.
    pub seal_previous_route_on_start: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            auto_log_cooldown_secs: 300,
            default_base_xp: 20,
            default_auto_xp: 5,
            default_player_color: "#00AAFF".to_string(),
            broadcast_capacity: 4096,
            persist_debounce_ms: 250,
            seal_previous_route_on_start: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    Unauthorized,
    Forbidden,
    CooldownActive,
    InvalidReward,
    InvalidInput,
    InvalidState,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    pub schema_version: String,
    pub error_code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(error_code: ErrorCode, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            error_code,
            message: message.into(),
            details,
        }
    }
}
