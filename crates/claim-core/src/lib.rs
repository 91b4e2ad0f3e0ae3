//! Geospatial claim and progression engine with live presence fan-out.
//!
//! Visits turn into XP and shared claim ownership of a spot, automatic visits
//! are rate limited per (player, spot), and every committed change is
//! published on an event bus for live subscribers and persistence.

pub mod claims;
pub mod clock;
pub mod cooldown;
pub mod engine;
pub mod error;
pub mod events;
pub mod geo;
pub mod progression;
pub mod table;

pub use clock::{Clock, ManualClock, SystemClock};
pub use cooldown::CooldownGate;
pub use engine::{ClaimEngine, DEMO_ADMIN_ID};
pub use error::{EngineError, EngineResult, EntityKind};
pub use events::{EngineEvent, EventBus};
