//! Tracker value types and the aggregate [`Snapshot`].
//!
//! Positions and bed locations are persisted as compact encoded strings
//! (`world;x;y;z[;unix_millis]`) rather than JSON objects; the encode and
//! parse helpers live next to the types so every crate agrees on the format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::InteractionKind;
use crate::ids::EntityKey;

/// Field separator in encoded location strings.
const SEPARATOR: char = ';';

/// Error returned when an encoded location string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed encoded location {input:?}: {reason}")]
pub struct ParseLocationError {
    /// The rejected input.
    pub input: String,
    /// Which part failed to parse.
    pub reason: String,
}

impl ParseLocationError {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Split `input` into a world name and `n` trailing numeric fields.
///
/// The world name is everything before the last `n` separators, so world
/// names containing the separator survive a round trip.
fn split_fields(input: &str, n: usize) -> Result<(&str, Vec<&str>), ParseLocationError> {
    let mut parts: Vec<&str> = input.rsplitn(n.saturating_add(1), SEPARATOR).collect();
    if parts.len() != n.saturating_add(1) {
        return Err(ParseLocationError::new(
            input,
            format!("expected {} fields, found {}", n.saturating_add(1), parts.len()),
        ));
    }
    parts.reverse();
    let world = parts.remove(0);
    if world.is_empty() {
        return Err(ParseLocationError::new(input, "empty world name"));
    }
    Ok((world, parts))
}

fn parse_field<T: std::str::FromStr>(
    input: &str,
    fields: &[&str],
    index: usize,
    name: &str,
) -> Result<T, ParseLocationError>
where
    T::Err: core::fmt::Display,
{
    let raw = fields
        .get(index)
        .ok_or_else(|| ParseLocationError::new(input, format!("missing {name}")))?;
    raw.parse::<T>()
        .map_err(|e| ParseLocationError::new(input, format!("invalid {name}: {e}")))
}

// ---------------------------------------------------------------------------
// Movement
// ---------------------------------------------------------------------------

/// A sampled entity position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// World (dimension) name.
    pub world: String,
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
    /// When the position was sampled.
    pub recorded_at: DateTime<Utc>,
}

impl Position {
    /// Encode as `world;x;y;z;unix_millis`.
    pub fn encode(&self) -> String {
        format!(
            "{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
            self.world,
            self.x,
            self.y,
            self.z,
            self.recorded_at.timestamp_millis()
        )
    }

    /// Parse a string produced by [`Position::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`ParseLocationError`] if a field is missing or not numeric,
    /// or the timestamp is out of range.
    pub fn decode(input: &str) -> Result<Self, ParseLocationError> {
        let (world, fields) = split_fields(input, 4)?;
        let x = parse_field(input, &fields, 0, "x")?;
        let y = parse_field(input, &fields, 1, "y")?;
        let z = parse_field(input, &fields, 2, "z")?;
        let millis: i64 = parse_field(input, &fields, 3, "timestamp")?;
        let recorded_at = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| ParseLocationError::new(input, "timestamp out of range"))?;
        Ok(Self {
            world: world.to_owned(),
            x,
            y,
            z,
            recorded_at,
        })
    }

    /// Squared distance to `other`, or `None` when they are in different
    /// worlds.
    pub fn distance_squared(&self, other: &Self) -> Option<f64> {
        if self.world != other.world {
            return None;
        }
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        Some(dz.mul_add(dz, dx.mul_add(dx, dy * dy)))
    }
}

// ---------------------------------------------------------------------------
// Bed
// ---------------------------------------------------------------------------

/// A bed (respawn point) location in block coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BedLocation {
    /// World (dimension) name.
    pub world: String,
    /// Block X coordinate.
    pub x: i32,
    /// Block Y coordinate.
    pub y: i32,
    /// Block Z coordinate.
    pub z: i32,
}

impl BedLocation {
    /// Encode as `world;x;y;z`.
    pub fn encode(&self) -> String {
        format!(
            "{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
            self.world, self.x, self.y, self.z
        )
    }

    /// Parse a string produced by [`BedLocation::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`ParseLocationError`] if a field is missing or not an integer.
    pub fn decode(input: &str) -> Result<Self, ParseLocationError> {
        let (world, fields) = split_fields(input, 3)?;
        Ok(Self {
            world: world.to_owned(),
            x: parse_field(input, &fields, 0, "x")?,
            y: parse_field(input, &fields, 1, "y")?,
            z: parse_field(input, &fields, 2, "z")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Progression
// ---------------------------------------------------------------------------

/// Experience progression: level, points into the level, lifetime total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progression {
    /// Current level.
    pub level: i32,
    /// Points accumulated toward the next level.
    pub points: i32,
    /// Lifetime experience total.
    pub total: i32,
}

impl From<(i32, i32, i32)> for Progression {
    fn from((level, points, total): (i32, i32, i32)) -> Self {
        Self {
            level,
            points,
            total,
        }
    }
}

impl From<Progression> for (i32, i32, i32) {
    fn from(p: Progression) -> Self {
        (p.level, p.points, p.total)
    }
}

// ---------------------------------------------------------------------------
// Block interaction
// ---------------------------------------------------------------------------

/// A single block interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInteraction {
    /// What was done to the block.
    pub kind: InteractionKind,
    /// Block material name (e.g. `OAK_LOG`).
    pub block: String,
    /// World (dimension) name.
    pub world: String,
    /// Block X coordinate.
    pub x: i32,
    /// Block Y coordinate.
    pub y: i32,
    /// Block Z coordinate.
    pub z: i32,
    /// When the interaction happened.
    pub at: DateTime<Utc>,
}

/// Latest block interaction plus the running interaction count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockActivity {
    /// The most recent interaction.
    pub last: BlockInteraction,
    /// Number of interactions recorded for the entity.
    pub total: u64,
}

// ---------------------------------------------------------------------------
// Play time
// ---------------------------------------------------------------------------

/// A login/logout window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWindow {
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// When the session ended, or `None` while it is still open.
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionWindow {
    /// Open a new session at `started_at`.
    pub const fn open(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            ended_at: None,
        }
    }

    /// Whether the session is still open.
    pub const fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// Play-time view of one entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayTime {
    /// Accumulated ticks on the server.
    pub total_ticks: u64,
    /// The most recent session window, if any was recorded.
    pub session: Option<SessionWindow>,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Aggregate, serializable view of one entity across every tracker.
///
/// Built on demand by the synchronization pipeline and never persisted on
/// its own. Fields are `None` when the owning tracker has no value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The entity this snapshot describes.
    pub entity: EntityKey,
    /// Identifier of the server that produced the snapshot.
    pub origin: String,
    /// When the snapshot was assembled.
    pub taken_at: DateTime<Utc>,
    /// Play time and session window.
    #[serde(default)]
    pub play_time: PlayTime,
    /// Last sampled position.
    #[serde(default)]
    pub position: Option<Position>,
    /// Last bed location.
    #[serde(default)]
    pub bed: Option<BedLocation>,
    /// Experience progression.
    #[serde(default)]
    pub progression: Option<Progression>,
    /// Latest block interaction.
    #[serde(default)]
    pub block_activity: Option<BlockActivity>,
}

impl Snapshot {
    /// An empty snapshot for `entity`, stamped now.
    pub fn empty(entity: EntityKey, origin: impl Into<String>) -> Self {
        Self {
            entity,
            origin: origin.into(),
            taken_at: Utc::now(),
            play_time: PlayTime::default(),
            position: None,
            bed: None,
            progression: None,
            block_activity: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn position(world: &str, x: f64) -> Position {
        Position {
            world: world.to_owned(),
            x,
            y: 64.0,
            z: -12.5,
            recorded_at: DateTime::from_timestamp_millis(1_700_000_000_123).unwrap(),
        }
    }

    #[test]
    fn position_encoding_matches_format() {
        let p = position("world", 10.25);
        assert_eq!(p.encode(), "world;10.25;64;-12.5;1700000000123");
        assert_eq!(Position::decode(&p.encode()).unwrap(), p);
    }

    #[test]
    fn position_world_may_contain_separator() {
        let p = position("odd;world", 1.0);
        assert_eq!(Position::decode(&p.encode()).unwrap().world, "odd;world");
    }

    #[test]
    fn position_decode_rejects_short_input() {
        let err = Position::decode("world;1;2").unwrap_err();
        assert!(err.reason.contains("expected 5 fields"));
    }

    #[test]
    fn position_decode_rejects_non_numeric() {
        assert!(Position::decode("world;a;2;3;0").is_err());
    }

    #[test]
    fn distance_is_none_across_worlds() {
        let a = position("world", 0.0);
        let b = position("world_nether", 0.0);
        assert_eq!(a.distance_squared(&b), None);
    }

    #[test]
    fn distance_squared_same_world() {
        let a = position("world", 0.0);
        let b = position("world", 3.0);
        let d = a.distance_squared(&b).unwrap();
        assert!((d - 9.0).abs() < f64::EPSILON);
    }

    #[test]
    fn bed_location_encoding() {
        let bed = BedLocation {
            world: "world".to_owned(),
            x: -100,
            y: 70,
            z: 250,
        };
        assert_eq!(bed.encode(), "world;-100;70;250");
        assert_eq!(BedLocation::decode("world;-100;70;250").unwrap(), bed);
        assert!(BedLocation::decode(";1;2;3").is_err());
    }

    #[test]
    fn progression_tuple_conversion() {
        let p = Progression::from((30, 12, 1_395));
        let t: (i32, i32, i32) = p.into();
        assert_eq!(t, (30, 12, 1_395));
    }

    #[test]
    fn snapshot_missing_fields_default() {
        let entity = EntityKey::new();
        let json = serde_json::json!({
            "entity": entity,
            "origin": "lobby-1",
            "taken_at": "2026-01-01T00:00:00Z"
        });
        let snapshot: Snapshot = serde_json::from_value(json).unwrap();
        assert_eq!(snapshot.entity, entity);
        assert_eq!(snapshot.play_time, PlayTime::default());
        assert!(snapshot.position.is_none());
    }
}
