//! Typed identifiers.
//!
//! The kernel has exactly one first-class entity kind — the artifact — so
//! there is exactly one UUID-backed ID type. It still goes through a macro
//! because every other numeric/sequence identifier in this crate (the event
//! sequence counter) is deliberately *not* a UUID, and the macro is what
//! keeps the two families from being accidentally interchangeable.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::str::FromStr;
use uuid::Uuid;

/// Common behaviour shared by every UUID-backed entity identifier.
pub trait EntityIdType:
    Copy + Clone + Eq + PartialEq + Hash + Debug + Display + FromStr + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const ENTITY_NAME: &'static str;

    fn new(uuid: Uuid) -> Self;
    fn as_uuid(&self) -> Uuid;

    fn nil() -> Self {
        Self::new(Uuid::nil())
    }

    fn now_v7() -> Self {
        Self::new(Uuid::now_v7())
    }

    fn new_v4() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Error returned when a string does not parse as a particular entity ID.
#[derive(Debug, Clone)]
pub struct EntityIdParseError {
    pub entity_name: &'static str,
    pub input: String,
    pub source: uuid::Error,
}

impl Display for EntityIdParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid {} id {:?}: {}",
            self.entity_name, self.input, self.source
        )
    }
}

impl std::error::Error for EntityIdParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Generates a newtype wrapper over `Uuid` with the full identity surface.
macro_rules! define_entity_id {
    ($name:ident, $entity_name:expr) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
        #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl EntityIdType for $name {
            const ENTITY_NAME: &'static str = $entity_name;

            fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl $name {
            pub fn new(uuid: Uuid) -> Self {
                EntityIdType::new(uuid)
            }

            pub fn as_uuid(&self) -> Uuid {
                EntityIdType::as_uuid(self)
            }

            pub fn nil() -> Self {
                EntityIdType::nil()
            }

            pub fn now_v7() -> Self {
                EntityIdType::now_v7()
            }

            pub fn new_v4() -> Self {
                EntityIdType::new_v4()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = EntityIdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|source| EntityIdParseError {
                        entity_name: $entity_name,
                        input: s.to_string(),
                        source,
                    })
            }
        }
    };
}

define_entity_id!(ArtifactId, "artifact");

/// Wall-clock timestamp. The spec explicitly excludes bit-identical
/// cross-host reproducibility, so ordinary UTC time is sufficient; ordering
/// of committed events is carried by [`crate::EventSeq`], not by this field.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Strictly monotonic event-log sequence number. Starts at 1; `seq(i) = i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(transparent)]
pub struct EventSeq(pub u64);

impl EventSeq {
    pub fn first() -> Self {
        EventSeq(1)
    }

    pub fn next(self) -> Self {
        EventSeq(self.0 + 1)
    }
}

impl Display for EventSeq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_id_round_trips_through_string() {
        let id = ArtifactId::now_v7();
        let s = id.to_string();
        let parsed: ArtifactId = s.parse().expect("parses back");
        assert_eq!(id, parsed);
    }

    #[test]
    fn artifact_id_serde_is_a_plain_string() {
        let id = ArtifactId::now_v7();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }

    #[test]
    fn parse_error_reports_entity_name_and_input() {
        let err = "not-a-uuid".parse::<ArtifactId>().unwrap_err();
        assert_eq!(err.entity_name, "artifact");
        assert_eq!(err.input, "not-a-uuid");
    }

    #[test]
    fn event_seq_starts_at_one_and_increments() {
        let s = EventSeq::first();
        assert_eq!(s.0, 1);
        assert_eq!(s.next().0, 2);
    }

    #[test]
    fn distinct_artifact_ids_are_not_equal() {
        assert_ne!(ArtifactId::now_v7(), ArtifactId::now_v7());
    }
}
