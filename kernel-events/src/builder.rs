//! Fluent construction of event payloads prior to append.

use kernel_core::{ArtifactId, EventKind};
use serde_json::Value;

/// Builds the `(kind, principal_id, payload)` triple that [`crate::EventLog::append`]
/// turns into a sequenced [`kernel_core::Event`]. The log itself assigns
/// `seq` and `timestamp`; the builder only carries what the caller knows.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    kind: EventKind,
    principal_id: ArtifactId,
    fields: serde_json::Map<String, Value>,
}

impl EventBuilder {
    pub fn new(kind: EventKind, principal_id: ArtifactId) -> Self {
        Self {
            kind,
            principal_id,
            fields: serde_json::Map::new(),
        }
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> (EventKind, ArtifactId, Value) {
        (self.kind, self.principal_id, Value::Object(self.fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates_fields_into_an_object_payload() {
        let principal = ArtifactId::now_v7();
        let (kind, pid, payload) = EventBuilder::new(EventKind::Transfer, principal)
            .field("amount", 10)
            .field("resource", "scrip")
            .build();
        assert_eq!(kind, EventKind::Transfer);
        assert_eq!(pid, principal);
        assert_eq!(payload["amount"], 10);
        assert_eq!(payload["resource"], "scrip");
    }
}
