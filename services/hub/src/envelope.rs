use hub_protocol::{EntityRef, EventEnvelope};
use hub_store::EventRow;

/// Projects a stored event row onto its wire envelope (§9: "opaque
/// bytes at the log layer, typed view structs at the envelope projection
/// layer"). Unknown event names still round-trip: `entity` and `data` are
/// carried verbatim regardless of whether `name` is in the known catalog.
pub fn to_envelope(row: EventRow) -> EventEnvelope {
    EventEnvelope {
        event_id: row.event_id,
        ts: row.ts,
        name: row.name,
        scope: row.scope,
        entity: Some(EntityRef {
            kind: row.entity.kind,
            id: row.entity.id,
        }),
        data: row.data,
    }
}
