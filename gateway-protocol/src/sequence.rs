//! Monotonic event sequencing for one stream, grounded on the envelope/event_id pattern
//! `stream_event::EnvelopeState` used for the CLI remote protocol.

use serde::{Deserialize, Serialize};

use crate::event::Event;

/// An event paired with its stream-local sequence number (spec §5: "events ... strictly
/// ordered"; this is what a client uses to detect gaps after a reconnect).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SequencedEvent {
    pub event_id: u64,
    pub event: Event,
}

/// Assigns monotonically increasing `event_id`s to a stream of events. One per session run;
/// never shared across two concurrent runs (spec §5: "no inter-session ordering guarantee").
#[derive(Default)]
pub struct Sequencer {
    next_event_id: u64,
}

impl Sequencer {
    pub fn new() -> Self {
        Self { next_event_id: 1 }
    }

    pub fn tag(&mut self, event: Event) -> SequencedEvent {
        let event_id = self.next_event_id;
        self.next_event_id += 1;
        SequencedEvent { event_id, event }
    }
}
