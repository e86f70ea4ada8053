//! The producer-facing half of the bounded queue between an `AgentRunner` and whatever
//! consumes its events (spec §4.7 backpressure). A plain `mpsc::Sender` is the default sink;
//! `gateway-server`'s multiplexer supplies a coalescing one without this crate knowing about it.

use async_trait::async_trait;
use gateway_protocol::SequencedEvent;
use tokio::sync::mpsc;

/// Accepts sequenced events one at a time. `send` returning `false` means the sink is closed
/// and the caller (AgentRunner) should stop producing.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, event: SequencedEvent) -> bool;
}

#[async_trait]
impl EventSink for mpsc::Sender<SequencedEvent> {
    async fn send(&self, event: SequencedEvent) -> bool {
        mpsc::Sender::send(self, event).await.is_ok()
    }
}
