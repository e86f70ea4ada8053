//! The bounded queue between an `AgentRunner` and the `StreamMultiplexer` writer (spec §4.7).
//! Default policy is "block the producer"; the one exception is adjacent same-index,
//! same-kind `*_delta` partials, which may be coalesced in place instead of blocking.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gateway_core::EventSink;
use gateway_protocol::{Event, SequencedEvent};
use tokio::sync::{Mutex, Notify};

pub struct CoalescingQueue {
    inner: Mutex<VecDeque<SequencedEvent>>,
    capacity: usize,
    closed: AtomicBool,
    space_available: Notify,
    item_available: Notify,
    /// How long a producer will block on a full, non-coalescable queue before giving up on
    /// the consumer (spec §4.7 "StreamMultiplexer cancel threshold for a blocked slow client").
    slow_client_cutoff: Duration,
}

impl CoalescingQueue {
    pub fn new(capacity: usize, slow_client_cutoff: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
            space_available: Notify::new(),
            item_available: Notify::new(),
            slow_client_cutoff,
        })
    }

    /// Pulls the next event, waiting if the queue is empty. Returns `None` once closed and
    /// drained.
    pub async fn recv(&self) -> Option<SequencedEvent> {
        loop {
            {
                let mut queue = self.inner.lock().await;
                if let Some(event) = queue.pop_front() {
                    self.space_available.notify_one();
                    return Some(event);
                }
                if self.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            self.item_available.notified().await;
        }
    }

    /// Marks the queue closed. A producer blocked in `send` observes this and gives up;
    /// `recv` drains whatever remains, then returns `None`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.item_available.notify_waiters();
        self.space_available.notify_waiters();
    }
}

/// A cloneable handle to a [`CoalescingQueue`] that implements [`EventSink`]. `CoalescingQueue`
/// itself can't have the impl on its `Arc` directly (orphan rules: neither `EventSink` nor
/// `Arc` is local to this crate), so this newtype is the producer-facing handle instead, leaving
/// the original `Arc<CoalescingQueue>` free for the consumer side's `.recv()` calls.
#[derive(Clone)]
pub struct QueueWriter(pub Arc<CoalescingQueue>);

#[async_trait]
impl EventSink for QueueWriter {
    async fn send(&self, event: SequencedEvent) -> bool {
        self.0.send(event).await
    }
}

#[async_trait]
impl EventSink for CoalescingQueue {
    async fn send(&self, event: SequencedEvent) -> bool {
        let mut event = event;
        loop {
            if self.closed.load(Ordering::Acquire) {
                return false;
            }
            {
                let mut queue = self.inner.lock().await;
                if queue.len() < self.capacity {
                    queue.push_back(event);
                    self.item_available.notify_one();
                    return true;
                }
                match try_coalesce(&mut queue, event) {
                    Ok(()) => {
                        self.item_available.notify_one();
                        return true;
                    }
                    Err(rejected) => event = rejected,
                }
            }
            if tokio::time::timeout(self.slow_client_cutoff, self.space_available.notified())
                .await
                .is_err()
            {
                tracing::warn!(
                    cutoff_ms = self.slow_client_cutoff.as_millis(),
                    "producer blocked past slow-client cutoff; closing queue"
                );
                self.close();
                return false;
            }
        }
    }
}

/// Attempts to fold `incoming` into the tail of `queue` when both are `*_delta` partials of
/// the same content-block index. Returns the event back (`Err`) when it couldn't be coalesced,
/// so the caller can retry once space frees up.
fn try_coalesce(queue: &mut VecDeque<SequencedEvent>, incoming: SequencedEvent) -> Result<(), SequencedEvent> {
    let Event::Partial {
        index: incoming_index,
        block: incoming_block,
    } = &incoming.event
    else {
        return Err(incoming);
    };
    if !incoming_block.is_delta() {
        return Err(incoming);
    }
    if let Some(tail) = queue.back_mut() {
        if let Event::Partial { index, block } = &mut tail.event {
            if *index == *incoming_index && block.coalesce(incoming_block) {
                return Ok(());
            }
        }
    }
    Err(incoming)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_protocol::{PartialBlock, Sequencer};

    fn delta(seq: &mut Sequencer, index: u32, text: &str) -> SequencedEvent {
        seq.tag(Event::Partial {
            index,
            block: PartialBlock::TextDelta { text: text.into() },
        })
    }

    #[tokio::test]
    async fn delta_events_coalesce_when_queue_is_full() {
        let queue = CoalescingQueue::new(1, Duration::from_secs(60));
        let mut seq = Sequencer::new();
        assert!(queue.send(delta(&mut seq, 0, "Hel")).await);
        assert!(queue.send(delta(&mut seq, 0, "lo")).await);

        let received = queue.recv().await.unwrap();
        match received.event {
            Event::Partial {
                block: PartialBlock::TextDelta { text },
                ..
            } => assert_eq!(text, "Hello"),
            other => panic!("unexpected event: {other:?}"),
        }
        queue.close();
        assert!(queue.recv().await.is_none());
    }

    #[tokio::test]
    async fn non_delta_events_block_instead_of_dropping() {
        let queue = CoalescingQueue::new(1, Duration::from_secs(60));
        let mut seq = Sequencer::new();
        assert!(queue.send(delta(&mut seq, 0, "x")).await);

        let tool_event = seq.tag(Event::ToolEnd {
            tool_use_id: "t1".into(),
        });
        let queue2 = queue.clone();
        let send_task = tokio::spawn(async move { queue2.send(tool_event).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!send_task.is_finished());

        queue.recv().await.unwrap();
        assert!(send_task.await.unwrap());
        let second = queue.recv().await.unwrap();
        assert!(matches!(second.event, Event::ToolEnd { .. }));
    }

    #[tokio::test]
    async fn different_block_index_does_not_coalesce() {
        let queue = CoalescingQueue::new(1, Duration::from_secs(60));
        let mut seq = Sequencer::new();
        assert!(queue.send(delta(&mut seq, 0, "a")).await);
        let other_index = delta(&mut seq, 1, "b");
        let queue2 = queue.clone();
        let send_task = tokio::spawn(async move { queue2.send(other_index).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!send_task.is_finished());
        queue.recv().await.unwrap();
        assert!(send_task.await.unwrap());
    }

    #[tokio::test]
    async fn send_gives_up_and_closes_after_the_slow_client_cutoff() {
        let queue = CoalescingQueue::new(1, Duration::from_millis(30));
        let mut seq = Sequencer::new();
        assert!(queue.send(delta(&mut seq, 0, "x")).await);

        let tool_event = seq.tag(Event::ToolEnd {
            tool_use_id: "t1".into(),
        });
        // Nobody ever calls recv(), so the consumer never frees space: the producer must give
        // up once it has waited past the cutoff instead of blocking forever.
        let sent = queue.send(tool_event).await;
        assert!(!sent);
        queue.recv().await.unwrap(); // drains the first event still sitting in the queue
        assert!(queue.recv().await.is_none());
    }
}
