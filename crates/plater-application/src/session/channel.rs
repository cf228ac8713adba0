//! Per-session progress channel.
//!
//! Single producer (the session store), at most one attached consumer. The
//! producer never blocks: events are buffered up to a small capacity and the
//! oldest intermediate progress events are evicted on overflow.
//!
//! `start`, terminal events and the latest completing progress of each plate
//! are never evicted, so with nothing else left to drop the buffer may hold
//! `capacity` events or one per plate plus two, whichever is larger.

use futures::Stream;
use plater_core::error::{Result, SliceError};
use plater_core::session::{ProgressEvent, SessionId};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct ChannelState {
    buffer: VecDeque<ProgressEvent>,
    /// Set once the terminal event has been published.
    closed: bool,
    consumer: Option<u64>,
    next_consumer: u64,
    evicted: u64,
}

#[derive(Debug)]
pub struct ProgressChannel {
    session_id: SessionId,
    capacity: usize,
    state: Mutex<ChannelState>,
    notify: Notify,
}

impl ProgressChannel {
    pub fn new(session_id: SessionId, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            session_id,
            capacity: capacity.max(1),
            state: Mutex::new(ChannelState::default()),
            notify: Notify::new(),
        })
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        // A poisoned lock only means a consumer panicked mid-read; the buffer is still valid.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queues an event for the consumer.
    ///
    /// Returns `false` when the channel is already closed; nothing is
    /// delivered after the terminal event.
    pub fn publish(&self, event: ProgressEvent) -> bool {
        {
            let mut state = self.lock();
            if state.closed {
                tracing::debug!(
                    session_id = %self.session_id,
                    event = event.name(),
                    "[ProgressChannel] dropping event on closed channel"
                );
                return false;
            }
            if event.is_terminal() {
                state.closed = true;
            }
            if let Some(progress) = event.progress().filter(|p| p.is_complete) {
                let plate_index = progress.plate_index;
                state.buffer.retain(|queued| {
                    !queued
                        .progress()
                        .is_some_and(|p| p.is_complete && p.plate_index == plate_index)
                });
            }
            if state.buffer.len() >= self.capacity && evict_one(&mut state.buffer) {
                state.evicted += 1;
            }
            state.buffer.push_back(event);
        }
        self.notify.notify_one();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn has_consumer(&self) -> bool {
        self.lock().consumer.is_some()
    }

    /// Number of progress events evicted because nobody was reading.
    pub fn evicted(&self) -> u64 {
        self.lock().evicted
    }

    /// Attaches the single consumer.
    ///
    /// Fails with `Conflict` while another consumer is attached. A new
    /// consumer may attach after the previous one was dropped; it only sees
    /// events still in the buffer.
    pub fn attach(self: &Arc<Self>) -> Result<ProgressSubscription> {
        let mut state = self.lock();
        if state.consumer.is_some() {
            return Err(SliceError::conflict(format!(
                "session {} already has an attached consumer",
                self.session_id
            )));
        }
        let consumer_id = state.next_consumer;
        state.next_consumer += 1;
        state.consumer = Some(consumer_id);
        drop(state);

        tracing::debug!(session_id = %self.session_id, consumer_id, "[ProgressChannel] consumer attached");
        Ok(ProgressSubscription {
            channel: Arc::clone(self),
            consumer_id,
            finished: false,
        })
    }

    fn detach(&self, consumer_id: u64) {
        let mut state = self.lock();
        if state.consumer == Some(consumer_id) {
            state.consumer = None;
            tracing::debug!(session_id = %self.session_id, consumer_id, "[ProgressChannel] consumer detached");
        }
    }
}

/// Drops the oldest progress event that does not complete a plate.
///
/// Start, completing progress and terminal events are kept.
fn evict_one(buffer: &mut VecDeque<ProgressEvent>) -> bool {
    let position = buffer.iter().position(|event| {
        event
            .progress()
            .map(|progress| !progress.is_complete)
            .unwrap_or(false)
    });
    match position {
        Some(index) => buffer.remove(index).is_some(),
        None => false,
    }
}

/// The consumer side of a [`ProgressChannel`].
///
/// Dropping the subscription detaches the consumer; it does not cancel the
/// session.
#[derive(Debug)]
pub struct ProgressSubscription {
    channel: Arc<ProgressChannel>,
    consumer_id: u64,
    finished: bool,
}

impl ProgressSubscription {
    pub fn session_id(&self) -> &SessionId {
        self.channel.session_id()
    }

    /// Waits for the next event. Returns `None` after the terminal event.
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        loop {
            if self.finished {
                return None;
            }
            let notified = self.channel.notify.notified();
            {
                let mut state = self.channel.lock();
                if let Some(event) = state.buffer.pop_front() {
                    if event.is_terminal() {
                        self.finished = true;
                    }
                    return Some(event);
                }
                if state.closed {
                    self.finished = true;
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Adapts the subscription into a `Stream` that ends after the terminal event.
    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> + Send {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription
                .next()
                .await
                .map(|event| (event, subscription))
        })
    }
}

impl Drop for ProgressSubscription {
    fn drop(&mut self) {
        self.channel.detach(self.consumer_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plater_core::FatalKind;
    use plater_core::plate::Estimates;
    use plater_core::session::PlateProgress;

    fn sid() -> SessionId {
        SessionId::from("s1")
    }

    fn progress(plate: u32, percent: f32) -> ProgressEvent {
        ProgressEvent::Progress {
            progress: PlateProgress::running(plate, "slicing", percent, ""),
        }
    }

    #[tokio::test]
    async fn test_delivers_in_order_and_closes() {
        let channel = ProgressChannel::new(sid(), 16);
        let mut sub = channel.attach().unwrap();

        channel.publish(ProgressEvent::Start { session_id: sid() });
        channel.publish(progress(1, 10.0));
        channel.publish(ProgressEvent::Complete { session_id: sid() });

        assert_eq!(sub.next().await.map(|e| e.name()), Some("start"));
        assert_eq!(sub.next().await.map(|e| e.name()), Some("progress"));
        assert_eq!(sub.next().await.map(|e| e.name()), Some("complete"));
        assert_eq!(sub.next().await, None);
    }

    #[tokio::test]
    async fn test_exactly_one_terminal() {
        let channel = ProgressChannel::new(sid(), 16);
        assert!(channel.publish(ProgressEvent::Error {
            kind: FatalKind::Cancelled,
            message: "cancelled".to_string(),
        }));
        assert!(!channel.publish(ProgressEvent::Complete { session_id: sid() }));
        assert!(!channel.publish(progress(1, 50.0)));

        let mut sub = channel.attach().unwrap();
        assert_eq!(sub.next().await.map(|e| e.name()), Some("error"));
        assert_eq!(sub.next().await, None);
    }

    #[tokio::test]
    async fn test_second_attach_conflicts() {
        let channel = ProgressChannel::new(sid(), 16);
        let first = channel.attach().unwrap();
        let err = channel.attach().unwrap_err();
        assert!(err.is_conflict());

        drop(first);
        assert!(!channel.has_consumer());
        assert!(channel.attach().is_ok());
    }

    #[tokio::test]
    async fn test_producer_never_blocks_without_consumer() {
        let channel = ProgressChannel::new(sid(), 4);
        channel.publish(ProgressEvent::Start { session_id: sid() });
        for i in 0..20 {
            channel.publish(progress(1, i as f32));
        }
        channel.publish(ProgressEvent::Progress {
            progress: PlateProgress::completed(1, Estimates::default()),
        });
        channel.publish(ProgressEvent::Complete { session_id: sid() });
        assert!(channel.evicted() > 0);

        let mut sub = channel.attach().unwrap();
        let mut names = Vec::new();
        while let Some(event) = sub.next().await {
            names.push(event.name());
        }
        assert_eq!(names.first(), Some(&"start"));
        assert_eq!(names.last(), Some(&"complete"));
    }

    #[tokio::test]
    async fn test_completing_events_are_bounded_per_plate() {
        let channel = ProgressChannel::new(sid(), 2);
        for _ in 0..5 {
            channel.publish(ProgressEvent::Progress {
                progress: PlateProgress::completed(1, Estimates::default()),
            });
            channel.publish(ProgressEvent::Progress {
                progress: PlateProgress::completed(2, Estimates::new(Some(30), None)),
            });
        }
        channel.publish(ProgressEvent::Complete { session_id: sid() });

        let mut sub = channel.attach().unwrap();
        let mut plates = Vec::new();
        while let Some(event) = sub.next().await {
            if let Some(progress) = event.progress() {
                plates.push(progress.plate_index);
            }
        }
        assert_eq!(plates, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_consumer_wakes_on_publish() {
        let channel = ProgressChannel::new(sid(), 8);
        let mut sub = channel.attach().unwrap();

        let producer = Arc::clone(&channel);
        let handle = tokio::spawn(async move {
            tokio::task::yield_now().await;
            producer.publish(progress(2, 40.0));
            producer.publish(ProgressEvent::Complete { session_id: sid() });
        });

        let first = sub.next().await.unwrap();
        assert_eq!(first.progress().map(|p| p.plate_index), Some(2));
        handle.await.unwrap();
    }
}
