use crate::bridge::payload::Payload;
use crate::model::note::{InputEvent, InputSource};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Bounded hand-off between the network thread and the game loop.
///
/// Neither side ever blocks. When the queue is full the oldest event is thrown away to make
/// room for the new one, and the `dropped` counter goes up.
#[derive(Debug, Clone)]
pub struct InputQueue {
    tx: Sender<InputEvent>,
    rx: Receiver<InputEvent>,
    dropped: Arc<AtomicU64>,
}

impl InputQueue {
    pub fn bounded(capacity: usize) -> Self {
        let (tx, rx) = bounded::<InputEvent>(capacity.max(1));

        Self {
            tx,
            rx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn push(&self, event: InputEvent) {
        let mut event = event;

        loop {
            match self.tx.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    if self.rx.try_recv().is_ok() {
                        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        debug!(
                            "Input queue full, dropped the oldest event ({} so far)..!",
                            dropped
                        );
                    }
                    event = rejected;
                }
                // We hold a receiver ourselves, so this never happens.
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    pub fn push_payload(&self, payload: Payload, timestamp: Instant) {
        let event = match payload {
            Payload::Connect => InputEvent::PeerConnected,
            Payload::Lane(lane) => InputEvent::Lane {
                lane,
                source: InputSource::Remote,
                timestamp,
            },
        };

        self.push(event);
    }

    /// Takes at most `max` queued events, oldest first, without waiting for more.
    pub fn drain(&self, max: usize) -> Vec<InputEvent> {
        self.rx.try_iter().take(max).collect()
    }

    pub fn clear(&self) {
        while self.rx.try_recv().is_ok() {}
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(usize::MAX)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;

    fn lane_of(event: &InputEvent) -> Option<usize> {
        match event {
            InputEvent::Lane { lane, .. } => Some(*lane),
            InputEvent::PeerConnected => None,
        }
    }

    #[test]
    fn drains_in_arrival_order() {
        let queue = InputQueue::bounded(8);
        let now = Instant::now();

        queue.push_payload(Payload::Connect, now);
        queue.push_payload(Payload::Lane(1), now);
        queue.push_payload(Payload::Lane(3), now);

        let events = queue.drain(8);
        assert_eq!(events[0], InputEvent::PeerConnected);
        assert_eq!(lane_of(&events[1]), Some(1));
        assert_eq!(lane_of(&events[2]), Some(3));
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_is_bounded_and_never_waits() {
        let queue = InputQueue::bounded(16);
        assert!(queue.drain(4).is_empty());

        for lane in 0..10 {
            queue.push_payload(Payload::Lane(lane % 4), Instant::now());
        }

        assert_eq!(queue.drain(4).len(), 4);
        assert_eq!(queue.len(), 6);
        assert_eq!(queue.drain(100).len(), 6);
    }

    #[test]
    fn full_queue_drops_the_oldest_event() {
        let queue = InputQueue::bounded(3);

        for lane in 0..5 {
            queue.push_payload(Payload::Lane(lane), Instant::now());
        }

        assert_eq!(queue.dropped(), 2);
        let lanes: Vec<usize> = queue.drain(10).iter().filter_map(lane_of).collect();
        assert_eq!(lanes, vec![2, 3, 4]);
    }

    #[test]
    fn producer_thread_never_blocks_on_a_full_queue() {
        let queue = InputQueue::bounded(4);
        let producer = queue.clone();

        let handle = thread::spawn(move || {
            for i in 0..1000 {
                producer.push_payload(Payload::Lane(i % 4), Instant::now());
            }
        });
        handle.join().unwrap();

        assert_eq!(queue.len(), 4);
        assert_eq!(queue.dropped(), 996);
    }

    #[test]
    fn clear_empties_the_queue() {
        let queue = InputQueue::bounded(4);
        queue.push(InputEvent::PeerConnected);
        queue.clear();

        assert!(queue.is_empty());
        assert_eq!(queue.capacity(), 4);
    }
}
