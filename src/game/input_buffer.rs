//! Command intake
//!
//! Connection handlers push validated commands into a lock-free MPSC queue
//! (crossbeam-channel) without touching the engine. At the start of each tick
//! the engine drains the queue into per-player `CommandBuffer`s, which keep
//! only the most recent command.

use crossbeam_channel::{unbounded, Receiver, Sender};
use smallvec::SmallVec;

use crate::game::bubble::BubbleId;
use crate::util::vec2::Vec2;

/// A validated steering command from one player
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub player_id: BubbleId,
    /// Requested heading; the zero vector means "keep the current heading"
    pub direction: Vec2,
    /// Client timestamp (ms since UNIX epoch)
    pub timestamp: f64,
}

impl Command {
    pub fn new(player_id: impl Into<BubbleId>, direction: Vec2, timestamp: f64) -> Self {
        Self {
            player_id: player_id.into(),
            direction,
            timestamp,
        }
    }
}

/// Buffered command data once the player is known
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingCommand {
    pub direction: Vec2,
    pub timestamp: f64,
}

/// Per-player staging area between ticks.
///
/// Arrival is unbounded, but only the newest entry ever takes effect: the
/// buffer is drained wholesale and everything older is discarded.
#[derive(Debug, Clone, Default)]
pub struct CommandBuffer {
    pending: SmallVec<[PendingCommand; 4]>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, command: PendingCommand) {
        self.pending.push(command);
    }

    /// Empty the buffer, returning the last command pushed
    pub fn take_latest(&mut self) -> Option<PendingCommand> {
        let latest = self.pending.last().copied();
        self.pending.clear();
        latest
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Shared command queue, drained by the tick.
///
/// Unbounded, so a burst from one connection never displaces another
/// player's newest command.
pub struct CommandQueue {
    sender: Sender<Command>,
    receiver: Receiver<Command>,
}

impl CommandQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Clonable handle for a connection
    pub fn sender(&self) -> CommandSender {
        CommandSender {
            sender: self.sender.clone(),
        }
    }

    /// Drain every pending command in arrival order
    pub fn drain(&self) -> Vec<Command> {
        self.receiver.try_iter().collect()
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Clonable producer handle for connection handlers
#[derive(Clone)]
pub struct CommandSender {
    sender: Sender<Command>,
}

impl CommandSender {
    /// Enqueue a command without blocking
    #[inline]
    pub fn try_send(&self, command: Command) -> Result<(), CommandQueueError> {
        self.sender
            .send(command)
            .map_err(|_| CommandQueueError::Disconnected)
    }
}

/// Command queue errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommandQueueError {
    /// The engine side is gone
    #[error("command queue disconnected")]
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(x: f64, y: f64) -> PendingCommand {
        PendingCommand {
            direction: Vec2::new(x, y),
            timestamp: 0.0,
        }
    }

    #[test]
    fn test_buffer_keeps_only_latest() {
        let mut buffer = CommandBuffer::new();
        buffer.push(pending(1.0, 0.0));
        buffer.push(pending(0.0, 1.0));
        buffer.push(pending(-1.0, 0.0));
        assert_eq!(buffer.len(), 3);

        assert_eq!(buffer.take_latest(), Some(pending(-1.0, 0.0)));
        assert!(buffer.is_empty());
        assert_eq!(buffer.take_latest(), None);
    }

    #[test]
    fn test_buffer_grows_past_inline_capacity() {
        let mut buffer = CommandBuffer::new();
        for i in 0..10 {
            buffer.push(pending(i as f64, 0.0));
        }
        assert_eq!(buffer.take_latest(), Some(pending(9.0, 0.0)));
    }

    #[test]
    fn test_queue_submit_and_drain() {
        let queue = CommandQueue::new();
        let sender = queue.sender();

        sender.try_send(Command::new("a", Vec2::new(1.0, 0.0), 1.0)).unwrap();
        sender.try_send(Command::new("b", Vec2::new(0.0, 1.0), 2.0)).unwrap();
        sender.try_send(Command::new("a", Vec2::new(0.0, -1.0), 3.0)).unwrap();
        assert_eq!(queue.pending_count(), 3);

        let drained = queue.drain();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0].player_id, BubbleId::from("a"));
        assert_eq!(drained[1].player_id, BubbleId::from("b"));
        assert_eq!(drained[2].timestamp, 3.0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_flooding_sender_does_not_crowd_out_others() {
        let queue = CommandQueue::new();
        let flood = queue.sender();
        let other = queue.sender();

        for i in 0..5000 {
            flood.try_send(Command::new("flood", Vec2::new(1.0, 0.0), i as f64)).unwrap();
        }
        other.try_send(Command::new("quiet", Vec2::new(0.0, -1.0), 1.0)).unwrap();

        let drained = queue.drain();
        assert_eq!(drained.len(), 5001);
        assert_eq!(drained[4999].timestamp, 4999.0);
        assert_eq!(drained[5000].player_id, BubbleId::from("quiet"));
    }

    #[test]
    fn test_send_after_engine_dropped() {
        let queue = CommandQueue::new();
        let sender = queue.sender();
        drop(queue);
        assert_eq!(
            sender.try_send(Command::new("a", Vec2::ZERO, 1.0)),
            Err(CommandQueueError::Disconnected)
        );
    }

    #[test]
    fn test_senders_from_many_threads() {
        let queue = CommandQueue::new();
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let sender = queue.sender();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let id = format!("player-{}", t);
                        sender.try_send(Command::new(id, Vec2::new(1.0, 0.0), i as f64)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(queue.drain().len(), 200);
    }
}
