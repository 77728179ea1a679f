use std::time::{Duration, Instant};

use crate::game::bubble::{Bubble, BubbleId};
use crate::game::input_buffer::{CommandBuffer, PendingCommand};
use crate::game::kinematics::SpeedCurve;

/// What `apply_command` did to a player's bubble this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Latest command set a new heading and speed
    Steered,
    /// Latest command was the zero vector; heading and speed kept
    Kept,
    /// No command and silent for longer than the stagnation timeout
    Stagnated,
    /// No command, still within the timeout
    Idle,
    /// Bubble has been eaten; buffered commands were discarded
    Dead,
}

/// A human-controlled bubble's control state. The bubble itself lives in
/// the store under the same ID.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: BubbleId,
    pub commands: CommandBuffer,
    /// When a command last changed this player's heading
    pub last_command_at: Instant,
}

impl Player {
    pub fn new(id: BubbleId, now: Instant) -> Self {
        Self {
            id,
            commands: CommandBuffer::new(),
            last_command_at: now,
        }
    }

    #[inline]
    pub fn buffer(&mut self, command: PendingCommand) {
        self.commands.push(command);
    }

    /// Consume the command buffer and update `bubble` accordingly.
    ///
    /// Only the newest buffered command counts (last write wins). A zero
    /// direction leaves the bubble as it is. With nothing buffered, a player
    /// silent for longer than `stagnation_timeout` is brought to a stop.
    pub fn apply_command(
        &mut self,
        bubble: &mut Bubble,
        now: Instant,
        stagnation_timeout: Duration,
        curve: &SpeedCurve,
    ) -> CommandOutcome {
        let latest = self.commands.take_latest();

        if bubble.is_eaten() {
            return CommandOutcome::Dead;
        }

        match latest {
            Some(command) if command.direction.is_exactly_zero() => CommandOutcome::Kept,
            Some(command) => {
                bubble.steer(command.direction, curve);
                self.last_command_at = now;
                CommandOutcome::Steered
            }
            None => {
                if now.saturating_duration_since(self.last_command_at) > stagnation_timeout {
                    bubble.halt();
                    CommandOutcome::Stagnated
                } else {
                    CommandOutcome::Idle
                }
            }
        }
    }
}
