use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Lifecycle phases of a room, in the only order they can be visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RoomStatus {
    /// Waiting for enough players to join.
    GatheringPlayers,
    /// Player threshold reached; the countdown is about to start.
    RoomIsFull,
    /// Countdown done; questions are being streamed.
    CountdownFinished,
    /// Every question went out.
    QuestionsAreSent,
    /// Final standings were broadcast.
    WinnersTableSent,
    /// The prize distribution was handed to the rewards side.
    RewardsSent,
    /// Game over; players are about to be released.
    RoomFinished,
    /// Terminal state. Nothing follows.
    RoomClosed,
}

impl RoomStatus {
    /// The single status allowed after this one, if any.
    pub fn next(self) -> Option<RoomStatus> {
        let next = match self {
            RoomStatus::GatheringPlayers => RoomStatus::RoomIsFull,
            RoomStatus::RoomIsFull => RoomStatus::CountdownFinished,
            RoomStatus::CountdownFinished => RoomStatus::QuestionsAreSent,
            RoomStatus::QuestionsAreSent => RoomStatus::WinnersTableSent,
            RoomStatus::WinnersTableSent => RoomStatus::RewardsSent,
            RoomStatus::RewardsSent => RoomStatus::RoomFinished,
            RoomStatus::RoomFinished => RoomStatus::RoomClosed,
            RoomStatus::RoomClosed => return None,
        };
        Some(next)
    }
}

/// Error returned when a status change is not in the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {from:?} cannot move to {to:?}")]
pub struct InvalidTransition {
    pub from: RoomStatus,
    pub to: RoomStatus,
}

/// Guarded room status with a single subscriber notified on every transition.
pub struct StatusTransactor {
    room_id: Uuid,
    status: Mutex<RoomStatus>,
    notify: mpsc::Sender<RoomStatus>,
}

impl StatusTransactor {
    /// Create a transactor in [`RoomStatus::GatheringPlayers`] and the receiver of its notifications.
    pub fn new(room_id: Uuid, capacity: usize) -> (Self, mpsc::Receiver<RoomStatus>) {
        let (notify, receiver) = mpsc::channel(capacity);
        let transactor = Self {
            room_id,
            status: Mutex::new(RoomStatus::GatheringPlayers),
            notify,
        };
        (transactor, receiver)
    }

    /// Current status.
    pub fn status(&self) -> RoomStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `next` if the table allows it. Returns whether the status changed.
    ///
    /// Setting the current status again is a silent no-op; anything else outside the table is
    /// logged and ignored.
    pub fn set_status(&self, next: RoomStatus) -> bool {
        match self.try_transition(next) {
            Ok(changed) => changed,
            Err(invalid) => {
                warn!(room_id = %self.room_id, error = %invalid, "rejected room status change");
                false
            }
        }
    }

    /// Apply a transition, reporting illegal ones as errors instead of logging them.
    pub fn try_transition(&self, next: RoomStatus) -> Result<bool, InvalidTransition> {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        let from = *status;
        if from == next {
            return Ok(false);
        }
        if from.next() != Some(next) {
            return Err(InvalidTransition { from, to: next });
        }

        *status = next;
        debug!(room_id = %self.room_id, ?from, to = ?next, "room status changed");

        if next != RoomStatus::RoomClosed && self.notify.try_send(next).is_err() {
            warn!(room_id = %self.room_id, status = ?next, "status notification dropped");
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [RoomStatus; 8] = [
        RoomStatus::GatheringPlayers,
        RoomStatus::RoomIsFull,
        RoomStatus::CountdownFinished,
        RoomStatus::QuestionsAreSent,
        RoomStatus::WinnersTableSent,
        RoomStatus::RewardsSent,
        RoomStatus::RoomFinished,
        RoomStatus::RoomClosed,
    ];

    #[test]
    fn initial_status_is_gathering_players() {
        let (transactor, _rx) = StatusTransactor::new(Uuid::new_v4(), 10);
        assert_eq!(transactor.status(), RoomStatus::GatheringPlayers);
    }

    #[test]
    fn full_lifecycle_notifies_every_step_but_close() {
        let (transactor, mut rx) = StatusTransactor::new(Uuid::new_v4(), 10);

        for status in &ALL[1..] {
            assert!(transactor.set_status(*status));
        }
        assert_eq!(transactor.status(), RoomStatus::RoomClosed);

        let mut notified = Vec::new();
        while let Ok(status) = rx.try_recv() {
            notified.push(status);
        }
        assert_eq!(notified, ALL[1..7].to_vec());
    }

    #[test]
    fn only_room_is_full_follows_gathering() {
        let (transactor, mut rx) = StatusTransactor::new(Uuid::new_v4(), 10);

        for target in &ALL[2..] {
            assert_eq!(
                transactor.try_transition(*target),
                Err(InvalidTransition {
                    from: RoomStatus::GatheringPlayers,
                    to: *target
                })
            );
            assert!(!transactor.set_status(*target));
            assert_eq!(transactor.status(), RoomStatus::GatheringPlayers);
        }
        assert!(rx.try_recv().is_err());

        assert!(transactor.set_status(RoomStatus::RoomIsFull));
        assert_eq!(rx.try_recv(), Ok(RoomStatus::RoomIsFull));
    }

    #[test]
    fn same_status_is_a_no_op() {
        let (transactor, mut rx) = StatusTransactor::new(Uuid::new_v4(), 10);
        assert_eq!(transactor.try_transition(RoomStatus::GatheringPlayers), Ok(false));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_room_accepts_nothing() {
        let (transactor, _rx) = StatusTransactor::new(Uuid::new_v4(), 10);
        for status in &ALL[1..] {
            transactor.set_status(*status);
        }

        for target in &ALL[..7] {
            assert!(!transactor.set_status(*target));
        }
        assert_eq!(transactor.status(), RoomStatus::RoomClosed);
        assert_eq!(RoomStatus::RoomClosed.next(), None);
    }
}
