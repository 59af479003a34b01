//! Blocking dequeue
//!
//! `take` alternates between the claim protocol and a wait on a one-shot
//! children watch:
//!
//! ```text
//! Idle --claim ok--> done
//! Idle --queue empty, watch registered--> WatchRegistered
//! WatchRegistered --re-check finds elements--> Idle
//! WatchRegistered --re-check empty, watch fires--> Woken --> Idle
//! ```
//!
//! The watch is registered before the re-check, so an element added between
//! the empty listing and the registration is seen by the re-check, and one
//! added after the registration fires the watch.

use super::{DistributedQueue, QueueError};
use crate::coordination::{ChildWatch, CoordinationError, Coordinator, WatchedEvent};
use bytes::Bytes;
use tracing::debug;

enum TakeState {
    Idle,
    WatchRegistered(ChildWatch),
    Woken(WatchedEvent),
}

enum Step {
    Next(TakeState),
    Done(Bytes),
}

impl<C: Coordinator> DistributedQueue<C> {
    /// Remove and return the head of the queue, waiting for an element if the
    /// queue is empty.
    ///
    /// Only fails when the coordination session fails. Dropping the future
    /// while it waits abandons the wait without touching the queue.
    pub async fn take(&self) -> Result<Bytes, QueueError> {
        let mut state = TakeState::Idle;
        loop {
            match self.take_step(state).await? {
                Step::Next(next) => state = next,
                Step::Done(data) => return Ok(data),
            }
        }
    }

    async fn take_step(&self, state: TakeState) -> Result<Step, QueueError> {
        match state {
            TakeState::Idle => {
                if let Some(data) = self.claim_head().await? {
                    return Ok(Step::Done(data));
                }
                match self.coordinator.watch_children(&self.dir).await {
                    Ok(watch) => Ok(Step::Next(TakeState::WatchRegistered(watch))),
                    // Directory removed under us; the next listing recreates it
                    Err(CoordinationError::NoNode(_)) => Ok(Step::Next(TakeState::Idle)),
                    Err(e) => Err(e.into()),
                }
            }
            TakeState::WatchRegistered(watch) => {
                if !self.ordered_children().await?.is_empty() {
                    debug!("Element appeared in {} while registering watch", self.dir);
                    return Ok(Step::Next(TakeState::Idle));
                }
                debug!("Queue empty, waiting on children of {}", watch.path());
                let event = watch.fired().await?;
                Ok(Step::Next(TakeState::Woken(event)))
            }
            TakeState::Woken(event) => {
                debug!("Woken on {}: {:?}", self.dir, event);
                Ok(Step::Next(TakeState::Idle))
            }
        }
    }
}
