//! Reentrant, optionally FIFO-fair lock built on parking_lot primitives.

use super::interrupt::Interrupter;
use super::types::Lock;
use crate::error::LockError;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

/// How often an interruptible waiter re-checks its interrupter.
const INTERRUPT_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Default)]
struct State {
    owner: Option<ThreadId>,
    holds: usize,
    next_ticket: u64,
    queue: VecDeque<u64>,
}

impl State {
    fn grant(&mut self, me: ThreadId) {
        self.owner = Some(me);
        self.holds = 1;
    }

    fn withdraw(&mut self, ticket: u64) {
        self.queue.retain(|&t| t != ticket);
    }
}

/// Reentrant lock owned by the acquiring thread.
///
/// When fair, a released lock goes to the longest-waiting thread; a
/// non-blocking [`Lock::try_lock`] may still take a free lock ahead of the
/// queue. When not fair, any acquisition may take a free lock.
#[derive(Debug)]
pub struct FairLock {
    name: String,
    fair: bool,
    state: Mutex<State>,
    released: Condvar,
}

#[derive(Clone, Copy)]
enum Wait<'a> {
    Forever,
    Until(Instant),
    Interruptible(&'a Interrupter),
}

impl FairLock {
    pub fn new(name: impl Into<String>, fair: bool) -> Self {
        Self {
            name: name.into(),
            fair,
            state: Mutex::new(State::default()),
            released: Condvar::new(),
        }
    }

    /// Name given at construction, used in errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current hold count of the owning thread (0 when free).
    pub fn hold_count(&self) -> usize {
        self.state.lock().holds
    }

    /// Number of threads queued for the lock.
    pub fn queue_length(&self) -> usize {
        self.state.lock().queue.len()
    }

    fn acquire(&self, wait: Wait<'_>) -> Result<bool, LockError> {
        let me = thread::current().id();
        let mut state = self.state.lock();

        if state.owner == Some(me) {
            state.holds += 1;
            return Ok(true);
        }

        if let Wait::Interruptible(interrupter) = wait
            && interrupter.take()
        {
            return Err(LockError::Interrupted(self.name.clone()));
        }

        if state.owner.is_none() && (!self.fair || state.queue.is_empty()) {
            state.grant(me);
            return Ok(true);
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.queue.push_back(ticket);

        loop {
            let my_turn = !self.fair || state.queue.front() == Some(&ticket);
            if state.owner.is_none() && my_turn {
                state.withdraw(ticket);
                state.grant(me);
                return Ok(true);
            }

            match wait {
                Wait::Forever => {
                    self.released.wait(&mut state);
                }
                Wait::Until(deadline) => {
                    if self.released.wait_until(&mut state, deadline).timed_out()
                        && !(state.owner.is_none()
                            && (!self.fair || state.queue.front() == Some(&ticket)))
                    {
                        state.withdraw(ticket);
                        self.released.notify_all();
                        return Ok(false);
                    }
                }
                Wait::Interruptible(interrupter) => {
                    if interrupter.take() {
                        state.withdraw(ticket);
                        self.released.notify_all();
                        return Err(LockError::Interrupted(self.name.clone()));
                    }
                    self.released.wait_for(&mut state, INTERRUPT_POLL);
                }
            }
        }
    }
}

impl Lock for FairLock {
    fn lock(&self) {
        if let Err(e) = self.acquire(Wait::Forever) {
            tracing::error!(lock = %self.name, error = %e, "blocking acquisition failed");
        }
    }

    fn lock_interruptibly(&self, interrupter: &Interrupter) -> Result<(), LockError> {
        self.acquire(Wait::Interruptible(interrupter)).map(|_| ())
    }

    fn try_lock(&self) -> bool {
        let me = thread::current().id();
        let mut state = self.state.lock();
        match state.owner {
            Some(owner) if owner == me => {
                state.holds += 1;
                true
            }
            Some(_) => false,
            None => {
                state.grant(me);
                true
            }
        }
    }

    fn try_lock_for(&self, timeout: Duration) -> bool {
        // A timeout past the representable clock never expires.
        let wait = match Instant::now().checked_add(timeout) {
            Some(deadline) => Wait::Until(deadline),
            None => Wait::Forever,
        };
        self.acquire(wait).unwrap_or(false)
    }

    fn unlock(&self) -> Result<(), LockError> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.owner != Some(me) {
            return Err(LockError::NotOwner(self.name.clone()));
        }
        state.holds -= 1;
        if state.holds == 0 {
            state.owner = None;
            self.released.notify_all();
        }
        Ok(())
    }

    fn is_locked(&self) -> bool {
        self.state.lock().owner.is_some()
    }

    fn is_held_by_current_thread(&self) -> bool {
        self.state.lock().owner == Some(thread::current().id())
    }
}
