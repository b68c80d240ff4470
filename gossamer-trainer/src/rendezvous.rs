//! Two-phase suspend/resume rendezvous.
//!
//! Workers call [`checkpoint`] immediately before starting each step.
//! When a controller calls [`pause`], every member parks at its next
//! checkpoint; `pause` returns once all of them have arrived, and
//! [`release`] lets them go simultaneously. Arrival and release are
//! distinct phases, so a fast worker cannot run ahead while its peers
//! are still arriving, and repeated pause/release cycles cannot lose
//! or duplicate steps.
//!
//! Membership is dynamic in one direction: a worker that exhausts its
//! budget or fails calls [`leave`], removing itself from the wait set.
//! A controller pausing after that never waits on it, which is what
//! keeps `pause` deadlock-free when workers finish at different times.
//!
//! [`checkpoint`]: struct.Rendezvous.html#method.checkpoint
//! [`pause`]: struct.Rendezvous.html#method.pause
//! [`release`]: struct.Rendezvous.html#method.release
//! [`leave`]: struct.Rendezvous.html#method.leave

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Condvar, Mutex,
};

#[derive(Debug)]
struct State {
    /// Workers still participating (started and neither finished nor
    /// failed).
    members: usize,
    /// Workers currently parked at their checkpoint.
    arrived: usize,
    /// Bumped on every release; parked workers use it to tell a
    /// release of their own pause apart from a later pause.
    generation: u64,
    paused: bool,
}

/// A reusable two-phase barrier between a controller and a set of
/// worker threads.
#[derive(Debug)]
pub struct Rendezvous {
    state: Mutex<State>,
    arrived_cv: Condvar,
    release_cv: Condvar,
    /// Fast path: checkpoints stay lock-free while no pause is
    /// requested.
    pause_requested: AtomicBool,
}

impl Rendezvous {
    /// Creates a rendezvous for `members` workers.
    pub fn new(members: usize) -> Self {
        Self {
            state: Mutex::new(State {
                members,
                arrived: 0,
                generation: 0,
                paused: false,
            }),
            arrived_cv: Condvar::new(),
            release_cv: Condvar::new(),
            pause_requested: AtomicBool::new(false),
        }
    }

    /// Worker side: parks until released if a pause is in progress,
    /// returns immediately otherwise.
    ///
    /// Called immediately before starting each step, so a paused
    /// worker always halts on a step boundary, never mid-step.
    pub fn checkpoint(&self) {
        if !self.pause_requested.load(Ordering::Acquire) {
            return;
        }
        let mut state = self.state.lock().unwrap();
        while state.paused {
            state.arrived += 1;
            if state.arrived == state.members {
                self.arrived_cv.notify_all();
            }
            let generation = state.generation;
            while state.paused && state.generation == generation {
                state = self.release_cv.wait(state).unwrap();
            }
            state.arrived -= 1;
            // A new pause may already be in progress; if so, park
            // again under the new generation without ever exposing a
            // lower arrival count to the controller.
        }
    }

    /// Controller side: requests a pause and blocks until every
    /// current member is parked at its checkpoint.
    ///
    /// Workers that left before or during the wait are not waited on.
    pub fn pause(&self) {
        self.pause_requested.store(true, Ordering::Release);
        let mut state = self.state.lock().unwrap();
        state.paused = true;
        while state.arrived < state.members {
            state = self.arrived_cv.wait(state).unwrap();
        }
    }

    /// Controller side: releases all parked workers simultaneously.
    ///
    /// Harmless when no pause is in progress.
    pub fn release(&self) {
        self.pause_requested.store(false, Ordering::Release);
        let mut state = self.state.lock().unwrap();
        state.paused = false;
        state.generation = state.generation.wrapping_add(1);
        self.release_cv.notify_all();
    }

    /// Worker side: removes the caller from the wait set, on budget
    /// exhaustion or failure.
    pub fn leave(&self) {
        let mut state = self.state.lock().unwrap();
        state.members -= 1;
        if state.paused && state.arrived >= state.members {
            self.arrived_cv.notify_all();
        }
    }

    #[cfg(test)]
    fn members(&self) -> usize {
        self.state.lock().unwrap().members
    }
}
