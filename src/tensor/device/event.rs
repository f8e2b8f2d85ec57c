//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::ErrPack;
use crate::tensor::error::TensorOpError;

//--------------------------------------------------------------------------------------------------

static TICK: AtomicU64 = AtomicU64::new(1);

/// Returns a process-wide, strictly increasing counter value.
///
/// Every event gets one when it completes, so ticks order completions
/// against each other and against anything else that takes a tick.
pub fn next_tick() -> u64 {
	TICK.fetch_add(1, Ordering::SeqCst)
}

type Waiter = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct EventState {
	complete: bool,
	tick: u64,
	failure: Option<Cow<'static, str>>,
	waiters: Vec<Waiter>,
}

#[derive(Default)]
struct EventInner {
	state: Mutex<EventState>,
	cond: Condvar,
}

impl EventInner {
	fn lock(&self) -> MutexGuard<'_, EventState> {
		// the state stays consistent even if a waiter panicked while we held the lock
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

/// Completion handle of a submitted command.
#[derive(Clone, Default)]
pub struct Event {
	inner: Arc<EventInner>,
}

impl Event {
	pub(crate) fn pending() -> Self {
		Self::default()
	}

	/// An event that is already complete. Useful as an empty dependency.
	pub fn completed() -> Self {
		let event = Self::pending();
		event.complete(None);
		event
	}

	pub fn is_complete(&self) -> bool {
		self.inner.lock().complete
	}

	/// The tick taken when the event completed, or `None` while it is pending.
	pub fn completion_tick(&self) -> Option<u64> {
		let state = self.inner.lock();
		if state.complete { Some(state.tick) } else { None }
	}

	pub fn wait(&self) {
		let mut state = self.inner.lock();
		while !state.complete {
			state = self.inner.cond.wait(state).unwrap_or_else(PoisonError::into_inner);
		}
	}

	/// Waits and reports a failure of the command, if there was one.
	pub fn wait_and_throw(&self) -> Result<(), ErrPack<TensorOpError>> {
		self.wait();
		match &self.inner.lock().failure {
			None => Ok(()),
			Some(message) => {
				Err(ErrPack::with_message(TensorOpError::KernelFailed, message.clone()))
			},
		}
	}

	pub fn wait_all(events: &[Self]) {
		for event in events {
			event.wait();
		}
	}

	/// Runs `f` once the event is complete. If it already is, `f` runs immediately
	/// on the calling thread, otherwise on the thread that completes the event.
	pub(crate) fn on_complete(&self, f: impl FnOnce() + Send + 'static) {
		let mut state = self.inner.lock();
		if state.complete {
			drop(state);
			f();
		} else {
			state.waiters.push(Box::new(f));
		}
	}

	pub(crate) fn complete(&self, failure: Option<Cow<'static, str>>) {
		let waiters = {
			let mut state = self.inner.lock();
			debug_assert!(!state.complete, "event completed twice");
			state.complete = true;
			state.tick = next_tick();
			state.failure = failure;
			std::mem::take(&mut state.waiters)
		};
		self.inner.cond.notify_all();
		for waiter in waiters {
			waiter();
		}
	}
}

impl std::fmt::Debug for Event {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.inner.lock();
		f.debug_struct("Event")
			.field("complete", &state.complete)
			.field("tick", &state.tick)
			.field("failure", &state.failure)
			.finish()
	}
}

//--------------------------------------------------------------------------------------------------

/// An event completed by the host instead of by a command.
///
/// Commands that depend on it stay queued until `signal()` is called.
pub struct UserEvent {
	event: Event,
}

impl UserEvent {
	pub fn new() -> Self {
		Self { event: Event::pending() }
	}

	pub fn event(&self) -> Event {
		self.event.clone()
	}

	pub fn signal(self) {
		self.event.complete(None);
	}
}

impl Default for UserEvent {
	fn default() -> Self {
		Self::new()
	}
}

//--------------------------------------------------------------------------------------------------
