//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use std::borrow::Cow;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rayon::prelude::*;

use super::Device;
use super::event::Event;
use super::nd_range::{NdKernel, NdRange, run_nd};

//--------------------------------------------------------------------------------------------------

type Command = Box<dyn FnOnce() + Send>;

/// An out-of-order submission queue bound to one device.
///
/// Commands start as soon as all their dependencies are complete. Submitting
/// never blocks.
pub struct Queue {
	device: Arc<dyn Device>,
	submitted: Mutex<Vec<Event>>,
}

impl Queue {
	pub fn new(device: Arc<dyn Device>) -> Self {
		Self { device, submitted: Mutex::new(Vec::new()) }
	}

	pub fn device(&self) -> &Arc<dyn Device> {
		&self.device
	}

	pub fn submit(&self, build: impl FnOnce(&mut Handler)) -> Event {
		let mut cgh = Handler {
			max_sub_group_size: self.device.max_sub_group_size(),
			deps: Vec::new(),
			command: None,
		};
		build(&mut cgh);

		let event = Event::pending();
		{
			let mut submitted = self.submitted.lock().unwrap_or_else(PoisonError::into_inner);
			submitted.retain(|e| !e.is_complete());
			submitted.push(event.clone());
		}

		log::trace!(
			"{}: submit command with {} dependencies",
			self.device.name(),
			cgh.deps.len()
		);

		let task = Arc::new(PendingTask {
			remaining: AtomicUsize::new(cgh.deps.len() + 1),
			command: Mutex::new(cgh.command),
			event: event.clone(),
		});
		for dep in &cgh.deps {
			let task = task.clone();
			dep.on_complete(move || task.dependency_done());
		}
		task.dependency_done();

		event
	}

	/// Blocks until every command submitted so far is complete.
	pub fn wait(&self) {
		let submitted = std::mem::take(
			&mut *self.submitted.lock().unwrap_or_else(PoisonError::into_inner),
		);
		Event::wait_all(&submitted);
	}
}

//--------------------------------------------------------------------------------------------------

struct PendingTask {
	remaining: AtomicUsize,
	command: Mutex<Option<Command>>,
	event: Event,
}

impl PendingTask {
	fn dependency_done(&self) {
		if self.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
			return;
		}
		let command = self.command.lock().unwrap_or_else(PoisonError::into_inner).take();
		let event = self.event.clone();
		match command {
			None => event.complete(None),
			Some(command) => rayon::spawn(move || run_command(command, &event)),
		}
	}
}

fn run_command(command: Command, event: &Event) {
	match std::panic::catch_unwind(AssertUnwindSafe(command)) {
		Ok(()) => event.complete(None),
		Err(payload) => {
			let message: Cow<'static, str> = if let Some(s) = payload.downcast_ref::<&str>() {
				Cow::Owned((*s).to_string())
			} else if let Some(s) = payload.downcast_ref::<String>() {
				Cow::Owned(s.clone())
			} else {
				Cow::Borrowed("kernel panicked")
			};
			log::error!("command failed: {message}");
			event.complete(Some(message));
		},
	}
}

//--------------------------------------------------------------------------------------------------

/// Records the dependencies and the single command of one submission.
pub struct Handler {
	max_sub_group_size: usize,
	deps: Vec<Event>,
	command: Option<Command>,
}

impl Handler {
	pub fn depends_on(&mut self, events: &[Event]) {
		self.deps.extend_from_slice(events);
	}

	fn set_command(&mut self, command: Command) {
		debug_assert!(self.command.is_none(), "a submission can only have one command");
		self.command = Some(command);
	}

	/// Runs `kernel(i)` for every `i` in `0..n`.
	pub fn parallel_for(&mut self, n: usize, kernel: impl Fn(usize) + Send + Sync + 'static) {
		self.set_command(Box::new(move || {
			(0..n).into_par_iter().for_each(|i| kernel(i));
		}));
	}

	pub fn parallel_for_nd<const D: usize>(
		&mut self,
		range: NdRange<D>,
		kernel: impl NdKernel<D> + 'static,
	) {
		let max_sub_group_size = self.max_sub_group_size;
		self.set_command(Box::new(move || {
			run_nd(range, max_sub_group_size, &kernel);
		}));
	}

	pub fn host_task(&mut self, task: impl FnOnce() + Send + 'static) {
		self.set_command(Box::new(task));
	}
}

//--------------------------------------------------------------------------------------------------
