//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use std::sync::atomic::{AtomicI32, Ordering};

use super::DevicePtr;

//--------------------------------------------------------------------------------------------------

/// Read-only typed access to device memory, captured by value into kernels.
///
/// All indices are in elements, relative to the element offset the view was created with.
#[derive(Debug)]
pub struct ReadView<T> {
	ptr: *const T,
}

impl<T> Clone for ReadView<T> {
	fn clone(&self) -> Self {
		*self
	}
}

impl<T> Copy for ReadView<T> {}

unsafe impl<T: Send + Sync> Send for ReadView<T> {}
unsafe impl<T: Send + Sync> Sync for ReadView<T> {}

impl<T: Copy> ReadView<T> {
	/// # Safety
	/// `ptr` must point to memory of a CPU device holding elements of type `T`,
	/// and stay valid while the view is used.
	#[inline]
	pub unsafe fn new(ptr: DevicePtr, offset: isize) -> Self {
		Self {
			ptr: unsafe { ptr.as_ptr::<T>() }.cast_const().wrapping_offset(offset),
		}
	}

	/// # Safety
	/// `base + i` must be inside the allocation.
	#[inline]
	pub unsafe fn read(&self, i: isize) -> T {
		unsafe { self.ptr.wrapping_offset(i).read() }
	}

	/// # Safety
	/// `[i, i + N)` must be inside the allocation.
	#[inline]
	pub unsafe fn read_vec<const N: usize>(&self, i: isize) -> [T; N] {
		std::array::from_fn(|lane| unsafe { self.read(i + lane as isize) })
	}
}

//--------------------------------------------------------------------------------------------------

/// Writable typed access to device memory, captured by value into kernels.
///
/// Work-items must write disjoint elements, except through `atomic_update`.
#[derive(Debug)]
pub struct WriteView<T> {
	ptr: *mut T,
}

impl<T> Clone for WriteView<T> {
	fn clone(&self) -> Self {
		*self
	}
}

impl<T> Copy for WriteView<T> {}

unsafe impl<T: Send + Sync> Send for WriteView<T> {}
unsafe impl<T: Send + Sync> Sync for WriteView<T> {}

impl<T: Copy> WriteView<T> {
	/// # Safety
	/// `ptr` must point to memory of a CPU device holding elements of type `T`,
	/// and stay valid while the view is used.
	#[inline]
	pub unsafe fn new(ptr: DevicePtr, offset: isize) -> Self {
		Self {
			ptr: unsafe { ptr.as_ptr::<T>() }.wrapping_offset(offset),
		}
	}

	/// # Safety
	/// `base + i` must be inside the allocation and no other work-item may access it.
	#[inline]
	pub unsafe fn write(&self, i: isize, value: T) {
		unsafe { self.ptr.wrapping_offset(i).write(value) }
	}

	/// # Safety
	/// `[i, i + N)` must be inside the allocation and no other work-item may access it.
	#[inline]
	pub unsafe fn write_vec<const N: usize>(&self, i: isize, values: [T; N]) {
		for (lane, value) in values.into_iter().enumerate() {
			unsafe { self.write(i + lane as isize, value) };
		}
	}
}

impl WriteView<i32> {
	/// Replaces `self[i]` with `f(self[i])` using a relaxed compare-and-swap loop.
	///
	/// # Safety
	/// `base + i` must be inside the allocation and only accessed atomically
	/// while the kernel runs.
	#[inline]
	pub unsafe fn atomic_update(&self, i: isize, f: impl Fn(i32) -> i32) {
		let atomic = unsafe { AtomicI32::from_ptr(self.ptr.wrapping_offset(i)) };
		let mut current = atomic.load(Ordering::Relaxed);
		loop {
			let new = f(current);
			match atomic.compare_exchange_weak(current, new, Ordering::Relaxed, Ordering::Relaxed) {
				Ok(_) => break,
				Err(actual) => current = actual,
			}
		}
	}
}

//--------------------------------------------------------------------------------------------------
