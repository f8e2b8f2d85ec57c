//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use std::sync::{Arc, Mutex};

use crate::tensor::device::dtype::{Element, c64, c128, f16};
use crate::tensor::device::event::next_tick;
use crate::tensor::device::{
	CPUDevice, CPUDeviceConfig, DevBufAllocFailedError, Device, DevicePtr, Queue,
};

mod test_multiply;

//--------------------------------------------------------------------------------------------------

pub fn cpu() -> Arc<dyn Device> {
	CPUDevice::new()
}

pub fn cpu_with_sub_groups(sizes: &[usize]) -> Arc<dyn Device> {
	CPUDevice::with_config(CPUDeviceConfig::default().with_sub_group_sizes(sizes))
}

pub fn queue_on(device: &Arc<dyn Device>) -> Queue {
	Queue::new(device.clone())
}

//--------------------------------------------------------------------------------------------------

/// Deterministic test values. `from_index` hits zero now and then so boolean
/// reductions see both outcomes.
pub trait TestValue: Element {
	fn from_index(i: usize) -> Self;
}

impl TestValue for bool {
	fn from_index(i: usize) -> Self {
		i % 3 != 0
	}
}

macro_rules! impl_test_value_int {
	($($t:ty),*) => {
		$(
			impl TestValue for $t {
				fn from_index(i: usize) -> Self {
					((i * 37 + 11) % 23) as $t
				}
			}
		)*
	};
}

impl_test_value_int!(u8, i8, u16, i16, u32, i32, u64, i64);

impl TestValue for f16 {
	fn from_index(i: usize) -> Self {
		f16::from_f32(f32::from_index(i))
	}
}

impl TestValue for f32 {
	fn from_index(i: usize) -> Self {
		((i * 37 + 11) % 23) as f32 * 0.25 - 2.0
	}
}

impl TestValue for f64 {
	fn from_index(i: usize) -> Self {
		f64::from(f32::from_index(i))
	}
}

impl TestValue for c64 {
	fn from_index(i: usize) -> Self {
		c64::new(f32::from_index(i), f32::from_index(i + 5))
	}
}

impl TestValue for c128 {
	fn from_index(i: usize) -> Self {
		c128::new(f64::from_index(i), f64::from_index(i + 5))
	}
}

pub fn test_values<T: TestValue>(n: usize, seed: usize) -> Vec<T> {
	(0..n).map(|i| T::from_index(i + seed)).collect()
}

//--------------------------------------------------------------------------------------------------

/// Wraps a `CPUDevice` and records when each allocation is freed.
pub struct TracingDevice {
	inner: Arc<CPUDevice>,
	frees: Mutex<Vec<(usize, u64)>>,
}

impl TracingDevice {
	pub fn new(config: CPUDeviceConfig) -> Arc<Self> {
		Arc::new(Self {
			inner: CPUDevice::with_config(config),
			frees: Mutex::new(Vec::new()),
		})
	}

	/// `(bytes, tick)` of every free so far, in the order they happened.
	pub fn frees(&self) -> Vec<(usize, u64)> {
		self.frees.lock().map(|frees| frees.clone()).unwrap_or_default()
	}

	pub fn live_allocations(&self) -> usize {
		self.inner.live_allocations()
	}
}

impl Device for TracingDevice {
	fn name(&self) -> &str {
		"tracing"
	}

	fn is_cpu(&self) -> bool {
		true
	}

	fn sub_group_sizes(&self) -> &[usize] {
		self.inner.sub_group_sizes()
	}

	fn malloc_device(&self, bytes: usize) -> Result<DevicePtr, DevBufAllocFailedError> {
		self.inner.malloc_device(bytes)
	}

	unsafe fn free(&self, ptr: DevicePtr, bytes: usize) {
		let tick = next_tick();
		if let Ok(mut frees) = self.frees.lock() {
			frees.push((bytes, tick));
		}
		unsafe { self.inner.free(ptr, bytes) };
	}
}

//--------------------------------------------------------------------------------------------------
