//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use std::alloc::Layout;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use arrayvec::ArrayVec;

use super::dtype::MAX_DTYPE_ALIGN;
use super::{DevBufAllocFailedError, Device, DevicePtr};
use crate::util::cold_path;

//--------------------------------------------------------------------------------------------------

pub const MAX_SUB_GROUP_SIZES: usize = 8;

#[derive(Clone, Debug)]
pub struct CPUDeviceConfig {
	pub name: String,

	/// Reported by `Device::sub_group_sizes()`. Kernels derive their padding
	/// and reduction work-group sizes from the largest one.
	pub sub_group_sizes: ArrayVec<usize, MAX_SUB_GROUP_SIZES>,

	/// If set, allocations that would bring the total number of live bytes
	/// above this limit fail.
	pub alloc_limit: Option<usize>,
}

impl Default for CPUDeviceConfig {
	fn default() -> Self {
		let mut sub_group_sizes = ArrayVec::new();
		sub_group_sizes.extend([8, 16, 32]);
		Self {
			name: "CPU".to_string(),
			sub_group_sizes,
			alloc_limit: None,
		}
	}
}

impl CPUDeviceConfig {
	/// Sizes that are zero or don't fit are skipped.
	pub fn with_sub_group_sizes(mut self, sizes: &[usize]) -> Self {
		self.sub_group_sizes.clear();
		for &size in sizes.iter().filter(|&&size| size > 0) {
			if self.sub_group_sizes.try_push(size).is_err() {
				log::warn!("CPUDeviceConfig: ignoring sub-group size {size}, too many sizes");
			}
		}
		if self.sub_group_sizes.is_empty() {
			self.sub_group_sizes.push(1);
		}
		self
	}

	pub fn with_alloc_limit(mut self, bytes: usize) -> Self {
		self.alloc_limit = Some(bytes);
		self
	}
}

//--------------------------------------------------------------------------------------------------

pub struct CPUDevice {
	config: CPUDeviceConfig,
	live_bytes: AtomicUsize,
	live_allocations: AtomicUsize,
}

impl CPUDevice {
	pub fn new() -> Arc<Self> {
		Self::with_config(CPUDeviceConfig::default())
	}

	pub fn with_config(config: CPUDeviceConfig) -> Arc<Self> {
		Arc::new(Self {
			config,
			live_bytes: AtomicUsize::new(0),
			live_allocations: AtomicUsize::new(0),
		})
	}

	pub fn live_allocations(&self) -> usize {
		self.live_allocations.load(Ordering::Acquire)
	}

	pub fn live_bytes(&self) -> usize {
		self.live_bytes.load(Ordering::Acquire)
	}

	fn layout(bytes: usize) -> Option<Layout> {
		// zero-sized requests still get a unique non-null address
		Layout::from_size_align(bytes.max(1), MAX_DTYPE_ALIGN).ok()
	}

	fn reserve(&self, bytes: usize) -> bool {
		let Some(limit) = self.config.alloc_limit else {
			self.live_bytes.fetch_add(bytes, Ordering::AcqRel);
			return true;
		};
		self.live_bytes
			.fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
				live.checked_add(bytes).filter(|&total| total <= limit)
			})
			.is_ok()
	}
}

impl Device for CPUDevice {
	fn name(&self) -> &str {
		&self.config.name
	}

	fn is_cpu(&self) -> bool {
		true
	}

	fn sub_group_sizes(&self) -> &[usize] {
		&self.config.sub_group_sizes
	}

	#[inline(never)]
	fn malloc_device(&self, bytes: usize) -> Result<DevicePtr, DevBufAllocFailedError> {
		if !self.reserve(bytes) {
			cold_path();
			log::warn!("{}: allocation of {bytes} bytes exceeds the allocation limit", self.name());
			return Err(DevBufAllocFailedError);
		}
		let memory = match Self::layout(bytes) {
			// new buffers are always zero-filled
			Some(layout) => unsafe { std::alloc::alloc_zeroed(layout) },
			None => std::ptr::null_mut(),
		};
		if memory.is_null() {
			cold_path();
			self.live_bytes.fetch_sub(bytes, Ordering::AcqRel);
			return Err(DevBufAllocFailedError);
		}
		self.live_allocations.fetch_add(1, Ordering::AcqRel);
		Ok(DevicePtr::new(memory.cast()))
	}

	unsafe fn free(&self, ptr: DevicePtr, bytes: usize) {
		let Some(layout) = Self::layout(bytes) else {
			cold_path();
			return;
		};
		unsafe {
			std::alloc::dealloc(ptr.as_ptr::<u8>(), layout);
		}
		self.live_bytes.fetch_sub(bytes, Ordering::AcqRel);
		self.live_allocations.fetch_sub(1, Ordering::AcqRel);
	}
}

//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_alloc_limit() {
		let dev = CPUDevice::with_config(CPUDeviceConfig::default().with_alloc_limit(64));
		let a = dev.malloc_device(48).unwrap();
		assert_eq!(dev.live_allocations(), 1);
		assert_eq!(dev.malloc_device(32), Err(DevBufAllocFailedError));
		assert_eq!(dev.live_bytes(), 48);
		unsafe { dev.free(a, 48) };
		assert_eq!(dev.live_allocations(), 0);
		assert_eq!(dev.live_bytes(), 0);
		let b = dev.malloc_device(64).unwrap();
		unsafe { dev.free(b, 64) };
	}

	#[test]
	fn test_sub_group_sizes() {
		let dev = CPUDevice::new();
		assert_eq!(dev.max_sub_group_size(), 32);

		let dev = CPUDevice::with_config(CPUDeviceConfig::default().with_sub_group_sizes(&[0]));
		assert_eq!(dev.sub_group_sizes(), &[1]);
		assert_eq!(dev.max_sub_group_size(), 1);
	}

	#[test]
	fn test_alignment() {
		let dev = CPUDevice::new();
		let p = dev.malloc_device(3).unwrap();
		assert_eq!(unsafe { p.as_ptr::<u8>() } as usize % MAX_DTYPE_ALIGN, 0);
		unsafe { dev.free(p, 3) };
	}
}
