//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

pub mod buffer;
pub mod cpu;
pub mod dtype;
pub mod event;
pub mod kernel;
pub mod nd_range;
pub mod queue;
pub mod view;

pub use buffer::DeviceBuffer;
pub use cpu::{CPUDevice, CPUDeviceConfig};
pub use dtype::{DType, Element, HasDType};
pub use event::{Event, UserEvent};
pub use queue::{Handler, Queue};

//--------------------------------------------------------------------------------------------------

#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DevicePtr {
	ptr: *mut (),
}

// A `DevicePtr` is an address in device memory. Who may touch the memory
// behind it is decided by the command that uses it, not by the pointer.
unsafe impl Send for DevicePtr {}
unsafe impl Sync for DevicePtr {}

impl DevicePtr {
	#[inline]
	pub fn new(ptr: *mut ()) -> Self {
		Self { ptr }
	}

	/// For a CPU device, `self.ptr` is just a pointer to the memory.
	/// For other devices, it could be the device pointer casted to `*mut ()`.
	///
	/// Since it can be a casted device pointer, dereferencing it may be undefined behavior.
	///
	/// These operations should only be done by device-specific code or by kernels
	/// running on the device that owns the memory.
	#[inline]
	pub unsafe fn as_ptr<T>(&self) -> *mut T {
		self.ptr.cast::<T>()
	}
}

//--------------------------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct DevBufAllocFailedError;

//--------------------------------------------------------------------------------------------------

pub trait Device: Send + Sync {
	fn name(&self) -> &str;

	fn is_cpu(&self) -> bool {
		false
	}

	/// Sub-group sizes supported by the device, in no particular order.
	fn sub_group_sizes(&self) -> &[usize];

	/// The widest sub-group load the device can issue.
	fn max_sub_group_size(&self) -> usize {
		self.sub_group_sizes().iter().copied().max().unwrap_or(1)
	}

	/// Allocates `bytes` of device memory aligned to `MAX_DTYPE_ALIGN`.
	fn malloc_device(&self, bytes: usize) -> Result<DevicePtr, DevBufAllocFailedError>;

	/// # Safety
	/// `ptr` must have been returned by `malloc_device(bytes)` on this device,
	/// must not be freed twice and no command may access it anymore.
	unsafe fn free(&self, ptr: DevicePtr, bytes: usize);
}

/// Returns true if both handles refer to the same device instance.
pub fn same_device(a: &dyn Device, b: &dyn Device) -> bool {
	std::ptr::addr_eq(a as *const dyn Device, b as *const dyn Device)
}
