//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use std::sync::Arc;

use crate::ErrPack;
use crate::tensor::error::{NotOnCPUDeviceError, TensorOpError};
use crate::util::cold_path;

use super::dtype::{DType, HasDType};
use super::{DevBufAllocFailedError, Device, DevicePtr};

//--------------------------------------------------------------------------------------------------

/// An untyped allocation in device memory, freed when dropped.
///
/// Commands capture only the raw `DevicePtr`, so the buffer must outlive every
/// command that uses it.
pub struct DeviceBuffer {
	device: Arc<dyn Device>,
	ptr: DevicePtr,
	bytes: usize,
}

impl DeviceBuffer {
	pub fn new(device: Arc<dyn Device>, bytes: usize) -> Result<Self, DevBufAllocFailedError> {
		let ptr = device.malloc_device(bytes)?;
		Ok(Self { device, ptr, bytes })
	}

	pub fn new_elems(
		device: Arc<dyn Device>,
		dtype: DType,
		elems: usize,
	) -> Result<Self, ErrPack<TensorOpError>> {
		let Some(bytes) = dtype.array_bytes(elems) else {
			cold_path();
			return Err(TensorOpError::ElementsOverflow.into());
		};
		Ok(Self::new(device, bytes)?)
	}

	pub fn from_slice<T: HasDType>(
		device: Arc<dyn Device>,
		data: &[T],
	) -> Result<Self, ErrPack<TensorOpError>> {
		if !device.is_cpu() {
			cold_path();
			return Err(NotOnCPUDeviceError.into());
		}
		let buffer = Self::new_elems(device, T::dtype, data.len())?;
		unsafe {
			std::ptr::copy_nonoverlapping(data.as_ptr(), buffer.ptr.as_ptr::<T>(), data.len());
		}
		Ok(buffer)
	}

	/// Copies the whole buffer out as elements of type `T`.
	///
	/// Commands writing to the buffer must be complete.
	pub fn to_vec<T: HasDType>(&self) -> Result<Vec<T>, ErrPack<TensorOpError>> {
		if !self.device.is_cpu() {
			cold_path();
			return Err(NotOnCPUDeviceError.into());
		}
		let elems = self.bytes / T::dtype.bytes();
		let mut result = Vec::with_capacity(elems);
		unsafe {
			std::ptr::copy_nonoverlapping(self.ptr.as_ptr::<T>(), result.as_mut_ptr(), elems);
			result.set_len(elems);
		}
		Ok(result)
	}

	pub fn device(&self) -> &Arc<dyn Device> {
		&self.device
	}

	pub fn device_ptr(&self) -> DevicePtr {
		self.ptr
	}

	pub fn bytes(&self) -> usize {
		self.bytes
	}
}

impl Drop for DeviceBuffer {
	fn drop(&mut self) {
		unsafe { self.device.free(self.ptr, self.bytes) };
	}
}

impl std::fmt::Debug for DeviceBuffer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DeviceBuffer")
			.field("device", &self.device.name())
			.field("ptr", &self.ptr)
			.field("bytes", &self.bytes)
			.finish()
	}
}

//--------------------------------------------------------------------------------------------------
