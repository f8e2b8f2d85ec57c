//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use std::sync::Arc;

use smallvec::SmallVec;

use crate::ErrPack;
use crate::tensor::device::dtype::{DType, DTypeMismatchError, HasDType};
use crate::tensor::device::{DeviceBuffer, Device};
use crate::tensor::error::{
	CannotBroadcastOutputError, InvalidAxisError, InvalidBufferSizeError, ShapeMismatchError,
	TensorOpError,
};
use crate::util::cold_path;

//--------------------------------------------------------------------------------------------------

pub const INLINE_DIMS: usize = 5;

/// One dimension of an array. `stride` is in elements and may be zero or negative.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SizeAndStride {
	pub size: usize,
	pub stride: isize,
}

pub type Dims = SmallVec<[SizeAndStride; INLINE_DIMS]>;

//--------------------------------------------------------------------------------------------------

/// A strided view of a device buffer.
///
/// The view keeps the buffer alive. Every element it can address is inside
/// the buffer.
#[derive(Clone)]
pub struct ArrayView {
	buffer: Arc<DeviceBuffer>,
	dtype: DType,
	offset: isize,
	dims: Dims,
}

impl ArrayView {
	pub fn new(
		buffer: Arc<DeviceBuffer>,
		dtype: DType,
		shape: &[usize],
		strides: &[isize],
		offset: isize,
	) -> Result<Self, ErrPack<TensorOpError>> {
		if shape.len() != strides.len() {
			cold_path();
			return Err(ErrPack::with_message(
				TensorOpError::InvalidShape,
				format!("shape has {} dimensions, strides have {}", shape.len(), strides.len()),
			));
		}
		let dims = shape
			.iter()
			.zip(strides)
			.map(|(&size, &stride)| SizeAndStride { size, stride })
			.collect();
		let view = Self { buffer, dtype, offset, dims };
		view.check_bounds()?;
		Ok(view)
	}

	/// A C-contiguous view of the start of `buffer`.
	pub fn new_c_contiguous(
		buffer: Arc<DeviceBuffer>,
		dtype: DType,
		shape: &[usize],
	) -> Result<Self, ErrPack<TensorOpError>> {
		let strides = c_contiguous_strides(shape)?;
		Self::new(buffer, dtype, shape, &strides, 0)
	}

	/// Allocates a zero-filled C-contiguous array.
	pub fn zeros(
		device: &Arc<dyn Device>,
		dtype: DType,
		shape: &[usize],
	) -> Result<Self, ErrPack<TensorOpError>> {
		let elems = checked_nelems(shape)?;
		let buffer = DeviceBuffer::new_elems(device.clone(), dtype, elems)?;
		Self::new_c_contiguous(Arc::new(buffer), dtype, shape)
	}

	/// Copies `data` into a new C-contiguous array of the given shape.
	pub fn from_slice<T: HasDType>(
		device: &Arc<dyn Device>,
		shape: &[usize],
		data: &[T],
	) -> Result<Self, ErrPack<TensorOpError>> {
		if checked_nelems(shape)? != data.len() {
			cold_path();
			return Err(ErrPack::with_message(
				TensorOpError::ShapeMismatch,
				format!("shape {shape:?} does not hold {} elements", data.len()),
			));
		}
		let buffer = DeviceBuffer::from_slice(device.clone(), data)?;
		Self::new_c_contiguous(Arc::new(buffer), T::dtype, shape)
	}

	/// Reads the elements in C order.
	///
	/// Commands writing to the array must be complete.
	pub fn to_vec<T: HasDType>(&self) -> Result<Vec<T>, ErrPack<TensorOpError>> {
		if self.dtype != T::dtype {
			cold_path();
			return Err(DTypeMismatchError.into());
		}
		let data = self.buffer.to_vec::<T>()?;
		let nelems = self.nelems();
		let mut result = Vec::with_capacity(nelems);
		for i in 0..nelems {
			let mut rest = i;
			let mut offset = self.offset;
			for dim in self.dims.iter().rev() {
				offset += (rest % dim.size) as isize * dim.stride;
				rest /= dim.size;
			}
			result.push(data[offset as usize]);
		}
		Ok(result)
	}

	pub fn buffer(&self) -> &Arc<DeviceBuffer> {
		&self.buffer
	}

	pub fn device(&self) -> &Arc<dyn Device> {
		self.buffer.device()
	}

	pub fn dtype(&self) -> DType {
		self.dtype
	}

	/// Offset of the first element, in elements.
	pub fn offset(&self) -> isize {
		self.offset
	}

	pub fn ndim(&self) -> usize {
		self.dims.len()
	}

	pub fn dims(&self) -> &[SizeAndStride] {
		&self.dims
	}

	pub fn shape(&self) -> SmallVec<[usize; INLINE_DIMS]> {
		self.dims.iter().map(|dim| dim.size).collect()
	}

	pub fn strides(&self) -> SmallVec<[isize; INLINE_DIMS]> {
		self.dims.iter().map(|dim| dim.stride).collect()
	}

	pub fn nelems(&self) -> usize {
		// cannot overflow, `check_bounds()` verified it
		self.dims.iter().map(|dim| dim.size).product()
	}

	pub fn is_c_contiguous(&self) -> bool {
		let mut expected = 1;
		for dim in self.dims.iter().rev() {
			if dim.size != 1 && dim.stride != expected {
				return false;
			}
			expected *= dim.size as isize;
		}
		true
	}

	/// Reorders dimensions: dimension `i` of the result is dimension `axes[i]` of `self`.
	pub fn permuted(&self, axes: &[usize]) -> Result<Self, ErrPack<TensorOpError>> {
		check_axes(axes, self.ndim())?;
		if axes.len() != self.ndim() {
			cold_path();
			return Err(InvalidAxisError.into());
		}
		Ok(Self {
			buffer: self.buffer.clone(),
			dtype: self.dtype,
			offset: self.offset,
			dims: axes.iter().map(|&axis| self.dims[axis]).collect(),
		})
	}

	/// Dimensions of `self` broadcast to `shape`, numpy style.
	///
	/// Missing leading dimensions and dimensions of size 1 get stride 0.
	pub fn broadcast_dims(&self, shape: &[usize]) -> Result<Dims, ErrPack<TensorOpError>> {
		let ndim = self.ndim();
		if ndim > shape.len() {
			let extra = ndim - shape.len();
			if self.dims[..extra].iter().any(|dim| dim.size != 1) {
				cold_path();
				return Err(CannotBroadcastOutputError.into());
			}
		}
		let mut result = Dims::with_capacity(shape.len());
		for (i, &size) in shape.iter().enumerate() {
			let from_end = shape.len() - i;
			let dim = if from_end <= ndim {
				self.dims[ndim - from_end]
			} else {
				SizeAndStride { size: 1, stride: 0 }
			};
			if dim.size == size {
				result.push(dim);
			} else if dim.size == 1 {
				result.push(SizeAndStride { size, stride: 0 });
			} else if size == 1 {
				cold_path();
				return Err(CannotBroadcastOutputError.into());
			} else {
				cold_path();
				return Err(ErrPack::with_message(
					TensorOpError::ShapeMismatch,
					format!("cannot broadcast {:?} to {shape:?}", self.shape().as_slice()),
				));
			}
		}
		Ok(result)
	}

	fn check_bounds(&self) -> Result<(), ErrPack<TensorOpError>> {
		let nelems = checked_nelems(&self.shape())?;
		let buffer_elems = (self.buffer.bytes() / self.dtype.bytes()) as isize;
		if nelems == 0 {
			return Ok(());
		}
		let mut min = self.offset;
		let mut max = self.offset;
		for dim in &self.dims {
			let span = isize::try_from(dim.size - 1).ok().and_then(|n| n.checked_mul(dim.stride));
			let bound = if dim.stride < 0 { &mut min } else { &mut max };
			let Some(moved) = span.and_then(|span| bound.checked_add(span)) else {
				cold_path();
				return Err(InvalidBufferSizeError.into());
			};
			*bound = moved;
		}
		if min < 0 || max >= buffer_elems {
			cold_path();
			return Err(ErrPack::with_message(
				TensorOpError::InvalidBufferSize,
				format!("elements [{min}, {max}] do not fit into a buffer of {buffer_elems}"),
			));
		}
		Ok(())
	}
}

impl std::fmt::Debug for ArrayView {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ArrayView")
			.field("dtype", &self.dtype)
			.field("shape", &self.shape().as_slice())
			.field("strides", &self.strides().as_slice())
			.field("offset", &self.offset)
			.finish()
	}
}

//--------------------------------------------------------------------------------------------------

pub fn checked_nelems(shape: &[usize]) -> Result<usize, ErrPack<TensorOpError>> {
	shape.iter().try_fold(1_usize, |acc, &size| acc.checked_mul(size)).ok_or_else(|| {
		cold_path();
		TensorOpError::ElementsOverflow.into()
	})
}

pub fn c_contiguous_strides(
	shape: &[usize],
) -> Result<SmallVec<[isize; INLINE_DIMS]>, ErrPack<TensorOpError>> {
	let mut strides = SmallVec::from_elem(0, shape.len());
	let mut stride = 1_isize;
	for (i, &size) in shape.iter().enumerate().rev() {
		strides[i] = stride;
		let Some(next) = isize::try_from(size).ok().and_then(|size| stride.checked_mul(size)) else {
			cold_path();
			return Err(TensorOpError::ElementsOverflow.into());
		};
		stride = next;
	}
	Ok(strides)
}

/// Axes must be smaller than `ndim` and unique.
pub fn check_axes(axes: &[usize], ndim: usize) -> Result<(), InvalidAxisError> {
	for (i, &axis) in axes.iter().enumerate() {
		if axis >= ndim || axes[..i].contains(&axis) {
			cold_path();
			return Err(InvalidAxisError);
		}
	}
	Ok(())
}

/// Returns `Ok` if the shapes are equal.
pub fn check_same_shape(a: &[usize], b: &[usize]) -> Result<(), ErrPack<TensorOpError>> {
	if a != b {
		cold_path();
		return Err(ErrPack::with_message(
			TensorOpError::ShapeMismatch,
			format!("expected shape {a:?}, got {b:?}"),
		));
	}
	Ok(())
}

//--------------------------------------------------------------------------------------------------
