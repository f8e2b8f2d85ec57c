//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

//! Safe entry points. They validate the arrays, simplify the iteration space
//! and pick the fastest kernel that can handle the resulting layout.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::ErrPack;
use crate::tensor::array::{ArrayView, Dims, INLINE_DIMS, check_axes, check_same_shape, checked_nelems};
use crate::tensor::device::dtype::DType;
use crate::tensor::device::event::Event;
use crate::tensor::device::kernel::{BinaryOpId, BooleanReductionOpId, KernelRegistry};
use crate::tensor::device::queue::Queue;
use crate::tensor::device::{DeviceBuffer, same_device};
use crate::tensor::dim_merger::{DimMerger, MergedDim, pack_shape_and_strides};
use crate::tensor::error::{
	CannotBroadcastOutputError, DeviceMismatchError, ShapeMismatchError, TensorOpError,
	UnsupportedDTypeError,
};
use crate::util::cold_path;

//--------------------------------------------------------------------------------------------------

/// The result of an operation: the event of the command that writes the output
/// and the host tasks that release resources once it is done.
#[derive(Debug)]
pub struct Submission {
	event: Event,
	host_tasks: Vec<Event>,
}

impl Submission {
	/// The output is ready when this event completes. Use it as a dependency of
	/// the next operation.
	pub fn event(&self) -> &Event {
		&self.event
	}

	pub fn host_tasks(&self) -> &[Event] {
		&self.host_tasks
	}

	/// Waits for the output and all host tasks.
	pub fn wait(&self) -> Result<(), ErrPack<TensorOpError>> {
		let result = self.event.wait_and_throw();
		for task in &self.host_tasks {
			task.wait();
		}
		result
	}
}

//--------------------------------------------------------------------------------------------------

fn check_device(queue: &Queue, arrays: &[&ArrayView]) -> Result<(), DeviceMismatchError> {
	let device = queue.device().as_ref();
	if arrays.iter().any(|array| !same_device(device, array.device().as_ref())) {
		cold_path();
		return Err(DeviceMismatchError);
	}
	Ok(())
}

/// Every element of `out` must have its own memory location.
///
/// Sorted by stride, each dimension must step over everything the smaller
/// dimensions can reach. Some interleaved layouts that don't overlap are
/// rejected as well.
fn check_no_overlap(out: &ArrayView) -> Result<(), ErrPack<TensorOpError>> {
	if out.nelems() == 0 {
		return Ok(());
	}
	if out.dims().iter().any(|dim| dim.size > 1 && dim.stride == 0) {
		cold_path();
		return Err(CannotBroadcastOutputError.into());
	}
	let merged = DimMerger::<1>::merge([out.dims()]).map_err(|_| ShapeMismatchError)?;
	let mut steps: SmallVec<[(usize, usize); INLINE_DIMS]> =
		merged.iter().map(|dim| (dim.strides[0].unsigned_abs(), dim.size)).collect();
	steps.sort_unstable();
	let mut extent = 1_usize;
	for (stride, size) in steps {
		if stride < extent {
			cold_path();
			return Err(ErrPack::with_message(
				TensorOpError::OverlappingOutput,
				format!("output elements overlap: {out:?}"),
			));
		}
		extent = extent.saturating_add(stride.saturating_mul(size - 1));
	}
	Ok(())
}

/// Submits a host task that holds the buffers of `arrays` until `event` completes.
fn keep_alive(queue: &Queue, event: &Event, arrays: &[&ArrayView]) -> Event {
	let buffers: SmallVec<[Arc<DeviceBuffer>; 3]> =
		arrays.iter().map(|array| array.buffer().clone()).collect();
	queue.submit(|cgh| {
		cgh.depends_on(std::slice::from_ref(event));
		cgh.host_task(move || drop(buffers));
	})
}

fn empty_submission(queue: &Queue, depends: &[Event]) -> Submission {
	let event = queue.submit(|cgh| cgh.depends_on(depends));
	Submission { event, host_tasks: Vec::new() }
}

//--------------------------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum BinaryPath {
	Contig,
	MatrixRow { n0: usize, n1: usize },
	RowMatrix { n0: usize, n1: usize },
	Strided,
}

/// `merged` holds the strides of `[a, b, out]`.
fn select_binary_path(merged: &[MergedDim<3>]) -> BinaryPath {
	match merged {
		[] => BinaryPath::Contig,
		[dim] if dim.strides == [1, 1, 1] => BinaryPath::Contig,
		[rows, cols] if cols.strides == [1, 1, 1] => {
			let n1 = cols.size as isize;
			if rows.strides == [n1, 0, n1] {
				BinaryPath::MatrixRow { n0: rows.size, n1: cols.size }
			} else if rows.strides == [0, n1, n1] {
				BinaryPath::RowMatrix { n0: rows.size, n1: cols.size }
			} else {
				BinaryPath::Strided
			}
		},
		_ => BinaryPath::Strided,
	}
}

/// `out = a * b`, with `a` and `b` broadcast to the shape of `out`.
pub fn multiply(
	queue: &Queue,
	a: &ArrayView,
	b: &ArrayView,
	out: &ArrayView,
	depends: &[Event],
) -> Result<Submission, ErrPack<TensorOpError>> {
	binary_op(queue, BinaryOpId::Multiply, a, b, out, depends)
}

fn binary_op(
	queue: &Queue,
	op: BinaryOpId,
	a: &ArrayView,
	b: &ArrayView,
	out: &ArrayView,
	depends: &[Event],
) -> Result<Submission, ErrPack<TensorOpError>> {
	check_device(queue, &[a, b, out])?;
	let kernels = KernelRegistry::instance().binary(op);
	let (a_dtype, b_dtype) = (a.dtype(), b.dtype());
	let Some(out_dtype) = kernels.output_type(a_dtype, b_dtype) else {
		cold_path();
		return Err(ErrPack::with_message(
			TensorOpError::UnsupportedDType,
			format!("{op:?} is not defined for {a_dtype} and {b_dtype}"),
		));
	};
	if out.dtype() != out_dtype {
		cold_path();
		return Err(ErrPack::with_message(
			TensorOpError::DTypeMismatch,
			format!("{op:?} of {a_dtype} and {b_dtype} produces {out_dtype}, output is {}", out.dtype()),
		));
	}
	check_no_overlap(out)?;

	let shape = out.shape();
	let a_dims = a.broadcast_dims(&shape)?;
	let b_dims = b.broadcast_dims(&shape)?;
	let merged = DimMerger::<3>::merge([&a_dims, &b_dims, out.dims()])
		.map_err(|_| ShapeMismatchError)?;

	let nelems = out.nelems();
	if nelems == 0 {
		log::trace!("{op:?}: empty output");
		return Ok(empty_submission(queue, depends));
	}

	let (a_ptr, b_ptr, out_ptr) =
		(a.buffer().device_ptr(), b.buffer().device_ptr(), out.buffer().device_ptr());
	let (a_off, b_off, out_off) = (a.offset(), b.offset(), out.offset());
	let mut host_tasks = Vec::new();

	let mut path = select_binary_path(&merged);
	match path {
		BinaryPath::MatrixRow { .. } if kernels.matrix_row(a_dtype, b_dtype).is_none() => {
			path = BinaryPath::Strided;
		},
		BinaryPath::RowMatrix { .. } if kernels.row_matrix(a_dtype, b_dtype).is_none() => {
			path = BinaryPath::Strided;
		},
		_ => {},
	}
	log::trace!("{op:?} {a_dtype}x{b_dtype}: nelems={nelems}, dims={}, path={path:?}", merged.len());

	// SAFETY: the views were bounds-checked against their buffers when created,
	// `merged` addresses the same elements as the views, `check_no_overlap()` gave
	// every output element its own slot, and the buffers are kept alive by
	// `keep_alive()` until the kernel completes.
	let unsupported = || ErrPack::<TensorOpError>::from(UnsupportedDTypeError);
	let event = match path {
		BinaryPath::Contig => {
			let kernel = kernels.contig(a_dtype, b_dtype).ok_or_else(unsupported)?;
			unsafe {
				kernel.launch(queue, nelems, a_ptr, a_off, b_ptr, b_off, out_ptr, out_off, depends)
			}
		},
		BinaryPath::MatrixRow { n0, n1 } => {
			let kernel = kernels.matrix_row(a_dtype, b_dtype).ok_or_else(unsupported)?;
			unsafe {
				kernel.launch(
					queue, &mut host_tasks, n0, n1, a_ptr, a_off, b_ptr, b_off, out_ptr, out_off,
					depends,
				)?
			}
		},
		BinaryPath::RowMatrix { n0, n1 } => {
			let kernel = kernels.row_matrix(a_dtype, b_dtype).ok_or_else(unsupported)?;
			unsafe {
				kernel.launch(
					queue, &mut host_tasks, n0, n1, a_ptr, a_off, b_ptr, b_off, out_ptr, out_off,
					depends,
				)?
			}
		},
		BinaryPath::Strided => {
			let kernel = kernels.strided(a_dtype, b_dtype).ok_or_else(unsupported)?;
			let shape_and_strides = pack_shape_and_strides(&merged);
			unsafe {
				kernel.launch(
					queue,
					nelems,
					merged.len(),
					&shape_and_strides,
					a_ptr,
					a_off,
					b_ptr,
					b_off,
					out_ptr,
					out_off,
					depends,
					&[],
				)?
			}
		},
	};

	host_tasks.push(keep_alive(queue, &event, &[a, b, out]));
	Ok(Submission { event, host_tasks })
}

//--------------------------------------------------------------------------------------------------

/// `out[i] = 1` if every element of `src` reduced over `axes` is true, 0 otherwise.
///
/// `out` is `i32` with the shape of `src` without `axes`. An empty reduction gives 1.
pub fn all(
	queue: &Queue,
	src: &ArrayView,
	axes: &[usize],
	out: &ArrayView,
	depends: &[Event],
) -> Result<Submission, ErrPack<TensorOpError>> {
	boolean_reduction(queue, BooleanReductionOpId::All, src, axes, out, depends)
}

/// `out[i] = 1` if any element of `src` reduced over `axes` is true, 0 otherwise.
///
/// `out` is `i32` with the shape of `src` without `axes`. An empty reduction gives 0.
pub fn any(
	queue: &Queue,
	src: &ArrayView,
	axes: &[usize],
	out: &ArrayView,
	depends: &[Event],
) -> Result<Submission, ErrPack<TensorOpError>> {
	boolean_reduction(queue, BooleanReductionOpId::Any, src, axes, out, depends)
}

/// The reduction is contiguous when every output row reads one contiguous block of `src`
/// and the outputs are contiguous as well.
fn is_contig_reduction(
	iter: &[MergedDim<2>],
	red: &[MergedDim<1>],
	reduction_nelems: usize,
) -> bool {
	let red_contig = match red {
		[] => true,
		[dim] => dim.size == 0 || dim.strides == [1],
		_ => false,
	};
	let iter_contig = match iter {
		[] => true,
		[dim] => {
			dim.strides[1] == 1 && (reduction_nelems == 0 || dim.strides[0] == reduction_nelems as isize)
		},
		_ => false,
	};
	red_contig && iter_contig
}

fn boolean_reduction(
	queue: &Queue,
	op: BooleanReductionOpId,
	src: &ArrayView,
	axes: &[usize],
	out: &ArrayView,
	depends: &[Event],
) -> Result<Submission, ErrPack<TensorOpError>> {
	check_device(queue, &[src, out])?;
	check_axes(axes, src.ndim())?;
	if out.dtype() != DType::I32 {
		cold_path();
		return Err(ErrPack::with_message(
			TensorOpError::DTypeMismatch,
			format!("{op:?} writes i32, output is {}", out.dtype()),
		));
	}
	check_no_overlap(out)?;

	let mut iter_dims = Dims::new();
	let mut red_dims = Dims::new();
	for (axis, dim) in src.dims().iter().enumerate() {
		if axes.contains(&axis) {
			red_dims.push(*dim);
		} else {
			iter_dims.push(*dim);
		}
	}
	let iter_shape: SmallVec<[usize; 5]> = iter_dims.iter().map(|dim| dim.size).collect();
	check_same_shape(&iter_shape, &out.shape())?;
	let red_shape: SmallVec<[usize; 5]> = red_dims.iter().map(|dim| dim.size).collect();
	let reduction_nelems = checked_nelems(&red_shape)?;
	let iter_nelems = out.nelems();

	let kernels = KernelRegistry::instance().boolean_reduction(op);
	let dtype = src.dtype();
	if iter_nelems == 0 {
		log::trace!("{op:?}: empty output");
		return Ok(empty_submission(queue, depends));
	}

	let merged_iter =
		DimMerger::<2>::merge([&iter_dims, out.dims()]).map_err(|_| ShapeMismatchError)?;
	let merged_red = DimMerger::<1>::merge([&red_dims]).map_err(|_| ShapeMismatchError)?;
	let contig = is_contig_reduction(&merged_iter, &merged_red, reduction_nelems);
	log::trace!(
		"{op:?} {dtype}: iter={iter_nelems}, red={reduction_nelems}, iter_nd={}, red_nd={}, contig={contig}",
		merged_iter.len(),
		merged_red.len()
	);

	let (src_ptr, out_ptr) = (src.buffer().device_ptr(), out.buffer().device_ptr());
	let unsupported = || {
		ErrPack::with_message(TensorOpError::UnsupportedDType, format!("{op:?} of {dtype}"))
	};

	// SAFETY: see `binary_op()`. Output offsets are distinct, `check_no_overlap()`
	// verified it.
	let event = if contig {
		let kernel = kernels.contig(dtype).ok_or_else(unsupported)?;
		unsafe {
			kernel.launch(
				queue,
				iter_nelems,
				reduction_nelems,
				src_ptr,
				out_ptr,
				src.offset(),
				out.offset(),
				0,
				depends,
			)
		}
	} else {
		let kernel = kernels.strided(dtype).ok_or_else(unsupported)?;
		let iter_packed = pack_shape_and_strides(&merged_iter);
		let red_packed = pack_shape_and_strides(&merged_red);
		unsafe {
			kernel.launch(
				queue,
				iter_nelems,
				reduction_nelems,
				src_ptr,
				out_ptr,
				merged_iter.len(),
				&iter_packed,
				src.offset(),
				out.offset(),
				merged_red.len(),
				&red_packed,
				0,
				depends,
			)?
		}
	};

	let host_tasks = vec![keep_alive(queue, &event, &[src, out])];
	Ok(Submission { event, host_tasks })
}

//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;

	fn dim<const N: usize>(size: usize, strides: [isize; N]) -> MergedDim<N> {
		MergedDim { size, strides }
	}

	#[test]
	fn test_select_binary_path() {
		assert_eq!(select_binary_path(&[]), BinaryPath::Contig);
		assert_eq!(select_binary_path(&[dim(10, [1, 1, 1])]), BinaryPath::Contig);
		assert_eq!(select_binary_path(&[dim(10, [1, 0, 1])]), BinaryPath::Strided);
		assert_eq!(
			select_binary_path(&[dim(2, [3, 0, 3]), dim(3, [1, 1, 1])]),
			BinaryPath::MatrixRow { n0: 2, n1: 3 }
		);
		assert_eq!(
			select_binary_path(&[dim(2, [0, 3, 3]), dim(3, [1, 1, 1])]),
			BinaryPath::RowMatrix { n0: 2, n1: 3 }
		);
		// a column broadcast is not a row broadcast
		assert_eq!(
			select_binary_path(&[dim(2, [3, 1, 3]), dim(3, [1, 0, 1])]),
			BinaryPath::Strided
		);
		assert_eq!(
			select_binary_path(&[dim(2, [4, 0, 3]), dim(3, [1, 1, 1])]),
			BinaryPath::Strided
		);
	}

	#[test]
	fn test_check_no_overlap() -> Result<(), ErrPack<TensorOpError>> {
		let dev: Arc<dyn crate::tensor::device::Device> = crate::tensor::device::CPUDevice::new();
		let store = ArrayView::zeros(&dev, DType::U8, &[64])?;
		let view = |shape: &[usize], strides: &[isize], offset: isize| {
			ArrayView::new(store.buffer().clone(), DType::U8, shape, strides, offset)
		};
		let code = |view: &ArrayView| check_no_overlap(view).map_err(|e| e.code);

		assert_eq!(code(&view(&[2, 3], &[3, 1], 0)?), Ok(()));
		assert_eq!(code(&view(&[2, 3], &[1, 2], 0)?), Ok(()));
		assert_eq!(code(&view(&[4, 2], &[-2, 1], 6)?), Ok(()));
		assert_eq!(code(&view(&[3, 1, 2], &[10, 7, 4], 0)?), Ok(()));
		assert_eq!(code(&view(&[0, 4], &[0, 0], 0)?), Ok(()));

		assert_eq!(code(&view(&[3], &[0], 0)?), Err(TensorOpError::CannotBroadcastOutput));
		assert_eq!(code(&view(&[2, 2], &[1, 1], 0)?), Err(TensorOpError::OverlappingOutput));
		assert_eq!(code(&view(&[2, 3], &[2, 1], 0)?), Err(TensorOpError::OverlappingOutput));
		assert_eq!(code(&view(&[3, 3], &[-2, 1], 4)?), Err(TensorOpError::OverlappingOutput));
		// disjoint but interleaved, rejected all the same
		assert_eq!(code(&view(&[3, 2], &[2, 3], 0)?), Err(TensorOpError::OverlappingOutput));
		Ok(())
	}

	#[test]
	fn test_is_contig_reduction() {
		assert!(is_contig_reduction(&[dim(4, [6, 1])], &[dim(6, [1])], 6));
		assert!(is_contig_reduction(&[], &[dim(6, [1])], 6));
		assert!(is_contig_reduction(&[dim(4, [0, 1])], &[dim(0, [0])], 0));
		assert!(!is_contig_reduction(&[dim(6, [1, 1])], &[dim(4, [6])], 4));
		assert!(!is_contig_reduction(&[dim(4, [6, 2])], &[dim(6, [1])], 6));
		assert!(!is_contig_reduction(&[dim(2, [12, 1]), dim(2, [6, 2])], &[dim(6, [1])], 6));
	}
}
