//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

//! Kernel bodies and launchers shared by all binary elementwise operations.

use crate::ErrPack;
use crate::tensor::device::dtype::{DType, Element, HasDType};
use crate::tensor::device::event::Event;
use crate::tensor::device::nd_range::{Group, NdRange};
use crate::tensor::device::queue::Queue;
use crate::tensor::device::view::{ReadView, WriteView};
use crate::tensor::device::{DeviceBuffer, DevicePtr};
use crate::tensor::error::TensorOpError;
use crate::util::cold_path;

use super::indexing::{Indexer, ThreeOffsetsStridedIndexer};
use super::type_dispatch::BinaryKernelFactory;

//--------------------------------------------------------------------------------------------------

/// Work-group size of the contiguous and matrix-row kernels.
pub const LWS: usize = 64;

/// Lanes per vector load in the contiguous kernel.
pub const VEC_SZ: usize = 4;

/// Vectors per work-item in the contiguous kernel.
pub const N_VECS: usize = 2;

//--------------------------------------------------------------------------------------------------

pub trait BinaryFunctor<A: Element, B: Element>: Default + Copy + Send + Sync + 'static {
	type Output: Element;

	/// The contiguous kernel may use `apply_vec`.
	const SUPPORTS_VEC: bool;

	/// The matrix-row kernel may read the row through sub-group wide windows.
	const SUPPORTS_SG_LOADSTORE: bool;

	fn apply(&self, a: A, b: B) -> Self::Output;

	#[inline]
	fn apply_vec<const N: usize>(&self, a: [A; N], b: [B; N]) -> [Self::Output; N] {
		std::array::from_fn(|i| self.apply(a[i], b[i]))
	}
}

/// Calls `Op` with the arguments in the opposite order: `Swapped(op).apply(b, a) == op.apply(a, b)`.
#[derive(Debug, Default, Copy, Clone)]
pub struct Swapped<Op>(pub Op);

impl<A: Element, B: Element, Op: BinaryFunctor<A, B>> BinaryFunctor<B, A> for Swapped<Op> {
	type Output = Op::Output;

	const SUPPORTS_VEC: bool = Op::SUPPORTS_VEC;
	const SUPPORTS_SG_LOADSTORE: bool = Op::SUPPORTS_SG_LOADSTORE;

	#[inline]
	fn apply(&self, b: B, a: A) -> Self::Output {
		self.0.apply(a, b)
	}

	#[inline]
	fn apply_vec<const N: usize>(&self, b: [B; N], a: [A; N]) -> [Self::Output; N] {
		self.0.apply_vec(a, b)
	}
}

//--------------------------------------------------------------------------------------------------

/// # Safety
/// - `a`, `b` and `res` must be CPU device pointers holding arrays of the kernel's
///   operand and result types.
/// - `[offset, offset + nelems)` must be in bounds for each of them.
/// - The buffers must stay alive until the returned event completes.
pub type BinaryContigImplFn = unsafe fn(
	queue: &Queue,
	nelems: usize,
	a: DevicePtr,
	a_offset: isize,
	b: DevicePtr,
	b_offset: isize,
	res: DevicePtr,
	res_offset: isize,
	depends: &[Event],
) -> Event;

/// # Safety
/// - `shape_and_strides` is `[shape; nd]` followed by the strides of `a`, `b` and `res`.
/// - Every offset the strides produce for `gid < nelems` must be in bounds.
/// - The buffers must stay alive until the returned event completes.
pub type BinaryStridedImplFn = unsafe fn(
	queue: &Queue,
	nelems: usize,
	nd: usize,
	shape_and_strides: &[isize],
	a: DevicePtr,
	a_offset: isize,
	b: DevicePtr,
	b_offset: isize,
	res: DevicePtr,
	res_offset: isize,
	depends: &[Event],
	additional_depends: &[Event],
) -> Result<Event, ErrPack<TensorOpError>>;

/// # Safety
/// - `mat` and `res` are C-contiguous `(n0, n1)` arrays, `vec` is a contiguous `(n1,)` array.
/// - The buffers must stay alive until the returned event completes.
/// - The events pushed to `host_tasks` must complete before the queue's device is dropped.
pub type BinaryMatrixRowImplFn = unsafe fn(
	queue: &Queue,
	host_tasks: &mut Vec<Event>,
	n0: usize,
	n1: usize,
	mat: DevicePtr,
	mat_offset: isize,
	vec: DevicePtr,
	vec_offset: isize,
	res: DevicePtr,
	res_offset: isize,
	depends: &[Event],
) -> Result<Event, ErrPack<TensorOpError>>;

/// Same as `BinaryMatrixRowImplFn`, with the row as the first operand:
/// `res[i, j] = op(vec[j], mat[i, j])`.
pub type BinaryRowMatrixImplFn = unsafe fn(
	queue: &Queue,
	host_tasks: &mut Vec<Event>,
	n0: usize,
	n1: usize,
	vec: DevicePtr,
	vec_offset: isize,
	mat: DevicePtr,
	mat_offset: isize,
	res: DevicePtr,
	res_offset: isize,
	depends: &[Event],
) -> Result<Event, ErrPack<TensorOpError>>;

//--------------------------------------------------------------------------------------------------

/// # Safety
/// See `BinaryContigImplFn`.
pub unsafe fn binary_contig_impl<A: Element, B: Element, Op: BinaryFunctor<A, B>>(
	queue: &Queue,
	nelems: usize,
	a: DevicePtr,
	a_offset: isize,
	b: DevicePtr,
	b_offset: isize,
	res: DevicePtr,
	res_offset: isize,
	depends: &[Event],
) -> Event {
	let a = unsafe { ReadView::<A>::new(a, a_offset) };
	let b = unsafe { ReadView::<B>::new(b, b_offset) };
	let res = unsafe { WriteView::<Op::Output>::new(res, res_offset) };

	let elems_per_wi = VEC_SZ * N_VECS;
	let n_groups = nelems.div_ceil(LWS * elems_per_wi);
	let range = NdRange::from_group_range([n_groups], [LWS]);
	log::trace!(
		"binary contig {}x{}: nelems={nelems}, groups={n_groups}, vec={}",
		A::dtype,
		B::dtype,
		Op::SUPPORTS_VEC
	);

	queue.submit(|cgh| {
		cgh.depends_on(depends);
		cgh.parallel_for_nd(range, move |group: &Group<1>| {
			let op = Op::default();
			for item in group.items() {
				let start = item.global_id(0) * elems_per_wi;
				if Op::SUPPORTS_VEC && start + elems_per_wi <= nelems {
					for v in 0..N_VECS {
						let i = (start + v * VEC_SZ) as isize;
						unsafe {
							let r = op.apply_vec::<VEC_SZ>(a.read_vec(i), b.read_vec(i));
							res.write_vec(i, r);
						}
					}
				} else {
					let end = (start + elems_per_wi).min(nelems);
					for k in start..end {
						let k = k as isize;
						unsafe { res.write(k, op.apply(a.read(k), b.read(k))) };
					}
				}
			}
		});
	})
}

/// # Safety
/// See `BinaryStridedImplFn`.
pub unsafe fn binary_strided_impl<A: Element, B: Element, Op: BinaryFunctor<A, B>>(
	queue: &Queue,
	nelems: usize,
	nd: usize,
	shape_and_strides: &[isize],
	a: DevicePtr,
	a_offset: isize,
	b: DevicePtr,
	b_offset: isize,
	res: DevicePtr,
	res_offset: isize,
	depends: &[Event],
	additional_depends: &[Event],
) -> Result<Event, ErrPack<TensorOpError>> {
	let indexer =
		ThreeOffsetsStridedIndexer::new(nd, a_offset, b_offset, res_offset, shape_and_strides)?;
	let a = unsafe { ReadView::<A>::new(a, 0) };
	let b = unsafe { ReadView::<B>::new(b, 0) };
	let res = unsafe { WriteView::<Op::Output>::new(res, 0) };
	log::trace!("binary strided {}x{}: nelems={nelems}, nd={nd}", A::dtype, B::dtype);

	Ok(queue.submit(|cgh| {
		cgh.depends_on(depends);
		cgh.depends_on(additional_depends);
		cgh.parallel_for(nelems, move |gid| {
			let op = Op::default();
			let offsets = indexer.offsets(gid);
			unsafe {
				let r = op.apply(a.read(offsets.first), b.read(offsets.second));
				res.write(offsets.third, r);
			}
		});
	}))
}

/// # Safety
/// See `BinaryMatrixRowImplFn`.
pub unsafe fn binary_matrix_row_impl<A: Element, B: Element, Op: BinaryFunctor<A, B>>(
	queue: &Queue,
	host_tasks: &mut Vec<Event>,
	n0: usize,
	n1: usize,
	mat: DevicePtr,
	mat_offset: isize,
	vec: DevicePtr,
	vec_offset: isize,
	res: DevicePtr,
	res_offset: isize,
	depends: &[Event],
) -> Result<Event, ErrPack<TensorOpError>> {
	let Some(n_elems) = n0.checked_mul(n1) else {
		cold_path();
		return Err(TensorOpError::ElementsOverflow.into());
	};
	if n_elems == 0 {
		return Ok(queue.submit(|cgh| cgh.depends_on(depends)));
	}

	let device = queue.device();
	let max_sg = device.max_sub_group_size();
	let n1_padded = n1 + max_sg;
	let scratch = match DeviceBuffer::new_elems(device.clone(), B::dtype, n1_padded) {
		Ok(scratch) => scratch,
		Err(err) => {
			cold_path();
			log::warn!("{}: cannot allocate padded row of {n1_padded} elements", device.name());
			return Err(err);
		},
	};
	let padded_out = unsafe { WriteView::<B>::new(scratch.device_ptr(), 0) };
	let padded = unsafe { ReadView::<B>::new(scratch.device_ptr(), 0) };
	let vec = unsafe { ReadView::<B>::new(vec, vec_offset) };
	let mat = unsafe { ReadView::<A>::new(mat, mat_offset) };
	let res = unsafe { WriteView::<Op::Output>::new(res, res_offset) };
	log::trace!(
		"binary matrix-row {}x{}: n0={n0}, n1={n1}, padding={max_sg}",
		A::dtype,
		B::dtype
	);

	let fill = queue.submit(|cgh| {
		cgh.depends_on(depends);
		cgh.parallel_for(n1_padded, move |i| unsafe {
			padded_out.write(i as isize, vec.read((i % n1) as isize));
		});
	});

	let n_groups = n_elems.div_ceil(LWS);
	let compute = queue.submit(|cgh| {
		cgh.depends_on(&[fill]);
		cgh.parallel_for_nd(
			NdRange::from_group_range([n_groups], [LWS]),
			move |group: &Group<1>| {
				let op = Op::default();
				let sg = group.sub_group_size();
				for item in group.items() {
					let gid = item.global_id(0);
					let lane = item.sub_group_local_id();
					// the sub-group covers `[base, base + sg)`
					let base = gid - lane;
					let g = gid as isize;
					if Op::SUPPORTS_SG_LOADSTORE && base + sg <= n_elems {
						// `padded[base % n1 + lane] == vec[gid % n1]` and stays below `n1 + sg`
						let v = unsafe { padded.read((base % n1 + lane) as isize) };
						unsafe { res.write(g, op.apply(mat.read(g), v)) };
					} else if gid < n_elems {
						let v = unsafe { padded.read((gid % n1) as isize) };
						unsafe { res.write(g, op.apply(mat.read(g), v)) };
					}
				}
			},
		);
	});

	let cleanup = queue.submit(|cgh| {
		cgh.depends_on(&[compute.clone()]);
		cgh.host_task(move || drop(scratch));
	});
	host_tasks.push(cleanup);

	Ok(compute)
}

/// # Safety
/// See `BinaryRowMatrixImplFn`.
pub unsafe fn binary_row_matrix_impl<A: Element, B: Element, Op: BinaryFunctor<A, B>>(
	queue: &Queue,
	host_tasks: &mut Vec<Event>,
	n0: usize,
	n1: usize,
	vec: DevicePtr,
	vec_offset: isize,
	mat: DevicePtr,
	mat_offset: isize,
	res: DevicePtr,
	res_offset: isize,
	depends: &[Event],
) -> Result<Event, ErrPack<TensorOpError>> {
	unsafe {
		binary_matrix_row_impl::<B, A, Swapped<Op>>(
			queue, host_tasks, n0, n1, mat, mat_offset, vec, vec_offset, res, res_offset, depends,
		)
	}
}

//--------------------------------------------------------------------------------------------------

pub struct ContigFactory;

impl<Op> BinaryKernelFactory<Op> for ContigFactory {
	type Fn = BinaryContigImplFn;

	fn make<A: Element, B: Element>() -> Option<BinaryContigImplFn>
	where
		Op: BinaryFunctor<A, B>,
	{
		Some(binary_contig_impl::<A, B, Op>)
	}
}

pub struct StridedFactory;

impl<Op> BinaryKernelFactory<Op> for StridedFactory {
	type Fn = BinaryStridedImplFn;

	fn make<A: Element, B: Element>() -> Option<BinaryStridedImplFn>
	where
		Op: BinaryFunctor<A, B>,
	{
		Some(binary_strided_impl::<A, B, Op>)
	}
}

fn any_complex<A: Element, B: Element, Op: BinaryFunctor<A, B>>() -> bool {
	A::dtype.is_complex() || B::dtype.is_complex() || <Op::Output as HasDType>::dtype.is_complex()
}

/// Complex operands or results have no matrix-row kernel.
pub struct MatrixRowFactory;

impl<Op> BinaryKernelFactory<Op> for MatrixRowFactory {
	type Fn = BinaryMatrixRowImplFn;

	fn make<A: Element, B: Element>() -> Option<BinaryMatrixRowImplFn>
	where
		Op: BinaryFunctor<A, B>,
	{
		if any_complex::<A, B, Op>() {
			return None;
		}
		Some(binary_matrix_row_impl::<A, B, Op>)
	}
}

pub struct RowMatrixFactory;

impl<Op> BinaryKernelFactory<Op> for RowMatrixFactory {
	type Fn = BinaryRowMatrixImplFn;

	fn make<A: Element, B: Element>() -> Option<BinaryRowMatrixImplFn>
	where
		Op: BinaryFunctor<A, B>,
	{
		if any_complex::<A, B, Op>() {
			return None;
		}
		Some(binary_row_matrix_impl::<A, B, Op>)
	}
}

/// Produces the result dtype instead of a kernel.
pub struct OutputTypeFactory;

impl<Op> BinaryKernelFactory<Op> for OutputTypeFactory {
	type Fn = DType;

	fn make<A: Element, B: Element>() -> Option<DType>
	where
		Op: BinaryFunctor<A, B>,
	{
		Some(<Op::Output as HasDType>::dtype)
	}
}

//--------------------------------------------------------------------------------------------------
