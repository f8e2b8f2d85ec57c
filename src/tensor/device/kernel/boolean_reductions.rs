//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

//! `all` and `any` reductions.
//!
//! Inputs of any element type are converted with `Element::to_bool` before
//! they are folded. Results are `i32` coded as 0 or 1.
//!
//! Reductions shorter than `4 * max_sub_group_size` run sequentially, one
//! work-item per output. Longer ones first fill the output with the identity,
//! then let every work-group fold its part of the reduction and merge it into
//! the output with a compare-and-swap loop.

use std::marker::PhantomData;
use std::ops::Range;

use crate::ErrPack;
use crate::tensor::device::DevicePtr;
use crate::tensor::device::dtype::Element;
use crate::tensor::device::event::Event;
use crate::tensor::device::nd_range::{Group, NdItem, NdRange};
use crate::tensor::device::queue::Queue;
use crate::tensor::device::view::{ReadView, WriteView};
use crate::tensor::error::TensorOpError;

use super::indexing::{
	Indexer, NoOpIndexer, Strided1DIndexer, StridedIndexer, TwoOffsets, TwoOffsetsCombinedIndexer,
	TwoOffsetsStridedIndexer, UnpackedStridedIndexer,
};
use super::type_dispatch::UnaryKernelFactory;

//--------------------------------------------------------------------------------------------------

pub const PREFERRED_REDUCTIONS_PER_WI: usize = 4;

pub trait BooleanReductionOp: Copy + Send + Sync + 'static {
	const IDENTITY: i32;

	fn combine(a: i32, b: i32) -> i32;

	/// Group fold over the contiguous index range `range`.
	fn joint<const D: usize>(
		group: &Group<D>,
		range: Range<usize>,
		pred: impl FnMut(usize) -> bool,
	) -> bool;

	/// Group fold of one value per work-item.
	fn over_group<const D: usize>(group: &Group<D>, value: impl FnMut(&NdItem<D>) -> bool) -> bool;
}

#[derive(Debug, Copy, Clone)]
pub struct LogicalAnd;

impl BooleanReductionOp for LogicalAnd {
	const IDENTITY: i32 = 1;

	#[inline]
	fn combine(a: i32, b: i32) -> i32 {
		i32::from(a != 0 && b != 0)
	}

	fn joint<const D: usize>(
		group: &Group<D>,
		range: Range<usize>,
		pred: impl FnMut(usize) -> bool,
	) -> bool {
		group.joint_all_of(range, pred)
	}

	fn over_group<const D: usize>(group: &Group<D>, value: impl FnMut(&NdItem<D>) -> bool) -> bool {
		group.all_of_group(value)
	}
}

#[derive(Debug, Copy, Clone)]
pub struct LogicalOr;

impl BooleanReductionOp for LogicalOr {
	const IDENTITY: i32 = 0;

	#[inline]
	fn combine(a: i32, b: i32) -> i32 {
		i32::from(a != 0 || b != 0)
	}

	fn joint<const D: usize>(
		group: &Group<D>,
		range: Range<usize>,
		pred: impl FnMut(usize) -> bool,
	) -> bool {
		group.joint_any_of(range, pred)
	}

	fn over_group<const D: usize>(group: &Group<D>, value: impl FnMut(&NdItem<D>) -> bool) -> bool {
		group.any_of_group(value)
	}
}

//--------------------------------------------------------------------------------------------------

/// The reduction length from which the two-phase algorithm is used.
pub fn work_group_size(queue: &Queue) -> usize {
	4 * queue.device().max_sub_group_size()
}

fn reductions_per_wi(reduction_nelems: usize, wg: usize) -> usize {
	if reduction_nelems < PREFERRED_REDUCTIONS_PER_WI * wg {
		reduction_nelems.div_ceil(wg)
	} else {
		PREFERRED_REDUCTIONS_PER_WI
	}
}

/// # Safety
/// Every offset produced for `m < reduction_nelems` must be in bounds.
#[inline]
unsafe fn sequential_reduce<T: Element, Op: BooleanReductionOp>(
	arg: ReadView<T>,
	res: WriteView<i32>,
	iter: TwoOffsets,
	reduction_indexer: &impl Indexer<Offsets = isize>,
	reduction_nelems: usize,
) {
	let mut acc = Op::IDENTITY;
	for m in 0..reduction_nelems {
		let offset = iter.first + reduction_indexer.offsets(m);
		// convert before folding so that NaN counts as true
		let val = i32::from(unsafe { arg.read(offset) }.to_bool());
		acc = Op::combine(acc, val);
	}
	unsafe { res.write(iter.second, acc) };
}

//--------------------------------------------------------------------------------------------------

/// # Safety
/// - `arg` is a C-contiguous `(iter_nelems, reduction_nelems)` array of the kernel's
///   element type starting at `iter_arg_offset + red_arg_offset`.
/// - `res` is a contiguous `(iter_nelems,)` `i32` array starting at `iter_res_offset`.
/// - The buffers must stay alive until the returned event completes.
pub type BooleanReductionContigImplFn = unsafe fn(
	queue: &Queue,
	iter_nelems: usize,
	reduction_nelems: usize,
	arg: DevicePtr,
	res: DevicePtr,
	iter_arg_offset: isize,
	iter_res_offset: isize,
	red_arg_offset: isize,
	depends: &[Event],
) -> Event;

/// # Safety
/// - `iter_shape_and_strides` is `[shape; iter_nd]` followed by the `arg` and `res`
///   strides of the iteration dimensions.
/// - `red_shape_strides` is `[shape; red_nd]` followed by the `arg` strides of the
///   reduced dimensions.
/// - Every offset produced must be in bounds and the output offsets must be distinct.
/// - The buffers must stay alive until the returned event completes.
pub type BooleanReductionStridedImplFn = unsafe fn(
	queue: &Queue,
	iter_nelems: usize,
	reduction_nelems: usize,
	arg: DevicePtr,
	res: DevicePtr,
	iter_nd: usize,
	iter_shape_and_strides: &[isize],
	iter_arg_offset: isize,
	iter_res_offset: isize,
	red_nd: usize,
	red_shape_strides: &[isize],
	red_arg_offset: isize,
	depends: &[Event],
) -> Result<Event, ErrPack<TensorOpError>>;

/// # Safety
/// See `BooleanReductionContigImplFn`.
pub unsafe fn boolean_reduction_contig_impl<T: Element, Op: BooleanReductionOp>(
	queue: &Queue,
	iter_nelems: usize,
	reduction_nelems: usize,
	arg: DevicePtr,
	res: DevicePtr,
	iter_arg_offset: isize,
	iter_res_offset: isize,
	red_arg_offset: isize,
	depends: &[Event],
) -> Event {
	let arg = unsafe { ReadView::<T>::new(arg, iter_arg_offset + red_arg_offset) };
	let res = unsafe { WriteView::<i32>::new(res, iter_res_offset) };
	let wg = work_group_size(queue);

	if reduction_nelems < wg {
		log::trace!(
			"boolean reduction contig {}: sequential, iter={iter_nelems}, red={reduction_nelems}",
			T::dtype
		);
		let iter_indexer = TwoOffsetsCombinedIndexer::new(
			Strided1DIndexer::new(0, iter_nelems, reduction_nelems as isize),
			NoOpIndexer,
		);
		return queue.submit(|cgh| {
			cgh.depends_on(depends);
			cgh.parallel_for(iter_nelems, move |i| unsafe {
				sequential_reduce::<T, Op>(
					arg,
					res,
					iter_indexer.offsets(i),
					&NoOpIndexer,
					reduction_nelems,
				);
			});
		});
	}

	let init = queue.submit(|cgh| {
		cgh.depends_on(depends);
		cgh.parallel_for(iter_nelems, move |i| unsafe {
			res.write(NoOpIndexer.offsets(i), Op::IDENTITY);
		});
	});

	let rpw = reductions_per_wi(reduction_nelems, wg);
	let reduction_groups = reduction_nelems.div_ceil(rpw * wg);
	log::trace!(
		"boolean reduction contig {}: iter={iter_nelems}, red={reduction_nelems}, wg={wg}, rpw={rpw}, groups={reduction_groups}",
		T::dtype
	);

	queue.submit(|cgh| {
		cgh.depends_on(&[init]);
		cgh.parallel_for_nd(
			NdRange::from_group_range([iter_nelems, reduction_groups], [1, wg]),
			move |group: &Group<2>| {
				let reduction_id = group.id(0);
				let batch_id = group.id(1);
				let base = reduction_id * reduction_nelems;
				let start = base + batch_id * wg * rpw;
				let end = (start + rpw * wg).min(base + reduction_nelems);

				let value = Op::joint(group, start..end, |k| unsafe {
					arg.read(k as isize).to_bool()
				});

				// once per group, as the group leader
				unsafe {
					res.atomic_update(reduction_id as isize, |current| {
						Op::combine(current, i32::from(value))
					});
				}
			},
		);
	})
}

/// # Safety
/// See `BooleanReductionStridedImplFn`.
pub unsafe fn boolean_reduction_strided_impl<T: Element, Op: BooleanReductionOp>(
	queue: &Queue,
	iter_nelems: usize,
	reduction_nelems: usize,
	arg: DevicePtr,
	res: DevicePtr,
	iter_nd: usize,
	iter_shape_and_strides: &[isize],
	iter_arg_offset: isize,
	iter_res_offset: isize,
	red_nd: usize,
	red_shape_strides: &[isize],
	red_arg_offset: isize,
	depends: &[Event],
) -> Result<Event, ErrPack<TensorOpError>> {
	let iter_indexer = TwoOffsetsStridedIndexer::new(
		iter_nd,
		iter_arg_offset,
		iter_res_offset,
		iter_shape_and_strides,
	)?;
	let reduction_indexer = StridedIndexer::new(red_nd, red_arg_offset, red_shape_strides)?;
	let arg = unsafe { ReadView::<T>::new(arg, 0) };
	let res = unsafe { WriteView::<i32>::new(res, 0) };
	let wg = work_group_size(queue);

	if reduction_nelems < wg {
		log::trace!(
			"boolean reduction strided {}: sequential, iter={iter_nelems}, red={reduction_nelems}",
			T::dtype
		);
		return Ok(queue.submit(|cgh| {
			cgh.depends_on(depends);
			cgh.parallel_for(iter_nelems, move |i| unsafe {
				sequential_reduce::<T, Op>(
					arg,
					res,
					iter_indexer.offsets(i),
					&reduction_indexer,
					reduction_nelems,
				);
			});
		}));
	}

	// the packed iteration array is [shape, arg strides, res strides]
	let res_indexer = UnpackedStridedIndexer::new(
		iter_nd,
		iter_res_offset,
		&iter_shape_and_strides[..iter_nd],
		&iter_shape_and_strides[2 * iter_nd..3 * iter_nd],
	)?;
	let init = queue.submit(|cgh| {
		cgh.depends_on(depends);
		cgh.parallel_for(iter_nelems, move |i| unsafe {
			res.write(res_indexer.offsets(i), Op::IDENTITY);
		});
	});

	let rpw = reductions_per_wi(reduction_nelems, wg);
	let reduction_groups = reduction_nelems.div_ceil(rpw * wg);
	log::trace!(
		"boolean reduction strided {}: iter={iter_nelems}, red={reduction_nelems}, wg={wg}, rpw={rpw}, groups={reduction_groups}",
		T::dtype
	);

	Ok(queue.submit(|cgh| {
		cgh.depends_on(&[init]);
		cgh.parallel_for_nd(
			NdRange::from_group_range([iter_nelems, reduction_groups], [1, wg]),
			move |group: &Group<2>| {
				let iter = iter_indexer.offsets(group.id(0));
				let batch_id = group.id(1);

				let value = Op::over_group(group, |item| {
					let gid0 = item.local_id(1) + batch_id * wg * rpw;
					let mut local = Op::IDENTITY;
					for m in 0..rpw {
						let gid = gid0 + m * wg;
						if gid < reduction_nelems {
							let offset = iter.first + reduction_indexer.offsets(gid);
							let val = i32::from(unsafe { arg.read(offset) }.to_bool());
							local = Op::combine(local, val);
						}
					}
					local != 0
				});

				// once per group, as the group leader
				unsafe {
					res.atomic_update(iter.second, |current| {
						Op::combine(current, i32::from(value))
					});
				}
			},
		);
	}))
}

//--------------------------------------------------------------------------------------------------

pub struct ContigFactory<Op>(PhantomData<Op>);

impl<Op: BooleanReductionOp> UnaryKernelFactory for ContigFactory<Op> {
	type Fn = BooleanReductionContigImplFn;

	fn make<T: Element>() -> Option<BooleanReductionContigImplFn> {
		Some(boolean_reduction_contig_impl::<T, Op>)
	}
}

pub struct StridedFactory<Op>(PhantomData<Op>);

impl<Op: BooleanReductionOp> UnaryKernelFactory for StridedFactory<Op> {
	type Fn = BooleanReductionStridedImplFn;

	fn make<T: Element>() -> Option<BooleanReductionStridedImplFn> {
		Some(boolean_reduction_strided_impl::<T, Op>)
	}
}

pub type AllContigFactory = ContigFactory<LogicalAnd>;
pub type AnyContigFactory = ContigFactory<LogicalOr>;
pub type AllStridedFactory = StridedFactory<LogicalAnd>;
pub type AnyStridedFactory = StridedFactory<LogicalOr>;

//--------------------------------------------------------------------------------------------------
