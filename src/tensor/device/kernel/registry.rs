//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use std::sync::OnceLock;

use crate::ErrPack;
use crate::tensor::device::DevicePtr;
use crate::tensor::device::dtype::DType;
use crate::tensor::device::event::Event;
use crate::tensor::device::queue::Queue;
use crate::tensor::error::TensorOpError;

use super::boolean_reductions::{
	AllContigFactory, AllStridedFactory, AnyContigFactory, AnyStridedFactory,
	BooleanReductionContigImplFn, BooleanReductionStridedImplFn,
};
use super::elementwise::{
	BinaryContigImplFn, BinaryMatrixRowImplFn, BinaryRowMatrixImplFn, BinaryStridedImplFn,
	ContigFactory, MatrixRowFactory, OutputTypeFactory, RowMatrixFactory, StridedFactory,
};
use super::multiply::MultiplyTypeMap;
use super::type_dispatch::{BinaryTypeMap, DispatchTable2, DispatchVector, UnaryKernelFactory};

//--------------------------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BinaryOpId {
	Multiply,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BooleanReductionOpId {
	All,
	Any,
}

//--------------------------------------------------------------------------------------------------

#[derive(Copy, Clone)]
pub struct BinaryContigKernel {
	f: BinaryContigImplFn,
}

impl BinaryContigKernel {
	/// # Safety
	/// See `BinaryContigImplFn`.
	pub unsafe fn launch(
		&self,
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
		unsafe { (self.f)(queue, nelems, a, a_offset, b, b_offset, res, res_offset, depends) }
	}
}

#[derive(Copy, Clone)]
pub struct BinaryStridedKernel {
	f: BinaryStridedImplFn,
}

impl BinaryStridedKernel {
	/// # Safety
	/// See `BinaryStridedImplFn`.
	pub unsafe fn launch(
		&self,
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
		unsafe {
			(self.f)(
				queue,
				nelems,
				nd,
				shape_and_strides,
				a,
				a_offset,
				b,
				b_offset,
				res,
				res_offset,
				depends,
				additional_depends,
			)
		}
	}
}

#[derive(Copy, Clone)]
pub struct BinaryMatrixRowKernel {
	f: BinaryMatrixRowImplFn,
}

impl BinaryMatrixRowKernel {
	/// # Safety
	/// See `BinaryMatrixRowImplFn`.
	pub unsafe fn launch(
		&self,
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
		unsafe {
			(self.f)(
				queue, host_tasks, n0, n1, mat, mat_offset, vec, vec_offset, res, res_offset,
				depends,
			)
		}
	}
}

#[derive(Copy, Clone)]
pub struct BinaryRowMatrixKernel {
	f: BinaryRowMatrixImplFn,
}

impl BinaryRowMatrixKernel {
	/// # Safety
	/// See `BinaryRowMatrixImplFn`.
	pub unsafe fn launch(
		&self,
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
			(self.f)(
				queue, host_tasks, n0, n1, vec, vec_offset, mat, mat_offset, res, res_offset,
				depends,
			)
		}
	}
}

#[derive(Copy, Clone)]
pub struct BooleanReductionContigKernel {
	f: BooleanReductionContigImplFn,
}

impl BooleanReductionContigKernel {
	/// # Safety
	/// See `BooleanReductionContigImplFn`.
	pub unsafe fn launch(
		&self,
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
		unsafe {
			(self.f)(
				queue,
				iter_nelems,
				reduction_nelems,
				arg,
				res,
				iter_arg_offset,
				iter_res_offset,
				red_arg_offset,
				depends,
			)
		}
	}
}

#[derive(Copy, Clone)]
pub struct BooleanReductionStridedKernel {
	f: BooleanReductionStridedImplFn,
}

impl BooleanReductionStridedKernel {
	/// # Safety
	/// See `BooleanReductionStridedImplFn`.
	pub unsafe fn launch(
		&self,
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
		unsafe {
			(self.f)(
				queue,
				iter_nelems,
				reduction_nelems,
				arg,
				res,
				iter_nd,
				iter_shape_and_strides,
				iter_arg_offset,
				iter_res_offset,
				red_nd,
				red_shape_strides,
				red_arg_offset,
				depends,
			)
		}
	}
}

//--------------------------------------------------------------------------------------------------

/// Kernels of one binary elementwise operation, indexed by operand types.
pub struct BinaryOpKernels {
	output_types: DispatchTable2<DType>,
	contig: DispatchTable2<BinaryContigImplFn>,
	strided: DispatchTable2<BinaryStridedImplFn>,
	matrix_row: DispatchTable2<BinaryMatrixRowImplFn>,
	row_matrix: DispatchTable2<BinaryRowMatrixImplFn>,
}

impl BinaryOpKernels {
	fn build<M: BinaryTypeMap>() -> Self {
		Self {
			output_types: DispatchTable2::from_type_map::<M, OutputTypeFactory>(),
			contig: DispatchTable2::from_type_map::<M, ContigFactory>(),
			strided: DispatchTable2::from_type_map::<M, StridedFactory>(),
			matrix_row: DispatchTable2::from_type_map::<M, MatrixRowFactory>(),
			row_matrix: DispatchTable2::from_type_map::<M, RowMatrixFactory>(),
		}
	}

	/// `None` if the pair is not supported.
	pub fn output_type(&self, lhs: DType, rhs: DType) -> Option<DType> {
		self.output_types.get(lhs, rhs)
	}

	pub fn contig(&self, lhs: DType, rhs: DType) -> Option<BinaryContigKernel> {
		self.contig.get(lhs, rhs).map(|f| BinaryContigKernel { f })
	}

	pub fn strided(&self, lhs: DType, rhs: DType) -> Option<BinaryStridedKernel> {
		self.strided.get(lhs, rhs).map(|f| BinaryStridedKernel { f })
	}

	/// `None` also when an operand or the result is complex.
	pub fn matrix_row(&self, lhs: DType, rhs: DType) -> Option<BinaryMatrixRowKernel> {
		self.matrix_row.get(lhs, rhs).map(|f| BinaryMatrixRowKernel { f })
	}

	/// `None` also when an operand or the result is complex.
	pub fn row_matrix(&self, lhs: DType, rhs: DType) -> Option<BinaryRowMatrixKernel> {
		self.row_matrix.get(lhs, rhs).map(|f| BinaryRowMatrixKernel { f })
	}
}

/// Kernels of one boolean reduction, indexed by input type.
pub struct BooleanReductionKernels {
	contig: DispatchVector<BooleanReductionContigImplFn>,
	strided: DispatchVector<BooleanReductionStridedImplFn>,
}

impl BooleanReductionKernels {
	fn build<C, S>() -> Self
	where
		C: UnaryKernelFactory<Fn = BooleanReductionContigImplFn>,
		S: UnaryKernelFactory<Fn = BooleanReductionStridedImplFn>,
	{
		Self {
			contig: DispatchVector::from_factory::<C>(),
			strided: DispatchVector::from_factory::<S>(),
		}
	}

	pub fn contig(&self, dtype: DType) -> Option<BooleanReductionContigKernel> {
		self.contig.get(dtype).map(|f| BooleanReductionContigKernel { f })
	}

	pub fn strided(&self, dtype: DType) -> Option<BooleanReductionStridedKernel> {
		self.strided.get(dtype).map(|f| BooleanReductionStridedKernel { f })
	}
}

//--------------------------------------------------------------------------------------------------

/// All kernel tables. Built on first use and read-only afterwards.
pub struct KernelRegistry {
	multiply: BinaryOpKernels,
	all: BooleanReductionKernels,
	any: BooleanReductionKernels,
}

impl KernelRegistry {
	pub fn instance() -> &'static Self {
		static instance: OnceLock<KernelRegistry> = OnceLock::new();
		instance.get_or_init(Self::populate)
	}

	fn populate() -> Self {
		let registry = Self {
			multiply: BinaryOpKernels::build::<MultiplyTypeMap>(),
			all: BooleanReductionKernels::build::<AllContigFactory, AllStridedFactory>(),
			any: BooleanReductionKernels::build::<AnyContigFactory, AnyStridedFactory>(),
		};
		log::debug!(
			"kernel registry: multiply contig={}, strided={}, matrix_row={}, row_matrix={}; all={}, any={}",
			registry.multiply.contig.count(),
			registry.multiply.strided.count(),
			registry.multiply.matrix_row.count(),
			registry.multiply.row_matrix.count(),
			registry.all.contig.count(),
			registry.any.contig.count(),
		);
		registry
	}

	pub fn binary(&self, op: BinaryOpId) -> &BinaryOpKernels {
		match op {
			BinaryOpId::Multiply => &self.multiply,
		}
	}

	pub fn boolean_reduction(&self, op: BooleanReductionOpId) -> &BooleanReductionKernels {
		match op {
			BooleanReductionOpId::All => &self.all,
			BooleanReductionOpId::Any => &self.any,
		}
	}
}

//--------------------------------------------------------------------------------------------------
