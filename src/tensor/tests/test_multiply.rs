//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use std::sync::Arc;

use assert_approx_eq::assert_approx_eq;
use ndarray::{Array, IxDyn};

use crate::ErrPack;
use crate::tensor::array::ArrayView;
use crate::tensor::device::dtype::{DType, c64, c128, f16};
use crate::tensor::device::kernel::multiply::MulElement;
use crate::tensor::device::kernel::{BinaryOpId, KernelRegistry};
use crate::tensor::device::{CPUDevice, CPUDeviceConfig, Device, Queue};
use crate::tensor::dim_merger::{MergedDim, pack_shape_and_strides};
use crate::tensor::error::TensorOpError;
use crate::tensor::ops;

use super::{TestValue, cpu, cpu_with_sub_groups, queue_on, test_values};

//--------------------------------------------------------------------------------------------------

/// Runs the generic strided kernel on the broadcast, unmerged layout.
fn multiply_strided(
	queue: &Queue,
	a: &ArrayView,
	b: &ArrayView,
	out: &ArrayView,
) -> Result<(), ErrPack<TensorOpError>> {
	let shape = out.shape();
	let a_dims = a.broadcast_dims(&shape)?;
	let b_dims = b.broadcast_dims(&shape)?;
	let dims: Vec<MergedDim<3>> = (0..shape.len())
		.map(|i| MergedDim {
			size: shape[i],
			strides: [a_dims[i].stride, b_dims[i].stride, out.dims()[i].stride],
		})
		.collect();
	let packed = pack_shape_and_strides(&dims);
	let kernel = KernelRegistry::instance()
		.binary(BinaryOpId::Multiply)
		.strided(a.dtype(), b.dtype())
		.ok_or(TensorOpError::UnsupportedDType)?;
	let event = unsafe {
		kernel.launch(
			queue,
			out.nelems(),
			dims.len(),
			&packed,
			a.buffer().device_ptr(),
			a.offset(),
			b.buffer().device_ptr(),
			b.offset(),
			out.buffer().device_ptr(),
			out.offset(),
			&[],
			&[],
		)?
	};
	event.wait_and_throw()
}

fn multiply_and_wait(
	queue: &Queue,
	a: &ArrayView,
	b: &ArrayView,
	out: &ArrayView,
) -> Result<(), ErrPack<TensorOpError>> {
	ops::multiply(queue, a, b, out, &[])?.wait()
}

//--------------------------------------------------------------------------------------------------

#[test]
fn test_matrix_row_scenario() -> Result<(), ErrPack<TensorOpError>> {
	let dev = cpu();
	let queue = queue_on(&dev);
	let mat = ArrayView::from_slice(&dev, &[2, 3], &[1_i32, 2, 3, 4, 5, 6])?;
	let row = ArrayView::from_slice(&dev, &[3], &[10_i32, 20, 30])?;
	let expected = vec![10, 40, 90, 40, 100, 180];

	let out = ArrayView::zeros(&dev, DType::I32, &[2, 3])?;
	let submission = ops::multiply(&queue, &mat, &row, &out, &[])?;
	// scratch cleanup and keep-alive
	assert_eq!(submission.host_tasks().len(), 2);
	submission.wait()?;
	assert_eq!(out.to_vec::<i32>()?, expected);

	let out = ArrayView::zeros(&dev, DType::I32, &[2, 3])?;
	multiply_strided(&queue, &mat, &row, &out)?;
	assert_eq!(out.to_vec::<i32>()?, expected);

	// row first
	let out = ArrayView::zeros(&dev, DType::I32, &[2, 3])?;
	multiply_and_wait(&queue, &row, &mat, &out)?;
	assert_eq!(out.to_vec::<i32>()?, expected);
	Ok(())
}

fn check_contig_vs_strided<T: TestValue + MulElement>(
	dev: &Arc<dyn Device>,
	n: usize,
) -> Result<(), ErrPack<TensorOpError>> {
	let queue = queue_on(dev);
	let a = ArrayView::from_slice(dev, &[n], &test_values::<T>(n, 0))?;
	let b = ArrayView::from_slice(dev, &[n], &test_values::<T>(n, 7))?;

	let contig = ArrayView::zeros(dev, T::dtype, &[n])?;
	multiply_and_wait(&queue, &a, &b, &contig)?;
	let strided = ArrayView::zeros(dev, T::dtype, &[n])?;
	multiply_strided(&queue, &a, &b, &strided)?;

	let contig = contig.to_vec::<T>()?;
	assert_eq!(contig, strided.to_vec::<T>()?, "{} n={n}", T::dtype);
	let a = test_values::<T>(n, 0);
	let b = test_values::<T>(n, 7);
	for i in 0..n {
		assert_eq!(contig[i], a[i].mul(b[i]), "{} i={i}", T::dtype);
	}
	Ok(())
}

#[test]
fn test_contig_agrees_with_strided() -> Result<(), ErrPack<TensorOpError>> {
	let dev = cpu();
	// around the 64 * 8 element tile
	for n in [1, 3, 8, 63, 511, 512, 513, 1000] {
		check_contig_vs_strided::<bool>(&dev, n)?;
		check_contig_vs_strided::<u8>(&dev, n)?;
		check_contig_vs_strided::<i8>(&dev, n)?;
		check_contig_vs_strided::<u16>(&dev, n)?;
		check_contig_vs_strided::<i16>(&dev, n)?;
		check_contig_vs_strided::<u32>(&dev, n)?;
		check_contig_vs_strided::<i32>(&dev, n)?;
		check_contig_vs_strided::<u64>(&dev, n)?;
		check_contig_vs_strided::<i64>(&dev, n)?;
		check_contig_vs_strided::<f16>(&dev, n)?;
		check_contig_vs_strided::<f32>(&dev, n)?;
		check_contig_vs_strided::<f64>(&dev, n)?;
		check_contig_vs_strided::<c64>(&dev, n)?;
		check_contig_vs_strided::<c128>(&dev, n)?;
	}
	Ok(())
}

fn check_matrix_row_vs_strided<T: TestValue + MulElement>(
	dev: &Arc<dyn Device>,
) -> Result<(), ErrPack<TensorOpError>> {
	let queue = queue_on(dev);
	let registry = KernelRegistry::instance().binary(BinaryOpId::Multiply);
	assert!(registry.matrix_row(T::dtype, T::dtype).is_some());
	assert!(registry.row_matrix(T::dtype, T::dtype).is_some());

	let max_sg = dev.max_sub_group_size();
	let shapes = [
		(1, 1),
		(2, 3),
		(5, max_sg - 1),
		(3, max_sg),
		(7, max_sg + 1),
		(65, 17),
		(4, 100),
	];
	for (n0, n1) in shapes {
		let mat = ArrayView::from_slice(dev, &[n0, n1], &test_values::<T>(n0 * n1, 1))?;
		let row = ArrayView::from_slice(dev, &[n1], &test_values::<T>(n1, 4))?;

		for (a, b) in [(&mat, &row), (&row, &mat)] {
			let fast = ArrayView::zeros(dev, T::dtype, &[n0, n1])?;
			let submission = ops::multiply(&queue, a, b, &fast, &[])?;
			if n0 > 1 && n1 > 1 {
				// the padded row is released by a host task
				assert_eq!(submission.host_tasks().len(), 2);
			}
			submission.wait()?;

			let generic = ArrayView::zeros(dev, T::dtype, &[n0, n1])?;
			multiply_strided(&queue, a, b, &generic)?;
			assert_eq!(
				fast.to_vec::<T>()?,
				generic.to_vec::<T>()?,
				"{} n0={n0} n1={n1} max_sg={max_sg}",
				T::dtype
			);
		}
	}
	Ok(())
}

#[test]
fn test_matrix_row_agrees_with_strided() -> Result<(), ErrPack<TensorOpError>> {
	for dev in [cpu(), cpu_with_sub_groups(&[4]), cpu_with_sub_groups(&[1, 2])] {
		check_matrix_row_vs_strided::<bool>(&dev)?;
		check_matrix_row_vs_strided::<u8>(&dev)?;
		check_matrix_row_vs_strided::<i8>(&dev)?;
		check_matrix_row_vs_strided::<u16>(&dev)?;
		check_matrix_row_vs_strided::<i16>(&dev)?;
		check_matrix_row_vs_strided::<u32>(&dev)?;
		check_matrix_row_vs_strided::<i32>(&dev)?;
		check_matrix_row_vs_strided::<u64>(&dev)?;
		check_matrix_row_vs_strided::<i64>(&dev)?;
		check_matrix_row_vs_strided::<f16>(&dev)?;
		check_matrix_row_vs_strided::<f32>(&dev)?;
		check_matrix_row_vs_strided::<f64>(&dev)?;
	}
	Ok(())
}

#[test]
fn test_complex_row_broadcast_falls_back() -> Result<(), ErrPack<TensorOpError>> {
	let dev = cpu();
	let queue = queue_on(&dev);
	let registry = KernelRegistry::instance().binary(BinaryOpId::Multiply);
	assert!(registry.matrix_row(DType::C64, DType::C64).is_none());

	let mat = ArrayView::from_slice(&dev, &[2, 2], &[
		c64::new(1.0, 0.0),
		c64::new(0.0, 1.0),
		c64::new(2.0, 0.0),
		c64::new(1.0, 1.0),
	])?;
	let row = ArrayView::from_slice(&dev, &[2], &[c64::new(0.0, 1.0), c64::new(2.0, 0.0)])?;
	let out = ArrayView::zeros(&dev, DType::C64, &[2, 2])?;
	let submission = ops::multiply(&queue, &mat, &row, &out, &[])?;
	// only the keep-alive task, no scratch buffer
	assert_eq!(submission.host_tasks().len(), 1);
	submission.wait()?;
	assert_eq!(out.to_vec::<c64>()?, vec![
		c64::new(0.0, 1.0),
		c64::new(0.0, 2.0),
		c64::new(0.0, 2.0),
		c64::new(2.0, 2.0),
	]);
	Ok(())
}

#[test]
fn test_native_overflow_semantics() -> Result<(), ErrPack<TensorOpError>> {
	let dev = cpu();
	let queue = queue_on(&dev);

	let a = ArrayView::from_slice(&dev, &[3], &[200_u8, 16, 255])?;
	let b = ArrayView::from_slice(&dev, &[3], &[2_u8, 16, 255])?;
	let out = ArrayView::zeros(&dev, DType::U8, &[3])?;
	multiply_and_wait(&queue, &a, &b, &out)?;
	assert_eq!(out.to_vec::<u8>()?, vec![144, 0, 1]);

	let a = ArrayView::from_slice(&dev, &[2], &[i64::MAX, i64::MIN])?;
	let b = ArrayView::from_slice(&dev, &[2], &[2_i64, -1])?;
	let out = ArrayView::zeros(&dev, DType::I64, &[2])?;
	multiply_and_wait(&queue, &a, &b, &out)?;
	assert_eq!(out.to_vec::<i64>()?, vec![-2, i64::MIN]);

	let a = ArrayView::from_slice(&dev, &[4], &[true, true, false, false])?;
	let b = ArrayView::from_slice(&dev, &[4], &[true, false, true, false])?;
	let out = ArrayView::zeros(&dev, DType::Bool, &[4])?;
	multiply_and_wait(&queue, &a, &b, &out)?;
	assert_eq!(out.to_vec::<bool>()?, vec![true, false, false, false]);

	let a = ArrayView::from_slice(&dev, &[3], &[f32::MAX, f32::INFINITY, f32::NAN])?;
	let b = ArrayView::from_slice(&dev, &[3], &[2.0_f32, 0.0, 1.0])?;
	let out = ArrayView::zeros(&dev, DType::F32, &[3])?;
	multiply_and_wait(&queue, &a, &b, &out)?;
	let out = out.to_vec::<f32>()?;
	assert_eq!(out[0], f32::INFINITY);
	assert!(out[1].is_nan());
	assert!(out[2].is_nan());
	Ok(())
}

#[test]
fn test_broadcast_against_ndarray() -> Result<(), ErrPack<TensorOpError>> {
	let dev = cpu();
	let queue = queue_on(&dev);
	let a_data = test_values::<f64>(2 * 4, 3);
	let b_data = test_values::<f64>(3, 9);

	let a = ArrayView::from_slice(&dev, &[2, 1, 4], &a_data)?;
	let b = ArrayView::from_slice(&dev, &[3, 1], &b_data)?;
	let out = ArrayView::zeros(&dev, DType::F64, &[2, 3, 4])?;
	multiply_and_wait(&queue, &a, &b, &out)?;

	let a_nd = Array::from_shape_vec(IxDyn(&[2, 1, 4]), a_data).unwrap();
	let b_nd = Array::from_shape_vec(IxDyn(&[3, 1]), b_data).unwrap();
	let expected = &a_nd * &b_nd;
	assert_eq!(expected.shape(), &[2, 3, 4]);
	let result = out.to_vec::<f64>()?;
	for (r, e) in result.iter().zip(expected.iter()) {
		assert_approx_eq!(*r, *e);
	}
	Ok(())
}

#[test]
fn test_non_contiguous_inputs() -> Result<(), ErrPack<TensorOpError>> {
	let dev = cpu();
	let queue = queue_on(&dev);
	let data = test_values::<f32>(12, 0);
	let a = ArrayView::from_slice(&dev, &[3, 4], &data)?.permuted(&[1, 0])?;
	let b = ArrayView::from_slice(&dev, &[4, 3], &test_values::<f32>(12, 5))?;
	let out = ArrayView::zeros(&dev, DType::F32, &[4, 3])?;
	multiply_and_wait(&queue, &a, &b, &out)?;

	let a_nd = Array::from_shape_vec((3, 4), data).unwrap().reversed_axes();
	let b_nd = Array::from_shape_vec((4, 3), test_values::<f32>(12, 5)).unwrap();
	let expected = &a_nd * &b_nd;
	let result = out.to_vec::<f32>()?;
	for (r, e) in result.iter().zip(expected.iter()) {
		assert_approx_eq!(*r, *e);
	}

	// reversed view of a buffer
	let rev = ArrayView::new(b.buffer().clone(), DType::F32, &[12], &[-1], 11)?;
	let flat = ArrayView::from_slice(&dev, &[12], &[2.0_f32; 12])?;
	let out = ArrayView::zeros(&dev, DType::F32, &[12])?;
	multiply_and_wait(&queue, &rev, &flat, &out)?;
	let mut expected = test_values::<f32>(12, 5);
	expected.reverse();
	for (r, e) in out.to_vec::<f32>()?.iter().zip(expected.iter()) {
		assert_approx_eq!(*r, e * 2.0);
	}
	Ok(())
}

#[test]
fn test_empty_output() -> Result<(), ErrPack<TensorOpError>> {
	let dev = cpu();
	let queue = queue_on(&dev);
	let a = ArrayView::zeros(&dev, DType::I16, &[0, 3])?;
	let b = ArrayView::zeros(&dev, DType::I16, &[3])?;
	let out = ArrayView::zeros(&dev, DType::I16, &[0, 3])?;
	let submission = ops::multiply(&queue, &a, &b, &out, &[])?;
	assert!(submission.host_tasks().is_empty());
	submission.wait()?;
	Ok(())
}

#[test]
fn test_transposed_and_reversed_outputs() -> Result<(), ErrPack<TensorOpError>> {
	let dev = cpu();
	let queue = queue_on(&dev);
	let a = ArrayView::from_slice(&dev, &[2, 3], &[1_i32, 2, 3, 4, 5, 6])?;
	let b = ArrayView::from_slice(&dev, &[3], &[10_i32, 20, 30])?;

	let store = ArrayView::zeros(&dev, DType::I32, &[6])?;
	let transposed = ArrayView::new(store.buffer().clone(), DType::I32, &[2, 3], &[1, 2], 0)?;
	multiply_and_wait(&queue, &a, &b, &transposed)?;
	assert_eq!(transposed.to_vec::<i32>()?, vec![10, 40, 90, 40, 100, 180]);
	assert_eq!(store.to_vec::<i32>()?, vec![10, 40, 40, 100, 90, 180]);

	let store = ArrayView::zeros(&dev, DType::I32, &[6])?;
	let reversed = ArrayView::new(store.buffer().clone(), DType::I32, &[2, 3], &[-3, -1], 5)?;
	multiply_and_wait(&queue, &a, &b, &reversed)?;
	assert_eq!(store.to_vec::<i32>()?, vec![180, 100, 40, 90, 40, 10]);
	Ok(())
}

#[test]
fn test_multiply_errors() -> Result<(), ErrPack<TensorOpError>> {
	let dev = cpu();
	let queue = queue_on(&dev);
	let i = ArrayView::zeros(&dev, DType::I32, &[3])?;
	let f = ArrayView::zeros(&dev, DType::F32, &[3])?;
	let code = |r: Result<ops::Submission, ErrPack<TensorOpError>>| r.map(|_| ()).map_err(|e| e.code);

	assert_eq!(
		code(ops::multiply(&queue, &i, &f, &f, &[])),
		Err(TensorOpError::UnsupportedDType)
	);
	assert_eq!(code(ops::multiply(&queue, &i, &i, &f, &[])), Err(TensorOpError::DTypeMismatch));

	let wide = ArrayView::zeros(&dev, DType::I32, &[2, 3])?;
	assert_eq!(
		code(ops::multiply(&queue, &wide, &i, &i, &[])),
		Err(TensorOpError::CannotBroadcastOutput)
	);
	let four = ArrayView::zeros(&dev, DType::I32, &[4])?;
	assert_eq!(code(ops::multiply(&queue, &four, &i, &i, &[])), Err(TensorOpError::ShapeMismatch));

	// a stride 0 output would make work-items write the same element
	let aliased = ArrayView::new(i.buffer().clone(), DType::I32, &[3], &[0], 0)?;
	assert_eq!(
		code(ops::multiply(&queue, &i, &i, &aliased, &[])),
		Err(TensorOpError::CannotBroadcastOutput)
	);

	// rows that share elements
	let square = ArrayView::zeros(&dev, DType::I32, &[2, 2])?;
	let buf3 = ArrayView::zeros(&dev, DType::I32, &[3])?;
	let overlapping = ArrayView::new(buf3.buffer().clone(), DType::I32, &[2, 2], &[1, 1], 0)?;
	assert_eq!(
		code(ops::multiply(&queue, &square, &square, &overlapping, &[])),
		Err(TensorOpError::OverlappingOutput)
	);
	assert_eq!(buf3.to_vec::<i32>()?, vec![0, 0, 0]);

	let other: Arc<dyn Device> = CPUDevice::new();
	let foreign = ArrayView::zeros(&other, DType::I32, &[3])?;
	assert_eq!(
		code(ops::multiply(&queue, &i, &foreign, &i, &[])),
		Err(TensorOpError::DeviceMismatch)
	);
	Ok(())
}

#[test]
fn test_scratch_allocation_failure() -> Result<(), ErrPack<TensorOpError>> {
	// room for the arrays, not for the padded row of 3 + 32 elements
	let dev = CPUDevice::with_config(CPUDeviceConfig::default().with_alloc_limit(100));
	let dyn_dev: Arc<dyn Device> = dev.clone();
	let queue = queue_on(&dyn_dev);
	let mat = ArrayView::from_slice(&dyn_dev, &[2, 3], &[1_i32, 2, 3, 4, 5, 6])?;
	let row = ArrayView::from_slice(&dyn_dev, &[3], &[10_i32, 20, 30])?;
	let out = ArrayView::zeros(&dyn_dev, DType::I32, &[2, 3])?;
	assert_eq!(dev.live_allocations(), 3);

	let err = ops::multiply(&queue, &mat, &row, &out, &[]).unwrap_err();
	assert_eq!(err.code, TensorOpError::DevBufAllocFailed);
	queue.wait();
	// nothing was submitted
	assert_eq!(out.to_vec::<i32>()?, vec![0; 6]);
	assert_eq!(dev.live_allocations(), 3);

	// the strided path needs no scratch
	multiply_strided(&queue, &mat, &row, &out)?;
	assert_eq!(out.to_vec::<i32>()?, vec![10, 40, 90, 40, 100, 180]);
	Ok(())
}

#[test]
fn test_f16_products() -> Result<(), ErrPack<TensorOpError>> {
	let dev = cpu();
	let queue = queue_on(&dev);
	let data: Vec<f16> = (0..70).map(|i| f16::from_f32(i as f32 * 0.5)).collect();
	let a = ArrayView::from_slice(&dev, &[70], &data)?;
	let b = ArrayView::from_slice(&dev, &[70], &vec![f16::from_f32(-2.0); 70])?;
	let out = ArrayView::zeros(&dev, DType::F16, &[70])?;
	multiply_and_wait(&queue, &a, &b, &out)?;
	for (i, v) in out.to_vec::<f16>()?.iter().enumerate() {
		assert_approx_eq!(v.to_f32(), -(i as f32));
	}
	Ok(())
}
