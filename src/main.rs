//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use std::sync::Arc;

use x17kernels::ErrPack;
use x17kernels::tensor::device::{CPUDevice, Device, Queue};
use x17kernels::tensor::{ArrayView, DType, TensorOpError, ops};

fn run() -> Result<(), ErrPack<TensorOpError>> {
	let dev: Arc<dyn Device> = CPUDevice::new();
	let queue = Queue::new(dev.clone());

	let mat = ArrayView::from_slice(&dev, &[2, 3], &[1_i32, 2, 3, 4, 5, 6])?;
	let row = ArrayView::from_slice(&dev, &[3], &[10_i32, 20, 30])?;
	let product = ArrayView::zeros(&dev, DType::I32, &[2, 3])?;
	ops::multiply(&queue, &mat, &row, &product, &[])?.wait()?;
	println!("[[1, 2, 3], [4, 5, 6]] * [10, 20, 30] = {:?}", product.to_vec::<i32>()?);

	let src = ArrayView::from_slice(&dev, &[2, 2], &[0_i32, 0, 0, 5])?;
	let any = ArrayView::zeros(&dev, DType::I32, &[2])?;
	let all = ArrayView::zeros(&dev, DType::I32, &[2])?;
	let any_sub = ops::any(&queue, &src, &[1], &any, &[])?;
	let all_sub = ops::all(&queue, &src, &[1], &all, &[])?;
	any_sub.wait()?;
	all_sub.wait()?;
	println!("any([[0, 0], [0, 5]], axis=1) = {:?}", any.to_vec::<i32>()?);
	println!("all([[0, 0], [0, 5]], axis=1) = {:?}", all.to_vec::<i32>()?);

	let nan = ArrayView::from_slice(&dev, &[3], &[0.0_f32, f32::NAN, 0.0])?;
	let out = ArrayView::zeros(&dev, DType::I32, &[])?;
	ops::any(&queue, &nan, &[0], &out, &[])?.wait()?;
	println!("any([0.0, NaN, 0.0]) = {:?}", out.to_vec::<i32>()?);

	Ok(())
}

fn main() {
	let verbosity = std::env::args().filter(|arg| arg == "-v").count();
	if let Err(err) = stderrlog::new().module("x17kernels").verbosity(verbosity + 1).init() {
		eprintln!("cannot initialize logging: {err}");
	}

	if let Err(err) = run() {
		log::error!("{err}");
		std::process::exit(1);
	}
}
