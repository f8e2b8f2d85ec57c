//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

pub mod array;
pub mod device;
pub mod dim_merger;
pub mod error;
pub mod ops;

#[cfg(test)]
mod tests;

pub use array::{ArrayView, SizeAndStride};
pub use device::dtype::{DType, Element, HasDType};
pub use error::TensorOpError;
pub use ops::{Submission, all, any, multiply};

//--------------------------------------------------------------------------------------------------
