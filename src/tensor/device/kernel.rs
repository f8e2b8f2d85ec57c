//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

pub mod boolean_reductions;
pub mod elementwise;
pub mod indexing;
pub mod multiply;
pub mod registry;
pub mod type_dispatch;

pub use registry::{BinaryOpId, BooleanReductionOpId, KernelRegistry};
