//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use crate::ErrPack;

use super::device::DevBufAllocFailedError;
use super::device::dtype::DTypeMismatchError;
use super::device::kernel::indexing::ShapeStridesLenError;
use super::device::nd_range::InvalidNdRangeError;

//--------------------------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct UnsupportedDTypeError;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct CannotBroadcastOutputError;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct InvalidBufferSizeError;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct ShapeMismatchError;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct InvalidAxisError;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct NotOnCPUDeviceError;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct DeviceMismatchError;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TensorOpError {
	UnsupportedDType,
	DTypeMismatch,
	ShapeMismatch,
	CannotBroadcastOutput,
	OverlappingOutput,
	InvalidShape,
	InvalidAxis,
	InvalidBufferSize,
	InvalidNdRange,
	ElementsOverflow,
	DevBufAllocFailed,
	NotOnCPUDevice,
	DeviceMismatch,
	KernelFailed,
}

macro_rules! impl_from_marker_error {
	($($err:ty => $code:ident),* $(,)?) => {
		$(
			impl From<$err> for TensorOpError {
				fn from(_: $err) -> Self {
					Self::$code
				}
			}

			impl From<$err> for ErrPack<TensorOpError> {
				#[cold]
				#[inline(never)]
				fn from(_: $err) -> Self {
					Self { code: TensorOpError::$code, extra: None }
				}
			}
		)*
	};
}

impl_from_marker_error!(
	UnsupportedDTypeError => UnsupportedDType,
	DTypeMismatchError => DTypeMismatch,
	ShapeMismatchError => ShapeMismatch,
	CannotBroadcastOutputError => CannotBroadcastOutput,
	InvalidAxisError => InvalidAxis,
	InvalidBufferSizeError => InvalidBufferSize,
	InvalidNdRangeError => InvalidNdRange,
	ShapeStridesLenError => InvalidShape,
	DevBufAllocFailedError => DevBufAllocFailed,
	NotOnCPUDeviceError => NotOnCPUDevice,
	DeviceMismatchError => DeviceMismatch,
);

impl From<TensorOpError> for ErrPack<TensorOpError> {
	#[cold]
	#[inline(never)]
	fn from(code: TensorOpError) -> Self {
		Self { code, extra: None }
	}
}

//--------------------------------------------------------------------------------------------------
