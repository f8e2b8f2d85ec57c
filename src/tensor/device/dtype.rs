//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

pub use half::f16;
use num_complex::Complex;

use crate::util::cold_path;

//--------------------------------------------------------------------------------------------------

/// Large enough for `Complex<f64>`.
pub const MAX_DTYPE_ALIGN: usize = 16;

pub type c64 = Complex<f32>;
pub type c128 = Complex<f64>;

/// Element type tags.
///
/// The declaration order is the promotion lookup order: bool, then integers
/// from narrowest to widest, then floats, then complex.
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub enum DType {
	Bool = 0,
	U8,
	I8,
	U16,
	I16,
	U32,
	I32,
	U64,
	I64,
	F16,
	F32,
	F64,
	C64,
	C128,
}

#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum DTypeKind {
	Bool,
	Uint,
	Int,
	Float,
	Complex,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct DTypeMismatchError;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct UnknownDTypeError;

impl DType {
	pub const COUNT: usize = 14;

	pub const ALL: [Self; Self::COUNT] = [
		Self::Bool,
		Self::U8,
		Self::I8,
		Self::U16,
		Self::I16,
		Self::U32,
		Self::I32,
		Self::U64,
		Self::I64,
		Self::F16,
		Self::F32,
		Self::F64,
		Self::C64,
		Self::C128,
	];

	#[inline]
	pub const fn index(self) -> usize {
		self as usize
	}

	pub const fn kind(self) -> DTypeKind {
		match self {
			Self::Bool => DTypeKind::Bool,
			Self::U8 | Self::U16 | Self::U32 | Self::U64 => DTypeKind::Uint,
			Self::I8 | Self::I16 | Self::I32 | Self::I64 => DTypeKind::Int,
			Self::F16 | Self::F32 | Self::F64 => DTypeKind::Float,
			Self::C64 | Self::C128 => DTypeKind::Complex,
		}
	}

	pub const fn bytes(self) -> usize {
		match self {
			Self::Bool | Self::U8 | Self::I8 => 1,
			Self::U16 | Self::I16 | Self::F16 => 2,
			Self::U32 | Self::I32 | Self::F32 => 4,
			Self::U64 | Self::I64 | Self::F64 | Self::C64 => 8,
			Self::C128 => 16,
		}
	}

	/// Complex numbers are aligned to their component type.
	pub const fn align(self) -> usize {
		match self {
			Self::C64 => 4,
			Self::C128 => 8,
			_ => self.bytes(),
		}
	}

	pub const fn is_complex(self) -> bool {
		matches!(self.kind(), DTypeKind::Complex)
	}

	pub fn array_bytes(self, elems: usize) -> Option<usize> {
		elems.checked_mul(self.bytes())
	}

	pub const fn name(self) -> &'static str {
		match self {
			Self::Bool => "bool",
			Self::U8 => "u8",
			Self::I8 => "i8",
			Self::U16 => "u16",
			Self::I16 => "i16",
			Self::U32 => "u32",
			Self::I32 => "i32",
			Self::U64 => "u64",
			Self::I64 => "i64",
			Self::F16 => "f16",
			Self::F32 => "f32",
			Self::F64 => "f64",
			Self::C64 => "c64",
			Self::C128 => "c128",
		}
	}
}

impl std::str::FromStr for DType {
	type Err = UnknownDTypeError;

	fn from_str(s: &str) -> Result<Self, UnknownDTypeError> {
		if let Some(dtype) = Self::ALL.into_iter().find(|dtype| dtype.name() == s) {
			Ok(dtype)
		} else {
			cold_path();
			Err(UnknownDTypeError)
		}
	}
}

impl std::fmt::Display for DType {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "{}", self.name())
	}
}

//--------------------------------------------------------------------------------------------------

pub trait HasDType: Copy + Send + Sync + 'static {
	const dtype: DType;
}

/// A type that can be stored in a device buffer and read by kernels.
pub trait Element: HasDType + Default + PartialEq + std::fmt::Debug {
	/// Numeric to bool conversion: nonzero is `true`, NaN is `true`.
	fn to_bool(self) -> bool;
}

impl HasDType for bool {
	const dtype: DType = DType::Bool;
}

impl Element for bool {
	#[inline]
	fn to_bool(self) -> bool {
		self
	}
}

macro_rules! impl_int_element {
	($($t:ty => $dtype:ident),* $(,)?) => {
		$(
			impl HasDType for $t {
				const dtype: DType = DType::$dtype;
			}

			impl Element for $t {
				#[inline]
				fn to_bool(self) -> bool {
					self != 0
				}
			}
		)*
	};
}

impl_int_element!(
	u8 => U8,
	i8 => I8,
	u16 => U16,
	i16 => I16,
	u32 => U32,
	i32 => I32,
	u64 => U64,
	i64 => I64,
);

// NaN compares unequal to zero, so it converts to `true`.

impl HasDType for f16 {
	const dtype: DType = DType::F16;
}

impl Element for f16 {
	#[inline]
	fn to_bool(self) -> bool {
		self != f16::ZERO
	}
}

impl HasDType for f32 {
	const dtype: DType = DType::F32;
}

impl Element for f32 {
	#[inline]
	fn to_bool(self) -> bool {
		self != 0.0
	}
}

impl HasDType for f64 {
	const dtype: DType = DType::F64;
}

impl Element for f64 {
	#[inline]
	fn to_bool(self) -> bool {
		self != 0.0
	}
}

impl HasDType for c64 {
	const dtype: DType = DType::C64;
}

impl Element for c64 {
	#[inline]
	fn to_bool(self) -> bool {
		self.re != 0.0 || self.im != 0.0
	}
}

impl HasDType for c128 {
	const dtype: DType = DType::C128;
}

impl Element for c128 {
	#[inline]
	fn to_bool(self) -> bool {
		self.re != 0.0 || self.im != 0.0
	}
}

//--------------------------------------------------------------------------------------------------

/// Expands `$body` once per element type with `$T` bound to the Rust type
/// matching `$dtype`.
#[macro_export]
macro_rules! dispatch_dtype {
	($dtype:expr, $T:ident => $body:expr) => {
		match $dtype {
			$crate::tensor::device::dtype::DType::Bool => {
				type $T = bool;
				$body
			},
			$crate::tensor::device::dtype::DType::U8 => {
				type $T = u8;
				$body
			},
			$crate::tensor::device::dtype::DType::I8 => {
				type $T = i8;
				$body
			},
			$crate::tensor::device::dtype::DType::U16 => {
				type $T = u16;
				$body
			},
			$crate::tensor::device::dtype::DType::I16 => {
				type $T = i16;
				$body
			},
			$crate::tensor::device::dtype::DType::U32 => {
				type $T = u32;
				$body
			},
			$crate::tensor::device::dtype::DType::I32 => {
				type $T = i32;
				$body
			},
			$crate::tensor::device::dtype::DType::U64 => {
				type $T = u64;
				$body
			},
			$crate::tensor::device::dtype::DType::I64 => {
				type $T = i64;
				$body
			},
			$crate::tensor::device::dtype::DType::F16 => {
				type $T = $crate::tensor::device::dtype::f16;
				$body
			},
			$crate::tensor::device::dtype::DType::F32 => {
				type $T = f32;
				$body
			},
			$crate::tensor::device::dtype::DType::F64 => {
				type $T = f64;
				$body
			},
			$crate::tensor::device::dtype::DType::C64 => {
				type $T = $crate::tensor::device::dtype::c64;
				$body
			},
			$crate::tensor::device::dtype::DType::C128 => {
				type $T = $crate::tensor::device::dtype::c128;
				$body
			},
		}
	};
}

//--------------------------------------------------------------------------------------------------


//--------------------------------------------------------------------------------------------------
