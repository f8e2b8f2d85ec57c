//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use crate::binary_type_map;
use crate::tensor::device::dtype::{Element, HasDType, c64, c128, f16};

use super::elementwise::BinaryFunctor;

//--------------------------------------------------------------------------------------------------

/// Native multiplication: integers wrap, bool is logical and.
pub trait MulElement: Element {
	fn mul(self, rhs: Self) -> Self;
}

impl MulElement for bool {
	#[inline]
	fn mul(self, rhs: Self) -> Self {
		self & rhs
	}
}

macro_rules! impl_wrapping_mul {
	($($t:ty),*) => {
		$(
			impl MulElement for $t {
				#[inline]
				fn mul(self, rhs: Self) -> Self {
					self.wrapping_mul(rhs)
				}
			}
		)*
	};
}

impl_wrapping_mul!(u8, i8, u16, i16, u32, i32, u64, i64);

macro_rules! impl_native_mul {
	($($t:ty),*) => {
		$(
			impl MulElement for $t {
				#[inline]
				fn mul(self, rhs: Self) -> Self {
					self * rhs
				}
			}
		)*
	};
}

impl_native_mul!(f16, f32, f64, c64, c128);

//--------------------------------------------------------------------------------------------------

#[derive(Debug, Default, Copy, Clone)]
pub struct MultiplyFunctor;

impl<T: MulElement> BinaryFunctor<T, T> for MultiplyFunctor {
	type Output = T;

	const SUPPORTS_VEC: bool = !<T as HasDType>::dtype.is_complex();
	const SUPPORTS_SG_LOADSTORE: bool = !<T as HasDType>::dtype.is_complex();

	#[inline]
	fn apply(&self, a: T, b: T) -> T {
		a.mul(b)
	}
}

binary_type_map! {
	pub struct MultiplyTypeMap for MultiplyFunctor {
		bool, bool => bool;
		u8, u8 => u8;
		i8, i8 => i8;
		u16, u16 => u16;
		i16, i16 => i16;
		u32, u32 => u32;
		i32, i32 => i32;
		u64, u64 => u64;
		i64, i64 => i64;
		f16, f16 => f16;
		f32, f32 => f32;
		f64, f64 => f64;
		c64, c64 => c64;
		c128, c128 => c128;
	}
}

//--------------------------------------------------------------------------------------------------
