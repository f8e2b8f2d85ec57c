//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use crate::dispatch_dtype;
use crate::tensor::device::dtype::{DType, Element};

use super::elementwise::BinaryFunctor;

//--------------------------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BinaryTypeMapEntry {
	pub lhs: DType,
	pub rhs: DType,
	pub result: DType,
}

/// Scans `entries` in order. The first entry matching both operand types wins.
pub fn resolve_binary(entries: &[BinaryTypeMapEntry], lhs: DType, rhs: DType) -> Option<DType> {
	entries.iter().find(|e| e.lhs == lhs && e.rhs == rhs).map(|e| e.result)
}

/// The supported operand pairs of one binary operation.
///
/// Implemented by `binary_type_map!`, which also checks at compile time that
/// every listed result type is what the functor produces.
pub trait BinaryTypeMap {
	type Op;

	const ENTRIES: &'static [BinaryTypeMapEntry];

	fn resolve(lhs: DType, rhs: DType) -> Option<DType> {
		resolve_binary(Self::ENTRIES, lhs, rhs)
	}

	/// Instantiates `F` for the pair `(lhs, rhs)`. Pairs that are not listed give `None`.
	fn make<F: BinaryKernelFactory<Self::Op>>(lhs: DType, rhs: DType) -> Option<F::Fn>;
}

//--------------------------------------------------------------------------------------------------

pub trait BinaryKernelFactory<Op> {
	type Fn: Copy;

	fn make<A: Element, B: Element>() -> Option<Self::Fn>
	where
		Op: BinaryFunctor<A, B>;
}

pub trait UnaryKernelFactory {
	type Fn: Copy;

	fn make<T: Element>() -> Option<Self::Fn>;
}

//--------------------------------------------------------------------------------------------------

/// `DType::COUNT` x `DType::COUNT` table indexed by `(lhs, rhs)`.
pub struct DispatchTable2<F> {
	table: [[Option<F>; DType::COUNT]; DType::COUNT],
}

impl<F: Copy> DispatchTable2<F> {
	pub fn build(mut make: impl FnMut(DType, DType) -> Option<F>) -> Self {
		let table = std::array::from_fn(|i| {
			std::array::from_fn(|j| make(DType::ALL[i], DType::ALL[j]))
		});
		Self { table }
	}

	pub fn from_type_map<M: BinaryTypeMap, Fac: BinaryKernelFactory<M::Op, Fn = F>>() -> Self {
		Self::build(M::make::<Fac>)
	}

	#[inline]
	pub fn get(&self, lhs: DType, rhs: DType) -> Option<F> {
		self.table[lhs.index()][rhs.index()]
	}

	pub fn count(&self) -> usize {
		self.table.iter().flatten().filter(|f| f.is_some()).count()
	}
}

/// Table indexed by a single `DType`.
pub struct DispatchVector<F> {
	table: [Option<F>; DType::COUNT],
}

impl<F: Copy> DispatchVector<F> {
	pub fn build(make: impl FnMut(DType) -> Option<F>) -> Self {
		Self { table: DType::ALL.map(make) }
	}

	pub fn from_factory<Fac: UnaryKernelFactory<Fn = F>>() -> Self {
		Self::build(|dtype| dispatch_dtype!(dtype, T => Fac::make::<T>()))
	}

	#[inline]
	pub fn get(&self, dtype: DType) -> Option<F> {
		self.table[dtype.index()]
	}

	pub fn count(&self) -> usize {
		self.table.iter().filter(|f| f.is_some()).count()
	}
}

//--------------------------------------------------------------------------------------------------

/// Declares a `BinaryTypeMap` listing the supported `(lhs, rhs) => result` pairs
/// of a functor, in lookup order.
#[macro_export]
macro_rules! binary_type_map {
	(
		$(#[$meta:meta])*
		$vis:vis struct $name:ident for $op:ty {
			$($lhs:ty, $rhs:ty => $res:ty;)*
		}
	) => {
		$(#[$meta])*
		$vis struct $name;

		impl $crate::tensor::device::kernel::type_dispatch::BinaryTypeMap for $name {
			type Op = $op;

			const ENTRIES: &'static [$crate::tensor::device::kernel::type_dispatch::BinaryTypeMapEntry] = &[
				$(
					$crate::tensor::device::kernel::type_dispatch::BinaryTypeMapEntry {
						lhs: <$lhs as $crate::tensor::device::dtype::HasDType>::dtype,
						rhs: <$rhs as $crate::tensor::device::dtype::HasDType>::dtype,
						result: <$res as $crate::tensor::device::dtype::HasDType>::dtype,
					},
				)*
			];

			fn make<F: $crate::tensor::device::kernel::type_dispatch::BinaryKernelFactory<$op>>(
				lhs: $crate::tensor::device::dtype::DType,
				rhs: $crate::tensor::device::dtype::DType,
			) -> Option<F::Fn> {
				$(
					if lhs == <$lhs as $crate::tensor::device::dtype::HasDType>::dtype
						&& rhs == <$rhs as $crate::tensor::device::dtype::HasDType>::dtype
					{
						return F::make::<$lhs, $rhs>();
					}
				)*
				None
			}
		}

		const _: () = {
			$(
				assert!(
					<<$op as $crate::tensor::device::kernel::elementwise::BinaryFunctor<$lhs, $rhs>>::Output
						as $crate::tensor::device::dtype::HasDType>::dtype as u8
						== <$res as $crate::tensor::device::dtype::HasDType>::dtype as u8,
					"functor output does not match the declared result type",
				);
			)*
		};
	};
}

//--------------------------------------------------------------------------------------------------
