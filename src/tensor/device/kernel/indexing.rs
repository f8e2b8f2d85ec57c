//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

//! Indexers turn a logical linear id into element offsets.
//!
//! Multi-dimensional indexers unravel the id in C order (last dimension
//! varies fastest) and take packed `shape_and_strides` arrays:
//! `[shape; nd]` followed by `[strides; nd]` for each array they index.

use smallvec::SmallVec;

use crate::util::cold_path;

//--------------------------------------------------------------------------------------------------

/// Inline capacity of `[shape, s1, s2, s3]` for up to 4 dimensions.
pub const INLINE_PACKED: usize = 16;

type Packed = SmallVec<[isize; INLINE_PACKED]>;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct ShapeStridesLenError;

pub trait Indexer: Clone + Send + Sync + 'static {
	type Offsets: Copy;

	fn offsets(&self, gid: usize) -> Self::Offsets;
}

//--------------------------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TwoOffsets {
	pub first: isize,
	pub second: isize,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ThreeOffsets {
	pub first: isize,
	pub second: isize,
	pub third: isize,
}

//--------------------------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, Default)]
pub struct NoOpIndexer;

impl Indexer for NoOpIndexer {
	type Offsets = isize;

	#[inline]
	fn offsets(&self, gid: usize) -> isize {
		gid as isize
	}
}

/// `offset + min(gid, size - 1) * step`
#[derive(Debug, Copy, Clone)]
pub struct Strided1DIndexer {
	offset: isize,
	size: usize,
	step: isize,
}

impl Strided1DIndexer {
	pub fn new(offset: isize, size: usize, step: isize) -> Self {
		Self { offset, size, step }
	}
}

impl Indexer for Strided1DIndexer {
	type Offsets = isize;

	#[inline]
	fn offsets(&self, gid: usize) -> isize {
		let i = gid.min(self.size.saturating_sub(1));
		self.offset + i as isize * self.step
	}
}

//--------------------------------------------------------------------------------------------------

fn check_packed(nd: usize, arrays: usize, len: usize) -> Result<(), ShapeStridesLenError> {
	if nd.checked_mul(arrays + 1) != Some(len) {
		cold_path();
		return Err(ShapeStridesLenError);
	}
	Ok(())
}

/// Unravels `gid` and accumulates one offset per strides block.
#[inline]
fn unravel_offsets<const N: usize>(nd: usize, packed: &[isize], gid: usize) -> [isize; N] {
	let mut offsets = [0; N];
	let mut rest = gid;
	for d in (0..nd).rev() {
		let size = packed[d] as usize;
		let i = (rest % size) as isize;
		rest /= size;
		for (k, offset) in offsets.iter_mut().enumerate() {
			*offset += i * packed[(k + 1) * nd + d];
		}
	}
	offsets
}

/// Offsets into one array from packed `[shape, strides]`.
#[derive(Debug, Clone)]
pub struct StridedIndexer {
	nd: usize,
	offset: isize,
	shape_strides: Packed,
}

impl StridedIndexer {
	pub fn new(nd: usize, offset: isize, shape_strides: &[isize]) -> Result<Self, ShapeStridesLenError> {
		check_packed(nd, 1, shape_strides.len())?;
		Ok(Self { nd, offset, shape_strides: shape_strides.into() })
	}
}

impl Indexer for StridedIndexer {
	type Offsets = isize;

	#[inline]
	fn offsets(&self, gid: usize) -> isize {
		let [off] = unravel_offsets::<1>(self.nd, &self.shape_strides, gid);
		self.offset + off
	}
}

/// Same as `StridedIndexer`, but shape and strides come from separate arrays.
#[derive(Debug, Clone)]
pub struct UnpackedStridedIndexer {
	inner: StridedIndexer,
}

impl UnpackedStridedIndexer {
	pub fn new(
		nd: usize,
		offset: isize,
		shape: &[isize],
		strides: &[isize],
	) -> Result<Self, ShapeStridesLenError> {
		if shape.len() != nd || strides.len() != nd {
			cold_path();
			return Err(ShapeStridesLenError);
		}
		let shape_strides: Packed = shape.iter().chain(strides).copied().collect();
		Ok(Self {
			inner: StridedIndexer { nd, offset, shape_strides },
		})
	}
}

impl Indexer for UnpackedStridedIndexer {
	type Offsets = isize;

	#[inline]
	fn offsets(&self, gid: usize) -> isize {
		self.inner.offsets(gid)
	}
}

/// Offsets into two arrays from packed `[shape, strides1, strides2]`.
#[derive(Debug, Clone)]
pub struct TwoOffsetsStridedIndexer {
	nd: usize,
	offsets: [isize; 2],
	shape_strides: Packed,
}

impl TwoOffsetsStridedIndexer {
	pub fn new(
		nd: usize,
		first_offset: isize,
		second_offset: isize,
		shape_strides: &[isize],
	) -> Result<Self, ShapeStridesLenError> {
		check_packed(nd, 2, shape_strides.len())?;
		Ok(Self {
			nd,
			offsets: [first_offset, second_offset],
			shape_strides: shape_strides.into(),
		})
	}

	pub fn shape_strides(&self) -> &[isize] {
		&self.shape_strides
	}
}

impl Indexer for TwoOffsetsStridedIndexer {
	type Offsets = TwoOffsets;

	#[inline]
	fn offsets(&self, gid: usize) -> TwoOffsets {
		let [a, b] = unravel_offsets::<2>(self.nd, &self.shape_strides, gid);
		TwoOffsets {
			first: self.offsets[0] + a,
			second: self.offsets[1] + b,
		}
	}
}

/// Offsets into three arrays from packed `[shape, strides1, strides2, strides3]`.
#[derive(Debug, Clone)]
pub struct ThreeOffsetsStridedIndexer {
	nd: usize,
	offsets: [isize; 3],
	shape_strides: Packed,
}

impl ThreeOffsetsStridedIndexer {
	pub fn new(
		nd: usize,
		first_offset: isize,
		second_offset: isize,
		third_offset: isize,
		shape_strides: &[isize],
	) -> Result<Self, ShapeStridesLenError> {
		check_packed(nd, 3, shape_strides.len())?;
		Ok(Self {
			nd,
			offsets: [first_offset, second_offset, third_offset],
			shape_strides: shape_strides.into(),
		})
	}
}

impl Indexer for ThreeOffsetsStridedIndexer {
	type Offsets = ThreeOffsets;

	#[inline]
	fn offsets(&self, gid: usize) -> ThreeOffsets {
		let [a, b, c] = unravel_offsets::<3>(self.nd, &self.shape_strides, gid);
		ThreeOffsets {
			first: self.offsets[0] + a,
			second: self.offsets[1] + b,
			third: self.offsets[2] + c,
		}
	}
}

/// Pairs two single-offset indexers evaluated at the same id.
#[derive(Debug, Clone)]
pub struct TwoOffsetsCombinedIndexer<A, B> {
	first: A,
	second: B,
}

impl<A, B> TwoOffsetsCombinedIndexer<A, B> {
	pub fn new(first: A, second: B) -> Self {
		Self { first, second }
	}
}

impl<A, B> Indexer for TwoOffsetsCombinedIndexer<A, B>
where
	A: Indexer<Offsets = isize>,
	B: Indexer<Offsets = isize>,
{
	type Offsets = TwoOffsets;

	#[inline]
	fn offsets(&self, gid: usize) -> TwoOffsets {
		TwoOffsets {
			first: self.first.offsets(gid),
			second: self.second.offsets(gid),
		}
	}
}

//--------------------------------------------------------------------------------------------------
