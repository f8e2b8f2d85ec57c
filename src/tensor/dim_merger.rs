//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use smallvec::{SmallVec, smallvec};

use crate::util::cold_path;

use super::array::{INLINE_DIMS, SizeAndStride};

//--------------------------------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MergedDim<const N: usize> {
	pub size: usize,
	pub strides: [isize; N],
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DimsDontMatchError;

pub type MergedDims<const N: usize> = SmallVec<[MergedDim<N>; INLINE_DIMS]>;

pub struct DimMerger<const N: usize>;

impl<const N: usize> DimMerger<N> {
	/// Finds common size and resets stride to 0 for broadcasted inputs
	///
	/// If there are no inputs (N == 0), this function always returns size = 1.
	pub fn merge_single_dim(dim: [SizeAndStride; N]) -> Result<MergedDim<N>, DimsDontMatchError> {
		let size = dim.iter().fold(1, |size, inp| if size == 1 { inp.size } else { size });
		let mut strides = [0; N];
		for (stride, inp) in strides.iter_mut().zip(dim.iter()) {
			if inp.size == size {
				*stride = inp.stride;
			} else if inp.size != 1 {
				cold_path();
				return Err(DimsDontMatchError);
			}
		}
		Ok(MergedDim { size, strides })
	}

	/// Simplifies the common iteration space of `inputs`.
	///
	/// Inputs are aligned at their last dimension. Dimensions of size 1 are
	/// dropped and neighbours that are laid out one after another in every
	/// input are fused. The result is in C order (outermost first). It is empty
	/// when the iteration space has exactly one element, and it is a single
	/// dimension of size 0 when the iteration space is empty.
	pub fn merge(inputs: [&[SizeAndStride]; N]) -> Result<MergedDims<N>, DimsDontMatchError> {
		// Get the max len of the input slices, or 0 if N == 0.
		let ndim = inputs.iter().map(|inp| inp.len()).max().unwrap_or(0);

		// Built from the innermost dimension outwards. Starting with `size == 1` and
		// `strides = [1; N]` lets a contiguous innermost dimension extend the initial value.
		let mut dims: MergedDims<N> = smallvec![MergedDim { size: 1, strides: [1; N] }];

		for index_from_end in 1..=ndim {
			// Some inputs may be shorter. We extend them with dummy dimensions.
			let next_dim = inputs.map(|inp| {
				if index_from_end <= inp.len() {
					inp[inp.len() - index_from_end]
				} else {
					SizeAndStride { size: 1, stride: 0 }
				}
			});

			let next_dim = Self::merge_single_dim(next_dim)?;
			let Some(prev_dim) = dims.last_mut() else {
				break;
			};

			if next_dim.size > 1 {
				if (0..N).all(|i| next_dim.strides[i] == prev_dim.size as isize * prev_dim.strides[i])
				{
					// Fast path: Extend the previous dimension
					prev_dim.size *= next_dim.size;
				} else if prev_dim.size == 1 {
					*prev_dim = next_dim;
				} else {
					cold_path();
					dims.push(next_dim);
				}
			} else if next_dim.size == 0 {
				cold_path();
				dims.clear();
				dims.push(MergedDim { size: 0, strides: [0; N] });
				return Ok(dims);
			}
		}

		if dims.len() == 1 && dims[0].size == 1 {
			dims.clear();
		}
		dims.reverse();
		Ok(dims)
	}
}

//--------------------------------------------------------------------------------------------------

/// Splits `merged` into `[shape; nd]` and `[strides; nd]` of each input, in the
/// packed layout the strided kernels take.
pub fn pack_shape_and_strides<const N: usize>(merged: &[MergedDim<N>]) -> SmallVec<[isize; 16]> {
	let nd = merged.len();
	let mut packed = SmallVec::with_capacity((N + 1) * nd);
	packed.extend(merged.iter().map(|dim| dim.size as isize));
	for i in 0..N {
		packed.extend(merged.iter().map(|dim| dim.strides[i]));
	}
	packed
}

//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;

	fn dims(sizes: &[usize], strides: &[isize]) -> Vec<SizeAndStride> {
		sizes.iter().zip(strides).map(|(&size, &stride)| SizeAndStride { size, stride }).collect()
	}

	#[test]
	fn test_contiguous_merges_to_one_dim() {
		let a = dims(&[2, 3, 4], &[12, 4, 1]);
		let b = dims(&[2, 3, 4], &[12, 4, 1]);
		let merged = DimMerger::<2>::merge([&a, &b]).unwrap();
		assert_eq!(merged.as_slice(), &[MergedDim { size: 24, strides: [1, 1] }]);
	}

	#[test]
	fn test_broadcast_row_stays_two_dims() {
		let mat = dims(&[5, 7], &[7, 1]);
		let row = dims(&[7], &[1]);
		let merged = DimMerger::<2>::merge([&mat, &row]).unwrap();
		assert_eq!(
			merged.as_slice(),
			&[MergedDim { size: 5, strides: [7, 0] }, MergedDim { size: 7, strides: [1, 1] }]
		);
	}

	#[test]
	fn test_size_one_dims_are_dropped() {
		let a = dims(&[1, 3, 1, 2], &[100, 30, 7, 10]);
		let merged = DimMerger::<1>::merge([&a]).unwrap();
		assert_eq!(
			merged.as_slice(),
			&[MergedDim { size: 3, strides: [30] }, MergedDim { size: 2, strides: [10] }]
		);

		// 3 rows of stride 20 follow each other exactly
		let b = dims(&[1, 3, 1, 2], &[100, 20, 7, 10]);
		let merged = DimMerger::<1>::merge([&b]).unwrap();
		assert_eq!(merged.as_slice(), &[MergedDim { size: 6, strides: [10] }]);
	}

	#[test]
	fn test_scalar_and_empty() {
		let one = dims(&[1, 1], &[5, 9]);
		assert!(DimMerger::<1>::merge([&one]).unwrap().is_empty());

		let empty = dims(&[3, 0, 2], &[2, 2, 1]);
		let merged = DimMerger::<1>::merge([&empty]).unwrap();
		assert_eq!(merged.as_slice(), &[MergedDim { size: 0, strides: [0] }]);
	}

	#[test]
	fn test_mismatch() {
		let a = dims(&[2, 3], &[3, 1]);
		let b = dims(&[4], &[1]);
		assert_eq!(DimMerger::<2>::merge([&a, &b]), Err(DimsDontMatchError));
	}

	#[test]
	fn test_negative_strides() {
		let a = dims(&[2, 3], &[-3, -1]);
		let merged = DimMerger::<1>::merge([&a]).unwrap();
		assert_eq!(merged.as_slice(), &[MergedDim { size: 6, strides: [-1] }]);
	}

	#[test]
	fn test_pack() {
		let merged = [MergedDim { size: 5, strides: [7, 0] }, MergedDim { size: 7, strides: [1, 1] }];
		assert_eq!(pack_shape_and_strides(&merged).as_slice(), &[5, 7, 7, 1, 0, 1]);
	}
}
