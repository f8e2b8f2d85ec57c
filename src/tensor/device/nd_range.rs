//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use std::ops::Range;

use rayon::prelude::*;

use crate::util::cold_path;

//--------------------------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct InvalidNdRangeError;

/// A global range split into equally sized work-groups.
///
/// Dimensions are in C order: the last one varies fastest.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct NdRange<const D: usize> {
	global: [usize; D],
	local: [usize; D],
}

impl<const D: usize> NdRange<D> {
	/// `local` must be nonzero and divide `global` in every dimension.
	pub fn new(global: [usize; D], local: [usize; D]) -> Result<Self, InvalidNdRangeError> {
		if global.iter().zip(&local).any(|(&g, &l)| l == 0 || g % l != 0) {
			cold_path();
			return Err(InvalidNdRangeError);
		}
		Ok(Self { global, local })
	}

	/// `groups` work-groups of size `local` in every dimension. Zero local sizes are raised to 1.
	pub fn from_group_range(groups: [usize; D], local: [usize; D]) -> Self {
		let local = local.map(|l| l.max(1));
		Self {
			global: std::array::from_fn(|d| groups[d] * local[d]),
			local,
		}
	}

	pub fn global_range(&self) -> [usize; D] {
		self.global
	}

	pub fn local_range(&self) -> [usize; D] {
		self.local
	}

	pub fn group_range(&self) -> [usize; D] {
		std::array::from_fn(|d| self.global[d] / self.local[d])
	}

	pub fn group_count(&self) -> usize {
		self.group_range().iter().product()
	}

	pub fn local_linear_range(&self) -> usize {
		self.local.iter().product()
	}
}

fn unravel<const D: usize>(mut linear: usize, range: &[usize; D]) -> [usize; D] {
	let mut id = [0; D];
	for d in (0..D).rev() {
		id[d] = linear % range[d];
		linear /= range[d];
	}
	id
}

fn ravel<const D: usize>(id: &[usize; D], range: &[usize; D]) -> usize {
	id.iter().zip(range).fold(0, |acc, (&i, &r)| acc * r + i)
}

//--------------------------------------------------------------------------------------------------

/// One work-item of an nd-range launch.
#[derive(Debug, Copy, Clone)]
pub struct NdItem<const D: usize> {
	group: [usize; D],
	local: [usize; D],
	range: NdRange<D>,
	sub_group_size: usize,
}

impl<const D: usize> NdItem<D> {
	pub fn group_id(&self, dim: usize) -> usize {
		self.group[dim]
	}

	pub fn local_id(&self, dim: usize) -> usize {
		self.local[dim]
	}

	pub fn global_id(&self, dim: usize) -> usize {
		self.group[dim] * self.range.local[dim] + self.local[dim]
	}

	pub fn local_range(&self, dim: usize) -> usize {
		self.range.local[dim]
	}

	pub fn local_linear_id(&self) -> usize {
		ravel(&self.local, &self.range.local)
	}

	pub fn sub_group_size(&self) -> usize {
		self.sub_group_size
	}

	/// Index of the sub-group within the work-group.
	pub fn sub_group_id(&self) -> usize {
		self.local_linear_id() / self.sub_group_size
	}

	/// Lane of the work-item within its sub-group.
	pub fn sub_group_local_id(&self) -> usize {
		self.local_linear_id() % self.sub_group_size
	}
}

//--------------------------------------------------------------------------------------------------

/// A work-group. All its work-items are executed by one thread, so the group
/// collectives below see every item.
#[derive(Debug, Copy, Clone)]
pub struct Group<const D: usize> {
	id: [usize; D],
	range: NdRange<D>,
	sub_group_size: usize,
}

impl<const D: usize> Group<D> {
	pub fn id(&self, dim: usize) -> usize {
		self.id[dim]
	}

	pub fn linear_id(&self) -> usize {
		ravel(&self.id, &self.range.group_range())
	}

	pub fn local_range(&self, dim: usize) -> usize {
		self.range.local[dim]
	}

	pub fn local_linear_range(&self) -> usize {
		self.range.local_linear_range()
	}

	pub fn sub_group_size(&self) -> usize {
		self.sub_group_size
	}

	pub fn items(&self) -> impl Iterator<Item = NdItem<D>> + use<D> {
		let group = *self;
		(0..self.local_linear_range()).map(move |linear| NdItem {
			group: group.id,
			local: unravel(linear, &group.range.local),
			range: group.range,
			sub_group_size: group.sub_group_size,
		})
	}

	/// Every work-item evaluates `pred`, the result is true if any of them returned true.
	pub fn any_of_group(&self, mut pred: impl FnMut(&NdItem<D>) -> bool) -> bool {
		self.items().fold(false, |acc, item| pred(&item) | acc)
	}

	/// Every work-item evaluates `pred`, the result is true if all of them returned true.
	pub fn all_of_group(&self, mut pred: impl FnMut(&NdItem<D>) -> bool) -> bool {
		self.items().fold(true, |acc, item| pred(&item) & acc)
	}

	/// The group cooperatively evaluates `pred` for every index in `range`.
	pub fn joint_any_of(&self, range: Range<usize>, pred: impl FnMut(usize) -> bool) -> bool {
		range.into_iter().any(pred)
	}

	/// The group cooperatively evaluates `pred` for every index in `range`.
	pub fn joint_all_of(&self, range: Range<usize>, pred: impl FnMut(usize) -> bool) -> bool {
		range.into_iter().all(pred)
	}
}

//--------------------------------------------------------------------------------------------------

pub trait NdKernel<const D: usize>: Send + Sync {
	fn run_group(&self, group: &Group<D>);
}

impl<const D: usize, F> NdKernel<D> for F
where
	F: Fn(&Group<D>) + Send + Sync,
{
	fn run_group(&self, group: &Group<D>) {
		self(group);
	}
}

/// Runs all work-groups of `range` on the rayon pool.
pub(crate) fn run_nd<const D: usize, K: NdKernel<D>>(
	range: NdRange<D>,
	max_sub_group_size: usize,
	kernel: &K,
) {
	let group_range = range.group_range();
	let sub_group_size = max_sub_group_size.clamp(1, range.local_linear_range().max(1));
	(0..range.group_count()).into_par_iter().for_each(|linear| {
		let group = Group {
			id: unravel(linear, &group_range),
			range,
			sub_group_size,
		};
		kernel.run_group(&group);
	});
}

//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use std::sync::Mutex;

	use super::*;

	#[test]
	fn test_invalid_nd_range() {
		assert_eq!(NdRange::new([10], [4]), Err(InvalidNdRangeError));
		assert_eq!(NdRange::new([8, 4], [0, 4]), Err(InvalidNdRangeError));
		assert!(NdRange::new([0, 8], [1, 4]).is_ok());
	}

	#[test]
	fn test_every_item_visited_once() {
		let range = NdRange::new([3, 12], [1, 4]).unwrap();
		assert_eq!(range.group_range(), [3, 3]);
		let seen = Mutex::new(Vec::new());
		run_nd(range, 2, &|group: &Group<2>| {
			assert_eq!(group.sub_group_size(), 2);
			for item in group.items() {
				assert_eq!(item.global_id(0), group.id(0));
				seen.lock().unwrap().push((item.global_id(0), item.global_id(1)));
			}
		});
		let mut seen = seen.into_inner().unwrap();
		seen.sort_unstable();
		let expected: Vec<_> = (0..3).flat_map(|i| (0..12).map(move |j| (i, j))).collect();
		assert_eq!(seen, expected);
	}

	#[test]
	fn test_group_collectives() {
		let range = NdRange::new([8], [8]).unwrap();
		run_nd(range, 4, &|group: &Group<1>| {
			assert!(group.any_of_group(|item| item.local_id(0) == 7));
			assert!(!group.all_of_group(|item| item.local_id(0) < 7));
			assert!(group.all_of_group(|item| item.sub_group_id() < 2));
			assert!(group.joint_all_of(0..5, |i| i < 5));
			assert!(!group.joint_any_of(0..0, |_| true));
		});
	}
}
