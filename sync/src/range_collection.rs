// Copyright 2015-2018 Parity Technologies (UK) Ltd.
// This file is part of Parity.

// Parity is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// Parity is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with Parity.  If not, see <http://www.gnu.org/licenses/>.

//! A collection of values keyed by consecutive block numbers, stored as
//! ranges. Inserting number `n` into a collection holding `n - 1` extends
//! that range; a range that grows to touch its successor swallows it. This
//! is the backing store for the header and body accumulation maps.

use common_types::BlockNumber;

/// Ordered ranges of consecutive block-number keyed values.
#[derive(Debug, Clone)]
pub struct RangeCollection<V> {
	// ranges sorted ascending by start; no two ranges touch or overlap
	ranges: Vec<(BlockNumber, Vec<V>)>,
}

impl<V> Default for RangeCollection<V> {
	fn default() -> Self {
		RangeCollection { ranges: Vec::new() }
	}
}

impl<V> RangeCollection<V> {
	/// Create an empty collection.
	pub fn new() -> Self {
		Self::default()
	}

	/// True if no values are held.
	pub fn is_empty(&self) -> bool {
		self.ranges.is_empty()
	}

	/// Remove everything.
	pub fn clear(&mut self) {
		self.ranges.clear();
	}

	/// Total number of values across all ranges.
	pub fn len(&self) -> usize {
		self.ranges.iter().map(|&(_, ref v)| v.len()).sum()
	}

	/// The lowest range: its starting number and values.
	pub fn first_range(&self) -> Option<(BlockNumber, &[V])> {
		self.ranges.first().map(|&(start, ref v)| (start, v.as_slice()))
	}

	/// Iterate over `(start, values)` pairs in ascending order.
	pub fn ranges(&self) -> impl Iterator<Item = (BlockNumber, &[V])> {
		self.ranges.iter().map(|&(start, ref v)| (start, v.as_slice()))
	}

	// Index of the range that would contain `key`, if any: Ok(i) when range
	// i starts exactly at `key`, Err(i) when it would be inserted at i.
	fn locate(&self, key: BlockNumber) -> Result<usize, usize> {
		self.ranges.binary_search_by(|&(start, _)| start.cmp(&key))
	}

	fn range_containing(&self, key: BlockNumber) -> Option<usize> {
		match self.locate(key) {
			Ok(index) => Some(index),
			Err(index) => {
				let (start, values) = self.ranges.get(index.checked_sub(1)?)?;
				if *start + values.len() as BlockNumber > key {
					Some(index - 1)
				} else {
					None
				}
			},
		}
	}

	/// Check if a value for the given number is present.
	pub fn have_item(&self, key: BlockNumber) -> bool {
		self.range_containing(key).is_some()
	}

	/// Get the value stored for the given number.
	pub fn find_item(&self, key: BlockNumber) -> Option<&V> {
		let index = self.range_containing(key)?;
		let (start, values) = &self.ranges[index];
		values.get((key - start) as usize)
	}

	/// Insert a value for a number not yet present, extending and merging
	/// neighbouring ranges eagerly.
	pub fn insert_item(&mut self, key: BlockNumber, value: V) {
		debug_assert!(!self.have_item(key), "inserting duplicate item");

		let index = match self.locate(key) {
			Ok(index) => index,
			Err(index) => index,
		};

		let extends_previous = index > 0
			&& self.ranges[index - 1].0 + self.ranges[index - 1].1.len() as BlockNumber == key;
		let target = if extends_previous {
			self.ranges[index - 1].1.push(value);
			index - 1
		} else {
			self.ranges.insert(index, (key, vec![value]));
			index
		};

		// merge with the next range if they now touch
		if target + 1 < self.ranges.len() {
			let touch = self.ranges[target].0 + self.ranges[target].1.len() as BlockNumber
				== self.ranges[target + 1].0;
			if touch {
				let (_, mut tail) = self.ranges.remove(target + 1);
				self.ranges[target].1.append(&mut tail);
			}
		}
	}

	/// Remove every value below `from`: whole ranges below it and the head
	/// of the range containing it.
	pub fn remove_head(&mut self, from: BlockNumber) {
		self.ranges.retain(|&(start, ref values)| start + values.len() as BlockNumber > from);
		if let Some(&mut (ref mut start, ref mut values)) = self.ranges.first_mut() {
			if *start < from {
				values.drain(..(from - *start) as usize);
				*start = from;
			}
		}
	}

	/// Remove `from` and everything above it within the range containing it;
	/// later ranges are untouched.
	pub fn remove_tail(&mut self, from: BlockNumber) {
		if let Some(index) = self.range_containing(from) {
			let empty = {
				let (start, values) = &mut self.ranges[index];
				values.truncate((from - *start) as usize);
				values.is_empty()
			};
			if empty {
				self.ranges.remove(index);
			}
		}
	}

	/// Remove every value at `from` and above, across all ranges.
	pub fn remove_from(&mut self, from: BlockNumber) {
		self.remove_tail(from);
		self.ranges.retain(|&(start, _)| start < from);
	}
}

#[cfg(test)]
mod tests {
	use super::RangeCollection;

	fn contents(ranges: &RangeCollection<char>) -> Vec<(u64, Vec<char>)> {
		ranges.ranges().map(|(start, v)| (start, v.to_vec())).collect()
	}

	#[test]
	fn inserts_extend_and_merge_ranges() {
		let mut ranges: RangeCollection<char> = RangeCollection::new();
		assert!(ranges.is_empty());
		assert!(!ranges.have_item(1));
		assert_eq!(ranges.find_item(1), None);

		ranges.insert_item(17, 'q');
		ranges.insert_item(18, 'r');
		ranges.insert_item(16, 'p');
		assert_eq!(contents(&ranges), vec![(16, vec!['p', 'q', 'r'])]);
		assert_eq!(ranges.find_item(17), Some(&'q'));
		assert!(ranges.have_item(18));
		assert!(!ranges.have_item(19));

		ranges.insert_item(2, 'b');
		ranges.insert_item(3, 'c');
		ranges.insert_item(4, 'd');
		assert_eq!(contents(&ranges), vec![(2, vec!['b', 'c', 'd']), (16, vec!['p', 'q', 'r'])]);
		assert_eq!(ranges.len(), 6);

		// bridge the gap between two ranges
		let mut bridged = ranges.clone();
		for (n, c) in (5..16).zip("efghijklmno".chars()) {
			bridged.insert_item(n, c);
		}
		assert_eq!(bridged.ranges().count(), 1);
		assert_eq!(bridged.first_range().map(|(s, v)| (s, v.len())), Some((2, 17)));
	}

	#[test]
	fn remove_head_trims_consumed_prefix() {
		let mut ranges: RangeCollection<char> = RangeCollection::new();
		ranges.insert_item(2, 'b');
		ranges.insert_item(3, 'c');
		ranges.insert_item(4, 'd');
		ranges.insert_item(16, 'p');

		ranges.remove_head(2);
		assert_eq!(contents(&ranges), vec![(2, vec!['b', 'c', 'd']), (16, vec!['p'])]);
		ranges.remove_head(3);
		assert_eq!(contents(&ranges), vec![(3, vec!['c', 'd']), (16, vec!['p'])]);
		ranges.remove_head(5);
		assert_eq!(contents(&ranges), vec![(16, vec!['p'])]);
		ranges.remove_head(17);
		assert!(ranges.is_empty());
	}

	#[test]
	fn remove_tail_is_range_local() {
		let mut ranges: RangeCollection<char> = RangeCollection::new();
		ranges.insert_item(2, 'b');
		ranges.insert_item(3, 'c');
		ranges.insert_item(16, 'p');
		ranges.insert_item(17, 'q');

		ranges.remove_tail(17);
		assert_eq!(contents(&ranges), vec![(2, vec!['b', 'c']), (16, vec!['p'])]);
		ranges.remove_tail(2);
		assert_eq!(contents(&ranges), vec![(16, vec!['p'])]);
	}

	#[test]
	fn remove_from_clears_later_ranges_too() {
		let mut ranges: RangeCollection<char> = RangeCollection::new();
		ranges.insert_item(2, 'b');
		ranges.insert_item(3, 'c');
		ranges.insert_item(16, 'p');
		ranges.insert_item(17, 'q');

		ranges.remove_from(3);
		assert_eq!(contents(&ranges), vec![(2, vec!['b'])]);

		let mut ranges: RangeCollection<char> = RangeCollection::new();
		ranges.insert_item(5, 'e');
		ranges.remove_from(5);
		assert!(ranges.is_empty());
	}
}
