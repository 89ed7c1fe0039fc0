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

//! Generates Keccak-flavoured trie roots.

use ethereum_types::H256;
use keccak_hasher::KeccakHasher;

/// Generates a trie root hash for a vector of values
pub fn trie_root<I, A, B>(input: I) -> H256
where
	I: IntoIterator<Item = (A, B)>,
	A: AsRef<[u8]> + Ord,
	B: AsRef<[u8]>,
{
	H256(triehash::trie_root::<KeccakHasher, _, _, _>(input))
}

/// Generates a key-hashed (secure) trie root hash for a vector of key-value tuples.
pub fn sec_trie_root<I, A, B>(input: I) -> H256
where
	I: IntoIterator<Item = (A, B)>,
	A: AsRef<[u8]>,
	B: AsRef<[u8]>,
{
	H256(triehash::sec_trie_root::<KeccakHasher, _, _, _>(input))
}

/// Generates a trie root hash for a vector of rlp-encoded values
pub fn ordered_trie_root<I, V>(input: I) -> H256
where
	I: IntoIterator<Item = V>,
	V: AsRef<[u8]>,
{
	H256(triehash::ordered_trie_root::<KeccakHasher, I>(input))
}

#[cfg(test)]
mod tests {
	use super::ordered_trie_root;
	use ethereum_types::H256;
	use keccak_hasher::KeccakHasher;

	#[test]
	fn empty_ordered_root_is_null_rlp_keccak() {
		// keccak(rlp(""))
		let expected = "56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421"
			.parse::<H256>()
			.unwrap();
		assert_eq!(ordered_trie_root(Vec::<Vec<u8>>::new()), expected);
	}

	#[test]
	fn matches_generic_triehash() {
		let items = vec![vec![0x42u8], vec![0x01, 0x02, 0x03]];
		assert_eq!(
			ordered_trie_root(items.clone()),
			H256(triehash::ordered_trie_root::<KeccakHasher, _>(items)),
		);
	}
}
