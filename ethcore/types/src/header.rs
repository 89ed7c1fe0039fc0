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

//! Block header.

use ethereum_types::{Address, Bloom, H256, U256};
use keccak_hash::{keccak, KECCAK_EMPTY_LIST_RLP, KECCAK_NULL_RLP};
use parity_bytes::Bytes;
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

use crate::BlockNumber;

/// A block header.
///
/// Reflects the specific RLP fields of a block in the chain with additional
/// room for the seal which is non-specific.
///
/// The hash of the header is memoized; any mutation through the setters
/// invalidates it.
#[derive(Debug, Clone, Eq)]
pub struct Header {
	/// Parent hash.
	parent_hash: H256,
	/// Block timestamp.
	timestamp: u64,
	/// Block number.
	number: BlockNumber,
	/// Block author.
	author: Address,

	/// Transactions root.
	transactions_root: H256,
	/// Block uncles hash.
	uncles_hash: H256,
	/// Block extra data.
	extra_data: Bytes,

	/// State root.
	state_root: H256,
	/// Block receipts root.
	receipts_root: H256,
	/// Block bloom.
	log_bloom: Bloom,
	/// Gas used for contracts execution.
	gas_used: U256,
	/// Block gas limit.
	gas_limit: U256,

	/// Block difficulty.
	difficulty: U256,
	/// Vector of post-RLP-encoded fields. For the proof-of-work chain this is
	/// `[mix_hash, nonce]`, which completes the canonical 15-item header.
	seal: Vec<Bytes>,

	/// Memoized hash of the RLP representation including the seal fields.
	hash: Option<H256>,
}

impl PartialEq for Header {
	fn eq(&self, c: &Header) -> bool {
		if let (&Some(ref h1), &Some(ref h2)) = (&self.hash, &c.hash) {
			if h1 == h2 {
				return true;
			}
		}

		self.parent_hash == c.parent_hash
			&& self.timestamp == c.timestamp
			&& self.number == c.number
			&& self.author == c.author
			&& self.transactions_root == c.transactions_root
			&& self.uncles_hash == c.uncles_hash
			&& self.extra_data == c.extra_data
			&& self.state_root == c.state_root
			&& self.receipts_root == c.receipts_root
			&& self.log_bloom == c.log_bloom
			&& self.gas_used == c.gas_used
			&& self.gas_limit == c.gas_limit
			&& self.difficulty == c.difficulty
			&& self.seal == c.seal
	}
}

impl Default for Header {
	fn default() -> Self {
		Header {
			parent_hash: H256::zero(),
			timestamp: 0,
			number: 0,
			author: Address::zero(),

			transactions_root: KECCAK_NULL_RLP,
			uncles_hash: KECCAK_EMPTY_LIST_RLP,
			extra_data: vec![],

			state_root: KECCAK_NULL_RLP,
			receipts_root: KECCAK_NULL_RLP,
			log_bloom: Bloom::default(),
			gas_used: U256::default(),
			gas_limit: U256::default(),

			difficulty: U256::default(),
			seal: vec![],
			hash: None,
		}
	}
}

impl Header {
	/// Create a new, default-valued, header.
	pub fn new() -> Self {
		Self::default()
	}

	/// Get the parent_hash field of the header.
	pub fn parent_hash(&self) -> &H256 { &self.parent_hash }
	/// Get the timestamp field of the header.
	pub fn timestamp(&self) -> u64 { self.timestamp }
	/// Get the number field of the header.
	pub fn number(&self) -> BlockNumber { self.number }
	/// Get the author field of the header.
	pub fn author(&self) -> &Address { &self.author }
	/// Get the extra data field of the header.
	pub fn extra_data(&self) -> &Bytes { &self.extra_data }
	/// Get the state root field of the header.
	pub fn state_root(&self) -> &H256 { &self.state_root }
	/// Get the receipts root field of the header.
	pub fn receipts_root(&self) -> &H256 { &self.receipts_root }
	/// Get the log bloom field of the header.
	pub fn log_bloom(&self) -> &Bloom { &self.log_bloom }
	/// Get the transactions root field of the header.
	pub fn transactions_root(&self) -> &H256 { &self.transactions_root }
	/// Get the uncles hash field of the header.
	pub fn uncles_hash(&self) -> &H256 { &self.uncles_hash }
	/// Get the gas used field of the header.
	pub fn gas_used(&self) -> &U256 { &self.gas_used }
	/// Get the gas limit field of the header.
	pub fn gas_limit(&self) -> &U256 { &self.gas_limit }
	/// Get the difficulty field of the header.
	pub fn difficulty(&self) -> &U256 { &self.difficulty }
	/// Get the seal field of the header.
	pub fn seal(&self) -> &[Bytes] { &self.seal }

	/// Set the parent hash field of the header.
	pub fn set_parent_hash(&mut self, a: H256) { self.parent_hash = a; self.note_dirty(); }
	/// Set the uncles hash field of the header.
	pub fn set_uncles_hash(&mut self, a: H256) { self.uncles_hash = a; self.note_dirty(); }
	/// Set the state root field of the header.
	pub fn set_state_root(&mut self, a: H256) { self.state_root = a; self.note_dirty(); }
	/// Set the transactions root field of the header.
	pub fn set_transactions_root(&mut self, a: H256) { self.transactions_root = a; self.note_dirty(); }
	/// Set the receipts root field of the header.
	pub fn set_receipts_root(&mut self, a: H256) { self.receipts_root = a; self.note_dirty(); }
	/// Set the log bloom field of the header.
	pub fn set_log_bloom(&mut self, a: Bloom) { self.log_bloom = a; self.note_dirty(); }
	/// Set the timestamp field of the header.
	pub fn set_timestamp(&mut self, a: u64) { self.timestamp = a; self.note_dirty(); }
	/// Set the number field of the header.
	pub fn set_number(&mut self, a: BlockNumber) { self.number = a; self.note_dirty(); }
	/// Set the author field of the header.
	pub fn set_author(&mut self, a: Address) { self.author = a; self.note_dirty(); }
	/// Set the extra data field of the header.
	pub fn set_extra_data(&mut self, a: Bytes) { self.extra_data = a; self.note_dirty(); }
	/// Set the gas used field of the header.
	pub fn set_gas_used(&mut self, a: U256) { self.gas_used = a; self.note_dirty(); }
	/// Set the gas limit field of the header.
	pub fn set_gas_limit(&mut self, a: U256) { self.gas_limit = a; self.note_dirty(); }
	/// Set the difficulty field of the header.
	pub fn set_difficulty(&mut self, a: U256) { self.difficulty = a; self.note_dirty(); }
	/// Set the seal field of the header.
	pub fn set_seal(&mut self, a: Vec<Bytes>) { self.seal = a; self.note_dirty(); }

	/// Note that some fields have changed. Resets the memoized hash.
	fn note_dirty(&mut self) {
		self.hash = None;
	}

	/// Get the hash of this header (keccak of the RLP with seal).
	pub fn hash(&self) -> H256 {
		self.hash.unwrap_or_else(|| keccak(self.rlp()))
	}

	/// Memoize the hash so repeated `hash()` calls are free.
	pub fn compute_hash(mut self) -> Header {
		let hash = self.hash();
		self.hash = Some(hash);
		self
	}

	/// Place this header into an RLP stream `s`.
	pub fn stream_rlp(&self, s: &mut RlpStream) {
		s.begin_list(13 + self.seal.len());
		s.append(&self.parent_hash);
		s.append(&self.uncles_hash);
		s.append(&self.author);
		s.append(&self.state_root);
		s.append(&self.transactions_root);
		s.append(&self.receipts_root);
		s.append(&self.log_bloom);
		s.append(&self.difficulty);
		s.append(&self.number);
		s.append(&self.gas_limit);
		s.append(&self.gas_used);
		s.append(&self.timestamp);
		s.append(&self.extra_data);
		for b in &self.seal {
			s.append_raw(b, 1);
		}
	}

	/// Get the RLP representation of this header.
	pub fn rlp(&self) -> Bytes {
		let mut s = RlpStream::new();
		self.stream_rlp(&mut s);
		s.out()
	}

	/// Decode a header from a raw RLP slice, memoizing the hash of the
	/// supplied bytes.
	pub fn decode_rlp(data: &[u8]) -> Result<Self, DecoderError> {
		let mut header = Header::decode(&Rlp::new(data))?;
		header.hash = Some(keccak(data));
		Ok(header)
	}
}

impl Decodable for Header {
	fn decode(r: &Rlp) -> Result<Self, DecoderError> {
		let mut blockheader = Header {
			parent_hash: r.val_at(0)?,
			uncles_hash: r.val_at(1)?,
			author: r.val_at(2)?,
			state_root: r.val_at(3)?,
			transactions_root: r.val_at(4)?,
			receipts_root: r.val_at(5)?,
			log_bloom: r.val_at(6)?,
			difficulty: r.val_at(7)?,
			number: r.val_at(8)?,
			gas_limit: r.val_at(9)?,
			gas_used: r.val_at(10)?,
			timestamp: r.val_at(11)?,
			extra_data: r.val_at(12)?,
			seal: vec![],
			hash: Some(keccak(r.as_raw())),
		};

		for i in 13..r.item_count()? {
			blockheader.seal.push(r.at(i)?.as_raw().to_vec());
		}

		Ok(blockheader)
	}
}

impl Encodable for Header {
	fn rlp_append(&self, s: &mut RlpStream) {
		self.stream_rlp(s);
	}
}

#[cfg(test)]
mod tests {
	use super::Header;
	use rlp::{self, Rlp};

	#[test]
	fn header_rlp_round_trip_keeps_hash() {
		let mut header = Header::new();
		header.set_number(42);
		header.set_timestamp(1_500_000_000);
		header.set_difficulty(131_072.into());
		header.set_seal(vec![rlp::encode(&vec![0u8; 32]), rlp::encode(&vec![0u8; 8])]);

		let encoded = header.rlp();
		let decoded = Header::decode_rlp(&encoded).unwrap();
		assert_eq!(decoded, header);
		assert_eq!(decoded.hash(), header.hash());
		assert_eq!(Rlp::new(&encoded).item_count().unwrap(), 15);
	}

	#[test]
	fn setters_invalidate_memoized_hash() {
		let mut header = Header::decode_rlp(&Header::new().rlp()).unwrap();
		let old = header.hash();
		header.set_number(1);
		assert_ne!(old, header.hash());
	}
}
