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

//! Base data structure of this module is `Block`.

use parity_bytes::Bytes;
use rlp::{DecoderError, Rlp, RlpStream};

use crate::header::Header;

/// A block, encoded as it is on the block chain: a 3-item list of header,
/// transactions and uncles. Transactions are kept as raw item RLPs since the
/// sync layer never needs to interpret them beyond hashing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
	/// The header of this block.
	pub header: Header,
	/// The transactions in this block, each a raw signed-transaction RLP item.
	pub transactions: Vec<Bytes>,
	/// The uncles of this block.
	pub uncles: Vec<Header>,
}

impl Block {
	/// Get the RLP-encoding of the block.
	pub fn rlp_bytes(&self) -> Bytes {
		let mut block_rlp = RlpStream::new_list(3);
		block_rlp.append(&self.header);
		block_rlp.begin_list(self.transactions.len());
		for t in &self.transactions {
			block_rlp.append_raw(t, 1);
		}
		block_rlp.append_list(&self.uncles);
		block_rlp.out()
	}

	/// Get the RLP-encoding of the block body (transactions + uncles), the
	/// payload served for a bodies request.
	pub fn body_rlp(&self) -> Bytes {
		let mut body_rlp = RlpStream::new_list(2);
		body_rlp.begin_list(self.transactions.len());
		for t in &self.transactions {
			body_rlp.append_raw(t, 1);
		}
		body_rlp.append_list(&self.uncles);
		body_rlp.out()
	}

	/// Decode a block from its canonical RLP.
	pub fn decode_rlp(data: &[u8]) -> Result<Self, DecoderError> {
		let rlp = Rlp::new(data);
		if rlp.item_count()? != 3 {
			return Err(DecoderError::RlpIncorrectListLen);
		}
		let transactions = rlp.at(1)?
			.iter()
			.map(|t| t.as_raw().to_vec())
			.collect();
		Ok(Block {
			header: rlp.val_at(0)?,
			transactions,
			uncles: rlp.list_at(2)?,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::Block;

	#[test]
	fn block_rlp_round_trip() {
		let mut block = Block::default();
		block.header.set_number(7);
		block.transactions.push(rlp::encode(&"cat".as_bytes().to_vec()));

		let encoded = block.rlp_bytes();
		let decoded = Block::decode_rlp(&encoded).unwrap();
		assert_eq!(decoded, block);
	}

	#[test]
	fn empty_body_is_two_empty_lists() {
		assert_eq!(Block::default().body_rlp(), vec![0xc2, 0xc0, 0xc0]);
	}
}
