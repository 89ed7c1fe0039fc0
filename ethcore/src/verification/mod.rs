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

//! Block verification utilities.
//!
//! Phase 1 runs on the importing thread and only performs cheap structural
//! checks; phase 2 runs on the verifier pool and carries the expensive seal
//! and root recomputation work.

pub mod queue;

pub use self::queue::BlockQueue;

use ethereum_types::H256;
use keccak_hash::keccak;
use parity_bytes::Bytes;
use rlp::Rlp;

use common_types::header::Header;

use crate::engines::Engine;
use crate::error::{BlockError, Error};

/// A block awaiting verification: raw bytes plus the decoded header.
#[derive(Debug, Clone)]
pub struct Unverified {
	/// The decoded header.
	pub header: Header,
	/// The complete block RLP.
	pub bytes: Bytes,
}

impl Unverified {
	/// Decode a candidate block. Fails on anything that is not a list with a
	/// decodable header in first position.
	pub fn from_rlp(bytes: Bytes) -> Result<Self, rlp::DecoderError> {
		let header = {
			let rlp = Rlp::new(&bytes);
			rlp.val_at(0)?
		};
		Ok(Unverified { header, bytes })
	}

	/// The block hash.
	pub fn hash(&self) -> H256 {
		self.header.hash()
	}

	/// The parent block hash.
	pub fn parent_hash(&self) -> H256 {
		*self.header.parent_hash()
	}
}

/// A block that passed every check the queue is responsible for. Emitted in
/// arrival order, ready for chain insertion.
#[derive(Debug)]
pub struct VerifiedBlock {
	/// Verified header.
	pub header: Header,
	/// The transactions of the block, as raw signed-transaction RLP items.
	pub transactions: Vec<Bytes>,
	/// The complete block RLP.
	pub bytes: Bytes,
}

impl VerifiedBlock {
	/// The block hash.
	pub fn hash(&self) -> H256 {
		self.header.hash()
	}
}

/// Phase 1 quick block verification. Structural soundness and cheap header
/// checks only.
pub fn verify_block_basic(block: &Unverified, engine: &dyn Engine) -> Result<(), Error> {
	verify_header_params(&block.header, engine)?;
	engine.verify_block_basic(&block.header)?;

	let rlp = Rlp::new(&block.bytes);
	if rlp.item_count()? != 3 {
		return Err(BlockError::InvalidStructure.into());
	}
	let transactions = rlp.at(1)?;
	let uncles = rlp.at(2)?;
	if !transactions.is_list() || !uncles.is_list() {
		return Err(BlockError::InvalidStructure.into());
	}
	Ok(())
}

/// Check basic header parameters.
fn verify_header_params(header: &Header, engine: &dyn Engine) -> Result<(), Error> {
	let expected_seal_fields = engine.seal_fields();
	if header.seal().len() != expected_seal_fields {
		return Err(BlockError::InvalidSealArity(header.seal().len()).into());
	}
	if header.extra_data().len() > engine.maximum_extra_data_size() {
		return Err(BlockError::ExtraDataOutOfBounds(header.extra_data().len()).into());
	}
	Ok(())
}

/// Phase 2 verification. Seal check plus recomputation of the transactions
/// root and uncles hash against the header. Does not touch the parent, so it
/// may run in any order.
pub fn verify_block_unordered(block: Unverified, engine: &dyn Engine) -> Result<VerifiedBlock, Error> {
	engine.verify_block_unordered(&block.header)?;

	let rlp = Rlp::new(&block.bytes);
	let transactions: Vec<Bytes> = rlp.at(1)?
		.iter()
		.map(|t| t.as_raw().to_vec())
		.collect();

	let transactions_root = triehash_ethereum::ordered_trie_root(transactions.iter());
	if &transactions_root != block.header.transactions_root() {
		return Err(BlockError::InvalidTransactionsRoot(
			*block.header.transactions_root(),
			transactions_root,
		).into());
	}

	let uncles_hash = keccak(rlp.at(2)?.as_raw());
	if &uncles_hash != block.header.uncles_hash() {
		return Err(BlockError::InvalidUnclesHash(
			*block.header.uncles_hash(),
			uncles_hash,
		).into());
	}

	Ok(VerifiedBlock {
		header: block.header,
		transactions,
		bytes: block.bytes,
	})
}
