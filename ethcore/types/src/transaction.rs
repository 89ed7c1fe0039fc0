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

//! Transaction view used by the gossip layer.
//!
//! The transaction pool lives outside this workspace; what moves through the
//! wire engine is the signed transaction RLP addressed by its hash.

use ethereum_types::H256;
use keccak_hash::keccak;
use parity_bytes::Bytes;

/// A pooled transaction ready for propagation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PooledTransaction {
	/// Keccak of the signed transaction RLP.
	pub hash: H256,
	/// The signed transaction RLP item.
	pub rlp: Bytes,
}

impl PooledTransaction {
	/// Wrap a signed transaction RLP, deriving its hash.
	pub fn new(rlp: Bytes) -> Self {
		let hash = keccak(&rlp);
		PooledTransaction { hash, rlp }
	}
}
