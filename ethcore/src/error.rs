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

//! General error types for use in ethcore.

use derive_more::{Display, From};
use ethereum_types::H256;

/// Errors concerning block processing.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum BlockError {
	/// Block has too many or too few seal fields for its engine.
	#[display(fmt = "Block seal arity is incorrect: {}", _0)]
	InvalidSealArity(usize),
	/// Seal is incorrect format or invalid under the engine rules.
	#[display(fmt = "Block seal is invalid")]
	InvalidSeal,
	/// Extra data length exceeds the engine bound.
	#[display(fmt = "Extra data of length {} is too long", _0)]
	ExtraDataOutOfBounds(usize),
	/// The transactions trie root of the block does not match the header.
	#[display(fmt = "Invalid transactions root: expected {}, got {}", _0, _1)]
	InvalidTransactionsRoot(H256, H256),
	/// The uncles hash of the block does not match the header.
	#[display(fmt = "Invalid uncles hash: expected {}, got {}", _0, _1)]
	InvalidUnclesHash(H256, H256),
	/// The block body is not the expected two-item list.
	#[display(fmt = "Invalid block structure")]
	InvalidStructure,
	/// Parent given is unknown.
	#[display(fmt = "Unknown parent: {}", _0)]
	UnknownParent(H256),
}

/// Ethcore-level error.
#[derive(Debug, Display, From)]
pub enum Error {
	/// Error concerning block processing.
	#[display(fmt = "Block error: {}", _0)]
	Block(BlockError),
	/// RLP decoding errors.
	#[display(fmt = "Decoder error: {}", _0)]
	Decoder(rlp::DecoderError),
}

impl std::error::Error for Error {}
