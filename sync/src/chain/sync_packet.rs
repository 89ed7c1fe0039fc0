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

//! Identifiers of the subprotocol packets, by opcode.

/// The packets of the block-exchange subprotocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPacket {
	/// Status handshake.
	StatusPacket = 0x00,
	/// Announcement of new block hashes.
	NewBlockHashesPacket = 0x01,
	/// Pooled transactions gossip.
	TransactionsPacket = 0x02,
	/// Request for block headers.
	GetBlockHeadersPacket = 0x03,
	/// Block headers response.
	BlockHeadersPacket = 0x04,
	/// Request for block bodies.
	GetBlockBodiesPacket = 0x05,
	/// Block bodies response.
	BlockBodiesPacket = 0x06,
	/// A full new block with its total difficulty.
	NewBlockPacket = 0x07,
	/// Request for state trie nodes.
	GetNodeDataPacket = 0x0d,
	/// State trie nodes response.
	NodeDataPacket = 0x0e,
	/// Request for block receipts.
	GetReceiptsPacket = 0x0f,
	/// Block receipts response.
	ReceiptsPacket = 0x10,
}

impl SyncPacket {
	/// The wire opcode of this packet.
	pub fn id(self) -> u8 {
		self as u8
	}

	/// Map a wire opcode back to a packet, if it is one of ours.
	pub fn from_u8(id: u8) -> Option<SyncPacket> {
		use self::SyncPacket::*;
		match id {
			0x00 => Some(StatusPacket),
			0x01 => Some(NewBlockHashesPacket),
			0x02 => Some(TransactionsPacket),
			0x03 => Some(GetBlockHeadersPacket),
			0x04 => Some(BlockHeadersPacket),
			0x05 => Some(GetBlockBodiesPacket),
			0x06 => Some(BlockBodiesPacket),
			0x07 => Some(NewBlockPacket),
			0x0d => Some(GetNodeDataPacket),
			0x0e => Some(NodeDataPacket),
			0x0f => Some(GetReceiptsPacket),
			0x10 => Some(ReceiptsPacket),
			_ => None,
		}
	}
}
