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

//! Serves the blockchain to requesting peers.

use ethereum_types::H256;
use parity_bytes::Bytes;
use rlp::{DecoderError, Rlp, RlpStream};

use common_types::header::Header;
use common_types::ids::BlockId;

use ethcore::client::BlockChainClient;

use crate::chain::sync_packet::SyncPacket;
use crate::sync_io::{PeerId, SyncIo};

/// Maximum number of headers served in one response.
const MAX_HEADERS_TO_SEND: usize = 1024;
/// Maximum number of bodies served in one response.
const MAX_BODIES_TO_SEND: usize = 256;
/// Maximum number of state trie nodes served in one response.
const MAX_NODE_DATA_TO_SEND: usize = 384;
/// Maximum number of receipt lists served in one response.
const MAX_RECEIPTS_TO_SEND: usize = 256;
/// Soft cap on the payload of a single response.
const PAYLOAD_SOFT_LIMIT: usize = 4 * 1024 * 1024;
/// Recent blocks are walked by parent hash; anything older is looked up by
/// number, which is robust against reorganizations deep in the past.
const RECENT_BLOCKS_BY_PARENT_WALK: u64 = 1000;

/// The block-exchange request server.
pub struct SyncSupplier;

impl SyncSupplier {
	/// Dispatch an incoming request packet and respond to it. Zero-entry
	/// requests are noise and cost the peer rating.
	pub fn dispatch_packet(io: &mut dyn SyncIo, peer_id: PeerId, packet_id: SyncPacket, rlp: &Rlp) {
		let result = match packet_id {
			SyncPacket::GetBlockHeadersPacket => Self::return_block_headers(io, peer_id, rlp),
			SyncPacket::GetBlockBodiesPacket => Self::return_block_bodies(io, peer_id, rlp),
			SyncPacket::GetNodeDataPacket => Self::return_node_data(io, peer_id, rlp),
			SyncPacket::GetReceiptsPacket => Self::return_receipts(io, peer_id, rlp),
			_ => {
				debug!(target: "sync", "Unexpected packet {:?} routed to the supplier", packet_id);
				return;
			},
		};
		if let Err(e) = result {
			debug!(target: "sync", "{} -> Malformed request: {:?}", peer_id, e);
			io.disable_peer(peer_id);
		}
	}

	/// Respond to GetBlockHeaders request
	fn return_block_headers(io: &mut dyn SyncIo, peer_id: PeerId, r: &Rlp) -> Result<(), DecoderError> {
		// Packet layout:
		// [ block: { P , B_32 }, maxHeaders: P, skip: P, reverse: P in { 0 , 1 } ]
		let max_headers = (r.val_at::<u64>(1)? as usize).min(MAX_HEADERS_TO_SEND);
		let skip: u64 = r.val_at(2)?;
		let reverse: bool = r.val_at(3)?;
		let step = skip + 1;

		let chain = io.chain();
		let last = chain.chain_info().best_block_number;

		let id_rlp = r.at(0)?;
		let start_hash = if id_rlp.size() == 32 {
			let hash: H256 = id_rlp.as_val()?;
			trace!(target: "sync", "{} -> GetBlockHeaders (hash: {}, max: {}, skip: {}, reverse: {})",
				peer_id, hash, max_headers, skip, reverse);
			match chain.block_number(BlockId::Hash(hash)) {
				Some(number) if !reverse => {
					Self::clamped_top_hash(&*chain, number, step, max_headers, last)
				},
				Some(_) => Some(hash),
				None => None,
			}
		} else {
			let number: u64 = id_rlp.as_val()?;
			trace!(target: "sync", "{} -> GetBlockHeaders (#{}, max: {}, skip: {}, reverse: {})",
				peer_id, number, max_headers, skip, reverse);
			if reverse {
				chain.block_hash(BlockId::Number(number))
			} else if number > last {
				None
			} else {
				Self::clamped_top_hash(&*chain, number, step, max_headers, last)
			}
		};

		// walk down from the top hash collecting at most max_headers
		let mut hashes = Vec::new();
		let mut current = start_hash;
		while hashes.len() < max_headers {
			let hash = match current {
				Some(hash) if chain.is_known(&hash) => hash,
				_ => break,
			};
			hashes.push(hash);
			current = Self::next_hash_down(&*chain, hash, step, last);
		}

		let mut data = Bytes::new();
		let mut count = 0;
		for i in 0..hashes.len() {
			if data.len() > PAYLOAD_SOFT_LIMIT {
				break;
			}
			let index = if reverse { i } else { hashes.len() - 1 - i };
			if let Some(header) = chain.block_header(BlockId::Hash(hashes[index])) {
				data.extend_from_slice(&header);
				count += 1;
			}
		}

		trace!(target: "sync", "{} <- BlockHeaders ({} entries)", peer_id, count);
		let mut rlp = RlpStream::new_list(count);
		rlp.append_raw(&data, count);
		io.update_rating(peer_id, 0);
		if let Err(e) = io.respond(SyncPacket::BlockHeadersPacket, rlp.out()) {
			debug!(target: "sync", "Error sending headers: {:?}", e);
		}
		Ok(())
	}

	// Resolve the hash of the topmost block of a forward walk starting at
	// `number`, clamped against the chain tip.
	fn clamped_top_hash(
		chain: &dyn BlockChainClient,
		number: u64,
		step: u64,
		max_headers: usize,
		last: u64,
	) -> Option<H256> {
		if max_headers == 0 {
			return None;
		}
		let mut top = number + step * (max_headers as u64 - 1);
		if top > last {
			let count = (last - number) / step + 1;
			top = number + step * (count - 1);
		}
		chain.block_hash(BlockId::Number(top))
	}

	// The hash `step` blocks below `hash`: parent-hash traversal over the
	// recent window, number-indexed lookup beyond it.
	fn next_hash_down(chain: &dyn BlockChainClient, hash: H256, step: u64, last: u64) -> Option<H256> {
		let limit = last.saturating_sub(RECENT_BLOCKS_BY_PARENT_WALK);
		let mut hash = hash;
		let mut step = step;
		while step > 0 {
			let header = chain.block_header(BlockId::Hash(hash))
				.and_then(|data| Header::decode_rlp(&data).ok())?;
			if header.number() < limit {
				break;
			}
			hash = *header.parent_hash();
			step -= 1;
		}
		if step > 0 {
			let number = chain.block_number(BlockId::Hash(hash))?;
			if number >= step {
				return chain.block_hash(BlockId::Number(number - step));
			}
			return None;
		}
		Some(hash)
	}

	/// Respond to GetBlockBodies request
	fn return_block_bodies(io: &mut dyn SyncIo, peer_id: PeerId, r: &Rlp) -> Result<(), DecoderError> {
		let count = r.item_count()?;
		if count == 0 {
			trace!(target: "sync", "{} -> Zero-entry GetBlockBodies: not replying", peer_id);
			io.update_rating(peer_id, -10);
			return Ok(());
		}
		trace!(target: "sync", "{} -> GetBlockBodies ({} entries)", peer_id, count);

		let mut data = Bytes::new();
		let mut added = 0;
		for i in 0..count.min(MAX_BODIES_TO_SEND) {
			if data.len() > PAYLOAD_SOFT_LIMIT {
				break;
			}
			let hash: H256 = r.val_at(i)?;
			if let Some(body) = io.chain().block_body(BlockId::Hash(hash)) {
				data.extend_from_slice(&body);
				added += 1;
			}
		}

		let mut rlp = RlpStream::new_list(added);
		rlp.append_raw(&data, added);
		io.update_rating(peer_id, 0);
		trace!(target: "sync", "{} <- BlockBodies ({} entries)", peer_id, added);
		if let Err(e) = io.respond(SyncPacket::BlockBodiesPacket, rlp.out()) {
			debug!(target: "sync", "Error sending bodies: {:?}", e);
		}
		Ok(())
	}

	/// Respond to GetNodeData request
	fn return_node_data(io: &mut dyn SyncIo, peer_id: PeerId, r: &Rlp) -> Result<(), DecoderError> {
		let count = r.item_count()?;
		if count == 0 {
			trace!(target: "sync", "{} -> Zero-entry GetNodeData: not replying", peer_id);
			io.update_rating(peer_id, -10);
			return Ok(());
		}
		trace!(target: "sync", "{} -> GetNodeData ({} entries)", peer_id, count);

		let mut payload = 0usize;
		let mut nodes = Vec::new();
		for i in 0..count.min(MAX_NODE_DATA_TO_SEND) {
			if payload > PAYLOAD_SOFT_LIMIT {
				break;
			}
			let hash: H256 = r.val_at(i)?;
			if let Some(node) = io.chain().state_data(&hash) {
				payload += node.len();
				nodes.push(node);
			}
		}

		let mut rlp = RlpStream::new_list(nodes.len());
		for node in &nodes {
			rlp.append(node);
		}
		io.update_rating(peer_id, 0);
		trace!(target: "sync", "{} <- NodeData ({} entries)", peer_id, nodes.len());
		if let Err(e) = io.respond(SyncPacket::NodeDataPacket, rlp.out()) {
			debug!(target: "sync", "Error sending node data: {:?}", e);
		}
		Ok(())
	}

	/// Respond to GetReceipts request
	fn return_receipts(io: &mut dyn SyncIo, peer_id: PeerId, r: &Rlp) -> Result<(), DecoderError> {
		let count = r.item_count()?;
		if count == 0 {
			trace!(target: "sync", "{} -> Zero-entry GetReceipts: not replying", peer_id);
			io.update_rating(peer_id, -10);
			return Ok(());
		}
		trace!(target: "sync", "{} -> GetReceipts ({} entries)", peer_id, count);

		let mut data = Bytes::new();
		let mut added = 0;
		for i in 0..count.min(MAX_RECEIPTS_TO_SEND) {
			if data.len() > PAYLOAD_SOFT_LIMIT {
				break;
			}
			let hash: H256 = r.val_at(i)?;
			if let Some(receipts) = io.chain().block_receipts(&hash) {
				data.extend_from_slice(&receipts);
				added += 1;
			}
		}

		let mut rlp = RlpStream::new_list(added);
		rlp.append_raw(&data, added);
		io.update_rating(peer_id, 0);
		trace!(target: "sync", "{} <- Receipts ({} entries)", peer_id, added);
		if let Err(e) = io.respond(SyncPacket::ReceiptsPacket, rlp.out()) {
			debug!(target: "sync", "Error sending receipts: {:?}", e);
		}
		Ok(())
	}
}
