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

//! Outgoing request serialization. Every request transitions the peer's
//! `asking` state; a peer with an outstanding ask is never asked again
//! until the response (or the watchdog) clears it.

use ethereum_types::H256;
use rlp::RlpStream;

use common_types::BlockNumber;

use crate::chain::sync_packet::SyncPacket;
use crate::chain::{ChainSync, PeerAsking};
use crate::sync_io::{PeerId, SyncIo};

/// The block-exchange request builder.
pub struct SyncRequester;

impl SyncRequester {
	/// Request headers starting from the given hash.
	pub fn request_headers_by_hash(
		sync: &mut ChainSync,
		io: &mut dyn SyncIo,
		peer_id: PeerId,
		h: &H256,
		count: u64,
		skip: u64,
		reverse: bool,
	) {
		trace!(target: "sync", "{} <- GetBlockHeaders: {} entries starting from {}", peer_id, count, h);
		let mut rlp = RlpStream::new_list(4);
		rlp.append(h);
		rlp.append(&count);
		rlp.append(&skip);
		rlp.append(&if reverse { 1u32 } else { 0u32 });
		Self::send_request(sync, io, peer_id, PeerAsking::BlockHeaders, SyncPacket::GetBlockHeadersPacket, rlp.out());
	}

	/// Request headers starting from the given block number.
	pub fn request_headers_by_number(
		sync: &mut ChainSync,
		io: &mut dyn SyncIo,
		peer_id: PeerId,
		n: BlockNumber,
		count: u64,
		skip: u64,
		reverse: bool,
	) {
		trace!(target: "sync", "{} <- GetBlockHeaders: {} entries starting from #{}", peer_id, count, n);
		let mut rlp = RlpStream::new_list(4);
		rlp.append(&n);
		rlp.append(&count);
		rlp.append(&skip);
		rlp.append(&if reverse { 1u32 } else { 0u32 });
		Self::send_request(sync, io, peer_id, PeerAsking::BlockHeaders, SyncPacket::GetBlockHeadersPacket, rlp.out());
	}

	/// Request the configured fork-check header from a freshly connected
	/// peer.
	pub fn request_fork_header(
		sync: &mut ChainSync,
		io: &mut dyn SyncIo,
		peer_id: PeerId,
		n: BlockNumber,
	) {
		trace!(target: "sync", "{} <- GetBlockHeaders: fork check for #{}", peer_id, n);
		let mut rlp = RlpStream::new_list(4);
		rlp.append(&n);
		rlp.append(&1u32);
		rlp.append(&0u32);
		rlp.append(&0u32);
		Self::send_request(sync, io, peer_id, PeerAsking::ForkHeader, SyncPacket::GetBlockHeadersPacket, rlp.out());
	}

	/// Request block bodies by their hashes.
	pub fn request_bodies(
		sync: &mut ChainSync,
		io: &mut dyn SyncIo,
		peer_id: PeerId,
		hashes: Vec<H256>,
	) {
		trace!(target: "sync", "{} <- GetBlockBodies: {} entries", peer_id, hashes.len());
		let mut rlp = RlpStream::new_list(hashes.len());
		for h in &hashes {
			rlp.append(h);
		}
		Self::send_request(sync, io, peer_id, PeerAsking::BlockBodies, SyncPacket::GetBlockBodiesPacket, rlp.out());
	}

	/// Send our status to a freshly connected peer.
	pub fn send_status(sync: &ChainSync, io: &mut dyn SyncIo, peer_id: PeerId) {
		let chain = io.chain().chain_info();
		trace!(target: "sync", "{} <- Status: TD {}, head {}", peer_id, chain.total_difficulty, chain.best_block_hash);
		let mut rlp = RlpStream::new_list(5);
		rlp.append(&sync.config().protocol_version);
		rlp.append(&sync.config().network_id);
		rlp.append(&chain.total_difficulty);
		rlp.append(&chain.best_block_hash);
		rlp.append(&chain.genesis_hash);
		if let Err(e) = io.send(peer_id, SyncPacket::StatusPacket, rlp.out()) {
			debug!(target: "sync", "Error sending status: {:?}", e);
		}
	}

	fn send_request(
		sync: &mut ChainSync,
		io: &mut dyn SyncIo,
		peer_id: PeerId,
		asking: PeerAsking,
		packet_id: SyncPacket,
		packet: Vec<u8>,
	) {
		if let Some(peer) = sync.peers.get_mut(&peer_id) {
			if peer.asking != PeerAsking::Nothing {
				warn!(target: "sync", "Asking {:?} while requesting {:?} from {}", peer.asking, asking, peer_id);
			}
			peer.asking = asking;
			peer.ask_time = crate::chain::unix_now();
			if let Err(e) = io.send(peer_id, packet_id, packet) {
				debug!(target: "sync", "Error sending request to {}: {:?}", peer_id, e);
				io.disconnect_peer(peer_id);
			}
		}
	}
}
