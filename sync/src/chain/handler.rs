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

//! Inbound packet handlers: peer status checks, response routing into the
//! downloader, gossip ingress.

use ethereum_types::{H256, U256};
use rlp::{DecoderError, Rlp};

use common_types::block_status::BlockStatus;
use common_types::header::Header;
use common_types::ids::BlockId;

use ethcore::verification::queue::ImportResult;

use crate::block_sync::{CollectOutcome, DownloadAction};
use crate::chain::sync_packet::SyncPacket;
use crate::chain::{ChainSync, PeerAsking, PeerInfo, SyncState};
use crate::sync_io::{PeerId, SyncIo};

/// Maximum number of hashes accepted in a NewBlockHashes announcement.
const MAX_NEW_HASHES: usize = 1024;

/// The block-exchange response and gossip handler.
pub struct SyncHandler;

impl SyncHandler {
	/// Handle an incoming packet. Returns false when the opcode does not
	/// belong to this subprotocol so upper layers may ignore it.
	pub fn on_packet(
		sync: &mut ChainSync,
		io: &mut dyn SyncIo,
		peer_id: PeerId,
		packet_id: u8,
		data: &[u8],
	) -> bool {
		let packet = match SyncPacket::from_u8(packet_id) {
			Some(packet) => packet,
			None => {
				debug!(target: "sync", "{}: Unknown packet {:#04x}", peer_id, packet_id);
				return false;
			},
		};

		// any traffic from the peer feeds the inactivity watchdog
		if let Some(peer) = sync.peers.get_mut(&peer_id) {
			peer.ask_time = crate::chain::unix_now();
		}

		let rlp = Rlp::new(data);
		let result = match packet {
			SyncPacket::StatusPacket => Self::on_peer_status(sync, io, peer_id, &rlp),
			SyncPacket::TransactionsPacket => Self::on_peer_transactions(sync, io, peer_id, &rlp),
			SyncPacket::BlockHeadersPacket => Self::on_peer_block_headers(sync, io, peer_id, &rlp),
			SyncPacket::BlockBodiesPacket => Self::on_peer_block_bodies(sync, io, peer_id, &rlp),
			SyncPacket::NewBlockPacket => Self::on_peer_new_block(sync, io, peer_id, &rlp),
			SyncPacket::NewBlockHashesPacket => Self::on_peer_new_hashes(sync, io, peer_id, &rlp),
			SyncPacket::NodeDataPacket | SyncPacket::ReceiptsPacket => {
				// nothing upstream asks for these yet; unsolicited data
				debug!(target: "sync", "{}: Ignored unsolicited {:?}", peer_id, packet);
				Ok(())
			},
			SyncPacket::GetBlockHeadersPacket
			| SyncPacket::GetBlockBodiesPacket
			| SyncPacket::GetNodeDataPacket
			| SyncPacket::GetReceiptsPacket => {
				super::supplier::SyncSupplier::dispatch_packet(io, peer_id, packet, &rlp);
				Ok(())
			},
		};

		if let Err(e) = result {
			// malformed RLP from this peer: protocol violation
			debug!(target: "sync", "{} -> Malformed packet {:?}: {:?}", peer_id, packet, e);
			io.disable_peer(peer_id);
		}
		true
	}

	/// Called by peer to report status
	fn on_peer_status(
		sync: &mut ChainSync,
		io: &mut dyn SyncIo,
		peer_id: PeerId,
		r: &Rlp,
	) -> Result<(), DecoderError> {
		let protocol_version: u32 = r.val_at(0)?;
		let network_id: U256 = r.val_at(1)?;
		let difficulty: U256 = r.val_at(2)?;
		let latest_hash: H256 = r.val_at(3)?;
		let genesis: H256 = r.val_at(4)?;

		trace!(target: "sync", "{} -> Status: protocol {}, network {}, TD {}, head {}, genesis {}",
			peer_id, protocol_version, network_id, difficulty, latest_hash, genesis);

		let chain_info = io.chain().chain_info();
		let client_version = io.peer_client_version(peer_id);
		let disconnect_reason = if genesis != chain_info.genesis_hash {
			Some("Invalid genesis hash")
		} else if protocol_version != sync.config.protocol_version {
			Some("Invalid protocol version")
		} else if network_id != sync.config.network_id {
			Some("Invalid network identifier")
		} else if sync.config.banned_client_versions.iter().any(|banned| client_version.contains(banned)) {
			Some("Blacklisted client version")
		} else {
			None
		};

		if let Some(reason) = disconnect_reason {
			debug!(target: "sync", "{}: Peer not suitable for sync: {}", peer_id, reason);
			io.disconnect_peer(peer_id);
			return Ok(());
		}

		sync.peers.insert(peer_id, PeerInfo {
			protocol_version,
			network_id,
			difficulty: Some(difficulty),
			latest_hash,
			genesis,
			asking: PeerAsking::Nothing,
			ask_time: crate::chain::unix_now(),
			known_blocks: Default::default(),
			known_transactions: Default::default(),
			unknown_new_blocks: 0,
			waiting_for_transactions: false,
		});

		// before exchanging any data, make sure the peer is on our side of
		// the configured fork
		if let Some((fork_number, _)) = sync.config.fork_block.clone() {
			super::requester::SyncRequester::request_fork_header(sync, io, peer_id, fork_number);
			return Ok(());
		}
		sync.sync_peer(io, peer_id, false);
		Ok(())
	}

	// The response to the fork-check header request.
	fn on_peer_fork_header(
		sync: &mut ChainSync,
		io: &mut dyn SyncIo,
		peer_id: PeerId,
		r: &Rlp,
	) -> Result<(), DecoderError> {
		if let Some(peer) = sync.peers.get_mut(&peer_id) {
			peer.asking = PeerAsking::Nothing;
		}
		let (fork_number, expected_extra_data) = sync.config.fork_block.clone()
			.expect("fork header requested only when a fork block is configured; qed");

		let item_count = r.item_count()?;
		let confirmed = if item_count == 0 {
			// the peer has not reached the fork block yet; nothing to
			// disagree about
			true
		} else {
			item_count == 1 && {
				let header = Header::decode_rlp(r.at(0)?.as_raw())?;
				header.number() == fork_number && *header.extra_data() == expected_extra_data
			}
		};
		if !confirmed {
			debug!(target: "sync", "{}: Peer is on another fork, disabling", peer_id);
			io.disable_peer(peer_id);
			return Ok(());
		}
		trace!(target: "sync", "{}: Fork confirmed", peer_id);
		sync.sync_peer(io, peer_id, false);
		Ok(())
	}

	/// Called by peer once it has new block headers during sync
	fn on_peer_block_headers(
		sync: &mut ChainSync,
		io: &mut dyn SyncIo,
		peer_id: PeerId,
		r: &Rlp,
	) -> Result<(), DecoderError> {
		match sync.peers.get(&peer_id).map(|peer| peer.asking) {
			Some(PeerAsking::ForkHeader) => return Self::on_peer_fork_header(sync, io, peer_id, r),
			Some(PeerAsking::BlockHeaders) => {
				if let Some(peer) = sync.peers.get_mut(&peer_id) {
					peer.asking = PeerAsking::Nothing;
				}
			},
			_ => {
				debug!(target: "sync", "{}: Ignored unexpected headers", peer_id);
				return Ok(());
			},
		}

		let item_count = r.item_count()?;
		trace!(target: "sync", "{} -> BlockHeaders ({} entries)", peer_id, item_count);
		sync.downloader.clear_peer_download(peer_id);
		if sync.state != SyncState::Blocks && sync.state != SyncState::Waiting {
			trace!(target: "sync", "Ignoring unexpected block headers");
			return Ok(());
		}
		if sync.state == SyncState::Waiting {
			trace!(target: "sync", "Ignored block headers while waiting");
			return Ok(());
		}
		if item_count == 0 {
			trace!(target: "sync", "{}: Peer does not have the blocks requested", peer_id);
			io.update_rating(peer_id, -1);
		}

		match sync.downloader.import_headers(io, r, peer_id)? {
			DownloadAction::None => {},
			DownloadAction::Restart => {
				sync.restart_sync(io);
				sync.continue_sync(io);
				return Ok(());
			},
			DownloadAction::PenalizeAndRestart => {
				io.update_rating(peer_id, -1);
				sync.restart_sync(io);
				sync.continue_sync(io);
				return Ok(());
			},
		}

		Self::collect_blocks_and_continue(sync, io);
		Ok(())
	}

	/// Called by peer once it has new block bodies
	fn on_peer_block_bodies(
		sync: &mut ChainSync,
		io: &mut dyn SyncIo,
		peer_id: PeerId,
		r: &Rlp,
	) -> Result<(), DecoderError> {
		match sync.peers.get(&peer_id).map(|peer| peer.asking) {
			Some(PeerAsking::BlockBodies) => {
				if let Some(peer) = sync.peers.get_mut(&peer_id) {
					peer.asking = PeerAsking::Nothing;
				}
			},
			_ => {
				debug!(target: "sync", "{}: Ignored unexpected bodies", peer_id);
				return Ok(());
			},
		}

		let item_count = r.item_count()?;
		trace!(target: "sync", "{} -> BlockBodies ({} entries)", peer_id, item_count);
		sync.downloader.clear_peer_download(peer_id);
		if sync.state != SyncState::Blocks && sync.state != SyncState::Waiting {
			trace!(target: "sync", "Ignoring unexpected block bodies");
			return Ok(());
		}
		if sync.state == SyncState::Waiting {
			trace!(target: "sync", "Ignored block bodies while waiting");
			return Ok(());
		}
		if item_count == 0 {
			trace!(target: "sync", "{}: Peer does not have the bodies requested", peer_id);
			io.update_rating(peer_id, -1);
		}

		sync.downloader.import_bodies(r)?;
		Self::collect_blocks_and_continue(sync, io);
		Ok(())
	}

	fn collect_blocks_and_continue(sync: &mut ChainSync, io: &mut dyn SyncIo) {
		match sync.downloader.collect_blocks(io) {
			CollectOutcome::None => {},
			CollectOutcome::Restart => {
				sync.restart_sync(io);
			},
			CollectOutcome::ResetFork => {
				// fork detected below the queued blocks; search again
				sync.state = SyncState::NotSynced;
			},
			CollectOutcome::Complete => {
				sync.complete_sync();
			},
		}
		sync.continue_sync(io);
	}

	/// Called by peer once it has a new block
	fn on_peer_new_block(
		sync: &mut ChainSync,
		io: &mut dyn SyncIo,
		peer_id: PeerId,
		r: &Rlp,
	) -> Result<(), DecoderError> {
		if sync.peers.get(&peer_id).is_none() {
			trace!(target: "sync", "{}: Ignored new block from unregistered peer", peer_id);
			return Ok(());
		}
		if r.item_count()? != 2 {
			debug!(target: "sync", "{}: NewBlock without 2 data fields", peer_id);
			io.disable_peer(peer_id);
			return Ok(());
		}
		let block_rlp = r.at(0)?;
		let header = Header::decode_rlp(block_rlp.at(0)?.as_raw())?;
		let hash = header.hash();
		let number = header.number();
		let difficulty: U256 = r.val_at(1)?;
		trace!(target: "sync", "{} -> NewBlock #{} ({})", peer_id, number, hash);

		if let Some(peer) = sync.peers.get_mut(&peer_id) {
			peer.known_blocks.insert(hash);
		}

		if number > sync.downloader.last_imported_block_number() + 1 {
			// too far ahead to import directly; note the peer's new head and
			// let the downloader fetch the ancestry
			trace!(target: "sync", "{}: Received unknown new block", peer_id);
			if let Some(peer) = sync.peers.get_mut(&peer_id) {
				peer.latest_hash = hash;
			}
			sync.sync_peer(io, peer_id, true);
			return Ok(());
		}

		match io.chain().queue_block(block_rlp.as_raw().to_vec()) {
			ImportResult::Success => {
				io.update_rating(peer_id, 100);
				sync.downloader.mark_block_imported(number, hash);
				if sync.downloader.headers_is_empty() {
					sync.downloader.force_clear_bodies();
					sync.complete_sync();
				}
			},
			ImportResult::FutureTimeKnown => {
				trace!(target: "sync", "{}: New block queued for the future", peer_id);
			},
			ImportResult::Malformed | ImportResult::BadChain => {
				debug!(target: "sync", "{}: Malformed new block received, disabling", peer_id);
				io.disable_peer(peer_id);
			},
			ImportResult::AlreadyInChain | ImportResult::AlreadyKnown => {},
			ImportResult::FutureTimeUnknown | ImportResult::UnknownParent => {
				let over_limit = {
					let peer = sync.peers.get_mut(&peer_id)
						.expect("peer existence checked at entry; qed");
					peer.unknown_new_blocks += 1;
					peer.unknown_new_blocks > sync.config.max_peer_unknown_new_blocks
				};
				if over_limit {
					debug!(target: "sync", "{}: Too many unknown new blocks, disabling", peer_id);
					io.disable_peer(peer_id);
					sync.restart_sync(io);
					return Ok(());
				}
				let needs_syncing = sync.peers.get(&peer_id)
					.and_then(|peer| peer.difficulty)
					.map_or(true, |peer_difficulty| difficulty > peer_difficulty);
				if needs_syncing {
					trace!(target: "sync", "{}: Received block with no known parent, syncing the peer", peer_id);
					sync.sync_peer(io, peer_id, true);
				}
			},
		}
		Ok(())
	}

	/// Handles `NewHashes` packet. Initiates headers download for any
	/// unknown hashes.
	fn on_peer_new_hashes(
		sync: &mut ChainSync,
		io: &mut dyn SyncIo,
		peer_id: PeerId,
		r: &Rlp,
	) -> Result<(), DecoderError> {
		if sync.peers.get(&peer_id).is_none() {
			trace!(target: "sync", "{}: Ignored new hashes from unregistered peer", peer_id);
			return Ok(());
		}
		let item_count = r.item_count()?;
		trace!(target: "sync", "{} -> NewHashes ({} entries)", peer_id, item_count);
		if item_count > MAX_NEW_HASHES {
			debug!(target: "sync", "{}: Too many new hashes, disabling", peer_id);
			io.disable_peer(peer_id);
			return Ok(());
		}

		if sync.peers.get(&peer_id).map_or(false, |peer| peer.is_conversing()) {
			trace!(target: "sync", "{}: Ignoring new hashes while already downloading", peer_id);
			return Ok(());
		}

		let mut unknowns = 0usize;
		let mut knowns = 0usize;
		let mut max_height = 0u64;
		for item in r.iter() {
			let hash: H256 = item.val_at(0)?;
			let height: u64 = item.val_at(1)?;
			io.update_rating(peer_id, 1);
			if let Some(peer) = sync.peers.get_mut(&peer_id) {
				peer.known_blocks.insert(hash);
			}
			match io.chain().block_status(BlockId::Hash(hash)) {
				BlockStatus::InChain | BlockStatus::Queued => knowns += 1,
				BlockStatus::Bad => {
					warn!(target: "sync", "{}: Announced a known-bad block hash {}", peer_id, hash);
					return Ok(());
				},
				BlockStatus::Unknown => {
					unknowns += 1;
					if height > max_height {
						max_height = height;
						if let Some(peer) = sync.peers.get_mut(&peer_id) {
							peer.latest_hash = hash;
						}
					}
				},
			}
		}
		trace!(target: "sync", "{} knowns, {} unknowns", knowns, unknowns);
		if unknowns > 0 {
			trace!(target: "sync", "New unknown block hashes discovered, syncing the peer");
			sync.sync_peer(io, peer_id, true);
		}
		Ok(())
	}

	/// Called when peer sends us new transactions
	fn on_peer_transactions(
		sync: &mut ChainSync,
		io: &mut dyn SyncIo,
		peer_id: PeerId,
		r: &Rlp,
	) -> Result<(), DecoderError> {
		if sync.peers.get(&peer_id).is_none() {
			trace!(target: "sync", "{}: Ignored transactions from unregistered peer", peer_id);
			return Ok(());
		}
		let item_count = r.item_count()?;
		trace!(target: "sync", "{} -> Transactions ({} entries)", peer_id, item_count);
		let mut transactions = Vec::with_capacity(item_count);
		for i in 0..item_count {
			let transaction = r.at(i)?.as_raw().to_vec();
			if let Some(peer) = sync.peers.get_mut(&peer_id) {
				peer.known_transactions.insert(keccak_hash::keccak(&transaction));
			}
			transactions.push(transaction);
		}
		io.chain().queue_transactions(transactions, peer_id);
		Ok(())
	}
}
