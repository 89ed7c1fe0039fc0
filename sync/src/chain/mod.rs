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

//! The per-node wire engine and synchronization state machine.
//!
//! `ChainSync` owns one status record per connected peer (including the
//! `asking` conversation state), decodes incoming packets, drives the
//! downloader, serves symmetric requests and gossips transactions and new
//! blocks. Every method is to be called from the capability host's network
//! thread; there is no internal locking.

mod handler;
mod propagator;
mod requester;
mod supplier;
pub mod sync_packet;

use std::collections::{HashMap, HashSet};

use ethereum_types::{H256, U256};
use parity_bytes::Bytes;

use common_types::BlockNumber;
use ethcore::client::BlockChainClient;

use crate::block_sync::{BlockDownloader, BlockRequest};
use crate::chain::handler::SyncHandler;
use crate::chain::propagator::SyncPropagator;
use crate::chain::requester::SyncRequester;
use crate::sync_io::{PeerId, SyncIo};

/// A peer conversation that stalls this long is torn down.
const PEER_CONVERSATION_TIMEOUT_SEC: u64 = 10;

pub(crate) fn unix_now() -> u64 {
	::time::get_time().sec as u64
}

/// Sync state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
	/// Downloads were reset; about to pick a peer to sync against.
	NotSynced,
	/// Nothing to download; gossip only.
	Idle,
	/// The verification queue is full; downloads are paused until it drains.
	Waiting,
	/// Headers and bodies are being downloaded.
	Blocks,
}

/// What we last asked a peer for, pending its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerAsking {
	/// Nothing outstanding.
	Nothing,
	/// The fork-check header.
	ForkHeader,
	/// A batch of block headers.
	BlockHeaders,
	/// A batch of block bodies.
	BlockBodies,
}

/// Everything we track about a connected peer.
pub struct PeerInfo {
	/// Protocol version advertised in the status exchange.
	pub protocol_version: u32,
	/// Network id advertised in the status exchange.
	pub network_id: U256,
	/// Peer's advertised total difficulty, refreshed on status.
	pub difficulty: Option<U256>,
	/// The latest block hash the peer claims to have.
	pub latest_hash: H256,
	/// Peer's genesis hash.
	pub genesis: H256,
	/// The outstanding conversation with this peer.
	pub asking: PeerAsking,
	/// When the conversation started, or the last packet arrived.
	pub ask_time: u64,
	/// Blocks the peer is known to have; not worth sending again.
	pub known_blocks: HashSet<H256>,
	/// Transactions the peer is known to have.
	pub known_transactions: HashSet<H256>,
	/// How many new-block announcements with unknown parents this peer made.
	pub unknown_new_blocks: u32,
	/// The peer asked for transactions and has not been served yet.
	pub waiting_for_transactions: bool,
}

impl PeerInfo {
	/// True while a response from this peer is outstanding.
	pub fn is_conversing(&self) -> bool {
		self.asking != PeerAsking::Nothing
	}
}

/// Outcome the transaction pool reported for a transaction a peer sent us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionImportResult {
	/// Fresh and valid.
	Success,
	/// Pool already had it.
	AlreadyKnown,
	/// Undecodable or invalid.
	Malformed,
}

/// Configuration for the sync engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
	/// Protocol version to advertise and require.
	pub protocol_version: u32,
	/// Network id to advertise and require.
	pub network_id: U256,
	/// Fork-check block: peers must present this block number with exactly
	/// this extra-data, or be dropped as members of another fork.
	pub fork_block: Option<(BlockNumber, Bytes)>,
	/// Client-version substrings that are not welcome.
	pub banned_client_versions: Vec<String>,
	/// Ban a peer announcing more than this many new blocks with unknown
	/// parents.
	pub max_peer_unknown_new_blocks: u32,
}

impl Default for SyncConfig {
	fn default() -> Self {
		SyncConfig {
			protocol_version: 63,
			network_id: U256::from(1),
			fork_block: None,
			banned_client_versions: vec!["/v0.7.0/".into()],
			max_peer_unknown_new_blocks: 1024,
		}
	}
}

/// Synchronization status snapshot for the informant layer.
#[derive(Debug, Clone)]
pub struct SyncStatus {
	/// The state the machine is in.
	pub state: SyncState,
	/// Advertised protocol version.
	pub protocol_version: u32,
	/// Network id.
	pub network_id: U256,
	/// The block the current sync round started from.
	pub start_block_number: BlockNumber,
	/// Last block handed to the verification queue.
	pub last_imported_block_number: BlockNumber,
	/// Highest block number seen on the network.
	pub highest_block_number: BlockNumber,
	/// Number of connected peers.
	pub num_peers: usize,
}

/// The block-exchange protocol engine and sync driver.
pub struct ChainSync {
	/// Current state of the state machine.
	pub(crate) state: SyncState,
	/// Engine configuration.
	pub(crate) config: SyncConfig,
	/// Connected peers.
	pub(crate) peers: HashMap<PeerId, PeerInfo>,
	/// Header and body download machinery.
	pub(crate) downloader: BlockDownloader,
	/// Chain tip when the current sync round started.
	pub(crate) starting_block: BlockNumber,
	/// The chain head peers were last told about.
	pub(crate) last_sent_block: H256,
	/// Transactions we have already pushed out.
	pub(crate) transactions_sent: HashSet<H256>,
}

impl ChainSync {
	/// Create the engine over the given chain.
	pub fn new(config: SyncConfig, chain: &dyn BlockChainClient) -> ChainSync {
		let chain_info = chain.chain_info();
		ChainSync {
			state: SyncState::Idle,
			config,
			peers: HashMap::new(),
			downloader: BlockDownloader::new(&chain_info),
			starting_block: chain_info.best_block_number,
			last_sent_block: chain_info.best_block_hash,
			transactions_sent: HashSet::new(),
		}
	}

	/// The engine configuration.
	pub fn config(&self) -> &SyncConfig {
		&self.config
	}

	/// Current state of the state machine.
	pub fn state(&self) -> SyncState {
		self.state
	}

	/// True unless the machine has caught up with the network.
	pub fn is_syncing(&self) -> bool {
		self.state != SyncState::Idle
	}

	/// Status snapshot.
	pub fn status(&self) -> SyncStatus {
		SyncStatus {
			state: self.state,
			protocol_version: self.config.protocol_version,
			network_id: self.config.network_id,
			start_block_number: self.starting_block,
			last_imported_block_number: self.downloader.last_imported_block_number(),
			highest_block_number: self.downloader.highest_block_number()
				.max(self.downloader.last_imported_block_number()),
			num_peers: self.peers.len(),
		}
	}

	/// A new peer session opened: greet it with our status.
	pub fn on_peer_connected(&mut self, io: &mut dyn SyncIo, peer_id: PeerId) {
		trace!(target: "sync", "{}: Connected", peer_id);
		SyncRequester::send_status(self, io, peer_id);
	}

	/// A peer session closed: release its downloads and move on.
	pub fn on_peer_aborting(&mut self, io: &mut dyn SyncIo, peer_id: PeerId) {
		trace!(target: "sync", "{}: Disconnected", peer_id);
		self.downloader.clear_peer_download(peer_id);
		self.peers.remove(&peer_id);
		self.continue_sync(io);
		self.enforce_invariants(io);
	}

	/// Decode and route an incoming packet. Returns false for opcodes that
	/// do not belong to this subprotocol.
	pub fn on_packet(&mut self, io: &mut dyn SyncIo, peer_id: PeerId, packet_id: u8, data: &[u8]) -> bool {
		let handled = SyncHandler::on_packet(self, io, peer_id, packet_id, data);
		self.enforce_invariants(io);
		handled
	}

	/// The verification queue dropped below its caps; resume downloads.
	pub fn on_room_available(&mut self, io: &mut dyn SyncIo) {
		if self.state == SyncState::Waiting {
			trace!(target: "sync", "Block queue drained, resuming sync");
			self.state = SyncState::Blocks;
			self.continue_sync(io);
		}
	}

	/// The transaction pool finished importing a transaction relayed by
	/// `peer_id`; settle the peer's account. Network-thread callback.
	pub fn on_transaction_imported(
		&mut self,
		io: &mut dyn SyncIo,
		result: TransactionImportResult,
		hash: H256,
		peer_id: PeerId,
	) {
		if let Some(peer) = self.peers.get_mut(&peer_id) {
			peer.known_transactions.insert(hash);
		}
		match result {
			TransactionImportResult::Malformed => io.update_rating(peer_id, -100),
			TransactionImportResult::AlreadyKnown => {
				// no point relaying what the network already has
				self.transactions_sent.insert(hash);
				io.update_rating(peer_id, 0);
			},
			TransactionImportResult::Success => io.update_rating(peer_id, 100),
		}
	}

	/// Tear down conversations that stopped answering.
	pub fn maintain_peers(&mut self, io: &mut dyn SyncIo) {
		let now = unix_now();
		let mut aborting = Vec::new();
		for (peer_id, peer) in &self.peers {
			if peer.is_conversing() && now.saturating_sub(peer.ask_time) > PEER_CONVERSATION_TIMEOUT_SEC {
				debug!(target: "sync", "{}: Timeout while asking {:?}", peer_id, peer.asking);
				aborting.push(*peer_id);
			}
		}
		for peer_id in aborting {
			io.disconnect_peer(peer_id);
		}
	}

	/// Periodic upkeep: keep downloads moving and, once caught up, gossip
	/// transactions and the chain head. Call roughly once a second.
	pub fn maintain_sync(&mut self, io: &mut dyn SyncIo) {
		if self.state == SyncState::Blocks || self.state == SyncState::NotSynced {
			self.continue_sync(io);
		}
		if !self.is_syncing() && io.chain().is_known(&self.last_sent_block) {
			SyncPropagator::propagate_new_transactions(self, io);
			SyncPropagator::propagate_new_blocks(self, io);
		}
		self.enforce_invariants(io);
	}

	/// The chain tip moved (a mined or imported block): let peers know.
	pub fn chain_new_blocks(&mut self, io: &mut dyn SyncIo) {
		if !self.is_syncing() && io.chain().is_known(&self.last_sent_block) {
			SyncPropagator::propagate_new_blocks(self, io);
		}
	}

	// Give every idle peer something to do.
	pub(crate) fn continue_sync(&mut self, io: &mut dyn SyncIo) {
		let mut peer_ids: Vec<PeerId> = self.peers.keys().cloned().collect();
		peer_ids.sort_unstable();
		for peer_id in peer_ids {
			self.sync_peer(io, peer_id, false);
		}
	}

	// Consider syncing against this peer: chase its chain when it claims a
	// higher total difficulty than anything we are on, otherwise put it to
	// work on the current download.
	pub(crate) fn sync_peer(&mut self, io: &mut dyn SyncIo, peer_id: PeerId, force: bool) {
		let (asking, peer_difficulty, peer_latest) = match self.peers.get(&peer_id) {
			Some(peer) => (peer.asking, peer.difficulty, peer.latest_hash),
			None => return,
		};
		if asking != PeerAsking::Nothing {
			trace!(target: "sync", "{}: Can't sync - outstanding ask {:?}", peer_id, asking);
			return;
		}
		if self.state == SyncState::Waiting {
			trace!(target: "sync", "{}: Waiting for the block queue", peer_id);
			return;
		}

		let chain_info = io.chain().chain_info();
		let our_difficulty = chain_info.pending_total_difficulty;
		let syncing_difficulty = self.downloader.syncing_difficulty().max(our_difficulty);
		let peer_difficulty = peer_difficulty.unwrap_or_default();

		if force || peer_difficulty > syncing_difficulty {
			if peer_difficulty > syncing_difficulty {
				debug!(target: "sync", "{}: Discovered new highest difficulty {}", peer_id, peer_difficulty);
			}
			self.downloader.set_syncing_difficulty(peer_difficulty);
			if self.state == SyncState::Idle || self.state == SyncState::NotSynced {
				info!(target: "sync", "Starting full sync");
				self.state = SyncState::Blocks;
			}
			SyncRequester::request_headers_by_hash(self, io, peer_id, &peer_latest, 1, 0, false);
			if let Some(peer) = self.peers.get_mut(&peer_id) {
				peer.waiting_for_transactions = true;
			}
			return;
		}

		if self.state == SyncState::Blocks {
			self.request_blocks(io, peer_id);
		}
	}

	// Hand the peer the next piece of download work.
	fn request_blocks(&mut self, io: &mut dyn SyncIo, peer_id: PeerId) {
		self.downloader.clear_peer_download(peer_id);
		if io.chain().queue_info().is_known_full() {
			trace!(target: "sync", "Waiting for block queue before downloading");
			self.pause_sync();
			return;
		}
		match self.downloader.request_blocks(io, peer_id) {
			Some(BlockRequest::Headers { start, count }) => {
				SyncRequester::request_headers_by_number(self, io, peer_id, start, count, 0, false);
			},
			Some(BlockRequest::ForkSearchHeader { number }) => {
				SyncRequester::request_headers_by_number(self, io, peer_id, number, 1, 0, false);
			},
			Some(BlockRequest::Bodies { hashes }) => {
				SyncRequester::request_bodies(self, io, peer_id, hashes);
			},
			None => {},
		}
	}

	/// Throw away all download progress and re-anchor at the chain tip.
	pub fn restart_sync(&mut self, io: &mut dyn SyncIo) {
		debug!(target: "sync", "Restarting sync");
		let chain_info = io.chain().chain_info();
		self.downloader.reset_to_chain(&chain_info);
		io.chain().clear_queue();
		self.starting_block = chain_info.best_block_number;
		self.state = SyncState::NotSynced;
	}

	/// Called after all blocks have been downloaded.
	pub(crate) fn complete_sync(&mut self) {
		debug!(target: "sync", "Sync complete");
		self.downloader.reset();
		self.state = SyncState::Idle;
	}

	// Enter the waiting state until the queue signals room.
	fn pause_sync(&mut self) {
		trace!(target: "sync", "Block queue full, pausing sync");
		self.state = SyncState::Waiting;
	}

	/// Check the cross-structure consistency rules. Exposed for tests; the
	/// engine itself restarts the sync when they break.
	pub fn check_invariants(&self, io: &dyn SyncIo) -> Result<(), &'static str> {
		let chain_number = io.chain().chain_info().best_block_number;
		self.downloader.check_invariants(self.is_syncing(), chain_number)
	}

	fn enforce_invariants(&mut self, io: &mut dyn SyncIo) {
		if let Err(violation) = self.check_invariants(io) {
			warn!(target: "sync", "Sync invariant broken ({}), restarting sync", violation);
			self.restart_sync(io);
		}
	}
}
