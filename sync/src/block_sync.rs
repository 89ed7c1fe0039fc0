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

//! Blockchain downloader. Accumulates headers and bodies from all active
//! peers into contiguous runs anchored at the local chain tip, assembles
//! them into blocks and feeds the verification queue.

use std::collections::{HashMap, HashSet};

use ethereum_types::{H256, U256};
use keccak_hash::{keccak, KECCAK_EMPTY_LIST_RLP, KECCAK_NULL_RLP};
use parity_bytes::Bytes;
use rlp::{DecoderError, Rlp, RlpStream};

use common_types::block_status::BlockStatus;
use common_types::blockchain_info::BlockChainInfo;
use common_types::header::Header;
use common_types::ids::BlockId;
use common_types::BlockNumber;

use ethcore::verification::queue::ImportResult;

use crate::range_collection::RangeCollection;
use crate::sync_io::{PeerId, SyncIo};

/// Max number of headers in a single request.
pub const MAX_HEADERS_TO_REQUEST: usize = 1024;
/// Max number of bodies in a single request.
pub const MAX_BODIES_TO_REQUEST: usize = 1024;

/// A downloaded header pending body pairing.
pub struct SyncHeader {
	/// Raw header RLP.
	pub data: Bytes,
	/// Header hash.
	pub hash: H256,
	/// Parent hash.
	pub parent: H256,
}

/// Identifies the header a body belongs to without a round-trip: an empty
/// body pairs only with the empty-markers header and is synthesized locally.
#[derive(PartialEq, Eq, Hash, Clone, Copy)]
struct HeaderId {
	transactions_root: H256,
	uncles: H256,
}

/// Data that needs to be requested from a peer.
pub enum BlockRequest {
	/// Headers by block number window.
	Headers {
		/// First block number of the window.
		start: BlockNumber,
		/// Number of headers.
		count: u64,
	},
	/// A single header, walking backwards in search of the fork point.
	ForkSearchHeader {
		/// Block number to probe.
		number: BlockNumber,
	},
	/// Block bodies by block hash.
	Bodies {
		/// Hashes of the blocks to fetch bodies for.
		hashes: Vec<H256>,
	},
}

/// What the caller should do after feeding a response to the downloader.
#[derive(Debug, PartialEq, Eq)]
pub enum DownloadAction {
	/// Carry on.
	None,
	/// Restart sync: the accumulated chain contradicts the local one.
	Restart,
	/// Restart sync and penalize the responding peer: its headers do not
	/// link up.
	PenalizeAndRestart,
}

/// Outcome of a block collection pass.
#[derive(Debug, PartialEq, Eq)]
pub enum CollectOutcome {
	/// Nothing of note.
	None,
	/// The queue rejected a block as malformed or extending a bad chain.
	Restart,
	/// A queued block no longer matches; downloads were reset and the fork
	/// point must be searched for again.
	ResetFork,
	/// All downloaded blocks were handed over; sync is complete.
	Complete,
}

/// Block download state and strategy: keeps the header and body runs, the
/// per-peer assignments and the fork search position.
pub struct BlockDownloader {
	/// Oldest block the local chain keeps; headers below are never useful.
	chain_start_block: BlockNumber,
	/// Highest block number seen on the network.
	highest_block: BlockNumber,
	/// Downloaded headers, keyed by the first block number of each run.
	headers: RangeCollection<SyncHeader>,
	/// Downloaded bodies, same shape, paired with `headers` by number.
	bodies: RangeCollection<Bytes>,
	/// Pending body identities, mapping back to the header block number.
	header_ids: HashMap<HeaderId, BlockNumber>,
	/// Block numbers being downloaded as headers.
	downloading_headers: HashSet<BlockNumber>,
	/// Block numbers being downloaded as bodies.
	downloading_bodies: HashSet<BlockNumber>,
	/// Per-peer header assignments.
	header_sync_peers: HashMap<PeerId, Vec<BlockNumber>>,
	/// Per-peer body assignments.
	body_sync_peers: HashMap<PeerId, Vec<BlockNumber>>,
	/// True once the common ancestor with the remote chain has been found.
	have_common_header: bool,
	/// Last block imported into the queue (or found common).
	last_imported_block: BlockNumber,
	/// Hash of the last imported block.
	last_imported_hash: H256,
	/// Highest peer total difficulty we committed to sync against.
	syncing_difficulty: U256,
}

impl BlockDownloader {
	/// Create a downloader anchored at the current chain tip.
	pub fn new(chain: &BlockChainInfo) -> Self {
		BlockDownloader {
			chain_start_block: chain.first_block_number,
			highest_block: 0,
			headers: RangeCollection::new(),
			bodies: RangeCollection::new(),
			header_ids: HashMap::new(),
			downloading_headers: HashSet::new(),
			downloading_bodies: HashSet::new(),
			header_sync_peers: HashMap::new(),
			body_sync_peers: HashMap::new(),
			have_common_header: false,
			last_imported_block: chain.best_block_number,
			last_imported_hash: chain.best_block_hash,
			syncing_difficulty: U256::zero(),
		}
	}

	/// Clear all download state, keeping the import position. Used when the
	/// accumulated data went stale but the chain anchor is still good.
	pub fn reset(&mut self) {
		self.headers.clear();
		self.bodies.clear();
		self.header_ids.clear();
		self.downloading_headers.clear();
		self.downloading_bodies.clear();
		self.header_sync_peers.clear();
		self.body_sync_peers.clear();
		self.syncing_difficulty = U256::zero();
	}

	/// Full restart: clear everything and re-anchor at the chain tip; the
	/// common header must be found again.
	pub fn reset_to_chain(&mut self, chain: &BlockChainInfo) {
		self.reset();
		self.highest_block = 0;
		self.have_common_header = false;
		self.chain_start_block = chain.first_block_number;
		self.last_imported_block = chain.best_block_number;
		self.last_imported_hash = chain.best_block_hash;
	}

	/// Last block number handed to the queue.
	pub fn last_imported_block_number(&self) -> BlockNumber {
		self.last_imported_block
	}

	/// Highest block number seen on the network so far.
	pub fn highest_block_number(&self) -> BlockNumber {
		self.highest_block
	}

	/// Note a block that reached the chain through another path (mining,
	/// direct gossip import).
	pub fn mark_block_imported(&mut self, number: BlockNumber, hash: H256) {
		if number > self.last_imported_block {
			self.last_imported_block = number;
			self.last_imported_hash = hash;
		}
		if number > self.highest_block {
			self.highest_block = number;
		}
		self.downloading_headers.remove(&number);
		self.downloading_bodies.remove(&number);
		self.headers.remove_tail(number);
		self.bodies.remove_tail(number);
	}

	/// True when no headers are accumulated.
	pub fn headers_is_empty(&self) -> bool {
		self.headers.is_empty()
	}

	/// Drop any bodies left without a header counterpart.
	pub fn force_clear_bodies(&mut self) {
		if !self.bodies.is_empty() {
			trace!(target: "sync", "Block bodies map is not empty, force-clearing");
			self.bodies.clear();
		}
	}

	/// Record the highest peer difficulty being synced against.
	pub fn set_syncing_difficulty(&mut self, difficulty: U256) {
		self.syncing_difficulty = difficulty;
	}

	/// Highest peer difficulty being synced against.
	pub fn syncing_difficulty(&self) -> U256 {
		self.syncing_difficulty
	}

	/// Release all download assignments held by the peer back to the pool.
	pub fn clear_peer_download(&mut self, peer_id: PeerId) {
		if let Some(blocks) = self.header_sync_peers.remove(&peer_id) {
			for block in blocks {
				self.downloading_headers.remove(&block);
			}
		}
		if let Some(blocks) = self.body_sync_peers.remove(&peer_id) {
			for block in blocks {
				self.downloading_bodies.remove(&block);
			}
		}
	}

	/// Decide what to request from an idle peer: bodies for validated
	/// headers first, then the next header window, or a single backward
	/// probe while the fork point is unknown.
	pub fn request_blocks(&mut self, io: &mut dyn SyncIo, peer_id: PeerId) -> Option<BlockRequest> {
		// body phase: only in front of the import point, over the first
		// contiguous validated header run
		if self.have_common_header {
			if let Some((start, headers)) = self.headers.first_range() {
				if start == self.last_imported_block + 1 {
					let mut needed_bodies = Vec::new();
					let mut needed_numbers = Vec::new();
					for (index, header) in headers.iter().enumerate() {
						if needed_bodies.len() >= MAX_BODIES_TO_REQUEST {
							break;
						}
						let block = start + index as BlockNumber;
						if !self.downloading_bodies.contains(&block) && !self.bodies.have_item(block) {
							needed_bodies.push(header.hash);
							needed_numbers.push(block);
						}
					}
					if !needed_bodies.is_empty() {
						for block in &needed_numbers {
							self.downloading_bodies.insert(*block);
						}
						self.body_sync_peers.insert(peer_id, needed_numbers);
						return Some(BlockRequest::Bodies { hashes: needed_bodies });
					}
				}
			}
		}

		if !self.have_common_header {
			// download backwards until the common block is found, one
			// header at a time
			let mut start = self.last_imported_block;
			if let Some((first, _)) = self.headers.first_range() {
				start = start.min(first.saturating_sub(1));
			}
			self.last_imported_block = start;
			self.last_imported_hash = io.chain()
				.block_hash(BlockId::Number(start))
				.unwrap_or_default();

			if start <= self.chain_start_block + 1 {
				// reached chain start
				self.have_common_header = true;
			} else {
				return Some(BlockRequest::ForkSearchHeader { number: start });
			}
		}

		// header phase: first gap above the import point, bounded by the
		// next known run
		let mut start = self.last_imported_block + 1;
		let mut run_iter = self.headers.ranges()
			.map(|(s, v)| (s, v.len() as BlockNumber))
			.collect::<Vec<_>>()
			.into_iter()
			.peekable();
		if let Some(&(first, len)) = run_iter.peek() {
			if start >= first {
				start = first + len;
				run_iter.next();
			}
		}

		while let Some(&(next_start, next_len)) = run_iter.peek() {
			let mut count = (MAX_HEADERS_TO_REQUEST as BlockNumber).min(next_start - start);
			while count > 0 && self.downloading_headers.contains(&start) {
				start += 1;
				count -= 1;
			}
			let mut numbers = Vec::new();
			for block in start..start + count {
				if !self.downloading_headers.contains(&block) {
					numbers.push(block);
					self.downloading_headers.insert(block);
				}
			}
			if !numbers.is_empty() {
				let count = numbers.len() as u64;
				self.header_sync_peers.insert(peer_id, numbers);
				debug_assert!(!self.headers.have_item(start));
				return Some(BlockRequest::Headers { start, count });
			} else if start >= next_start {
				start = next_start + next_len;
				run_iter.next();
			} else {
				// whole gap already assigned elsewhere
				return None;
			}
		}
		None
	}

	/// Add new block headers received from a peer.
	pub fn import_headers(
		&mut self,
		io: &mut dyn SyncIo,
		r: &Rlp,
		_peer_id: PeerId,
	) -> Result<DownloadAction, DecoderError> {
		let item_count = r.item_count()?;
		for i in 0..item_count {
			let header_rlp = r.at(i)?;
			let info = Header::decode_rlp(header_rlp.as_raw())?;
			let number = info.number();
			let hash = info.hash();

			if number < self.chain_start_block {
				trace!(target: "sync", "Skipping too old header {}", number);
				continue;
			}
			if self.headers.have_item(number) {
				trace!(target: "sync", "Skipping header {} (already downloaded)", number);
				continue;
			}
			if self.have_common_header && number <= self.last_imported_block {
				trace!(target: "sync", "Skipping header {} (already imported)", number);
				continue;
			}
			if number > self.highest_block {
				self.highest_block = number;
			}

			let status = io.chain().block_status(BlockId::Hash(hash));
			if status == BlockStatus::InChain || status == BlockStatus::Queued {
				self.have_common_header = true;
				self.last_imported_block = number;
				self.last_imported_hash = hash;

				let mismatch = self.headers.first_range().map_or(false, |(start, values)| {
					start == self.last_imported_block + 1
						&& values[0].parent != self.last_imported_hash
				});
				if mismatch {
					// the downloaded run belongs to another fork
					warn!(target: "sync", "Unknown parent of the downloaded headers, restarting sync");
					return Ok(DownloadAction::Restart);
				}
			} else {
				if self.have_common_header {
					// validate linkage against the neighbouring accumulated
					// headers
					let prev_mismatch = number.checked_sub(1)
						.and_then(|prev| self.headers.find_item(prev))
						.map_or(false, |prev| prev.hash != *info.parent_hash());
					let anchor_mismatch = number == self.last_imported_block + 1
						&& *info.parent_hash() != self.last_imported_hash;
					if prev_mismatch || anchor_mismatch {
						warn!(target: "sync", "Unknown block header {} ({}), restarting sync", number, hash);
						return Ok(DownloadAction::PenalizeAndRestart);
					}

					let next_mismatch = self.headers.find_item(number + 1)
						.map_or(false, |next| next.parent != hash);
					if next_mismatch {
						// everything above this header belongs to some other
						// fork; drop it and let it re-download
						trace!(target: "sync", "Dropping mismatching headers above {}", number);
						let boundary = number + 1;
						self.header_ids.retain(|_, n| *n <= number);
						self.downloading_headers.retain(|n| *n <= number);
						self.downloading_bodies.retain(|n| *n <= number);
						self.headers.remove_from(boundary);
						self.bodies.remove_from(boundary);
					}
				}

				let header_id = HeaderId {
					transactions_root: *info.transactions_root(),
					uncles: *info.uncles_hash(),
				};
				self.headers.insert_item(number, SyncHeader {
					data: header_rlp.as_raw().to_vec(),
					hash,
					parent: *info.parent_hash(),
				});
				if header_id.transactions_root == KECCAK_NULL_RLP
					&& header_id.uncles == KECCAK_EMPTY_LIST_RLP
				{
					// empty body, just mark as downloaded
					if !self.bodies.have_item(number) {
						let mut body = RlpStream::new_list(2);
						body.append_raw(&[0xc0], 1);
						body.append_raw(&[0xc0], 1);
						self.bodies.insert_item(number, body.out());
					}
				} else {
					self.header_ids.insert(header_id, number);
				}
			}
		}
		Ok(DownloadAction::None)
	}

	/// Add new block bodies received from a peer. Bodies are matched to
	/// their headers by recomputing the transactions root and uncles hash.
	pub fn import_bodies(&mut self, r: &Rlp) -> Result<(), DecoderError> {
		let item_count = r.item_count()?;
		for i in 0..item_count {
			let body = r.at(i)?;
			let transactions = body.at(0)?;
			let uncles = body.at(1)?;

			let transactions_root = triehash_ethereum::ordered_trie_root(
				transactions.iter().map(|t| t.as_raw().to_vec()),
			);
			let uncles_hash = keccak(uncles.as_raw());
			let id = HeaderId { transactions_root, uncles: uncles_hash };

			let number = match self.header_ids.get(&id) {
				Some(number) if self.headers.have_item(*number) => *number,
				_ => {
					trace!(target: "sync", "Ignored unknown block body");
					continue;
				},
			};
			if self.bodies.have_item(number) {
				trace!(target: "sync", "Skipping already downloaded block body {}", number);
				continue;
			}
			self.header_ids.remove(&id);
			self.bodies.insert_item(number, body.as_raw().to_vec());
		}
		Ok(())
	}

	/// Assemble and hand over every paired (header, body) prefix aligned
	/// with the import point.
	pub fn collect_blocks(&mut self, io: &mut dyn SyncIo) -> CollectOutcome {
		if !self.have_common_header || self.headers.is_empty() || self.bodies.is_empty() {
			return CollectOutcome::None;
		}

		let (header_start, header_len) = match self.headers.first_range() {
			Some((start, values)) => (start, values.len()),
			None => return CollectOutcome::None,
		};
		let (body_start, body_len) = match self.bodies.first_range() {
			Some((start, values)) => (start, values.len()),
			None => return CollectOutcome::None,
		};
		if header_start != body_start || header_start != self.last_imported_block + 1 {
			return CollectOutcome::None;
		}

		let mut success = 0usize;
		let mut future = 0usize;
		let mut known = 0usize;
		let mut consumed = 0usize;
		let count = header_len.min(body_len);
		for i in 0..count {
			let number = header_start + i as BlockNumber;
			let block = {
				let header = self.headers.find_item(number)
					.expect("the first range covers this index; qed");
				let body = self.bodies.find_item(number)
					.expect("the first range covers this index; qed");
				let body_rlp = Rlp::new(body);
				let mut stream = RlpStream::new_list(3);
				stream.append_raw(&header.data, 1);
				match (body_rlp.at(0), body_rlp.at(1)) {
					(Ok(transactions), Ok(uncles)) => {
						stream.append_raw(transactions.as_raw(), 1);
						stream.append_raw(uncles.as_raw(), 1);
					},
					_ => {
						debug!(target: "sync", "Undecodable body stored for block #{}", number);
						return CollectOutcome::Restart;
					},
				}
				stream.out()
			};

			consumed = i + 1;
			match io.chain().queue_block(block) {
				ImportResult::Success => {
					success += 1;
					let hash = self.headers.find_item(number)
						.expect("the first range covers this index; qed")
						.hash;
					if number > self.last_imported_block {
						self.last_imported_block = number;
						self.last_imported_hash = hash;
					}
				},
				ImportResult::Malformed => {
					debug!(target: "sync", "Malformed block #{}. Restarting sync.", number);
					return CollectOutcome::Restart;
				},
				ImportResult::BadChain => {
					debug!(target: "sync", "Block from the bad chain, block #{}. Restarting sync.", number);
					return CollectOutcome::Restart;
				},
				ImportResult::FutureTimeKnown => {
					future += 1;
				},
				ImportResult::AlreadyInChain => {
					known += 1;
					let hash = self.headers.find_item(number)
						.expect("the first range covers this index; qed")
						.hash;
					if number > self.last_imported_block {
						self.last_imported_block = number;
						self.last_imported_hash = hash;
					}
				},
				ImportResult::AlreadyKnown
				| ImportResult::FutureTimeUnknown
				| ImportResult::UnknownParent => {
					if number > self.last_imported_block {
						debug!(target: "sync",
							"Unknown parent or already known, block #{}. Resetting sync.", number);
						self.log_collected(success, future, known);
						self.reset();
						self.have_common_header = false;
						return CollectOutcome::ResetFork;
					}
					return CollectOutcome::None;
				},
			}
		}

		self.log_collected(success, future, known);

		if io.chain().queue_info().is_unknown_full() {
			warn!(target: "sync", "Too many unknown blocks, restarting sync");
			return CollectOutcome::Restart;
		}

		let trim_to = header_start + consumed as BlockNumber;
		self.headers.remove_head(trim_to);
		self.bodies.remove_head(trim_to);

		if self.headers.is_empty() {
			debug_assert!(self.bodies.is_empty());
			return CollectOutcome::Complete;
		}
		CollectOutcome::None
	}

	fn log_collected(&self, success: usize, future: usize, known: usize) {
		debug!(target: "sync", "{} imported OK, {} with future timestamps, {} already known",
			success, future, known);
	}

	/// Check the downloader portion of the sync invariants.
	pub fn check_invariants(&self, is_syncing: bool, chain_number: BlockNumber) -> Result<(), &'static str> {
		if !is_syncing && !self.headers.is_empty() {
			return Err("Got headers while not syncing");
		}
		if !is_syncing && !self.bodies.is_empty() {
			return Err("Got bodies while not syncing");
		}
		if is_syncing && chain_number > 0 && self.have_common_header && self.last_imported_block == 0 {
			return Err("Common block not found");
		}
		if is_syncing {
			if let Some((first, _)) = self.headers.first_range() {
				if self.last_imported_block >= first {
					return Err("Header is too old");
				}
			}
		}
		if self.header_sync_peers.is_empty() != self.downloading_headers.is_empty() {
			return Err("Header download map mismatch");
		}
		if self.body_sync_peers.is_empty() != self.downloading_bodies.is_empty()
			&& self.downloading_bodies.len() <= self.header_ids.len()
		{
			return Err("Body download map mismatch");
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_body_markers_synthesize_locally() {
		// the canonical empty body is exactly [[], []]
		let mut body = RlpStream::new_list(2);
		body.append_raw(&[0xc0], 1);
		body.append_raw(&[0xc0], 1);
		let body = body.out();

		let body_rlp = Rlp::new(&body);
		let transactions_root = triehash_ethereum::ordered_trie_root(
			body_rlp.at(0).unwrap().iter().map(|t| t.as_raw().to_vec()),
		);
		let uncles_hash = keccak(body_rlp.at(1).unwrap().as_raw());
		assert_eq!(transactions_root, KECCAK_NULL_RLP);
		assert_eq!(uncles_hash, KECCAK_EMPTY_LIST_RLP);
	}
}
