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

//! Outbound gossip: new transactions to interested peers, new chain heads
//! to a random subset, hash announcements to the rest.

use std::collections::HashMap;

use ethereum_types::H256;
use parity_bytes::Bytes;
use rand::seq::SliceRandom;
use rlp::RlpStream;

use common_types::ids::BlockId;

use crate::chain::sync_packet::SyncPacket;
use crate::chain::ChainSync;
use crate::sync_io::{PeerId, SyncIo};

/// Maximum number of transactions pushed out per round.
const MAX_TRANSACTIONS_TO_PROPAGATE: usize = 256;
/// Minimum number of peers that get the full new block.
const MIN_BLOCK_BROADCAST_PEERS: usize = 4;
/// A tip jump of this many blocks or more is a catch-up, not news worth
/// relaying block by block.
const MAX_NEW_BLOCK_BROADCAST_ROUTE: u64 = 20;

/// The block-exchange gossip engine.
pub struct SyncPropagator;

impl SyncPropagator {
	/// Send pooled transactions to every peer that should see them: peers
	/// that flagged themselves as waiting for transactions get the batch
	/// unconditionally, everyone else only what we never sent and they do
	/// not already know.
	pub fn propagate_new_transactions(sync: &mut ChainSync, io: &mut dyn SyncIo) -> usize {
		let transactions = io.chain().transactions_to_propagate(MAX_TRANSACTIONS_TO_PROPAGATE);

		let mut peer_transactions: HashMap<PeerId, Vec<usize>> = HashMap::new();
		for (i, transaction) in transactions.iter().enumerate() {
			let unsent = !sync.transactions_sent.contains(&transaction.hash);
			for (id, peer) in sync.peers.iter() {
				if peer.waiting_for_transactions
					|| (unsent && !peer.known_transactions.contains(&transaction.hash))
				{
					peer_transactions.entry(*id).or_insert_with(Vec::new).push(i);
				}
			}
		}
		for transaction in &transactions {
			sync.transactions_sent.insert(transaction.hash);
		}

		let mut sent = 0;
		let mut peer_ids: Vec<PeerId> = sync.peers.keys().cloned().collect();
		peer_ids.sort_unstable();
		for id in peer_ids {
			let indices = peer_transactions.remove(&id).unwrap_or_default();
			let waiting = sync.peers.get(&id).map_or(false, |p| p.waiting_for_transactions);

			let mut data = Bytes::new();
			let mut count = 0;
			if let Some(peer) = sync.peers.get_mut(&id) {
				for i in indices {
					peer.known_transactions.insert(transactions[i].hash);
					data.extend_from_slice(&transactions[i].rlp);
					count += 1;
				}
			}

			if count > 0 || waiting {
				let mut rlp = RlpStream::new_list(count);
				rlp.append_raw(&data, count);
				if let Err(e) = io.send(id, SyncPacket::TransactionsPacket, rlp.out()) {
					debug!(target: "sync", "Error sending transactions to {}: {:?}", id, e);
				}
				trace!(target: "sync", "{} <- Transactions ({} entries)", id, count);
				sent += count;
			}
			if let Some(peer) = sync.peers.get_mut(&id) {
				peer.waiting_for_transactions = false;
			}
		}
		sent
	}

	/// Relay a chain-tip change: full blocks to a small random subset of the
	/// peers that have not seen the head yet, hash announcements to the
	/// rest.
	pub fn propagate_new_blocks(sync: &mut ChainSync, io: &mut dyn SyncIo) {
		let chain = io.chain().chain_info();
		let current_hash = chain.best_block_hash;
		let latest_sent = sync.last_sent_block;
		if current_hash == latest_sent {
			return;
		}

		let from_difficulty = io.chain().block_total_difficulty(BlockId::Hash(latest_sent));
		let to_difficulty = io.chain().block_total_difficulty(BlockId::Hash(current_hash));
		let advanced = match (from_difficulty, to_difficulty) {
			(Some(from), Some(to)) => from < to,
			// the previously sent tip was reorganized away
			(None, Some(_)) => true,
			_ => false,
		};
		if !advanced {
			return;
		}

		let from_number = io.chain().block_number(BlockId::Hash(latest_sent)).unwrap_or(0);
		if chain.best_block_number.saturating_sub(from_number) < MAX_NEW_BLOCK_BROADCAST_ROUTE {
			let blocks: Vec<H256> = match io.chain().tree_route(&latest_sent, &current_hash) {
				Some(route) => route.blocks[route.index..].to_vec(),
				None => vec![current_hash],
			};

			let peers_without_block: Vec<PeerId> = sync.peers.iter()
				.filter(|&(_, peer)| !peer.known_blocks.contains(&current_hash))
				.map(|(id, _)| *id)
				.collect();
			let send_count = MIN_BLOCK_BROADCAST_PEERS
				.max((sync.peers.len() as f64).sqrt() as usize);
			let (to_send, to_announce) = random_partition(peers_without_block, send_count);

			for peer_id in &to_send {
				for block_hash in &blocks {
					let block = match io.chain().block(BlockId::Hash(*block_hash)) {
						Some(block) => block,
						None => continue,
					};
					let difficulty = io.chain()
						.block_total_difficulty(BlockId::Hash(*block_hash))
						.unwrap_or_default();
					let mut rlp = RlpStream::new_list(2);
					rlp.append_raw(&block, 1);
					rlp.append(&difficulty);
					if let Err(e) = io.send(*peer_id, SyncPacket::NewBlockPacket, rlp.out()) {
						debug!(target: "sync", "Error sending new block to {}: {:?}", peer_id, e);
					}
					if let Some(peer) = sync.peers.get_mut(peer_id) {
						peer.known_blocks.insert(*block_hash);
					}
				}
			}
			if !to_send.is_empty() {
				trace!(target: "sync", "Sent {} block(s) to {} peers", blocks.len(), to_send.len());
			}

			for peer_id in &to_announce {
				let mut rlp = RlpStream::new_list(blocks.len());
				for block_hash in &blocks {
					let number = io.chain()
						.block_number(BlockId::Hash(*block_hash))
						.unwrap_or_default();
					rlp.begin_list(2);
					rlp.append(block_hash);
					rlp.append(&number);
				}
				if let Err(e) = io.send(*peer_id, SyncPacket::NewBlockHashesPacket, rlp.out()) {
					debug!(target: "sync", "Error announcing new block to {}: {:?}", peer_id, e);
				}
				if let Some(peer) = sync.peers.get_mut(peer_id) {
					peer.known_blocks.insert(current_hash);
				}
			}
			if !to_announce.is_empty() {
				trace!(target: "sync", "Announced {} block(s) to {} peers", blocks.len(), to_announce.len());
			}
		}
		sync.last_sent_block = current_hash;
	}
}

// Shuffle and split: the first `count` go one way, the rest the other.
fn random_partition(mut peers: Vec<PeerId>, count: usize) -> (Vec<PeerId>, Vec<PeerId>) {
	if count >= peers.len() {
		return (peers, Vec::new());
	}
	let mut rng = rand::thread_rng();
	peers.shuffle(&mut rng);
	let rest = peers.split_off(count);
	(peers, rest)
}
