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

//! Test client: an in-memory chain behind the `BlockChainClient` trait with
//! a real verification queue in front of it. Drives the same import pipeline
//! a full node does, minus the database and the EVM.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver};
use ethereum_types::{H256, U256};
use parity_bytes::Bytes;
use parking_lot::RwLock;
use rlp::{Rlp, RlpStream};

use common_types::block::Block;
use common_types::block_status::BlockStatus;
use common_types::blockchain_info::BlockChainInfo;
use common_types::header::Header;
use common_types::ids::BlockId;
use common_types::io_message::ClientIoMessage;
use common_types::transaction::PooledTransaction;
use common_types::tree_route::TreeRoute;
use common_types::verification_queue_info::VerificationQueueInfo;
use common_types::BlockNumber;

use crate::client::{BlockChainClient, BlockInfo};
use crate::engines::NullEngine;
use crate::io::IoChannel;
use crate::verification::queue::{BlockQueue, Config as QueueConfig, ImportResult, QueueStatus};

struct BestBlock {
	hash: H256,
	number: BlockNumber,
	total_difficulty: U256,
}

// The chain body, shared with the queue as its `BlockInfo` view.
struct ChainState {
	blocks: RwLock<HashMap<H256, Bytes>>,
	numbers: RwLock<HashMap<BlockNumber, H256>>,
	difficulties: RwLock<HashMap<H256, U256>>,
	receipts: RwLock<HashMap<H256, Bytes>>,
	best: RwLock<BestBlock>,
}

impl BlockInfo for ChainState {
	fn is_known(&self, hash: &H256) -> bool {
		self.blocks.read().contains_key(hash)
	}
}

impl ChainState {
	fn header_of(&self, hash: &H256) -> Option<Header> {
		let blocks = self.blocks.read();
		let bytes = blocks.get(hash)?;
		let rlp = Rlp::new(bytes);
		Header::decode_rlp(rlp.at(0).ok()?.as_raw()).ok()
	}
}

/// In-memory chain client for tests.
pub struct TestBlockChainClient {
	state: Arc<ChainState>,
	queue: BlockQueue,
	genesis_hash: H256,
	message_receiver: Receiver<ClientIoMessage>,
	pooled_transactions: RwLock<Vec<PooledTransaction>>,
	injected_transactions: RwLock<Vec<(usize, Bytes)>>,
	state_nodes: RwLock<HashMap<H256, Bytes>>,
}

/// Standard two-field seal (mix hash + nonce) for generated blocks.
pub fn dummy_seal() -> Vec<Bytes> {
	vec![rlp::encode(&vec![0u8; 32]), rlp::encode(&vec![0u8; 8])]
}

impl Default for TestBlockChainClient {
	fn default() -> Self {
		Self::new()
	}
}

impl TestBlockChainClient {
	/// Create a client over a fresh chain containing only the genesis block.
	pub fn new() -> Self {
		Self::with_queue_config(QueueConfig::default())
	}

	/// Create a client with a custom verification queue configuration.
	pub fn with_queue_config(queue_config: QueueConfig) -> Self {
		let mut genesis = Block::default();
		genesis.header.set_difficulty(1000.into());
		genesis.header.set_seal(dummy_seal());
		let genesis_hash = genesis.header.hash();

		let state = Arc::new(ChainState {
			blocks: RwLock::new(HashMap::new()),
			numbers: RwLock::new(HashMap::new()),
			difficulties: RwLock::new(HashMap::new()),
			receipts: RwLock::new(HashMap::new()),
			best: RwLock::new(BestBlock {
				hash: genesis_hash,
				number: 0,
				total_difficulty: U256::zero(),
			}),
		});

		let (sender, receiver) = unbounded();
		let queue = BlockQueue::new(
			queue_config,
			Arc::new(NullEngine::new()),
			state.clone(),
			IoChannel::new(sender),
		);

		let client = TestBlockChainClient {
			state,
			queue,
			genesis_hash,
			message_receiver: receiver,
			pooled_transactions: RwLock::new(Vec::new()),
			injected_transactions: RwLock::new(Vec::new()),
			state_nodes: RwLock::new(HashMap::new()),
		};
		client.insert_block_bytes(genesis.rlp_bytes());
		client
	}

	/// Genesis hash of this chain.
	pub fn genesis_hash(&self) -> H256 {
		self.genesis_hash
	}

	/// Direct access to the verification queue.
	pub fn queue(&self) -> &BlockQueue {
		&self.queue
	}

	/// Drain all pending queue -> owner messages.
	pub fn pending_io_messages(&self) -> Vec<ClientIoMessage> {
		self.message_receiver.try_iter().collect()
	}

	/// Extend the canonical chain by `count` empty blocks.
	pub fn add_blocks(&self, count: usize) {
		self.add_blocks_with(count, b"", 100);
	}

	/// Extend the canonical chain by `count` blocks, each carrying one dummy
	/// transaction so that bodies are non-empty on the wire.
	pub fn add_blocks_with_transactions(&self, count: usize) {
		for _ in 0..count {
			let (parent, number) = {
				let best = self.state.best.read();
				(best.hash, best.number + 1)
			};
			let mut block = generate_block(&parent, number, b"", 100);
			let transaction = rlp::encode(&format!("tx-{}", number).into_bytes());
			block.header.set_transactions_root(
				triehash_ethereum::ordered_trie_root(vec![transaction.clone()]),
			);
			block.transactions.push(transaction);
			self.insert_block_bytes(block.rlp_bytes());
		}
	}

	/// Extend the canonical chain by `count` empty blocks with the given
	/// extra-data salt and per-block difficulty. Deterministic: two clients
	/// applying the same calls grow identical chains.
	pub fn add_blocks_with(&self, count: usize, extra: &[u8], difficulty: u64) {
		for _ in 0..count {
			let (parent, number) = {
				let best = self.state.best.read();
				(best.hash, best.number + 1)
			};
			let block = generate_block(&parent, number, extra, difficulty);
			self.insert_block_bytes(block.rlp_bytes());
		}
	}

	/// Insert a block directly, bypassing the queue. Updates the canonical
	/// mapping when the fork wins on total difficulty.
	pub fn insert_block_bytes(&self, bytes: Bytes) -> H256 {
		let header = Header::decode_rlp(
			Rlp::new(&bytes).at(0).expect("test block is a list").as_raw(),
		).expect("test block has a decodable header");
		let hash = header.hash();
		let number = header.number();

		let parent_td = self.state.difficulties.read()
			.get(header.parent_hash())
			.cloned()
			.unwrap_or_default();
		let total_difficulty = parent_td + *header.difficulty();

		self.state.blocks.write().insert(hash, bytes);
		self.state.difficulties.write().insert(hash, total_difficulty);
		self.state.receipts.write().entry(hash).or_insert_with(|| vec![0xc0]);

		let mut best = self.state.best.write();
		if total_difficulty > best.total_difficulty || hash == self.genesis_hash {
			best.hash = hash;
			best.number = number;
			best.total_difficulty = total_difficulty;

			let mut numbers = self.state.numbers.write();
			numbers.retain(|n, _| *n <= number);
			let mut cur_hash = hash;
			let mut cur_number = number;
			loop {
				if numbers.get(&cur_number) == Some(&cur_hash) {
					break;
				}
				numbers.insert(cur_number, cur_hash);
				if cur_number == 0 {
					break;
				}
				cur_number -= 1;
				cur_hash = match self.state.header_of(&cur_hash) {
					Some(header) => *header.parent_hash(),
					None => break,
				};
			}
		}
		hash
	}

	/// Drain verified blocks out of the queue into the chain. Returns the
	/// number of blocks inserted.
	pub fn import_verified_blocks(&self) -> usize {
		let mut imported = 0;
		loop {
			let blocks = self.queue.drain(128);
			if blocks.is_empty() {
				self.queue.done_drain(&[]);
				break;
			}
			let mut good = Vec::with_capacity(blocks.len());
			for block in blocks {
				let hash = self.insert_block_bytes(block.bytes);
				good.push(hash);
				imported += 1;
			}
			self.queue.done_drain(&[]);
			for hash in good {
				self.queue.note_ready(&hash);
			}
		}
		imported
	}

	/// Wait for verification to settle and import everything the queue
	/// produces. Returns the number of blocks inserted.
	pub fn flush_queue(&self) -> usize {
		let mut imported = 0;
		while self.queue.is_active() {
			self.queue.flush();
			imported += self.import_verified_blocks();
		}
		imported
	}

	/// Promote ripe future blocks, as the 1 s client timer would.
	pub fn tick_queue(&self) {
		self.queue.tick();
	}

	/// Set the transactions the pool offers for propagation.
	pub fn set_pooled_transactions(&self, transactions: Vec<PooledTransaction>) {
		*self.pooled_transactions.write() = transactions;
	}

	/// Transactions handed to the pool by peers, with the submitting peer id.
	pub fn transactions_received(&self) -> Vec<(usize, Bytes)> {
		self.injected_transactions.read().clone()
	}

	/// Make a state trie node available for node-data requests.
	pub fn set_state_node(&self, hash: H256, node: Bytes) {
		self.state_nodes.write().insert(hash, node);
	}

	fn resolve_hash(&self, id: BlockId) -> Option<H256> {
		match id {
			BlockId::Hash(hash) => Some(hash),
			BlockId::Number(number) => self.state.numbers.read().get(&number).cloned(),
			BlockId::Earliest => Some(self.genesis_hash),
			BlockId::Latest => Some(self.state.best.read().hash),
		}
	}
}

/// Build a deterministic empty block on top of `parent`.
pub fn generate_block(parent: &H256, number: BlockNumber, extra: &[u8], difficulty: u64) -> Block {
	let mut block = Block::default();
	block.header.set_parent_hash(*parent);
	block.header.set_number(number);
	// deterministic past timestamp
	block.header.set_timestamp(number);
	block.header.set_difficulty(difficulty.into());
	block.header.set_extra_data(extra.to_vec());
	block.header.set_seal(dummy_seal());
	block
}

impl BlockInfo for TestBlockChainClient {
	fn is_known(&self, hash: &H256) -> bool {
		self.state.is_known(hash)
	}
}

impl BlockChainClient for TestBlockChainClient {
	fn block_status(&self, id: BlockId) -> BlockStatus {
		let hash = match id {
			BlockId::Hash(hash) => hash,
			other => return match self.resolve_hash(other) {
				Some(_) => BlockStatus::InChain,
				None => BlockStatus::Unknown,
			},
		};
		if self.state.is_known(&hash) {
			return BlockStatus::InChain;
		}
		match self.queue.status(&hash) {
			QueueStatus::Ready | QueueStatus::Importing => BlockStatus::Queued,
			QueueStatus::Bad => BlockStatus::Bad,
			QueueStatus::UnknownParent | QueueStatus::Unknown => BlockStatus::Unknown,
		}
	}

	fn block_number(&self, id: BlockId) -> Option<BlockNumber> {
		match id {
			BlockId::Number(number) => {
				self.state.numbers.read().get(&number).map(|_| number)
			},
			BlockId::Hash(hash) => self.state.header_of(&hash).map(|h| h.number()),
			BlockId::Earliest => Some(0),
			BlockId::Latest => Some(self.state.best.read().number),
		}
	}

	fn block_hash(&self, id: BlockId) -> Option<H256> {
		let hash = self.resolve_hash(id)?;
		if self.state.is_known(&hash) {
			Some(hash)
		} else {
			None
		}
	}

	fn block_header(&self, id: BlockId) -> Option<Bytes> {
		let hash = self.resolve_hash(id)?;
		let blocks = self.state.blocks.read();
		let bytes = blocks.get(&hash)?;
		Some(Rlp::new(bytes).at(0).ok()?.as_raw().to_vec())
	}

	fn block_body(&self, id: BlockId) -> Option<Bytes> {
		let hash = self.resolve_hash(id)?;
		let blocks = self.state.blocks.read();
		let bytes = blocks.get(&hash)?;
		let rlp = Rlp::new(bytes);
		let mut body = RlpStream::new_list(2);
		body.append_raw(rlp.at(1).ok()?.as_raw(), 1);
		body.append_raw(rlp.at(2).ok()?.as_raw(), 1);
		Some(body.out())
	}

	fn block(&self, id: BlockId) -> Option<Bytes> {
		let hash = self.resolve_hash(id)?;
		self.state.blocks.read().get(&hash).cloned()
	}

	fn block_receipts(&self, hash: &H256) -> Option<Bytes> {
		self.state.receipts.read().get(hash).cloned()
	}

	fn block_total_difficulty(&self, id: BlockId) -> Option<U256> {
		let hash = self.resolve_hash(id)?;
		self.state.difficulties.read().get(&hash).cloned()
	}

	fn state_data(&self, hash: &H256) -> Option<Bytes> {
		self.state_nodes.read().get(hash).cloned()
	}

	fn tree_route(&self, from: &H256, to: &H256) -> Option<TreeRoute> {
		let mut from_branch = Vec::new();
		let mut to_branch = Vec::new();

		let mut from_header = self.state.header_of(from)?;
		let mut to_header = self.state.header_of(to)?;

		while from_header.number() > to_header.number() {
			from_branch.push(from_header.hash());
			from_header = self.state.header_of(from_header.parent_hash())?;
		}
		while to_header.number() > from_header.number() {
			to_branch.push(to_header.hash());
			to_header = self.state.header_of(to_header.parent_hash())?;
		}
		while from_header.hash() != to_header.hash() {
			from_branch.push(from_header.hash());
			to_branch.push(to_header.hash());
			from_header = self.state.header_of(from_header.parent_hash())?;
			to_header = self.state.header_of(to_header.parent_hash())?;
		}

		let index = from_branch.len();
		let ancestor = from_header.hash();
		to_branch.reverse();
		from_branch.extend(to_branch);
		Some(TreeRoute { blocks: from_branch, ancestor, index })
	}

	fn chain_info(&self) -> BlockChainInfo {
		let best = self.state.best.read();
		let pending = if self.queue.is_active() {
			best.total_difficulty + self.queue.total_difficulty()
		} else {
			best.total_difficulty
		};
		let best_block_timestamp = self.state.header_of(&best.hash)
			.map(|h| h.timestamp())
			.unwrap_or(0);
		BlockChainInfo {
			total_difficulty: best.total_difficulty,
			pending_total_difficulty: pending,
			genesis_hash: self.genesis_hash,
			best_block_hash: best.hash,
			best_block_number: best.number,
			best_block_timestamp,
			first_block_number: 0,
		}
	}

	fn queue_block(&self, bytes: Bytes) -> ImportResult {
		self.queue.import(bytes, false)
	}

	fn queue_info(&self) -> VerificationQueueInfo {
		self.queue.queue_info()
	}

	fn clear_queue(&self) {
		self.queue.clear();
	}

	fn transactions_to_propagate(&self, limit: usize) -> Vec<PooledTransaction> {
		let pooled = self.pooled_transactions.read();
		pooled.iter().take(limit).cloned().collect()
	}

	fn queue_transactions(&self, transactions: Vec<Bytes>, peer_id: usize) {
		let mut injected = self.injected_transactions.write();
		for transaction in transactions {
			injected.push((peer_id, transaction));
		}
	}
}

#[cfg(test)]
mod tests {
	use common_types::ids::BlockId;

	use super::TestBlockChainClient;
	use crate::client::BlockChainClient;

	#[test]
	fn grows_a_deterministic_chain() {
		let client1 = TestBlockChainClient::new();
		let client2 = TestBlockChainClient::new();
		client1.add_blocks(10);
		client2.add_blocks(10);
		assert_eq!(client1.chain_info().best_block_number, 10);
		assert_eq!(client1.chain_info().best_block_hash, client2.chain_info().best_block_hash);
	}

	#[test]
	fn reorganizes_to_heavier_fork() {
		let client = TestBlockChainClient::new();
		client.add_blocks(5);
		let light_head = client.chain_info().best_block_hash;

		// a heavier 3-block fork from genesis wins over 5 light blocks
		let fork = TestBlockChainClient::new();
		fork.add_blocks_with(3, b"fork", 500);
		for number in 1..=3u64 {
			let bytes = fork.block(BlockId::Number(number)).unwrap();
			client.insert_block_bytes(bytes);
		}

		let info = client.chain_info();
		assert_eq!(info.best_block_number, 3);
		assert_ne!(info.best_block_hash, light_head);
		assert_eq!(client.block_hash(BlockId::Number(5)), None);
	}

	#[test]
	fn imports_through_the_queue() {
		let source = TestBlockChainClient::new();
		source.add_blocks(4);

		let client = TestBlockChainClient::new();
		for number in 1..=4u64 {
			let bytes = source.block(BlockId::Number(number)).unwrap();
			client.queue_block(bytes);
		}
		client.flush_queue();
		assert_eq!(client.chain_info().best_block_number, 4);
		assert_eq!(client.chain_info().best_block_hash, source.chain_info().best_block_hash);
	}

	#[test]
	fn tree_route_spans_the_fork_point() {
		let client = TestBlockChainClient::new();
		client.add_blocks(2);
		let old_head = client.chain_info().best_block_hash;
		let ancestor = client.block_hash(BlockId::Number(1)).unwrap();

		let fork = TestBlockChainClient::new();
		fork.add_blocks(1);
		fork.add_blocks_with(2, b"fork", 400);
		for number in 2..=3u64 {
			client.insert_block_bytes(fork.block(BlockId::Number(number)).unwrap());
		}
		let new_head = client.chain_info().best_block_hash;

		let route = client.tree_route(&old_head, &new_head).unwrap();
		assert_eq!(route.ancestor, ancestor);
		assert_eq!(route.index, 1);
		assert_eq!(route.blocks.len(), 3);
		assert_eq!(route.blocks[2], new_head);
	}
}
