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

//! Traits implemented by a blockchain client.

use ethereum_types::{H256, U256};
use parity_bytes::Bytes;

use common_types::block_status::BlockStatus;
use common_types::blockchain_info::BlockChainInfo;
use common_types::ids::BlockId;
use common_types::transaction::PooledTransaction;
use common_types::tree_route::TreeRoute;
use common_types::verification_queue_info::VerificationQueueInfo;
use common_types::BlockNumber;

use crate::verification::queue::ImportResult;

/// The narrow chain view the verification queue needs to classify incoming
/// blocks.
pub trait BlockInfo: Send + Sync {
	/// Is the block corresponding to the given hash in the chain?
	fn is_known(&self, hash: &H256) -> bool;
}

/// Blockchain database dependency surface of the sync machinery. Everything
/// here is a read, except for the queue and transaction-pool facades at the
/// bottom; chain writes happen only through queue draining, outside this
/// trait.
pub trait BlockChainClient: BlockInfo {
	/// Get block status by block header hash.
	fn block_status(&self, id: BlockId) -> BlockStatus;

	/// Get block number by its id.
	fn block_number(&self, id: BlockId) -> Option<BlockNumber>;

	/// Get block hash by its id.
	fn block_hash(&self, id: BlockId) -> Option<H256>;

	/// Get raw block header RLP by block id.
	fn block_header(&self, id: BlockId) -> Option<Bytes>;

	/// Get raw block body RLP by block id (a two-item list: transactions and
	/// uncles).
	fn block_body(&self, id: BlockId) -> Option<Bytes>;

	/// Get raw block RLP by block id.
	fn block(&self, id: BlockId) -> Option<Bytes>;

	/// Get the RLP list of receipts for the block with the given hash.
	fn block_receipts(&self, hash: &H256) -> Option<Bytes>;

	/// Get the total difficulty accumulated up to the given block.
	fn block_total_difficulty(&self, id: BlockId) -> Option<U256>;

	/// Get a state trie node by its hash.
	fn state_data(&self, hash: &H256) -> Option<Bytes>;

	/// Get the route between two block hashes along the canonical tree.
	fn tree_route(&self, from: &H256, to: &H256) -> Option<TreeRoute>;

	/// Get blockchain information.
	fn chain_info(&self) -> BlockChainInfo;

	/// Hand a candidate block received from the network to the verification
	/// queue.
	fn queue_block(&self, bytes: Bytes) -> ImportResult;

	/// Get verification queue information.
	fn queue_info(&self) -> VerificationQueueInfo;

	/// Clear the verification queue.
	fn clear_queue(&self);

	/// Pooled transactions ready to be gossiped, best first, at most `limit`.
	fn transactions_to_propagate(&self, limit: usize) -> Vec<PooledTransaction>;

	/// Queue transactions received from a peer for addition to the pool.
	fn queue_transactions(&self, transactions: Vec<Bytes>, peer_id: usize);
}
