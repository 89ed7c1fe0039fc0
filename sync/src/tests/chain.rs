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

//! End-to-end synchronization scenarios over the virtual network.

use std::collections::VecDeque;

use ethereum_types::U256;
use parking_lot::RwLock;
use rlp::RlpStream;

use common_types::transaction::PooledTransaction;
use ethcore::client::BlockChainClient;
use ethcore::client::TestBlockChainClient;
use ethcore::verification::queue::Config as QueueConfig;

use crate::chain::sync_packet::SyncPacket;
use crate::chain::{ChainSync, PeerAsking, SyncConfig, SyncState, TransactionImportResult};
use crate::tests::helpers::{TestIo, TestNet};

fn init_log() {
	::env_logger::try_init().ok();
}

#[test]
fn linear_catch_up() {
	init_log();
	let mut net = TestNet::new(2);
	net.peer(1).chain.add_blocks(10);
	net.sync();

	let synced = net.peer(0).chain.chain_info();
	let source = net.peer(1).chain.chain_info();
	assert_eq!(synced.best_block_number, 10);
	assert_eq!(synced.best_block_hash, source.best_block_hash);

	let sync = net.peer(0).sync.read();
	assert_eq!(sync.state(), SyncState::Idle);
	assert_eq!(sync.status().last_imported_block_number, 10);
}

#[test]
fn catch_up_fetches_bodies() {
	init_log();
	let mut net = TestNet::new(2);
	net.peer(1).chain.add_blocks_with_transactions(8);
	net.sync();

	let synced = net.peer(0).chain.chain_info();
	let source = net.peer(1).chain.chain_info();
	assert_eq!(synced.best_block_number, 8);
	assert_eq!(synced.best_block_hash, source.best_block_hash);
}

#[test]
fn reconciles_a_heavier_fork() {
	init_log();
	let mut net = TestNet::new(3);
	// peer 1: ten light blocks. peer 2: the same first seven blocks, then a
	// heavier fork.
	net.peer(1).chain.add_blocks(10);
	net.peer(2).chain.add_blocks(7);
	net.peer(2).chain.add_blocks_with(4, b"fork", 400);
	net.sync();

	let synced = net.peer(0).chain.chain_info();
	let fork = net.peer(2).chain.chain_info();
	assert!(fork.total_difficulty > net.peer(1).chain.chain_info().total_difficulty);
	assert_eq!(synced.best_block_hash, fork.best_block_hash);
	assert_eq!(synced.best_block_number, 11);
	assert_eq!(net.peer(0).sync.read().state(), SyncState::Idle);
}

#[test]
fn new_block_announcement_triggers_sync() {
	init_log();
	let mut net = TestNet::new(2);
	net.sync();

	// both are at genesis; peer 1 mines a block and announces its hash
	net.peer(1).chain.add_blocks(1);
	let info = net.peer(1).chain.chain_info();
	let mut announcement = RlpStream::new_list(1);
	announcement.begin_list(2);
	announcement.append(&info.best_block_hash);
	announcement.append(&info.best_block_number);
	{
		let peer = net.peer(0);
		let mut io = TestIo::new(&peer.chain, &peer.queue, Some(1));
		peer.sync.write().on_packet(&mut io, 1, SyncPacket::NewBlockHashesPacket.id(), &announcement.out());
	}
	net.sync();

	assert_eq!(net.peer(0).chain.chain_info().best_block_hash, info.best_block_hash);
}

#[test]
fn flood_of_new_hashes_disables_peer() {
	init_log();
	let mut net = TestNet::new(2);
	net.sync();

	let mut announcement = RlpStream::new_list(1025);
	for i in 0..1025u64 {
		announcement.begin_list(2);
		announcement.append(&ethereum_types::H256::from_low_u64_be(i));
		announcement.append(&i);
	}
	let peer = net.peer(0);
	let mut io = TestIo::new(&peer.chain, &peer.queue, Some(1));
	peer.sync.write().on_packet(&mut io, 1, SyncPacket::NewBlockHashesPacket.id(), &announcement.out());
	assert!(io.disabled.contains(&1));
}

#[test]
fn malformed_header_response_disables_peer() {
	init_log();
	let mut net = TestNet::new(2);
	net.sync();

	{
		// put peer 1 into a headers conversation, then answer with garbage
		let peer = net.peer(0);
		let mut sync = peer.sync.write();
		sync.peers.get_mut(&1).unwrap().asking = PeerAsking::BlockHeaders;
		sync.state = SyncState::Blocks;
		let mut io = TestIo::new(&peer.chain, &peer.queue, Some(1));
		let garbage = vec![0xc1, 0x81];
		sync.on_packet(&mut io, 1, SyncPacket::BlockHeadersPacket.id(), &garbage);
		assert!(io.disabled.contains(&1));
	}
}

#[test]
fn unsolicited_headers_are_ignored() {
	init_log();
	let mut net = TestNet::new(2);
	net.sync();

	let header = net.peer(1).chain.block_header(common_types::ids::BlockId::Number(0)).unwrap();
	let mut packet = RlpStream::new_list(1);
	packet.append_raw(&header, 1);

	let peer = net.peer(0);
	let mut io = TestIo::new(&peer.chain, &peer.queue, Some(1));
	peer.sync.write().on_packet(&mut io, 1, SyncPacket::BlockHeadersPacket.id(), &packet.out());
	assert!(io.disabled.is_empty());
	assert!(peer.queue.read().is_empty());
}

#[test]
fn transaction_gossip_is_selective() {
	init_log();
	// node 0 plus three peers: peer 1 already knows the transaction, peer 2
	// asked for transactions, peer 3 neither
	let mut net = TestNet::new(4);
	net.sync();

	let transaction = PooledTransaction::new(rlp::encode(&b"pay alice".to_vec()));
	net.peer(0).chain.set_pooled_transactions(vec![transaction.clone()]);
	{
		let mut sync = net.peer(0).sync.write();
		sync.peers.get_mut(&1).unwrap().known_transactions.insert(transaction.hash);
		sync.peers.get_mut(&2).unwrap().waiting_for_transactions = true;
	}

	net.maintain_sync(0);

	let recipients: Vec<usize> = net.peer(0).queue.read().iter()
		.filter(|p| p.packet_id == SyncPacket::TransactionsPacket.id())
		.map(|p| p.recipient)
		.collect();
	assert!(recipients.contains(&2));
	assert!(recipients.contains(&3));
	assert!(!recipients.contains(&1));

	// deliver and verify arrival in the peers' pools
	net.sync();
	assert_eq!(net.peer(3).chain.transactions_received().len(), 1);
	assert!(net.peer(1).chain.transactions_received().is_empty());

	// a second round sends nothing new
	net.maintain_sync(0);
	let second: Vec<usize> = net.peer(0).queue.read().iter()
		.filter(|p| p.packet_id == SyncPacket::TransactionsPacket.id())
		.map(|p| p.recipient)
		.collect();
	assert!(second.is_empty());
}

#[test]
fn propagates_fresh_chain_head() {
	init_log();
	let mut net = TestNet::new(2);
	net.sync();

	net.peer(0).chain.add_blocks(1);
	net.maintain_sync(0);
	net.sync();

	assert_eq!(
		net.peer(1).chain.chain_info().best_block_hash,
		net.peer(0).chain.chain_info().best_block_hash,
	);
}

#[test]
fn fork_block_check_drops_other_fork() {
	init_log();
	let mut config = SyncConfig::default();
	config.fork_block = Some((5, b"dao-hard-fork".to_vec()));
	let mut net = TestNet::new_with_config(3, config);

	// peer 1 carries the fork marker at block 5, peer 2 does not
	net.peer(1).chain.add_blocks(4);
	net.peer(1).chain.add_blocks_with(1, b"dao-hard-fork", 100);
	net.peer(1).chain.add_blocks(3);
	net.peer(2).chain.add_blocks(4);
	net.peer(2).chain.add_blocks_with(1, b"", 150);
	net.peer(2).chain.add_blocks(5);
	net.sync();

	let sync = net.peer(0).sync.read();
	assert!(sync.peers.contains_key(&1));
	assert!(!sync.peers.contains_key(&2));
	assert_eq!(
		net.peer(0).chain.chain_info().best_block_hash,
		net.peer(1).chain.chain_info().best_block_hash,
	);
}

#[test]
fn pauses_and_resumes_on_queue_pressure() {
	init_log();
	let queue_config = QueueConfig {
		max_known_count: 0,
		max_known_size: 0,
		max_unknown_count: 0,
		max_unknown_size: 0,
		verifier_threads: Some(1),
	};
	let chain = TestBlockChainClient::with_queue_config(queue_config);
	let source = TestBlockChainClient::new();
	source.add_blocks(2);

	let mut sync = ChainSync::new(SyncConfig::default(), &chain);
	let queue = RwLock::new(VecDeque::new());

	// a block sits unclaimed in the queue, putting it over its zero caps
	chain.queue_block(source.block(common_types::ids::BlockId::Number(1)).unwrap());
	chain.queue().flush();
	assert!(chain.queue_info().is_known_full());

	// a peer with a better chain shows up mid-download
	{
		let mut io = TestIo::new(&chain, &queue, None);
		let status = {
			let info = source.chain_info();
			let mut status = RlpStream::new_list(5);
			status.append(&63u32);
			status.append(&U256::from(1));
			status.append(&info.total_difficulty);
			status.append(&info.best_block_hash);
			status.append(&info.genesis_hash);
			status.out()
		};
		sync.on_packet(&mut io, 1, SyncPacket::StatusPacket.id(), &status);
		assert_eq!(sync.state(), SyncState::Blocks);
		// the ask for the peer's head is outstanding; fake its completion so
		// the next round tries to schedule downloads against the full queue
		sync.peers.get_mut(&1).unwrap().asking = PeerAsking::Nothing;
		sync.maintain_sync(&mut io);
		assert_eq!(sync.state(), SyncState::Waiting);
	}

	// draining the queue signals room and resumes the download
	chain.import_verified_blocks();
	let room = chain.pending_io_messages().iter()
		.any(|m| *m == common_types::io_message::ClientIoMessage::BlockQueueRoomAvailable);
	assert!(room);
	{
		let mut io = TestIo::new(&chain, &queue, None);
		sync.on_room_available(&mut io);
	}
	assert_eq!(sync.state(), SyncState::Blocks);
}

#[test]
fn transaction_import_outcome_adjusts_peer_rating() {
	init_log();
	let mut net = TestNet::new(2);
	net.sync();

	let transaction = PooledTransaction::new(rlp::encode(&b"pay bob".to_vec()));
	let peer = net.peer(0);
	let mut io = TestIo::new(&peer.chain, &peer.queue, None);
	let mut sync = peer.sync.write();

	sync.on_transaction_imported(&mut io, TransactionImportResult::Malformed, transaction.hash, 1);
	assert_eq!(io.ratings.last(), Some(&(1, -100)));

	sync.on_transaction_imported(&mut io, TransactionImportResult::AlreadyKnown, transaction.hash, 1);
	assert_eq!(io.ratings.last(), Some(&(1, 0)));
	assert!(sync.transactions_sent.contains(&transaction.hash));

	sync.on_transaction_imported(&mut io, TransactionImportResult::Success, transaction.hash, 1);
	assert_eq!(io.ratings.last(), Some(&(1, 100)));
	assert!(sync.peers.get(&1).unwrap().known_transactions.contains(&transaction.hash));
}

#[test]
fn stalled_conversation_times_out() {
	init_log();
	let mut net = TestNet::new(2);
	net.sync();

	let peer = net.peer(0);
	let mut sync = peer.sync.write();
	{
		let info = sync.peers.get_mut(&1).unwrap();
		info.asking = PeerAsking::BlockHeaders;
		info.ask_time = crate::chain::unix_now() - 30;
	}
	let mut io = TestIo::new(&peer.chain, &peer.queue, None);
	sync.maintain_peers(&mut io);
	assert!(io.disconnected.contains(&1));
}

#[test]
fn invariants_hold_through_a_full_sync() {
	init_log();
	let mut net = TestNet::new(2);
	net.peer(1).chain.add_blocks_with_transactions(5);

	net.start();
	for _ in 0..10_000 {
		net.sync_step();
		for i in 0..2 {
			let peer = net.peer(i);
			let io = TestIo::new(&peer.chain, &peer.queue, None);
			peer.sync.read().check_invariants(&io).unwrap();
		}
		if net.done() {
			break;
		}
	}
	assert!(net.done());
	assert_eq!(net.peer(0).chain.chain_info().best_block_number, 5);
}
