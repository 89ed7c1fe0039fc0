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

//! Request-serving behaviors and their boundary cases.

use std::collections::VecDeque;

use ethereum_types::H256;
use parking_lot::RwLock;
use rlp::{Rlp, RlpStream};

use common_types::header::Header;
use common_types::ids::BlockId;
use ethcore::client::{BlockChainClient, TestBlockChainClient};

use crate::chain::sync_packet::SyncPacket;
use crate::chain::{ChainSync, SyncConfig};
use crate::tests::helpers::{TestIo, TestPacket};

fn serve(chain: &TestBlockChainClient, packet: SyncPacket, data: Vec<u8>) -> (Vec<TestPacket>, Vec<(usize, i32)>) {
	let mut sync = ChainSync::new(SyncConfig::default(), chain);
	let queue = RwLock::new(VecDeque::new());
	let mut io = TestIo::new(chain, &queue, Some(1));
	sync.on_packet(&mut io, 1, packet.id(), &data);
	let ratings = io.ratings.clone();
	drop(io);
	(queue.into_inner().into_iter().collect(), ratings)
}

fn headers_request(id_rlp: impl FnOnce(&mut RlpStream), max: u64, skip: u64, reverse: bool) -> Vec<u8> {
	let mut rlp = RlpStream::new_list(4);
	id_rlp(&mut rlp);
	rlp.append(&max);
	rlp.append(&skip);
	rlp.append(&if reverse { 1u8 } else { 0u8 });
	rlp.out()
}

fn decode_headers(packet: &TestPacket) -> Vec<Header> {
	assert_eq!(packet.packet_id, SyncPacket::BlockHeadersPacket.id());
	let rlp = Rlp::new(&packet.data);
	(0..rlp.item_count().unwrap())
		.map(|i| Header::decode_rlp(rlp.at(i).unwrap().as_raw()).unwrap())
		.collect()
}

#[test]
fn serves_exactly_the_genesis_header() {
	let chain = TestBlockChainClient::new();
	chain.add_blocks(10);
	let genesis = chain.genesis_hash();

	let request = headers_request(|rlp| { rlp.append(&genesis); }, 1, 0, false);
	let (packets, _) = serve(&chain, SyncPacket::GetBlockHeadersPacket, request);

	assert_eq!(packets.len(), 1);
	let headers = decode_headers(&packets[0]);
	assert_eq!(headers.len(), 1);
	assert_eq!(headers[0].hash(), genesis);
	assert_eq!(headers[0].number(), 0);
}

#[test]
fn reverse_walk_from_tip_is_descending() {
	let chain = TestBlockChainClient::new();
	chain.add_blocks(10);
	let tip = chain.chain_info().best_block_hash;

	let request = headers_request(|rlp| { rlp.append(&tip); }, 1024, 0, true);
	let (packets, _) = serve(&chain, SyncPacket::GetBlockHeadersPacket, request);

	let headers = decode_headers(&packets[0]);
	assert_eq!(headers.len(), 11);
	let numbers: Vec<u64> = headers.iter().map(|h| h.number()).collect();
	assert_eq!(numbers, (0..=10).rev().collect::<Vec<u64>>());
}

#[test]
fn forward_request_with_skip() {
	let chain = TestBlockChainClient::new();
	chain.add_blocks(10);

	let request = headers_request(|rlp| { rlp.append(&2u64); }, 3, 2, false);
	let (packets, _) = serve(&chain, SyncPacket::GetBlockHeadersPacket, request);

	let headers = decode_headers(&packets[0]);
	let numbers: Vec<u64> = headers.iter().map(|h| h.number()).collect();
	assert_eq!(numbers, vec![2, 5, 8]);
}

#[test]
fn forward_request_clamps_at_the_tip() {
	let chain = TestBlockChainClient::new();
	chain.add_blocks(5);

	let request = headers_request(|rlp| { rlp.append(&3u64); }, 100, 0, false);
	let (packets, _) = serve(&chain, SyncPacket::GetBlockHeadersPacket, request);

	let headers = decode_headers(&packets[0]);
	let numbers: Vec<u64> = headers.iter().map(|h| h.number()).collect();
	assert_eq!(numbers, vec![3, 4, 5]);
}

#[test]
fn request_beyond_tip_yields_empty_response() {
	let chain = TestBlockChainClient::new();
	chain.add_blocks(5);

	let request = headers_request(|rlp| { rlp.append(&50u64); }, 10, 0, false);
	let (packets, _) = serve(&chain, SyncPacket::GetBlockHeadersPacket, request);

	assert_eq!(packets.len(), 1);
	assert!(decode_headers(&packets[0]).is_empty());
}

#[test]
fn serves_bodies_skipping_unknown_hashes() {
	let chain = TestBlockChainClient::new();
	chain.add_blocks_with_transactions(3);

	let mut request = RlpStream::new_list(3);
	request.append(&chain.block_hash(BlockId::Number(1)).unwrap());
	request.append(&H256::from_low_u64_be(0xdead));
	request.append(&chain.block_hash(BlockId::Number(3)).unwrap());
	let (packets, _) = serve(&chain, SyncPacket::GetBlockBodiesPacket, request.out());

	assert_eq!(packets.len(), 1);
	assert_eq!(packets[0].packet_id, SyncPacket::BlockBodiesPacket.id());
	let rlp = Rlp::new(&packets[0].data);
	assert_eq!(rlp.item_count().unwrap(), 2);
	// each body is a two-item list with one transaction
	let body = rlp.at(0).unwrap();
	assert_eq!(body.item_count().unwrap(), 2);
	assert_eq!(body.at(0).unwrap().item_count().unwrap(), 1);
}

#[test]
fn zero_entry_body_request_is_penalized() {
	let chain = TestBlockChainClient::new();
	let request = RlpStream::new_list(0);
	let (packets, ratings) = serve(&chain, SyncPacket::GetBlockBodiesPacket, request.out());

	assert!(packets.is_empty());
	assert_eq!(ratings, vec![(1, -10)]);
}

#[test]
fn serves_receipts() {
	let chain = TestBlockChainClient::new();
	chain.add_blocks(2);

	let mut request = RlpStream::new_list(2);
	request.append(&chain.block_hash(BlockId::Number(1)).unwrap());
	request.append(&chain.block_hash(BlockId::Number(2)).unwrap());
	let (packets, _) = serve(&chain, SyncPacket::GetReceiptsPacket, request.out());

	assert_eq!(packets.len(), 1);
	assert_eq!(packets[0].packet_id, SyncPacket::ReceiptsPacket.id());
	assert_eq!(Rlp::new(&packets[0].data).item_count().unwrap(), 2);
}

#[test]
fn serves_node_data() {
	let chain = TestBlockChainClient::new();
	let node_hash = H256::from_low_u64_be(7);
	chain.set_state_node(node_hash, vec![1, 2, 3]);

	let mut request = RlpStream::new_list(2);
	request.append(&node_hash);
	request.append(&H256::from_low_u64_be(8));
	let (packets, _) = serve(&chain, SyncPacket::GetNodeDataPacket, request.out());

	assert_eq!(packets.len(), 1);
	assert_eq!(packets[0].packet_id, SyncPacket::NodeDataPacket.id());
	let rlp = Rlp::new(&packets[0].data);
	assert_eq!(rlp.item_count().unwrap(), 1);
	assert_eq!(rlp.val_at::<Vec<u8>>(0).unwrap(), vec![1, 2, 3]);
}
