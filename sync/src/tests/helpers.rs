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

//! A virtual network of sync engines over in-memory chains, delivering
//! packets deterministically, one at a time.

use std::collections::{HashMap, HashSet, VecDeque};

use parking_lot::RwLock;

use common_types::io_message::ClientIoMessage;
use ethcore::client::{BlockChainClient, TestBlockChainClient};

use crate::chain::sync_packet::SyncPacket;
use crate::chain::{ChainSync, SyncConfig};
use crate::sync_io::{NetworkError, PeerId, SyncIo};

/// A packet on the virtual wire.
pub struct TestPacket {
	/// Raw payload.
	pub data: Vec<u8>,
	/// Wire opcode.
	pub packet_id: u8,
	/// Destination peer.
	pub recipient: PeerId,
}

/// `SyncIo` over a test chain, recording everything the engine does to the
/// outside world.
pub struct TestIo<'p> {
	/// The local chain.
	pub chain: &'p TestBlockChainClient,
	/// Outbound packets produced by the engine.
	pub queue: &'p RwLock<VecDeque<TestPacket>>,
	/// The peer whose packet is currently being handled.
	pub sender: Option<PeerId>,
	/// Peers the engine disconnected.
	pub disconnected: HashSet<PeerId>,
	/// Peers the engine disabled for cause.
	pub disabled: HashSet<PeerId>,
	/// Rating adjustments issued.
	pub ratings: Vec<(PeerId, i32)>,
	/// Client version strings by peer.
	pub client_versions: HashMap<PeerId, String>,
}

impl<'p> TestIo<'p> {
	/// Wrap a chain and an outbound queue.
	pub fn new(
		chain: &'p TestBlockChainClient,
		queue: &'p RwLock<VecDeque<TestPacket>>,
		sender: Option<PeerId>,
	) -> TestIo<'p> {
		TestIo {
			chain,
			queue,
			sender,
			disconnected: HashSet::new(),
			disabled: HashSet::new(),
			ratings: Vec::new(),
			client_versions: HashMap::new(),
		}
	}
}

impl<'p> SyncIo for TestIo<'p> {
	fn disable_peer(&mut self, peer_id: PeerId) {
		self.disabled.insert(peer_id);
		self.disconnected.insert(peer_id);
	}

	fn disconnect_peer(&mut self, peer_id: PeerId) {
		self.disconnected.insert(peer_id);
	}

	fn respond(&mut self, packet_id: SyncPacket, data: Vec<u8>) -> Result<(), NetworkError> {
		let recipient = self.sender.ok_or(NetworkError::PeerGone(0))?;
		self.queue.write().push_back(TestPacket {
			data,
			packet_id: packet_id.id(),
			recipient,
		});
		Ok(())
	}

	fn send(&mut self, peer_id: PeerId, packet_id: SyncPacket, data: Vec<u8>) -> Result<(), NetworkError> {
		self.queue.write().push_back(TestPacket {
			data,
			packet_id: packet_id.id(),
			recipient: peer_id,
		});
		Ok(())
	}

	fn update_rating(&mut self, peer_id: PeerId, rating: i32) {
		self.ratings.push((peer_id, rating));
	}

	fn chain(&self) -> &dyn BlockChainClient {
		self.chain
	}

	fn peer_client_version(&self, peer_id: PeerId) -> String {
		self.client_versions
			.get(&peer_id)
			.cloned()
			.unwrap_or_else(|| "TestClient/v1.0.0".into())
	}
}

/// A node on the virtual network.
pub struct TestPeer {
	/// The node's chain, with a live verification queue.
	pub chain: TestBlockChainClient,
	/// The node's sync engine.
	pub sync: RwLock<ChainSync>,
	/// Packets this node has sent and not yet delivered.
	pub queue: RwLock<VecDeque<TestPacket>>,
}

/// A set of interconnected nodes; peer ids are the node indexes.
pub struct TestNet {
	/// All nodes.
	pub peers: Vec<TestPeer>,
	started: bool,
}

impl TestNet {
	/// A network of `n` fresh nodes with default configuration.
	pub fn new(n: usize) -> TestNet {
		Self::new_with_config(n, SyncConfig::default())
	}

	/// A network of `n` fresh nodes sharing `config`.
	pub fn new_with_config(n: usize, config: SyncConfig) -> TestNet {
		let peers = (0..n)
			.map(|_| {
				let chain = TestBlockChainClient::new();
				let sync = ChainSync::new(config.clone(), &chain);
				TestPeer {
					chain,
					sync: RwLock::new(sync),
					queue: RwLock::new(VecDeque::new()),
				}
			})
			.collect();
		TestNet { peers, started: false }
	}

	/// Node accessor.
	pub fn peer(&self, i: usize) -> &TestPeer {
		&self.peers[i]
	}

	/// Open sessions between every pair of nodes (status exchange queued).
	pub fn start(&mut self) {
		for i in 0..self.peers.len() {
			for j in 0..self.peers.len() {
				if i == j {
					continue;
				}
				let peer = &self.peers[i];
				let mut io = TestIo::new(&peer.chain, &peer.queue, Some(j));
				peer.sync.write().on_peer_connected(&mut io, j);
			}
		}
	}

	/// Deliver one pending packet per node.
	pub fn sync_step(&mut self) {
		for i in 0..self.peers.len() {
			let packet = self.peers[i].queue.write().pop_front();
			let packet = match packet {
				Some(packet) => packet,
				None => continue,
			};
			let recipient = packet.recipient;
			trace!(target: "sync", "--- {} -> {}: packet {:#04x}", i, recipient, packet.packet_id);

			let disconnected = {
				let peer = &self.peers[recipient];
				let mut io = TestIo::new(&peer.chain, &peer.queue, Some(i));
				peer.sync.write().on_packet(&mut io, i, packet.packet_id, &packet.data);
				io.disconnected
			};
			self.settle(recipient);
			self.apply_disconnects(recipient, &disconnected);
		}
	}

	// Wait out the verification queue, import what it produced and deliver
	// its signals, as the client service loop would.
	fn settle(&self, i: usize) {
		let peer = &self.peers[i];
		peer.chain.flush_queue();
		for message in peer.chain.pending_io_messages() {
			if message == ClientIoMessage::BlockQueueRoomAvailable {
				let mut io = TestIo::new(&peer.chain, &peer.queue, None);
				peer.sync.write().on_room_available(&mut io);
			}
		}
	}

	fn apply_disconnects(&self, host: usize, disconnected: &HashSet<PeerId>) {
		let peer = &self.peers[host];
		for d in disconnected {
			let mut io = TestIo::new(&peer.chain, &peer.queue, None);
			peer.sync.write().on_peer_aborting(&mut io, *d);
		}
	}

	/// Run the maintenance tick on node `i`.
	pub fn maintain_sync(&mut self, i: usize) {
		let peer = &self.peers[i];
		let mut io = TestIo::new(&peer.chain, &peer.queue, None);
		peer.sync.write().maintain_sync(&mut io);
	}

	/// True when no packets are in flight anywhere.
	pub fn done(&self) -> bool {
		self.peers.iter().all(|p| p.queue.read().is_empty())
	}

	/// Run the network until it goes quiet, interleaving the 1 s maintenance
	/// tick the way the capability host would. Returns the number of steps.
	pub fn sync(&mut self) -> u32 {
		if !self.started {
			self.start();
			self.started = true;
		}
		let mut total_steps = 0;
		let mut rounds = 0;
		loop {
			while !self.done() {
				self.sync_step();
				total_steps += 1;
				assert!(total_steps < 10_000, "sync did not converge");
			}
			// the background tick kicks stalled downloads and runs gossip
			for i in 0..self.peers.len() {
				self.maintain_sync(i);
			}
			rounds += 1;
			assert!(rounds < 100, "maintenance did not converge");
			if self.done() {
				break;
			}
		}
		total_steps
	}

	/// Run at most `count` delivery rounds.
	pub fn sync_steps(&mut self, count: usize) {
		if !self.started {
			self.start();
			self.started = true;
		}
		for _ in 0..count {
			self.sync_step();
		}
	}
}
