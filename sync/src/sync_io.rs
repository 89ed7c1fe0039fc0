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

//! The capability-host surface the sync machinery talks through.

use derive_more::Display;
use ethcore::client::BlockChainClient;

use crate::chain::sync_packet::SyncPacket;

/// Peer connection identifier handed out by the capability host.
pub type PeerId = usize;

/// Errors the capability host can report back on a send.
#[derive(Debug, Display, PartialEq, Eq)]
pub enum NetworkError {
	/// The peer went away between scheduling and sending.
	#[display(fmt = "peer {} is gone", _0)]
	PeerGone(PeerId),
	/// The payload exceeds what the transport will frame.
	#[display(fmt = "oversized packet")]
	OversizedPacket,
}

/// IO interface for the sync handlers. Provides peer connection management,
/// the subprotocol packet plumbing and a view of the blockchain. Everything
/// the wire engine does to the outside world goes through this trait, which
/// is what makes the whole machine drivable from a test harness.
pub trait SyncIo {
	/// Disable a peer: drop the connection and discourage reconnects.
	fn disable_peer(&mut self, peer_id: PeerId);

	/// Disconnect a peer without prejudice.
	fn disconnect_peer(&mut self, peer_id: PeerId);

	/// Respond to the peer whose packet is currently being handled.
	fn respond(&mut self, packet_id: SyncPacket, data: Vec<u8>) -> Result<(), NetworkError>;

	/// Send a packet to a peer.
	fn send(&mut self, peer_id: PeerId, packet_id: SyncPacket, data: Vec<u8>) -> Result<(), NetworkError>;

	/// Adjust a peer's rating. Positive deltas reward useful responses,
	/// negative ones punish noise.
	fn update_rating(&mut self, peer_id: PeerId, rating: i32);

	/// Get the blockchain.
	fn chain(&self) -> &dyn BlockChainClient;

	/// Client version string advertised by the peer at session setup.
	fn peer_client_version(&self, peer_id: PeerId) -> String;
}
