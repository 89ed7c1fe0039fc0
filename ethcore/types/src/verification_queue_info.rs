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

//! Verification queue info types

use ethereum_types::U256;

/// Verification queue status
#[derive(Debug, Clone)]
pub struct VerificationQueueInfo {
	/// Number of queued blocks pending verification
	pub unverified_queue_size: usize,
	/// Number of blocks being verified
	pub verifying_queue_size: usize,
	/// Number of verified queued blocks pending import
	pub verified_queue_size: usize,
	/// Number of blocks handed out for chain insertion and not yet confirmed
	pub importing_queue_size: usize,
	/// Number of blocks parked until their timestamp is reached
	pub future_queue_size: usize,
	/// Number of blocks whose parent is neither in the chain nor in the queue
	pub unknown_queue_size: usize,
	/// Number of blocks known to never become valid
	pub bad_count: usize,
	/// Raw bytes held by the unverified + verifying + verified buckets
	pub known_mem_used: usize,
	/// Raw bytes held by the future + unknown-parent buckets
	pub unknown_mem_used: usize,
	/// Configured count cap on the known group
	pub max_known_count: usize,
	/// Configured byte cap on the known group
	pub max_known_size: usize,
	/// Configured count cap on the unknown group
	pub max_unknown_count: usize,
	/// Configured byte cap on the unknown group
	pub max_unknown_size: usize,
	/// Total difficulty of all blocks held by the queue
	pub total_difficulty: U256,
}

impl VerificationQueueInfo {
	/// The known group: everything on the verification conveyor.
	pub fn known_count(&self) -> usize {
		self.unverified_queue_size + self.verifying_queue_size + self.verified_queue_size
	}

	/// The unknown group: blocks that cannot be verified yet.
	pub fn unknown_count(&self) -> usize {
		self.future_queue_size + self.unknown_queue_size
	}

	/// True when the verification conveyor is over its caps; the sync layer
	/// must stop requesting blocks until room is signalled.
	pub fn is_known_full(&self) -> bool {
		self.known_count() > self.max_known_count || self.known_mem_used > self.max_known_size
	}

	/// True when the parked buckets are over their caps.
	pub fn is_unknown_full(&self) -> bool {
		self.unknown_count() > self.max_unknown_count || self.unknown_mem_used > self.max_unknown_size
	}

	/// Indicates that queue is empty
	pub fn is_empty(&self) -> bool {
		self.unverified_queue_size + self.verifying_queue_size + self.verified_queue_size == 0
	}

	/// Indicates that still some work is done or pending
	pub fn is_active(&self) -> bool {
		self.known_count() + self.importing_queue_size > 0
	}
}
