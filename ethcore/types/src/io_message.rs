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

//! Messages emitted by the block queue towards its owner.

/// Message type for the queue -> owner channel. Handlers are registered once
/// at wiring time by handing the channel endpoint to the queue constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientIoMessage {
	/// A block is ready to be drained into the chain.
	BlockVerified,
	/// The queue dropped back below its capacity caps; block downloads may
	/// resume.
	BlockQueueRoomAvailable,
}
