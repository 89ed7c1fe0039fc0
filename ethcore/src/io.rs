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

//! Channel endpoint used by the queue to signal its owner.

use common_types::io_message::ClientIoMessage;
use crossbeam_channel::{SendError, Sender};

/// A cloneable channel the queue pushes `ClientIoMessage`s into. A
/// disconnected endpoint swallows messages, which keeps unit tests that do
/// their own draining free of channel plumbing.
#[derive(Clone)]
pub struct IoChannel {
	channel: Option<Sender<ClientIoMessage>>,
}

impl IoChannel {
	/// Create a channel endpoint forwarding into `sender`.
	pub fn new(sender: Sender<ClientIoMessage>) -> IoChannel {
		IoChannel { channel: Some(sender) }
	}

	/// Create a channel endpoint that drops every message.
	pub fn disconnected() -> IoChannel {
		IoChannel { channel: None }
	}

	/// Send a message, if connected.
	pub fn send(&self, message: ClientIoMessage) -> Result<(), SendError<ClientIoMessage>> {
		match self.channel {
			Some(ref sender) => sender.send(message),
			None => Ok(()),
		}
	}
}
