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

#![warn(missing_docs)]

//! Blockchain sync module.
//!
//! Implements the block-exchange subprotocol: the per-peer wire engine
//! (status handshake, request serving, gossip) and the chain synchronization
//! state machine that downloads headers and bodies from every suitable peer,
//! assembles them and feeds the verification queue.
//!
//! The capability host - the lower layer providing framed per-peer RLP
//! transport, ratings and disconnects - is reached exclusively through the
//! `SyncIo` trait; all entry points of `ChainSync` are to be invoked from
//! the host's network thread.

#[macro_use]
extern crate log;

mod block_sync;
mod chain;
mod range_collection;
mod sync_io;

#[cfg(test)]
mod tests;

pub use crate::chain::sync_packet::SyncPacket;
pub use crate::chain::{ChainSync, SyncConfig, SyncState, SyncStatus, TransactionImportResult};
pub use crate::sync_io::{NetworkError, PeerId, SyncIo};
