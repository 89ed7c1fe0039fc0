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

//! Chain synchronization core library.
//!
//! Holds the block verification queue that sits between the network and the
//! blockchain, the seal-engine and chain-client contracts the queue and the
//! sync machinery are written against, and an in-memory test client used by
//! the sync harness.

#[macro_use]
extern crate log;

pub mod client;
pub mod engines;
pub mod error;
pub mod io;
pub mod verification;

pub use common_types as types;
