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

//! Consensus engine contract.

mod null_engine;

pub use self::null_engine::NullEngine;

use common_types::header::Header;

use crate::error::Error;

/// A consensus mechanism for the chain. The queue and the chain only rely on
/// the verification hooks; sealing and reward logic live with the engine
/// implementations outside this workspace.
pub trait Engine: Send + Sync {
	/// The name of this engine.
	fn name(&self) -> &str;

	/// The number of additional header fields required for this engine.
	fn seal_fields(&self) -> usize { 0 }

	/// Maximum number of bytes allowed in the header extra-data field.
	fn maximum_extra_data_size(&self) -> usize { 32 }

	/// Phase 1 quick block verification. Only does checks that are cheap.
	/// Runs on the caller thread at import time.
	fn verify_block_basic(&self, _header: &Header) -> Result<(), Error> { Ok(()) }

	/// Phase 2 verification. Perform costly checks such as seal validity.
	/// Runs on the verifier pool, out of order.
	fn verify_block_unordered(&self, _header: &Header) -> Result<(), Error> { Ok(()) }
}
