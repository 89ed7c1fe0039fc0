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

//! An engine which does not care about anything at all.

use common_types::header::Header;

use crate::error::{BlockError, Error};

/// An engine which passes all verification. The seal layout matches the
/// proof-of-work chain (mix hash + nonce) so canonically encoded headers
/// round-trip through it.
pub struct NullEngine {
	/// Headers whose number is at or above this bound fail seal verification.
	/// Stands in for a real engine rejecting a bad seal.
	seal_bound: Option<u64>,
}

impl Default for NullEngine {
	fn default() -> Self {
		NullEngine { seal_bound: None }
	}
}

impl NullEngine {
	/// Create an engine that accepts everything.
	pub fn new() -> Self {
		Self::default()
	}

	/// Create an engine failing phase-2 verification for blocks numbered at
	/// or above `bound`.
	pub fn with_seal_bound(bound: u64) -> Self {
		NullEngine { seal_bound: Some(bound) }
	}
}

impl super::Engine for NullEngine {
	fn name(&self) -> &str {
		"NullEngine"
	}

	fn seal_fields(&self) -> usize { 2 }

	fn verify_block_unordered(&self, header: &Header) -> Result<(), Error> {
		match self.seal_bound {
			Some(bound) if header.number() >= bound => Err(BlockError::InvalidSeal.into()),
			_ => Ok(()),
		}
	}
}
