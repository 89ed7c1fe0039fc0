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

//! A queue of blocks. Sits between network or other I/O and the chain.
//! Verifies them on a worker pool and emits them in arrival order, ready for
//! chain insertion.

use std::cmp;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use ethereum_types::{H256, U256};
use parity_bytes::Bytes;
use parking_lot::{Condvar, Mutex, RwLock};

use common_types::io_message::ClientIoMessage;
use common_types::verification_queue_info::VerificationQueueInfo as QueueInfo;

use crate::client::BlockInfo;
use crate::engines::Engine;
use crate::io::IoChannel;
use crate::verification::{self, Unverified, VerifiedBlock};

const MAX_KNOWN_COUNT: usize = 100_000;
const MAX_KNOWN_SIZE: usize = 128 * 1024 * 1024;
const MAX_UNKNOWN_COUNT: usize = 100_000;
// Block size can be ~50kb
const MAX_UNKNOWN_SIZE: usize = 512 * 1024 * 1024;

/// Verification queue configuration
#[derive(Debug, PartialEq, Clone)]
pub struct Config {
	/// Count cap on the unverified + verifying + verified buckets.
	pub max_known_count: usize,
	/// Byte cap on the unverified + verifying + verified buckets.
	pub max_known_size: usize,
	/// Count cap on the future + unknown-parent buckets.
	pub max_unknown_count: usize,
	/// Byte cap on the future + unknown-parent buckets.
	pub max_unknown_size: usize,
	/// Overrides the number of verifier threads.
	pub verifier_threads: Option<usize>,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			max_known_count: MAX_KNOWN_COUNT,
			max_known_size: MAX_KNOWN_SIZE,
			max_unknown_count: MAX_UNKNOWN_COUNT,
			max_unknown_size: MAX_UNKNOWN_SIZE,
			verifier_threads: None,
		}
	}
}

/// Result of a block import attempt. Not an error: every variant short of
/// `Malformed`/`BadChain` is a normal part of syncing against a live network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportResult {
	/// Block queued for verification.
	Success,
	/// Block is already held by some queue bucket.
	AlreadyKnown,
	/// Block is already in the chain.
	AlreadyInChain,
	/// Block failed structural or cheap header checks.
	Malformed,
	/// Block extends a chain known to be bad; it is now bad too.
	BadChain,
	/// Block timestamp is in the future; parked, parent known.
	FutureTimeKnown,
	/// Block timestamp is in the future; parked, parent unknown.
	FutureTimeUnknown,
	/// Parent is neither in the chain nor in the queue; parked.
	UnknownParent,
}

/// Status of a given block hash from the queue point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
	/// On the verification conveyor.
	Ready,
	/// Handed out by `drain` and not yet confirmed by `done_drain`.
	Importing,
	/// Parked until its parent shows up.
	UnknownParent,
	/// Known to never become valid.
	Bad,
	/// Not held by the queue.
	Unknown,
}

/// An item which is in the process of being verified. While `output` is
/// empty the owning worker is still busy; the slot keeps the arrival index
/// and the raw size of the block being worked on, so capacity accounting
/// covers in-flight blocks too.
struct Verifying {
	hash: H256,
	bytes_len: usize,
	output: Option<VerifiedBlock>,
}

// The external buckets: everything that is not on the verification conveyor,
// plus the membership sets mirroring the conveyor.
struct Sets {
	/// All blocks on the conveyor (unverified, verifying or verified).
	ready: HashSet<H256>,
	/// All blocks handed out by `drain` and awaiting `done_drain`.
	draining: HashSet<H256>,
	/// Hashes of blocks parked in `unknown`.
	unknown_set: HashSet<H256>,
	/// Hashes of blocks parked in `future`.
	future_set: HashSet<H256>,
	/// Blocks that will never be valid, nor will their descendants.
	bad: HashSet<H256>,
	/// Parent hash -> blocks waiting for that parent.
	unknown: HashMap<H256, Vec<Unverified>>,
	unknown_bytes: usize,
	/// Timestamp -> blocks whose timestamp has not been reached yet.
	future: BTreeMap<u64, Vec<Unverified>>,
	future_bytes: usize,
	/// Total difficulty of everything held by the queue.
	difficulty: U256,
	/// Difficulty of the batch currently being drained.
	draining_difficulty: U256,
}

impl Sets {
	fn unknown_count(&self) -> usize {
		self.unknown_set.len() + self.future_set.len()
	}

	fn unknown_bytes(&self) -> usize {
		self.unknown_bytes + self.future_bytes
	}
}

// The conveyor itself. All three FIFOs track the raw byte size of their
// contents; a block checked out by a worker counts towards `verifying`
// for the whole time it is in flight.
struct Verification {
	unverified: VecDeque<Unverified>,
	unverified_bytes: usize,
	verifying: VecDeque<Verifying>,
	verifying_bytes: usize,
	verified: VecDeque<VerifiedBlock>,
	verified_bytes: usize,
}

impl Verification {
	fn known_count(&self) -> usize {
		self.unverified.len() + self.verifying.len() + self.verified.len()
	}

	fn known_bytes(&self) -> usize {
		self.unverified_bytes + self.verifying_bytes + self.verified_bytes
	}
}

// Shared between the queue handle and the worker threads.
// Lock order: `sets` (write) first, then `verification`.
struct Internal {
	sets: RwLock<Sets>,
	verification: Mutex<Verification>,
	more_to_verify: Condvar,
	empty: Condvar,
}

struct QueueSignal {
	deleting: Arc<AtomicBool>,
	signalled: AtomicBool,
	message_channel: IoChannel,
}

impl QueueSignal {
	fn set(&self) {
		// Do not signal when we are about to close
		if self.deleting.load(AtomicOrdering::Relaxed) {
			return;
		}

		if self.signalled.compare_exchange(false, true, AtomicOrdering::Relaxed, AtomicOrdering::Relaxed).is_ok() {
			if let Err(e) = self.message_channel.send(ClientIoMessage::BlockVerified) {
				debug!(target: "verification", "Error sending BlockVerified message: {:?}", e);
			}
		}
	}

	fn reset(&self) {
		self.signalled.store(false, AtomicOrdering::Relaxed);
	}
}

/// A queue of blocks. Sits between network or other I/O and the chain.
/// Keeps verified blocks in the same order as they were imported, minus
/// invalid items.
pub struct BlockQueue {
	engine: Arc<dyn Engine>,
	chain: Arc<dyn BlockInfo>,
	internal: Arc<Internal>,
	deleting: Arc<AtomicBool>,
	ready_signal: Arc<QueueSignal>,
	room_channel: IoChannel,
	verifiers: Mutex<Vec<JoinHandle<()>>>,
	max_known_count: usize,
	max_known_size: usize,
	max_unknown_count: usize,
	max_unknown_size: usize,
}

impl BlockQueue {
	/// Creates a new queue instance and spawns the verifier pool.
	pub fn new(
		config: Config,
		engine: Arc<dyn Engine>,
		chain: Arc<dyn BlockInfo>,
		message_channel: IoChannel,
	) -> Self {
		let internal = Arc::new(Internal {
			sets: RwLock::new(Sets {
				ready: HashSet::new(),
				draining: HashSet::new(),
				unknown_set: HashSet::new(),
				future_set: HashSet::new(),
				bad: HashSet::new(),
				unknown: HashMap::new(),
				unknown_bytes: 0,
				future: BTreeMap::new(),
				future_bytes: 0,
				difficulty: U256::zero(),
				draining_difficulty: U256::zero(),
			}),
			verification: Mutex::new(Verification {
				unverified: VecDeque::new(),
				unverified_bytes: 0,
				verifying: VecDeque::new(),
				verifying_bytes: 0,
				verified: VecDeque::new(),
				verified_bytes: 0,
			}),
			more_to_verify: Condvar::new(),
			empty: Condvar::new(),
		});
		let deleting = Arc::new(AtomicBool::new(false));
		let ready_signal = Arc::new(QueueSignal {
			deleting: deleting.clone(),
			signalled: AtomicBool::new(false),
			message_channel: message_channel.clone(),
		});

		// Allow some room for other activity
		let thread_count = config.verifier_threads
			.unwrap_or_else(|| cmp::max(::num_cpus::get(), 3) - 2);
		let thread_count = cmp::max(thread_count, 1);

		let mut verifiers = Vec::with_capacity(thread_count);
		for i in 0..thread_count {
			let internal = internal.clone();
			let engine = engine.clone();
			let ready = ready_signal.clone();
			let deleting = deleting.clone();

			verifiers.push(
				thread::Builder::new()
					.name(format!("Verifier #{}", i))
					.spawn(move || BlockQueue::verify(internal, engine, ready, deleting))
					.expect("Failed to create verifier thread."),
			);
		}

		BlockQueue {
			engine,
			chain,
			internal,
			deleting,
			ready_signal,
			room_channel: message_channel,
			verifiers: Mutex::new(verifiers),
			max_known_count: config.max_known_count,
			max_known_size: config.max_known_size,
			max_unknown_count: config.max_unknown_count,
			max_unknown_size: config.max_unknown_size,
		}
	}

	fn verify(
		internal: Arc<Internal>,
		engine: Arc<dyn Engine>,
		ready: Arc<QueueSignal>,
		deleting: Arc<AtomicBool>,
	) {
		while !deleting.load(AtomicOrdering::Acquire) {
			{
				let mut verification = internal.verification.lock();

				if verification.unverified.is_empty() && verification.verifying.is_empty() {
					internal.empty.notify_all();
				}

				while verification.unverified.is_empty() && !deleting.load(AtomicOrdering::Acquire) {
					internal.more_to_verify.wait(&mut verification);
				}

				if deleting.load(AtomicOrdering::Acquire) {
					return;
				}
			}

			let item = {
				// reserve the slot before releasing the lock so the arrival
				// index survives while we verify outside of it; the bytes
				// move from `unverified` to `verifying` at the same moment
				let mut verification = internal.verification.lock();
				let item = match verification.unverified.pop_front() {
					Some(item) => item,
					None => continue,
				};
				let bytes_len = item.bytes.len();
				verification.unverified_bytes -= bytes_len;
				verification.verifying_bytes += bytes_len;
				verification.verifying.push_back(Verifying { hash: item.hash(), bytes_len, output: None });
				item
			};

			let hash = item.hash();
			let difficulty = *item.header.difficulty();
			match verification::verify_block_unordered(item, &*engine) {
				Ok(verified) => {
					let mut sets = internal.sets.write();
					let mut verification = internal.verification.lock();
					let mut idx = None;
					let mut output = Some(verified);
					for (i, e) in verification.verifying.iter_mut().enumerate() {
						if e.hash == hash {
							idx = Some(i);
							e.output = output.take();
							break;
						}
					}

					if idx == Some(0) {
						// we're next!
						Self::drain_verifying(&mut sets, &mut verification);
						ready.set();
					} else if idx.is_none() {
						// the slot was reaped by a bad-chain sweep while we
						// were verifying; its bytes were released with it
						trace!(target: "verification", "Verified block {} has no slot left", hash);
					}
				},
				Err(err) => {
					warn!(target: "verification", "Stage 2 block verification failed for {}: {}", hash, err);
					let mut sets = internal.sets.write();
					let mut verification = internal.verification.lock();
					sets.ready.remove(&hash);
					sets.bad.insert(hash);
					sets.difficulty = sets.difficulty.saturating_sub(difficulty);
					if let Some(pos) = verification.verifying.iter().position(|e| e.hash == hash) {
						if let Some(entry) = verification.verifying.remove(pos) {
							verification.verifying_bytes -= entry.bytes_len;
						}
					}

					if verification.verifying.front().map_or(false, |x| x.output.is_some()) {
						Self::drain_verifying(&mut sets, &mut verification);
						ready.set();
					}
				},
			}
		}
	}

	// Move every contiguous completed entry from the front of `verifying`
	// into `verified`, demoting blocks whose parent went bad in the meantime.
	fn drain_verifying(sets: &mut Sets, verification: &mut Verification) {
		while let Some(output) = verification.verifying.front_mut().and_then(|x| x.output.take()) {
			verification.verifying.pop_front();
			verification.verifying_bytes -= output.bytes.len();

			let hash = output.hash();
			if sets.bad.contains(output.header.parent_hash()) {
				sets.ready.remove(&hash);
				sets.bad.insert(hash);
				sets.difficulty = sets.difficulty.saturating_sub(*output.header.difficulty());
			} else {
				verification.verified_bytes += output.bytes.len();
				verification.verified.push_back(output);
			}
		}
	}

	/// Add a block to the queue.
	pub fn import(&self, bytes: Bytes, is_local: bool) -> ImportResult {
		let block = match Unverified::from_rlp(bytes) {
			Ok(block) => block,
			Err(err) => {
				warn!(target: "verification", "Ignoring malformed block: {}", err);
				return ImportResult::Malformed;
			},
		};
		let hash = block.hash();
		let parent = block.parent_hash();

		trace!(target: "verification", "Queuing block {} for import", hash);

		{
			let sets = self.internal.sets.read();
			if sets.ready.contains(&hash)
				|| sets.draining.contains(&hash)
				|| sets.unknown_set.contains(&hash)
				|| sets.future_set.contains(&hash)
				|| sets.bad.contains(&hash)
			{
				trace!(target: "verification", "Block {} already known", hash);
				return ImportResult::AlreadyKnown;
			}
		}

		if let Err(err) = verification::verify_block_basic(&block, &*self.engine) {
			warn!(target: "verification", "Stage 1 block verification failed for {}: {}", hash, err);
			self.internal.sets.write().bad.insert(hash);
			return ImportResult::Malformed;
		}

		if self.chain.is_known(&hash) {
			trace!(target: "verification", "Block {} already in chain", hash);
			return ImportResult::AlreadyInChain;
		}

		let difficulty = *block.header.difficulty();
		let mut sets = self.internal.sets.write();

		// Check it's not in the future
		if block.header.timestamp() > unix_now() && !is_local {
			trace!(target: "verification", "Block {} queued for future import at {}",
				hash, block.header.timestamp());
			let unknown = !sets.ready.contains(&parent)
				&& !sets.draining.contains(&parent)
				&& !self.chain.is_known(&parent);
			sets.future_set.insert(hash);
			sets.future_bytes += block.bytes.len();
			sets.difficulty += difficulty;
			sets.future.entry(block.header.timestamp()).or_insert_with(Vec::new).push(block);
			return if unknown { ImportResult::FutureTimeUnknown } else { ImportResult::FutureTimeKnown };
		}

		if sets.bad.contains(&parent) {
			// bad parent; this is bad too, note it as such
			sets.bad.insert(hash);
			self.update_bad_with_lock(&mut sets, hash);
			return ImportResult::BadChain;
		}

		if !sets.ready.contains(&parent)
			&& !sets.draining.contains(&parent)
			&& !self.chain.is_known(&parent)
		{
			// We don't know the parent (yet) - queue it up for later. It'll
			// get moved along once we find out about its ancestry.
			trace!(target: "verification", "Block {} parked: unknown parent {}", hash, parent);
			sets.unknown_set.insert(hash);
			sets.unknown_bytes += block.bytes.len();
			sets.difficulty += difficulty;
			sets.unknown.entry(parent).or_insert_with(Vec::new).push(block);
			return ImportResult::UnknownParent;
		}

		trace!(target: "verification", "Block {} ready for verification", hash);
		{
			let mut verification = self.internal.verification.lock();
			verification.unverified_bytes += block.bytes.len();
			verification.unverified.push_back(block);
		}
		self.internal.more_to_verify.notify_one();
		sets.ready.insert(hash);
		sets.difficulty += difficulty;
		self.note_ready_with_lock(&mut sets, hash);
		ImportResult::Success
	}

	// Move every block waiting for `good` (transitively) from the unknown
	// bucket onto the conveyor.
	fn note_ready_with_lock(&self, sets: &mut Sets, good: H256) {
		let mut good_queue = vec![good];
		let mut notify = false;
		while let Some(parent) = good_queue.pop() {
			let children = match sets.unknown.remove(&parent) {
				Some(children) => children,
				None => continue,
			};
			for child in children {
				let hash = child.hash();
				sets.unknown_set.remove(&hash);
				sets.unknown_bytes -= child.bytes.len();
				{
					let mut verification = self.internal.verification.lock();
					verification.unverified_bytes += child.bytes.len();
					verification.unverified.push_back(child);
				}
				sets.ready.insert(hash);
				good_queue.push(hash);
				notify = true;
			}
		}
		if notify {
			self.internal.more_to_verify.notify_all();
		}
	}

	/// Notify the queue that the chain gained a block so anything waiting on
	/// it can move on to verification.
	pub fn note_ready(&self, good: &H256) {
		let mut sets = self.internal.sets.write();
		self.note_ready_with_lock(&mut sets, *good);
	}

	/// Force a retry of all the blocks with unknown parents.
	pub fn retry_all_unknown(&self) {
		let mut sets = self.internal.sets.write();
		let parents: Vec<H256> = sets.unknown.keys().cloned().collect();
		for parent in parents {
			self.note_ready_with_lock(&mut sets, parent);
		}
	}

	// Sweep the queue for descendants of `bad`, marking them bad as well.
	// Expects `bad` to already be in the bad set.
	fn update_bad_with_lock(&self, sets: &mut Sets, bad: H256) {
		self.collect_unknown_bad(sets, bad);
		let mut verification = self.internal.verification.lock();

		let mut more_bad = true;
		while more_bad {
			more_bad = false;

			let verified = std::mem::replace(&mut verification.verified, VecDeque::new());
			for block in verified {
				if sets.bad.contains(block.header.parent_hash()) || sets.bad.contains(&block.hash()) {
					let hash = block.hash();
					verification.verified_bytes -= block.bytes.len();
					sets.bad.insert(hash);
					sets.ready.remove(&hash);
					sets.difficulty = sets.difficulty.saturating_sub(*block.header.difficulty());
					self.collect_unknown_bad(sets, hash);
					more_bad = true;
				} else {
					verification.verified.push_back(block);
				}
			}

			let unverified = std::mem::replace(&mut verification.unverified, VecDeque::new());
			for block in unverified {
				if sets.bad.contains(block.header.parent_hash()) || sets.bad.contains(&block.hash()) {
					let hash = block.hash();
					verification.unverified_bytes -= block.bytes.len();
					sets.bad.insert(hash);
					sets.ready.remove(&hash);
					sets.difficulty = sets.difficulty.saturating_sub(*block.header.difficulty());
					self.collect_unknown_bad(sets, hash);
					more_bad = true;
				} else {
					verification.unverified.push_back(block);
				}
			}

			let verifying = std::mem::replace(&mut verification.verifying, VecDeque::new());
			for entry in verifying {
				let is_bad = match entry.output {
					Some(ref block) => sets.bad.contains(block.header.parent_hash())
						|| sets.bad.contains(&entry.hash),
					// still being verified; we can only go by its own hash
					None => sets.bad.contains(&entry.hash),
				};
				if is_bad {
					let hash = entry.hash;
					verification.verifying_bytes -= entry.bytes_len;
					if let Some(block) = entry.output {
						sets.difficulty = sets.difficulty.saturating_sub(*block.header.difficulty());
					}
					sets.bad.insert(hash);
					sets.ready.remove(&hash);
					self.collect_unknown_bad(sets, hash);
					more_bad = true;
				} else {
					verification.verifying.push_back(entry);
				}
			}
		}
	}

	// Transitively reap descendants of `bad` from the unknown-parent bucket.
	fn collect_unknown_bad(&self, sets: &mut Sets, bad: H256) {
		let mut bad_queue = vec![bad];
		while let Some(parent) = bad_queue.pop() {
			let children = match sets.unknown.remove(&parent) {
				Some(children) => children,
				None => continue,
			};
			for child in children {
				let hash = child.hash();
				sets.unknown_set.remove(&hash);
				sets.unknown_bytes -= child.bytes.len();
				sets.difficulty = sets.difficulty.saturating_sub(*child.header.difficulty());
				sets.bad.insert(hash);
				bad_queue.push(hash);
			}
		}
	}

	/// Notes that time has moved on and some blocks that used to be "in the
	/// future" may now be valid; re-imports them.
	pub fn tick(&self) {
		let todo = {
			let mut sets = self.internal.sets.write();
			if sets.future.is_empty() {
				return;
			}
			let now = unix_now();
			let ripe: Vec<u64> = sets.future
				.range(..=now)
				.map(|(timestamp, _)| *timestamp)
				.collect();
			let mut todo = Vec::new();
			for timestamp in ripe {
				if let Some(blocks) = sets.future.remove(&timestamp) {
					for block in blocks {
						sets.future_set.remove(&block.hash());
						sets.future_bytes -= block.bytes.len();
						let difficulty = *block.header.difficulty();
						sets.difficulty = sets.difficulty.saturating_sub(difficulty);
						todo.push(block.bytes);
					}
				}
			}
			todo
		};

		if todo.is_empty() {
			return;
		}
		debug!(target: "verification", "Importing {} past-future blocks", todo.len());
		for bytes in todo {
			self.import(bytes, false);
		}
	}

	/// Removes up to `max` verified blocks from the queue, in import order,
	/// marking them as draining. A single outstanding drain is allowed;
	/// close it with `done_drain`.
	pub fn drain(&self, max: usize) -> Vec<VerifiedBlock> {
		let was_full = self.is_known_full();
		let result = {
			let mut sets = self.internal.sets.write();
			if !sets.draining.is_empty() {
				return Vec::new();
			}
			let mut verification = self.internal.verification.lock();
			let count = cmp::min(max, verification.verified.len());
			let result: Vec<_> = verification.verified.drain(..count).collect();
			sets.draining_difficulty = U256::zero();
			for block in &result {
				let hash = block.hash();
				verification.verified_bytes -= block.bytes.len();
				sets.draining_difficulty += *block.header.difficulty();
				sets.draining.insert(hash);
				sets.ready.remove(&hash);
			}
			result
		};

		self.ready_signal.reset();
		{
			let verification = self.internal.verification.lock();
			if !verification.verified.is_empty() {
				self.ready_signal.set();
			}
		}
		if was_full && !self.is_known_full() {
			if let Err(e) = self.room_channel.send(ClientIoMessage::BlockQueueRoomAvailable) {
				debug!(target: "verification", "Error sending BlockQueueRoomAvailable message: {:?}", e);
			}
		}
		result
	}

	/// Must be called after a `drain`. Notes that the drained blocks have
	/// been handled, propagating any chain-level rejections into the bad set.
	/// Returns true if there are more blocks ready for drain.
	pub fn done_drain(&self, bad: &[H256]) -> bool {
		let mut sets = self.internal.sets.write();
		sets.draining.clear();
		let draining_difficulty = sets.draining_difficulty;
		sets.difficulty = sets.difficulty.saturating_sub(draining_difficulty);
		sets.draining_difficulty = U256::zero();
		if !bad.is_empty() {
			for hash in bad {
				sets.bad.insert(*hash);
			}
			for hash in bad {
				self.update_bad_with_lock(&mut sets, *hash);
			}
		}
		!sets.ready.is_empty()
	}

	/// Get the status of a given block hash.
	pub fn status(&self, hash: &H256) -> QueueStatus {
		let sets = self.internal.sets.read();
		if sets.ready.contains(hash) {
			QueueStatus::Ready
		} else if sets.draining.contains(hash) {
			QueueStatus::Importing
		} else if sets.unknown_set.contains(hash) {
			QueueStatus::UnknownParent
		} else if sets.bad.contains(hash) {
			QueueStatus::Bad
		} else {
			QueueStatus::Unknown
		}
	}

	/// True when the verification conveyor is over its caps; the sync layer
	/// must pause downloads until room is signalled.
	pub fn is_known_full(&self) -> bool {
		let verification = self.internal.verification.lock();
		verification.known_count() > self.max_known_count
			|| verification.known_bytes() > self.max_known_size
	}

	/// True when the parked buckets are over their caps.
	pub fn is_unknown_full(&self) -> bool {
		let sets = self.internal.sets.read();
		sets.unknown_count() > self.max_unknown_count
			|| sets.unknown_bytes() > self.max_unknown_size
	}

	/// Total difficulty of all blocks in the queue.
	pub fn total_difficulty(&self) -> U256 {
		self.internal.sets.read().difficulty
	}

	/// True while the queue holds or hands out any block.
	pub fn is_active(&self) -> bool {
		{
			let sets = self.internal.sets.read();
			if !sets.ready.is_empty() || !sets.draining.is_empty() {
				return true;
			}
		}
		let verification = self.internal.verification.lock();
		verification.known_count() > 0
	}

	/// Get queue status counts.
	pub fn queue_info(&self) -> QueueInfo {
		let sets = self.internal.sets.read();
		let verification = self.internal.verification.lock();
		QueueInfo {
			unverified_queue_size: verification.unverified.len(),
			verifying_queue_size: verification.verifying.len(),
			verified_queue_size: verification.verified.len(),
			importing_queue_size: sets.draining.len(),
			future_queue_size: sets.future_set.len(),
			unknown_queue_size: sets.unknown_set.len(),
			bad_count: sets.bad.len(),
			known_mem_used: verification.known_bytes(),
			unknown_mem_used: sets.unknown_bytes(),
			max_known_count: self.max_known_count,
			max_known_size: self.max_known_size,
			max_unknown_count: self.max_unknown_count,
			max_unknown_size: self.max_unknown_size,
			total_difficulty: sets.difficulty,
		}
	}

	/// Clear everything.
	pub fn clear(&self) {
		let mut sets = self.internal.sets.write();
		let mut verification = self.internal.verification.lock();
		sets.ready.clear();
		sets.draining.clear();
		sets.unknown_set.clear();
		sets.future_set.clear();
		sets.unknown.clear();
		sets.unknown_bytes = 0;
		sets.future.clear();
		sets.future_bytes = 0;
		sets.difficulty = U256::zero();
		sets.draining_difficulty = U256::zero();
		verification.unverified.clear();
		verification.unverified_bytes = 0;
		verification.verifying.clear();
		verification.verifying_bytes = 0;
		verification.verified.clear();
		verification.verified_bytes = 0;
	}

	/// Wait for the conveyor to go empty. Test helper.
	pub fn flush(&self) {
		let mut verification = self.internal.verification.lock();
		while !verification.unverified.is_empty() || !verification.verifying.is_empty() {
			self.internal.empty.wait(&mut verification);
		}
	}

	/// Stop all verification activity and join the workers. Idempotent.
	pub fn stop(&self) {
		self.deleting.store(true, AtomicOrdering::Release);
		self.internal.more_to_verify.notify_all();
		for handle in self.verifiers.lock().drain(..) {
			let _ = handle.join();
		}
	}
}

impl Drop for BlockQueue {
	fn drop(&mut self) {
		trace!(target: "shutdown", "[BlockQueue] Closing...");
		self.clear();
		self.stop();
		trace!(target: "shutdown", "[BlockQueue] Closed.");
	}
}

fn unix_now() -> u64 {
	::time::get_time().sec as u64
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use crossbeam_channel::unbounded;
	use ethereum_types::H256;
	use parking_lot::RwLock;
	use rlp::RlpStream;

	use common_types::block::Block;
	use common_types::header::Header;
	use common_types::io_message::ClientIoMessage;

	use super::{BlockQueue, Config, ImportResult, QueueStatus};
	use crate::client::BlockInfo;
	use crate::engines::{Engine, NullEngine};
	use crate::io::IoChannel;

	// Chain stub: a set of hashes assumed to be on-chain.
	#[derive(Default)]
	struct TestChain(RwLock<std::collections::HashSet<H256>>);

	impl TestChain {
		fn insert(&self, hash: H256) {
			self.0.write().insert(hash);
		}
	}

	impl BlockInfo for TestChain {
		fn is_known(&self, hash: &H256) -> bool {
			self.0.read().contains(hash)
		}
	}

	fn seal() -> Vec<Vec<u8>> {
		vec![rlp::encode(&vec![0u8; 32]), rlp::encode(&vec![0u8; 8])]
	}

	fn make_block(parent: &H256, number: u64, timestamp: u64) -> Block {
		let mut block = Block::default();
		block.header.set_parent_hash(*parent);
		block.header.set_number(number);
		block.header.set_timestamp(timestamp);
		block.header.set_difficulty(100.into());
		block.header.set_seal(seal());
		block
	}

	// A chain of `count` empty blocks on top of `parent`.
	fn make_chain(parent: &H256, count: usize) -> Vec<Block> {
		let mut parent = *parent;
		let mut blocks = Vec::with_capacity(count);
		for i in 0..count {
			let block = make_block(&parent, i as u64 + 1, i as u64);
			parent = block.header.hash();
			blocks.push(block);
		}
		blocks
	}

	fn get_test_queue(engine: Arc<dyn Engine>, chain: Arc<TestChain>) -> BlockQueue {
		BlockQueue::new(Config::default(), engine, chain, IoChannel::disconnected())
	}

	fn default_queue() -> (BlockQueue, Arc<TestChain>) {
		let chain = Arc::new(TestChain::default());
		let queue = get_test_queue(Arc::new(NullEngine::new()), chain.clone());
		(queue, chain)
	}

	#[test]
	fn can_be_created() {
		let _ = default_queue();
	}

	#[test]
	fn imports_a_block_with_known_parent() {
		let (queue, chain) = default_queue();
		let genesis = H256::from_low_u64_be(1);
		chain.insert(genesis);
		let block = make_block(&genesis, 1, 0);
		assert_eq!(queue.import(block.rlp_bytes(), false), ImportResult::Success);
		queue.flush();
		assert_eq!(queue.drain(10).len(), 1);
	}

	#[test]
	fn returns_already_known_for_duplicates() {
		let (queue, chain) = default_queue();
		let genesis = H256::from_low_u64_be(1);
		chain.insert(genesis);
		let block = make_block(&genesis, 1, 0);
		assert_eq!(queue.import(block.rlp_bytes(), false), ImportResult::Success);
		assert_eq!(queue.import(block.rlp_bytes(), false), ImportResult::AlreadyKnown);

		queue.flush();
		let info = queue.queue_info();
		// the duplicate changed no bucket
		assert_eq!(info.known_count(), 1);
		assert_eq!(info.unknown_count(), 0);
	}

	#[test]
	fn returns_malformed_for_garbage() {
		let (queue, _) = default_queue();
		assert_eq!(queue.import(vec![0x01, 0x02], false), ImportResult::Malformed);
	}

	#[test]
	fn returns_already_in_chain() {
		let (queue, chain) = default_queue();
		let genesis = H256::from_low_u64_be(1);
		chain.insert(genesis);
		let block = make_block(&genesis, 1, 0);
		chain.insert(block.header.hash());
		assert_eq!(queue.import(block.rlp_bytes(), false), ImportResult::AlreadyInChain);
	}

	#[test]
	fn parks_unknown_parent_and_promotes_on_parent_import() {
		let (queue, chain) = default_queue();
		let genesis = H256::from_low_u64_be(1);
		chain.insert(genesis);
		let blocks = make_chain(&genesis, 2);

		assert_eq!(queue.import(blocks[1].rlp_bytes(), false), ImportResult::UnknownParent);
		assert_eq!(queue.status(&blocks[1].header.hash()), QueueStatus::UnknownParent);

		// parent arrives; the child is promoted recursively
		assert_eq!(queue.import(blocks[0].rlp_bytes(), false), ImportResult::Success);
		queue.flush();
		let drained = queue.drain(10);
		assert_eq!(drained.len(), 2);
		assert_eq!(drained[0].hash(), blocks[0].header.hash());
		assert_eq!(drained[1].hash(), blocks[1].header.hash());
	}

	#[test]
	fn bad_block_poisons_descendants() {
		// the engine fails everything numbered >= 3: blocks 3, 4, 5 of a
		// 5-block chain go bad, 1 and 2 survive
		let chain = Arc::new(TestChain::default());
		let genesis = H256::from_low_u64_be(1);
		chain.insert(genesis);
		let queue = get_test_queue(Arc::new(NullEngine::with_seal_bound(3)), chain);
		let blocks = make_chain(&genesis, 5);

		for block in &blocks {
			queue.import(block.rlp_bytes(), false);
		}
		queue.flush();
		let drained = queue.drain(10);
		queue.done_drain(&[]);
		assert_eq!(drained.len(), 2);
		for block in &blocks[2..] {
			assert_eq!(queue.status(&block.header.hash()), QueueStatus::Bad);
		}

		// a child of a bad block is rejected outright
		let child = make_block(&blocks[4].header.hash(), 6, 0);
		assert_eq!(queue.import(child.rlp_bytes(), false), ImportResult::BadChain);
		assert_eq!(queue.status(&child.header.hash()), QueueStatus::Bad);
	}

	#[test]
	fn parallel_verification_preserves_arrival_order() {
		let (queue, chain) = default_queue();
		let genesis = H256::from_low_u64_be(1);
		chain.insert(genesis);
		let blocks = make_chain(&genesis, 100);

		for block in &blocks {
			assert_eq!(queue.import(block.rlp_bytes(), false), ImportResult::Success);
		}
		queue.flush();
		let drained: Vec<H256> = queue.drain(100).iter().map(|b| b.hash()).collect();
		let expected: Vec<H256> = blocks.iter().map(|b| b.header.hash()).collect();
		assert_eq!(drained, expected);
	}

	#[test]
	fn future_block_parked_until_tick() {
		let (queue, chain) = default_queue();
		let genesis = H256::from_low_u64_be(1);
		chain.insert(genesis);

		let mut block = make_block(&genesis, 1, 0);
		block.header.set_timestamp(super::unix_now() + 60);
		assert_eq!(queue.import(block.rlp_bytes(), false), ImportResult::FutureTimeKnown);
		assert_eq!(queue.import(block.rlp_bytes(), false), ImportResult::AlreadyKnown);
		assert_eq!(queue.queue_info().future_queue_size, 1);

		// not ripe yet; nothing moves
		queue.tick();
		assert_eq!(queue.queue_info().future_queue_size, 1);

		// a block whose timestamp has been reached goes straight through
		let ripe = make_block(&genesis, 1, super::unix_now().saturating_sub(1));
		assert_eq!(queue.import(ripe.rlp_bytes(), false), ImportResult::Success);
		queue.flush();
		assert_eq!(queue.drain(10).len(), 1);
	}

	#[test]
	fn future_block_with_unknown_parent() {
		let (queue, _) = default_queue();
		let mut block = make_block(&H256::from_low_u64_be(42), 1, 0);
		block.header.set_timestamp(super::unix_now() + 60);
		assert_eq!(queue.import(block.rlp_bytes(), false), ImportResult::FutureTimeUnknown);
	}

	#[test]
	fn done_drain_feedback_poisons_descendants() {
		let (queue, chain) = default_queue();
		let genesis = H256::from_low_u64_be(1);
		chain.insert(genesis);
		let blocks = make_chain(&genesis, 3);

		assert_eq!(queue.import(blocks[0].rlp_bytes(), false), ImportResult::Success);
		queue.flush();
		assert_eq!(queue.drain(1).len(), 1);

		// while the first block drains, its children arrive
		assert_eq!(queue.import(blocks[1].rlp_bytes(), false), ImportResult::Success);
		assert_eq!(queue.import(blocks[2].rlp_bytes(), false), ImportResult::Success);
		queue.flush();

		// the chain rejects the drained block; everything built on it goes bad
		queue.done_drain(&[blocks[0].header.hash()]);
		assert_eq!(queue.status(&blocks[1].header.hash()), QueueStatus::Bad);
		assert_eq!(queue.status(&blocks[2].header.hash()), QueueStatus::Bad);
		assert!(queue.drain(10).is_empty());
	}

	#[test]
	fn signals_room_available_after_drain() {
		let (sender, receiver) = unbounded::<ClientIoMessage>();
		let chain = Arc::new(TestChain::default());
		let genesis = H256::from_low_u64_be(1);
		chain.insert(genesis);
		let config = Config {
			max_known_count: 0,
			max_known_size: 0,
			max_unknown_count: 0,
			max_unknown_size: 0,
			verifier_threads: Some(1),
		};
		let queue = BlockQueue::new(
			config,
			Arc::new(NullEngine::new()),
			chain,
			IoChannel::new(sender),
		);

		let block = make_block(&genesis, 1, 0);
		assert_eq!(queue.import(block.rlp_bytes(), false), ImportResult::Success);
		queue.flush();
		assert!(queue.is_known_full());

		assert_eq!(queue.drain(10).len(), 1);
		queue.done_drain(&[]);

		let messages: Vec<ClientIoMessage> = receiver.try_iter().collect();
		assert!(messages.contains(&ClientIoMessage::BlockVerified));
		assert!(messages.contains(&ClientIoMessage::BlockQueueRoomAvailable));
	}

	#[test]
	fn clear_empties_every_bucket() {
		let (queue, chain) = default_queue();
		let genesis = H256::from_low_u64_be(1);
		chain.insert(genesis);
		let blocks = make_chain(&genesis, 3);
		queue.import(blocks[0].rlp_bytes(), false);
		queue.import(blocks[2].rlp_bytes(), false);
		queue.clear();
		let info = queue.queue_info();
		assert!(info.is_empty());
		assert_eq!(info.unknown_count(), 0);
		assert_eq!(info.total_difficulty, 0.into());
	}

	#[test]
	fn rejects_non_list_body_items() {
		let (queue, chain) = default_queue();
		let genesis = H256::from_low_u64_be(1);
		chain.insert(genesis);

		let mut header = Header::new();
		header.set_parent_hash(genesis);
		header.set_number(1);
		header.set_seal(seal());
		let mut stream = RlpStream::new_list(3);
		stream.append(&header);
		stream.append(&b"not a list".to_vec());
		stream.append_raw(&[0xc0], 1);
		assert_eq!(queue.import(stream.out(), false), ImportResult::Malformed);
	}
}
