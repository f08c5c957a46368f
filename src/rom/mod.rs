//! The ROM container engine: an in-memory byte buffer holding a self-referential chunk table
//! plus the concatenated chunk payloads, built up by repeated in-place insertion and finally
//! validated and written to disk.
//!
//! The on-disk layout is the flat chunk-table form: an 8-byte signature, a 4-byte type tag, a
//! 2-byte chunk count, `count` 6-byte `(addr, size)` entries, then the payloads back to back with
//! no padding. All multi-byte integers are big-endian. See [`nested`] for the optional two-level
//! folder variant the original tool also supported.

pub mod nested;

use std::io::Write;

use byteorder::{BigEndian, WriteBytesExt};
use thiserror::Error;

use crate::util::bigendian::{read_u24_be, write_u24_be};

pub const SIGNATURE: &[u8; 8] = b"KUNOICHI";
pub const TYPE_TAG: &[u8; 4] = b"CART";
pub const MAX_ROM_BYTES: usize = 4 * 1024 * 1024;
pub const TABLE_COUNT_BYTES: usize = 2;
pub const TABLE_ENTRY_BYTES: usize = 6;

#[derive(Error, Debug)]
pub enum RomError {
	#[error("rom would exceed the {MAX_ROM_BYTES}-byte cap ({attempted} bytes requested)")]
	CapacityExceeded { attempted: usize },

	#[error("chunk table is full (65535 entries)")]
	TableFull,

	#[error("chunk size must be non-zero")]
	EmptyChunk,

	#[error("chunk index {0} out of range (table has {1} entries)")]
	ChunkIndexOutOfRange(usize, usize),

	#[error("rom failed validation: {0}")]
	Invalid(&'static str),

	#[error("failed to write rom file: {0}")]
	Io(#[from] std::io::Error),
}

/// A growing ROM byte buffer with a flat chunk table at its head.
///
/// The buffer always begins life in the `format`-ed state: a 2-byte chunk count of zero and
/// nothing else. Every subsequent operation either extends the table (sliding the data block
/// down) or appends to the data block (growing the buffer's tail), never both destructively.
#[derive(Debug, Default, Clone)]
pub struct RomContainer {
	data: Vec<u8>,
}

impl RomContainer {
	pub fn new() -> Self {
		let mut rom = RomContainer { data: Vec::new() };
		rom.format();
		rom
	}

	/// Resets the buffer to an empty chunk table (count = 0).
	pub fn format(&mut self) {
		self.data.clear();
		self.data.extend_from_slice(&[0u8, 0u8]);
	}

	pub fn chunk_count(&self) -> usize {
		u16::from_be_bytes([self.data[0], self.data[1]]) as usize
	}

	pub fn rom_size(&self) -> usize {
		self.data.len()
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.data
	}

	fn table_bytes(count: usize) -> usize {
		TABLE_COUNT_BYTES + TABLE_ENTRY_BYTES * count
	}

	fn entry_offset(index: usize) -> usize {
		TABLE_COUNT_BYTES + TABLE_ENTRY_BYTES * index
	}

	/// Slides everything at or after `at` down by `num_bytes`, zero-filling the new gap. Mirrors
	/// the source tool's block-insertion primitive: the new region is always zeroed, and an
	/// insertion at `rom_size()` is a plain append.
	fn insert_block(&mut self, at: usize, num_bytes: usize) -> Result<(), RomError> {
		let new_size = self.data.len() + num_bytes;
		if new_size > MAX_ROM_BYTES {
			return Err(RomError::CapacityExceeded { attempted: new_size });
		}
		let mut tail = self.data.split_off(at);
		self.data.resize(self.data.len() + num_bytes, 0);
		self.data.append(&mut tail);
		Ok(())
	}

	/// Allocates a new chunk: grows the table by one entry (sliding the data block down six
	/// bytes), then appends `size` zero bytes to the data block. Returns the new chunk's index.
	pub fn create_chunk(&mut self, size: usize) -> Result<usize, RomError> {
		if size == 0 {
			return Err(RomError::EmptyChunk);
		}
		let count = self.chunk_count();
		if count + 1 >= u16::MAX as usize {
			return Err(RomError::TableFull);
		}

		let total_growth = TABLE_ENTRY_BYTES + size;
		if self.data.len() + total_growth > MAX_ROM_BYTES {
			return Err(RomError::CapacityExceeded { attempted: self.data.len() + total_growth });
		}

		let data_block_size_before = self.data.len() - Self::table_bytes(count);
		let new_entry_offset = Self::entry_offset(count);

		self.insert_block(new_entry_offset, TABLE_ENTRY_BYTES)?;

		let addr = data_block_size_before;
		self.insert_block(self.data.len(), size)?;

		let mut addr_field = &mut self.data[new_entry_offset..new_entry_offset + 3];
		write_u24_be(&mut addr_field, addr as u32).expect("writing into an in-memory slice cannot fail");
		let mut size_field = &mut self.data[new_entry_offset + 3..new_entry_offset + 6];
		write_u24_be(&mut size_field, size as u32).expect("writing into an in-memory slice cannot fail");

		let new_count = (count + 1) as u16;
		self.data[0..2].copy_from_slice(&new_count.to_be_bytes());

		Ok(count)
	}

	/// Allocates a chunk sized to `data` and copies it in.
	pub fn add_chunk_bytes(&mut self, bytes: &[u8]) -> Result<usize, RomError> {
		let index = self.create_chunk(bytes.len())?;
		let (addr, size) = self.chunk_location(index)?;
		self.data[addr..addr + size].copy_from_slice(bytes);
		Ok(index)
	}

	/// Allocates a chunk sized to hold `words.len()` big-endian 16-bit words and writes them.
	pub fn add_chunk_words(&mut self, words: &[u16]) -> Result<usize, RomError> {
		let index = self.create_chunk(words.len() * 2)?;
		let (addr, size) = self.chunk_location(index)?;
		let mut cursor = &mut self.data[addr..addr + size];
		for &word in words {
			cursor.write_u16::<BigEndian>(word)?;
		}
		Ok(index)
	}

	/// Returns the absolute (within-buffer) byte offset and size of chunk `index`'s payload.
	pub fn chunk_location(&self, index: usize) -> Result<(usize, usize), RomError> {
		let count = self.chunk_count();
		if index >= count {
			return Err(RomError::ChunkIndexOutOfRange(index, count));
		}
		let entry = Self::entry_offset(index);
		let addr = read_u24_be(&mut &self.data[entry..entry + 3]).expect("in-memory read cannot fail") as usize;
		let size = read_u24_be(&mut &self.data[entry + 3..entry + 6]).expect("in-memory read cannot fail") as usize;
		let base = Self::table_bytes(count);
		Ok((base + addr, size))
	}

	/// Checks invariants I1–I5: size cap, count/table agreement, prefix-sum addressing,
	/// non-zero sizes, and total-size consistency.
	pub fn validate(&self) -> Result<(), RomError> {
		if self.data.len() > MAX_ROM_BYTES {
			return Err(RomError::Invalid("rom exceeds the 4 MiB cap"));
		}

		let count = self.chunk_count();
		let table_bytes = Self::table_bytes(count);
		if self.data.len() < table_bytes {
			return Err(RomError::Invalid("buffer is shorter than its own chunk table"));
		}

		let mut expected_addr: u32 = 0;
		for k in 0..count {
			let entry = Self::entry_offset(k);
			let addr = read_u24_be(&mut &self.data[entry..entry + 3]).expect("in-memory read cannot fail");
			let size = read_u24_be(&mut &self.data[entry + 3..entry + 6]).expect("in-memory read cannot fail");

			if size == 0 {
				return Err(RomError::Invalid("chunk size must be non-zero"));
			}
			if addr != expected_addr {
				return Err(RomError::Invalid("chunk address is not the prefix sum of prior sizes"));
			}
			expected_addr += size;
		}

		let data_block_size = self.data.len() - table_bytes;
		if expected_addr as usize != data_block_size {
			return Err(RomError::Invalid("sum of chunk sizes does not match the data block size"));
		}

		Ok(())
	}

	/// Validates the buffer, then writes `"KUNOICHI"` + `"CART"` + the full buffer to `path`.
	pub fn save(&self, path: &std::path::Path) -> Result<(), RomError> {
		self.validate()?;
		let mut file = std::fs::File::create(path)?;
		file.write_all(SIGNATURE)?;
		file.write_all(TYPE_TAG)?;
		file.write_all(&self.data)?;
		Ok(())
	}
}
