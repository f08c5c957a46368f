//! The optional nested-folder ROM layout: a fixed-size top-level table of folders, each folder
//! itself holding a flat file table. This is the original tool's layout, kept here as the
//! documented alternative to the canonical flat chunk-table form in the parent module — not
//! used by the default compilation pipeline, but a faithful, independently testable port of the
//! source repository's recursive table-of-tables addressing scheme.

use thiserror::Error;

use crate::util::bigendian::{read_u24_be, write_u24_be};

pub const TABLE_COUNT_BYTES: usize = 2;
pub const TABLE_ENTRY_BYTES: usize = 6;

#[derive(Error, Debug)]
pub enum NestedRomError {
	#[error("folder index {0} out of range (0..{1})")]
	FolderOutOfRange(usize, usize),

	#[error("insertion address {addr} exceeds rom size {size}")]
	InsertPastEnd { addr: usize, size: usize },

	#[error("rom would exceed the {max}-byte cap ({attempted} bytes requested)")]
	CapacityExceeded { attempted: usize, max: usize },

	#[error("file data must be non-empty")]
	EmptyFile,
}

fn table_bytes(num_entries: usize) -> usize {
	TABLE_COUNT_BYTES + TABLE_ENTRY_BYTES * num_entries
}

fn entry_addr_offset(entry: usize) -> usize {
	TABLE_COUNT_BYTES + TABLE_ENTRY_BYTES * entry
}

fn entry_size_offset(entry: usize) -> usize {
	entry_addr_offset(entry) + 3
}

/// A ROM laid out as a fixed top-level folder table, each folder a flat file table of its own.
/// Addresses stored in any table are relative to the start of that table's own folder region
/// (or, for the top-level table, to the start of the rom).
pub struct NestedRom {
	data: Vec<u8>,
	max_bytes: usize,
	num_folders: u16,
}

impl NestedRom {
	/// Creates a fresh rom with `num_folders` empty folders, mirroring the source tool's
	/// `rom_clear`: the top-level table is written first, then a blank (zero-file) table for
	/// each folder.
	pub fn new(num_folders: u16, max_bytes: usize) -> Result<Self, NestedRomError> {
		let mut rom = NestedRom { data: Vec::new(), max_bytes, num_folders };
		rom.clear()?;
		Ok(rom)
	}

	pub fn rom_size(&self) -> usize {
		self.data.len()
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.data
	}

	fn insert_block(&mut self, addr: usize, num_bytes: usize) -> Result<(), NestedRomError> {
		if addr > self.data.len() {
			return Err(NestedRomError::InsertPastEnd { addr, size: self.data.len() });
		}
		let new_size = self.data.len() + num_bytes;
		if new_size > self.max_bytes {
			return Err(NestedRomError::CapacityExceeded { attempted: new_size, max: self.max_bytes });
		}
		let mut tail = self.data.split_off(addr);
		self.data.resize(self.data.len() + num_bytes, 0);
		self.data.append(&mut tail);
		Ok(())
	}

	fn write_u24(&mut self, addr: usize, value: u32) {
		let mut field = &mut self.data[addr..addr + 3];
		write_u24_be(&mut field, value).expect("writing into an in-memory slice cannot fail");
	}

	fn read_u24(&self, addr: usize) -> u32 {
		read_u24_be(&mut &self.data[addr..addr + 3]).expect("reading an in-memory slice cannot fail")
	}

	fn write_u16(&mut self, addr: usize, value: u16) {
		self.data[addr..addr + 2].copy_from_slice(&value.to_be_bytes());
	}

	fn read_u16(&self, addr: usize) -> u16 {
		u16::from_be_bytes([self.data[addr], self.data[addr + 1]])
	}

	fn clear(&mut self) -> Result<(), NestedRomError> {
		self.data.clear();

		self.insert_block(0, table_bytes(self.num_folders as usize))?;
		for _ in 0..self.num_folders {
			self.insert_block(self.data.len(), table_bytes(0))?;
		}

		self.write_u16(0, self.num_folders);

		for k in 0..self.num_folders as usize {
			let folder_addr = table_bytes(self.num_folders as usize) + k * table_bytes(0);
			self.write_u24(entry_addr_offset(k), folder_addr as u32);
			self.write_u24(entry_size_offset(k), table_bytes(0) as u32);
			self.write_u16(folder_addr, 0);
		}

		Ok(())
	}

	/// Appends `data` as a new file inside `folder`, sliding the folder's own file table and
	/// every subsequent folder's region down to make room, and updating every address the
	/// insertion invalidates (both within the folder and in the top-level table).
	pub fn add_file(&mut self, folder: u16, data: &[u8]) -> Result<(), NestedRomError> {
		let folder = folder as usize;
		if folder >= self.num_folders as usize {
			return Err(NestedRomError::FolderOutOfRange(folder, self.num_folders as usize));
		}
		if data.is_empty() {
			return Err(NestedRomError::EmptyFile);
		}

		let folder_addr = self.read_u24(entry_addr_offset(folder)) as usize;
		let num_files = self.read_u16(folder_addr) as usize;

		let (entry_addr, mut file_addr) = if num_files == 0 {
			(table_bytes(0), table_bytes(0))
		} else {
			let entry_addr = self.read_u24(folder_addr + entry_addr_offset(0)) as usize;
			let last_addr = self.read_u24(folder_addr + entry_addr_offset(num_files - 1)) as usize;
			let last_size = self.read_u24(folder_addr + entry_size_offset(num_files - 1)) as usize;
			(entry_addr, last_addr + last_size)
		};
		file_addr += TABLE_ENTRY_BYTES;

		self.insert_block(folder_addr + entry_addr, TABLE_ENTRY_BYTES)?;
		self.insert_block(folder_addr + file_addr, data.len())?;

		for k in 0..num_files {
			let addr = self.read_u24(folder_addr + entry_addr_offset(k)) + TABLE_ENTRY_BYTES as u32;
			self.write_u24(folder_addr + entry_addr_offset(k), addr);
		}

		self.write_u24(folder_addr + entry_addr + 0, file_addr as u32);
		self.write_u24(folder_addr + entry_addr + 3, data.len() as u32);

		let folder_size = self.read_u24(entry_size_offset(folder)) + (TABLE_ENTRY_BYTES + data.len()) as u32;
		self.write_u24(entry_size_offset(folder), folder_size);

		for k in (folder + 1)..self.num_folders as usize {
			let addr = self.read_u24(entry_addr_offset(k)) + (TABLE_ENTRY_BYTES + data.len()) as u32;
			self.write_u24(entry_addr_offset(k), addr);
		}

		self.data[folder_addr + file_addr..folder_addr + file_addr + data.len()].copy_from_slice(data);

		self.write_u16(folder_addr, (num_files + 1) as u16);

		Ok(())
	}

	/// Mirrors `rom_validate`: walks the top-level table and every folder's file table, checking
	/// that each region's addresses are the prefix sum of the sizes before it.
	pub fn validate(&self) -> Result<(), NestedRomError> {
		let num_folders = self.read_u16(0);
		let mut rom_accum = table_bytes(num_folders as usize) as u32;

		for k in 0..num_folders as usize {
			let folder_addr = self.read_u24(entry_addr_offset(k));
			let folder_size = self.read_u24(entry_size_offset(k));

			if folder_addr != rom_accum {
				return Err(NestedRomError::InsertPastEnd { addr: folder_addr as usize, size: rom_accum as usize });
			}

			let num_files = self.read_u16(folder_addr as usize);
			let mut folder_accum = table_bytes(num_files as usize) as u32;

			for m in 0..num_files as usize {
				let file_addr = self.read_u24(folder_addr as usize + entry_addr_offset(m));
				let file_size = self.read_u24(folder_addr as usize + entry_size_offset(m));

				if file_addr != folder_accum {
					return Err(NestedRomError::InsertPastEnd { addr: file_addr as usize, size: folder_accum as usize });
				}
				folder_accum += file_size;
			}

			if folder_accum != folder_size {
				return Err(NestedRomError::InsertPastEnd { addr: folder_accum as usize, size: folder_size as usize });
			}
			rom_accum += folder_size;
		}

		if rom_accum as usize != self.data.len() {
			return Err(NestedRomError::InsertPastEnd { addr: rom_accum as usize, size: self.data.len() });
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fresh_rom_has_the_skeleton_folder_table_and_validates() {
		let rom = NestedRom::new(2, 4 * 1024 * 1024).unwrap();
		assert_eq!(rom.read_u16(0), 2);
		rom.validate().unwrap();
	}

	#[test]
	fn adding_a_file_updates_folder_size_and_later_folder_addresses() {
		let mut rom = NestedRom::new(2, 4 * 1024 * 1024).unwrap();
		let folder1_addr_before = rom.read_u24(entry_addr_offset(1));

		rom.add_file(0, &[1, 2, 3, 4]).unwrap();

		let folder1_addr_after = rom.read_u24(entry_addr_offset(1));
		assert_eq!(folder1_addr_after, folder1_addr_before + TABLE_ENTRY_BYTES as u32 + 4);
		rom.validate().unwrap();
	}

	#[test]
	fn adding_multiple_files_to_the_same_folder_stays_valid() {
		let mut rom = NestedRom::new(3, 4 * 1024 * 1024).unwrap();
		rom.add_file(1, &[9, 9]).unwrap();
		rom.add_file(1, &[1, 2, 3]).unwrap();
		rom.add_file(0, &[5]).unwrap();
		rom.validate().unwrap();

		let folder_addr = rom.read_u24(entry_addr_offset(1));
		assert_eq!(rom.read_u16(folder_addr as usize), 2);
	}

	#[test]
	fn rejects_an_out_of_range_folder() {
		let mut rom = NestedRom::new(2, 4 * 1024 * 1024).unwrap();
		assert!(matches!(rom.add_file(5, &[1]), Err(NestedRomError::FolderOutOfRange(5, 2))));
	}

	#[test]
	fn rejects_empty_file_data() {
		let mut rom = NestedRom::new(2, 4 * 1024 * 1024).unwrap();
		assert!(matches!(rom.add_file(0, &[]), Err(NestedRomError::EmptyFile)));
	}
}
