//! The raster-to-cell transform: packs one or more frames of a sprite's raw pixel grid into the
//! fixed 8x8 indexed-4bpp "cell" layout the target hardware expects, and assembles the packed
//! two-word sprite descriptor that points into the cell pool.

use thiserror::Error;

pub const CELL_BYTES: usize = 32;
pub const MAX_CELLS: usize = 2048;
pub const MAX_FRAMES: usize = 8;
pub const MAX_GRID_DIM: usize = 16;

#[derive(Error, Debug)]
pub enum SpriteError {
	#[error("cell pool would overflow ({attempted} cells requested, {available} remaining of {MAX_CELLS})")]
	CellPoolOverflow { attempted: usize, available: usize },

	#[error("frame_columns/frame_rows must each be in 1..=16, got {0}x{1}")]
	InvalidGrid(usize, usize),

	#[error("num_frames must be in 1..=8, got {0}")]
	InvalidFrameCount(usize),

	#[error("first_cell_index {0} exceeds the 11-bit addressable range (0..2047)")]
	CellIndexOutOfRange(usize),
}

/// A pool of packed 32-byte cells, appended to in sprite-addition order. Never exceeds
/// [`MAX_CELLS`] entries (invariant I6).
#[derive(Debug, Default, Clone)]
pub struct CellPool {
	bytes: Vec<u8>,
}

impl CellPool {
	pub fn new() -> Self {
		CellPool { bytes: Vec::new() }
	}

	pub fn len_cells(&self) -> usize {
		self.bytes.len() / CELL_BYTES
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.bytes
	}

	/// Packs `num_frames * frame_rows * frame_columns` cells from `frames` (each sized
	/// `width * height` palette-index bytes, row-major) and appends them to the pool.
	///
	/// Frames iterate outermost; within a frame, cells iterate row-major (cell_y outer,
	/// cell_x inner); within a cell, pixels iterate row-major; pixel px=even packs into the
	/// high nibble, px+1 into the low nibble of the same byte. No partial write is committed
	/// on overflow (cell-packer failure leaves the pool untouched).
	pub fn pack_frames(
		&mut self,
		frames: &[Vec<u8>],
		width: usize,
		height: usize,
		frame_rows: usize,
		frame_columns: usize,
	) -> Result<usize, SpriteError> {
		if !(1..=MAX_GRID_DIM).contains(&frame_rows) || !(1..=MAX_GRID_DIM).contains(&frame_columns) {
			return Err(SpriteError::InvalidGrid(frame_columns, frame_rows));
		}
		if !(1..=MAX_FRAMES).contains(&frames.len()) {
			return Err(SpriteError::InvalidFrameCount(frames.len()));
		}

		let cells_needed = frames.len() * frame_rows * frame_columns;
		let available = MAX_CELLS - self.len_cells();
		if cells_needed > available {
			return Err(SpriteError::CellPoolOverflow { attempted: cells_needed, available });
		}

		let first_cell_index = self.len_cells();
		let mut packed = vec![0u8; cells_needed * CELL_BYTES];

		for (f, frame) in frames.iter().enumerate() {
			for cell_y in 0..frame_rows {
				for cell_x in 0..frame_columns {
					let cell_index = f * frame_rows * frame_columns + cell_y * frame_columns + cell_x;
					let cell_out = &mut packed[cell_index * CELL_BYTES..(cell_index + 1) * CELL_BYTES];

					for py in 0..8usize {
						for px in 0..8usize {
							let pixel_src = f * (width * height) + (8 * width * cell_y) + (8 * cell_x) + width * py + px;
							let index = frame.get(pixel_src).copied().unwrap_or(0) & 0x0F;
							let byte_offset = (py * 8 + px) / 2;
							if px % 2 == 0 {
								cell_out[byte_offset] = (cell_out[byte_offset] & 0x0F) | (index << 4);
							} else {
								cell_out[byte_offset] = (cell_out[byte_offset] & 0xF0) | index;
							}
						}
					}
				}
			}
		}

		self.bytes.extend_from_slice(&packed);
		Ok(first_cell_index)
	}
}

/// Animation flags packed alongside `anim_ticks` in a sprite's descriptor words.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnimFlags {
	pub loop_animation: bool,
	pub ping_pong: bool,
}

/// One sprite descriptor: frame grid dimensions, frame count, animation timing, and a pointer
/// into the cell pool.
#[derive(Debug, Clone, Copy)]
pub struct Sprite {
	pub frame_columns: usize, // 1..=16
	pub frame_rows: usize,    // 1..=16
	pub num_frames: usize,    // 1..=8
	pub first_cell_index: usize, // 0..=2047
	pub anim_flags: AnimFlags,
	pub anim_ticks: u8, // 0..=63
}

impl Sprite {
	/// Packs this descriptor into its on-wire two-16-bit-word form.
	///
	/// Word 0: `CCCC RRRR FFF L P TTT` (columns-1 : rows-1 : frames-1 : loop : ping_pong :
	/// anim_ticks high 3 bits). Word 1: `TTT 00 CCCCCCCCCCC` (anim_ticks low 3 bits : reserved
	/// : first_cell_index, 11 bits). This is the documented resolution of the spec's open
	/// question about where the animation flags and the full 6-bit tick value live: the
	/// literal 5 reserved bits in word 0 are not wide enough alone, so the 6-bit tick value is
	/// split 3-high/3-low across the two words' spare bits, and the 2 flag bits live in word 0.
	pub fn pack(&self) -> Result<[u16; 2], SpriteError> {
		if !(1..=MAX_GRID_DIM).contains(&self.frame_columns) || !(1..=MAX_GRID_DIM).contains(&self.frame_rows) {
			return Err(SpriteError::InvalidGrid(self.frame_columns, self.frame_rows));
		}
		if !(1..=MAX_FRAMES).contains(&self.num_frames) {
			return Err(SpriteError::InvalidFrameCount(self.num_frames));
		}
		if self.first_cell_index > 0x7FF {
			return Err(SpriteError::CellIndexOutOfRange(self.first_cell_index));
		}

		let c = (self.frame_columns - 1) as u16 & 0x0F;
		let r = (self.frame_rows - 1) as u16 & 0x0F;
		let f = (self.num_frames - 1) as u16 & 0x07;
		let loop_bit = self.anim_flags.loop_animation as u16;
		let ping_pong_bit = self.anim_flags.ping_pong as u16;
		let ticks = (self.anim_ticks & 0x3F) as u16;
		let ticks_high = (ticks >> 3) & 0x07;
		let ticks_low = ticks & 0x07;

		let word0 = (c << 12) | (r << 8) | (f << 5) | (loop_bit << 4) | (ping_pong_bit << 3) | ticks_high;
		let word1 = (ticks_low << 13) | (self.first_cell_index as u16 & 0x7FF);

		Ok([word0, word1])
	}

	/// Reconstructs a descriptor from its packed wire form (used by tests and by any future
	/// consumer-side validation tooling).
	pub fn unpack(words: [u16; 2]) -> Sprite {
		let word0 = words[0];
		let word1 = words[1];

		let frame_columns = ((word0 >> 12) & 0x0F) as usize + 1;
		let frame_rows = ((word0 >> 8) & 0x0F) as usize + 1;
		let num_frames = ((word0 >> 5) & 0x07) as usize + 1;
		let loop_animation = (word0 >> 4) & 0x01 != 0;
		let ping_pong = (word0 >> 3) & 0x01 != 0;
		let ticks_high = word0 & 0x07;
		let ticks_low = (word1 >> 13) & 0x07;
		let anim_ticks = ((ticks_high << 3) | ticks_low) as u8;
		let first_cell_index = (word1 & 0x7FF) as usize;

		Sprite {
			frame_columns,
			frame_rows,
			num_frames,
			first_cell_index,
			anim_flags: AnimFlags { loop_animation, ping_pong },
			anim_ticks,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn packs_256_cells_for_full_16x16_single_frame_sprite() {
		let mut pool = CellPool::new();
		let frame = vec![5u8; 128 * 128];
		let first = pool.pack_frames(&[frame], 128, 128, 16, 16).unwrap();
		assert_eq!(first, 0);
		assert_eq!(pool.len_cells(), 256);
	}

	#[test]
	fn packs_two_solid_color_cells_for_16x8_two_frame_sprite() {
		let mut pool = CellPool::new();
		let frame_a = vec![0u8; 16 * 8];
		let frame_b = vec![1u8; 16 * 8];
		pool.pack_frames(&[frame_a, frame_b], 16, 8, 1, 2).unwrap();
		assert_eq!(pool.len_cells(), 4); // 2 frames * 1 row * 2 columns
	}

	#[test]
	fn a_single_8x8_index_5_frame_packs_to_all_0x55_bytes() {
		let mut pool = CellPool::new();
		let frame = vec![5u8; 8 * 8];
		pool.pack_frames(&[frame], 8, 8, 1, 1).unwrap();
		assert!(pool.as_bytes().iter().all(|&b| b == 0x55));
		assert_eq!(pool.as_bytes().len(), 32);
	}

	#[test]
	fn appending_a_second_sprite_is_equivalent_to_packing_into_an_offset_pool() {
		let frame_a = vec![3u8; 8 * 8];
		let frame_b = vec![7u8; 8 * 8];

		let mut combined = CellPool::new();
		combined.pack_frames(&[frame_a.clone()], 8, 8, 1, 1).unwrap();
		let second_first_index = combined.pack_frames(&[frame_b.clone()], 8, 8, 1, 1).unwrap();

		let mut solo_b = CellPool::new();
		solo_b.pack_frames(&[frame_b], 8, 8, 1, 1).unwrap();

		assert_eq!(second_first_index, 1);
		assert_eq!(&combined.as_bytes()[32..], solo_b.as_bytes());
	}

	#[test]
	fn rejects_overflow_without_partial_writes() {
		let mut pool = CellPool::new();
		// fill to exactly MAX_CELLS
		let frame = vec![0u8; 128 * 128];
		for _ in 0..8 {
			pool.pack_frames(&[frame.clone()], 128, 128, 16, 16).unwrap();
		}
		assert_eq!(pool.len_cells(), MAX_CELLS);

		let before = pool.as_bytes().to_vec();
		let result = pool.pack_frames(&[vec![0u8; 64]], 8, 8, 1, 1);
		assert!(result.is_err());
		assert_eq!(pool.as_bytes(), before.as_slice());
	}

	#[test]
	fn sprite_descriptor_round_trips_through_pack_unpack() {
		let sprite = Sprite {
			frame_columns: 16,
			frame_rows: 16,
			num_frames: 8,
			first_cell_index: 2000,
			anim_flags: AnimFlags { loop_animation: true, ping_pong: true },
			anim_ticks: 47,
		};
		let words = sprite.pack().unwrap();
		let round_tripped = Sprite::unpack(words);
		assert_eq!(round_tripped.frame_columns, 16);
		assert_eq!(round_tripped.frame_rows, 16);
		assert_eq!(round_tripped.num_frames, 8);
		assert_eq!(round_tripped.first_cell_index, 2000);
		assert!(round_tripped.anim_flags.loop_animation);
		assert!(round_tripped.anim_flags.ping_pong);
		assert_eq!(round_tripped.anim_ticks, 47);
	}

	#[test]
	fn static_sprite_packs_to_the_documented_all_zero_word_layout() {
		let sprite = Sprite {
			frame_columns: 1,
			frame_rows: 1,
			num_frames: 1,
			first_cell_index: 0,
			anim_flags: AnimFlags::default(),
			anim_ticks: 0,
		};
		let words = sprite.pack().unwrap();
		assert_eq!(words, [0x0000, 0x0000]);
	}
}
