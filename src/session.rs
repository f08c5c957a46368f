//! The orchestrator: drives the manifest's directive stream through the GIF decoder and sprite
//! assembler, one spriteset at a time, emitting three ROM chunks per spriteset. Owns all
//! per-session mutable state in one value rather than the module-scope globals the source tool
//! used — see the design notes this crate's README carries forward from the original port.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::{debug, info};

use crate::config::{self, SpritesetDirective};
use crate::error::AppError;
use crate::gif::{self, Color};
use crate::rom::RomContainer;
use crate::sprite::{AnimFlags, CellPool, Sprite};
use crate::walk;

/// Per-spriteset working state: the palette latch, the growing cell pool, and the packed sprite
/// descriptor words. Reset at the start of every spriteset by [`Packer::compile_spriteset`].
struct SessionBuffer {
	palette: Option<[Color; 16]>,
	cell_pool: CellPool,
	sprite_words: Vec<u16>,
}

impl SessionBuffer {
	fn new() -> Self {
		SessionBuffer { palette: None, cell_pool: CellPool::new(), sprite_words: Vec::new() }
	}
}

/// Owns the ROM buffer across an entire compilation run. Each spriteset directive is compiled
/// into a fresh [`SessionBuffer`] and flushed into three chunks before moving to the next.
pub struct Packer {
	rom: RomContainer,
}

impl Packer {
	pub fn new() -> Self {
		Packer { rom: RomContainer::new() }
	}

	pub fn into_rom(self) -> RomContainer {
		self.rom
	}

	/// Compiles one spriteset directive: decodes every named sprite GIF in manifest order,
	/// packs its cells, and appends a descriptor to the session's sprite table. On success,
	/// flushes the palette, sprite-table, and cell-pool chunks (in that order) to the ROM.
	fn compile_spriteset(&mut self, directive: &SpritesetDirective, asset_root: &Path) -> Result<(), AppError> {
		if directive.sprites.is_empty() {
			return Err(AppError::EmptySpriteset(directive.name.clone()));
		}

		let mut session = SessionBuffer::new();

		for entry in &directive.sprites {
			info!("spriteset {:?}: packing sprite {:?} from {:?}", directive.name, entry.name, entry.filename);

			let path = walk::find_asset(asset_root, &entry.filename)?;
			let file = File::open(&path).map_err(|e| AppError::ManifestIo(path.clone(), e))?;
			let decoded = gif::decode(&mut BufReader::new(file))?;

			// palette is first-wins, both within a single GIF (handled by the decoder) and
			// across sprites within a spriteset (handled here).
			if session.palette.is_none() {
				session.palette = Some(decoded.palette);
			}

			let width = decoded.frames[0].width as usize;
			let height = decoded.frames[0].height as usize;
			let frame_columns = width / 8;
			let frame_rows = height / 8;

			let first_cell_index = session.cell_pool.len_cells();
			let pixel_frames: Vec<Vec<u8>> = decoded.frames.iter().map(|f| f.pixels.clone()).collect();
			session.cell_pool.pack_frames(&pixel_frames, width, height, frame_rows, frame_columns)?;

			let sprite = Sprite {
				frame_columns,
				frame_rows,
				num_frames: decoded.frames.len(),
				first_cell_index,
				anim_flags: AnimFlags { loop_animation: decoded.frames.len() > 1, ping_pong: decoded.ping_pong },
				anim_ticks: decoded.anim_ticks,
			};
			let words = sprite.pack()?;
			session.sprite_words.extend_from_slice(&words);

			debug!(
				"spriteset {:?}: sprite {:?} -> {} cells starting at {}",
				directive.name,
				entry.name,
				frame_rows * frame_columns * decoded.frames.len(),
				first_cell_index
			);
		}

		let palette = session.palette.unwrap_or([Color(0); 16]);
		let palette_words: Vec<u16> = palette.iter().map(|c| c.as_u16()).collect();

		self.rom.add_chunk_words(&palette_words)?;
		self.rom.add_chunk_words(&session.sprite_words)?;
		self.rom.add_chunk_bytes(session.cell_pool.as_bytes())?;

		Ok(())
	}

	/// Drives every directive in `directives` to completion, producing a validated ROM.
	pub fn compile_directives(mut self, directives: &[SpritesetDirective], asset_root: &Path) -> Result<RomContainer, AppError> {
		for directive in directives {
			self.compile_spriteset(directive, asset_root)?;
		}
		self.rom.validate()?;
		Ok(self.rom)
	}
}

impl Default for Packer {
	fn default() -> Self {
		Self::new()
	}
}

/// Top-level entry point: parses `manifest_path`, resolves sprite filenames under `asset_root`,
/// and returns the compiled, validated ROM ready for `save`.
pub fn compile_manifest(manifest_path: &Path, asset_root: &Path) -> Result<RomContainer, AppError> {
	let manifest_bytes = std::fs::read(manifest_path).map_err(|e| AppError::ManifestIo(manifest_path.to_path_buf(), e))?;
	let directives = config::parse(manifest_bytes.as_slice())?;
	Packer::new().compile_directives(&directives, asset_root)
}
