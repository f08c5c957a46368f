//! GIF89a decoding: block-dispatch state machine, palette latch, disposal-composited frame
//! sequence, and ping-pong detection. See [`crate::util::lzw`] for the LZW layer underneath.

mod color;
mod pingpong;

pub use color::Color;
pub use pingpong::reduce_ping_pong;

use std::io::{self, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use thiserror::Error;

use crate::util::lzw::{lzw_decode, LzwError};

#[derive(Error, Debug)]
pub enum GifError {
	#[error("not a GIF89a file")]
	BadSignature,

	#[error("unknown block marker 0x{0:02x}")]
	UnknownBlockMarker(u8),

	#[error("unknown extension label 0x{0:02x}")]
	UnknownExtensionLabel(u8),

	#[error("canvas dimensions {0}x{1} are not multiples of 8 within 128x128")]
	InvalidCanvasDimensions(u16, u16),

	#[error("interlaced GIF images are not supported")]
	Interlaced,

	#[error("sub-image at ({0},{1}) sized {2}x{3} does not fit within the {4}x{5} canvas")]
	SubImageOutOfBounds(u16, u16, u16, u16, u16, u16),

	#[error("LZW output ({0} bytes) is too short for a {1}x{2} sub-image")]
	TruncatedImageData(usize, u16, u16),

	#[error("no image data was found in this GIF")]
	NoImageData,

	#[error("no color table (global or local) was found in this GIF")]
	NoColorTable,

	#[error("LZW decoding error")]
	Lzw(#[from] LzwError),

	#[error("GIF I/O error")]
	Io(#[from] io::Error),
}

/// A 16-color palette, latched from the first color table encountered in a GIF (global
/// preferred, otherwise the first local table). Subsequent tables are parsed (so the block
/// stream stays in sync) but discarded.
pub type Palette = [Color; 16];

/// One fully-composited, full-canvas raster of 8-bit palette indices. Width and height are
/// each multiples of 8, and at most 128 (16 cells per side).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
	pub width: u16,
	pub height: u16,
	pub pixels: Vec<u8>,
}

impl Frame {
	fn blank(width: u16, height: u16) -> Self {
		Frame { width, height, pixels: vec![0u8; width as usize * height as usize] }
	}
}

/// The result of decoding one GIF89a file: the latched palette, the (possibly ping-pong
/// reduced) frame sequence, whether it was a ping-pong animation, and the animation tick
/// delay (latched from the first graphic control extension encountered).
pub struct DecodedGif {
	pub palette: Palette,
	pub frames: Vec<Frame>,
	pub ping_pong: bool,
	pub anim_ticks: u8,
}

const GIF_SIGNATURE: &[u8; 6] = b"GIF89a";

const MARKER_IMAGE_DESCRIPTOR: u8 = 0x2C;
const MARKER_EXTENSION: u8 = 0x21;
const MARKER_TRAILER: u8 = 0x3B;

const LABEL_GRAPHIC_CONTROL: u8 = 0xF9;
const LABEL_APPLICATION: u8 = 0xFF;
const LABEL_COMMENT: u8 = 0xFE;
const LABEL_PLAIN_TEXT: u8 = 0x01;

const MAX_CANVAS_CELLS_PER_SIDE: u16 = 16;
const MAX_RAW_FRAMES: usize = 2 * (8 - 1); // ping-pong cap: 2*(MAX_FRAMES-1) = 14

fn validate_canvas_dimensions(width: u16, height: u16) -> Result<(), GifError> {
	let ok = width > 0
		&& height > 0
		&& width % 8 == 0
		&& height % 8 == 0
		&& width / 8 <= MAX_CANVAS_CELLS_PER_SIDE
		&& height / 8 <= MAX_CANVAS_CELLS_PER_SIDE;
	if ok {
		Ok(())
	} else {
		Err(GifError::InvalidCanvasDimensions(width, height))
	}
}

fn read_color_table<R: Read>(reader: &mut R, num_colors: usize) -> Result<Vec<Color>, GifError> {
	let mut colors = Vec::with_capacity(num_colors);
	for _ in 0..num_colors {
		let r = reader.read_u8()?;
		let g = reader.read_u8()?;
		let b = reader.read_u8()?;
		colors.push(Color::from_rgb8(r, g, b));
	}
	Ok(colors)
}

/// Takes the first 16 entries of a (possibly larger) color table, per the palette-latch
/// invariant: only the first 16 colors of the first table encountered in a session are kept.
fn latch_palette(colors: &[Color]) -> Palette {
	let mut palette = [Color(0); 16];
	for (i, slot) in palette.iter_mut().enumerate() {
		if let Some(color) = colors.get(i) {
			*slot = *color;
		}
	}
	palette
}

fn skip_sub_blocks<R: Read>(reader: &mut R) -> Result<(), GifError> {
	loop {
		let len = reader.read_u8()?;
		if len == 0 {
			return Ok(());
		}
		let mut buf = vec![0u8; len as usize];
		reader.read_exact(&mut buf)?;
	}
}

/// Converts a GIF delay time (hundredths of a second, little-endian on disk) to 1/60-second
/// ticks, clamped to 63. The `d % 5` rounding step is pinned exactly, not inferred:
/// 0 -> +0, 1 -> +1, 2 -> +1, 3 -> +2, 4 -> +2.
pub fn delay_to_ticks(delay_hundredths: u16) -> u8 {
	let d = delay_hundredths as u32;
	let whole = 3 * (d / 5);
	let remainder_bonus = match d % 5 {
		0 => 0,
		1 | 2 => 1,
		3 | 4 => 2,
		_ => unreachable!(),
	};
	(whole + remainder_bonus).min(63) as u8
}

struct GraphicControl {
	delay_hundredths: u16,
}

fn read_graphic_control<R: Read>(reader: &mut R) -> Result<GraphicControl, GifError> {
	let _block_size = reader.read_u8()?;
	let _flags = reader.read_u8()?;
	let delay_hundredths = reader.read_u16::<LittleEndian>()?;
	let _transparent_color = reader.read_u8()?;
	let _terminator = reader.read_u8()?;
	Ok(GraphicControl { delay_hundredths })
}

struct LocalImageDescriptor {
	left: u16,
	top: u16,
	width: u16,
	height: u16,
	flags: u8,
}

impl LocalImageDescriptor {
	fn has_local_color_table(&self) -> bool {
		self.flags & 0b1000_0000 != 0
	}
	fn is_interlaced(&self) -> bool {
		self.flags & 0b0100_0000 != 0
	}
	fn local_color_table_bits(&self) -> u32 {
		(self.flags & 0b0000_0111) as u32
	}
}

fn read_image_descriptor<R: Read>(reader: &mut R) -> Result<LocalImageDescriptor, GifError> {
	let left = reader.read_u16::<LittleEndian>()?;
	let top = reader.read_u16::<LittleEndian>()?;
	let width = reader.read_u16::<LittleEndian>()?;
	let height = reader.read_u16::<LittleEndian>()?;
	let flags = reader.read_u8()?;
	Ok(LocalImageDescriptor { left, top, width, height, flags })
}

fn num_colors_for_bits(bits: u32) -> usize {
	1usize << (bits + 1)
}

/// Parses a GIF89a byte stream into a sequence of raster frames sharing one latched palette.
pub fn decode<R: Read>(reader: &mut R) -> Result<DecodedGif, GifError> {
	let mut signature = [0u8; 6];
	reader.read_exact(&mut signature)?;
	if &signature != GIF_SIGNATURE {
		return Err(GifError::BadSignature);
	}

	let canvas_width = reader.read_u16::<LittleEndian>()?;
	let canvas_height = reader.read_u16::<LittleEndian>()?;
	validate_canvas_dimensions(canvas_width, canvas_height)?;

	let screen_flags = reader.read_u8()?;
	let _background_color = reader.read_u8()?;
	let _pixel_aspect_ratio = reader.read_u8()?;

	let has_global_table = screen_flags & 0b1000_0000 != 0;
	let global_table_bits = (screen_flags & 0b0000_0111) as u32;

	let mut latched_palette: Option<Palette> = None;
	if has_global_table {
		let colors = read_color_table(reader, num_colors_for_bits(global_table_bits))?;
		latched_palette = Some(latch_palette(&colors));
	}

	let mut frames: Vec<Frame> = Vec::new();
	let mut anim_ticks: Option<u8> = None;
	let mut pending_graphic_control: Option<GraphicControl> = None;

	loop {
		let marker = reader.read_u8()?;
		match marker {
			MARKER_TRAILER => break,
			MARKER_IMAGE_DESCRIPTOR => {
				let descriptor = read_image_descriptor(reader)?;
				if descriptor.is_interlaced() {
					return Err(GifError::Interlaced);
				}
				if descriptor.left as u32 + descriptor.width as u32 > canvas_width as u32
					|| descriptor.top as u32 + descriptor.height as u32 > canvas_height as u32
				{
					return Err(GifError::SubImageOutOfBounds(
						descriptor.left,
						descriptor.top,
						descriptor.width,
						descriptor.height,
						canvas_width,
						canvas_height,
					));
				}

				if descriptor.has_local_color_table() {
					let colors = read_color_table(reader, num_colors_for_bits(descriptor.local_color_table_bits()))?;
					if latched_palette.is_none() {
						latched_palette = Some(latch_palette(&colors));
					}
				}

				if let Some(gc) = pending_graphic_control.take() {
					if anim_ticks.is_none() {
						anim_ticks = Some(delay_to_ticks(gc.delay_hundredths));
					}
				}

				let decoded_indices = lzw_decode(reader)?;

				// disposal=previous: the first frame starts from a blank canvas, every
				// subsequent frame starts from the previous composited canvas.
				let mut canvas = match frames.last() {
					Some(previous) => previous.clone(),
					None => Frame::blank(canvas_width, canvas_height),
				};
				composite_onto_canvas(
					&mut canvas,
					&decoded_indices,
					descriptor.left,
					descriptor.top,
					descriptor.width,
					descriptor.height,
				)?;

				frames.push(canvas);
				if frames.len() > MAX_RAW_FRAMES {
					break;
				}
			}
			MARKER_EXTENSION => {
				let label = reader.read_u8()?;
				match label {
					LABEL_GRAPHIC_CONTROL => {
						pending_graphic_control = Some(read_graphic_control(reader)?);
					}
					LABEL_APPLICATION => {
						let _block_size = reader.read_u8()?;
						let mut identifier = [0u8; 8];
						reader.read_exact(&mut identifier)?;
						let mut auth_code = [0u8; 3];
						reader.read_exact(&mut auth_code)?;
						skip_sub_blocks(reader)?;
					}
					LABEL_COMMENT => {
						skip_sub_blocks(reader)?;
					}
					LABEL_PLAIN_TEXT => {
						let mut header = [0u8; 13];
						reader.read_exact(&mut header)?;
						skip_sub_blocks(reader)?;
					}
					other => return Err(GifError::UnknownExtensionLabel(other)),
				}
			}
			other => return Err(GifError::UnknownBlockMarker(other)),
		}
	}

	if frames.is_empty() {
		return Err(GifError::NoImageData);
	}
	let palette = latched_palette.ok_or(GifError::NoColorTable)?;

	let (frames, ping_pong) = reduce_ping_pong(frames);

	Ok(DecodedGif { palette, frames, ping_pong, anim_ticks: anim_ticks.unwrap_or(0) })
}

/// Writes `sub_image` (row-major, `sub_width * sub_height` palette-index bytes) onto `canvas` at
/// `(left, top)`, matching gif.c's `pixel_offset = sub_left + sub_top*image_w + (k%sub_w) +
/// (k/sub_w)*image_w`. Callers must have already checked the sub-image fits within the canvas
/// (`decode`'s `SubImageOutOfBounds` check).
fn composite_onto_canvas(
	canvas: &mut Frame,
	sub_image: &[u8],
	left: u16,
	top: u16,
	sub_width: u16,
	sub_height: u16,
) -> Result<(), GifError> {
	let sub_width = sub_width as usize;
	let sub_height = sub_height as usize;
	if sub_image.len() < sub_width * sub_height {
		return Err(GifError::TruncatedImageData(sub_image.len(), sub_width as u16, sub_height as u16));
	}

	let canvas_width = canvas.width as usize;
	let left = left as usize;
	let top = top as usize;

	for row in 0..sub_height {
		let src_start = row * sub_width;
		let dst_start = (top + row) * canvas_width + left;
		canvas.pixels[dst_start..dst_start + sub_width].copy_from_slice(&sub_image[src_start..src_start + sub_width]);
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn delay_rounding_table_is_pinned() {
		assert_eq!(delay_to_ticks(0), 0);
		assert_eq!(delay_to_ticks(1), 1); // 3*(0) + 1
		assert_eq!(delay_to_ticks(2), 1);
		assert_eq!(delay_to_ticks(3), 2);
		assert_eq!(delay_to_ticks(4), 2);
		assert_eq!(delay_to_ticks(5), 3); // 3*(1) + 0
		assert_eq!(delay_to_ticks(6), 4);
		assert_eq!(delay_to_ticks(10), 6);
	}

	#[test]
	fn delay_clamps_to_63_ticks() {
		assert_eq!(delay_to_ticks(1000), 63);
	}

	#[test]
	fn rejects_non_multiple_of_8_canvas() {
		assert!(validate_canvas_dimensions(10, 8).is_err());
		assert!(validate_canvas_dimensions(8, 10).is_err());
	}

	#[test]
	fn rejects_canvas_larger_than_128() {
		assert!(validate_canvas_dimensions(136, 8).is_err());
	}

	#[test]
	fn accepts_boundary_canvas_sizes() {
		assert!(validate_canvas_dimensions(8, 8).is_ok());
		assert!(validate_canvas_dimensions(128, 128).is_ok());
	}

	#[test]
	fn latches_only_first_16_colors() {
		let colors: Vec<Color> = (0..256u32).map(|i| Color::from_rgb8(i as u8, 0, 0)).collect();
		let palette = latch_palette(&colors);
		assert_eq!(palette.len(), 16);
		assert_eq!(palette[0], Color::from_rgb8(0, 0, 0));
		assert_eq!(palette[15], Color::from_rgb8(15, 0, 0));
	}

	#[test]
	fn composites_a_sub_image_at_a_nonzero_offset() {
		let mut canvas = Frame::blank(16, 16);
		let sub_image = vec![7u8; 8 * 8];
		composite_onto_canvas(&mut canvas, &sub_image, 8, 8, 8, 8).unwrap();

		// only the bottom-right 8x8 quadrant should be touched
		for y in 0..16usize {
			for x in 0..16usize {
				let expected = if x >= 8 && y >= 8 { 7 } else { 0 };
				assert_eq!(canvas.pixels[y * 16 + x], expected, "mismatch at ({x},{y})");
			}
		}
	}

	#[test]
	fn rejects_a_sub_image_whose_offset_data_is_too_short() {
		let mut canvas = Frame::blank(16, 16);
		let short = vec![1u8; 8 * 8 - 1];
		let result = composite_onto_canvas(&mut canvas, &short, 0, 0, 8, 8);
		assert!(matches!(result, Err(GifError::TruncatedImageData(_, 8, 8))));
	}

	#[test]
	fn decode_honors_a_nonzero_image_descriptor_offset() {
		use std::io::Cursor;

		use crate::util::lzw::lzw_encode;

		let mut bytes = Vec::new();
		bytes.extend_from_slice(b"GIF89a");
		bytes.extend_from_slice(&16u16.to_le_bytes());
		bytes.extend_from_slice(&16u16.to_le_bytes());
		bytes.push(0b1111_0011); // global table, 16 colors
		bytes.push(0);
		bytes.push(0);
		for i in 0..16u8 {
			bytes.extend_from_slice(&[i, i, i]);
		}

		bytes.push(0x2C); // image descriptor
		bytes.extend_from_slice(&8u16.to_le_bytes()); // left
		bytes.extend_from_slice(&8u16.to_le_bytes()); // top
		bytes.extend_from_slice(&8u16.to_le_bytes()); // width
		bytes.extend_from_slice(&8u16.to_le_bytes()); // height
		bytes.push(0x00); // no local table, not interlaced

		let pixels = vec![3u8; 8 * 8];
		lzw_encode(&pixels, 4, &mut bytes).unwrap();

		bytes.push(0x3B); // trailer

		let decoded = decode(&mut Cursor::new(bytes)).unwrap();
		assert_eq!(decoded.frames.len(), 1);
		let frame = &decoded.frames[0];
		for y in 0..16usize {
			for x in 0..16usize {
				let expected = if x >= 8 && y >= 8 { 3 } else { 0 };
				assert_eq!(frame.pixels[y * 16 + x], expected, "mismatch at ({x},{y})");
			}
		}
	}

	#[test]
	fn decode_rejects_a_sub_image_that_overflows_the_canvas() {
		use std::io::Cursor;

		use crate::util::lzw::lzw_encode;

		let mut bytes = Vec::new();
		bytes.extend_from_slice(b"GIF89a");
		bytes.extend_from_slice(&8u16.to_le_bytes());
		bytes.extend_from_slice(&8u16.to_le_bytes());
		bytes.push(0b1111_0011);
		bytes.push(0);
		bytes.push(0);
		for i in 0..16u8 {
			bytes.extend_from_slice(&[i, i, i]);
		}

		bytes.push(0x2C);
		bytes.extend_from_slice(&4u16.to_le_bytes()); // left
		bytes.extend_from_slice(&0u16.to_le_bytes()); // top
		bytes.extend_from_slice(&8u16.to_le_bytes()); // width — 4 + 8 > canvas width 8
		bytes.extend_from_slice(&8u16.to_le_bytes());
		bytes.push(0x00);

		let pixels = vec![1u8; 8 * 8];
		lzw_encode(&pixels, 4, &mut bytes).unwrap();
		bytes.push(0x3B);

		let result = decode(&mut Cursor::new(bytes));
		assert!(matches!(result, Err(GifError::SubImageOutOfBounds(4, 0, 8, 8, 8, 8))));
	}
}
