//! Small big-endian helpers that `byteorder` doesn't provide natively (24-bit words).
//!
//! Everything else in the ROM container's wire format (u16 chunk count, u16 cell/sprite
//! words) goes through `byteorder::BigEndian` directly.

use std::io;

use byteorder::{ReadBytesExt, WriteBytesExt};

/// Reads a 24-bit big-endian unsigned integer, returned widened to `u32`.
pub fn read_u24_be<R: ReadBytesExt>(reader: &mut R) -> io::Result<u32> {
	let hi = reader.read_u8()? as u32;
	let mid = reader.read_u8()? as u32;
	let lo = reader.read_u8()? as u32;
	Ok((hi << 16) | (mid << 8) | lo)
}

/// Writes the low 24 bits of `value` as a big-endian triple. The top byte of `value` is
/// discarded; callers are expected to have already validated the value fits (see
/// `RomContainer`'s 4 MiB size invariant).
pub fn write_u24_be<W: WriteBytesExt>(writer: &mut W, value: u32) -> io::Result<()> {
	writer.write_u8(((value >> 16) & 0xFF) as u8)?;
	writer.write_u8(((value >> 8) & 0xFF) as u8)?;
	writer.write_u8((value & 0xFF) as u8)?;
	Ok(())
}
