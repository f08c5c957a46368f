//! GIF-variant LZW (Lempel-Ziv-Welch) decompression, plus an encoder kept only to drive the
//! round-trip tests below (the packer never writes GIF files back out).
//!
//! GIF's LZW stream is split into sub-blocks of at most 255 bytes, each prefixed by its own
//! length byte and the whole chain terminated by a zero-length block. Codes are packed LSB-first
//! and grow from `root_bits + 1` bits up to 12 bits as the dictionary fills. A clear code resets
//! the dictionary and code width; an end-of-information code ends the stream.

use std::io;

use byteorder::{ReadBytesExt, WriteBytesExt};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LzwError {
	#[error("root code size {0} is unsupported, must be 2..=8")]
	UnsupportedRootBits(usize),

	#[error("LZW code {0} exceeds the maximum 12-bit code value")]
	CodeTooLarge(u16),

	#[error("no dictionary entry for code {0}")]
	UnknownCode(u16),

	#[error("LZW stream did not begin with a clear code")]
	MissingInitialClearCode,

	#[error("LZW stream ended before an end-of-information code was read")]
	UnexpectedEndOfStream,

	#[error("LZW I/O error")]
	Io(#[from] io::Error),
}

type Code = u16;

const MIN_ROOT_BITS: usize = 2;
const MAX_ROOT_BITS: usize = 8;
const MAX_CODE_BITS: usize = 12;
const MAX_CODE_VALUE: Code = (1 << MAX_CODE_BITS) - 1;

fn is_valid_root_bits(bits: usize) -> bool {
	(MIN_ROOT_BITS..=MAX_ROOT_BITS).contains(&bits)
}

fn max_code_for_bits(bits: usize) -> Code {
	((1u32 << bits) - 1) as Code
}

/// Packs/unpacks LSB-first variable-width codes into/out of a 32-bit bit buffer.
#[derive(Debug)]
struct BitBuffer {
	bits: u32,
	len: usize,
	code_bits: usize,
	root_bits: usize,
}

impl BitBuffer {
	fn new(root_bits: usize) -> Self {
		BitBuffer { bits: 0, len: 0, code_bits: root_bits + 1, root_bits }
	}

	fn reset_code_bits(&mut self) {
		self.code_bits = self.root_bits + 1;
	}

	fn increase_code_bits(&mut self) {
		if self.code_bits < MAX_CODE_BITS {
			self.code_bits += 1;
		}
	}

	fn push_byte(&mut self, byte: u8) {
		self.bits |= (byte as u32) << self.len;
		self.len += 8;
	}

	fn take_code(&mut self) -> Option<Code> {
		if self.len >= self.code_bits {
			let mask = (1u32 << self.code_bits) - 1;
			let code = (self.bits & mask) as Code;
			self.bits >>= self.code_bits;
			self.len -= self.code_bits;
			Some(code)
		} else {
			None
		}
	}

	fn push_code(&mut self, code: Code) {
		self.bits |= (code as u32) << self.len;
		self.len += self.code_bits;
	}

	fn take_byte(&mut self) -> Option<u8> {
		if self.len >= 8 {
			let byte = (self.bits & 0xFF) as u8;
			self.bits >>= 8;
			self.len -= 8;
			Some(byte)
		} else {
			None
		}
	}

	fn flush_byte(&mut self) -> Option<u8> {
		if self.len > 0 {
			let byte = (self.bits & 0xFF) as u8;
			self.bits >>= 8;
			self.len = self.len.saturating_sub(8);
			Some(byte)
		} else {
			None
		}
	}
}

/// Reads LZW codes from a chain of GIF sub-blocks.
struct SubBlockCodeReader {
	buffer: BitBuffer,
	remaining_in_block: u8,
	reached_end: bool,
}

impl SubBlockCodeReader {
	fn new(root_bits: usize) -> Self {
		SubBlockCodeReader { buffer: BitBuffer::new(root_bits), remaining_in_block: 0, reached_end: false }
	}

	fn reset_code_bits(&mut self) {
		self.buffer.reset_code_bits();
	}

	fn increase_code_bits(&mut self) {
		self.buffer.increase_code_bits();
	}

	fn read_byte<R: ReadBytesExt>(&mut self, reader: &mut R) -> Result<Option<u8>, LzwError> {
		if self.reached_end {
			return Ok(None);
		}
		if self.remaining_in_block == 0 {
			self.remaining_in_block = reader.read_u8()?;
			if self.remaining_in_block == 0 {
				self.reached_end = true;
				return Ok(None);
			}
		}
		self.remaining_in_block -= 1;
		Ok(Some(reader.read_u8()?))
	}

	fn read_code<R: ReadBytesExt>(&mut self, reader: &mut R) -> Result<Option<Code>, LzwError> {
		loop {
			if let Some(code) = self.buffer.take_code() {
				return Ok(Some(code));
			}
			match self.read_byte(reader) {
				Ok(Some(byte)) => self.buffer.push_byte(byte),
				Ok(None) => return Ok(None),
				Err(LzwError::Io(error)) if error.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
				Err(error) => return Err(error),
			}
		}
	}
}

/// Decodes one LZW image-data block (the `minimum_code_size` byte followed by its chain of
/// sub-blocks) into raw palette-index bytes.
///
/// The first code in the stream must be a clear code; the code that immediately follows it is
/// always a root literal, emitted verbatim with no dictionary entry created for it — this is the
/// pathological "first code after clear" case flagged as ambiguous in the source project, pinned
/// here to exactly that behavior.
pub fn lzw_decode<R: ReadBytesExt>(reader: &mut R) -> Result<Vec<u8>, LzwError> {
	let root_bits = reader.read_u8()? as usize;
	if !is_valid_root_bits(root_bits) {
		return Err(LzwError::UnsupportedRootBits(root_bits));
	}

	let root_table_size = 1usize << root_bits;
	let clear_code = root_table_size as Code;
	let end_of_info_code = root_table_size as Code + 1;

	let mut code_reader = SubBlockCodeReader::new(root_bits + 1);
	code_reader.reset_code_bits();

	let first = code_reader.read_code(reader)?.ok_or(LzwError::UnexpectedEndOfStream)?;
	if first != clear_code {
		return Err(LzwError::MissingInitialClearCode);
	}

	let mut output = Vec::new();

	'outer: loop {
		let mut table: Vec<Option<Vec<u8>>> = vec![None; 1usize << MAX_CODE_BITS];
		for (value, slot) in table.iter_mut().enumerate().take(root_table_size) {
			*slot = Some(vec![value as u8]);
		}
		let mut code_bits = root_bits + 1;
		let mut max_code_for_width = max_code_for_bits(code_bits);
		let mut next_code = root_table_size as Code + 2;

		let code = match code_reader.read_code(reader)? {
			Some(code) if code > MAX_CODE_VALUE => return Err(LzwError::CodeTooLarge(code)),
			Some(code) if code == end_of_info_code => return Ok(output),
			Some(code) => code,
			None => return Err(LzwError::UnexpectedEndOfStream),
		};

		let string = table[code as usize].as_ref().ok_or(LzwError::UnknownCode(code))?;
		output.extend_from_slice(string);
		let mut prev_code = code;

		loop {
			let code = match code_reader.read_code(reader)? {
				Some(code) if code > MAX_CODE_VALUE => return Err(LzwError::CodeTooLarge(code)),
				Some(code) if code == end_of_info_code => break 'outer,
				Some(code) if code == clear_code => {
					code_bits = root_bits + 1;
					code_reader.reset_code_bits();
					continue 'outer;
				}
				Some(code) => code,
				None => return Err(LzwError::UnexpectedEndOfStream),
			};

			let prev_string = table[prev_code as usize].as_ref().ok_or(LzwError::UnknownCode(prev_code))?;

			if let Some(string) = table[code as usize].clone() {
				output.extend_from_slice(&string);
				if next_code <= MAX_CODE_VALUE {
					let mut new_string = prev_string.clone();
					new_string.push(string[0]);
					table[next_code as usize] = Some(new_string);
					let new_code = next_code;
					next_code += 1;
					if new_code == max_code_for_width && code_bits < MAX_CODE_BITS {
						code_bits += 1;
						max_code_for_width = max_code_for_bits(code_bits);
						code_reader.increase_code_bits();
					}
				} else {
					// dictionary filled to the 4096-entry cap without an explicit clear code.
					// well-formed encoders always clear before this happens; a malformed stream
					// must not panic here. code_bits is already at its 12-bit ceiling by the time
					// the dictionary is full, so freezing the table (no further additions) keeps
					// the bit reader in sync without needing to touch it.
				}
			} else {
				// the "KwKwK" case: the code isn't in the table yet, so it must be exactly
				// the previous string plus its own first character. This can only happen when
				// `code == next_code`, which is itself bounded by MAX_CODE_VALUE, so the table
				// write below is always in range.
				let mut new_string = prev_string.clone();
				new_string.push(prev_string[0]);
				output.extend_from_slice(&new_string);
				table[next_code as usize] = Some(new_string);
				let new_code = next_code;
				next_code += 1;
				if new_code == max_code_for_width && code_bits < MAX_CODE_BITS {
					code_bits += 1;
					max_code_for_width = max_code_for_bits(code_bits);
					code_reader.increase_code_bits();
				}
			}

			prev_code = code;
		}
	}

	Ok(output)
}

/// Writer side of a sub-block chain, used only by the encoder below.
struct SubBlockCodeWriter {
	buffer: BitBuffer,
	pending: Vec<u8>,
}

const MAX_SUB_BLOCK_SIZE: usize = 255;

impl SubBlockCodeWriter {
	fn new(root_bits: usize) -> Self {
		SubBlockCodeWriter { buffer: BitBuffer::new(root_bits), pending: Vec::with_capacity(MAX_SUB_BLOCK_SIZE) }
	}

	fn reset_code_bits(&mut self) {
		self.buffer.reset_code_bits();
	}

	fn increase_code_bits(&mut self) {
		self.buffer.increase_code_bits();
	}

	fn flush_pending<W: WriteBytesExt>(&mut self, writer: &mut W) -> io::Result<()> {
		if !self.pending.is_empty() {
			writer.write_u8(self.pending.len() as u8)?;
			writer.write_all(&self.pending)?;
			self.pending.clear();
		}
		Ok(())
	}

	fn write_code<W: WriteBytesExt>(&mut self, writer: &mut W, code: Code) -> io::Result<()> {
		self.buffer.push_code(code);
		while let Some(byte) = self.buffer.take_byte() {
			self.pending.push(byte);
			if self.pending.len() == MAX_SUB_BLOCK_SIZE {
				self.flush_pending(writer)?;
			}
		}
		Ok(())
	}

	fn finish<W: WriteBytesExt>(&mut self, writer: &mut W) -> io::Result<()> {
		while let Some(byte) = self.buffer.flush_byte() {
			self.pending.push(byte);
			if self.pending.len() == MAX_SUB_BLOCK_SIZE {
				self.flush_pending(writer)?;
			}
		}
		self.flush_pending(writer)?;
		writer.write_u8(0) // sub-block chain terminator
	}
}

/// Encodes `data` as an LZW image-data block. Exists purely so tests can round-trip arbitrary
/// byte sequences through `lzw_decode` without needing real GIF fixtures for every case.
pub fn lzw_encode<W: WriteBytesExt>(data: &[u8], root_bits: usize, writer: &mut W) -> Result<(), LzwError> {
	use std::collections::HashMap;

	if !is_valid_root_bits(root_bits) {
		return Err(LzwError::UnsupportedRootBits(root_bits));
	}

	let root_table_size = 1usize << root_bits;
	let clear_code = root_table_size as Code;
	let end_of_info_code = root_table_size as Code + 1;

	writer.write_u8(root_bits as u8)?;

	let mut code_writer = SubBlockCodeWriter::new(root_bits + 1);
	code_writer.reset_code_bits();
	code_writer.write_code(writer, clear_code)?;

	let mut table: HashMap<Vec<u8>, Code> =
		(0..root_table_size).map(|value| (vec![value as u8], value as Code)).collect();
	let mut code_bits = root_bits + 1;
	let mut max_code_for_width = max_code_for_bits(code_bits);
	let mut next_code = root_table_size as Code + 2;

	let mut iter = data.iter().copied();
	let mut buffer = match iter.next() {
		Some(byte) => vec![byte],
		None => {
			code_writer.write_code(writer, end_of_info_code)?;
			code_writer.finish(writer)?;
			return Ok(());
		}
	};

	for byte in iter {
		let mut candidate = buffer.clone();
		candidate.push(byte);

		if table.contains_key(&candidate) {
			buffer = candidate;
			continue;
		}

		let code = *table.get(&buffer).ok_or(LzwError::UnknownCode(0))?;
		code_writer.write_code(writer, code)?;

		let new_code = next_code;
		next_code += 1;
		table.insert(candidate, new_code);

		if new_code > max_code_for_width && code_bits < MAX_CODE_BITS {
			code_bits += 1;
			max_code_for_width = max_code_for_bits(code_bits);
			code_writer.increase_code_bits();
		}

		if new_code == MAX_CODE_VALUE {
			table = (0..root_table_size).map(|value| (vec![value as u8], value as Code)).collect();
			code_bits = root_bits + 1;
			max_code_for_width = max_code_for_bits(code_bits);
			next_code = root_table_size as Code + 2;
			code_writer.write_code(writer, clear_code)?;
			code_writer.reset_code_bits();
		}

		buffer = vec![byte];
	}

	let code = *table.get(&buffer).ok_or(LzwError::UnknownCode(0))?;
	code_writer.write_code(writer, code)?;
	code_writer.write_code(writer, end_of_info_code)?;
	code_writer.finish(writer)?;

	Ok(())
}

#[cfg(test)]
mod tests {
	use std::io::Cursor;

	use super::*;

	/// Encodes like [`lzw_encode`] but never emits a clear code when the dictionary fills,
	/// letting `next_code` run past the 4096-entry cap at the decoder. Exists only to exercise
	/// the "dictionary overflow without a clear code" recovery path.
	fn encode_without_overflow_clear<W: WriteBytesExt>(data: &[u8], root_bits: usize, writer: &mut W) {
		use std::collections::HashMap;

		let root_table_size = 1usize << root_bits;
		let clear_code = root_table_size as Code;
		let end_of_info_code = root_table_size as Code + 1;

		writer.write_u8(root_bits as u8).unwrap();

		let mut code_writer = SubBlockCodeWriter::new(root_bits + 1);
		code_writer.reset_code_bits();
		code_writer.write_code(writer, clear_code).unwrap();

		let mut table: HashMap<Vec<u8>, Code> =
			(0..root_table_size).map(|value| (vec![value as u8], value as Code)).collect();
		let mut code_bits = root_bits + 1;
		let mut max_code_for_width = max_code_for_bits(code_bits);
		let mut next_code = root_table_size as Code + 2;

		let mut iter = data.iter().copied();
		let mut buffer = vec![iter.next().unwrap()];

		for byte in iter {
			let mut candidate = buffer.clone();
			candidate.push(byte);

			if table.contains_key(&candidate) {
				buffer = candidate;
				continue;
			}

			let code = *table.get(&buffer).unwrap();
			code_writer.write_code(writer, code).unwrap();

			// unlike lzw_encode, keep adding entries (and widening the code) past the point a
			// well-behaved encoder would clear, up to the hard 12-bit code ceiling.
			if next_code <= MAX_CODE_VALUE {
				table.insert(candidate, next_code);
				next_code += 1;
				if next_code - 1 == max_code_for_width && code_bits < MAX_CODE_BITS {
					code_bits += 1;
					max_code_for_width = max_code_for_bits(code_bits);
					code_writer.increase_code_bits();
				}
			}

			buffer = vec![byte];
		}

		let code = *table.get(&buffer).unwrap();
		code_writer.write_code(writer, code).unwrap();
		code_writer.write_code(writer, end_of_info_code).unwrap();
		code_writer.finish(writer).unwrap();
	}

	#[test]
	fn dictionary_overflow_without_a_clear_code_resets_silently_instead_of_panicking() {
		// enough distinct two-byte novelties to blow past the 4096-entry table with root_bits=2
		// (a 4-symbol alphabet), forcing next_code past MAX_CODE_VALUE with no clear code seen.
		let mut original = Vec::new();
		for i in 0..20000u32 {
			original.push((i % 4) as u8);
			original.push(((i / 4) % 4) as u8);
			original.push(((i * 3) % 4) as u8);
		}

		let mut encoded = Vec::new();
		encode_without_overflow_clear(&original, 2, &mut encoded);

		// both sides freeze their dictionary at the same 4096-entry ceiling, so this must not
		// just avoid panicking — it round-trips exactly, same as a stream that does clear.
		let decoded = lzw_decode(&mut Cursor::new(encoded)).unwrap();
		assert_eq!(decoded, original);
	}

	#[test]
	fn round_trips_short_literal_runs() {
		let original: Vec<u8> = vec![1, 1, 1, 1, 1, 2, 2, 2, 2, 2, 0, 0, 3, 3, 3, 3];
		for root_bits in [2, 4, 8] {
			let mut encoded = Vec::new();
			lzw_encode(&original, root_bits, &mut encoded).unwrap();
			let decoded = lzw_decode(&mut Cursor::new(encoded)).unwrap();
			assert_eq!(decoded, original);
		}
	}

	#[test]
	fn round_trips_data_long_enough_to_force_a_table_reset() {
		let mut original = Vec::new();
		for i in 0..6000u32 {
			original.push((i % 7) as u8);
		}
		let mut encoded = Vec::new();
		lzw_encode(&original, 8, &mut encoded).unwrap();
		let decoded = lzw_decode(&mut Cursor::new(encoded)).unwrap();
		assert_eq!(decoded, original);
	}

	#[test]
	fn round_trips_single_byte_input() {
		let original = vec![42u8];
		let mut encoded = Vec::new();
		lzw_encode(&original, 2, &mut encoded).unwrap();
		let decoded = lzw_decode(&mut Cursor::new(encoded)).unwrap();
		assert_eq!(decoded, original);
	}

	#[test]
	fn rejects_stream_without_leading_clear_code() {
		// root_bits=2, then a bogus first code (3, a root literal) instead of the clear code (4)
		let bytes = [0x02u8, 0x01, 0b0000_0011, 0x00];
		let result = lzw_decode(&mut Cursor::new(bytes));
		assert!(matches!(result, Err(LzwError::MissingInitialClearCode)));
	}

	#[test]
	fn rejects_unsupported_root_bits() {
		assert!(matches!(lzw_encode(&[1, 2, 3], 1, &mut Vec::new()), Err(LzwError::UnsupportedRootBits(1))));
		assert!(matches!(lzw_encode(&[1, 2, 3], 9, &mut Vec::new()), Err(LzwError::UnsupportedRootBits(9))));
	}
}
