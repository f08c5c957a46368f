//! The configuration manifest tokenizer and parser: turns a plain-text manifest into an ordered
//! list of spriteset directives the orchestrator can drive, hand-written in the same
//! character-at-a-time style the source tool used rather than pulled in from a parser-combinator
//! crate.

use std::io::Read;

use thiserror::Error;

const MAX_TOKEN_LEN: usize = 256;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("unterminated quoted filename")]
	UnterminatedFilename,

	#[error("unrecognized character {0:?}")]
	UnrecognizedCharacter(char),

	#[error("filename exceeds {MAX_TOKEN_LEN} bytes")]
	FilenameTooLong,

	#[error("expected {expected}, found {found}")]
	UnexpectedToken { expected: &'static str, found: String },

	#[error("unexpected end of file while parsing a {0}")]
	UnexpectedEof(&'static str),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
	Spriteset,
	Sprite,
	Name(String),
	Integer(String),
	Filename(String),
	OpenCurlyBrace,
	CloseCurlyBrace,
	Eof,
}

impl Token {
	fn describe(&self) -> String {
		match self {
			Token::Spriteset => "`spriteset`".to_string(),
			Token::Sprite => "`sprite`".to_string(),
			Token::Name(n) => format!("identifier {n:?}"),
			Token::Integer(n) => format!("integer {n:?}"),
			Token::Filename(f) => format!("filename {f:?}"),
			Token::OpenCurlyBrace => "`{`".to_string(),
			Token::CloseCurlyBrace => "`}`".to_string(),
			Token::Eof => "end of file".to_string(),
		}
	}
}

fn is_letter(c: char) -> bool {
	c.is_ascii_alphabetic()
}

fn is_digit(c: char) -> bool {
	c.is_ascii_digit()
}

fn is_valid_in_identifier(c: char) -> bool {
	is_letter(c) || is_digit(c) || c == '_'
}

fn is_valid_in_filename(c: char) -> bool {
	is_letter(c) || is_digit(c) || c == '_' || c == '.'
}

fn is_whitespace(c: char) -> bool {
	matches!(c, ' ' | '\n' | '\r' | '\x0C' | '\t' | '\x0B')
}

struct Tokenizer<R: Read> {
	reader: R,
	peeked: Option<Option<char>>,
}

impl<R: Read> Tokenizer<R> {
	fn new(reader: R) -> Self {
		Tokenizer { reader, peeked: None }
	}

	fn next_char(&mut self) -> Result<Option<char>, ConfigError> {
		if let Some(c) = self.peeked.take() {
			return Ok(c);
		}
		let mut byte = [0u8; 1];
		match self.reader.read(&mut byte)? {
			0 => Ok(None),
			_ => Ok(Some(byte[0] as char)),
		}
	}

	/// Reads the next token, skipping any leading whitespace. Identifiers longer than
	/// [`MAX_TOKEN_LEN`] are silently truncated; the spec makes that fatal only for filenames.
	fn advance_token(&mut self) -> Result<Token, ConfigError> {
		let mut c = loop {
			match self.next_char()? {
				None => return Ok(Token::Eof),
				Some(c) if is_whitespace(c) => continue,
				Some(c) => break c,
			}
		};

		if is_letter(c) {
			let mut buf = String::new();
			loop {
				if buf.len() < MAX_TOKEN_LEN {
					buf.push(c);
				}
				match self.next_char()? {
					Some(next) if is_valid_in_identifier(next) => c = next,
					_ => break,
				}
			}
			return Ok(match buf.as_str() {
				"spriteset" => Token::Spriteset,
				"sprite" => Token::Sprite,
				_ => Token::Name(buf),
			});
		}

		if is_digit(c) {
			let mut buf = String::new();
			loop {
				if buf.len() < MAX_TOKEN_LEN {
					buf.push(c);
				}
				match self.next_char()? {
					Some(next) if is_digit(next) => c = next,
					_ => break,
				}
			}
			return Ok(Token::Integer(buf));
		}

		if c == '"' {
			let mut buf = String::new();
			loop {
				match self.next_char()? {
					None => return Err(ConfigError::UnterminatedFilename),
					Some('"') => return Ok(Token::Filename(buf)),
					Some(next) if is_valid_in_filename(next) => {
						if buf.len() >= MAX_TOKEN_LEN {
							return Err(ConfigError::FilenameTooLong);
						}
						buf.push(next);
					}
					Some(_) => return Err(ConfigError::UnterminatedFilename),
				}
			}
		}

		if c == '{' {
			return Ok(Token::OpenCurlyBrace);
		}
		if c == '}' {
			return Ok(Token::CloseCurlyBrace);
		}

		Err(ConfigError::UnrecognizedCharacter(c))
	}
}

/// One `sprite name "filename"` pair inside a spriteset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteEntry {
	pub name: String,
	pub filename: String,
}

/// One `spriteset name { ... }` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpritesetDirective {
	pub name: String,
	pub sprites: Vec<SpriteEntry>,
}

fn expect_name(token: Token) -> Result<String, ConfigError> {
	match token {
		Token::Name(n) => Ok(n),
		other => Err(ConfigError::UnexpectedToken { expected: "an identifier", found: other.describe() }),
	}
}

fn expect_filename(token: Token) -> Result<String, ConfigError> {
	match token {
		Token::Filename(f) => Ok(f),
		other => Err(ConfigError::UnexpectedToken { expected: "a quoted filename", found: other.describe() }),
	}
}

fn parse_sprite<R: Read>(tokenizer: &mut Tokenizer<R>) -> Result<SpriteEntry, ConfigError> {
	let name = expect_name(tokenizer.advance_token()?)?;
	let filename = expect_filename(tokenizer.advance_token()?)?;
	Ok(SpriteEntry { name, filename })
}

fn parse_spriteset<R: Read>(tokenizer: &mut Tokenizer<R>) -> Result<SpritesetDirective, ConfigError> {
	let name = expect_name(tokenizer.advance_token()?)?;

	match tokenizer.advance_token()? {
		Token::OpenCurlyBrace => {}
		other => return Err(ConfigError::UnexpectedToken { expected: "`{`", found: other.describe() }),
	}

	let mut sprites = Vec::new();
	let mut token = tokenizer.advance_token()?;
	while token == Token::Sprite {
		sprites.push(parse_sprite(tokenizer)?);
		token = tokenizer.advance_token()?;
	}

	match token {
		Token::CloseCurlyBrace => Ok(SpritesetDirective { name, sprites }),
		Token::Eof => Err(ConfigError::UnexpectedEof("spriteset block")),
		other => Err(ConfigError::UnexpectedToken { expected: "`sprite` or `}`", found: other.describe() }),
	}
}

/// Parses a whole manifest into its ordered list of spriteset directives.
pub fn parse<R: Read>(reader: R) -> Result<Vec<SpritesetDirective>, ConfigError> {
	let mut tokenizer = Tokenizer::new(reader);
	let mut directives = Vec::new();

	loop {
		match tokenizer.advance_token()? {
			Token::Eof => break,
			Token::Spriteset => directives.push(parse_spriteset(&mut tokenizer)?),
			other => return Err(ConfigError::UnexpectedToken { expected: "`spriteset` or end of file", found: other.describe() }),
		}
	}

	Ok(directives)
}
