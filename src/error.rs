//! The single error type the orchestrator and CLI deal in, unifying every subsystem's own error
//! enum behind one early-exit path.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::gif::GifError;
use crate::rom::RomError;
use crate::sprite::SpriteError;
use crate::walk::WalkError;

#[derive(Error, Debug)]
pub enum AppError {
	#[error("failed to read manifest {0:?}: {1}")]
	ManifestIo(PathBuf, #[source] std::io::Error),

	#[error("manifest syntax error: {0}")]
	Config(#[from] ConfigError),

	#[error("could not locate asset: {0}")]
	Asset(#[from] WalkError),

	#[error("failed to decode GIF: {0}")]
	Gif(#[from] GifError),

	#[error("failed to pack sprite: {0}")]
	Sprite(#[from] SpriteError),

	#[error("ROM container error: {0}")]
	Rom(#[from] RomError),

	#[error("spriteset {0:?} has no sprites; an empty spriteset would require writing a zero-size chunk")]
	EmptySpriteset(String),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}
