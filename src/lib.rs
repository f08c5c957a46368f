//! Compiles a directory of GIF source art and a text manifest into a single binary ROM for a
//! retro-style runtime: 16-color palettes, 8x8 indexed cells, and sprite descriptor records
//! addressed through a flat chunk table.

pub mod config;
pub mod error;
pub mod gif;
pub mod rom;
pub mod session;
pub mod sprite;
pub mod util;
pub mod walk;

pub use error::AppError;
pub use session::{compile_manifest, Packer};
