use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use spritecart::{compile_manifest, AppError};

#[derive(Parser, Debug)]
#[command(name = "spritecart")]
#[command(about = "Compiles a GIF sprite manifest into a binary ROM cartridge")]
struct Args {
	/// Manifest (.con) file describing the spritesets to compile
	manifest: PathBuf,

	/// Directory to search for the GIF files the manifest names. Defaults to the manifest's
	/// own directory.
	#[arg(long, value_name = "DIR")]
	assets: Option<PathBuf>,

	/// Output ROM path
	#[arg(short, long, value_name = "FILE", default_value = "out.cart")]
	output: PathBuf,
}

fn run(args: Args) -> Result<(), AppError> {
	let asset_root = args.assets.unwrap_or_else(|| {
		args.manifest.parent().map(|p| p.to_path_buf()).unwrap_or_else(|| PathBuf::from("."))
	});

	info!("compiling {:?} (assets under {:?})", args.manifest, asset_root);
	let rom = compile_manifest(&args.manifest, &asset_root)?;

	info!("writing {} chunks, {} bytes to {:?}", rom.chunk_count(), rom.rom_size(), args.output);
	rom.save(&args.output)?;

	Ok(())
}

fn main() -> ExitCode {
	env_logger::init();
	let args = Args::parse();

	match run(args) {
		Ok(()) => ExitCode::SUCCESS,
		Err(error) => {
			error!("compilation failed: {error}");
			ExitCode::FAILURE
		}
	}
}
