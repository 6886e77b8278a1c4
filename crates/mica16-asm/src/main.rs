use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Two-pass assembler for the Mica-16 ISA")]
struct Opts {
    /// Input assembly source
    #[arg(short, long)]
    input: PathBuf,
    /// Output binary image
    #[arg(short, long)]
    output: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();
    let source = std::fs::read_to_string(&opts.input)
        .with_context(|| format!("reading {}", opts.input.display()))?;
    let image = mica16_asm::assemble(&source)?;
    std::fs::write(&opts.output, &image)
        .with_context(|| format!("writing {}", opts.output.display()))?;
    Ok(())
}
