use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Result};
use clap::Parser;
use memmap2::Mmap;
use pdfmince_lex::{shrink_streams, FixupParser, Lexer, ShrinkOptions};
use tracing::debug;

const MAX_PDF_BYTES: u64 = 500 * 1024 * 1024;

#[derive(Parser)]
#[command(
    name = "pdfshrink",
    about = "Truncate oversized stream bodies and fix up xref offsets"
)]
struct Args {
    /// Abort a file when a stream body fails to decode.
    #[arg(long)]
    strict: bool,
    /// Maximum decoded stream body length in bytes.
    #[arg(long, default_value_t = 128)]
    max: usize,
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();
    let opts = ShrinkOptions { max: args.max, strict: args.strict };
    let mut failed = false;
    for path in &args.files {
        match shrink_file(path, &opts) {
            Ok(out) => println!("{} -> {}", path.display(), out.display()),
            Err(err) => {
                eprintln!("{}: {}", path.display(), err);
                failed = true;
            }
        }
    }
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn mmap_file(path: &Path) -> Result<Mmap> {
    let f = fs::File::open(path)?;
    let size = f.metadata()?.len();
    if size > MAX_PDF_BYTES {
        return Err(anyhow!("file exceeds max size: {} bytes", size));
    }
    unsafe { Mmap::map(&f).map_err(|e| anyhow!(e)) }
}

fn shrink_file(path: &Path, opts: &ShrinkOptions) -> Result<PathBuf> {
    let mmap = mmap_file(path)?;
    let name = path.display().to_string();
    let shrunk = shrink_streams(&name, &mmap, opts)?;
    debug!(
        input = %name,
        in_bytes = mmap.len(),
        out_bytes = shrunk.len(),
        "Shrunk stream bodies"
    );
    let fixed = FixupParser::new(Lexer::new(&name, &shrunk)).fix_xrefs();
    let out_path = small_name(path);
    write_private(&out_path, &fixed)?;
    Ok(out_path)
}

// foo.pdf -> foo-small.pdf
fn small_name(path: &Path) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("out");
    match path.extension().and_then(|s| s.to_str()) {
        Some(ext) => path.with_file_name(format!("{}-small.{}", stem, ext)),
        None => path.with_file_name(format!("{}-small", stem)),
    }
}

fn write_private(path: &Path, data: &[u8]) -> Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let mut f = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    f.write_all(data)?;
    Ok(())
}
