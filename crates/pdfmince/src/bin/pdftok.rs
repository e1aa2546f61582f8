use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Result};
use clap::Parser;
use memmap2::Mmap;
use pdfmince_lex::{ItemKind, Lexer};

const MAX_PDF_BYTES: u64 = 500 * 1024 * 1024;

#[derive(Parser)]
#[command(name = "pdftok", about = "Tokenize PDF files and dump the item stream")]
struct Args {
    /// Emit one JSON record per token instead of the tab-separated dump.
    #[arg(long)]
    json: bool,
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();
    let mut failed = false;
    for path in &args.files {
        if let Err(err) = dump_file(path, args.json) {
            eprintln!("{}: {}", path.display(), err);
            failed = true;
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

fn dump_file(path: &Path, json: bool) -> Result<()> {
    let mmap = mmap_file(path)?;
    let name = path.display().to_string();
    let mut lexer = Lexer::new(&name, &mmap);
    loop {
        let item = lexer.next_item();
        match item.kind {
            ItemKind::Eof => return Ok(()),
            ItemKind::Error => {
                return Err(anyhow!("lex error at byte {}: {}", item.pos, item.val_lossy()))
            }
            _ => {}
        }
        if json {
            let record = serde_json::json!({
                "kind": item.kind,
                "pos": item.pos,
                "val": item.val_lossy(),
            });
            println!("{}", record);
        } else {
            println!("{}\t{}\t{:?}", item.kind as u8, item.pos, item.val_lossy());
        }
    }
}
