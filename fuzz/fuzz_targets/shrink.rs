#![no_main]
use libfuzzer_sys::fuzz_target;
use pdfmince_lex::{shrink_streams, FixupParser, Lexer, ShrinkOptions};

// The whole pipeline: shrink, then fix. Decode failures fall back to raw
// truncation, so the only acceptable error is a lexing abort.
fuzz_target!(|data: &[u8]| {
    let opts = ShrinkOptions { max: 64, strict: false };
    if let Ok(shrunk) = shrink_streams("fuzz", data, &opts) {
        let _ = FixupParser::new(Lexer::new("fuzz", &shrunk)).fix_xrefs();
    }
});
