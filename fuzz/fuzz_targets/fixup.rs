#![no_main]
use libfuzzer_sys::fuzz_target;
use pdfmince_lex::{FixupParser, Lexer};

fuzz_target!(|data: &[u8]| {
    let parser = FixupParser::new(Lexer::new("fuzz", data));
    let _ = parser.fix_xrefs();
});
