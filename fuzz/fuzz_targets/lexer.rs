#![no_main]
use libfuzzer_sys::fuzz_target;
use pdfmince_lex::{ItemKind, Lexer};

// Checks the reassembly invariant: concatenating every token value must
// reproduce the input byte for byte. An error item aborts the scan, so
// the check only applies to cleanly lexed inputs.
fuzz_target!(|data: &[u8]| {
    let mut lexer = Lexer::new("fuzz", data);
    let mut rebuilt = Vec::with_capacity(data.len());
    loop {
        let item = lexer.next_item();
        match item.kind {
            ItemKind::Eof => {
                assert_eq!(rebuilt, data);
                break;
            }
            ItemKind::Error => break,
            _ => rebuilt.extend_from_slice(&item.val),
        }
    }
});
