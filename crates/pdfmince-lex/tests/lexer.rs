use pdfmince_lex::{Item, ItemKind, Lexer};

const DEMO_PDF: &str = r"%PDF-1.1
%¥±ë

1 0 obj
  << /Type /Catalog
     /Pages 2 0 R
  >>
endobj

2 0 obj
  << /Type /Pages
     /Kids [3 0 R]
     /Count 1
     /MediaBox [0 0 300 144]
  >>
endobj

3 0 obj
  <<  /Type /Page
      /Parent 2 0 R
      /Resources
       << /Font
           << /F1
               << /Type /Font
                  /Subtype /Type1
                  /BaseFont /Times-Roman
               >>
           >>
       >>
      /Contents 4 0 R
  >>
endobj

4 0 obj
  << /Length 55 >>
stream
  BT
    /F1 18 Tf
    0 0 Td
    (Hello World) Tj
  ET
endstream
endobj

xref
0 5
0000000000 65535 f
0000000018 00000 n
0000000077 00000 n
0000000178 00000 n
0000000457 00000 n
trailer
  <<  /Root 1 0 R
      /Size 5
  >>
startxref
565
%%EOF
";

fn collect(input: &[u8]) -> Vec<Item<'_>> {
    let mut lexer = Lexer::new("test", input);
    let mut out = Vec::new();
    loop {
        let item = lexer.next_item();
        if item.kind == ItemKind::Eof {
            return out;
        }
        out.push(item);
    }
}

#[test]
fn rewrite_reproduces_input() {
    let items = collect(DEMO_PDF.as_bytes());
    assert!(items.iter().all(|i| i.kind != ItemKind::Error));
    let mut rebuilt = Vec::new();
    for item in &items {
        rebuilt.extend_from_slice(&item.val);
    }
    assert_eq!(rebuilt, DEMO_PDF.as_bytes());
}

#[test]
fn items_are_contiguous() {
    let items = collect(DEMO_PDF.as_bytes());
    let mut expected = 0usize;
    for item in &items {
        assert_eq!(item.pos, expected);
        expected += item.val.len();
    }
    assert_eq!(expected, DEMO_PDF.len());
}

#[test]
fn escaped_backslashes() {
    let items = collect(br"/Author (Fred Nerk\\\\)");
    assert_eq!(items[2].kind, ItemKind::String);
    assert_eq!(items[2].val.as_ref(), br"(Fred Nerk\\\\)");
}

#[test]
fn unterminated_dict() {
    let items = collect(b"/Author (Fred Nerk)<<");
    assert_eq!(items[4].kind, ItemKind::Error);
    assert_eq!(items[4].val.as_ref(), b"unterminated dict");
}

#[test]
fn unterminated_array() {
    let items = collect(b"/Author (Fred Nerk)[");
    assert_eq!(items[4].kind, ItemKind::Error);
    assert_eq!(items[4].val.as_ref(), b"unterminated array");
}

#[test]
fn extra_dict_terminator() {
    let items = collect(b"/Author (Fred Nerk)>>");
    assert_eq!(items[3].kind, ItemKind::RightDict);
    assert_eq!(items[4].kind, ItemKind::Error);
    assert_eq!(items[4].val.as_ref(), b"unexexpected dict terminator");
}

#[test]
fn extra_array_terminator() {
    let items = collect(b"/Author (Fred Nerk)]");
    assert_eq!(items[3].kind, ItemKind::RightArray);
    assert_eq!(items[4].kind, ItemKind::Error);
    assert_eq!(items[4].val.as_ref(), b"unexexpected array terminator");
}

#[test]
fn eof_repeats_after_error() {
    let mut lexer = Lexer::new("test", b"(");
    let first = lexer.next_item();
    assert_eq!(first.kind, ItemKind::Error);
    assert_eq!(first.val.as_ref(), b"unterminated string object");
    for _ in 0..3 {
        assert_eq!(lexer.next_item().kind, ItemKind::Eof);
    }
}

#[test]
fn eol_shapes() {
    let items = collect(b"a\r\nb\rc\nd");
    let kinds: Vec<_> = items.iter().map(|i| i.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ItemKind::Word,
            ItemKind::Eol,
            ItemKind::Word,
            ItemKind::Eol,
            ItemKind::Word,
            ItemKind::Eol,
            ItemKind::Word,
        ]
    );
    assert_eq!(items[1].val.as_ref(), b"\r\n");
    assert_eq!(items[3].val.as_ref(), b"\r");
    assert_eq!(items[5].val.as_ref(), b"\n");
}

#[test]
fn space_runs_never_cross_eol() {
    let items = collect(b"a  \n  b");
    let kinds: Vec<_> = items.iter().map(|i| i.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ItemKind::Word,
            ItemKind::Space,
            ItemKind::Eol,
            ItemKind::Space,
            ItemKind::Word,
        ]
    );
}

#[test]
fn comment_excludes_eol() {
    let items = collect(b"% a comment\r\nx");
    assert_eq!(items[0].kind, ItemKind::Comment);
    assert_eq!(items[0].val.as_ref(), b"% a comment");
    assert_eq!(items[1].kind, ItemKind::Eol);
    assert_eq!(items[1].val.as_ref(), b"\r\n");
    assert_eq!(items[2].kind, ItemKind::Word);
}

#[test]
fn comment_at_eof() {
    let items = collect(b"%%EOF");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].kind, ItemKind::Comment);
    assert_eq!(items[0].val.as_ref(), b"%%EOF");
}

#[test]
fn hexstring_accepts_digits_and_whitespace() {
    let items = collect(b"<48 65 6c>");
    assert_eq!(items[0].kind, ItemKind::HexString);
    assert_eq!(items[0].val.as_ref(), b"<48 65 6c>");
}

#[test]
fn hexstring_errors() {
    let items = collect(b"<4z>");
    assert_eq!(items[0].kind, ItemKind::Error);
    assert_eq!(items[0].val.as_ref(), b"illegal character in hexstring: U+007A 'z'");

    let items = collect(b"<48");
    assert_eq!(items[0].kind, ItemKind::Error);
    assert_eq!(items[0].val.as_ref(), b"unterminated hexstring");
}

#[test]
fn bad_number_syntax() {
    let items = collect(b"12x");
    assert_eq!(items[0].kind, ItemKind::Error);
    assert_eq!(items[0].val.as_ref(), br#"bad number syntax: "12x""#);
}

#[test]
fn number_shapes() {
    for input in [&b"+17"[..], b"-98", b"34.5", b"-.002", b"0.0", b"."] {
        let items = collect(input);
        assert_eq!(items.len(), 1, "{:?}", input);
        assert_eq!(items[0].kind, ItemKind::Number, "{:?}", input);
        assert_eq!(items[0].val.as_ref(), input);
    }
}

#[test]
fn name_stops_at_delimiters() {
    let items = collect(b"/Name/Other (s)");
    assert_eq!(items[0].kind, ItemKind::Name);
    assert_eq!(items[0].val.as_ref(), b"/Name");
    assert_eq!(items[1].kind, ItemKind::Name);
    assert_eq!(items[1].val.as_ref(), b"/Other");
}

#[test]
fn name_rejects_unprintable() {
    let items = collect("/N\u{e4}me".as_bytes());
    assert_eq!(items[0].kind, ItemKind::Error);
    assert_eq!(items[0].val.as_ref(), "illegal character in name: U+00E4 'ä'".as_bytes());
}

#[test]
fn keywords_are_whole_words() {
    let items = collect(b"obj endobj trailer xref startxref true false null xrefx");
    let kinds: Vec<_> =
        items.iter().filter(|i| i.kind != ItemKind::Space).map(|i| i.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ItemKind::Obj,
            ItemKind::EndObj,
            ItemKind::Trailer,
            ItemKind::Xref,
            ItemKind::StartXref,
            ItemKind::True,
            ItemKind::False,
            ItemKind::Null,
            ItemKind::Word,
        ]
    );
}

#[test]
fn stream_body_excludes_trailing_whitespace() {
    let items = collect(b"stream\nHELLO\n  \nendstream");
    let kinds: Vec<_> = items.iter().map(|i| i.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ItemKind::Stream,
            ItemKind::Eol,
            ItemKind::StreamBody,
            ItemKind::Eol,
            ItemKind::Space,
            ItemKind::Eol,
            ItemKind::EndStream,
        ]
    );
    assert_eq!(items[2].val.as_ref(), b"HELLO");
}

#[test]
fn stream_keyword_requires_eol() {
    let items = collect(b"stream BT");
    assert_eq!(items[1].kind, ItemKind::Error);
    assert_eq!(
        items[1].val.as_ref(),
        b"expected EOL terminator for stream keyword, got: U+0020 ' '"
    );
}

#[test]
fn unclosed_stream() {
    let items = collect(b"stream\nBT ET");
    assert_eq!(items[2].kind, ItemKind::Error);
    assert_eq!(items[2].val.as_ref(), b"unclosed stream");
}

#[test]
fn stream_body_round_trip_with_binary_contents() {
    let mut input = b"1 0 obj\n<< /Length 4 >>\nstream\n".to_vec();
    input.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
    input.extend_from_slice(b"\nendstream\nendobj\n");
    let items = collect(&input);
    assert!(items.iter().all(|i| i.kind != ItemKind::Error));
    let mut rebuilt = Vec::new();
    for item in &items {
        rebuilt.extend_from_slice(&item.val);
    }
    assert_eq!(rebuilt, input);
    let body = items.iter().find(|i| i.kind == ItemKind::StreamBody).expect("stream body");
    assert_eq!(body.val.as_ref(), &[0xde, 0xad, 0xbe, 0xef]);
}

#[test]
fn nested_dicts_and_arrays_balance() {
    let input: &[u8] = b"<< /A [ << /B [ [ 1 2 ] ] >> ] >>";
    let items = collect(input);
    assert!(items.iter().all(|i| i.kind != ItemKind::Error));
    let rebuilt: Vec<u8> = items.iter().flat_map(|i| i.val.iter().copied()).collect();
    assert_eq!(rebuilt, input);
}

#[test]
fn name_accepts_hash_escapes() {
    let items = collect(b"/Name#20With#20Spaces x");
    assert_eq!(items[0].kind, ItemKind::Name);
    assert_eq!(items[0].val.as_ref(), b"/Name#20With#20Spaces");
}

#[test]
fn stray_gt_is_an_error() {
    let items = collect(b"a > b");
    assert_eq!(items[2].kind, ItemKind::Error);
    assert_eq!(items[2].val.as_ref(), b"illegal character: U+003E '>'");
}
