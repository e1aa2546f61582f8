use std::borrow::Cow;

use memchr::memmem;

/// Reports whether `c` is a PDF end-of-line character.
pub fn is_end_of_line(c: char) -> bool {
    matches!(c, '\r' | '\n')
}

/// Whitespace that is not an end-of-line character. Wider than the PDF
/// whitespace set on purpose (NEL and NBSP are accepted): fuzzed inputs
/// contain them and the lexer must pass them through, not choke.
pub fn is_space(c: char) -> bool {
    c.is_whitespace() && !is_end_of_line(c)
}

/// The reserved PDF delimiter characters (PDF 32000-1:2008, 7.2.2).
pub fn is_delim(c: char) -> bool {
    matches!(c, '[' | ']' | '{' | '}' | '(' | ')' | '<' | '>' | '/' | '%')
}

pub fn is_alphanumeric(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

/// Token kinds in their stable order. Consumers dispatch on the variant;
/// the discriminant value is only used by the dump output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[repr(u8)]
pub enum ItemKind {
    Error = 0,
    Eof,
    Number,
    Space,
    Eol,
    LeftDict,
    RightDict,
    LeftArray,
    RightArray,
    StreamBody,
    String,
    HexString,
    Comment,
    Name,
    Word,
    Obj,
    EndObj,
    Stream,
    EndStream,
    Trailer,
    Xref,
    StartXref,
    True,
    False,
    Null,
}

/// One token. `val` borrows the exact input bytes for every kind except
/// `Error`, which owns its message text. Concatenating `val` over all items
/// up to (but not including) `Eof` reproduces the input byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item<'a> {
    pub kind: ItemKind,
    pub pos: usize,
    pub val: Cow<'a, [u8]>,
}

impl Item<'_> {
    pub fn val_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.val)
    }
}

fn keyword_kind(word: &[u8]) -> Option<ItemKind> {
    match word {
        b"obj" => Some(ItemKind::Obj),
        b"endobj" => Some(ItemKind::EndObj),
        b"stream" => Some(ItemKind::Stream),
        b"endstream" => Some(ItemKind::EndStream),
        b"trailer" => Some(ItemKind::Trailer),
        b"xref" => Some(ItemKind::Xref),
        b"startxref" => Some(ItemKind::StartXref),
        b"true" => Some(ItemKind::True),
        b"false" => Some(ItemKind::False),
        b"null" => Some(ItemKind::Null),
        _ => None,
    }
}

// Decode one code point at `bytes[0..]`. Invalid sequences decode as a
// one-byte replacement character, which classifies as illegal downstream.
fn decode_char(bytes: &[u8]) -> (char, usize) {
    let b = bytes[0];
    if b.is_ascii() {
        return (b as char, 1);
    }
    let len = match b {
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => return (char::REPLACEMENT_CHARACTER, 1),
    };
    if bytes.len() < len {
        return (char::REPLACEMENT_CHARACTER, 1);
    }
    match std::str::from_utf8(&bytes[..len]) {
        Ok(s) => match s.chars().next() {
            Some(c) => (c, len),
            None => (char::REPLACEMENT_CHARACTER, 1),
        },
        Err(_) => (char::REPLACEMENT_CHARACTER, 1),
    }
}

// Decode the last code point of `bytes` (non-empty).
fn decode_last_char(bytes: &[u8]) -> (char, usize) {
    let n = bytes.len();
    let last = bytes[n - 1];
    if last.is_ascii() {
        return (last as char, 1);
    }
    let lo = n.saturating_sub(4);
    for i in (lo..n).rev() {
        if bytes[i] & 0xC0 != 0x80 {
            if let Ok(s) = std::str::from_utf8(&bytes[i..]) {
                if let Some(c) = s.chars().next() {
                    if i + c.len_utf8() == n {
                        return (c, c.len_utf8());
                    }
                }
            }
            break;
        }
    }
    (char::REPLACEMENT_CHARACTER, 1)
}

fn fmt_char(c: char) -> String {
    format!("U+{:04X} {:?}", c as u32, c)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Default,
    Space,
    Name,
    Number,
    StringObj,
    HexObj,
    Comment,
    Word,
    StreamEol,
    StreamBody,
    PendingError,
    Done,
}

/// A streaming PDF tokenizer. Pull tokens with [`next_item`]; after an
/// `Eof` or `Error` item has been returned, every later call returns `Eof`.
///
/// [`next_item`]: Lexer::next_item
pub struct Lexer<'a> {
    name: String,
    input: &'a [u8],
    state: State,
    pos: usize,
    start: usize,
    width: usize,
    array_depth: i32,
    dict_depth: i32,
    pending: Option<String>,
}

impl<'a> Lexer<'a> {
    pub fn new(name: &str, input: &'a [u8]) -> Self {
        Self {
            name: name.to_string(),
            input,
            state: State::Default,
            pos: 0,
            start: 0,
            width: 0,
            array_depth: 0,
            dict_depth: 0,
            pending: None,
        }
    }

    /// The input name given at construction, for diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn next_item(&mut self) -> Item<'a> {
        loop {
            match self.state {
                State::Default => {
                    if let Some(item) = self.lex_default() {
                        return item;
                    }
                }
                State::Space => return self.lex_space(),
                State::Name => return self.lex_name(),
                State::Number => return self.lex_number(),
                State::StringObj => return self.lex_string(),
                State::HexObj => return self.lex_hex(),
                State::Comment => return self.lex_comment(),
                State::Word => return self.lex_word(),
                State::StreamEol => return self.lex_stream_eol(),
                State::StreamBody => return self.lex_stream_body(),
                State::PendingError => {
                    let msg = self.pending.take().unwrap_or_default();
                    return self.errorf(msg);
                }
                State::Done => {
                    return Item { kind: ItemKind::Eof, pos: self.pos, val: Cow::Borrowed(&[]) }
                }
            }
        }
    }

    fn next(&mut self) -> Option<char> {
        if self.pos >= self.input.len() {
            self.width = 0;
            return None;
        }
        let (c, w) = decode_char(&self.input[self.pos..]);
        self.width = w;
        self.pos += w;
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        let c = self.next();
        self.backup();
        c
    }

    // Must only be called once per call of next.
    fn backup(&mut self) {
        self.pos -= self.width;
    }

    fn accept(&mut self, valid: &str) -> bool {
        if let Some(c) = self.next() {
            if valid.contains(c) {
                return true;
            }
        }
        self.backup();
        false
    }

    fn accept_run(&mut self, valid: &str) {
        while self.accept(valid) {}
    }

    fn emit(&mut self, kind: ItemKind) -> Item<'a> {
        let item = Item {
            kind,
            pos: self.start,
            val: Cow::Borrowed(&self.input[self.start..self.pos]),
        };
        self.start = self.pos;
        item
    }

    // Emits an error token and parks the scan; later calls return Eof.
    fn errorf(&mut self, msg: String) -> Item<'a> {
        self.state = State::Done;
        Item { kind: ItemKind::Error, pos: self.start, val: Cow::Owned(msg.into_bytes()) }
    }

    fn eof_item(&mut self) -> Item<'a> {
        self.state = State::Done;
        Item { kind: ItemKind::Eof, pos: self.pos, val: Cow::Borrowed(&[]) }
    }

    // The root scanning state; also correct inside dicts and arrays, which
    // only get depth-checked here.
    fn lex_default(&mut self) -> Option<Item<'a>> {
        let r = match self.next() {
            Some(r) => r,
            None => {
                if self.array_depth > 0 {
                    return Some(self.errorf("unterminated array".to_string()));
                }
                if self.dict_depth > 0 {
                    return Some(self.errorf("unterminated dict".to_string()));
                }
                return Some(self.eof_item());
            }
        };
        match r {
            '\r' => {
                self.accept("\n");
                Some(self.emit(ItemKind::Eol))
            }
            '\n' => Some(self.emit(ItemKind::Eol)),
            c if is_space(c) => {
                self.state = State::Space;
                None
            }
            '/' => {
                self.state = State::Name;
                None
            }
            '+' | '-' | '.' | '0'..='9' => {
                self.backup();
                self.state = State::Number;
                None
            }
            c if is_alphanumeric(c) => {
                self.state = State::Word;
                None
            }
            '(' => {
                self.state = State::StringObj;
                None
            }
            '<' => {
                if self.peek() == Some('<') {
                    self.next();
                    self.dict_depth += 1;
                    Some(self.emit(ItemKind::LeftDict))
                } else {
                    self.state = State::HexObj;
                    None
                }
            }
            '[' => {
                self.array_depth += 1;
                Some(self.emit(ItemKind::LeftArray))
            }
            ']' => {
                self.array_depth -= 1;
                if self.array_depth < 0 {
                    self.pending = Some("unexexpected array terminator".to_string());
                    self.state = State::PendingError;
                }
                Some(self.emit(ItemKind::RightArray))
            }
            '%' => {
                self.state = State::Comment;
                None
            }
            '>' => {
                if self.peek() == Some('>') {
                    self.next();
                    self.dict_depth -= 1;
                    if self.dict_depth < 0 {
                        self.pending = Some("unexexpected dict terminator".to_string());
                        self.state = State::PendingError;
                    }
                    Some(self.emit(ItemKind::RightDict))
                } else {
                    // a '>' closing a hex string is consumed in lex_hex, so a
                    // stray one here is not valid
                    Some(self.errorf(format!("illegal character: {}", fmt_char(r))))
                }
            }
            _ => Some(self.errorf(format!("illegal character: {}", fmt_char(r)))),
        }
    }

    // A run of space characters, one of which has already been seen. Runs
    // never include EOL characters.
    fn lex_space(&mut self) -> Item<'a> {
        while let Some(c) = self.peek() {
            if !is_space(c) {
                break;
            }
            self.next();
        }
        self.state = State::Default;
        self.emit(ItemKind::Space)
    }

    // A PDF name: SOLIDUS followed by a run of regular characters.
    fn lex_name(&mut self) -> Item<'a> {
        loop {
            match self.next() {
                None => break,
                Some(c) if is_delim(c) || c.is_whitespace() => {
                    self.backup();
                    break;
                }
                Some(c) if ('\x21'..='\x7e').contains(&c) => {}
                Some(c) => {
                    return self.errorf(format!("illegal character in name: {}", fmt_char(c)))
                }
            }
        }
        self.state = State::Default;
        self.emit(ItemKind::Name)
    }

    fn lex_number(&mut self) -> Item<'a> {
        if !self.scan_number() {
            let lexeme = String::from_utf8_lossy(&self.input[self.start..self.pos]).into_owned();
            return self.errorf(format!("bad number syntax: {:?}", lexeme));
        }
        self.state = State::Default;
        self.emit(ItemKind::Number)
    }

    fn scan_number(&mut self) -> bool {
        self.accept("+-");
        let digits = "0123456789";
        self.accept_run(digits);
        if self.accept(".") {
            self.accept_run(digits);
        }
        // the next thing must be a delimiter, whitespace, or EOF
        match self.peek() {
            None => true,
            Some(c) if is_delim(c) || c.is_whitespace() => true,
            Some(_) => {
                self.next();
                false
            }
        }
    }

    // A literal string object: anything in balanced parens. A backslash
    // escapes the next character, so escaped parens never count.
    fn lex_string(&mut self) -> Item<'a> {
        let mut balance = 1i32;
        loop {
            match self.next() {
                Some('\\') => {
                    self.next();
                }
                Some('(') => balance += 1,
                Some(')') => {
                    balance -= 1;
                    if balance <= 0 {
                        self.state = State::Default;
                        return self.emit(ItemKind::String);
                    }
                }
                Some(_) => {}
                None => return self.errorf("unterminated string object".to_string()),
            }
        }
    }

    fn lex_hex(&mut self) -> Item<'a> {
        loop {
            match self.next() {
                Some(c) if c.is_ascii_hexdigit() || c.is_whitespace() => {}
                Some('>') => {
                    self.state = State::Default;
                    return self.emit(ItemKind::HexString);
                }
                Some(c) => {
                    return self.errorf(format!(
                        "illegal character in hexstring: {}",
                        fmt_char(c)
                    ))
                }
                None => return self.errorf("unterminated hexstring".to_string()),
            }
        }
    }

    // '%' to the next EOL marker, which stays unconsumed and comes out as
    // its own Eol token (CRLF as one token).
    fn lex_comment(&mut self) -> Item<'a> {
        while let Some(c) = self.peek() {
            if is_end_of_line(c) {
                break;
            }
            self.next();
        }
        self.state = State::Default;
        self.emit(ItemKind::Comment)
    }

    // A run of alnums: either one of the known keywords or a catchall Word.
    fn lex_word(&mut self) -> Item<'a> {
        while let Some(c) = self.peek() {
            if !is_alphanumeric(c) {
                break;
            }
            self.next();
        }
        let kind = keyword_kind(&self.input[self.start..self.pos]).unwrap_or(ItemKind::Word);
        self.state = if kind == ItemKind::Stream { State::StreamEol } else { State::Default };
        self.emit(kind)
    }

    // Exactly one EOL must terminate the stream keyword.
    fn lex_stream_eol(&mut self) -> Item<'a> {
        if !self.scan_eol() {
            let msg = match self.peek() {
                Some(c) => {
                    format!("expected EOL terminator for stream keyword, got: {}", fmt_char(c))
                }
                None => "expected EOL terminator for stream keyword, got: EOF".to_string(),
            };
            return self.errorf(msg);
        }
        self.state = State::StreamBody;
        self.emit(ItemKind::Eol)
    }

    fn scan_eol(&mut self) -> bool {
        match self.peek() {
            Some(c) if is_end_of_line(c) => {
                if self.next() == Some('\r') {
                    self.accept("\n");
                }
                true
            }
            _ => false,
        }
    }

    // The raw contents of a stream object, excluding the whitespace that
    // separates them from the endstream keyword. The whitespace and the
    // keyword itself are lexed by the default state afterwards.
    fn lex_stream_body(&mut self) -> Item<'a> {
        let rest = &self.input[self.pos..];
        let i = match memmem::find(rest, b"endstream") {
            Some(i) => i,
            None => return self.errorf("unclosed stream".to_string()),
        };
        let mut body = &rest[..i];
        while !body.is_empty() {
            let (c, w) = decode_last_char(body);
            if !c.is_whitespace() {
                break;
            }
            body = &body[..body.len() - w];
        }
        self.pos += body.len();
        self.state = State::Default;
        self.emit(ItemKind::StreamBody)
    }
}
