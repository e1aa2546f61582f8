use anyhow::{anyhow, Result};
use tracing::{debug, warn};

use crate::lexer::{Item, ItemKind, Lexer};
use crate::locate::locate_object;

/// One parsed cross-reference table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XrefRow {
    pub offset: u64,
    pub generation: u32,
    pub active: bool,
}

/// The active subsection while the parser is inside an xref section:
/// the header values plus the object number the next row refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subsection {
    pub first: i64,
    pub entries: i64,
    pub idx: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Outside,
    Inside,
    AtEof,
}

/// Rewrites xref sections over a token stream. Everything the parser
/// consumes is appended to a scratch buffer; live row offsets are replaced
/// by the object's current position in that buffer and `startxref` operands
/// by the position of the preceding `xref` keyword. Malformed constructs
/// are passed through verbatim, never fatal.
///
/// Single use: [`fix_xrefs`] consumes the parser.
///
/// [`fix_xrefs`]: FixupParser::fix_xrefs
pub struct FixupParser<'a> {
    lexer: Lexer<'a>,
    scratch: Vec<u8>,
    state: State,
    from: usize,
    last_xref: Option<usize>,
    section: Option<Subsection>,
}

impl<'a> FixupParser<'a> {
    pub fn new(lexer: Lexer<'a>) -> Self {
        Self {
            lexer,
            scratch: Vec::new(),
            state: State::Outside,
            from: 0,
            last_xref: None,
            section: None,
        }
    }

    /// Offset in scratch of the start of the current `xref` keyword.
    pub fn last_xref(&self) -> Option<usize> {
        self.last_xref
    }

    pub fn subsection(&self) -> Option<Subsection> {
        self.section
    }

    pub fn scratch(&self) -> &[u8] {
        &self.scratch
    }

    /// Consumes the whole token stream and returns the rewritten bytes.
    pub fn fix_xrefs(mut self) -> Vec<u8> {
        while self.state != State::AtEof {
            if !self.maybe_find_xref() {
                continue;
            }
            let (_, ok) = self.accept(ItemKind::Eol);
            if !ok {
                warn!(
                    input = %self.lexer.name(),
                    domain = "pdf.fixup",
                    kind = "missing_eol_after_xref",
                    pos = self.scratch.len(),
                    "No EOL after xref keyword, skipping section"
                );
                self.reset_to_here();
                continue;
            }
            'section: while self.maybe_find_header() {
                let entries = self.section.map(|s| s.entries).unwrap_or(0);
                for _ in 0..entries.max(0) {
                    match self.find_row() {
                        Ok(row) => {
                            self.emit_row(&row);
                            if !self.accept_row_terminator() {
                                self.reset_to_here();
                                break 'section;
                            }
                        }
                        Err(err) => {
                            warn!(
                                input = %self.lexer.name(),
                                domain = "pdf.fixup",
                                kind = "corrupt_row",
                                pos = self.scratch.len(),
                                error = %err,
                                "Corrupt xref row, leaving section as-is"
                            );
                            self.reset_to_here();
                            break 'section;
                        }
                    }
                }
            }
        }
        self.scratch
    }

    /// Pulls tokens (appending each to scratch) until an `xref` keyword or
    /// the end of input. Returns true when a section was found; the parser
    /// is then inside it. Must not be called while already inside one.
    pub fn maybe_find_xref(&mut self) -> bool {
        debug_assert!(self.state != State::Inside, "maybe_find_xref called inside a section");
        loop {
            let item = self.pull_append();
            match item.kind {
                ItemKind::Xref => {
                    self.last_xref = Some(self.scratch.len() - item.val.len());
                    self.state = State::Inside;
                    return true;
                }
                ItemKind::Eof | ItemKind::Error => return false,
                _ => {}
            }
        }
    }

    /// Pulls the next token and dispatches: a subsection header makes it the
    /// active one and returns true; `trailer` finishes the section
    /// (rewriting the startxref operand on the way out); anything else is
    /// treated as corruption and recovered from. False means the caller is
    /// done with this section.
    pub fn maybe_find_header(&mut self) -> bool {
        let item = self.pull_append();
        match item.kind {
            ItemKind::Number => {
                let first = match parse_int(&item.val) {
                    Some(v) => v,
                    None => {
                        self.recover("header_offset_not_integer");
                        return false;
                    }
                };
                if !self.accept_exact(ItemKind::Space, "header_missing_space") {
                    return false;
                }
                let (entries_item, ok) = self.accept(ItemKind::Number);
                if !ok {
                    self.recover("header_entries_not_number");
                    return false;
                }
                let entries = match parse_int(&entries_item.val) {
                    Some(v) => v,
                    None => {
                        self.recover("header_entries_not_integer");
                        return false;
                    }
                };
                if !self.accept_exact(ItemKind::Eol, "header_missing_eol") {
                    return false;
                }
                self.section = Some(Subsection { first, entries, idx: first });
                true
            }
            ItemKind::Trailer => {
                self.finish_section();
                false
            }
            ItemKind::Eof | ItemKind::Error => false,
            _ => {
                self.recover("header_truncated");
                false
            }
        }
    }

    /// Parses one 20-byte row up to (not including) its line terminator.
    /// On failure everything examined is flushed to scratch verbatim, so
    /// no input bytes are lost on the recovery path.
    pub fn find_row(&mut self) -> Result<XrefRow> {
        let mut bailout: Vec<u8> = Vec::new();
        let res = self.scan_row(&mut bailout);
        if res.is_err() {
            self.scratch.extend_from_slice(&bailout);
        }
        res
    }

    fn scan_row(&mut self, bailout: &mut Vec<u8>) -> Result<XrefRow> {
        let item = self.pull_bailout(bailout);
        if item.kind != ItemKind::Number || item.val.len() != 10 {
            return Err(anyhow!("bad offset field in xref row"));
        }
        let offset = parse_u64(&item.val).ok_or_else(|| anyhow!("offset field does not parse"))?;
        let item = self.pull_bailout(bailout);
        if item.kind != ItemKind::Space || item.val.len() != 1 {
            return Err(anyhow!("bad separator after offset field"));
        }
        let item = self.pull_bailout(bailout);
        if item.kind != ItemKind::Number || item.val.len() != 5 {
            return Err(anyhow!("bad generation field in xref row"));
        }
        let generation =
            parse_u32(&item.val).ok_or_else(|| anyhow!("generation field does not parse"))?;
        let item = self.pull_bailout(bailout);
        if item.kind != ItemKind::Space || item.val.len() != 1 {
            return Err(anyhow!("bad separator after generation field"));
        }
        let item = self.pull_bailout(bailout);
        let active = match item.val.as_ref() {
            b"n" => true,
            b"f" => false,
            _ => return Err(anyhow!("bad type field in xref row")),
        };
        Ok(XrefRow { offset, generation, active })
    }

    /// Appends the rewritten form of a successfully parsed row: live rows
    /// get the object's current offset in scratch when the object can be
    /// located, free rows pass through unchanged.
    pub fn emit_row(&mut self, row: &XrefRow) {
        let line = if row.active {
            let idx = self.section.map(|s| s.idx).unwrap_or(0);
            let end = self.last_xref.unwrap_or(self.scratch.len());
            let offset = match locate_object(&self.scratch[self.from..end], idx) {
                Some(i) => {
                    let relocated = (self.from + i) as u64;
                    if relocated != row.offset {
                        debug!(
                            input = %self.lexer.name(),
                            domain = "pdf.fixup",
                            kind = "row_relocated",
                            object = idx,
                            old = row.offset,
                            new = relocated,
                            "Relocated xref row"
                        );
                    }
                    relocated
                }
                None => row.offset,
            };
            format!("{:010} {:05} n", offset, row.generation)
        } else {
            format!("{:010} {:05} f", row.offset, row.generation)
        };
        self.scratch.extend_from_slice(line.as_bytes());
        if let Some(s) = self.section.as_mut() {
            s.idx += 1;
        }
    }

    /// Validates and appends the row's line terminator: CR LF as one EOL
    /// token, or a single space followed by a lone CR or LF.
    pub fn accept_row_terminator(&mut self) -> bool {
        let item = self.pull();
        match item.kind {
            ItemKind::Eol if item.val.len() == 2 => {
                self.append(&item);
                true
            }
            ItemKind::Space if item.val.len() == 1 => {
                self.append(&item);
                let eol = self.pull();
                let ok = eol.kind == ItemKind::Eol && eol.val.len() == 1;
                self.append(&eol);
                if !ok {
                    warn!(
                        input = %self.lexer.name(),
                        domain = "pdf.fixup",
                        kind = "bad_row_terminator",
                        pos = self.scratch.len(),
                        "Illegal xref row line terminator"
                    );
                }
                ok
            }
            _ => {
                self.append(&item);
                warn!(
                    input = %self.lexer.name(),
                    domain = "pdf.fixup",
                    kind = "bad_row_terminator",
                    pos = self.scratch.len(),
                    "Illegal xref row line terminator"
                );
                false
            }
        }
    }

    /// Pulls the next token, appends it to scratch, and reports whether it
    /// matched the wanted kind.
    pub fn accept(&mut self, kind: ItemKind) -> (Item<'a>, bool) {
        let item = self.pull_append();
        let ok = item.kind == kind;
        (item, ok)
    }

    /// Leaves the current section: back to searching from the end of
    /// scratch, with no active subsection.
    pub fn reset_to_here(&mut self) {
        if self.state != State::AtEof {
            self.state = State::Outside;
        }
        self.from = self.scratch.len().saturating_sub(1);
        self.last_xref = None;
        self.section = None;
    }

    // Passes the trailer through verbatim and rewrites the startxref
    // operand to the recorded xref position. Called with the trailer
    // keyword already appended.
    fn finish_section(&mut self) {
        loop {
            let item = self.pull_append();
            match item.kind {
                ItemKind::StartXref => break,
                ItemKind::Eof | ItemKind::Error => return,
                _ => {}
            }
        }
        let (_, ok) = self.accept(ItemKind::Eol);
        if !ok {
            self.recover("missing_eol_after_startxref");
            return;
        }
        let item = self.pull();
        if item.kind != ItemKind::Number {
            self.append(&item);
            self.recover("startxref_offset_not_number");
            return;
        }
        match self.last_xref {
            Some(off) => self.scratch.extend_from_slice(off.to_string().as_bytes()),
            None => self.append(&item),
        }
        // the trailing EOL and the %%EOF comment come through the main loop
        self.reset_to_here();
    }

    fn recover(&mut self, kind: &'static str) {
        warn!(
            input = %self.lexer.name(),
            domain = "pdf.fixup",
            kind = kind,
            pos = self.scratch.len(),
            "Recovering from malformed xref construct"
        );
        self.reset_to_here();
    }

    fn accept_exact(&mut self, kind: ItemKind, failure: &'static str) -> bool {
        let (_, ok) = self.accept(kind);
        if !ok {
            self.recover(failure);
        }
        ok
    }

    fn pull(&mut self) -> Item<'a> {
        let item = self.lexer.next_item();
        match item.kind {
            ItemKind::Eof => self.state = State::AtEof,
            ItemKind::Error => {
                warn!(
                    input = %self.lexer.name(),
                    domain = "pdf.fixup",
                    kind = "lex_error",
                    pos = item.pos,
                    error = %item.val_lossy(),
                    "Lexer error during xref fixup"
                );
                self.state = State::AtEof;
            }
            _ => {}
        }
        item
    }

    // Error items carry message text, not input bytes; they never land in
    // scratch.
    fn append(&mut self, item: &Item<'a>) {
        if item.kind != ItemKind::Error {
            self.scratch.extend_from_slice(&item.val);
        }
    }

    fn pull_append(&mut self) -> Item<'a> {
        let item = self.pull();
        self.append(&item);
        item
    }

    fn pull_bailout(&mut self, bailout: &mut Vec<u8>) -> Item<'a> {
        let item = self.pull();
        if item.kind != ItemKind::Error {
            bailout.extend_from_slice(&item.val);
        }
        item
    }
}

fn parse_int(val: &[u8]) -> Option<i64> {
    std::str::from_utf8(val).ok()?.parse::<i64>().ok()
}

fn parse_u64(val: &[u8]) -> Option<u64> {
    std::str::from_utf8(val).ok()?.parse::<u64>().ok()
}

fn parse_u32(val: &[u8]) -> Option<u32> {
    std::str::from_utf8(val).ok()?.parse::<u32>().ok()
}
