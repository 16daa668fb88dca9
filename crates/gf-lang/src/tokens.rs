use crate::error::{LangReason, LangResult};

/// A cursor over an already-tokenized command tail (the wire codec is out
/// of scope; this crate only ever sees `Vec<String>` argument vectors).
pub struct Cursor<'a> {
    toks: &'a [String],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(toks: &'a [String]) -> Self {
        Self { toks, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.toks.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.toks.len()
    }

    pub fn peek(&self) -> Option<&str> {
        self.toks.get(self.pos).map(|s| s.as_str())
    }

    pub fn peek_at(&self, offset: usize) -> Option<&str> {
        self.toks.get(self.pos + offset).map(|s| s.as_str())
    }

    pub fn next(&mut self) -> LangResult<&'a str> {
        let t = self.toks.get(self.pos).ok_or(LangReason::ArgCount)?;
        self.pos += 1;
        Ok(t.as_str())
    }

    pub fn next_f64(&mut self) -> LangResult<f64> {
        let t = self.next()?;
        t.parse::<f64>()
            .map_err(|_| LangReason::ArgInvalid(t.to_string()).into())
    }

    pub fn next_u64(&mut self) -> LangResult<u64> {
        let t = self.next()?;
        t.parse::<u64>()
            .map_err(|_| LangReason::ArgInvalid(t.to_string()).into())
    }

    /// Case-insensitive literal match; consumes only on success.
    pub fn eat_literal(&mut self, lit: &str) -> bool {
        if self.peek().is_some_and(|t| t.eq_ignore_ascii_case(lit)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub fn rest(&self) -> &'a [String] {
        &self.toks[self.pos..]
    }

    pub fn is_numeric_ahead(&self) -> bool {
        self.peek().is_some_and(|t| t.parse::<f64>().is_ok())
    }
}

pub fn is_keyword(tok: &str, kw: &str) -> bool {
    tok.eq_ignore_ascii_case(kw)
}
