//! Shard payload parsing.
//!
//! A shard is the array literal a documentation generator writes into
//! `search/<section>_<bucket>.js`:
//!
//! ```text
//! var searchData=
//! [
//!   ['keep_5falive_5207',['keep_alive',['../structripple_1_1Handoff.html#a12',1,'ripple::Handoff']]],
//!   ...
//! ];
//! ```
//!
//! The flat form `[token, [label, url, scope]]` is accepted too, in either JS
//! or JSON syntax.

use crate::error::MalformedIndexError;
use crate::index::types::{IndexEntry, IndexShard, Reference, ShardName};
use crate::query::normalize::{decode_entities, decode_search_key};

/// Literal value as it appears in the payload
#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
    Array(Vec<Literal>),
}

impl Literal {
    fn kind(&self) -> &'static str {
        match self {
            Literal::Str(_) => "string",
            Literal::Num(_) => "number",
            Literal::Bool(_) => "boolean",
            Literal::Null => "null",
            Literal::Array(_) => "array",
        }
    }
}

/// Parse a shard payload into an [`IndexShard`]
pub fn parse_shard(name: ShardName, payload: &str) -> Result<IndexShard, MalformedIndexError> {
    let fail = |reason: String| MalformedIndexError::new(name.raw.clone(), reason);

    let root = LiteralParser::new(payload).parse_document().map_err(fail)?;
    let records = match root {
        Literal::Array(records) => records,
        other => return Err(fail(format!("expected an array of records, found {}", other.kind()))),
    };

    let mut entries = Vec::with_capacity(records.len());
    for (pos, record) in records.into_iter().enumerate() {
        let entry = parse_record(record).map_err(|reason| fail(format!("record {}: {}", pos, reason)))?;
        entries.push(entry);
    }

    Ok(IndexShard { name, entries })
}

fn parse_record(record: Literal) -> Result<IndexEntry, String> {
    let mut parts = match record {
        Literal::Array(parts) if parts.len() == 2 => parts,
        Literal::Array(parts) => {
            return Err(format!("expected [key, body], found {} elements", parts.len()));
        }
        other => return Err(format!("expected [key, body], found {}", other.kind())),
    };

    let body = parts.pop().unwrap_or(Literal::Null);
    let key = match parts.pop() {
        Some(Literal::Str(key)) if !key.is_empty() => key,
        Some(Literal::Str(_)) => return Err("empty key".to_string()),
        Some(other) => return Err(format!("key must be a string, found {}", other.kind())),
        None => return Err("missing key".to_string()),
    };

    let body = match body {
        Literal::Array(body) => body,
        other => return Err(format!("body must be an array, found {}", other.kind())),
    };

    let mut items = body.into_iter();
    let name = match items.next() {
        Some(Literal::Str(name)) => decode_entities(&name).into_owned(),
        Some(other) => return Err(format!("display name must be a string, found {}", other.kind())),
        None => return Err("missing reference tuple".to_string()),
    };
    let rest: Vec<Literal> = items.collect();

    // Flat form: [token, [label, url, scope]]
    if let Some(Literal::Str(_)) = rest.first() {
        let reference = parse_flat_reference(&name, rest)?;
        return Ok(IndexEntry {
            token: key,
            name,
            ordinal: None,
            occurrences: vec![reference],
        });
    }

    // Generator form: [key, [name, [url, flag, scope], ...]]
    if rest.is_empty() {
        return Err("missing reference tuple".to_string());
    }
    let occurrences = rest
        .into_iter()
        .enumerate()
        .map(|(i, r)| parse_reference(&name, r).map_err(|e| format!("reference {}: {}", i, e)))
        .collect::<Result<Vec<_>, _>>()?;

    let (token, ordinal) = match decode_search_key(&key) {
        Some((token, ordinal)) => (token, Some(ordinal)),
        None => (key, None),
    };

    Ok(IndexEntry {
        token,
        name,
        ordinal,
        occurrences,
    })
}

fn parse_reference(label: &str, value: Literal) -> Result<Reference, String> {
    let fields = match value {
        Literal::Array(fields) => fields,
        other => return Err(format!("expected [url, flag, scope], found {}", other.kind())),
    };
    if fields.len() < 2 || fields.len() > 3 {
        return Err(format!("expected [url, flag, scope], found {} elements", fields.len()));
    }

    let mut fields = fields.into_iter();
    let anchor_url = expect_url(fields.next())?;
    let parent_target = match fields.next() {
        Some(Literal::Num(n)) => n != 0.0,
        Some(Literal::Bool(b)) => b,
        Some(Literal::Null) | None => false,
        Some(other) => return Err(format!("flag must be a number, found {}", other.kind())),
    };
    let scope_description = expect_scope(fields.next())?;

    Ok(Reference {
        display_label: label.to_string(),
        anchor_url,
        scope_description,
        parent_target,
    })
}

fn parse_flat_reference(label: &str, fields: Vec<Literal>) -> Result<Reference, String> {
    if fields.len() > 2 {
        return Err(format!("expected [label, url, scope], found {} elements", fields.len() + 1));
    }
    let mut fields = fields.into_iter();
    let anchor_url = expect_url(fields.next())?;
    let scope_description = expect_scope(fields.next())?;

    Ok(Reference {
        display_label: label.to_string(),
        anchor_url,
        scope_description,
        parent_target: false,
    })
}

fn expect_url(value: Option<Literal>) -> Result<String, String> {
    match value {
        Some(Literal::Str(url)) if !url.trim().is_empty() => Ok(url),
        Some(Literal::Str(_)) => Err("empty anchor url".to_string()),
        Some(other) => Err(format!("anchor url must be a string, found {}", other.kind())),
        None => Err("missing anchor url".to_string()),
    }
}

fn expect_scope(value: Option<Literal>) -> Result<String, String> {
    match value {
        Some(Literal::Str(scope)) => Ok(decode_entities(&scope).into_owned()),
        Some(Literal::Null) | None => Ok(String::new()),
        Some(other) => Err(format!("scope must be a string, found {}", other.kind())),
    }
}

/// Deepest array nesting accepted; real shards nest four levels
const MAX_DEPTH: usize = 64;

/// Recursive-descent reader for the JS/JSON array literal subset shards use
struct LiteralParser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> LiteralParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0, depth: 0 }
    }

    /// Parse `var name = <literal>;` or a bare literal, rejecting trailing data
    fn parse_document(&mut self) -> Result<Literal, String> {
        self.skip_trivia();
        if self.remaining().starts_with("var ")
            || self.remaining().starts_with("let ")
            || self.remaining().starts_with("const ")
        {
            match self.remaining().find('=') {
                Some(eq) => self.pos += eq + 1,
                None => return Err("expected '=' after variable declaration".to_string()),
            }
        }

        let value = self.parse_value()?;

        self.skip_trivia();
        self.consume_char(';');
        self.skip_trivia();
        if self.pos < self.input.len() {
            return Err(format!("unexpected trailing data at byte {}", self.pos));
        }
        Ok(value)
    }

    fn parse_value(&mut self) -> Result<Literal, String> {
        self.skip_trivia();
        match self.peek() {
            Some('[') => self.parse_array(),
            Some(q @ ('\'' | '"')) => self.parse_string(q).map(Literal::Str),
            Some(c) if c == '-' || c.is_ascii_digit() => self.parse_number(),
            Some(c) if c.is_ascii_alphabetic() => self.parse_keyword(),
            Some(c) => Err(format!("unexpected character '{}' at byte {}", c, self.pos)),
            None => Err("unexpected end of input".to_string()),
        }
    }

    fn parse_array(&mut self) -> Result<Literal, String> {
        if self.depth >= MAX_DEPTH {
            return Err(format!("nesting too deep at byte {}", self.pos));
        }
        self.depth += 1;
        let result = self.parse_array_items();
        self.depth -= 1;
        result
    }

    fn parse_array_items(&mut self) -> Result<Literal, String> {
        let start = self.pos;
        self.consume_char('[');
        let mut items = Vec::new();

        loop {
            self.skip_trivia();
            if self.consume_char(']') {
                return Ok(Literal::Array(items));
            }
            if self.peek().is_none() {
                return Err(format!("unterminated array starting at byte {}", start));
            }

            items.push(self.parse_value()?);

            self.skip_trivia();
            if self.consume_char(',') {
                continue;
            }
            if self.consume_char(']') {
                return Ok(Literal::Array(items));
            }
            return match self.peek() {
                Some(c) => Err(format!("expected ',' or ']' at byte {}, found '{}'", self.pos, c)),
                None => Err(format!("unterminated array starting at byte {}", start)),
            };
        }
    }

    fn parse_string(&mut self, quote: char) -> Result<String, String> {
        let start = self.pos;
        self.pos += quote.len_utf8();
        let mut out = String::new();

        loop {
            let c = match self.next_char() {
                Some(c) => c,
                None => return Err(format!("unterminated string starting at byte {}", start)),
            };

            if c == quote {
                return Ok(out);
            }
            if c != '\\' {
                out.push(c);
                continue;
            }

            match self.next_char() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('b') => out.push('\u{8}'),
                Some('f') => out.push('\u{c}'),
                Some('0') => out.push('\0'),
                Some('u') => out.push(self.parse_unicode_escape()?),
                Some(other) => out.push(other),
                None => return Err(format!("unterminated string starting at byte {}", start)),
            }
        }
    }

    fn parse_unicode_escape(&mut self) -> Result<char, String> {
        let hex = self
            .input
            .get(self.pos..self.pos + 4)
            .ok_or_else(|| format!("truncated \\u escape at byte {}", self.pos))?;
        let code = u32::from_str_radix(hex, 16)
            .map_err(|_| format!("invalid \\u escape at byte {}", self.pos))?;
        self.pos += 4;
        Ok(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER))
    }

    fn parse_number(&mut self) -> Result<Literal, String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E') {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.input[start..self.pos]
            .parse::<f64>()
            .map(Literal::Num)
            .map_err(|_| format!("invalid number at byte {}", start))
    }

    fn parse_keyword(&mut self) -> Result<Literal, String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        match &self.input[start..self.pos] {
            "true" => Ok(Literal::Bool(true)),
            "false" => Ok(Literal::Bool(false)),
            "null" | "undefined" => Ok(Literal::Null),
            other => Err(format!("unexpected identifier '{}' at byte {}", other, start)),
        }
    }

    /// Skip whitespace and JS comments
    fn skip_trivia(&mut self) {
        loop {
            let rest = self.remaining();
            let trimmed = rest.trim_start();
            self.pos += rest.len() - trimmed.len();

            if trimmed.starts_with("//") {
                self.pos += trimmed.find('\n').unwrap_or(trimmed.len());
            } else if trimmed.starts_with("/*") {
                self.pos += trimmed.find("*/").map(|i| i + 2).unwrap_or(trimmed.len());
            } else {
                break;
            }
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn next_char(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn consume_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }
}
