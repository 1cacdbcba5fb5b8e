//! The selector subset used by the pattern lists.
//!
//! Supported: `tag`, `*`, `#id`, `.class`, `[attr]`, `[attr="v"]`,
//! `[attr*="v"]`, `[attr^="v"]`, `[attr$="v"]`, `:has(selector)` and the
//! descendant combinator (whitespace). Anything else is rejected at parse
//! time so a bad pattern in the settings file is reported instead of silently
//! never matching.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use super::DomNode;

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals(String),
    Contains(String),
    Prefix(String),
    Suffix(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrMatch {
    name: String,
    op: AttrOp,
}

impl AttrMatch {
    fn matches(&self, value: Option<String>) -> bool {
        let Some(value) = value else {
            return false;
        };
        match &self.op {
            AttrOp::Exists => true,
            AttrOp::Equals(expected) => value == *expected,
            // An empty needle never matches for the substring forms, as in CSS.
            AttrOp::Contains(needle) => !needle.is_empty() && value.contains(needle.as_str()),
            AttrOp::Prefix(needle) => !needle.is_empty() && value.starts_with(needle.as_str()),
            AttrOp::Suffix(needle) => !needle.is_empty() && value.ends_with(needle.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrMatch>,
    has: Vec<Selector>,
}

impl Compound {
    fn matches<N: DomNode>(&self, node: &N) -> bool {
        if let Some(tag) = &self.tag {
            if node.tag_name() != *tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if node.attribute("id").as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.iter().all(|class| node.has_class(class)) {
            return false;
        }
        if !self
            .attrs
            .iter()
            .all(|attr| attr.matches(node.attribute(&attr.name)))
        {
            return false;
        }
        self.has.iter().all(|inner| {
            node.descendants()
                .iter()
                .any(|descendant| inner.matches(descendant))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    /// Ancestor steps first, the subject last.
    steps: Vec<Compound>,
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            bail!("empty selector");
        }

        let steps = split_compounds(trimmed)
            .and_then(|parts| parts.into_iter().map(parse_compound).collect())
            .with_context(|| format!("invalid selector '{trimmed}'"))?;

        Ok(Self {
            source: trimmed.to_string(),
            steps,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches<N: DomNode>(&self, node: &N) -> bool {
        let Some((subject, ancestors)) = self.steps.split_last() else {
            return false;
        };
        if !subject.matches(node) {
            return false;
        }

        // Descendant-only combinators, so greedy right-to-left matching is exact.
        let mut current = node.parent();
        for step in ancestors.iter().rev() {
            loop {
                let Some(candidate) = current else {
                    return false;
                };
                current = candidate.parent();
                if step.matches(&candidate) {
                    break;
                }
            }
        }
        true
    }

    fn subject(&self) -> Option<&Compound> {
        self.steps.last()
    }

    pub(crate) fn constrains_attribute(&self, name: &str) -> bool {
        self.subject()
            .map(|c| c.attrs.iter().any(|attr| attr.name == name))
            .unwrap_or(false)
    }

    pub(crate) fn constrains_class(&self) -> bool {
        self.subject().map(|c| !c.classes.is_empty()).unwrap_or(false)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for Selector {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Selector::parse(s)
    }
}

impl Serialize for Selector {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for Selector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Selector::parse(&raw).map_err(|err| de::Error::custom(format!("{err:#}")))
    }
}

fn split_compounds(source: &str) -> Result<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth: i32 = 0;
    let mut quote: Option<char> = None;
    let mut start: Option<usize> = None;

    for (idx, ch) in source.char_indices() {
        if let Some(open) = quote {
            if ch == open {
                quote = None;
            }
            continue;
        }
        if ch.is_whitespace() && depth == 0 {
            if let Some(begin) = start.take() {
                parts.push(&source[begin..idx]);
            }
            continue;
        }
        if start.is_none() {
            start = Some(idx);
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '[' | '(' => depth += 1,
            ']' | ')' => {
                depth -= 1;
                if depth < 0 {
                    bail!("unbalanced '{ch}' at offset {idx}");
                }
            }
            _ => {}
        }
    }

    if quote.is_some() {
        bail!("unterminated string");
    }
    if depth != 0 {
        bail!("unbalanced brackets");
    }
    if let Some(begin) = start {
        parts.push(&source[begin..]);
    }
    Ok(parts)
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        if !self.eat(expected) {
            bail!("expected '{expected}' at offset {}", self.pos);
        }
        Ok(())
    }

    fn ident(&mut self) -> Result<String> {
        let start = self.pos;
        while matches!(self.peek(), Some(ch) if is_ident_char(ch)) {
            self.bump();
        }
        if self.pos == start {
            bail!("expected identifier at offset {start}");
        }
        Ok(self.src[start..self.pos].to_string())
    }

    fn value(&mut self) -> Result<String> {
        match self.peek() {
            Some(open @ ('"' | '\'')) => {
                self.bump();
                let start = self.pos;
                loop {
                    match self.bump() {
                        Some(ch) if ch == open => break,
                        Some(_) => {}
                        None => bail!("unterminated string"),
                    }
                }
                Ok(self.src[start..self.pos - open.len_utf8()].to_string())
            }
            _ => self.ident(),
        }
    }

    fn until_closing_paren(&mut self) -> Result<&'a str> {
        let start = self.pos;
        let mut depth = 1;
        loop {
            match self.bump() {
                Some('(') => depth += 1,
                Some(')') => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(&self.src[start..self.pos - 1]);
                    }
                }
                Some(_) => {}
                None => bail!("unterminated ':has('"),
            }
        }
    }
}

fn parse_compound(part: &str) -> Result<Compound> {
    let mut cursor = Cursor::new(part);
    let mut compound = Compound::default();

    if !cursor.eat('*') && matches!(cursor.peek(), Some(ch) if is_ident_char(ch)) {
        compound.tag = Some(cursor.ident()?.to_ascii_lowercase());
    }

    while let Some(ch) = cursor.bump() {
        match ch {
            '#' => compound.id = Some(cursor.ident()?),
            '.' => compound.classes.push(cursor.ident()?),
            '[' => compound.attrs.push(parse_attr(&mut cursor)?),
            ':' => {
                let name = cursor.ident()?;
                if name != "has" {
                    bail!("unsupported pseudo-class ':{name}'");
                }
                cursor.expect('(')?;
                let inner = cursor.until_closing_paren()?;
                compound.has.push(Selector::parse(inner)?);
            }
            other => bail!("unexpected '{other}' in '{part}'"),
        }
    }

    Ok(compound)
}

fn parse_attr(cursor: &mut Cursor<'_>) -> Result<AttrMatch> {
    let name = cursor.ident()?.to_ascii_lowercase();
    let kind = match cursor.bump() {
        Some(']') => {
            return Ok(AttrMatch {
                name,
                op: AttrOp::Exists,
            })
        }
        Some('=') => '=',
        Some(ch @ ('*' | '^' | '$')) => {
            cursor.expect('=')?;
            ch
        }
        Some(other) => bail!("unexpected '{other}' in attribute '{name}'"),
        None => bail!("unterminated attribute '{name}'"),
    };

    let value = cursor.value()?;
    cursor.expect(']')?;

    let op = match kind {
        '*' => AttrOp::Contains(value),
        '^' => AttrOp::Prefix(value),
        '$' => AttrOp::Suffix(value),
        _ => AttrOp::Equals(value),
    };
    Ok(AttrMatch { name, op })
}
