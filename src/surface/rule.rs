//! Match rules: the small selector language used to address rendered elements.
//!
//! Supported grammar (a strict subset of CSS selectors):
//!
//! - selector lists separated by `,`
//! - descendant (whitespace) and child (`>`) combinators
//! - compounds of `tag`, `*`, `#id`, `.class`, `[attr]`, `[attr=v]`, `[attr^=v]`, `[attr*=v]`
//!   and `:nth-of-type(n)`
//!
//! Anything else is rejected at parse time so the resolver can treat it as "matches nothing".

use std::fmt;

use crate::foundation::core::NodeId;
use crate::foundation::error::{TileError, TileResult};
use crate::surface::Surface;

/// A parsed match rule together with its source text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchRule {
    source: String,
    alternatives: Vec<Complex>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Complex {
    // Left-to-right; `steps[0].0` is unused (always `Descendant`).
    steps: Vec<(Combinator, Compound)>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Compound {
    simples: Vec<Simple>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Simple {
    Universal,
    Tag(String),
    Id(String),
    Class(String),
    Attr { name: String, op: AttrOp },
    NthOfType(usize),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals(String),
    Prefix(String),
    Contains(String),
}

impl MatchRule {
    /// Parse a rule, rejecting unsupported or malformed syntax.
    pub fn parse(source: &str) -> TileResult<Self> {
        let mut parser = Parser {
            bytes: source.as_bytes(),
            index: 0,
        };
        let alternatives = parser.parse_list().map_err(|msg| {
            TileError::rule(format!("'{source}' at byte {}: {msg}", parser.index))
        })?;
        Ok(Self {
            source: source.to_string(),
            alternatives,
        })
    }

    /// The original rule text.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Test a single node against the rule.
    pub fn matches<S: Surface + ?Sized>(&self, surface: &S, node: NodeId) -> bool {
        self.alternatives
            .iter()
            .any(|complex| matches_complex(surface, node, &complex.steps))
    }
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn matches_complex<S: Surface + ?Sized>(
    surface: &S,
    node: NodeId,
    steps: &[(Combinator, Compound)],
) -> bool {
    let Some(((comb, last), rest)) = steps.split_last() else {
        return false;
    };
    if !matches_compound(surface, node, last) {
        return false;
    }
    if rest.is_empty() {
        return true;
    }
    match comb {
        Combinator::Child => surface
            .parent(node)
            .is_some_and(|p| matches_complex(surface, p, rest)),
        Combinator::Descendant => {
            let mut cur = surface.parent(node);
            while let Some(p) = cur {
                if matches_complex(surface, p, rest) {
                    return true;
                }
                cur = surface.parent(p);
            }
            false
        }
    }
}

fn matches_compound<S: Surface + ?Sized>(surface: &S, node: NodeId, compound: &Compound) -> bool {
    compound.simples.iter().all(|simple| match simple {
        Simple::Universal => true,
        Simple::Tag(tag) => surface.tag_name(node).is_some_and(|t| t == *tag),
        Simple::Id(id) => surface.attribute(node, "id").is_some_and(|v| v == *id),
        Simple::Class(class) => surface.has_class(node, class),
        Simple::Attr { name, op } => {
            let Some(value) = surface.attribute(node, name) else {
                return false;
            };
            match op {
                AttrOp::Exists => true,
                AttrOp::Equals(v) => value == *v,
                AttrOp::Prefix(v) => value.starts_with(v.as_str()),
                AttrOp::Contains(v) => value.contains(v.as_str()),
            }
        }
        Simple::NthOfType(n) => nth_of_type(surface, node) == Some(*n),
    })
}

/// 1-based position of `node` among its parent's children sharing its tag name.
pub(crate) fn nth_of_type<S: Surface + ?Sized>(surface: &S, node: NodeId) -> Option<usize> {
    let parent = surface.parent(node)?;
    let tag = surface.tag_name(node)?;
    let mut n = 0usize;
    for child in surface.children(parent) {
        if surface.tag_name(child).as_deref() == Some(tag.as_str()) {
            n += 1;
            if child == node {
                return Some(n);
            }
        }
    }
    None
}

struct Parser<'a> {
    bytes: &'a [u8],
    index: usize,
}

type ParseResult<T> = Result<T, &'static str>;

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.index).copied()
    }

    fn bump(&mut self) {
        self.index = self.index.saturating_add(1);
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.index;
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.bump();
        }
        self.index > start
    }

    fn parse_list(&mut self) -> ParseResult<Vec<Complex>> {
        let mut out = Vec::new();
        loop {
            self.skip_ws();
            out.push(self.parse_complex()?);
            self.skip_ws();
            match self.peek() {
                None => break,
                Some(b',') => self.bump(),
                Some(_) => return Err("unexpected character"),
            }
        }
        Ok(out)
    }

    fn parse_complex(&mut self) -> ParseResult<Complex> {
        let mut steps = vec![(Combinator::Descendant, self.parse_compound()?)];
        loop {
            let saw_ws = self.skip_ws();
            let comb = match self.peek() {
                None | Some(b',') => break,
                Some(b'>') => {
                    self.bump();
                    self.skip_ws();
                    Combinator::Child
                }
                Some(_) if saw_ws => Combinator::Descendant,
                Some(_) => return Err("unexpected character"),
            };
            if matches!(self.peek(), None | Some(b',')) {
                return Err("dangling combinator");
            }
            steps.push((comb, self.parse_compound()?));
        }
        Ok(Complex { steps })
    }

    fn parse_compound(&mut self) -> ParseResult<Compound> {
        let mut compound = Compound::default();
        match self.peek() {
            Some(b'*') => {
                self.bump();
                compound.simples.push(Simple::Universal);
            }
            Some(b) if is_ident_byte(b) => {
                compound
                    .simples
                    .push(Simple::Tag(self.ident()?.to_ascii_lowercase()));
            }
            _ => {}
        }
        loop {
            match self.peek() {
                Some(b'#') => {
                    self.bump();
                    compound.simples.push(Simple::Id(self.ident()?));
                }
                Some(b'.') => {
                    self.bump();
                    compound.simples.push(Simple::Class(self.ident()?));
                }
                Some(b'[') => {
                    self.bump();
                    compound.simples.push(self.attr()?);
                }
                Some(b':') => {
                    self.bump();
                    compound.simples.push(self.pseudo()?);
                }
                _ => break,
            }
        }
        if compound.simples.is_empty() {
            return Err("expected a selector");
        }
        Ok(compound)
    }

    fn ident(&mut self) -> ParseResult<String> {
        let start = self.index;
        while let Some(b) = self.peek() {
            if b == b'\\' {
                // Escaped byte: keep the next byte verbatim.
                self.bump();
                if self.peek().is_none() {
                    return Err("dangling escape");
                }
                self.bump();
            } else if is_ident_byte(b) || b >= 0x80 {
                self.bump();
            } else {
                break;
            }
        }
        if self.index == start {
            return Err("expected an identifier");
        }
        let raw = std::str::from_utf8(&self.bytes[start..self.index]).map_err(|_| "invalid utf-8")?;
        Ok(unescape(raw))
    }

    fn attr(&mut self) -> ParseResult<Simple> {
        self.skip_ws();
        let name = self.ident()?.to_ascii_lowercase();
        self.skip_ws();
        let op = match self.peek() {
            Some(b']') => {
                self.bump();
                return Ok(Simple::Attr {
                    name,
                    op: AttrOp::Exists,
                });
            }
            Some(b'=') => {
                self.bump();
                0u8
            }
            Some(op @ (b'^' | b'*')) => {
                self.bump();
                if self.peek() != Some(b'=') {
                    return Err("expected '='");
                }
                self.bump();
                op
            }
            _ => return Err("unsupported attribute operator"),
        };
        self.skip_ws();
        let value = match self.peek() {
            Some(q @ (b'"' | b'\'')) => self.quoted(q)?,
            Some(_) => self.ident()?,
            None => return Err("unterminated attribute selector"),
        };
        self.skip_ws();
        if self.peek() != Some(b']') {
            return Err("unterminated attribute selector");
        }
        self.bump();
        let op = match op {
            b'^' => AttrOp::Prefix(value),
            b'*' => AttrOp::Contains(value),
            _ => AttrOp::Equals(value),
        };
        Ok(Simple::Attr { name, op })
    }

    fn quoted(&mut self, quote: u8) -> ParseResult<String> {
        self.bump();
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None => return Err("unterminated string"),
                Some(b'\\') => {
                    self.bump();
                    let Some(b) = self.peek() else {
                        return Err("unterminated string");
                    };
                    out.push(b);
                    self.bump();
                }
                Some(b) if b == quote => {
                    self.bump();
                    break;
                }
                Some(b) => {
                    out.push(b);
                    self.bump();
                }
            }
        }
        String::from_utf8(out).map_err(|_| "invalid utf-8")
    }

    fn pseudo(&mut self) -> ParseResult<Simple> {
        let name = self.ident()?.to_ascii_lowercase();
        if name != "nth-of-type" {
            return Err("unsupported pseudo-class");
        }
        if self.peek() != Some(b'(') {
            return Err("expected '('");
        }
        self.bump();
        self.skip_ws();
        let start = self.index;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.bump();
        }
        let digits = std::str::from_utf8(&self.bytes[start..self.index]).unwrap_or_default();
        let n: usize = digits.parse().map_err(|_| "expected an index")?;
        if n == 0 {
            return Err("nth-of-type index is 1-based");
        }
        self.skip_ws();
        if self.peek() != Some(b')') {
            return Err("expected ')'");
        }
        self.bump();
        Ok(Simple::NthOfType(n))
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Quote a value for use inside a double-quoted attribute selector.
pub fn escape_attr_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Escape an identifier (id or class) for use in a rule.
pub fn escape_ident(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii() {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/surface/rule.rs"]
mod tests;
