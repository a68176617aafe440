//! Selector grammar for rule selectors
//!
//! Rules carry their target as a CSS selector string. Before a selector is
//! trusted it is parsed into this module's AST, which supports exactly the
//! grammar the synthesizer can emit plus what preset lists need: compound
//! selectors built from a tag, `#id`, `.class`, `[attr]` / `[attr="value"]`
//! and `:nth-of-type(n)`, joined by descendant and child combinators, with
//! comma-separated lists at the top level.
//!
//! Anything outside that grammar is rejected. The applicator treats a parse
//! failure as a skip-and-log condition, never as a reason to touch the DOM.

use core::fmt;

// =============================================================================
// Errors
// =============================================================================

/// Error type for selector parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },
    #[error("expected identifier at position {0}")]
    ExpectedIdent(usize),
    #[error("unclosed attribute selector")]
    UnclosedAttribute,
    #[error("unsupported pseudo-class ':{0}'")]
    UnsupportedPseudo(String),
    #[error("nth-of-type index must be 1 or greater")]
    ZeroNth,
    #[error("combinator without a following selector")]
    DanglingCombinator,
}

// =============================================================================
// AST
// =============================================================================

/// A comma-separated selector list: `div.ad, aside > .banner`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    pub selectors: Vec<ComplexSelector>,
}

/// Combinator between two compound selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// Whitespace: any ancestor.
    Descendant,
    /// `>`: direct parent.
    Child,
}

/// One complex selector: a chain of compounds joined by combinators,
/// leftmost compound first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexSelector {
    pub first: CompoundSelector,
    pub rest: Vec<(Combinator, CompoundSelector)>,
}

impl ComplexSelector {
    /// The rightmost compound - the elements this selector actually targets.
    pub fn target(&self) -> &CompoundSelector {
        self.rest.last().map_or(&self.first, |(_, c)| c)
    }

    /// All compounds, left to right.
    pub fn compounds(&self) -> impl Iterator<Item = &CompoundSelector> {
        core::iter::once(&self.first).chain(self.rest.iter().map(|(_, c)| c))
    }
}

/// One compound selector: `div.ad[data-testid="promo"]:nth-of-type(2)`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompoundSelector {
    /// Lowercased tag name, or None for `*` / tagless compounds.
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attrs: Vec<AttrSelector>,
    /// 1-based index among same-tag siblings.
    pub nth_of_type: Option<u32>,
}

/// `[name]` or `[name="value"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrSelector {
    pub name: String,
    pub value: Option<String>,
}

impl SelectorList {
    /// Parse a selector string into its AST.
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        Parser::new(input).parse_list()
    }

    /// Quick syntactic validity check.
    pub fn is_valid(input: &str) -> bool {
        Self::parse(input).is_ok()
    }

    /// If any compound anywhere in the list targets protected page
    /// structure (`body`, `html`, `main`, `[role="main"]`), return the
    /// offending denylist entry.
    pub fn targets_protected(&self) -> Option<&'static str> {
        for complex in &self.selectors {
            for compound in complex.compounds() {
                if let Some(tag) = compound.tag.as_deref() {
                    match tag {
                        "body" => return Some("body"),
                        "html" => return Some("html"),
                        "main" => return Some("main"),
                        _ => {}
                    }
                }
                for attr in &compound.attrs {
                    if attr.name == "role" && attr.value.as_deref() == Some("main") {
                        return Some("[role=\"main\"]");
                    }
                }
            }
        }
        None
    }
}

// =============================================================================
// Display (canonical re-serialization)
// =============================================================================

impl fmt::Display for SelectorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, complex) in self.selectors.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{complex}")?;
        }
        Ok(())
    }
}

impl fmt::Display for ComplexSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.first)?;
        for (combinator, compound) in &self.rest {
            match combinator {
                Combinator::Descendant => f.write_str(" ")?,
                Combinator::Child => f.write_str(" > ")?,
            }
            write!(f, "{compound}")?;
        }
        Ok(())
    }
}

impl fmt::Display for CompoundSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => f.write_str(tag)?,
            None if self.is_bare() => f.write_str("*")?,
            None => {}
        }
        if let Some(id) = &self.id {
            write!(f, "#{id}")?;
        }
        for class in &self.classes {
            write!(f, ".{class}")?;
        }
        for attr in &self.attrs {
            match &attr.value {
                Some(value) => write!(f, "[{}=\"{}\"]", attr.name, value)?,
                None => write!(f, "[{}]", attr.name)?,
            }
        }
        if let Some(n) = self.nth_of_type {
            write!(f, ":nth-of-type({n})")?;
        }
        Ok(())
    }
}

impl CompoundSelector {
    fn is_bare(&self) -> bool {
        self.id.is_none()
            && self.classes.is_empty()
            && self.attrs.is_empty()
            && self.nth_of_type.is_none()
    }
}

// =============================================================================
// Parser
// =============================================================================

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse_list(mut self) -> Result<SelectorList, SelectorError> {
        let mut selectors = Vec::new();
        loop {
            self.skip_ws();
            selectors.push(self.parse_complex()?);
            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(ch) => {
                    return Err(SelectorError::UnexpectedChar { ch, pos: self.pos });
                }
                None => break,
            }
        }
        Ok(SelectorList { selectors })
    }

    fn parse_complex(&mut self) -> Result<ComplexSelector, SelectorError> {
        let first = self.parse_compound()?;
        let mut rest = Vec::new();

        loop {
            let had_ws = self.skip_ws();
            match self.peek() {
                Some('>') => {
                    self.bump();
                    self.skip_ws();
                    if !self.at_compound_start() {
                        return Err(SelectorError::DanglingCombinator);
                    }
                    rest.push((Combinator::Child, self.parse_compound()?));
                }
                Some(ch) if had_ws && ch != ',' => {
                    if !self.at_compound_start() {
                        return Err(SelectorError::UnexpectedChar { ch, pos: self.pos });
                    }
                    rest.push((Combinator::Descendant, self.parse_compound()?));
                }
                _ => break,
            }
        }

        Ok(ComplexSelector { first, rest })
    }

    fn parse_compound(&mut self) -> Result<CompoundSelector, SelectorError> {
        let mut compound = CompoundSelector::default();
        let start = self.pos;

        match self.peek() {
            Some('*') => {
                self.bump();
            }
            Some(ch) if is_ident_start(ch) => {
                compound.tag = Some(self.parse_ident()?.to_ascii_lowercase());
            }
            _ => {}
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.bump();
                    compound.id = Some(self.parse_ident()?);
                }
                Some('.') => {
                    self.bump();
                    compound.classes.push(self.parse_ident()?);
                }
                Some('[') => {
                    self.bump();
                    compound.attrs.push(self.parse_attr()?);
                }
                Some(':') => {
                    self.bump();
                    compound.nth_of_type = Some(self.parse_nth_of_type()?);
                }
                _ => break,
            }
        }

        if self.pos == start {
            if self.input.is_empty() || self.input.trim().is_empty() {
                return Err(SelectorError::Empty);
            }
            match self.peek() {
                Some(ch) => return Err(SelectorError::UnexpectedChar { ch, pos: self.pos }),
                None => return Err(SelectorError::Empty),
            }
        }

        Ok(compound)
    }

    fn parse_attr(&mut self) -> Result<AttrSelector, SelectorError> {
        self.skip_ws();
        let name = self.parse_ident()?;
        self.skip_ws();

        let value = match self.peek() {
            Some('=') => {
                self.bump();
                self.skip_ws();
                Some(self.parse_attr_value()?)
            }
            _ => None,
        };

        self.skip_ws();
        match self.peek() {
            Some(']') => {
                self.bump();
                Ok(AttrSelector { name, value })
            }
            _ => Err(SelectorError::UnclosedAttribute),
        }
    }

    fn parse_attr_value(&mut self) -> Result<String, SelectorError> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.bump();
                let start = self.pos;
                while let Some(ch) = self.peek() {
                    if ch == quote {
                        let value = self.input[start..self.pos].to_string();
                        self.bump();
                        return Ok(value);
                    }
                    self.bump();
                }
                Err(SelectorError::UnclosedAttribute)
            }
            Some(ch) if is_ident_char(ch) => self.parse_ident(),
            Some(ch) => Err(SelectorError::UnexpectedChar { ch, pos: self.pos }),
            None => Err(SelectorError::UnclosedAttribute),
        }
    }

    fn parse_nth_of_type(&mut self) -> Result<u32, SelectorError> {
        let name = self.parse_ident()?;
        if name != "nth-of-type" {
            return Err(SelectorError::UnsupportedPseudo(name));
        }
        match self.peek() {
            Some('(') => {
                self.bump();
            }
            _ => return Err(SelectorError::UnsupportedPseudo(name)),
        }

        let start = self.pos;
        while matches!(self.peek(), Some(ch) if ch.is_ascii_digit()) {
            self.bump();
        }
        if self.pos == start {
            return Err(SelectorError::ExpectedIdent(start));
        }
        let n: u32 = self.input[start..self.pos]
            .parse()
            .map_err(|_| SelectorError::ZeroNth)?;
        if n == 0 {
            return Err(SelectorError::ZeroNth);
        }

        match self.peek() {
            Some(')') => {
                self.bump();
                Ok(n)
            }
            Some(ch) => Err(SelectorError::UnexpectedChar { ch, pos: self.pos }),
            None => Err(SelectorError::UnsupportedPseudo("nth-of-type".to_string())),
        }
    }

    fn parse_ident(&mut self) -> Result<String, SelectorError> {
        let start = self.pos;
        match self.peek() {
            Some(ch) if is_ident_start(ch) => {
                while matches!(self.peek(), Some(ch) if is_ident_char(ch)) {
                    self.bump();
                }
                Ok(self.input[start..self.pos].to_string())
            }
            _ => Err(SelectorError::ExpectedIdent(start)),
        }
    }

    fn at_compound_start(&self) -> bool {
        matches!(
            self.peek(),
            Some('*' | '#' | '.' | '[' | ':') | Some('a'..='z' | 'A'..='Z' | '_' | '-')
        )
    }

    /// Skip whitespace; report whether any was consumed.
    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while matches!(self.peek(), Some(ch) if ch.is_ascii_whitespace()) {
            self.bump();
        }
        self.pos > start
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) {
        if let Some(ch) = self.peek() {
            self.pos += ch.len_utf8();
        }
    }
}

#[inline]
fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '-'
}

#[inline]
fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '-'
}
