//! Selector parsing and matching for hosts without a native `matches`.
//!
//! Supported grammar:
//! - selector lists: `a, b`
//! - compound selectors: `tag`, `*`, `#id`, `.class`, `[attr]`, `[attr=value]`,
//!   `[attr="value"]`
//! - combinators: descendant (whitespace) and child (`>`)
//!
//! Matching runs right-to-left: the rightmost compound is tested against the
//! element itself, the rest against its ancestors.

use compact_str::CompactString;
use smallvec::SmallVec;

use crate::error::DelegateError;

/// Read-only view of an element as seen by the selector matcher.
pub trait SelectorSubject: Sized {
    fn tag_name(&self) -> &str;

    fn element_id(&self) -> Option<&str>;

    fn has_class(&self, class: &str) -> bool;

    fn attribute(&self, name: &str) -> Option<&str>;

    fn parent_element(&self) -> Option<Self>;
}

/// Parsed selector list.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    source: CompactString,
    alternatives: SmallVec<[Complex; 1]>,
}

#[derive(Debug, Clone, PartialEq)]
struct Complex {
    compounds: SmallVec<[Compound; 4]>,
    // combinators[i] joins compounds[i] and compounds[i + 1]
    combinators: SmallVec<[Combinator; 3]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Compound {
    tag: Option<CompactString>,
    id: Option<CompactString>,
    classes: SmallVec<[CompactString; 2]>,
    attributes: SmallVec<[AttributeTest; 1]>,
}

#[derive(Debug, Clone, PartialEq)]
enum AttributeTest {
    Exists(CompactString),
    Equals(CompactString, CompactString),
}

impl Selector {
    /// Parse a selector list.
    pub fn parse(input: &str) -> Result<Self, DelegateError> {
        let mut parser = Parser::new(input);
        let alternatives = parser.parse_list()?;

        Ok(Self {
            source: CompactString::from(input.trim()),
            alternatives,
        })
    }

    /// Original selector text (trimmed).
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Test `element` against any alternative of the list.
    pub fn matches<S: SelectorSubject>(&self, element: &S) -> bool {
        self.alternatives
            .iter()
            .any(|complex: &Complex| complex.matches(element))
    }
}

impl Complex {
    fn matches<S: SelectorSubject>(&self, element: &S) -> bool {
        let last = self.compounds.len() - 1;

        self.compounds[last].matches(element) && self.matches_leftwards(last, element)
    }

    /// `compounds[index]` already matched `element`; check everything to its left.
    fn matches_leftwards<S: SelectorSubject>(&self, index: usize, element: &S) -> bool {
        if index == 0 {
            return true;
        }

        let previous = &self.compounds[index - 1];

        match self.combinators[index - 1] {
            Combinator::Child => element.parent_element().is_some_and(|parent: S| {
                previous.matches(&parent) && self.matches_leftwards(index - 1, &parent)
            }),

            Combinator::Descendant => {
                let mut current = element.parent_element();

                while let Some(ancestor) = current {
                    if previous.matches(&ancestor) && self.matches_leftwards(index - 1, &ancestor)
                    {
                        return true;
                    }
                    current = ancestor.parent_element();
                }

                false
            }
        }
    }
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none()
            && self.id.is_none()
            && self.classes.is_empty()
            && self.attributes.is_empty()
    }

    fn matches<S: SelectorSubject>(&self, element: &S) -> bool {
        if let Some(tag) = &self.tag
            && !element.tag_name().eq_ignore_ascii_case(tag.as_str())
        {
            return false;
        }

        if let Some(id) = &self.id
            && element.element_id() != Some(id.as_str())
        {
            return false;
        }

        if !self
            .classes
            .iter()
            .all(|class: &CompactString| element.has_class(class))
        {
            return false;
        }

        self.attributes.iter().all(|test: &AttributeTest| match test {
            AttributeTest::Exists(name) => element.attribute(name).is_some(),
            AttributeTest::Equals(name, value) => element.attribute(name) == Some(value.as_str()),
        })
    }
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: impl Into<String>) -> DelegateError {
        DelegateError::invalid_selector(self.source, reason)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    /// Returns whether any whitespace was consumed.
    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn parse_list(&mut self) -> Result<SmallVec<[Complex; 1]>, DelegateError> {
        let mut alternatives = SmallVec::new();

        loop {
            self.skip_whitespace();
            alternatives.push(self.parse_complex()?);
            self.skip_whitespace();

            match self.bump() {
                None => break,
                Some(',') => continue,
                Some(c) => return Err(self.error(format!("unexpected '{c}' at {}", self.pos - 1))),
            }
        }

        Ok(alternatives)
    }

    fn parse_complex(&mut self) -> Result<Complex, DelegateError> {
        let mut compounds: SmallVec<[Compound; 4]> = SmallVec::new();
        let mut combinators: SmallVec<[Combinator; 3]> = SmallVec::new();

        compounds.push(self.parse_compound()?);

        loop {
            let had_whitespace = self.skip_whitespace();

            let combinator = match self.peek() {
                None | Some(',') => break,
                Some('>') => {
                    self.bump();
                    self.skip_whitespace();
                    Combinator::Child
                }
                Some(_) if had_whitespace => Combinator::Descendant,
                Some(c) => return Err(self.error(format!("unexpected '{c}' at {}", self.pos))),
            };

            combinators.push(combinator);
            compounds.push(self.parse_compound()?);
        }

        Ok(Complex {
            compounds,
            combinators,
        })
    }

    fn parse_compound(&mut self) -> Result<Compound, DelegateError> {
        let mut compound = Compound::default();
        let mut universal = false;

        match self.peek() {
            Some('*') => {
                self.bump();
                universal = true;
            }
            Some(c) if is_ident_char(c) => {
                compound.tag = Some(self.parse_ident()?.to_ascii_lowercase().into());
            }
            _ => {}
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.bump();
                    if compound.id.is_some() {
                        return Err(self.error("more than one id in a compound selector"));
                    }
                    compound.id = Some(self.parse_ident()?);
                }
                Some('.') => {
                    self.bump();
                    compound.classes.push(self.parse_ident()?);
                }
                Some('[') => {
                    self.bump();
                    compound.attributes.push(self.parse_attribute()?);
                }
                _ => break,
            }
        }

        if compound.is_empty() && !universal {
            return Err(match self.peek() {
                Some(c) => self.error(format!("unexpected '{c}' at {}", self.pos)),
                None => self.error("expected a selector"),
            });
        }

        Ok(compound)
    }

    fn parse_ident(&mut self) -> Result<CompactString, DelegateError> {
        let mut ident = CompactString::default();

        while let Some(c) = self.peek() {
            if !is_ident_char(c) {
                break;
            }
            ident.push(c);
            self.pos += 1;
        }

        if ident.is_empty() {
            return Err(self.error(format!("expected a name at {}", self.pos)));
        }

        Ok(ident)
    }

    fn parse_attribute(&mut self) -> Result<AttributeTest, DelegateError> {
        self.skip_whitespace();
        let name = self.parse_ident()?;
        self.skip_whitespace();

        match self.bump() {
            Some(']') => Ok(AttributeTest::Exists(name)),
            Some('=') => {
                self.skip_whitespace();
                let value = match self.peek() {
                    Some(quote @ ('"' | '\'')) => {
                        self.bump();
                        self.parse_quoted(quote)?
                    }
                    _ => self.parse_ident()?,
                };
                self.skip_whitespace();

                match self.bump() {
                    Some(']') => Ok(AttributeTest::Equals(name, value)),
                    _ => Err(self.error("unterminated attribute selector")),
                }
            }
            _ => Err(self.error("unterminated attribute selector")),
        }
    }

    fn parse_quoted(&mut self, quote: char) -> Result<CompactString, DelegateError> {
        let mut value = CompactString::default();

        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(value),
                Some(c) => value.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}
