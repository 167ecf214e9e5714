//! Boolean tag filters for selecting test cases
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or      := and (("|" | "or") and)*
//! and     := unary (("&" | "and") unary)*
//! unary   := ("!" | "not") unary | primary
//! primary := "(" or ")" | TAG
//! ```
//!
//! An empty expression selects every test case.

use std::fmt;
use std::str::FromStr;

/// Tag filter parse errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("Unexpected end of filter expression")]
    UnexpectedEnd,

    #[error("Unexpected \"{token}\" at position {position} in filter expression")]
    UnexpectedToken { token: String, position: usize },
}

/// Parsed tag filter
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TagFilter {
    #[default]
    All,
    Tag(String),
    Not(Box<TagFilter>),
    And(Box<TagFilter>, Box<TagFilter>),
    Or(Box<TagFilter>, Box<TagFilter>),
}

impl TagFilter {
    pub fn parse(text: &str) -> Result<Self, FilterError> {
        let tokens = tokenize(text)?;
        if tokens.is_empty() {
            return Ok(TagFilter::All);
        }

        let mut parser = Parser { tokens, next: 0 };
        let filter = parser.or()?;
        match parser.peek() {
            None => Ok(filter),
            Some(token) => Err(token.unexpected()),
        }
    }

    pub fn matches<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        match self {
            TagFilter::All => true,
            TagFilter::Tag(tag) => tags.iter().any(|t| t.as_ref() == tag),
            TagFilter::Not(inner) => !inner.matches(tags),
            TagFilter::And(left, right) => left.matches(tags) && right.matches(tags),
            TagFilter::Or(left, right) => left.matches(tags) || right.matches(tags),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, TagFilter::All)
    }
}

impl FromStr for TagFilter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TagFilter::parse(s)
    }
}

impl fmt::Display for TagFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagFilter::All => f.write_str("*"),
            TagFilter::Tag(tag) => f.write_str(tag),
            TagFilter::Not(inner) => write!(f, "!{}", inner),
            TagFilter::And(left, right) => write!(f, "({} & {})", left, right),
            TagFilter::Or(left, right) => write!(f, "({} | {})", left, right),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    And,
    Or,
    Not,
    Open,
    Close,
    Tag(String),
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    text: String,
    position: usize,
}

impl Token {
    fn unexpected(&self) -> FilterError {
        FilterError::UnexpectedToken {
            token: self.text.clone(),
            position: self.position,
        }
    }
}

fn is_tag_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '/')
}

fn tokenize(text: &str) -> Result<Vec<Token>, FilterError> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(position, c)) = chars.peek() {
        let symbol = match c {
            '&' => Some(TokenKind::And),
            '|' => Some(TokenKind::Or),
            '!' => Some(TokenKind::Not),
            '(' => Some(TokenKind::Open),
            ')' => Some(TokenKind::Close),
            _ => None,
        };

        if c.is_whitespace() {
            chars.next();
        } else if let Some(kind) = symbol {
            chars.next();
            tokens.push(Token {
                kind,
                text: c.to_string(),
                position,
            });
        } else if is_tag_char(c) {
            let mut word = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if !is_tag_char(c) {
                    break;
                }
                word.push(c);
                chars.next();
            }
            let kind = match word.as_str() {
                "and" => TokenKind::And,
                "or" => TokenKind::Or,
                "not" => TokenKind::Not,
                _ => TokenKind::Tag(word.clone()),
            };
            tokens.push(Token {
                kind,
                text: word,
                position,
            });
        } else {
            return Err(FilterError::UnexpectedToken {
                token: c.to_string(),
                position,
            });
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    next: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.next)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.next).cloned();
        self.next += 1;
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek().is_some_and(|t| &t.kind == kind) {
            self.next += 1;
            true
        } else {
            false
        }
    }

    fn or(&mut self) -> Result<TagFilter, FilterError> {
        let mut left = self.and()?;
        while self.eat(&TokenKind::Or) {
            let right = self.and()?;
            left = TagFilter::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<TagFilter, FilterError> {
        let mut left = self.unary()?;
        while self.eat(&TokenKind::And) {
            let right = self.unary()?;
            left = TagFilter::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<TagFilter, FilterError> {
        if self.eat(&TokenKind::Not) {
            return Ok(TagFilter::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<TagFilter, FilterError> {
        let token = self.advance().ok_or(FilterError::UnexpectedEnd)?;
        match token.kind {
            TokenKind::Tag(tag) => Ok(TagFilter::Tag(tag)),
            TokenKind::Open => {
                let inner = self.or()?;
                match self.advance() {
                    Some(Token {
                        kind: TokenKind::Close,
                        ..
                    }) => Ok(inner),
                    Some(token) => Err(token.unexpected()),
                    None => Err(FilterError::UnexpectedEnd),
                }
            }
            _ => Err(token.unexpected()),
        }
    }
}
