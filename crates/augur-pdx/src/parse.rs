//! Parser for the plaintext save grammar.
//!
//! ```text
//! document := body EOF
//! body     := ( key '=' value | value )*
//! value    := word | quoted | '{' body '}'
//! ```
//!
//! A block is an object if any `key = value` pair occurred in it and a list
//! otherwise. The decision is made at the closing brace, so the parser needs
//! only one token of lookahead (to see whether a word is followed by `=`).
//! Open blocks are kept on a heap stack rather than the call stack.

use std::fmt;

use thiserror::Error;

use crate::value::{Object, Scalar, Value};

/// Deepest block nesting accepted before parsing fails.
pub const MAX_DEPTH: usize = 512;

// ─── Errors ──────────────────────────────────────────────────────────────────

/// A location in the source text. `line` and `column` are 1-based; columns
/// count characters, `offset` counts bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
  pub offset: usize,
  pub line:   usize,
  pub column: usize,
}

impl Position {
  const START: Self = Self { offset: 0, line: 1, column: 1 };
}

impl fmt::Display for Position {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "line {}, column {}", self.line, self.column)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{position}: expected {expected}, found {found}")]
pub struct ParseError {
  pub position: Position,
  pub expected: String,
  pub found:    String,
}

impl ParseError {
  fn new(
    position: Position,
    expected: impl Into<String>,
    found: impl Into<String>,
  ) -> Self {
    Self { position, expected: expected.into(), found: found.into() }
  }
}

// ─── Lexer ───────────────────────────────────────────────────────────────────

enum TokenKind<'a> {
  Word(&'a str),
  Quoted(String),
  Open,
  Close,
  Equals,
  Eof,
}

impl TokenKind<'_> {
  fn describe(&self) -> String {
    match self {
      Self::Word(w) => format!("`{w}`"),
      Self::Quoted(_) => "a quoted string".to_string(),
      Self::Open => "`{`".to_string(),
      Self::Close => "`}`".to_string(),
      Self::Equals => "`=`".to_string(),
      Self::Eof => "end of input".to_string(),
    }
  }
}

struct Token<'a> {
  kind: TokenKind<'a>,
  pos:  Position,
}

pub(crate) fn is_delimiter(b: u8) -> bool {
  b.is_ascii_whitespace() || matches!(b, b'{' | b'}' | b'=' | b'"' | b'#')
}

struct Lexer<'a> {
  src: &'a str,
  pos: Position,
}

impl<'a> Lexer<'a> {
  fn new(src: &'a str) -> Self { Self { src, pos: Position::START } }

  fn peek_byte(&self) -> Option<u8> {
    self.src.as_bytes().get(self.pos.offset).copied()
  }

  fn bump(&mut self) -> Option<u8> {
    let b = self.peek_byte()?;
    self.pos.offset += 1;
    if b == b'\n' {
      self.pos.line += 1;
      self.pos.column = 1;
    } else if b & 0xC0 != 0x80 {
      // Continuation bytes of a multi-byte character do not advance the column.
      self.pos.column += 1;
    }
    Some(b)
  }

  fn skip_trivia(&mut self) {
    while let Some(b) = self.peek_byte() {
      if b == b'#' {
        while self.peek_byte().is_some_and(|b| b != b'\n') {
          self.bump();
        }
      } else if b.is_ascii_whitespace() {
        self.bump();
      } else {
        break;
      }
    }
  }

  fn next(&mut self) -> Result<Token<'a>, ParseError> {
    self.skip_trivia();
    let start = self.pos;
    let Some(b) = self.bump() else {
      return Ok(Token { kind: TokenKind::Eof, pos: start });
    };
    let kind = match b {
      b'{' => TokenKind::Open,
      b'}' => TokenKind::Close,
      b'=' => TokenKind::Equals,
      b'"' => TokenKind::Quoted(self.quoted(start)?),
      _ => {
        while self.peek_byte().is_some_and(|b| !is_delimiter(b)) {
          self.bump();
        }
        TokenKind::Word(&self.src[start.offset..self.pos.offset])
      }
    };
    Ok(Token { kind, pos: start })
  }

  /// Body of a quoted string; the opening quote is already consumed.
  fn quoted(&mut self, start: Position) -> Result<String, ParseError> {
    let mut buf: Vec<u8> = Vec::new();
    loop {
      match self.bump() {
        None => {
          return Err(ParseError::new(
            start,
            "closing `\"` for the string opened here",
            "end of input",
          ));
        }
        Some(b'"') => break,
        Some(b'\\') => match self.bump() {
          Some(b'"') => buf.push(b'"'),
          Some(b'\\') => buf.push(b'\\'),
          Some(b'n') => buf.push(b'\n'),
          Some(b't') => buf.push(b'\t'),
          Some(other) => buf.extend_from_slice(&[b'\\', other]),
          None => buf.push(b'\\'),
        },
        Some(b) => buf.push(b),
      }
    }
    // Only ASCII bytes were rewritten, so the buffer is still valid UTF-8.
    Ok(
      String::from_utf8(buf)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()),
    )
  }
}

// ─── Scalars ─────────────────────────────────────────────────────────────────

/// `[+-]?digits(.digits)?`
fn is_number(word: &str) -> bool {
  let unsigned = word.strip_prefix(['+', '-']).unwrap_or(word);
  let (int, frac) = match unsigned.split_once('.') {
    Some((int, frac)) => (int, Some(frac)),
    None => (unsigned, None),
  };
  let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
  all_digits(int) && frac.is_none_or(all_digits)
}

fn scalar_from_word(word: &str) -> Scalar {
  match word {
    "yes" => return Scalar::Bool(true),
    "no" => return Scalar::Bool(false),
    _ => {}
  }
  if is_number(word) {
    if !word.contains('.')
      && let Ok(n) = word.parse::<i64>()
    {
      return Scalar::Int(n);
    }
    if let Ok(f) = word.parse::<f64>() {
      return Scalar::Float(f);
    }
  }
  Scalar::Str(word.to_string())
}

// ─── Parser ──────────────────────────────────────────────────────────────────

/// A block whose closing brace has not been seen yet.
struct Frame {
  /// `None` for the document itself.
  open:    Option<Position>,
  entries: Vec<(String, Value)>,
  items:   Vec<Value>,
  /// Key whose `=` has been consumed and whose value is still to come.
  key:     Option<String>,
}

impl Frame {
  fn new(open: Option<Position>) -> Self {
    Self { open, entries: Vec::new(), items: Vec::new(), key: None }
  }

  fn push(&mut self, value: Value) {
    match self.key.take() {
      Some(key) => self.entries.push((key, value)),
      None => self.items.push(value),
    }
  }

  fn finish(self) -> Value {
    if self.open.is_none() || !self.entries.is_empty() {
      Value::Object(Object { entries: self.entries, items: self.items })
    } else {
      Value::List(self.items)
    }
  }
}

struct Parser<'a> {
  lexer:  Lexer<'a>,
  peeked: Option<Token<'a>>,
}

impl<'a> Parser<'a> {
  fn next_token(&mut self) -> Result<Token<'a>, ParseError> {
    match self.peeked.take() {
      Some(token) => Ok(token),
      None => self.lexer.next(),
    }
  }

  fn peek_is_equals(&mut self) -> Result<bool, ParseError> {
    let token = self.next_token()?;
    let is_equals = matches!(token.kind, TokenKind::Equals);
    self.peeked = Some(token);
    Ok(is_equals)
  }

  /// Consume `=` if `key` is followed by one. The value arrives with the
  /// next token.
  fn take_key(&mut self, frame: &mut Frame, key: &str) -> Result<bool, ParseError> {
    if frame.key.is_some() || !self.peek_is_equals()? {
      return Ok(false);
    }
    self.next_token()?;
    frame.key = Some(key.to_string());
    Ok(true)
  }

  /// Parse the whole document. Open blocks live on an explicit stack, so
  /// nesting costs heap rather than call stack.
  fn document(&mut self) -> Result<Value, ParseError> {
    let mut stack: Vec<Frame> = Vec::new();
    let mut frame = Frame::new(None);

    loop {
      let token = self.next_token()?;
      let value = match token.kind {
        TokenKind::Word(word) => {
          if self.take_key(&mut frame, word)? {
            continue;
          }
          Value::Scalar(scalar_from_word(word))
        }
        TokenKind::Quoted(text) => {
          if self.take_key(&mut frame, &text)? {
            continue;
          }
          Value::Scalar(Scalar::Str(text))
        }
        TokenKind::Open => {
          if stack.len() >= MAX_DEPTH {
            return Err(ParseError::new(
              token.pos,
              format!("at most {MAX_DEPTH} nested blocks"),
              "`{`",
            ));
          }
          let parent = std::mem::replace(&mut frame, Frame::new(Some(token.pos)));
          stack.push(parent);
          continue;
        }
        other if frame.key.is_some() => {
          return Err(ParseError::new(
            token.pos,
            "a value after `=`",
            other.describe(),
          ));
        }
        TokenKind::Equals => {
          return Err(ParseError::new(token.pos, "a key or a value", "`=`"));
        }
        TokenKind::Close => {
          let Some(parent) = stack.pop() else {
            return Err(ParseError::new(
              token.pos,
              "a key, a value or end of input",
              "`}` without a matching `{`",
            ));
          };
          std::mem::replace(&mut frame, parent).finish()
        }
        TokenKind::Eof => match frame.open {
          None => return Ok(frame.finish()),
          Some(at) => {
            return Err(ParseError::new(
              token.pos,
              format!("`}}` closing the block opened at {at}"),
              "end of input",
            ));
          }
        },
      };
      frame.push(value);
    }
  }
}

/// Parse a whole snapshot into its root object.
pub fn parse(text: &str) -> Result<Value, ParseError> {
  let mut parser = Parser { lexer: Lexer::new(text), peeked: None };
  parser.document()
}
