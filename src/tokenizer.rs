//! Lexical analysis: turns the raw input string into a vector of tokens.
//!
//! The tokenizer is intentionally tiny – it knows nothing about semantics
//! beyond recognising operators, keywords, identifiers and numeric literals.
//! Multi-character punctuators are matched before single-character ones to
//! avoid ambiguity.

use crate::error::{CompileError, CompileResult};

/// Reserved words. Everything else shaped like an identifier is an `Ident`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
  If,
  Else,
  Return,
}

impl Keyword {
  fn lookup(word: &str) -> Option<Self> {
    match word {
      "if" => Some(Self::If),
      "else" => Some(Self::Else),
      "return" => Some(Self::Return),
      _ => None,
    }
  }
}

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  Punctuator,
  Num(i64),
  Ident,
  Keyword(Keyword),
  Eof,
}

/// Thin wrapper for lexical information needed by later stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
  pub kind: TokenKind,
  pub loc: usize,
  pub len: usize,
}

impl Token {
  /// Convenience constructor to keep the `tokenize` loop readable.
  pub fn new(kind: TokenKind, loc: usize, len: usize) -> Self {
    Self { kind, loc, len }
  }
}

const TWO_CHAR_PUNCTUATORS: [&str; 4] = ["==", "!=", "<=", ">="];

fn is_ident_start(c: u8) -> bool {
  c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_continue(c: u8) -> bool {
  is_ident_start(c) || c.is_ascii_digit()
}

/// Lex the input into a flat vector of tokens terminated by an `Eof` marker.
pub fn tokenize(input: &str) -> CompileResult<Vec<Token>> {
  let mut tokens = Vec::new();
  let bytes = input.as_bytes();
  let mut i = 0;

  while i < bytes.len() {
    let c = bytes[i];
    if c.is_ascii_whitespace() {
      i += 1;
      continue;
    }

    if c.is_ascii_digit() {
      let start = i;
      i += 1;
      while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
      }
      let text = &input[start..i];
      let value = text
        .parse::<i64>()
        .map_err(|err| CompileError::lex_at(input, start, format!("invalid number: {err}")))?;
      tokens.push(Token::new(TokenKind::Num(value), start, i - start));
      continue;
    }

    if let Some(op) = TWO_CHAR_PUNCTUATORS
      .into_iter()
      .find(|op| input[i..].starts_with(op))
    {
      tokens.push(Token::new(TokenKind::Punctuator, i, op.len()));
      i += op.len();
      continue;
    }

    // A keyword only wins over an identifier when the whole maximal word
    // matches, so `returned` and `iffy` stay identifiers.
    if is_ident_start(c) {
      let start = i;
      i += 1;
      while i < bytes.len() && is_ident_continue(bytes[i]) {
        i += 1;
      }
      let kind = match Keyword::lookup(&input[start..i]) {
        Some(keyword) => TokenKind::Keyword(keyword),
        None => TokenKind::Ident,
      };
      tokens.push(Token::new(kind, start, i - start));
      continue;
    }

    if matches!(
      c,
      b'+' | b'-' | b'*' | b'/' | b'(' | b')' | b'<' | b'>' | b'=' | b';' | b'{' | b'}' | b','
    ) {
      tokens.push(Token::new(TokenKind::Punctuator, i, 1));
      i += 1;
      continue;
    }

    let invalid_char = input[i..].chars().next().unwrap_or('\0');
    return Err(CompileError::lex_at(
      input,
      i,
      format!("invalid token: '{invalid_char}'"),
    ));
  }

  tokens.push(Token::new(TokenKind::Eof, input.len(), 0));
  tracing::trace!(count = tokens.len(), "tokenized input");
  Ok(tokens)
}

/// Return the slice from the source that produced this token.
pub fn token_text<'a>(token: &Token, source: &'a str) -> &'a str {
  let end = token.loc + token.len;
  &source[token.loc..end]
}

/// Human-friendly description used in diagnostics.
pub fn describe_token(token: Option<&Token>, source: &str) -> String {
  match token {
    Some(t) => match t.kind {
      TokenKind::Eof => "EOF".to_string(),
      _ => token_text(t, source).to_string(),
    },
    None => "EOF".to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn texts(input: &str) -> Vec<&str> {
    tokenize(input)
      .unwrap()
      .iter()
      .map(|token| token_text(token, input))
      .collect()
  }

  #[test]
  fn splits_expression_into_punctuators_and_numbers() {
    let tokens = tokenize("12 + 3*(4)").unwrap();
    let kinds: Vec<_> = tokens.iter().map(|token| token.kind).collect();
    assert_eq!(
      kinds,
      vec![
        TokenKind::Num(12),
        TokenKind::Punctuator,
        TokenKind::Num(3),
        TokenKind::Punctuator,
        TokenKind::Punctuator,
        TokenKind::Num(4),
        TokenKind::Punctuator,
        TokenKind::Eof,
      ]
    );
    assert_eq!(tokens.last().unwrap().loc, 10);
  }

  #[test]
  fn two_character_operators_win() {
    let expected = vec![
      "a", "<=", "b", ">=", "c", "==", "d", "!=", "e", "<", "f", ">", "g", "=", "h", "",
    ];
    assert_eq!(texts("a<=b>=c==d!=e<f>g=h"), expected);
  }

  #[test]
  fn keywords_need_the_whole_word() {
    let tokens = tokenize("return returned if iffy else _x1").unwrap();
    let kinds: Vec<_> = tokens.iter().map(|token| token.kind).collect();
    assert_eq!(
      kinds,
      vec![
        TokenKind::Keyword(Keyword::Return),
        TokenKind::Ident,
        TokenKind::Keyword(Keyword::If),
        TokenKind::Ident,
        TokenKind::Keyword(Keyword::Else),
        TokenKind::Ident,
        TokenKind::Eof,
      ]
    );
  }

  #[test]
  fn return_glued_to_punctuation_is_a_keyword() {
    let tokens = tokenize("return(1);").unwrap();
    assert_eq!(tokens[0].kind, TokenKind::Keyword(Keyword::Return));
    assert_eq!(tokens[0].len, 6);
  }

  #[test]
  fn empty_input_is_just_eof() {
    let tokens = tokenize("   ").unwrap();
    assert_eq!(tokens, vec![Token::new(TokenKind::Eof, 3, 0)]);
  }

  #[test]
  fn rejects_unknown_character() {
    let err = tokenize("1 + @").unwrap_err();
    assert!(matches!(err, CompileError::Lex { .. }));
    assert_eq!(err.loc(), 4);
    assert_eq!(err.message(), "invalid token: '@'");
  }

  #[test]
  fn rejects_literal_that_overflows() {
    let err = tokenize("99999999999999999999").unwrap_err();
    assert!(matches!(err, CompileError::Lex { .. }));
    assert_eq!(err.loc(), 0);
  }

  #[test]
  fn describes_eof() {
    let tokens = tokenize("x").unwrap();
    assert_eq!(describe_token(tokens.get(0), "x"), "x");
    assert_eq!(describe_token(tokens.get(1), "x"), "EOF");
    assert_eq!(describe_token(None, "x"), "EOF");
  }
}
