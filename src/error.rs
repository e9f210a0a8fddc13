//! Shared error utilities used across the compilation pipeline.
//!
//! Diagnostics follow the chibicc style: the quoted input on one line and a
//! caret under the offending byte on the next.

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
pub enum CompileError {
  /// The tokenizer met a character (or literal) it cannot classify.
  #[snafu(display("{expr_line}\n{marker} {message}"))]
  Lex {
    loc: usize,
    expr_line: String,
    marker: String,
    message: String,
  },
  /// The token stream does not match the grammar.
  #[snafu(display("{expr_line}\n{marker} {message}"))]
  Parse {
    loc: usize,
    expr_line: String,
    marker: String,
    message: String,
  },
}

impl CompileError {
  /// Construct a lexical error anchored at a byte offset in the source.
  pub fn lex_at(expr: &str, loc: usize, message: impl Into<String>) -> Self {
    let (expr_line, marker) = render(expr, loc);
    Self::Lex {
      loc,
      expr_line,
      marker,
      message: message.into(),
    }
  }

  /// Construct a syntax error anchored at a byte offset in the source.
  pub fn parse_at(expr: &str, loc: usize, message: impl Into<String>) -> Self {
    let (expr_line, marker) = render(expr, loc);
    Self::Parse {
      loc,
      expr_line,
      marker,
      message: message.into(),
    }
  }

  /// Byte offset of the offending input.
  pub fn loc(&self) -> usize {
    match self {
      Self::Lex { loc, .. } | Self::Parse { loc, .. } => *loc,
    }
  }

  /// The bare message, without the rendered source line.
  pub fn message(&self) -> &str {
    match self {
      Self::Lex { message, .. } | Self::Parse { message, .. } => message,
    }
  }
}

fn render(expr: &str, loc: usize) -> (String, String) {
  let expr_line = format!("'{expr}'");
  let mut safe_loc = loc.min(expr.len());
  while !expr.is_char_boundary(safe_loc) {
    safe_loc -= 1;
  }
  let char_offset = expr[..safe_loc].chars().count() + 1; // account for opening quote
  let marker = format!("{}^", " ".repeat(char_offset));
  (expr_line, marker)
}
