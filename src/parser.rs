//! Recursive-descent parser producing one function per top-level construct.
//!
//! The parser mirrors the classic chibicc structure: a ladder of
//! precedence helpers for expressions with a thin statement layer on top.
//! Variables need no declaration; the first time a name appears inside a
//! function it is given the next free slot in that function's frame.
//!
//! ```text
//! program    := (function | stmt)*
//! function   := ident "(" (ident ("," ident)*)? ")" "{" stmt* "}"
//! stmt       := "return" expr ";"
//!             | "if" "(" expr ")" stmt ("else" stmt)?
//!             | "{" stmt* "}"
//!             | expr ";"
//! expr       := assign
//! assign     := equality ("=" assign)?
//! equality   := relational ("==" relational | "!=" relational)*
//! relational := add ("<" add | "<=" add | ">" add | ">=" add)*
//! add        := mul ("+" mul | "-" mul)*
//! mul        := unary ("*" unary | "/" unary)*
//! unary      := ("+" | "-")? primary
//! primary    := "(" expr ")" | ident ("(" args ")")? | num
//! ```
//!
//! Statements written outside any function make up the body of an implicit
//! `main`, which is emitted after the explicit functions.

use std::mem;

use crate::ast::{AstNode, BinaryOp, Function, Program};
use crate::codegen::is_register_name;
use crate::error::{CompileError, CompileResult};
use crate::frame::FrameMap;
use crate::tokenizer::{Keyword, Token, TokenKind, describe_token, token_text};

/// Registers available for passing arguments bound both calls and definitions.
pub const MAX_ARGS: usize = 6;

/// Name given to the function assembled from top-level statements.
pub const IMPLICIT_ENTRY: &str = "main";

/// Parse a whole translation unit from the token stream.
pub fn parse(tokens: Vec<Token>, source: &str) -> CompileResult<Program> {
  let mut parser = Parser {
    stream: TokenStream::new(tokens, source),
    frame: FrameMap::new(),
  };

  if parser.stream.is_eof() {
    return Err(CompileError::parse_at(source, 0, "program is empty"));
  }

  let program = parser.parse_program()?;
  tracing::debug!(functions = program.functions.len(), "parsed program");
  Ok(program)
}

struct Parser<'a> {
  stream: TokenStream<'a>,
  /// Frame of the function currently being parsed. At top level this is the
  /// frame of the implicit entry point.
  frame: FrameMap,
}

impl<'a> Parser<'a> {
  fn error_at(&self, loc: usize, message: impl Into<String>) -> CompileError {
    CompileError::parse_at(self.stream.source, loc, message)
  }

  fn parse_program(&mut self) -> CompileResult<Program> {
    let mut functions: Vec<Function> = Vec::new();
    let mut top_level = Vec::new();
    let mut top_level_loc = None;

    while !self.stream.is_eof() {
      if self.stream.at_function_def() {
        let loc = self.stream.loc();
        let function = self.parse_function()?;
        if functions.iter().any(|f| f.name == function.name) {
          let message = format!("redefinition of function '{}'", function.name);
          return Err(self.error_at(loc, message));
        }
        functions.push(function);
        continue;
      }

      if top_level_loc.is_none() {
        top_level_loc = Some(self.stream.loc());
      }
      top_level.push(self.parse_stmt()?);
    }

    if let Some(loc) = top_level_loc {
      if functions.iter().any(|f| f.name == IMPLICIT_ENTRY) {
        return Err(self.error_at(
          loc,
          format!("top-level statements conflict with an explicit '{IMPLICIT_ENTRY}'"),
        ));
      }
      functions.push(Function {
        name: IMPLICIT_ENTRY.to_string(),
        params: Vec::new(),
        body: top_level,
        frame: mem::take(&mut self.frame),
      });
    }

    Ok(Program { functions })
  }

  fn parse_function(&mut self) -> CompileResult<Function> {
    let (name, loc) = self.stream.get_ident()?;
    self.check_function_name(name, loc)?;
    self.stream.skip("(")?;

    let mut params: Vec<String> = Vec::new();
    if !self.stream.equal(")") {
      loop {
        let (param, loc) = self.stream.get_ident()?;
        if params.len() == MAX_ARGS {
          return Err(self.error_at(
            loc,
            format!("too many parameters in '{name}' (at most {MAX_ARGS})"),
          ));
        }
        if params.iter().any(|p| p == param) {
          return Err(self.error_at(loc, format!("duplicate parameter '{param}'")));
        }
        params.push(param.to_string());
        if self.stream.equal(")") {
          break;
        }
        self.stream.skip(",")?;
      }
    }

    self.stream.skip("{")?;

    let outer = mem::take(&mut self.frame);
    for param in &params {
      self.frame.declare(param);
    }
    let body = self.parse_block_body();
    let frame = mem::replace(&mut self.frame, outer);
    let body = body?;

    tracing::trace!(function = name, stack_size = frame.stack_size(), "parsed function");
    Ok(Function {
      name: name.to_string(),
      params,
      body,
      frame,
    })
  }

  fn check_function_name(&self, name: &str, loc: usize) -> CompileResult<()> {
    if is_register_name(name) {
      return Err(self.error_at(loc, format!("function name '{name}' is a register name")));
    }
    Ok(())
  }

  /// Statements up to and including the closing brace.
  fn parse_block_body(&mut self) -> CompileResult<Vec<AstNode>> {
    let mut body = Vec::new();
    while !self.stream.equal("}") {
      if self.stream.is_eof() {
        self.stream.skip("}")?;
      }
      body.push(self.parse_stmt()?);
    }
    Ok(body)
  }

  fn parse_stmt(&mut self) -> CompileResult<AstNode> {
    if self.stream.equal_keyword(Keyword::Return) {
      let operand = self.parse_expr()?;
      self.skip_terminator()?;
      return Ok(AstNode::ret(operand));
    }

    if self.stream.equal_keyword(Keyword::If) {
      self.stream.skip("(")?;
      let cond = self.parse_expr()?;
      self.stream.skip(")")?;
      let then = self.parse_stmt()?;
      let els = if self.stream.equal_keyword(Keyword::Else) {
        Some(self.parse_stmt()?)
      } else {
        None
      };
      return Ok(AstNode::if_else(cond, then, els));
    }

    if self.stream.equal("{") {
      let body = self.parse_block_body()?;
      return Ok(AstNode::Block { body });
    }

    self.parse_expr_stmt()
  }

  fn parse_expr_stmt(&mut self) -> CompileResult<AstNode> {
    let expr = self.parse_expr()?;
    self.skip_terminator()?;
    Ok(expr)
  }

  /// The last statement of the input may leave out its semicolon.
  fn skip_terminator(&mut self) -> CompileResult<()> {
    if self.stream.is_eof() {
      return Ok(());
    }
    self.stream.skip(";")
  }

  fn parse_expr(&mut self) -> CompileResult<AstNode> {
    self.parse_assign()
  }

  fn parse_assign(&mut self) -> CompileResult<AstNode> {
    let loc = self.stream.loc();
    let node = self.parse_equality()?;

    if self.stream.equal("=") {
      let AstNode::Var(target) = node else {
        return Err(self.error_at(loc, "left value of assignment is not a variable"));
      };
      let value = self.parse_assign()?;
      return Ok(AstNode::assign(target, value));
    }

    Ok(node)
  }

  fn parse_equality(&mut self) -> CompileResult<AstNode> {
    let mut node = self.parse_relational()?;

    while let Some(symbol @ ("==" | "!=")) = self.stream.peek_punct() {
      let op = match symbol {
        "==" => BinaryOp::Eq,
        _ => BinaryOp::Ne,
      };
      self.stream.skip(symbol)?;
      let rhs = self.parse_relational()?;
      node = AstNode::binary(op, node, rhs);
    }

    Ok(node)
  }

  fn parse_relational(&mut self) -> CompileResult<AstNode> {
    let mut node = self.parse_add()?;

    while let Some(symbol @ ("<" | "<=" | ">" | ">=")) = self.stream.peek_punct() {
      self.stream.skip(symbol)?;
      let rhs = self.parse_add()?;
      // `a > b` is `b < a`; the backend only knows the less-than forms.
      node = match symbol {
        "<" => AstNode::binary(BinaryOp::Lt, node, rhs),
        "<=" => AstNode::binary(BinaryOp::Le, node, rhs),
        ">" => AstNode::binary(BinaryOp::Lt, rhs, node),
        _ => AstNode::binary(BinaryOp::Le, rhs, node),
      };
    }

    Ok(node)
  }

  fn parse_add(&mut self) -> CompileResult<AstNode> {
    let mut node = self.parse_mul()?;

    while let Some(symbol @ ("+" | "-")) = self.stream.peek_punct() {
      let op = match symbol {
        "+" => BinaryOp::Add,
        _ => BinaryOp::Sub,
      };
      self.stream.skip(symbol)?;
      let rhs = self.parse_mul()?;
      node = AstNode::binary(op, node, rhs);
    }

    Ok(node)
  }

  fn parse_mul(&mut self) -> CompileResult<AstNode> {
    let mut node = self.parse_unary()?;

    while let Some(symbol @ ("*" | "/")) = self.stream.peek_punct() {
      let op = match symbol {
        "*" => BinaryOp::Mul,
        _ => BinaryOp::Div,
      };
      self.stream.skip(symbol)?;
      let rhs = self.parse_unary()?;
      node = AstNode::binary(op, node, rhs);
    }

    Ok(node)
  }

  fn parse_unary(&mut self) -> CompileResult<AstNode> {
    if self.stream.equal("+") {
      return self.parse_primary();
    }

    if self.stream.equal("-") {
      let operand = self.parse_primary()?;
      return Ok(AstNode::binary(BinaryOp::Sub, AstNode::number(0), operand));
    }

    self.parse_primary()
  }

  fn parse_primary(&mut self) -> CompileResult<AstNode> {
    if self.stream.equal("(") {
      let node = self.parse_expr()?;
      self.stream.skip(")")?;
      return Ok(node);
    }

    match self.stream.peek().map(|token| token.kind) {
      Some(TokenKind::Ident) => {
        let (name, loc) = self.stream.get_ident()?;
        if self.stream.equal("(") {
          self.check_function_name(name, loc)?;
          return self.parse_call(name);
        }
        let offset = self.frame.declare(name);
        Ok(AstNode::var(name, offset))
      }
      Some(TokenKind::Num(_)) => {
        let (value, _) = self.stream.get_number()?;
        Ok(AstNode::number(value))
      }
      _ => {
        let got = describe_token(self.stream.peek(), self.stream.source);
        Err(self.error_at(
          self.stream.loc(),
          format!("expected an expression, but got \"{got}\""),
        ))
      }
    }
  }

  /// Arguments of a call whose name and `(` are already consumed.
  fn parse_call(&mut self, name: &str) -> CompileResult<AstNode> {
    let mut args = Vec::new();

    if !self.stream.equal(")") {
      loop {
        if args.len() == MAX_ARGS {
          return Err(self.error_at(
            self.stream.loc(),
            format!("too many arguments to '{name}' (at most {MAX_ARGS})"),
          ));
        }
        args.push(self.parse_assign()?);
        if self.stream.equal(")") {
          break;
        }
        self.stream.skip(",")?;
      }
    }

    Ok(AstNode::FuncCall {
      name: name.to_string(),
      args,
    })
  }
}

/// Lightweight cursor over the token vector.
struct TokenStream<'a> {
  tokens: Vec<Token>,
  source: &'a str,
  pos: usize,
}

impl<'a> TokenStream<'a> {
  /// Take ownership of the token stream; the parser will advance `pos` as it consumes input.
  fn new(tokens: Vec<Token>, source: &'a str) -> Self {
    Self {
      tokens,
      source,
      pos: 0,
    }
  }

  fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.pos)
  }

  fn peek_at(&self, ahead: usize) -> Option<&Token> {
    self.tokens.get(self.pos + ahead)
  }

  /// Text of the current token when it is a punctuator.
  fn peek_punct(&self) -> Option<&'a str> {
    let source = self.source;
    self
      .peek()
      .filter(|token| token.kind == TokenKind::Punctuator)
      .map(|token| token_text(token, source))
  }

  fn is_punct_at(&self, ahead: usize, op: &str) -> bool {
    self.peek_at(ahead).is_some_and(|token| {
      token.kind == TokenKind::Punctuator && token_text(token, self.source) == op
    })
  }

  /// Byte offset of the current token, or the end of input.
  fn loc(&self) -> usize {
    self.peek().map_or(self.source.len(), |token| token.loc)
  }

  /// Consume the current token if it matches the provided punctuator.
  fn equal(&mut self, op: &str) -> bool {
    if self.is_punct_at(0, op) {
      self.pos += 1;
      return true;
    }
    false
  }

  fn equal_keyword(&mut self, keyword: Keyword) -> bool {
    if self.peek().map(|token| token.kind) == Some(TokenKind::Keyword(keyword)) {
      self.pos += 1;
      return true;
    }
    false
  }

  fn skip(&mut self, s: &str) -> CompileResult<()> {
    if self.equal(s) {
      Ok(())
    } else {
      let got = describe_token(self.peek(), self.source);
      Err(CompileError::parse_at(
        self.source,
        self.loc(),
        format!("expected \"{s}\", but got \"{got}\""),
      ))
    }
  }

  /// Whether the cursor sits on `ident ( ... ) {`. Only looks ahead.
  fn at_function_def(&self) -> bool {
    if self.peek().map(|token| token.kind) != Some(TokenKind::Ident) || !self.is_punct_at(1, "(") {
      return false;
    }

    let mut depth = 0usize;
    let mut ahead = 1;
    while let Some(token) = self.peek_at(ahead) {
      match (token.kind, token_text(token, self.source)) {
        (TokenKind::Eof, _) => return false,
        (TokenKind::Punctuator, "(") => depth += 1,
        (TokenKind::Punctuator, ")") => {
          depth -= 1;
          if depth == 0 {
            return self.is_punct_at(ahead + 1, "{");
          }
        }
        (TokenKind::Punctuator, ";" | "{" | "}") => return false,
        _ => {}
      }
      ahead += 1;
    }
    false
  }

  /// Parse the current token as an integer literal returning its value and location.
  fn get_number(&mut self) -> CompileResult<(i64, usize)> {
    if let Some(token) = self.peek()
      && let TokenKind::Num(value) = token.kind
    {
      let loc = token.loc;
      self.pos += 1;
      return Ok((value, loc));
    }

    let got = describe_token(self.peek(), self.source);
    Err(CompileError::parse_at(
      self.source,
      self.loc(),
      format!("expected a number, but got \"{got}\""),
    ))
  }

  /// Parse the current token as an identifier.
  fn get_ident(&mut self) -> CompileResult<(&'a str, usize)> {
    if let Some(token) = self.peek()
      && token.kind == TokenKind::Ident
    {
      let loc = token.loc;
      let ident = token_text(token, self.source);
      self.pos += 1;
      return Ok((ident, loc));
    }

    let got = describe_token(self.peek(), self.source);
    Err(CompileError::parse_at(
      self.source,
      self.loc(),
      format!("expected an identifier, but got \"{got}\""),
    ))
  }

  fn is_eof(&self) -> bool {
    matches!(self.peek().map(|token| token.kind), Some(TokenKind::Eof))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::LocalVar;
  use crate::tokenizer::tokenize;

  fn parse_src(source: &str) -> CompileResult<Program> {
    parse(tokenize(source)?, source)
  }

  /// Body of the implicit entry point of a statements-only program.
  fn main_body(source: &str) -> Vec<AstNode> {
    let program = parse_src(source).unwrap();
    let main = program.functions.last().unwrap();
    assert_eq!(main.name, IMPLICIT_ENTRY);
    main.body.clone()
  }

  fn num(value: i64) -> AstNode {
    AstNode::number(value)
  }

  fn bin(op: BinaryOp, lhs: AstNode, rhs: AstNode) -> AstNode {
    AstNode::binary(op, lhs, rhs)
  }

  fn local(name: &str, offset: i64) -> LocalVar {
    LocalVar {
      name: name.to_string(),
      offset,
    }
  }

  #[test]
  fn multiplication_binds_tighter_than_addition() {
    let expected = bin(
      BinaryOp::Sub,
      bin(BinaryOp::Add, num(1), bin(BinaryOp::Mul, num(2), num(3))),
      bin(BinaryOp::Div, num(4), num(2)),
    );
    assert_eq!(main_body("1+2*3-4/2"), vec![expected]);
  }

  #[test]
  fn operators_are_left_associative() {
    let expected = bin(BinaryOp::Sub, bin(BinaryOp::Sub, num(1), num(2)), num(3));
    assert_eq!(main_body("1-2-3;"), vec![expected]);
  }

  #[test]
  fn parentheses_override_precedence() {
    let expected = bin(BinaryOp::Mul, bin(BinaryOp::Add, num(1), num(2)), num(3));
    assert_eq!(main_body("(1+2)*3"), vec![expected]);
  }

  #[test]
  fn comparisons_sit_below_arithmetic() {
    let expected = bin(
      BinaryOp::Eq,
      bin(BinaryOp::Add, num(1), num(1)),
      bin(BinaryOp::Lt, num(2), num(3)),
    );
    assert_eq!(main_body("1+1==2<3"), vec![expected]);
  }

  #[test]
  fn greater_than_swaps_operands() {
    let expected = vec![
      bin(BinaryOp::Lt, AstNode::var("b", 16), AstNode::var("a", 8)),
      bin(BinaryOp::Le, AstNode::var("b", 16), AstNode::var("a", 8)),
    ];
    assert_eq!(main_body("a > b; a >= b"), expected);
  }

  #[test]
  fn unary_minus_subtracts_from_zero() {
    let expected = bin(BinaryOp::Mul, bin(BinaryOp::Sub, num(0), num(3)), num(2));
    assert_eq!(main_body("-3*+2"), vec![expected]);
  }

  #[test]
  fn assignment_is_right_associative() {
    let expected = vec![
      AstNode::assign(local("a", 8), AstNode::assign(local("b", 16), num(3))),
      AstNode::var("a", 8),
    ];
    assert_eq!(main_body("a = b = 3; a"), expected);
  }

  #[test]
  fn if_else_and_blocks() {
    let body = main_body("if (x) { y = 1; } else y = 2; y");
    let expected = vec![
      AstNode::if_else(
        AstNode::var("x", 8),
        AstNode::Block {
          body: vec![AstNode::assign(local("y", 16), num(1))],
        },
        Some(AstNode::assign(local("y", 16), num(2))),
      ),
      AstNode::var("y", 16),
    ];
    assert_eq!(body, expected);
  }

  #[test]
  fn return_statement() {
    assert_eq!(main_body("return 7;"), vec![AstNode::ret(num(7))]);
  }

  #[test]
  fn function_definitions_get_their_own_frames() {
    let program = parse_src("add(x, y) { z = x + y; return z; } a = add(1, 2); a").unwrap();
    let names: Vec<_> = program.functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["add", "main"]);

    let add = &program.functions[0];
    assert_eq!(add.params, vec!["x", "y"]);
    assert_eq!(add.frame, FrameMap::from_occurrences(["x", "y", "z"]));
    assert_eq!(add.stack_size(), 24);

    let main = &program.functions[1];
    assert_eq!(main.frame, FrameMap::from_occurrences(["a"]));
    let call = AstNode::FuncCall {
      name: "add".to_string(),
      args: vec![num(1), num(2)],
    };
    assert_eq!(main.body[0], AstNode::assign(local("a", 8), call));
  }

  #[test]
  fn call_statement_is_not_mistaken_for_definition() {
    let program = parse_src("foo((1), 2);").unwrap();
    assert_eq!(program.functions.len(), 1);
    let call = AstNode::FuncCall {
      name: "foo".to_string(),
      args: vec![num(1), num(2)],
    };
    assert_eq!(program.functions[0].body, vec![call]);
  }

  #[test]
  fn only_definitions_means_no_implicit_main() {
    let program = parse_src("main() { return 0; }").unwrap();
    assert_eq!(program.functions.len(), 1);
    assert!(program.functions[0].frame.is_empty());
  }

  #[test]
  fn six_arguments_are_accepted() {
    assert!(parse_src("f(1, 2, 3, 4, 5, 6)").is_ok());
    assert!(parse_src("f(a, b, c, d, e, g) { return a; }").is_ok());
  }

  #[test]
  fn seventh_argument_is_rejected() {
    let err = parse_src("f(1, 2, 3, 4, 5, 6, 7)").unwrap_err();
    assert!(matches!(err, CompileError::Parse { .. }));
    assert_eq!(err.loc(), 20);
    assert_eq!(err.message(), "too many arguments to 'f' (at most 6)");
  }

  #[test]
  fn seventh_parameter_is_rejected() {
    let err = parse_src("f(a, b, c, d, e, g, h) { return a; }").unwrap_err();
    assert_eq!(err.message(), "too many parameters in 'f' (at most 6)");
  }

  #[test]
  fn duplicate_parameter_is_rejected() {
    let err = parse_src("f(a, a) { return a; }").unwrap_err();
    assert_eq!(err.message(), "duplicate parameter 'a'");
    assert_eq!(err.loc(), 5);
  }

  #[test]
  fn duplicate_function_is_rejected() {
    let err = parse_src("f() { 1; } f() { 2; }").unwrap_err();
    assert_eq!(err.message(), "redefinition of function 'f'");
    assert_eq!(err.loc(), 11);
  }

  #[test]
  fn explicit_main_conflicts_with_top_level_statements() {
    let err = parse_src("main() { return 1; } 2;").unwrap_err();
    assert_eq!(err.loc(), 21);
  }

  #[test]
  fn register_named_functions_are_rejected() {
    let err = parse_src("rax() { return 1; }").unwrap_err();
    assert!(matches!(err, CompileError::Parse { .. }));
    assert_eq!(err.message(), "function name 'rax' is a register name");
    assert_eq!(err.loc(), 0);

    let err = parse_src("x = 1 + R8D(2)").unwrap_err();
    assert_eq!(err.message(), "function name 'R8D' is a register name");
    assert_eq!(err.loc(), 8);
  }

  #[test]
  fn register_names_are_fine_as_variables() {
    let body = main_body("rax = 1; rax");
    assert_eq!(body[1], AstNode::var("rax", 8));
  }

  #[test]
  fn assignment_to_non_variable_is_fatal() {
    let err = parse_src("1 = 2").unwrap_err();
    assert!(matches!(err, CompileError::Parse { .. }));
    assert_eq!(err.message(), "left value of assignment is not a variable");
    assert_eq!(err.loc(), 0);
  }

  #[test]
  fn unmatched_parenthesis_is_fatal() {
    let err = parse_src("(1+2").unwrap_err();
    assert_eq!(err.message(), "expected \")\", but got \"EOF\"");
    assert_eq!(err.loc(), 4);
  }

  #[test]
  fn unexpected_leading_token_is_fatal() {
    let err = parse_src("1 + )").unwrap_err();
    assert_eq!(err.message(), "expected an expression, but got \")\"");
    assert_eq!(err.loc(), 4);
  }

  #[test]
  fn statements_need_separators() {
    let err = parse_src("1 2").unwrap_err();
    assert_eq!(err.message(), "expected \";\", but got \"2\"");
  }

  #[test]
  fn unterminated_block_is_fatal() {
    let err = parse_src("f() { return 1;").unwrap_err();
    assert_eq!(err.message(), "expected \"}\", but got \"EOF\"");
  }

  #[test]
  fn empty_program_is_rejected() {
    let err = parse_src("  ").unwrap_err();
    assert_eq!(err.message(), "program is empty");
  }
}
