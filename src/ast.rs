//! Syntax tree produced by the parser and consumed by the code generator.

use crate::frame::FrameMap;

/// Binary operators that survive parsing. `>` and `>=` are rewritten into
/// `Lt` / `Le` with swapped operands, so they never appear here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Eq,
  Ne,
  Lt,
  Le,
}

impl BinaryOp {
  pub fn symbol(self) -> &'static str {
    match self {
      Self::Add => "+",
      Self::Sub => "-",
      Self::Mul => "*",
      Self::Div => "/",
      Self::Eq => "==",
      Self::Ne => "!=",
      Self::Lt => "<",
      Self::Le => "<=",
    }
  }
}

/// A variable reference resolved to its frame slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVar {
  pub name: String,
  pub offset: i64,
}

/// Expression and statement tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AstNode {
  Num {
    value: i64,
  },
  Var(LocalVar),
  Assign {
    target: LocalVar,
    value: Box<AstNode>,
  },
  Binary {
    op: BinaryOp,
    lhs: Box<AstNode>,
    rhs: Box<AstNode>,
  },
  If {
    cond: Box<AstNode>,
    then: Box<AstNode>,
    els: Option<Box<AstNode>>,
  },
  Return {
    operand: Box<AstNode>,
  },
  Block {
    body: Vec<AstNode>,
  },
  FuncCall {
    name: String,
    args: Vec<AstNode>,
  },
}

impl AstNode {
  pub fn number(value: i64) -> Self {
    Self::Num { value }
  }

  pub fn var(name: impl Into<String>, offset: i64) -> Self {
    Self::Var(LocalVar {
      name: name.into(),
      offset,
    })
  }

  pub fn binary(op: BinaryOp, lhs: AstNode, rhs: AstNode) -> Self {
    Self::Binary {
      op,
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    }
  }

  pub fn assign(target: LocalVar, value: AstNode) -> Self {
    Self::Assign {
      target,
      value: Box::new(value),
    }
  }

  pub fn if_else(cond: AstNode, then: AstNode, els: Option<AstNode>) -> Self {
    Self::If {
      cond: Box::new(cond),
      then: Box::new(then),
      els: els.map(Box::new),
    }
  }

  pub fn ret(operand: AstNode) -> Self {
    Self::Return {
      operand: Box::new(operand),
    }
  }
}

/// A function definition together with its frame layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
  pub name: String,
  pub params: Vec<String>,
  pub body: Vec<AstNode>,
  pub frame: FrameMap,
}

impl Function {
  /// Bytes reserved below `%rbp` for locals and spilled parameters.
  pub fn stack_size(&self) -> i64 {
    self.frame.stack_size()
  }
}

/// Every top-level construct of one translation unit, in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Program {
  pub functions: Vec<Function>,
}
