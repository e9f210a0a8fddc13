//! Code generation: lower the parsed program into x86-64 Intel-syntax assembly.
//!
//! The emitter is a simple stack machine: every expression leaves a single
//! value on the stack and every statement pops it again. Locals live in the
//! stack frame and are addressed relative to `rbp`. Each logical operation is
//! followed by a `#` comment naming it.
//!
//! All state that outlives a single node (label counters, the frame of the
//! function being emitted, the static stack depth) lives in [`Codegen`],
//! which is created fresh for every call to [`generate`].

use crate::ast::{AstNode, BinaryOp, Function, LocalVar, Program};
use crate::frame::FrameMap;

/// Integer argument registers of the System V calling convention, in order.
pub const ARG_REGS: [&str; 6] = ["rdi", "rsi", "rdx", "rcx", "r8", "r9"];

const FIXED_REGISTERS: &[&str] = &[
  "rax", "rbx", "rcx", "rdx", "rsi", "rdi", "rbp", "rsp", "rip", "eax", "ebx", "ecx", "edx", "esi",
  "edi", "ebp", "esp", "eip", "ax", "bx", "cx", "dx", "si", "di", "bp", "sp", "ip", "al", "bl",
  "cl", "dl", "ah", "bh", "ch", "dh", "sil", "dil", "bpl", "spl", "cs", "ds", "es", "fs", "gs",
  "ss", "st",
];

/// Numbered register families: prefix, index range, allowed suffixes.
const NUMBERED_REGISTERS: &[(&str, u32, u32, &[&str])] = &[
  ("r", 8, 15, &["", "d", "w", "b", "l"]),
  ("xmm", 0, 31, &[""]),
  ("ymm", 0, 31, &[""]),
  ("zmm", 0, 31, &[""]),
  ("mm", 0, 7, &[""]),
  ("k", 0, 7, &[""]),
  ("cr", 0, 15, &[""]),
  ("dr", 0, 15, &[""]),
  ("bnd", 0, 3, &[""]),
];

/// Whether the assembler would read `name` as a register operand rather than
/// a symbol. Such names cannot be used for functions.
pub fn is_register_name(name: &str) -> bool {
  let name = name.to_ascii_lowercase();
  if FIXED_REGISTERS.contains(&name.as_str()) {
    return true;
  }

  NUMBERED_REGISTERS.iter().any(|(prefix, first, last, suffixes)| {
    let Some(rest) = name.strip_prefix(prefix) else {
      return false;
    };
    let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    let (index, suffix) = rest.split_at(digits);
    index
      .parse::<u32>()
      .is_ok_and(|index| (*first..=*last).contains(&index) && suffixes.contains(&suffix))
  })
}

/// Counters behind `.Lelse{n}` and `.Lend{n}`. Neither ever repeats a value
/// within one compilation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Labels {
  else_seq: u32,
  end_seq: u32,
}

impl Labels {
  pub fn next_else(&mut self) -> u32 {
    self.else_seq += 1;
    self.else_seq
  }

  pub fn next_end(&mut self) -> u32 {
    self.end_seq += 1;
    self.end_seq
  }
}

/// Emit assembly for a whole program.
pub fn generate(program: &Program) -> String {
  let mut cg = Codegen::default();
  cg.line(".intel_syntax noprefix");

  for function in &program.functions {
    cg.labels.next_end();
    cg.line(format!(".global {}", function.name));
    cg.emit_function(function);
  }

  tracing::debug!(
    functions = program.functions.len(),
    bytes = cg.asm.len(),
    "generated assembly"
  );
  cg.asm
}

#[derive(Default)]
struct Codegen<'a> {
  asm: String,
  labels: Labels,
  /// Frame of the function being emitted; `None` between functions.
  frame: Option<&'a FrameMap>,
  /// Values currently pushed by the evaluation stack within this function.
  depth: i64,
}

impl<'a> Codegen<'a> {
  fn line(&mut self, text: impl AsRef<str>) {
    self.asm.push_str(text.as_ref());
    self.asm.push('\n');
  }

  fn ins(&mut self, text: impl AsRef<str>) {
    self.asm.push_str("  ");
    self.line(text);
  }

  fn comment(&mut self, text: impl AsRef<str>) {
    self.asm.push_str("# ");
    self.line(text);
  }

  fn push(&mut self, reg: &str) {
    self.ins(format!("push {reg}"));
    self.depth += 1;
  }

  fn pop(&mut self, reg: &str) {
    self.ins(format!("pop {reg}"));
    self.depth -= 1;
  }

  fn emit_function(&mut self, func: &'a Function) {
    self.frame = Some(&func.frame);
    self.depth = 0;

    self.line(format!("{}:", func.name));
    self.ins("push rbp");
    self.ins("mov rbp, rsp");
    if func.stack_size() > 0 {
      self.ins(format!("sub rsp, {}", func.stack_size()));
    }
    self.comment("prologue");

    for (param, reg) in func.params.iter().zip(ARG_REGS) {
      let offset = func
        .frame
        .offset_of(param)
        .unwrap_or_else(|| panic!("parameter '{param}' has no frame slot"));
      self.ins(format!("mov [rbp-{offset}], {reg}"));
      self.comment(format!("store parameter {param}"));
    }

    // Without an explicit return, the last statement's value is left in
    // rax by its pop and becomes the return value.
    for stmt in &func.body {
      self.emit_stmt(stmt);
    }

    self.ins("mov rsp, rbp");
    self.ins("pop rbp");
    self.ins("ret");
    self.comment("epilogue");

    debug_assert_eq!(self.depth, 0, "unbalanced stack in '{}'", func.name);
    self.frame = None;
  }

  /// A statement is an expression whose value is discarded.
  fn emit_stmt(&mut self, node: &AstNode) {
    self.emit_expr(node);
    self.pop("rax");
    self.comment("end of statement");
  }

  /// Emit stack-based code for a single node, leaving one value pushed.
  fn emit_expr(&mut self, node: &AstNode) {
    match node {
      AstNode::Num { value } => {
        self.ins(format!("mov rax, {value}"));
        self.push("rax");
        self.comment(format!("num: {value}"));
      }
      AstNode::Var(var) => {
        self.ins(format!("mov rax, [rbp-{}]", var.offset));
        self.push("rax");
        self.comment(format!("variable: {}", var.name));
      }
      AstNode::Assign { target, value } => {
        self.emit_addr(target);
        self.emit_expr(value);
        self.pop("rdi");
        self.pop("rax");
        self.ins("mov [rax], rdi");
        self.push("rdi");
        self.comment(format!("assign: {}", target.name));
      }
      AstNode::Binary { op, lhs, rhs } => self.emit_binary(*op, lhs, rhs),
      AstNode::If { cond, then, els } => self.emit_if(cond, then, els.as_deref()),
      AstNode::Return { operand } => {
        self.emit_expr(operand);
        self.pop("rax");
        self.ins("mov rsp, rbp");
        self.ins("pop rbp");
        self.ins("ret");
        self.comment("return");
        // Nothing after `ret` runs, but the enclosing statement still pops
        // a value, so account for one.
        self.depth += 1;
      }
      AstNode::Block { body } => {
        for stmt in body {
          self.emit_stmt(stmt);
        }
        self.push("rax");
        self.comment("end of block");
      }
      AstNode::FuncCall { name, args } => self.emit_call(name, args),
    }
  }

  fn emit_addr(&mut self, var: &LocalVar) {
    self.ins(format!("lea rax, [rbp-{}]", var.offset));
    self.push("rax");
    self.comment(format!("address of {}", var.name));
  }

  fn emit_binary(&mut self, op: BinaryOp, lhs: &AstNode, rhs: &AstNode) {
    self.emit_expr(lhs);
    self.emit_expr(rhs);
    self.pop("rdi");
    self.pop("rax");

    match op {
      BinaryOp::Add => self.ins("add rax, rdi"),
      BinaryOp::Sub => self.ins("sub rax, rdi"),
      BinaryOp::Mul => self.ins("imul rax, rdi"),
      BinaryOp::Div => {
        self.ins("cqo");
        self.ins("idiv rdi");
      }
      BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le => {
        let set = match op {
          BinaryOp::Eq => "sete",
          BinaryOp::Ne => "setne",
          BinaryOp::Lt => "setl",
          _ => "setle",
        };
        self.ins("cmp rax, rdi");
        self.ins(format!("{set} al"));
        self.ins("movzx rax, al");
      }
    }

    self.push("rax");
    self.comment(op.symbol());
  }

  fn emit_if(&mut self, cond: &AstNode, then: &AstNode, els: Option<&AstNode>) {
    let else_label = format!(".Lelse{}", self.labels.next_else());
    let end_label = format!(".Lend{}", self.labels.next_end());

    self.emit_expr(cond);
    self.pop("rax");
    self.ins("cmp rax, 0");
    self.ins(format!(
      "je {}",
      if els.is_some() { &else_label } else { &end_label }
    ));
    self.comment("if-condition");

    self.emit_expr(then);
    self.pop("rax");
    self.comment("if-then");

    if let Some(els) = els {
      self.ins(format!("jmp {end_label}"));
      self.line(format!("{else_label}:"));
      self.emit_expr(els);
      self.pop("rax");
      self.comment("else");
    }

    self.line(format!("{end_label}:"));
    self.push("rax");
    self.comment("end of if");
  }

  fn emit_call(&mut self, name: &str, args: &[AstNode]) {
    assert!(
      args.len() <= ARG_REGS.len(),
      "call to '{name}' has {} arguments",
      args.len()
    );

    for arg in args.iter().rev() {
      self.emit_expr(arg);
    }
    for reg in &ARG_REGS[..args.len()] {
      self.pop(reg);
    }

    let frame_slots = self.frame.map_or(0, |frame| frame.len() as i64);
    let misaligned = (frame_slots + self.depth) % 2 != 0;
    if misaligned {
      self.ins("sub rsp, 8");
    }
    self.ins("mov rax, 0");
    self.ins(format!("call {name}"));
    if misaligned {
      self.ins("add rsp, 8");
    }
    self.push("rax");
    self.comment(format!("call {name}"));
  }
}
