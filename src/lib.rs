//! A minimal virtual machine for a line-oriented, assembly-like language.
//!
//! Source text is split into tokens by [`lex`], compiled into a flat [`Program`] plus label table
//! by [`compile`], and executed by a [`Vm`] that owns the register file, the global variables and
//! the call stack.

pub mod ir;
pub mod lexer;
pub mod parser;
pub mod samples;
pub mod vm;

pub use ir::{ArithmeticOp, CompareOp, Instruction, Operand, Place, Program, Register};
pub use lexer::{lex, Token, TokenKind};
pub use parser::{compile, ParseError, ParseErrorKind, Parser};
pub use vm::{Halt, Registers, Vm, VmConfig, VmError, VmErrorKind, DEFAULT_STEP_LIMIT};
