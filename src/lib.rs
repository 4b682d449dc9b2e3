//! # pegvm
//!
//! **pegvm** is a virtual machine for matching PEG (Parsing Expression
//! Grammar) instruction streams: a stack-based backtracking interpreter
//! with ordered-choice, rule calls, bounded left recursion via
//! seed-and-grow, UTF-8 codepoint range tests, and both structural and
//! match-time captures.
//!
//! ## Crate Organization
//!
//! - `instruction`: the opcode model and a linear assembler
//! - `charset`: byte-class bitmaps and strict UTF-8 decoding
//! - `capture`: capture records and the growable capture buffer
//! - `capstack`: capture-buffer snapshots across recursive invocations
//! - `lambda`: the left-recursion memoization table
//! - `frame`: the backtrack stack
//! - `value`: host values and the match-time function protocol
//! - `limits`: configurable resource limits
//! - `error`: fatal (non-match-failure) errors
//! - `vm`: the interpreter loop
//!
//! ## Usage
//!
//! ```rust
//! use pegvm::instruction::{Instruction, ProgramBuilder};
//! use pegvm::limits::Limits;
//! use pegvm::vm::{match_program, MatchOutcome};
//!
//! let mut b = ProgramBuilder::new();
//! b.push(Instruction::Char(b'a'));
//! b.push(Instruction::End);
//! let program = b.build();
//!
//! let outcome = match_program(&program, b"a", 0, 1, Vec::new(), &mut [], Limits::default()).unwrap();
//! assert!(matches!(outcome, MatchOutcome::Match { end: 1, .. }));
//! ```
//!
//! ## License
//!
//! Licensed under MIT or Apache-2.0.

pub mod capstack;
pub mod capture;
pub mod charset;
pub mod error;
pub mod frame;
pub mod instruction;
pub mod lambda;
pub mod limits;
pub mod value;
pub mod vm;

pub use charset::CharSet;
pub use error::MatchError;
pub use instruction::{CaptureKind, Instruction, Program, ProgramBuilder};
pub use limits::Limits;
pub use value::{MatchTimeFn, MatchTimeOutcome, Value};
pub use vm::{match_program, MatchOutcome};
