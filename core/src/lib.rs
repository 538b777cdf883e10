//! `forth64-core`: the virtual machine behind `64th` — memory and stacks,
//! the indirect-threaded execution engine, the compiler/bootstrap, the
//! dictionary, and the outer interpreter loop.
//!
//! The binary crate (`forth64`) is a thin CLI shell over this library: flag
//! parsing, a stdin-backed `TokenSource`, and nothing else.

pub mod compiler;
pub mod dictionary;
pub mod engine;
pub mod memory;
pub mod repl;

pub use compiler::Bootstrap;
pub use dictionary::Dictionary;
pub use engine::{EngineError, Opcode, exec};
pub use memory::Memory;
pub use repl::{ReaderTokenSource, Repl, TokenSource};
