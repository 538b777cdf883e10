//! The inner interpreter: the indirect-threaded-code dispatch loop and the
//! opcode table it runs.
//!
//! `exec` implements the classic NEXT/DOCOL/DOSEM protocol over three
//! registers (I, W, P) kept as locals rather than struct fields, since the
//! loop never yields control mid-instruction — there is nothing else that
//! needs to observe I/W/P between opcodes.

use std::fmt;

use crate::memory::Memory;

/// A recoverable fault raised by the engine while running threaded code.
///
/// These are the tier-one errors: the outer interpreter catches them,
/// prints a diagnostic, resets the stacks, and keeps the session alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    Underflow,
    Overflow,
    Fault,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Underflow => write!(f, "stack underflow"),
            Self::Overflow => write!(f, "stack overflow"),
            Self::Fault => write!(f, "invalid data address"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<crate::memory::Fault> for EngineError {
    fn from(_: crate::memory::Fault) -> Self {
        Self::Fault
    }
}

/// The 26 opcodes the inner interpreter dispatches on. Values match the
/// order the bootstrap phase compiles them in, but nothing outside this
/// module depends on the exact discriminants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum Opcode {
    Next = 0,
    Docol,
    Dosem,
    Dolit,
    Print,
    Load,
    Store,
    Drop,
    Swap,
    Dup,
    Over,
    Rot,
    Push,
    Pull,
    Not,
    And,
    Or,
    Xor,
    Add,
    Sub,
    Mul,
    Div,
    Lsh,
    Rsh,
    Eq,
    Lt,
}

impl Opcode {
    pub const COUNT: u64 = 26;

    #[must_use]
    pub fn from_cell(value: u64) -> Option<Self> {
        let op = match value {
            0 => Self::Next,
            1 => Self::Docol,
            2 => Self::Dosem,
            3 => Self::Dolit,
            4 => Self::Print,
            5 => Self::Load,
            6 => Self::Store,
            7 => Self::Drop,
            8 => Self::Swap,
            9 => Self::Dup,
            10 => Self::Over,
            11 => Self::Rot,
            12 => Self::Push,
            13 => Self::Pull,
            14 => Self::Not,
            15 => Self::And,
            16 => Self::Or,
            17 => Self::Xor,
            18 => Self::Add,
            19 => Self::Sub,
            20 => Self::Mul,
            21 => Self::Div,
            22 => Self::Lsh,
            23 => Self::Rsh,
            24 => Self::Eq,
            25 => Self::Lt,
            _ => return None,
        };
        Some(op)
    }

    #[must_use]
    pub fn as_cell(self) -> u64 {
        self as u64
    }
}

/// Run threaded code starting at `entry` until the call nests back out to
/// depth zero (the return stack is empty again) or an opcode raises an
/// error.
///
/// `entry` is the address of a code field — typically DOCOL for a
/// colon-defined word, or an opcode cell directly for a bare primitive.
/// Three registers drive the loop: I (the next-instruction pointer within
/// the word currently executing), W (the code-field address NEXT just
/// fetched), and P (the address actually being dispatched this iteration).
pub fn exec(mem: &mut Memory, entry: u64) -> Result<(), EngineError> {
    let mut i = entry;
    let mut w = entry;
    let mut p = entry;

    loop {
        if mem.fault(i) || mem.fault(w) || mem.fault(p) {
            return Err(EngineError::Fault);
        }

        let raw = mem.fetch(p)?;
        let opcode = Opcode::from_cell(raw).ok_or(EngineError::Fault)?;

        match opcode {
            Opcode::Next => {
                w = mem.fetch(i)?;
                i += 1;
                p = w;
            }
            Opcode::Docol => {
                if mem.return_overflow() {
                    return Err(EngineError::Overflow);
                }
                mem.push_return(i);
                i = w + 1;
                w = mem.fetch(i)?;
                i += 1;
                p = w;
            }
            Opcode::Dosem => {
                i = mem.pop_return();
                if mem.rsp() == crate::memory::STATE_ADDR {
                    return Ok(());
                }
                w = mem.fetch(i)?;
                i += 1;
                p = w;
            }
            Opcode::Dolit => {
                let literal = mem.fetch(i)?;
                if mem.overflow(1) {
                    return Err(EngineError::Overflow);
                }
                mem.push_parameter(literal);
                i += 1;
                p += 1;
            }
            Opcode::Print => {
                if mem.underflow(1) {
                    return Err(EngineError::Underflow);
                }
                #[allow(clippy::cast_possible_wrap)]
                let value = mem.peek(0) as i64;
                println!("{value}");
                mem.drop_n(1);
                p += 1;
            }
            Opcode::Load => {
                if mem.underflow(1) {
                    return Err(EngineError::Underflow);
                }
                let addr = mem.peek(0);
                let value = mem.fetch(addr)?;
                mem.set_nth(0, value);
                p += 1;
            }
            Opcode::Store => {
                if mem.underflow(2) {
                    return Err(EngineError::Underflow);
                }
                let addr = mem.peek(0);
                let value = mem.peek(1);
                mem.store(addr, value)?;
                mem.drop_n(2);
                p += 1;
            }
            Opcode::Drop => {
                if mem.underflow(1) {
                    return Err(EngineError::Underflow);
                }
                mem.drop_n(1);
                p += 1;
            }
            Opcode::Swap => {
                if mem.underflow(2) {
                    return Err(EngineError::Underflow);
                }
                let a = mem.peek(0);
                let b = mem.peek(1);
                mem.set_nth(0, b);
                mem.set_nth(1, a);
                p += 1;
            }
            Opcode::Dup => {
                if mem.underflow(1) {
                    return Err(EngineError::Underflow);
                }
                if mem.overflow(1) {
                    return Err(EngineError::Overflow);
                }
                let top = mem.peek(0);
                mem.reserve(1);
                mem.set_nth(0, top);
                p += 1;
            }
            Opcode::Over => {
                if mem.underflow(2) {
                    return Err(EngineError::Underflow);
                }
                if mem.overflow(1) {
                    return Err(EngineError::Overflow);
                }
                let second = mem.peek(1);
                mem.reserve(1);
                mem.set_nth(0, second);
                p += 1;
            }
            Opcode::Rot => {
                if mem.underflow(3) {
                    return Err(EngineError::Underflow);
                }
                let x = mem.peek(2);
                let y = mem.peek(1);
                let z = mem.peek(0);
                mem.set_nth(2, y);
                mem.set_nth(1, z);
                mem.set_nth(0, x);
                p += 1;
            }
            Opcode::Push => {
                if mem.underflow(1) {
                    return Err(EngineError::Underflow);
                }
                if mem.return_overflow() {
                    return Err(EngineError::Overflow);
                }
                let value = mem.peek(0);
                mem.drop_n(1);
                mem.push_return(value);
                p += 1;
            }
            Opcode::Pull => {
                if mem.rsp() == crate::memory::STATE_ADDR {
                    return Err(EngineError::Underflow);
                }
                if mem.overflow(1) {
                    return Err(EngineError::Overflow);
                }
                let value = mem.pop_return();
                mem.reserve(1);
                mem.set_nth(0, value);
                p += 1;
            }
            Opcode::Not => {
                if mem.underflow(1) {
                    return Err(EngineError::Underflow);
                }
                let value = mem.peek(0);
                mem.set_nth(0, !value);
                p += 1;
            }
            Opcode::And => {
                if mem.underflow(2) {
                    return Err(EngineError::Underflow);
                }
                let result = mem.peek(1) & mem.peek(0);
                mem.set_nth(1, result);
                mem.drop_n(1);
                p += 1;
            }
            Opcode::Or => {
                if mem.underflow(2) {
                    return Err(EngineError::Underflow);
                }
                let result = mem.peek(1) | mem.peek(0);
                mem.set_nth(1, result);
                mem.drop_n(1);
                p += 1;
            }
            Opcode::Xor => {
                if mem.underflow(2) {
                    return Err(EngineError::Underflow);
                }
                let result = mem.peek(1) ^ mem.peek(0);
                mem.set_nth(1, result);
                mem.drop_n(1);
                p += 1;
            }
            Opcode::Add => {
                if mem.underflow(2) {
                    return Err(EngineError::Underflow);
                }
                let result = mem.peek(1).wrapping_add(mem.peek(0));
                mem.set_nth(1, result);
                mem.drop_n(1);
                p += 1;
            }
            Opcode::Sub => {
                if mem.underflow(2) {
                    return Err(EngineError::Underflow);
                }
                let result = mem.peek(1).wrapping_sub(mem.peek(0));
                mem.set_nth(1, result);
                mem.drop_n(1);
                p += 1;
            }
            Opcode::Mul => {
                if mem.underflow(2) {
                    return Err(EngineError::Underflow);
                }
                let result = mem.peek(1).wrapping_mul(mem.peek(0));
                mem.set_nth(1, result);
                mem.drop_n(1);
                p += 1;
            }
            Opcode::Div => {
                if mem.underflow(2) {
                    return Err(EngineError::Underflow);
                }
                let divisor = mem.peek(0);
                if divisor == 0 {
                    return Err(EngineError::Fault);
                }
                let result = mem.peek(1) / divisor;
                mem.set_nth(1, result);
                mem.drop_n(1);
                p += 1;
            }
            Opcode::Lsh => {
                if mem.underflow(2) {
                    return Err(EngineError::Underflow);
                }
                let shift = mem.peek(0).min(63);
                #[allow(clippy::cast_possible_truncation)]
                let result = mem.peek(1) << (shift as u32);
                mem.set_nth(1, result);
                mem.drop_n(1);
                p += 1;
            }
            Opcode::Rsh => {
                if mem.underflow(2) {
                    return Err(EngineError::Underflow);
                }
                let shift = mem.peek(0).min(63);
                #[allow(clippy::cast_possible_truncation)]
                let result = mem.peek(1) >> (shift as u32);
                mem.set_nth(1, result);
                mem.drop_n(1);
                p += 1;
            }
            Opcode::Eq => {
                if mem.underflow(2) {
                    return Err(EngineError::Underflow);
                }
                let result = u64::from(mem.peek(1) == mem.peek(0)).wrapping_neg();
                mem.set_nth(1, result);
                mem.drop_n(1);
                p += 1;
            }
            Opcode::Lt => {
                if mem.underflow(2) {
                    return Err(EngineError::Underflow);
                }
                #[allow(clippy::cast_possible_wrap)]
                let (a, b) = (mem.peek(1) as i64, mem.peek(0) as i64);
                let result = u64::from(a < b).wrapping_neg();
                mem.set_nth(1, result);
                mem.drop_n(1);
                p += 1;
            }
        }
    }
}
