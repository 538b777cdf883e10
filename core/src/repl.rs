//! The outer interpreter: tokenizing input, tracking STATE, and driving the
//! engine for each recognized word.

use std::io::Read;

use crate::compiler::{Bootstrap, PrimitiveAddrs};
use crate::dictionary::Dictionary;
use crate::engine::{self, EngineError};
use crate::memory::Memory;

/// `STATE` value while reading top-level input: numbers push, words execute.
pub const STATE_INTERACTIVE: u64 = 0;
/// `STATE` value immediately after `:`, waiting for the new word's name.
pub const STATE_COLON: u64 = 1;
/// `STATE` value while compiling a definition's body, up to the closing `;`.
pub const STATE_COMPILE: u64 = 2;

const MAX_TOKEN_LEN: usize = 255;

fn is_delimiter(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | 0x0B)
}

/// Source of whitespace-delimited input tokens. A production `Repl` is
/// driven from stdin; tests drive it from an in-memory buffer. Both are the
/// same `ReaderTokenSource` parameterized over `std::io::Read`.
pub trait TokenSource {
    /// Returns the next token and whether the delimiter that ended it was a
    /// newline. Returns `None` once the underlying source is exhausted.
    fn next_token(&mut self) -> Option<(String, bool)>;
}

/// A `TokenSource` built over any byte reader, truncating tokens longer than
/// 255 bytes at the boundary rather than treating the overflow as more
/// whitespace-delimited input.
pub struct ReaderTokenSource<R> {
    reader: R,
    pending: Option<u8>,
}

impl<R: Read> ReaderTokenSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, pending: None }
    }

    fn next_byte(&mut self) -> Option<u8> {
        if let Some(b) = self.pending.take() {
            return Some(b);
        }
        let mut buf = [0u8; 1];
        match self.reader.read(&mut buf) {
            Ok(1) => Some(buf[0]),
            _ => None,
        }
    }
}

impl<R: Read> TokenSource for ReaderTokenSource<R> {
    fn next_token(&mut self) -> Option<(String, bool)> {
        let mut b = loop {
            match self.next_byte() {
                None => return None,
                Some(b) if is_delimiter(b) => continue,
                Some(b) => break b,
            }
        };

        let mut token = Vec::with_capacity(MAX_TOKEN_LEN);
        let mut newline_terminated = false;
        loop {
            token.push(b);
            if token.len() == MAX_TOKEN_LEN {
                break;
            }
            match self.next_byte() {
                None => break,
                Some(next) if is_delimiter(next) => {
                    newline_terminated = next == b'\n';
                    break;
                }
                Some(next) => b = next,
            }
        }

        Some((String::from_utf8_lossy(&token).into_owned(), newline_terminated))
    }
}

/// Parse a token as a number the way the outer interpreter does: the whole
/// token must parse as a signed 64-bit integer, reinterpreted as a cell.
/// `i64` rather than `u64` so a leading `-` is accepted; anything that isn't
/// an exact match (trailing garbage, empty string, overflow) is not a number.
fn parse_number(token: &str) -> Option<u64> {
    token.parse::<i64>().ok().map(|n| n as u64)
}

/// The outer interpreter: owns the VM state and drives it token by token.
pub struct Repl {
    mem: Memory,
    dict: Dictionary,
    primitives: PrimitiveAddrs,
    current_def: Option<usize>,
}

impl Repl {
    #[must_use]
    pub fn new(data_cells: u64) -> Self {
        let mut mem = Memory::new(data_cells);
        let (dict, primitives) = Bootstrap::install(&mut mem);
        Self { mem, dict, primitives, current_def: None }
    }

    fn prompt(&self) -> &'static str {
        if self.mem.state() == STATE_INTERACTIVE { "ok> " } else { "..> " }
    }

    /// Current STATE value, exposed for observation the way a CPU core
    /// exposes its registers for inspection without handing out the whole
    /// machine.
    #[must_use]
    pub fn state(&self) -> u64 {
        self.mem.state()
    }

    /// Number of items currently on the parameter stack.
    #[must_use]
    pub fn parameter_stack_depth(&self) -> u64 {
        crate::memory::PARAM_STACK_SIZE - self.mem.sp()
    }

    /// Number of words currently in the dictionary, including shadowed
    /// definitions.
    #[must_use]
    pub fn dictionary_len(&self) -> usize {
        self.dict.len()
    }

    /// True iff `name` resolves to a dictionary entry.
    #[must_use]
    pub fn has_word(&self, name: &str) -> bool {
        self.dict.lookup(name).is_some()
    }

    /// Drive the interpreter to exhaustion of `source`. Returns once the
    /// source reports EOF; fatal invariant violations exit the process from
    /// within `Memory` and never return here.
    pub fn run<S: TokenSource>(&mut self, source: &mut S) {
        let mut fresh_line = true;
        loop {
            if fresh_line {
                eprint!("{}", self.prompt());
            }
            match source.next_token() {
                None => break,
                Some((token, newline_terminated)) => {
                    self.process_token(&token);
                    fresh_line = newline_terminated;
                }
            }
        }
    }

    fn process_token(&mut self, token: &str) {
        match self.mem.state() {
            STATE_INTERACTIVE => self.interactive(token),
            STATE_COLON => self.colon(token),
            STATE_COMPILE => self.compile_token(token),
            other => unreachable!("STATE holds an out-of-range value: {other}"),
        }
    }

    /// `STATE_INTERACTIVE`: numbers push, `:` enters colon-definition mode,
    /// anything else is looked up and executed immediately.
    fn interactive(&mut self, token: &str) {
        if token == ":" {
            self.mem.set_state(STATE_COLON);
            return;
        }
        if let Some(n) = parse_number(token) {
            self.mem.push_parameter(n);
            return;
        }
        self.execute(token);
    }

    /// `STATE_COLON`: the token immediately after `:` names the new word.
    fn colon(&mut self, token: &str) {
        let entry_addr = self.mem.here();
        self.mem.compile(engine::Opcode::Docol.as_cell());
        let idx = self.dict.create(token.to_string(), entry_addr, 0, 0);
        self.current_def = Some(idx);
        self.mem.set_state(STATE_COMPILE);
    }

    /// `STATE_COMPILE`: compile literals and word references into the
    /// definition body until `;` closes it.
    fn compile_token(&mut self, token: &str) {
        if token == ";" {
            self.mem.compile(self.primitives.dosem);
            self.mem.set_state(STATE_INTERACTIVE);
            self.current_def = None;
            return;
        }
        if let Some(n) = parse_number(token) {
            self.mem.compile(self.primitives.dolit);
            self.mem.compile(n);
            if let Some(idx) = self.current_def {
                self.dict.get_mut(idx).outputs += 1;
            }
            return;
        }
        let Some(entry) = self.dict.lookup(token) else {
            eprintln!("{token} not found");
            return;
        };
        if entry.immediate {
            self.execute(token);
            return;
        }
        self.mem.compile(entry.code_addr);
    }

    /// Look the token up and run it, reporting and recovering from both a
    /// missing word and an arity mismatch without touching the stacks.
    fn execute(&mut self, token: &str) {
        let Some(entry) = self.dict.lookup(token) else {
            eprintln!("{token} not found");
            return;
        };
        let (code_addr, inputs) = (entry.code_addr, entry.inputs);
        if self.mem.underflow(inputs as u64) {
            eprintln!("{token} requires {inputs} inputs");
            return;
        }
        if let Err(err) = engine::exec(&mut self.mem, code_addr) {
            self.recover(token, err);
        }
    }

    /// Recoverable engine fault: reset the stacks, keep HERE and the
    /// dictionary, and report a diagnostic.
    fn recover(&mut self, token: &str, err: EngineError) {
        self.mem.reset_stacks();
        eprintln!("{token}: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn source(text: &str) -> ReaderTokenSource<Cursor<Vec<u8>>> {
        ReaderTokenSource::new(Cursor::new(text.as_bytes().to_vec()))
    }

    #[test]
    fn tokenizes_on_all_five_delimiters() {
        let mut src = source("1\t2\r3\n4\x0b5");
        let mut tokens = Vec::new();
        while let Some((t, _)) = src.next_token() {
            tokens.push(t);
        }
        assert_eq!(tokens, vec!["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn reports_newline_termination_only_for_newline_delimiters() {
        let mut src = source("1 2\n3");
        let (_, nl1) = src.next_token().unwrap();
        let (_, nl2) = src.next_token().unwrap();
        assert!(!nl1);
        assert!(nl2);
    }

    #[test]
    fn truncates_tokens_longer_than_255_bytes_without_eating_the_rest() {
        let long = "a".repeat(300);
        let mut src = source(&long);
        let (first, _) = src.next_token().unwrap();
        assert_eq!(first.len(), 255);
        let (second, _) = src.next_token().unwrap();
        assert_eq!(second.len(), 45);
    }

    #[test]
    fn arithmetic_round_trip_leaves_a_clean_stack() {
        let mut repl = Repl::new(4096);
        let mut src = source("2 3 + .\n");
        repl.run(&mut src);
        assert_eq!(repl.mem.sp(), crate::memory::PARAM_STACK_SIZE);
    }

    #[test]
    fn colon_definition_is_callable_afterward() {
        let mut repl = Repl::new(4096);
        let mut src = source(": square dup * ; 7 square .\n");
        repl.run(&mut src);
        assert_eq!(repl.mem.sp(), crate::memory::PARAM_STACK_SIZE);
        assert!(repl.dict.lookup("square").is_some());
    }

    #[test]
    fn unknown_word_in_interactive_mode_leaves_state_untouched() {
        let mut repl = Repl::new(4096);
        let mut src = source("bogus\n");
        repl.run(&mut src);
        assert_eq!(repl.mem.state(), STATE_INTERACTIVE);
    }

    #[test]
    fn too_few_inputs_does_not_corrupt_the_stack() {
        let mut repl = Repl::new(4096);
        let mut src = source(".\n");
        repl.run(&mut src);
        assert_eq!(repl.mem.sp(), crate::memory::PARAM_STACK_SIZE);
    }

    #[test]
    fn recoverable_fault_resets_stacks_but_keeps_the_dictionary() {
        let mut repl = Repl::new(4096);
        let words_before = repl.dict.len();
        let mut src = source("10 0 /\n");
        repl.run(&mut src);
        assert_eq!(repl.mem.sp(), crate::memory::PARAM_STACK_SIZE);
        assert_eq!(repl.dict.len(), words_before);
    }

    #[test]
    fn unknown_word_inside_a_definition_still_lets_semicolon_close_it() {
        let mut repl = Repl::new(4096);
        let mut src = source(": broken nosuchword ; 1 .\n");
        repl.run(&mut src);
        assert_eq!(repl.mem.state(), STATE_INTERACTIVE);
        assert_eq!(repl.mem.sp(), crate::memory::PARAM_STACK_SIZE);
    }

    #[test]
    fn immediate_word_runs_during_compilation_instead_of_being_compiled_in() {
        let mut repl = Repl::new(4096);
        let add_idx = (0..repl.dict.len())
            .find(|&i| repl.dict.get(i).symbol == "+")
            .expect("+ should be bootstrapped");
        repl.dict.mark_immediate(add_idx);

        let mut src = source("2 3 : something + ; something\n");
        repl.run(&mut src);

        // "+" ran at compile time (2 3 -> 5) rather than being compiled into
        // "something"'s body, so calling the empty word afterward is a no-op
        // and a single 5 is left on the stack.
        assert_eq!(
            repl.parameter_stack_depth(),
            1,
            "immediate + should execute once at compile time, not per call"
        );
        assert_eq!(repl.mem.peek(0), 5);
    }
}
