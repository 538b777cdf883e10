//! The cell-addressable memory shared by the stacks, the threaded-code
//! engine, and the compiler.
//!
//! A single [`Vec<u64>`] backs parameter stack, return stack, reserved
//! variables, and compiled code alike — there is no typed instruction
//! stream. This mirrors the source interpreter's single flat `cell *memory`
//! array exactly; LOAD/STORE and the bootstrap words `here`, `,`, `allot`
//! all depend on code and data sharing one address space.

use std::fmt;

/// Number of cells in the parameter-stack region.
pub const PARAM_STACK_SIZE: u64 = 512;
/// Number of cells in the return-stack region.
pub const RETURN_STACK_SIZE: u64 = 512;
/// Number of reserved variable cells (STATE, HERE, LATEST).
pub const RESERVED_VARS: u64 = 3;

/// Address of the `STATE` variable.
pub const STATE_ADDR: u64 = PARAM_STACK_SIZE + RETURN_STACK_SIZE;
/// Address of the `HERE` variable.
pub const HERE_ADDR: u64 = STATE_ADDR + 1;
/// Address of the `LATEST` variable.
pub const LATEST_ADDR: u64 = STATE_ADDR + 2;
/// First address of the data/code area. `HERE` is initialized to this.
pub const DATA_START: u64 = STATE_ADDR + RESERVED_VARS;

/// Default size of the data/code area, in cells, absent a `-d` flag.
pub const DEFAULT_DATA_CELLS: u64 = 4096;

/// A faulting memory operand address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault;

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid data address")
    }
}

impl std::error::Error for Fault {}

/// The VM's flat memory, parameter stack, and return stack.
pub struct Memory {
    cells: Vec<u64>,
    sp: u64,
    rsp: u64,
}

impl Memory {
    /// Allocate and zero a memory of `data_cells` cells in the data/code
    /// area, on top of the fixed-size stack and reserved-variable regions.
    /// `HERE` is initialized to [`DATA_START`].
    #[must_use]
    pub fn new(data_cells: u64) -> Self {
        let total = DATA_START + data_cells;
        let mut cells = vec![0u64; total as usize];
        cells[HERE_ADDR as usize] = DATA_START;
        Self {
            cells,
            sp: PARAM_STACK_SIZE,
            rsp: STATE_ADDR,
        }
    }

    /// Total number of cells in this memory, including stacks.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.cells.len() as u64
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[must_use]
    pub fn sp(&self) -> u64 {
        self.sp
    }

    #[must_use]
    pub fn rsp(&self) -> u64 {
        self.rsp
    }

    /// True iff `addr` is outside the fault-protected region
    /// `[STATE_ADDR, len)`. Reserved variables and the data/code area both
    /// lie inside this region; only the stack regions below it fault.
    #[must_use]
    pub fn fault(&self, addr: u64) -> bool {
        addr < STATE_ADDR || addr >= self.len()
    }

    /// True iff fewer than `n` free slots remain below the parameter stack
    /// pointer — i.e. `n` more pushes would run off the bottom of memory.
    #[must_use]
    pub fn overflow(&self, n: u64) -> bool {
        self.sp < n
    }

    /// True iff fewer than `n` items are present on the parameter stack.
    #[must_use]
    pub fn underflow(&self, n: u64) -> bool {
        self.sp > PARAM_STACK_SIZE.saturating_sub(n)
    }

    /// Fault-checked read.
    pub fn fetch(&self, addr: u64) -> Result<u64, Fault> {
        if self.fault(addr) {
            return Err(Fault);
        }
        Ok(self.cells[addr as usize])
    }

    /// Fault-checked write.
    pub fn store(&mut self, addr: u64, value: u64) -> Result<(), Fault> {
        if self.fault(addr) {
            return Err(Fault);
        }
        self.cells[addr as usize] = value;
        Ok(())
    }

    /// Trusted read of a cell whose address has already been bounds-checked
    /// by the caller (the engine's per-iteration I/W/P fault check). Used
    /// for threaded-code traversal, never for user-supplied operand
    /// addresses — those always go through [`Memory::fetch`].
    pub(crate) fn cell(&self, addr: u64) -> u64 {
        self.cells[addr as usize]
    }

    /// Read the `n`th cell from the parameter stack top (`n = 0` is TOS)
    /// without removing it — the spec's `peek(n)` operation. Panics if out
    /// of bounds; callers must check `underflow` first, exactly as the
    /// source's opcode bodies do before indexing.
    #[must_use]
    pub fn peek(&self, n: u64) -> u64 {
        self.cells[(self.sp + n) as usize]
    }

    pub(crate) fn set_nth(&mut self, n: u64, value: u64) {
        self.cells[(self.sp + n) as usize] = value;
    }

    /// Pop `n` items off the parameter stack without returning them.
    pub(crate) fn drop_n(&mut self, n: u64) {
        self.sp += n;
    }

    /// Reserve `n` slots above the current top, for opcodes (DUP, OVER)
    /// that grow the stack before writing the new top.
    pub(crate) fn reserve(&mut self, n: u64) {
        self.sp -= n;
    }

    /// Push onto the parameter stack. Hard-stops the process if the
    /// parameter stack is completely full — unreachable from user input if
    /// the engine's own `overflow` check ran first; this guards only
    /// against an engine bug.
    pub fn push_parameter(&mut self, value: u64) {
        if self.sp == 0 {
            eprintln!("fatal stack overflow");
            std::process::exit(1);
        }
        self.sp -= 1;
        self.cells[self.sp as usize] = value;
    }

    /// Pop from the parameter stack. Hard-stops on an empty stack; see
    /// [`Memory::push_parameter`].
    pub fn pop_parameter(&mut self) -> u64 {
        if self.sp == PARAM_STACK_SIZE {
            eprintln!("fatal stack underflow");
            std::process::exit(1);
        }
        let value = self.cells[self.sp as usize];
        self.sp += 1;
        value
    }

    /// True iff the return stack has no room for another push.
    pub(crate) fn return_overflow(&self) -> bool {
        self.rsp == PARAM_STACK_SIZE
    }

    /// Push onto the return stack. Hard-stops on a full return stack; see
    /// [`Memory::push_parameter`].
    pub fn push_return(&mut self, value: u64) {
        if self.rsp == PARAM_STACK_SIZE {
            eprintln!("fatal rstack overflow");
            std::process::exit(1);
        }
        self.rsp -= 1;
        self.cells[self.rsp as usize] = value;
    }

    /// Pop from the return stack. Hard-stops if it is already empty; see
    /// [`Memory::push_parameter`].
    pub fn pop_return(&mut self) -> u64 {
        if self.rsp == STATE_ADDR {
            eprintln!("fatal rstack underflow");
            std::process::exit(1);
        }
        let value = self.cells[self.rsp as usize];
        self.rsp += 1;
        value
    }

    /// Append a cell at `HERE`, bumping `HERE`. Hard-stops if memory is
    /// exhausted — this is always an implementation or extreme-input bug,
    /// never a condition the outer interpreter is expected to recover from.
    pub fn compile(&mut self, value: u64) {
        let here = self.here();
        if here >= self.len() {
            eprintln!("memory overflow");
            std::process::exit(1);
        }
        self.cells[here as usize] = value;
        self.set_here(here + 1);
    }

    #[must_use]
    pub fn here(&self) -> u64 {
        self.cells[HERE_ADDR as usize]
    }

    pub fn set_here(&mut self, value: u64) {
        self.cells[HERE_ADDR as usize] = value;
    }

    #[must_use]
    pub fn state(&self) -> u64 {
        self.cells[STATE_ADDR as usize]
    }

    pub fn set_state(&mut self, value: u64) {
        self.cells[STATE_ADDR as usize] = value;
    }

    /// Reset the parameter and return stacks to empty, leaving `HERE`, the
    /// compiled dictionary contents, and every other data cell untouched.
    /// Used by the REPL after a recoverable engine error (see the restart
    /// policy in the design notes): the redesigned behavior keeps the
    /// session's compiled words alive across a fault instead of rebuilding
    /// the VM from scratch.
    pub fn reset_stacks(&mut self) {
        self.sp = PARAM_STACK_SIZE;
        self.rsp = STATE_ADDR;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_memory_has_empty_stacks_and_here_at_data_start() {
        let mem = Memory::new(DEFAULT_DATA_CELLS);
        assert_eq!(mem.sp(), PARAM_STACK_SIZE);
        assert_eq!(mem.rsp(), STATE_ADDR);
        assert_eq!(mem.here(), DATA_START);
        assert_eq!(mem.state(), 0);
    }

    #[test]
    fn push_pop_parameter_round_trips() {
        let mut mem = Memory::new(DEFAULT_DATA_CELLS);
        mem.push_parameter(42);
        assert_eq!(mem.sp(), PARAM_STACK_SIZE - 1);
        assert_eq!(mem.pop_parameter(), 42);
        assert_eq!(mem.sp(), PARAM_STACK_SIZE);
    }

    #[test]
    fn push_pop_return_round_trips() {
        let mut mem = Memory::new(DEFAULT_DATA_CELLS);
        mem.push_return(7);
        assert_eq!(mem.rsp(), STATE_ADDR - 1);
        assert_eq!(mem.pop_return(), 7);
        assert_eq!(mem.rsp(), STATE_ADDR);
    }

    #[test]
    fn fetch_store_round_trip_in_data_area() {
        let mut mem = Memory::new(DEFAULT_DATA_CELLS);
        mem.store(DATA_START, 99).unwrap();
        assert_eq!(mem.fetch(DATA_START).unwrap(), 99);
    }

    #[test]
    fn fetch_faults_below_state_addr() {
        let mem = Memory::new(DEFAULT_DATA_CELLS);
        assert!(mem.fetch(0).is_err());
        assert!(mem.fetch(PARAM_STACK_SIZE - 1).is_err());
    }

    #[test]
    fn fetch_faults_at_or_past_len() {
        let mem = Memory::new(4);
        let len = mem.len();
        assert!(mem.fetch(len).is_err());
    }

    #[test]
    fn state_here_latest_are_not_faults() {
        let mem = Memory::new(DEFAULT_DATA_CELLS);
        assert!(mem.fetch(STATE_ADDR).is_ok());
        assert!(mem.fetch(HERE_ADDR).is_ok());
        assert!(mem.fetch(LATEST_ADDR).is_ok());
    }

    #[test]
    fn overflow_and_underflow_reflect_free_and_present_slots() {
        let mut mem = Memory::new(DEFAULT_DATA_CELLS);
        assert!(mem.underflow(1));
        assert!(!mem.overflow(1));
        mem.push_parameter(1);
        assert!(!mem.underflow(1));
        assert!(mem.underflow(2));
    }

    #[test]
    fn overflow_is_false_when_exactly_n_slots_are_free() {
        // A fresh stack has PARAM_STACK_SIZE free slots below SP; asking
        // for exactly that many more pushes must not report overflow.
        let mem = Memory::new(DEFAULT_DATA_CELLS);
        assert!(!mem.overflow(PARAM_STACK_SIZE));
        assert!(mem.overflow(PARAM_STACK_SIZE + 1));
    }

    #[test]
    fn return_stack_is_empty_not_full_on_a_fresh_vm() {
        let mem = Memory::new(DEFAULT_DATA_CELLS);
        assert!(!mem.return_overflow());
    }

    #[test]
    fn return_overflow_is_true_only_once_the_return_stack_is_completely_full() {
        let mut mem = Memory::new(DEFAULT_DATA_CELLS);
        for _ in 0..RETURN_STACK_SIZE {
            assert!(!mem.return_overflow());
            mem.push_return(0);
        }
        assert!(mem.return_overflow());
    }

    #[test]
    fn compile_appends_at_here_and_advances_it() {
        let mut mem = Memory::new(DEFAULT_DATA_CELLS);
        let start = mem.here();
        mem.compile(123);
        assert_eq!(mem.fetch(start).unwrap(), 123);
        assert_eq!(mem.here(), start + 1);
    }

    #[test]
    fn reset_stacks_leaves_here_and_data_untouched() {
        let mut mem = Memory::new(DEFAULT_DATA_CELLS);
        mem.compile(55);
        let here_before = mem.here();
        mem.push_parameter(1);
        mem.push_return(2);
        mem.reset_stacks();
        assert_eq!(mem.sp(), PARAM_STACK_SIZE);
        assert_eq!(mem.rsp(), STATE_ADDR);
        assert_eq!(mem.here(), here_before);
    }
}
