//! The compiler: appending threaded code at `HERE`, and the one-time
//! bootstrap that installs every primitive word before the REPL starts.

use crate::dictionary::Dictionary;
use crate::engine::Opcode;
use crate::memory::{HERE_ADDR, LATEST_ADDR, Memory, STATE_ADDR};

/// Addresses of the primitive-bank entries the bootstrap phase compiles,
/// kept around for the compiler's own built-ins (`state`, `here`, `,`,
/// `allot`) and for tests that want to exercise an opcode inline without
/// going through a dictionary lookup.
#[derive(Debug, Clone, Copy)]
pub struct PrimitiveAddrs {
    pub dosem: u64,
    pub dolit: u64,
    pub print: u64,
    pub load: u64,
    pub store: u64,
    pub drop: u64,
    pub swap: u64,
    pub dup: u64,
    pub over: u64,
    pub rot: u64,
    pub push: u64,
    pub pull: u64,
    pub not: u64,
    pub and: u64,
    pub or: u64,
    pub xor: u64,
    pub add: u64,
    pub sub: u64,
    pub mul: u64,
    pub div: u64,
    pub lsh: u64,
    pub rsh: u64,
    pub eq: u64,
    pub lt: u64,
}

/// One-shot VM bootstrap: compiles the primitive bank, wraps each
/// user-visible primitive in a DOCOL-wrapped dictionary entry, and installs
/// the compiler's own built-ins (`state`, `here`, `,`, `allot`).
pub struct Bootstrap;

impl Bootstrap {
    /// Run the bootstrap phase once against a fresh `Memory`, returning the
    /// populated `Dictionary` plus the primitive-bank addresses the REPL's
    /// colon compiler needs directly (`dosem` to close a definition, `dolit`
    /// to compile a literal). Never called again mid-session.
    pub fn install(mem: &mut Memory) -> (Dictionary, PrimitiveAddrs) {
        let mut dict = Dictionary::new();

        let dosem = Self::compile_primitive(mem, Opcode::Dosem);
        let dolit = Self::compile_primitive(mem, Opcode::Dolit);
        let primitives = PrimitiveAddrs {
            dosem,
            dolit,
            print: Self::compile_primitive(mem, Opcode::Print),
            load: Self::compile_primitive(mem, Opcode::Load),
            store: Self::compile_primitive(mem, Opcode::Store),
            drop: Self::compile_primitive(mem, Opcode::Drop),
            swap: Self::compile_primitive(mem, Opcode::Swap),
            dup: Self::compile_primitive(mem, Opcode::Dup),
            over: Self::compile_primitive(mem, Opcode::Over),
            rot: Self::compile_primitive(mem, Opcode::Rot),
            push: Self::compile_primitive(mem, Opcode::Push),
            pull: Self::compile_primitive(mem, Opcode::Pull),
            not: Self::compile_primitive(mem, Opcode::Not),
            and: Self::compile_primitive(mem, Opcode::And),
            or: Self::compile_primitive(mem, Opcode::Or),
            xor: Self::compile_primitive(mem, Opcode::Xor),
            add: Self::compile_primitive(mem, Opcode::Add),
            sub: Self::compile_primitive(mem, Opcode::Sub),
            mul: Self::compile_primitive(mem, Opcode::Mul),
            div: Self::compile_primitive(mem, Opcode::Div),
            lsh: Self::compile_primitive(mem, Opcode::Lsh),
            rsh: Self::compile_primitive(mem, Opcode::Rsh),
            eq: Self::compile_primitive(mem, Opcode::Eq),
            lt: Self::compile_primitive(mem, Opcode::Lt),
        };

        Self::define_primitive_word(mem, &mut dict, "drop", primitives.drop, 1, 0, dosem);
        Self::define_primitive_word(mem, &mut dict, ".", primitives.print, 1, 0, dosem);
        Self::define_primitive_word(mem, &mut dict, "@", primitives.load, 1, 1, dosem);
        Self::define_primitive_word(mem, &mut dict, "!", primitives.store, 2, 0, dosem);
        Self::define_primitive_word(mem, &mut dict, "swap", primitives.swap, 2, 2, dosem);
        Self::define_primitive_word(mem, &mut dict, "dup", primitives.dup, 1, 2, dosem);
        Self::define_primitive_word(mem, &mut dict, "over", primitives.over, 2, 3, dosem);
        Self::define_primitive_word(mem, &mut dict, "rot", primitives.rot, 3, 3, dosem);
        Self::define_primitive_word(mem, &mut dict, "not", primitives.not, 1, 1, dosem);
        Self::define_primitive_word(mem, &mut dict, "and", primitives.and, 2, 1, dosem);
        Self::define_primitive_word(mem, &mut dict, "or", primitives.or, 2, 1, dosem);
        Self::define_primitive_word(mem, &mut dict, "xor", primitives.xor, 2, 1, dosem);
        Self::define_primitive_word(mem, &mut dict, "+", primitives.add, 2, 1, dosem);
        Self::define_primitive_word(mem, &mut dict, "-", primitives.sub, 2, 1, dosem);
        Self::define_primitive_word(mem, &mut dict, "*", primitives.mul, 2, 1, dosem);
        Self::define_primitive_word(mem, &mut dict, "/", primitives.div, 2, 1, dosem);
        Self::define_primitive_word(mem, &mut dict, "<<", primitives.lsh, 2, 1, dosem);
        Self::define_primitive_word(mem, &mut dict, ">>", primitives.rsh, 2, 1, dosem);
        Self::define_primitive_word(mem, &mut dict, "=", primitives.eq, 2, 1, dosem);
        Self::define_primitive_word(mem, &mut dict, "<", primitives.lt, 2, 1, dosem);

        Self::define_state_var(mem, &mut dict, "state", STATE_ADDR, &primitives);
        Self::define_state_var(mem, &mut dict, "here", HERE_ADDR, &primitives);
        Self::define_state_var(mem, &mut dict, "latest", LATEST_ADDR, &primitives);
        Self::define_comma(mem, &mut dict, &primitives);
        Self::define_allot(mem, &mut dict, &primitives);

        (dict, primitives)
    }

    /// Compile `<opcode> NEXT` at HERE and return the opcode's address.
    fn compile_primitive(mem: &mut Memory, opcode: Opcode) -> u64 {
        let addr = mem.here();
        mem.compile(opcode.as_cell());
        mem.compile(Opcode::Next.as_cell());
        addr
    }

    /// Wrap a primitive-bank address in a DOCOL/DOSEM dictionary entry and
    /// register it under `name`.
    fn define_primitive_word(
        mem: &mut Memory,
        dict: &mut Dictionary,
        name: &str,
        primitive_addr: u64,
        inputs: u32,
        outputs: u32,
        dosem: u64,
    ) {
        let entry_addr = mem.here();
        mem.compile(Opcode::Docol.as_cell());
        mem.compile(primitive_addr);
        mem.compile(dosem);
        dict.create(name, entry_addr, inputs, outputs);
    }

    /// `state`/`here`/`latest`: `( -- v )`, pushing the fixed address then
    /// LOADing it, entirely via primitive-bank references (no separate
    /// dictionary lookups at bootstrap time).
    fn define_state_var(mem: &mut Memory, dict: &mut Dictionary, name: &str, addr: u64, primitives: &PrimitiveAddrs) {
        let entry_addr = mem.here();
        mem.compile(Opcode::Docol.as_cell());
        mem.compile(primitives.dolit);
        mem.compile(addr);
        mem.compile(primitives.load);
        mem.compile(primitives.dosem);
        dict.create(name, entry_addr, 0, 1);
    }

    /// `,`: `( v -- )` — store the top of stack at HERE and bump HERE.
    fn define_comma(mem: &mut Memory, dict: &mut Dictionary, primitives: &PrimitiveAddrs) {
        let entry_addr = mem.here();
        mem.compile(Opcode::Docol.as_cell());
        // ( v -- v HERE_ADDR ) ( v H -- ): STORE wants ( value addr ), which
        // is exactly the stack order left after pushing v then HERE's value.
        mem.compile(primitives.dolit);
        mem.compile(HERE_ADDR);
        mem.compile(primitives.load);
        mem.compile(primitives.store);
        // bump HERE by 1: push HERE addr, load, add 1, push HERE addr, store.
        mem.compile(primitives.dolit);
        mem.compile(HERE_ADDR);
        mem.compile(primitives.load);
        mem.compile(primitives.dolit);
        mem.compile(1);
        mem.compile(primitives.add);
        mem.compile(primitives.dolit);
        mem.compile(HERE_ADDR);
        mem.compile(primitives.store);
        mem.compile(primitives.dosem);
        dict.create(",", entry_addr, 1, 0);
    }

    /// `allot`: `( n -- )` advance HERE by n cells.
    fn define_allot(mem: &mut Memory, dict: &mut Dictionary, primitives: &PrimitiveAddrs) {
        let entry_addr = mem.here();
        mem.compile(Opcode::Docol.as_cell());
        mem.compile(primitives.dolit);
        mem.compile(HERE_ADDR);
        mem.compile(primitives.load);
        mem.compile(primitives.add);
        mem.compile(primitives.dolit);
        mem.compile(HERE_ADDR);
        mem.compile(primitives.store);
        mem.compile(primitives.dosem);
        dict.create("allot", entry_addr, 1, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::exec;
    use crate::memory::DEFAULT_DATA_CELLS;

    #[test]
    fn drop_is_wired_to_the_drop_opcode_not_swap() {
        let mut mem = Memory::new(DEFAULT_DATA_CELLS);
        let (dict, _primitives) = Bootstrap::install(&mut mem);
        let drop_entry = dict.lookup("drop").expect("drop should exist");
        mem.push_parameter(1);
        mem.push_parameter(2);
        exec(&mut mem, drop_entry.code_addr).unwrap();
        // If mis-wired to SWAP (the source's bug), the stack would still
        // have two items (1 and 2 swapped) instead of one.
        assert_eq!(mem.pop_parameter(), 1);
        assert_eq!(mem.sp(), crate::memory::PARAM_STACK_SIZE);
    }

    #[test]
    fn arithmetic_words_execute_correctly() {
        let mut mem = Memory::new(DEFAULT_DATA_CELLS);
        let (dict, _primitives) = Bootstrap::install(&mut mem);
        let add = dict.lookup("+").expect("+ should exist");
        mem.push_parameter(2);
        mem.push_parameter(3);
        exec(&mut mem, add.code_addr).unwrap();
        assert_eq!(mem.pop_parameter(), 5);
    }

    #[test]
    fn here_reflects_the_current_here_value() {
        let mut mem = Memory::new(DEFAULT_DATA_CELLS);
        let (dict, _primitives) = Bootstrap::install(&mut mem);
        let here_word = dict.lookup("here").expect("here should exist");
        let expected = mem.here();
        exec(&mut mem, here_word.code_addr).unwrap();
        assert_eq!(mem.pop_parameter(), expected);
    }

    #[test]
    fn comma_writes_top_of_stack_at_here_and_advances_it() {
        let mut mem = Memory::new(DEFAULT_DATA_CELLS);
        let (dict, _primitives) = Bootstrap::install(&mut mem);
        let comma = dict.lookup(",").expect(", should exist");
        let target = mem.here();
        mem.push_parameter(0xABCD);
        exec(&mut mem, comma.code_addr).unwrap();
        assert_eq!(mem.fetch(target).unwrap(), 0xABCD);
        assert_eq!(mem.here(), target + 1);
    }

    #[test]
    fn allot_advances_here_by_n() {
        let mut mem = Memory::new(DEFAULT_DATA_CELLS);
        let (dict, _primitives) = Bootstrap::install(&mut mem);
        let allot = dict.lookup("allot").expect("allot should exist");
        let before = mem.here();
        mem.push_parameter(10);
        exec(&mut mem, allot.code_addr).unwrap();
        assert_eq!(mem.here(), before + 10);
    }
}
