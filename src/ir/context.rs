// This module defines the mutable state threaded through a lowering pass and the trait
// seams to the external collaborators. LoweringContext owns the growing instruction
// sequence (arena-backed, append-only while committed), the commit flag that separates
// speculative length probing from real emission, handles to the target architecture's
// statement encoder and the byte-level instruction encoder, a general-purpose register
// in-use set, the variable symbol table, and the in-memory data section builder. The
// context is exclusively owned by one lowering pass; concurrent passes each get their
// own instance. add_instruction is called unconditionally by every encode path and
// gates on the commit flag internally, which is what makes ir_length non-destructive:
// the probe clears the flag, re-runs the statement encoder, measures the encoded bytes
// and restores the flag on every exit path. Partially appended instructions are never
// rolled back on error; callers needing retry snapshot instructions_len() and truncate.

//! Lowering context, external interface traits and length probing.

use bumpalo::{collections::Vec as BumpVec, Bump};
use hashbrown::HashMap;
use log::{debug, trace};

use crate::core::{CompileError, CompileResult, RegisterSet};
use crate::x64::opcode::Instruction;
use crate::x64::operand::{Operand, Register, Width};

use super::statement::Statement;
use super::types::IrType;

/// Byte-level instruction encoder, consumed as a black box.
///
/// The core never inspects byte contents, only lengths and success/failure.
pub trait InstructionEncoder {
    fn encode(&self, instruction: &Instruction) -> CompileResult<Vec<u8>>;
}

/// Target architecture abstraction: statement-level lowering entry point.
pub trait Architecture {
    fn encode_statement(
        &self,
        statement: &Statement,
        ctx: &mut LoweringContext<'_>,
    ) -> CompileResult<Vec<Instruction>>;
}

/// Data-section builder: registers opaque byte buffers and assigns them
/// addresses in the compiled artifact.
pub trait DataSectionBuilder {
    /// Register a buffer, returning its assigned address. Registering the
    /// same contents twice yields the same address.
    fn register(&mut self, bytes: &[u8]) -> u64;

    /// Address of a previously registered buffer.
    fn address_of(&self, bytes: &[u8]) -> Option<u64>;
}

/// In-memory data section used by default.
#[derive(Debug, Default)]
pub struct DataSection {
    base: u64,
    contents: Vec<u8>,
    offsets: HashMap<Vec<u8>, u64>,
}

impl DataSection {
    pub fn new(base: u64) -> Self {
        Self {
            base,
            contents: Vec::new(),
            offsets: HashMap::new(),
        }
    }

    /// All registered bytes, in registration order.
    pub fn bytes(&self) -> &[u8] {
        &self.contents
    }
}

impl DataSectionBuilder for DataSection {
    fn register(&mut self, bytes: &[u8]) -> u64 {
        if let Some(&offset) = self.offsets.get(bytes) {
            return self.base + offset;
        }
        let offset = self.contents.len() as u64;
        self.contents.extend_from_slice(bytes);
        self.offsets.insert(bytes.to_vec(), offset);
        trace!("data section: {} bytes at offset {offset:#x}", bytes.len());
        self.base + offset
    }

    fn address_of(&self, bytes: &[u8]) -> Option<u64> {
        self.offsets.get(bytes).map(|offset| self.base + offset)
    }
}

/// A bound variable: where it lives and what type it has.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Symbol {
    pub operand: Operand,
    pub ty: IrType,
}

/// Registers never handed out by the allocator: RSP and RBP hold the stack
/// frame, RAX is the syscall selector and return register.
const RESERVED_GP: RegisterSet = RegisterSet::from_mask(0b0011_0001);

/// Mutable, per-compilation-unit lowering state.
pub struct LoweringContext<'a> {
    arch: &'a dyn Architecture,
    encoder: &'a dyn InstructionEncoder,
    instructions: BumpVec<'a, Instruction>,
    commit: bool,
    gp_in_use: RegisterSet,
    symbols: HashMap<String, Symbol>,
    data: DataSection,
}

impl<'a> LoweringContext<'a> {
    pub fn new(
        arena: &'a Bump,
        arch: &'a dyn Architecture,
        encoder: &'a dyn InstructionEncoder,
    ) -> Self {
        Self {
            arch,
            encoder,
            instructions: BumpVec::new_in(arena),
            commit: true,
            gp_in_use: RegisterSet::new(),
            symbols: HashMap::new(),
            data: DataSection::new(0),
        }
    }

    pub fn with_data_base(mut self, base: u64) -> Self {
        self.data = DataSection::new(base);
        self
    }

    pub fn arch(&self) -> &'a dyn Architecture {
        self.arch
    }

    pub fn encoder(&self) -> &'a dyn InstructionEncoder {
        self.encoder
    }

    pub fn commit(&self) -> bool {
        self.commit
    }

    /// Append an instruction to the emitted sequence.
    ///
    /// Encode paths call this unconditionally; recording only happens in
    /// commit mode, which keeps dry-run probes from leaving residue.
    pub fn add_instruction(&mut self, instruction: Instruction) {
        if self.commit {
            trace!("emit: {instruction}");
            self.instructions.push(instruction);
        }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn instructions_len(&self) -> usize {
        self.instructions.len()
    }

    /// Drop instructions appended after a snapshot; retry support for
    /// callers that speculatively encode.
    pub fn truncate_instructions(&mut self, len: usize) {
        self.instructions.truncate(len);
    }

    /// Run `f` with the commit flag cleared, restoring it on every exit
    /// path, error returns included.
    pub fn probe<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> CompileResult<T>,
    ) -> CompileResult<T> {
        let saved = self.commit;
        self.commit = false;
        let result = f(self);
        self.commit = saved;
        result
    }

    /// Allocate a free general-purpose register at the given width.
    pub fn allocate_gp(&mut self, width: Width) -> CompileResult<Register> {
        let index = self
            .gp_in_use
            .find_first_free(RESERVED_GP)
            .ok_or_else(|| CompileError::RegisterAllocation {
                reason: "no general-purpose registers available".to_string(),
            })?;
        self.gp_in_use.set(index);
        Ok(Register::gp(index, width))
    }

    /// Release a register previously handed out by `allocate_gp`.
    pub fn release_gp(&mut self, reg: Register) {
        self.gp_in_use.clear(reg.index);
    }

    /// Mark a register as holding a live value (callers integrating with an
    /// external allocator use this to declare occupancy).
    pub fn reserve_gp(&mut self, reg: Register) {
        self.gp_in_use.set(reg.index);
    }

    pub fn is_in_use(&self, reg: Register) -> bool {
        self.gp_in_use.contains(reg.index)
    }

    /// Bind a variable name to a freshly allocated register of the type's
    /// width. Rebinding an existing name returns its current location.
    pub fn define_variable(&mut self, name: &str, ty: IrType) -> CompileResult<Operand> {
        if let Some(symbol) = self.symbols.get(name) {
            return Ok(symbol.operand);
        }
        let reg = self.allocate_gp(ty.width())?;
        let operand = Operand::Reg(reg);
        debug!("define {name}: {ty} in {reg}");
        self.symbols.insert(name.to_string(), Symbol { operand, ty });
        Ok(operand)
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn register_data(&mut self, bytes: &[u8]) -> u64 {
        self.data.register(bytes)
    }

    pub fn data_address(&self, bytes: &[u8]) -> Option<u64> {
        self.data.address_of(bytes)
    }

    pub fn data_section(&self) -> &DataSection {
        &self.data
    }
}

/// Encoded byte length of a statement, measured without committing.
///
/// Temporarily clears the commit flag, re-runs the statement through the
/// architecture's encoder, converts the resulting instructions to bytes and
/// sums their lengths. Used by constructs that need a branch target's size
/// before committing, e.g. forward jump distance resolution.
pub fn ir_length(statement: &Statement, ctx: &mut LoweringContext<'_>) -> CompileResult<usize> {
    ctx.probe(|ctx| {
        let arch = ctx.arch();
        let instructions = arch.encode_statement(statement, ctx)?;
        let mut total = 0;
        for instruction in &instructions {
            total += ctx.encoder().encode(instruction)?.len();
        }
        Ok(total)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x64::opcodes;
    use crate::x64::operand::{RAX, RBP, RCX, RSP};

    struct NullArch;
    impl Architecture for NullArch {
        fn encode_statement(
            &self,
            _statement: &Statement,
            _ctx: &mut LoweringContext<'_>,
        ) -> CompileResult<Vec<Instruction>> {
            Ok(Vec::new())
        }
    }

    struct NullEncoder;
    impl InstructionEncoder for NullEncoder {
        fn encode(&self, _instruction: &Instruction) -> CompileResult<Vec<u8>> {
            Ok(vec![0x90])
        }
    }

    fn test_context<'a>(
        arena: &'a Bump,
        arch: &'a dyn Architecture,
        encoder: &'a dyn InstructionEncoder,
    ) -> LoweringContext<'a> {
        LoweringContext::new(arena, arch, encoder)
    }

    #[test]
    fn add_instruction_gates_on_commit() {
        let arena = Bump::new();
        let (arch, encoder) = (NullArch, NullEncoder);
        let mut ctx = test_context(&arena, &arch, &encoder);

        ctx.add_instruction(opcodes::ret());
        assert_eq!(ctx.instructions_len(), 1);

        ctx.probe(|ctx| {
            ctx.add_instruction(opcodes::ret());
            Ok(())
        })
        .unwrap();
        assert_eq!(ctx.instructions_len(), 1);
        assert!(ctx.commit());
    }

    #[test]
    fn probe_restores_commit_on_error() {
        let arena = Bump::new();
        let (arch, encoder) = (NullArch, NullEncoder);
        let mut ctx = test_context(&arena, &arch, &encoder);

        let result: CompileResult<()> = ctx.probe(|_| {
            Err(CompileError::Encoding {
                reason: "boom".to_string(),
            })
        });
        assert!(result.is_err());
        assert!(ctx.commit());
    }

    #[test]
    fn allocator_skips_reserved_registers() {
        let arena = Bump::new();
        let (arch, encoder) = (NullArch, NullEncoder);
        let mut ctx = test_context(&arena, &arch, &encoder);

        let mut seen = Vec::new();
        while let Ok(reg) = ctx.allocate_gp(Width::W64) {
            assert_ne!(reg.index, RAX.index);
            assert_ne!(reg.index, RSP.index);
            assert_ne!(reg.index, RBP.index);
            seen.push(reg.index);
        }
        assert_eq!(seen.len(), 13);

        ctx.release_gp(Register::gp(seen[0], Width::W64));
        assert!(ctx.allocate_gp(Width::W64).is_ok());
    }

    #[test]
    fn define_variable_is_idempotent_per_name() {
        let arena = Bump::new();
        let (arch, encoder) = (NullArch, NullEncoder);
        let mut ctx = test_context(&arena, &arch, &encoder);

        let first = ctx.define_variable("x", IrType::U64).unwrap();
        let second = ctx.define_variable("x", IrType::U64).unwrap();
        assert_eq!(first, second);
        assert_eq!(ctx.lookup("x").unwrap().ty, IrType::U64);
    }

    #[test]
    fn data_section_deduplicates() {
        let mut data = DataSection::new(0x4000);
        let a = data.register(b"abc");
        let b = data.register(b"abc");
        let c = data.register(b"xy");
        assert_eq!(a, 0x4000);
        assert_eq!(a, b);
        assert_eq!(c, 0x4003);
        assert_eq!(data.address_of(b"xy"), Some(0x4003));
        assert_eq!(data.address_of(b"zz"), None);
    }

    #[test]
    fn reserve_and_release_round_trip() {
        let arena = Bump::new();
        let (arch, encoder) = (NullArch, NullEncoder);
        let mut ctx = test_context(&arena, &arch, &encoder);

        assert!(!ctx.is_in_use(RCX));
        ctx.reserve_gp(RCX);
        assert!(ctx.is_in_use(RCX));
        ctx.release_gp(RCX);
        assert!(!ctx.is_in_use(RCX));
    }
}
