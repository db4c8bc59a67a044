// This module implements instruction selection's lookup machinery. OpcodeMap is a dense
// (kind x width) table mapping an operand classification to the ordered list of opcode
// definitions whose abstract pattern at one argument position is compatible with it;
// one map exists per argument position, built once from a definition list and read-only
// afterwards. Build-time fan-out expands each abstract pattern into every concrete
// (kind, width) bucket it legally covers (an r/m8 pattern covers register, indirect,
// displaced and RIP-relative operands at width 8 plus SIB at pointer width; an imm64
// pattern also accepts a 64-bit float immediate by bit reinterpretation). Resolution
// intersects per-position candidate sets while enforcing the register-addressing
// legality rules: high-byte registers exclude REX-family encodings, and REX-only byte
// registers or register indices >= 8 require one. Ties among survivors break by sorting
// on the first position's pattern ordinal and taking the first; the result is always
// exactly one definition or none.

//! Opcode tables: per-position build and filter-and-intersect resolution.

use log::trace;

use super::opcode::{Extension, Opcode, OperandPattern};
use super::operand::{classify, Operand, OperandKind, Width, KIND_COUNT, WIDTH_COUNT};

/// Lookup table from (kind, width) to candidate opcode definitions for one
/// argument position. Built once, read-only thereafter.
#[derive(Debug)]
pub struct OpcodeMap<'a> {
    buckets: [[Vec<&'a Opcode>; WIDTH_COUNT]; KIND_COUNT],
}

impl<'a> OpcodeMap<'a> {
    fn empty() -> Self {
        Self {
            buckets: std::array::from_fn(|_| std::array::from_fn(|_| Vec::new())),
        }
    }

    /// Build the lookup table for one argument position.
    ///
    /// Panics if a definition declares fewer operand-pattern slots than
    /// `position` requires: that is a malformed static opcode table, an
    /// unrecoverable configuration fault, not a runtime error path.
    pub fn build(definitions: &'a [Opcode], position: usize) -> Self {
        let mut map = Self::empty();
        for opcode in definitions {
            if position >= opcode.operands.len() {
                panic!(
                    "opcode {} expects only {} operands, queried position {}",
                    opcode,
                    opcode.operands.len(),
                    position
                );
            }
            map.fan_out(opcode, opcode.operands[position]);
        }
        map
    }

    fn add(&mut self, kind: OperandKind, width: Width, opcode: &'a Opcode) {
        self.buckets[kind.table_index()][width.table_index()].push(opcode);
    }

    /// Expand one abstract pattern into its concrete (kind, width) buckets.
    fn fan_out(&mut self, opcode: &'a Opcode, pattern: OperandPattern) {
        use OperandKind::*;
        use OperandPattern as P;
        use Width::*;
        match pattern {
            P::Rel8 => self.add(UnsignedImmediate, W8, opcode),
            P::Rel16 => self.add(UnsignedImmediate, W16, opcode),
            P::Rel32 => self.add(UnsignedImmediate, W32, opcode),
            P::Rm8 | P::Rm16 | P::Rm32 | P::Rm64 => {
                let width = match pattern {
                    P::Rm8 => W8,
                    P::Rm16 => W16,
                    P::Rm32 => W32,
                    _ => W64,
                };
                self.add(Register, width, opcode);
                self.add(IndirectRegister, width, opcode);
                self.add(DisplacedRegister, width, opcode);
                self.add(RipRelative, width, opcode);
                // SIB addressing classifies at pointer width regardless of
                // the referenced data width.
                self.add(SibRegister, W64, opcode);
            }
            P::M => {
                self.add(DisplacedRegister, W64, opcode);
                self.add(RipRelative, W64, opcode);
            }
            P::M16 => self.add(IndirectRegister, W16, opcode),
            P::M32 => self.add(IndirectRegister, W32, opcode),
            P::M64 => self.add(IndirectRegister, W64, opcode),
            P::Imm8 => self.add(UnsignedImmediate, W8, opcode),
            P::Imm16 => self.add(UnsignedImmediate, W16, opcode),
            P::Imm32 => self.add(UnsignedImmediate, W32, opcode),
            P::Imm64 => {
                // A 64-bit immediate slot also accepts a float64 bit pattern.
                self.add(UnsignedImmediate, W64, opcode);
                self.add(FloatImmediate, W64, opcode);
            }
            P::R8 => self.add(Register, W8, opcode),
            P::R16 => self.add(Register, W16, opcode),
            P::R32 => self.add(Register, W32, opcode),
            P::R64 => self.add(Register, W64, opcode),
            P::Xmm1 | P::Xmm2 => self.add(Register, W128, opcode),
            P::Xmm1M64 | P::Xmm2M64 => {
                self.add(Register, W128, opcode);
                self.add(Register, W64, opcode);
                self.add(IndirectRegister, W64, opcode);
                self.add(RipRelative, W64, opcode);
                self.add(SibRegister, W64, opcode);
            }
            P::Xmm2M128 => {
                self.add(Register, W128, opcode);
                self.add(Register, W64, opcode);
                self.add(RipRelative, W64, opcode);
            }
            P::Ymm1 | P::Ymm2 => self.add(Register, W256, opcode),
        }
    }

    /// Candidates for a (kind, width) classification, in insertion order.
    pub fn bucket(&self, kind: OperandKind, width: Width) -> &[&'a Opcode] {
        &self.buckets[kind.table_index()][width.table_index()]
    }
}

/// One opcode map per argument position for a single logical operation.
#[derive(Debug)]
pub struct OpcodeMaps<'a> {
    maps: Vec<OpcodeMap<'a>>,
}

impl<'a> OpcodeMaps<'a> {
    /// Build per-position maps for an operation taking `arg_count` operands.
    pub fn build(definitions: &'a [Opcode], arg_count: usize) -> Self {
        let maps = (0..arg_count)
            .map(|position| OpcodeMap::build(definitions, position))
            .collect();
        Self { maps }
    }

    pub fn arg_count(&self) -> usize {
        self.maps.len()
    }

    /// Deterministically select the one opcode definition legal for the
    /// given concrete operands, or `None` when no candidate survives.
    ///
    /// A partial operand list (an absent position) never resolves. Ties
    /// among structurally matching survivors break by ascending first
    /// operand-pattern ordinal, first wins.
    pub fn resolve(&self, operands: &[Option<Operand>]) -> Option<&'a Opcode> {
        let mut picks: Vec<&'a Opcode> = Vec::new();

        for (position, map) in self.maps.iter().enumerate() {
            let operand = operands.get(position).copied().flatten()?;
            let (kind, width) = classify(&operand);
            let matches = map.bucket(kind, width);
            if matches.is_empty() {
                trace!("resolve: no candidates at position {position} for {operand}");
                return None;
            }

            let register = match operand {
                Operand::Reg(r) => Some(r),
                _ => None,
            };

            let mut survivors: Vec<&'a Opcode> = Vec::new();
            for &opcode in matches {
                if let Some(reg) = register {
                    // High-byte registers exist only in the legacy encoding.
                    if reg.is_high_byte()
                        && (opcode.has_extension(Extension::Rex)
                            || opcode.has_extension(Extension::RexW))
                    {
                        continue;
                    }
                    // REX-only byte registers and the extended register file
                    // are inexpressible without a REX/VEX prefix.
                    if reg.requires_extension()
                        && !(opcode.has_extension(Extension::Rex)
                            || opcode.has_extension(Extension::RexW)
                            || opcode.has_extension(Extension::Vex128)
                            || opcode.has_extension(Extension::Vex256))
                    {
                        continue;
                    }
                }
                if position == 0 || picks.contains(&opcode) {
                    survivors.push(opcode);
                }
            }
            picks = survivors;
        }

        if picks.is_empty() {
            return None;
        }
        picks.sort_by_key(|opcode| opcode.operands[0].ordinal());
        trace!("resolve: picked {} of {} survivors", picks[0], picks.len());
        picks.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x64::opcode::Mnemonic;
    use crate::x64::operand::{AH, AL, R8, R9B, RAX, RCX, SIL};

    const MOV_RM8_IMM8: Opcode = Opcode::new(
        Mnemonic::Mov,
        &[OperandPattern::Rm8, OperandPattern::Imm8],
        &[],
    );
    const MOV_RM8_IMM8_REX: Opcode = Opcode::new(
        Mnemonic::Mov,
        &[OperandPattern::Rm8, OperandPattern::Imm8],
        &[Extension::Rex],
    );
    const MOV_R8_IMM8: Opcode = Opcode::new(
        Mnemonic::Mov,
        &[OperandPattern::R8, OperandPattern::Imm8],
        &[],
    );
    const MOV_R64_IMM64: Opcode = Opcode::new(
        Mnemonic::Mov,
        &[OperandPattern::R64, OperandPattern::Imm64],
        &[Extension::RexW],
    );

    #[test]
    fn build_then_resolve_unique_match() {
        let defs = [MOV_RM8_IMM8, MOV_R64_IMM64];
        let maps = OpcodeMaps::build(&defs, 2);

        let picked = maps
            .resolve(&[Some(Operand::Reg(RAX)), Some(Operand::U64(42))])
            .unwrap();
        assert_eq!(*picked, MOV_R64_IMM64);

        let picked = maps
            .resolve(&[Some(Operand::Reg(AL)), Some(Operand::U8(42))])
            .unwrap();
        assert_eq!(*picked, MOV_RM8_IMM8);
    }

    #[test]
    fn resolution_is_deterministic() {
        let defs = [MOV_RM8_IMM8, MOV_RM8_IMM8_REX, MOV_R8_IMM8, MOV_R64_IMM64];
        let maps = OpcodeMaps::build(&defs, 2);
        let operands = [Some(Operand::Reg(AL)), Some(Operand::U8(7))];
        let first = maps.resolve(&operands).unwrap();
        for _ in 0..32 {
            assert_eq!(maps.resolve(&operands), Some(first));
        }
    }

    #[test]
    fn tie_break_sorts_by_first_pattern_ordinal() {
        // Both forms structurally match (r8, imm8); the r/m form's ordinal
        // sorts first, so it must win regardless of declaration order.
        let defs = [MOV_R8_IMM8, MOV_RM8_IMM8];
        let maps = OpcodeMaps::build(&defs, 2);
        let picked = maps
            .resolve(&[Some(Operand::Reg(AL)), Some(Operand::U8(1))])
            .unwrap();
        assert_eq!(picked.operands[0], OperandPattern::Rm8);
    }

    #[test]
    fn high_byte_registers_never_resolve_to_rex_encodings() {
        let defs = [MOV_RM8_IMM8_REX];
        let maps = OpcodeMaps::build(&defs, 2);
        assert_eq!(
            maps.resolve(&[Some(Operand::Reg(AH)), Some(Operand::U8(1))]),
            None
        );

        // With a legacy form present, AH resolves to it.
        let defs = [MOV_RM8_IMM8_REX, MOV_RM8_IMM8];
        let maps = OpcodeMaps::build(&defs, 2);
        let picked = maps
            .resolve(&[Some(Operand::Reg(AH)), Some(Operand::U8(1))])
            .unwrap();
        assert!(!picked.has_any_extension());
    }

    #[test]
    fn extended_registers_require_a_prefix_extension() {
        let legacy_only = [MOV_RM8_IMM8];
        let maps = OpcodeMaps::build(&legacy_only, 2);
        assert_eq!(
            maps.resolve(&[Some(Operand::Reg(SIL)), Some(Operand::U8(1))]),
            None
        );
        assert_eq!(
            maps.resolve(&[Some(Operand::Reg(R9B)), Some(Operand::U8(1))]),
            None
        );

        let with_rex = [MOV_RM8_IMM8, MOV_RM8_IMM8_REX];
        let maps = OpcodeMaps::build(&with_rex, 2);
        let picked = maps
            .resolve(&[Some(Operand::Reg(SIL)), Some(Operand::U8(1))])
            .unwrap();
        assert!(picked.has_extension(Extension::Rex));
    }

    #[test]
    fn index_ge_8_requires_a_prefix_extension() {
        const MOV_RM64_R64: Opcode = Opcode::new(
            Mnemonic::Mov,
            &[OperandPattern::Rm64, OperandPattern::R64],
            &[],
        );
        const MOV_RM64_R64_REXW: Opcode = Opcode::new(
            Mnemonic::Mov,
            &[OperandPattern::Rm64, OperandPattern::R64],
            &[Extension::RexW],
        );

        let legacy_only = [MOV_RM64_R64];
        let maps = OpcodeMaps::build(&legacy_only, 2);
        assert_eq!(
            maps.resolve(&[Some(Operand::Reg(R8)), Some(Operand::Reg(RCX))]),
            None
        );

        let both = [MOV_RM64_R64, MOV_RM64_R64_REXW];
        let maps = OpcodeMaps::build(&both, 2);
        let picked = maps
            .resolve(&[Some(Operand::Reg(R8)), Some(Operand::Reg(RCX))])
            .unwrap();
        assert!(picked.has_extension(Extension::RexW));
    }

    #[test]
    fn absent_operand_never_resolves() {
        let defs = [MOV_RM8_IMM8];
        let maps = OpcodeMaps::build(&defs, 2);
        assert_eq!(maps.resolve(&[Some(Operand::Reg(AL)), None]), None);
        assert_eq!(maps.resolve(&[None, Some(Operand::U8(1))]), None);
        assert_eq!(maps.resolve(&[Some(Operand::Reg(AL))]), None);
    }

    #[test]
    fn empty_bucket_fails_immediately() {
        let defs = [MOV_RM8_IMM8];
        let maps = OpcodeMaps::build(&defs, 2);
        // A 32-bit register has no bucket in an 8-bit-only table.
        assert_eq!(
            maps.resolve(&[Some(Operand::Reg(RAX)), Some(Operand::U8(1))]),
            None
        );
    }

    #[test]
    fn imm64_bucket_accepts_float64_bit_patterns() {
        let defs = [MOV_R64_IMM64];
        let maps = OpcodeMaps::build(&defs, 2);
        let picked = maps
            .resolve(&[Some(Operand::Reg(RAX)), Some(Operand::F64(2.5))])
            .unwrap();
        assert_eq!(*picked, MOV_R64_IMM64);
    }

    #[test]
    fn signed_immediates_have_no_buckets() {
        let defs = [MOV_RM8_IMM8, MOV_R64_IMM64];
        let maps = OpcodeMaps::build(&defs, 2);
        assert_eq!(
            maps.resolve(&[Some(Operand::Reg(AL)), Some(Operand::I8(1))]),
            None
        );
    }

    #[test]
    #[should_panic(expected = "expects only")]
    fn build_panics_on_malformed_table() {
        const PUSH_R64: Opcode = Opcode::new(Mnemonic::Push, &[OperandPattern::R64], &[]);
        let defs = [PUSH_R64];
        let _ = OpcodeMaps::build(&defs, 2);
    }

    #[test]
    fn zero_position_maps_resolve_nothing() {
        let defs = [MOV_RM8_IMM8];
        let maps = OpcodeMaps::build(&defs, 0);
        assert_eq!(maps.resolve(&[]), None);
    }
}
