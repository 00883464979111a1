use crate::opcode::{AluOperation, BranchCondition, Opcode, Operation, ResultOperation};

/// Sign-extend an 18-bit immediate held in the low bits of `raw`.
#[inline]
pub const fn sign_extend_18(raw: u32) -> i32 {
    ((raw << 14) as i32) >> 14
}

/// Mask covering the low `size` bits.
///
/// The size field is five bits wide, so `size >= 32` never comes out of the
/// decoder; such sizes yield a full-width mask.
#[inline]
pub const fn bitfield_mask(size: u32) -> u32 {
    if size >= 32 {
        u32::MAX
    } else {
        (1u32 << size).wrapping_sub(1)
    }
}

/// Byte offset of a branch target relative to the branch itself.
#[inline]
pub const fn branch_target(immediate: u32) -> i32 {
    sign_extend_18(immediate) * 4
}

/// Decoded operation with only the fields that operation reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsnKind {
    Alu {
        op: AluOperation,
        dst: u8,
        src_a: u8,
        src_b: u8,
        result: ResultOperation,
    },
    AddImmediate {
        dst: u8,
        src_a: u8,
        imm: i32,
        result: ResultOperation,
    },
    ExtractInsert {
        dst: u8,
        src_a: u8,
        src_b: u8,
        src_bit: u8,
        size: u8,
        dst_bit: u8,
        result: ResultOperation,
    },
    ExtractShiftLeftImmediate {
        dst: u8,
        src_a: u8,
        src_b: u8,
        size: u8,
        dst_bit: u8,
        result: ResultOperation,
    },
    ExtractShiftLeftRegister {
        dst: u8,
        src_a: u8,
        src_b: u8,
        src_bit: u8,
        size: u8,
        result: ResultOperation,
    },
    Read {
        dst: u8,
        src_a: u8,
        imm: i32,
        result: ResultOperation,
    },
    /// `offset` is in instruction words relative to the branch.
    Branch {
        cond: BranchCondition,
        annul: bool,
        src_a: u8,
        offset: i32,
    },
    /// Operation 6; executed as a no-op.
    Reserved,
    /// ALU word with an unused sub-operation; executed as a no-op.
    InvalidAlu { raw_op: u32 },
}

/// A decoded macro instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub kind: InsnKind,
    pub is_exit: bool,
}

impl Opcode {
    /// Decode the raw word into a tagged [`Instruction`].
    pub const fn decode(self) -> Instruction {
        let dst = self.dst();
        let src_a = self.src_a();
        let src_b = self.src_b();
        let result = self.result_operation();
        let kind = match self.operation() {
            Operation::Alu => match self.alu_operation() {
                Some(op) => InsnKind::Alu {
                    op,
                    dst,
                    src_a,
                    src_b,
                    result,
                },
                None => InsnKind::InvalidAlu {
                    raw_op: self.alu_operation_raw(),
                },
            },
            Operation::AddImmediate => InsnKind::AddImmediate {
                dst,
                src_a,
                imm: self.immediate(),
                result,
            },
            Operation::ExtractInsert => InsnKind::ExtractInsert {
                dst,
                src_a,
                src_b,
                src_bit: self.bf_src_bit(),
                size: self.bf_size(),
                dst_bit: self.bf_dst_bit(),
                result,
            },
            Operation::ExtractShiftLeftImmediate => InsnKind::ExtractShiftLeftImmediate {
                dst,
                src_a,
                src_b,
                size: self.bf_size(),
                dst_bit: self.bf_dst_bit(),
                result,
            },
            Operation::ExtractShiftLeftRegister => InsnKind::ExtractShiftLeftRegister {
                dst,
                src_a,
                src_b,
                src_bit: self.bf_src_bit(),
                size: self.bf_size(),
                result,
            },
            Operation::Read => InsnKind::Read {
                dst,
                src_a,
                imm: self.immediate(),
                result,
            },
            Operation::Branch => InsnKind::Branch {
                cond: self.branch_condition(),
                annul: self.branch_annul(),
                src_a,
                offset: self.immediate(),
            },
            Operation::Reserved => InsnKind::Reserved,
        };
        Instruction {
            kind,
            is_exit: self.is_exit(),
        }
    }
}

impl Instruction {
    #[inline]
    pub const fn is_branch(&self) -> bool {
        matches!(self.kind, InsnKind::Branch { .. })
    }

    /// Whether this is a branch that executes a delay slot when taken.
    #[inline]
    pub const fn has_delay_slot(&self) -> bool {
        matches!(self.kind, InsnKind::Branch { annul: false, .. })
    }

    /// Destination register and result operation, for value-producing ops.
    pub const fn result(&self) -> Option<(u8, ResultOperation)> {
        match self.kind {
            InsnKind::Alu { dst, result, .. }
            | InsnKind::AddImmediate { dst, result, .. }
            | InsnKind::ExtractInsert { dst, result, .. }
            | InsnKind::ExtractShiftLeftImmediate { dst, result, .. }
            | InsnKind::ExtractShiftLeftRegister { dst, result, .. }
            | InsnKind::Read { dst, result, .. } => Some((dst, result)),
            InsnKind::Branch { .. } | InsnKind::Reserved | InsnKind::InvalidAlu { .. } => None,
        }
    }

    /// Whether the instruction reads register `reg` as a source operand.
    pub const fn reads_register(&self, reg: u8) -> bool {
        match self.kind {
            InsnKind::Alu { src_a, src_b, .. }
            | InsnKind::ExtractInsert { src_a, src_b, .. }
            | InsnKind::ExtractShiftLeftImmediate { src_a, src_b, .. }
            | InsnKind::ExtractShiftLeftRegister { src_a, src_b, .. } => {
                src_a == reg || src_b == reg
            }
            InsnKind::AddImmediate { src_a, .. }
            | InsnKind::Read { src_a, .. }
            | InsnKind::Branch { src_a, .. } => src_a == reg,
            InsnKind::Reserved | InsnKind::InvalidAlu { .. } => false,
        }
    }
}

/// Decode a macro body, warning once about every word that will execute
/// as a no-op.
pub fn decode_program(words: &[u32]) -> Vec<Instruction> {
    words
        .iter()
        .enumerate()
        .map(|(pc, &word)| {
            let insn = Opcode(word).decode();
            match insn.kind {
                InsnKind::Reserved => {
                    log::warn!("macro pc {pc}: reserved operation in 0x{word:08x}, treated as nop");
                }
                InsnKind::InvalidAlu { raw_op } => {
                    log::warn!("macro pc {pc}: unknown ALU operation {raw_op}, treated as nop");
                }
                _ => {}
            }
            insn
        })
        .collect()
}
