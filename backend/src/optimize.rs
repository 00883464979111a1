//! Pre-emission analysis of a macro body.
//!
//! The JIT runs these passes over the decoded program once per compile.
//! None of them rewrite instructions; they produce facts the translator
//! consults while emitting. Every pass can be switched off through
//! [`OptimizerOptions`] so the differential tests can compare the
//! straightforward translation against the optimized one.

use mme_core::{AluOperation, InsnKind, Instruction, ResultOperation};

/// Per-pass switches. All passes are on by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizerOptions {
    /// Skip carry-flag stores when no ADC/SBB reads the carry.
    pub carry_elision: bool,
    /// Fold ALU operations with an `r0` operand into simpler moves.
    pub zero_register_fold: bool,
    /// Emit nothing for `addi r0, rX, imm [move]`.
    pub dummy_add_elision: bool,
    /// Skip a method set that the next instruction overwrites.
    pub redundant_method_set: bool,
    /// Emit delay-slot plumbing only where a delay slot can occur.
    pub delay_scan: bool,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self::all()
    }
}

impl OptimizerOptions {
    pub const fn all() -> Self {
        Self {
            carry_elision: true,
            zero_register_fold: true,
            dummy_add_elision: true,
            redundant_method_set: true,
            delay_scan: true,
        }
    }

    pub const fn none() -> Self {
        Self {
            carry_elision: false,
            zero_register_fold: false,
            dummy_add_elision: false,
            redundant_method_set: false,
            delay_scan: false,
        }
    }
}

/// Facts about one macro body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analysis {
    /// No instruction reads the carry flag; carry stores can be dropped.
    pub can_skip_carry: bool,
    /// Some instruction may run as a delay slot (or as the slot after an
    /// exit), so the branch holder must be maintained.
    pub has_delayed_pc: bool,
    /// `delay_capable[i]`: instruction `i` may be entered with a pending
    /// transfer in the branch holder.
    pub delay_capable: Vec<bool>,
    /// `skip[i]`: instruction `i` has no observable effect and is not
    /// emitted.
    pub skip: Vec<bool>,
    /// Dummy-add elision enabled.
    pub elide_dummy_adds: bool,
    /// Zero-register folding enabled.
    pub fold_zero_register: bool,
}

impl Analysis {
    #[inline]
    pub fn is_delay_capable(&self, pc: usize) -> bool {
        self.delay_capable.get(pc).copied().unwrap_or(false)
    }

    #[inline]
    pub fn is_skipped(&self, pc: usize) -> bool {
        self.skip.get(pc).copied().unwrap_or(false)
    }
}

/// Run every enabled pass over `code`.
pub fn analyze(code: &[Instruction], opts: &OptimizerOptions) -> Analysis {
    let can_skip_carry = opts.carry_elision && !reads_carry(code);

    let delay_capable: Vec<bool> = (0..code.len())
        .map(|pc| {
            if !opts.delay_scan {
                return true;
            }
            pc > 0 && {
                let prev = &code[pc - 1];
                prev.has_delay_slot() || prev.is_exit
            }
        })
        .collect();
    let has_delayed_pc = delay_capable.iter().any(|&d| d);

    let skip = (0..code.len())
        .map(|pc| {
            opts.redundant_method_set && is_redundant_method_set(code, pc, &delay_capable)
        })
        .collect();

    Analysis {
        can_skip_carry,
        has_delayed_pc,
        delay_capable,
        skip,
        elide_dummy_adds: opts.dummy_add_elision,
        fold_zero_register: opts.zero_register_fold,
    }
}

fn reads_carry(code: &[Instruction]) -> bool {
    code.iter().any(|insn| match insn.kind {
        InsnKind::Alu { op, .. } => op.reads_carry(),
        _ => false,
    })
}

/// `addi rD, rA, imm [move,setm]` whose register and method-address writes
/// are both overwritten by the very next instruction.
fn is_redundant_method_set(code: &[Instruction], pc: usize, delay_capable: &[bool]) -> bool {
    let (Some(cur), Some(next)) = (code.get(pc), code.get(pc + 1)) else {
        return false;
    };
    let InsnKind::AddImmediate {
        dst,
        result: ResultOperation::MoveAndSetMethod,
        ..
    } = cur.kind
    else {
        return false;
    };
    if cur.is_exit || delay_capable[pc] {
        return false;
    }
    if next.reads_register(dst) {
        return false;
    }
    matches!(next.result(), Some((d, ResultOperation::MoveAndSetMethod)) if d == dst)
}

/// Replacement for an ALU operation with one or both operands in `r0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Folded {
    /// Result is 0.
    Zero,
    /// Result is 0xFFFF_FFFF.
    AllOnes,
    /// Result is operand A.
    CopyA,
    /// Result is operand B.
    CopyB,
    /// Result is `-B`.
    NegB,
}

/// Fold an ALU operation whose `a` and/or `b` source is `r0`.
///
/// ADC and SBB are never folded. ADD and SUB are folded only when carry
/// stores are elided, since the fold drops the carry update.
pub fn fold_zero_operand(
    op: AluOperation,
    a_zero: bool,
    b_zero: bool,
    can_skip_carry: bool,
) -> Option<Folded> {
    if !a_zero && !b_zero {
        return None;
    }
    use AluOperation::*;
    Some(match op {
        AddWithCarry | SubtractWithBorrow => return None,
        Add | Subtract if !can_skip_carry => return None,
        Add | Xor | Or => match (a_zero, b_zero) {
            (true, true) => Folded::Zero,
            (true, false) => Folded::CopyB,
            _ => Folded::CopyA,
        },
        Subtract => match (a_zero, b_zero) {
            (true, true) => Folded::Zero,
            (true, false) => Folded::NegB,
            _ => Folded::CopyA,
        },
        And => Folded::Zero,
        AndNot => match (a_zero, b_zero) {
            (true, _) => Folded::Zero,
            _ => Folded::CopyA,
        },
        Nand => Folded::AllOnes,
    })
}
