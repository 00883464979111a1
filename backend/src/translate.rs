//! Macro to x86-64 translation.
//!
//! One pass over the decoded program, emitting straight-line host code per
//! macro instruction. Macro registers live in [`JitState`]; the persistent
//! host registers (see [`crate::x86_64::regs`]) hold the parameter cursor,
//! the method address and the pending branch target.
//!
//! Delayed control flow uses the branch holder: a taken branch with a
//! delay slot loads the target address into it and falls into the next
//! instruction, and every instruction that may sit in a delay slot checks
//! the holder after its body and jumps through it when set. The exit flag
//! reuses the same mechanism with the exit path as the target.

use std::collections::BTreeMap;

use mme_core::{
    bitfield_mask, AluOperation, InsnKind, Instruction, MacroError, ResultOperation, Result,
};

use crate::code_buffer::CodeBuffer;
use crate::label::Label;
use crate::optimize::{analyze, fold_zero_operand, Analysis, Folded, OptimizerOptions};
use crate::runtime::{
    jit_read, jit_send, state_register, ExitStatus, JitProgram, STATE_CARRY, STATE_FAULT_ARG,
    STATE_METHOD_ADDRESS, STATE_PARAM_CURSOR, STATE_PARAM_END, STATE_STATUS,
};
use crate::x86_64::emitter::*;
use crate::x86_64::regs::{
    Reg, BRANCH_HOLDER, CALLEE_SAVED, CALL_ARG_REGS, METHOD_ADDRESS, PARAMETERS, PARAMETERS_END,
    RESULT, SAVED_AROUND_CALLS, SCRATCH_B, SCRATCH_C, STATE,
};

/// Whether this host can run the generated code.
pub const fn host_supported() -> bool {
    cfg!(all(target_arch = "x86_64", unix))
}

/// Compile a decoded macro body into an executable [`JitProgram`].
pub fn compile(
    code: &[Instruction],
    opts: &OptimizerOptions,
    buffer_size: usize,
) -> Result<JitProgram> {
    if !host_supported() {
        return Err(MacroError::JitUnsupported);
    }
    let analysis = analyze(code, opts);
    let buf = CodeBuffer::new(buffer_size)?;
    let mut t = Translator::new(code, &analysis, buf);
    t.emit_program();

    let Translator { buf, .. } = t;
    if buf.is_exhausted() {
        return Err(MacroError::JitBufferExhausted {
            capacity: buf.capacity(),
        });
    }
    buf.set_executable()?;
    log::debug!(
        "jit: compiled {} instructions into {} bytes",
        code.len(),
        buf.offset()
    );
    // SAFETY: emit_program wrote a complete function at offset 0 and the
    // buffer is now executable.
    Ok(unsafe { JitProgram::from_buffer(buf, code.len()) })
}

/// Where a jump goes.
#[derive(Debug, Clone, Copy)]
enum Target {
    Insn(usize),
    Fault(ExitStatus, u32),
    Exit,
}

struct Translator<'a> {
    code: &'a [Instruction],
    analysis: &'a Analysis,
    buf: CodeBuffer,
    /// One label per instruction boundary.
    labels: Vec<Label>,
    /// Fault stubs keyed by (status, fault argument).
    stubs: BTreeMap<(ExitStatus, u32), Label>,
    exit: Label,
}

impl<'a> Translator<'a> {
    fn new(code: &'a [Instruction], analysis: &'a Analysis, buf: CodeBuffer) -> Self {
        Self {
            code,
            analysis,
            buf,
            labels: vec![Label::new(); code.len()],
            stubs: BTreeMap::new(),
            exit: Label::new(),
        }
    }

    fn emit_program(&mut self) {
        self.emit_prologue();
        for pc in 0..self.code.len() {
            self.labels[pc].bind(&mut self.buf);
            self.emit_insn(pc);
        }
        // Running off the end fetches outside the body.
        let len = self.code.len();
        self.jump(None, self.resolve(len as i64));
        self.emit_stubs();
        self.emit_epilogue();
    }

    // -- Frame --

    fn emit_prologue(&mut self) {
        for &reg in CALLEE_SAVED {
            emit_push(&mut self.buf, reg);
        }
        emit_mov_rr(&mut self.buf, true, STATE, CALL_ARG_REGS[0]);
        emit_mov_rr(&mut self.buf, true, PARAMETERS, CALL_ARG_REGS[1]);
        emit_load(&mut self.buf, true, PARAMETERS_END, STATE, STATE_PARAM_END);
        emit_mov_ri(&mut self.buf, false, METHOD_ADDRESS, 0);
        if self.analysis.has_delayed_pc {
            emit_mov_ri(&mut self.buf, false, BRANCH_HOLDER, 0);
        }
        // r1 <- params[0]; the caller guarantees one parameter.
        emit_load(&mut self.buf, false, RESULT, PARAMETERS, 0);
        emit_store(&mut self.buf, false, RESULT, STATE, state_register(1));
        emit_arith_ri(&mut self.buf, ArithOp::Add, true, PARAMETERS, 4);
    }

    fn emit_epilogue(&mut self) {
        self.exit.bind(&mut self.buf);
        emit_store(&mut self.buf, false, METHOD_ADDRESS, STATE, STATE_METHOD_ADDRESS);
        emit_store(&mut self.buf, true, PARAMETERS, STATE, STATE_PARAM_CURSOR);
        for &reg in CALLEE_SAVED.iter().rev() {
            emit_pop(&mut self.buf, reg);
        }
        emit_ret(&mut self.buf);
        emit_ud2(&mut self.buf);
    }

    fn emit_stubs(&mut self) {
        let stubs = std::mem::take(&mut self.stubs);
        for ((status, arg), mut label) in stubs {
            label.bind(&mut self.buf);
            emit_store_imm(&mut self.buf, false, STATE, STATE_STATUS, status as i32);
            emit_store_imm(&mut self.buf, false, STATE, STATE_FAULT_ARG, arg as i32);
            emit_jmp_label(&mut self.buf, &mut self.exit);
        }
    }

    // -- Jumps --

    /// Map a macro pc to a jump target; pcs outside the body fault.
    fn resolve(&self, pc: i64) -> Target {
        if (0..self.code.len() as i64).contains(&pc) {
            Target::Insn(pc as usize)
        } else {
            Target::Fault(ExitStatus::PcOutOfRange, pc as i32 as u32)
        }
    }

    fn jump(&mut self, cond: Option<X86Cond>, target: Target) {
        let label = match target {
            Target::Insn(pc) => &mut self.labels[pc],
            Target::Fault(status, arg) => self.stubs.entry((status, arg)).or_default(),
            Target::Exit => &mut self.exit,
        };
        match cond {
            Some(cond) => emit_jcc_label(&mut self.buf, cond, label),
            None => emit_jmp_label(&mut self.buf, label),
        }
    }

    /// Load the address of `target` into `dst`.
    fn lea_target(&mut self, dst: Reg, target: Target) {
        let label = match target {
            Target::Insn(pc) => &mut self.labels[pc],
            Target::Fault(status, arg) => self.stubs.entry((status, arg)).or_default(),
            Target::Exit => &mut self.exit,
        };
        emit_lea_label(&mut self.buf, dst, label);
    }

    /// Leave through the exit path if a host call reported a failure.
    fn check_status(&mut self) {
        emit_arith_mi(&mut self.buf, ArithOp::Cmp, STATE, STATE_STATUS, 0);
        self.jump(Some(X86Cond::Jne), Target::Exit);
    }

    // -- Macro register file --

    /// Load macro register `r` into `dst`. Loading `r0` clobbers flags.
    fn load_reg(&mut self, dst: Reg, r: u8) {
        if r == 0 {
            emit_mov_ri(&mut self.buf, false, dst, 0);
        } else {
            emit_load(&mut self.buf, false, dst, STATE, state_register(r));
        }
    }

    fn store_reg(&mut self, r: u8, src: Reg) {
        if r != 0 {
            emit_store(&mut self.buf, false, src, STATE, state_register(r));
        }
    }

    // -- Instructions --

    fn emit_insn(&mut self, pc: usize) {
        let insn = self.code[pc];
        if let InsnKind::Branch {
            cond,
            annul,
            src_a,
            offset,
        } = insn.kind
        {
            self.emit_branch(pc, insn.is_exit, cond, annul, src_a, offset);
            return;
        }

        if !self.analysis.is_skipped(pc) {
            self.emit_body(pc, insn.kind);
        }

        if self.analysis.is_delay_capable(pc) {
            // Pending transfer: this instruction was a delay slot.
            let mut no_transfer = Label::new();
            emit_test_rr(&mut self.buf, true, BRANCH_HOLDER, BRANCH_HOLDER);
            emit_jcc_label(&mut self.buf, X86Cond::Je, &mut no_transfer);
            emit_mov_rr(&mut self.buf, true, RESULT, BRANCH_HOLDER);
            emit_mov_ri(&mut self.buf, false, BRANCH_HOLDER, 0);
            emit_jmp_reg(&mut self.buf, RESULT);
            no_transfer.bind(&mut self.buf);
        }

        if insn.is_exit {
            self.lea_target(BRANCH_HOLDER, Target::Exit);
        }
    }

    fn emit_body(&mut self, pc: usize, kind: InsnKind) {
        match kind {
            InsnKind::Alu {
                op,
                dst,
                src_a,
                src_b,
                result,
            } => {
                self.emit_alu(op, src_a, src_b);
                self.emit_result(pc, result, dst);
            }
            InsnKind::AddImmediate {
                dst,
                src_a,
                imm,
                result,
            } => {
                if self.analysis.elide_dummy_adds && dst == 0 && result == ResultOperation::Move {
                    return;
                }
                self.load_reg(RESULT, src_a);
                if imm != 0 {
                    emit_arith_ri(&mut self.buf, ArithOp::Add, false, RESULT, imm);
                }
                self.emit_result(pc, result, dst);
            }
            InsnKind::ExtractInsert {
                dst,
                src_a,
                src_b,
                src_bit,
                size,
                dst_bit,
                result,
            } => {
                let mask = bitfield_mask(size as u32);
                self.load_reg(SCRATCH_B, src_b);
                emit_shift_ri(&mut self.buf, ShiftOp::Shr, false, SCRATCH_B, src_bit);
                emit_arith_ri(&mut self.buf, ArithOp::And, false, SCRATCH_B, mask as i32);
                emit_shift_ri(&mut self.buf, ShiftOp::Shl, false, SCRATCH_B, dst_bit);
                self.load_reg(RESULT, src_a);
                let keep = !mask.wrapping_shl(dst_bit as u32);
                emit_arith_ri(&mut self.buf, ArithOp::And, false, RESULT, keep as i32);
                emit_arith_rr(&mut self.buf, ArithOp::Or, false, RESULT, SCRATCH_B);
                self.emit_result(pc, result, dst);
            }
            InsnKind::ExtractShiftLeftImmediate {
                dst,
                src_a,
                src_b,
                size,
                dst_bit,
                result,
            } => {
                self.load_reg(SCRATCH_B, src_a);
                self.load_reg(RESULT, src_b);
                emit_shift_cl(&mut self.buf, ShiftOp::Shr, false, RESULT);
                let mask = bitfield_mask(size as u32);
                emit_arith_ri(&mut self.buf, ArithOp::And, false, RESULT, mask as i32);
                emit_shift_ri(&mut self.buf, ShiftOp::Shl, false, RESULT, dst_bit);
                self.emit_result(pc, result, dst);
            }
            InsnKind::ExtractShiftLeftRegister {
                dst,
                src_a,
                src_b,
                src_bit,
                size,
                result,
            } => {
                self.load_reg(RESULT, src_b);
                emit_shift_ri(&mut self.buf, ShiftOp::Shr, false, RESULT, src_bit);
                let mask = bitfield_mask(size as u32);
                emit_arith_ri(&mut self.buf, ArithOp::And, false, RESULT, mask as i32);
                self.load_reg(SCRATCH_B, src_a);
                emit_shift_cl(&mut self.buf, ShiftOp::Shl, false, RESULT);
                self.emit_result(pc, result, dst);
            }
            InsnKind::Read {
                dst,
                src_a,
                imm,
                result,
            } => {
                self.load_reg(RESULT, src_a);
                if imm != 0 {
                    emit_arith_ri(&mut self.buf, ArithOp::Add, false, RESULT, imm);
                }
                emit_mov_rr(&mut self.buf, false, CALL_ARG_REGS[1], RESULT);
                emit_mov_rr(&mut self.buf, true, CALL_ARG_REGS[0], STATE);
                self.emit_host_call(jit_read as *const () as usize);
                self.check_status();
                self.emit_result(pc, result, dst);
            }
            // Logged at decode time, executed as no-ops.
            InsnKind::Reserved | InsnKind::InvalidAlu { .. } => {}
            InsnKind::Branch { .. } => unreachable!("branches are emitted by emit_branch"),
        }
    }

    /// Compute `a op b` into RESULT.
    fn emit_alu(&mut self, op: AluOperation, src_a: u8, src_b: u8) {
        let skip_carry = self.analysis.can_skip_carry;
        if self.analysis.fold_zero_register {
            if let Some(folded) = fold_zero_operand(op, src_a == 0, src_b == 0, skip_carry) {
                match folded {
                    Folded::Zero => emit_mov_ri(&mut self.buf, false, RESULT, 0),
                    Folded::AllOnes => emit_mov_ri(&mut self.buf, false, RESULT, u32::MAX as u64),
                    Folded::CopyA => self.load_reg(RESULT, src_a),
                    Folded::CopyB => self.load_reg(RESULT, src_b),
                    Folded::NegB => {
                        self.load_reg(RESULT, src_b);
                        emit_neg(&mut self.buf, false, RESULT);
                    }
                }
                return;
            }
        }

        self.load_reg(RESULT, src_a);
        self.load_reg(SCRATCH_B, src_b);
        match op {
            AluOperation::Add => {
                emit_arith_rr(&mut self.buf, ArithOp::Add, false, RESULT, SCRATCH_B);
                self.store_carry(X86Cond::Jb);
            }
            AluOperation::AddWithCarry => {
                // CF <- carry
                emit_load(&mut self.buf, false, SCRATCH_C, STATE, STATE_CARRY);
                emit_bt_ri(&mut self.buf, false, SCRATCH_C, 0);
                emit_arith_rr(&mut self.buf, ArithOp::Adc, false, RESULT, SCRATCH_B);
                self.store_carry(X86Cond::Jb);
            }
            AluOperation::Subtract => {
                emit_arith_rr(&mut self.buf, ArithOp::Sub, false, RESULT, SCRATCH_B);
                self.store_carry(X86Cond::Jae);
            }
            AluOperation::SubtractWithBorrow => {
                // CF <- !carry
                emit_load(&mut self.buf, false, SCRATCH_C, STATE, STATE_CARRY);
                emit_arith_ri(&mut self.buf, ArithOp::Cmp, false, SCRATCH_C, 1);
                emit_arith_rr(&mut self.buf, ArithOp::Sbb, false, RESULT, SCRATCH_B);
                self.store_carry(X86Cond::Jae);
            }
            AluOperation::Xor => {
                emit_arith_rr(&mut self.buf, ArithOp::Xor, false, RESULT, SCRATCH_B);
            }
            AluOperation::Or => {
                emit_arith_rr(&mut self.buf, ArithOp::Or, false, RESULT, SCRATCH_B);
            }
            AluOperation::And => {
                emit_arith_rr(&mut self.buf, ArithOp::And, false, RESULT, SCRATCH_B);
            }
            AluOperation::AndNot => {
                emit_not(&mut self.buf, false, SCRATCH_B);
                emit_arith_rr(&mut self.buf, ArithOp::And, false, RESULT, SCRATCH_B);
            }
            AluOperation::Nand => {
                emit_arith_rr(&mut self.buf, ArithOp::And, false, RESULT, SCRATCH_B);
                emit_not(&mut self.buf, false, RESULT);
            }
        }
    }

    /// Store the carry flag as `cond` holds right after the ALU op.
    fn store_carry(&mut self, cond: X86Cond) {
        if !self.analysis.can_skip_carry {
            emit_setcc_mem(&mut self.buf, cond, STATE, STATE_CARRY);
        }
    }

    /// Apply the result operation to the value in RESULT.
    fn emit_result(&mut self, pc: usize, op: ResultOperation, dst: u8) {
        match op {
            ResultOperation::IgnoreAndFetch => {
                self.emit_fetch(pc, SCRATCH_B);
                self.store_reg(dst, SCRATCH_B);
            }
            ResultOperation::Move => {
                self.store_reg(dst, RESULT);
            }
            ResultOperation::MoveAndSetMethod => {
                self.store_reg(dst, RESULT);
                emit_mov_rr(&mut self.buf, false, METHOD_ADDRESS, RESULT);
            }
            ResultOperation::FetchAndSend => {
                self.emit_fetch(pc, SCRATCH_B);
                self.store_reg(dst, SCRATCH_B);
                self.emit_send(RESULT);
            }
            ResultOperation::MoveAndSend => {
                self.store_reg(dst, RESULT);
                self.emit_send(RESULT);
            }
            ResultOperation::FetchAndSetMethod => {
                self.emit_fetch(pc, SCRATCH_B);
                self.store_reg(dst, SCRATCH_B);
                emit_mov_rr(&mut self.buf, false, METHOD_ADDRESS, RESULT);
            }
            ResultOperation::MoveAndSetMethodFetchAndSend => {
                self.store_reg(dst, RESULT);
                emit_mov_rr(&mut self.buf, false, METHOD_ADDRESS, RESULT);
                self.emit_fetch(pc, SCRATCH_B);
                self.emit_send(SCRATCH_B);
            }
            ResultOperation::MoveAndSetMethodSend => {
                self.store_reg(dst, RESULT);
                emit_mov_rr(&mut self.buf, false, METHOD_ADDRESS, RESULT);
                emit_shift_ri(&mut self.buf, ShiftOp::Shr, false, RESULT, 12);
                emit_arith_ri(&mut self.buf, ArithOp::And, false, RESULT, 0x3F);
                self.emit_send(RESULT);
            }
        }
    }

    /// Pop the next parameter into `dst`, faulting when none is left.
    fn emit_fetch(&mut self, pc: usize, dst: Reg) {
        emit_arith_rr(&mut self.buf, ArithOp::Cmp, true, PARAMETERS, PARAMETERS_END);
        self.jump(
            Some(X86Cond::Jae),
            Target::Fault(ExitStatus::ParameterUnderflow, pc as u32),
        );
        emit_load(&mut self.buf, false, dst, PARAMETERS, 0);
        emit_arith_ri(&mut self.buf, ArithOp::Add, true, PARAMETERS, 4);
    }

    /// Call the bank with the current method and `value`, then advance
    /// the method address by its increment.
    fn emit_send(&mut self, value: Reg) {
        if value != CALL_ARG_REGS[2] {
            emit_mov_rr(&mut self.buf, false, CALL_ARG_REGS[2], value);
        }
        emit_mov_rr(&mut self.buf, false, CALL_ARG_REGS[1], METHOD_ADDRESS);
        emit_arith_ri(&mut self.buf, ArithOp::And, false, CALL_ARG_REGS[1], 0xFFF);
        emit_mov_rr(&mut self.buf, true, CALL_ARG_REGS[0], STATE);
        self.emit_host_call(jit_send as *const () as usize);
        self.check_status();

        // address = (address + increment) & 0xFFF; a zero increment leaves
        // the value unchanged.
        emit_mov_rr(&mut self.buf, false, SCRATCH_B, METHOD_ADDRESS);
        emit_shift_ri(&mut self.buf, ShiftOp::Shr, false, SCRATCH_B, 12);
        emit_arith_ri(&mut self.buf, ArithOp::And, false, SCRATCH_B, 0x3F);
        emit_arith_rr(&mut self.buf, ArithOp::Add, false, SCRATCH_B, METHOD_ADDRESS);
        emit_arith_ri(&mut self.buf, ArithOp::And, false, SCRATCH_B, 0xFFF);
        emit_arith_ri(&mut self.buf, ArithOp::And, false, METHOD_ADDRESS, !0xFFF);
        emit_arith_rr(&mut self.buf, ArithOp::Or, false, METHOD_ADDRESS, SCRATCH_B);
    }

    /// Call a host function with arguments already in place. The stack is
    /// 16-byte aligned after the prologue.
    fn emit_host_call(&mut self, target: usize) {
        let pad = SAVED_AROUND_CALLS.count() % 2 == 1;
        for reg in SAVED_AROUND_CALLS.iter() {
            emit_push(&mut self.buf, reg);
        }
        if pad {
            emit_arith_ri(&mut self.buf, ArithOp::Sub, true, Reg::Rsp, 8);
        }
        emit_mov_ri(&mut self.buf, true, RESULT, target as u64);
        emit_call_reg(&mut self.buf, RESULT);
        if pad {
            emit_arith_ri(&mut self.buf, ArithOp::Add, true, Reg::Rsp, 8);
        }
        for reg in SAVED_AROUND_CALLS.iter().rev() {
            emit_pop(&mut self.buf, reg);
        }
    }

    fn emit_branch(
        &mut self,
        pc: usize,
        is_exit: bool,
        cond: mme_core::BranchCondition,
        annul: bool,
        src_a: u8,
        offset: i32,
    ) {
        if self.analysis.is_delay_capable(pc) {
            emit_test_rr(&mut self.buf, true, BRANCH_HOLDER, BRANCH_HOLDER);
            self.jump(
                Some(X86Cond::Jne),
                Target::Fault(ExitStatus::BadDelaySlot, pc as u32),
            );
        }

        let target = self.resolve(pc as i64 + offset as i64);
        let slot = self.resolve(pc as i64 + 1);

        if src_a == 0 {
            // r0 reads as zero: the outcome is known now.
            if cond.is_taken(0) {
                self.emit_taken(annul, target, slot);
                return;
            }
        } else {
            self.load_reg(RESULT, src_a);
            emit_test_rr(&mut self.buf, false, RESULT, RESULT);
            let taken = X86Cond::from_branch(cond);
            if annul {
                self.jump(Some(taken), target);
            } else {
                let mut not_taken = Label::new();
                emit_jcc_label(&mut self.buf, taken.invert(), &mut not_taken);
                self.emit_taken(false, target, slot);
                not_taken.bind(&mut self.buf);
            }
        }

        // Not taken.
        if is_exit {
            self.lea_target(BRANCH_HOLDER, Target::Exit);
        }
    }

    fn emit_taken(&mut self, annul: bool, target: Target, slot: Target) {
        if annul {
            self.jump(None, target);
        } else {
            self.lea_target(BRANCH_HOLDER, target);
            self.jump(None, slot);
        }
    }
}
