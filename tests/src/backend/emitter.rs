use mme_backend::code_buffer::CodeBuffer;
use mme_backend::label::Label;
use mme_backend::x86_64::emitter::*;
use mme_backend::x86_64::regs::*;
use mme_core::BranchCondition;

fn emit(f: impl FnOnce(&mut CodeBuffer)) -> Vec<u8> {
    let mut buf = CodeBuffer::new(4096).unwrap();
    f(&mut buf);
    buf.as_slice().to_vec()
}

#[test]
fn mov_state_pointer() {
    // mov rbx, rdi
    let code = emit(|b| emit_mov_rr(b, true, STATE, Reg::Rdi));
    assert_eq!(code, [0x48, 0x89, 0xFB]);
}

#[test]
fn load_through_sib_base() {
    // mov eax, [r12]
    let code = emit(|b| emit_load(b, false, Reg::Rax, PARAMETERS, 0));
    assert_eq!(code, [0x41, 0x8B, 0x04, 0x24]);
    // mov edx, [r13 + 0]: r13 needs an explicit disp8
    let code = emit(|b| emit_load(b, false, Reg::Rdx, PARAMETERS_END, 0));
    assert_eq!(code, [0x41, 0x8B, 0x55, 0x00]);
}

#[test]
fn add_imm8() {
    // add r12, 4
    let code = emit(|b| emit_arith_ri(b, ArithOp::Add, true, PARAMETERS, 4));
    assert_eq!(code, [0x49, 0x83, 0xC4, 0x04]);
}

#[test]
fn and_imm32() {
    // and ecx, 0xfff
    let code = emit(|b| emit_arith_ri(b, ArithOp::And, false, Reg::Rcx, 0xFFF));
    assert_eq!(code, [0x81, 0xE1, 0xFF, 0x0F, 0x00, 0x00]);
}

#[test]
fn test_branch_holder() {
    // test r15, r15
    let code = emit(|b| emit_test_rr(b, true, BRANCH_HOLDER, BRANCH_HOLDER));
    assert_eq!(code, [0x4D, 0x85, 0xFF]);
}

#[test]
fn setcc_to_memory() {
    // setb byte [rbx + 0x20]
    let code = emit(|b| emit_setcc_mem(b, X86Cond::Jb, STATE, 0x20));
    assert_eq!(code, [0x0F, 0x92, 0x43, 0x20]);
    // sete byte [rsi + 8]: a memory operand needs no byte-register REX.
    let code = emit(|b| emit_setcc_mem(b, X86Cond::Je, Reg::Rsi, 8));
    assert_eq!(code, [0x0F, 0x94, 0x46, 0x08]);
    // setne byte [r12]: SIB byte and REX.B.
    let code = emit(|b| emit_setcc_mem(b, X86Cond::Jne, Reg::R12, 0));
    assert_eq!(code, [0x41, 0x0F, 0x95, 0x04, 0x24]);
}

#[test]
fn zero_register_uses_xor() {
    // xor r14d, r14d
    let code = emit(|b| emit_mov_ri(b, false, METHOD_ADDRESS, 0));
    assert_eq!(code, [0x45, 0x31, 0xF6]);
}

#[test]
fn zero_shift_emits_nothing() {
    let code = emit(|b| emit_shift_ri(b, ShiftOp::Shr, false, Reg::Rax, 0));
    assert!(code.is_empty());
    let code = emit(|b| emit_shift_ri(b, ShiftOp::Shl, false, Reg::Rax, 1));
    assert_eq!(code, [0xD1, 0xE0]);
}

#[test]
fn push_pop_extended() {
    let code = emit(|b| {
        emit_push(b, Reg::Rbx);
        emit_push(b, Reg::R15);
        emit_pop(b, Reg::R15);
        emit_pop(b, Reg::Rbx);
    });
    assert_eq!(code, [0x53, 0x41, 0x57, 0x41, 0x5F, 0x5B]);
}

#[test]
fn lea_rip_label() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    let mut label = Label::new();
    emit_lea_label(&mut buf, BRANCH_HOLDER, &mut label);
    assert!(label.has_pending_uses());
    buf.emit_u8(0x90);
    label.bind(&mut buf);
    let code = buf.as_slice();
    assert_eq!(&code[..3], &[0x4C, 0x8D, 0x3D]);
    // Displacement is relative to the end of the lea.
    assert_eq!(buf.read_u32(3), 1);
}

#[test]
fn jmp_forward_label() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    let mut label = Label::new();
    emit_jmp_label(&mut buf, &mut label);
    assert!(!label.is_bound());
    label.bind(&mut buf);
    assert_eq!(label.value(), Some(5));
    assert!(!label.has_pending_uses());
    assert_eq!(buf.as_slice(), &[0xE9, 0, 0, 0, 0]);
}

#[test]
fn jcc_backward_label() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    let mut label = Label::new();
    label.bind(&mut buf);
    emit_jcc_label(&mut buf, X86Cond::Jne, &mut label);
    assert_eq!(&buf.as_slice()[..2], &[0x0F, 0x85]);
    assert_eq!(buf.read_u32(2) as i32, -6);
}

#[test]
fn branch_conditions() {
    assert_eq!(X86Cond::from_branch(BranchCondition::Zero), X86Cond::Je);
    assert_eq!(X86Cond::from_branch(BranchCondition::NotZero), X86Cond::Jne);
    assert_eq!(X86Cond::Jb.invert(), X86Cond::Jae);
    assert_eq!(X86Cond::Jae.invert().invert(), X86Cond::Jae);
}

#[test]
fn register_conventions() {
    assert!(SAVED_AROUND_CALLS.is_empty());
    assert_eq!(PUSH_SIZE % STACK_ALIGN, 0);
    assert_eq!(PERSISTENT_REGS.count(), 5);
    for reg in PERSISTENT_REGS.iter() {
        assert!(CALLEE_SAVED.contains(&reg), "{reg:?}");
    }
    for reg in [RESULT, SCRATCH_B, SCRATCH_C] {
        assert!(CALLER_SAVED_REGS.contains(reg));
        assert!(!PERSISTENT_REGS.contains(reg));
    }
}

#[test]
fn regset_ops() {
    let a = RegSet::from_regs(&[Reg::Rax, Reg::Rbx, Reg::R12]);
    let b = RegSet::from_regs(&[Reg::Rbx, Reg::R15]);
    assert_eq!(a.union(b).count(), 4);
    assert_eq!(a.intersect(b), RegSet::from_regs(&[Reg::Rbx]));
    assert_eq!(a.subtract(b), RegSet::from_regs(&[Reg::Rax, Reg::R12]));
    let regs: Vec<Reg> = a.iter().rev().collect();
    assert_eq!(regs, [Reg::R12, Reg::Rbx, Reg::Rax]);
}
