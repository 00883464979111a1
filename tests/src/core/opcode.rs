use mme_core::*;

use crate::support::*;

#[test]
fn add_imm_fields() {
    let op = Opcode(add_imm(2, 5, 0x42, MOVE_SEND));
    assert_eq!(op.operation(), Operation::AddImmediate);
    assert_eq!(op.result_operation(), ResultOperation::MoveAndSend);
    assert_eq!(op.dst(), 2);
    assert_eq!(op.src_a(), 5);
    assert_eq!(op.immediate(), 0x42);
    assert!(!op.is_exit());
    assert!(Opcode(exit(add_imm(2, 5, 0x42, MOVE_SEND))).is_exit());
}

#[test]
fn immediate_sign_extension() {
    assert_eq!(Opcode(add_imm(0, 0, -1, MOVE)).immediate(), -1);
    assert_eq!(Opcode(add_imm(0, 0, 131_071, MOVE)).immediate(), 131_071);
    // Only bit 31 set in the immediate field: the most negative value.
    assert_eq!(Opcode(0x8000_0001).immediate(), -131_072);
    assert_eq!(Opcode(add_imm(0, 0, -131_072, MOVE)).immediate(), -131_072);
    assert_eq!(sign_extend_18(0x2_0000), -131_072);
    assert_eq!(sign_extend_18(0x1_FFFF), 131_071);
}

#[test]
fn alu_fields() {
    let op = Opcode(alu(SBB, 7, 3, 6, MOVE_SET_METHOD));
    assert_eq!(op.operation(), Operation::Alu);
    assert_eq!(op.alu_operation(), Some(AluOperation::SubtractWithBorrow));
    assert_eq!(op.dst(), 7);
    assert_eq!(op.src_a(), 3);
    assert_eq!(op.src_b(), 6);
    assert_eq!(op.result_operation(), ResultOperation::MoveAndSetMethod);
}

#[test]
fn alu_carry_classification() {
    assert!(AluOperation::AddWithCarry.reads_carry());
    assert!(AluOperation::SubtractWithBorrow.reads_carry());
    assert!(!AluOperation::Add.reads_carry());
    assert!(AluOperation::Add.writes_carry());
    assert!(AluOperation::Subtract.writes_carry());
    assert!(!AluOperation::Xor.writes_carry());
    assert!(!AluOperation::Nand.writes_carry());
}

#[test]
fn unused_alu_encodings() {
    for raw in (4..=7).chain(13..=31) {
        assert_eq!(AluOperation::from_raw(raw), None, "alu op {raw}");
        let insn = Opcode(alu(raw, 1, 1, 1, MOVE)).decode();
        assert_eq!(insn.kind, InsnKind::InvalidAlu { raw_op: raw });
    }
}

#[test]
fn bitfield_fields() {
    let op = Opcode(extract_insert(1, 2, 3, 4, 8, 16, MOVE));
    assert_eq!(op.operation(), Operation::ExtractInsert);
    assert_eq!(op.bf_src_bit(), 4);
    assert_eq!(op.bf_size(), 8);
    assert_eq!(op.bf_dst_bit(), 16);
    assert_eq!(
        op.decode().kind,
        InsnKind::ExtractInsert {
            dst: 1,
            src_a: 2,
            src_b: 3,
            src_bit: 4,
            size: 8,
            dst_bit: 16,
            result: ResultOperation::Move,
        }
    );
}

#[test]
fn bitfield_mask_edges() {
    assert_eq!(bitfield_mask(0), 0);
    assert_eq!(bitfield_mask(1), 1);
    assert_eq!(bitfield_mask(8), 0xFF);
    assert_eq!(bitfield_mask(31), 0x7FFF_FFFF);
    assert_eq!(bitfield_mask(32), u32::MAX);
    assert_eq!(bitfield_mask(40), u32::MAX);
}

#[test]
fn branch_fields() {
    let op = Opcode(branch(true, true, 4, -2));
    assert_eq!(op.operation(), Operation::Branch);
    assert_eq!(op.branch_condition(), BranchCondition::NotZero);
    assert!(op.branch_annul());
    assert_eq!(op.src_a(), 4);
    assert_eq!(
        op.decode().kind,
        InsnKind::Branch {
            cond: BranchCondition::NotZero,
            annul: true,
            src_a: 4,
            offset: -2,
        }
    );

    let insn = Opcode(branch(false, false, 0, 3)).decode();
    assert!(insn.is_branch());
    assert!(insn.has_delay_slot());
    assert_eq!(insn.result(), None);
}

#[test]
fn branch_target_in_bytes() {
    assert_eq!(branch_target(3), 12);
    assert_eq!(branch_target(0x3_FFFF), -4);
    assert_eq!(branch_target(0x2_0000), -131_072 * 4);
}

#[test]
fn branch_condition_eval() {
    assert!(BranchCondition::Zero.is_taken(0));
    assert!(!BranchCondition::Zero.is_taken(1));
    assert!(BranchCondition::NotZero.is_taken(0x8000_0000));
    assert!(!BranchCondition::NotZero.is_taken(0));
}

#[test]
fn reserved_operation() {
    let insn = Opcode(0x86).decode();
    assert_eq!(insn.kind, InsnKind::Reserved);
    assert!(insn.is_exit);
}

#[test]
fn result_operation_effects() {
    use ResultOperation::*;
    let fetching = [
        IgnoreAndFetch,
        FetchAndSend,
        FetchAndSetMethod,
        MoveAndSetMethodFetchAndSend,
    ];
    let sending = [
        FetchAndSend,
        MoveAndSend,
        MoveAndSetMethodFetchAndSend,
        MoveAndSetMethodSend,
    ];
    for raw in 0..8 {
        let op = ResultOperation::from_raw(raw);
        assert_eq!(op as u32, raw);
        assert_eq!(op.fetches(), fetching.contains(&op), "{op:?}");
        assert_eq!(op.sends(), sending.contains(&op), "{op:?}");
    }
}

#[test]
fn register_uses() {
    let insn = Opcode(alu(ADD, 1, 2, 3, MOVE)).decode();
    assert!(insn.reads_register(2));
    assert!(insn.reads_register(3));
    assert!(!insn.reads_register(1));
    assert_eq!(insn.result(), Some((1, ResultOperation::Move)));

    let insn = Opcode(add_imm(4, 5, 1, MOVE_SET_METHOD)).decode();
    assert!(insn.reads_register(5));
    assert!(!insn.reads_register(4));
}

#[test]
fn decode_program_keeps_every_word() {
    let words = [NOP, 0x6, alu(13, 1, 1, 1, MOVE), exit(NOP)];
    let code = decode_program(&words);
    assert_eq!(code.len(), 4);
    assert_eq!(code[1].kind, InsnKind::Reserved);
    assert!(matches!(code[2].kind, InsnKind::InvalidAlu { raw_op: 13 }));
    assert!(code[3].is_exit);
}
