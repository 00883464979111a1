//! Macro semantics, checked on the interpreter and (through `run_all`)
//! against the JIT.

use mme_core::{MacroError, MethodAddress};

use crate::support::*;

fn error_of(run: &Run) -> &str {
    run.result.as_ref().unwrap_err()
}

fn expected(e: MacroError) -> String {
    format!("{e:?}")
}

// -- Seed scenarios --

#[test]
fn identity_move() {
    let run = run_all(&[exit(add_imm(2, 0, 0, MOVE)), NOP], &[0]);
    let state = run.result.unwrap();
    assert!(run.bank.calls.is_empty());
    assert_eq!(state.registers, [0; 8]);
}

#[test]
fn single_method_send() {
    let words = [
        add_imm(2, 0, 0x42, MOVE_SET_METHOD),
        exit(add_imm(3, 0, 0x7, MOVE_SEND)),
        NOP,
    ];
    let run = run_all(&words, &[0]);
    let state = run.result.unwrap();
    assert_eq!(run.bank.calls, [(0x42, 0x7)]);
    assert_eq!(state.method_address.address(), 0x42);
    assert_eq!(state.registers[2], 0x42);
    assert_eq!(state.registers[3], 0x7);
}

#[test]
fn method_auto_increment() {
    let words = [
        add_imm(2, 0, (0x3 << 12) | 0x100, MOVE_SET_METHOD),
        add_imm(3, 0, 0xA, MOVE_SEND),
        exit(add_imm(3, 0, 0xB, MOVE_SEND)),
        NOP,
    ];
    let run = run_all(&words, &[0]);
    let state = run.result.unwrap();
    assert_eq!(run.bank.calls, [(0x100, 0xA), (0x103, 0xB)]);
    assert_eq!(state.method_address, MethodAddress(0x3106));
}

#[test]
fn branch_with_delay_slot() {
    let words = [
        add_imm(7, 1, 0, MOVE_SET_METHOD),
        add_imm(2, 0, 1, MOVE),
        branch(true, false, 2, 3),
        add_imm(3, 0, 0xDEAD, MOVE_SEND),
        add_imm(4, 0, 0xBEEF, MOVE_SEND),
        exit(add_imm(5, 0, 0xCAFE, MOVE_SEND)),
        NOP,
    ];
    let run = run_all(&words, &[0x50]);
    let state = run.result.unwrap();
    assert_eq!(run.bank.calls, [(0x50, 0xDEAD), (0x50, 0xCAFE)]);
    assert_eq!(state.registers[4], 0);
}

#[test]
fn carry_propagation() {
    let words = [
        add_imm(2, 0, 1, MOVE),
        alu(ADD, 1, 1, 2, MOVE),
        exit(alu(ADC, 3, 3, 0, MOVE)),
        NOP,
    ];
    let state = run_all(&words, &[0xFFFF_FFFF]).result.unwrap();
    assert_eq!(state.registers[1], 0);
    assert_eq!(state.registers[3], 1);

    let state = run_all(&words, &[0x7FFF_FFFF]).result.unwrap();
    assert_eq!(state.registers[1], 0x8000_0000);
    assert_eq!(state.registers[3], 0);
}

#[test]
fn parameter_underflow() {
    let run = run_all(&[exit(add_imm(2, 0, 0, FETCH_SEND)), NOP], &[0]);
    assert_eq!(
        error_of(&run),
        expected(MacroError::ParameterUnderflow { pc: 0 })
    );
    assert!(run.bank.calls.is_empty());
}

// -- Result operations --

#[test]
fn ignore_and_fetch() {
    let words = [alu(ADD, 3, 1, 1, FETCH), exit(NOP), NOP];
    let state = run_all(&words, &[5, 0x1234]).result.unwrap();
    assert_eq!(state.registers[3], 0x1234);
}

#[test]
fn fetch_and_send() {
    let words = [
        add_imm(7, 0, 0x30, MOVE_SET_METHOD),
        exit(add_imm(2, 0, 5, FETCH_SEND)),
        NOP,
    ];
    let run = run_all(&words, &[0, 11]);
    let state = run.result.unwrap();
    assert_eq!(run.bank.calls, [(0x30, 5)]);
    assert_eq!(state.registers[2], 11);
}

#[test]
fn fetch_and_set_method() {
    let words = [add_imm(2, 1, 0, FETCH_SET_METHOD), exit(NOP), NOP];
    let state = run_all(&words, &[0x60, 9]).result.unwrap();
    assert_eq!(state.registers[2], 9);
    assert_eq!(state.method_address, MethodAddress(0x60));
}

#[test]
fn set_method_fetch_and_send() {
    let words = [exit(add_imm(2, 1, 0, MOVE_SET_METHOD_FETCH_SEND)), NOP];
    let run = run_all(&words, &[0x1040, 7]);
    let state = run.result.unwrap();
    assert_eq!(run.bank.calls, [(0x40, 7)]);
    assert_eq!(state.registers[2], 0x1040);
    assert_eq!(state.method_address, MethodAddress(0x1041));
}

#[test]
fn set_method_send_sends_increment() {
    let words = [exit(add_imm(2, 1, 0, MOVE_SET_METHOD_SEND)), NOP];
    let run = run_all(&words, &[0x5123]);
    let state = run.result.unwrap();
    assert_eq!(run.bank.calls, [(0x123, 5)]);
    assert_eq!(state.method_address, MethodAddress(0x5128));
}

#[test]
fn send_wraps_method() {
    let words = [
        add_imm(7, 1, 0, MOVE_SET_METHOD),
        add_imm(2, 0, 1, MOVE_SEND),
        exit(add_imm(2, 0, 2, MOVE_SEND)),
        NOP,
    ];
    let run = run_all(&words, &[0x2FFF]);
    let state = run.result.unwrap();
    assert_eq!(run.bank.calls, [(0xFFF, 1), (0x001, 2)]);
    assert_eq!(state.method_address, MethodAddress(0x2003));
}

#[test]
fn r0_is_never_written() {
    let words = [
        add_imm(0, 0, 7, MOVE),
        alu(ADD, 0, 1, 1, MOVE),
        exit(add_imm(2, 0, 0, MOVE)),
        NOP,
    ];
    let state = run_all(&words, &[3]).result.unwrap();
    assert_eq!(state.registers[0], 0);
    assert_eq!(state.registers[2], 0);
}

// -- ALU --

fn alu_result(op: u32, a: u32, b: u32) -> u32 {
    let words = [add_imm(2, 0, 0, FETCH), exit(alu(op, 3, 1, 2, MOVE)), NOP];
    run_all(&words, &[a, b]).result.unwrap().registers[3]
}

#[test]
fn alu_operations() {
    assert_eq!(alu_result(ADD, 0xFFFF_FFFF, 2), 1);
    assert_eq!(alu_result(SUB, 1, 2), 0xFFFF_FFFF);
    assert_eq!(alu_result(XOR, 0xF0F0, 0xFF00), 0x0FF0);
    assert_eq!(alu_result(OR, 0xF0F0, 0x0F00), 0xFFF0);
    assert_eq!(alu_result(AND, 0xF0F0, 0xFF00), 0xF000);
    assert_eq!(alu_result(ANDNOT, 0xF0F0, 0xFF00), 0x00F0);
    assert_eq!(alu_result(NAND, 0xF0F0, 0xFF00), 0xFFFF_0FFF);
}

#[test]
fn unused_alu_is_nop() {
    let words = [add_imm(3, 0, 9, MOVE), exit(alu(5, 3, 1, 1, MOVE)), NOP];
    let state = run_all(&words, &[4]).result.unwrap();
    assert_eq!(state.registers[3], 9);
}

/// 64-bit `a - b` as SUB on the low words then SBB on the high words.
fn sub64(a: u64, b: u64) -> u64 {
    let words = [
        add_imm(2, 0, 0, FETCH),
        add_imm(3, 0, 0, FETCH),
        add_imm(4, 0, 0, FETCH),
        alu(SUB, 5, 1, 3, MOVE),
        exit(alu(SBB, 6, 2, 4, MOVE)),
        NOP,
    ];
    let params = [a as u32, (a >> 32) as u32, b as u32, (b >> 32) as u32];
    let state = run_all(&words, &params).result.unwrap();
    (state.registers[6] as u64) << 32 | state.registers[5] as u64
}

/// 64-bit `a + b` as ADD then ADC.
fn add64(a: u64, b: u64) -> u64 {
    let words = [
        add_imm(2, 0, 0, FETCH),
        add_imm(3, 0, 0, FETCH),
        add_imm(4, 0, 0, FETCH),
        alu(ADD, 5, 1, 3, MOVE),
        exit(alu(ADC, 6, 2, 4, MOVE)),
        NOP,
    ];
    let params = [a as u32, (a >> 32) as u32, b as u32, (b >> 32) as u32];
    let state = run_all(&words, &params).result.unwrap();
    (state.registers[6] as u64) << 32 | state.registers[5] as u64
}

#[test]
fn wide_arithmetic() {
    assert_eq!(sub64(0x1_0000_0000, 1), 0xFFFF_FFFF);
    assert_eq!(sub64(0x2_0000_0005, 0x1_0000_0003), 0x1_0000_0002);
    assert_eq!(sub64(0, 1), u64::MAX);
    assert_eq!(add64(0xFFFF_FFFF, 1), 0x1_0000_0000);
    assert_eq!(add64(0x1_FFFF_FFFF, 0x1_0000_0001), 0x3_0000_0000);
    assert_eq!(add64(u64::MAX, 1), 0);
}

// -- Bitfields --

fn bitfield(word: u32, r1: u32, r2: u32) -> u32 {
    let words = [add_imm(2, 0, 0, FETCH), exit(word), NOP];
    run_all(&words, &[r1, r2]).result.unwrap().registers[3]
}

#[test]
fn extract_insert_field() {
    let op = extract_insert(3, 1, 2, 4, 8, 16, MOVE);
    assert_eq!(bitfield(op, 0xAABB_CCDD, 0x1234_5678), 0xAA67_CCDD);
    // Zero-sized field leaves A unchanged.
    let op = extract_insert(3, 1, 2, 4, 0, 16, MOVE);
    assert_eq!(bitfield(op, 0xAABB_CCDD, 0x1234_5678), 0xAABB_CCDD);
}

#[test]
fn extract_shift_left_immediate() {
    let op = extract_shl_imm(3, 1, 2, 8, 4, MOVE);
    assert_eq!(bitfield(op, 8, 0x1234_5678), 0x560);
    // Register shift counts wrap at 32.
    assert_eq!(bitfield(op, 40, 0x1234_5678), 0x560);
}

#[test]
fn extract_shift_left_register() {
    let op = extract_shl_reg(3, 1, 2, 4, 8, MOVE);
    assert_eq!(bitfield(op, 8, 0x1234_5678), 0x6700);
    assert_eq!(bitfield(op, 36, 0x1234_5678), 0x670);
}

// -- Reads --

#[test]
fn read_register() {
    let words = [exit(read(3, 1, 4, MOVE)), NOP];
    let run = run_all(&words, &[0x100]);
    let state = run.result.unwrap();
    assert_eq!(run.bank.reads, [0x104]);
    assert_eq!(state.registers[3], RecordingBank::register_value(0x104));
}

#[test]
fn read_out_of_range() {
    let words = [
        add_imm(2, 0, 0xE00, MOVE),
        exit(read(3, 2, 0, MOVE)),
        NOP,
    ];
    let run = run_all(&words, &[0]);
    assert_eq!(
        error_of(&run),
        expected(MacroError::RegisterOutOfRange {
            address: 0xE00,
            limit: 0xE00
        })
    );
    assert!(run.bank.reads.is_empty());
}

#[test]
fn read_negative_offset() {
    let words = [exit(read(3, 1, -1, MOVE)), NOP];
    let run = run_all(&words, &[0]);
    assert_eq!(
        error_of(&run),
        expected(MacroError::RegisterOutOfRange {
            address: 0xFFFF_FFFF,
            limit: 0xE00
        })
    );
}

// -- Control flow --

#[test]
fn annulled_loop() {
    let words = [
        add_imm(7, 0, 0x20, MOVE_SET_METHOD),
        add_imm(1, 1, -1, MOVE_SEND),
        branch(true, true, 1, -1),
        exit(NOP),
        NOP,
    ];
    let run = run_all(&words, &[3]);
    let state = run.result.unwrap();
    assert_eq!(run.bank.calls, [(0x20, 2), (0x20, 1), (0x20, 0)]);
    assert_eq!(state.registers[1], 0);
}

#[test]
fn delayed_loop() {
    let words = [
        add_imm(7, 0, 0x20, MOVE_SET_METHOD),
        add_imm(1, 1, -1, MOVE_SEND),
        branch(true, false, 1, -1),
        add_imm(6, 6, 1, MOVE),
        exit(NOP),
        NOP,
    ];
    let run = run_all(&words, &[3]);
    let state = run.result.unwrap();
    assert_eq!(run.bank.calls.len(), 3);
    // The delay slot runs on every iteration, taken or not.
    assert_eq!(state.registers[6], 3);
}

#[test]
fn branch_on_r0() {
    // bz $r0 is always taken, bnz $r0 never.
    let words = [
        branch(false, true, 0, 2),
        add_imm(2, 0, 1, MOVE),
        branch(true, true, 0, 5),
        exit(add_imm(3, 0, 1, MOVE)),
        NOP,
    ];
    let state = run_all(&words, &[0]).result.unwrap();
    assert_eq!(state.registers[2], 0);
    assert_eq!(state.registers[3], 1);
}

#[test]
fn exit_in_delay_slot_is_ignored() {
    let words = [
        branch(false, false, 0, 3),
        exit(add_imm(2, 0, 1, MOVE)),
        add_imm(3, 0, 1, MOVE),
        exit(add_imm(4, 0, 1, MOVE)),
        NOP,
    ];
    let state = run_all(&words, &[0]).result.unwrap();
    assert_eq!(state.registers[2..5], [1, 0, 1]);
}

#[test]
fn not_taken_exit_branch() {
    let words = [
        exit(branch(true, false, 1, 3)),
        add_imm(2, 0, 1, MOVE),
        add_imm(3, 0, 1, MOVE),
        exit(add_imm(4, 0, 1, MOVE)),
        NOP,
    ];
    // Not taken: runs the slot and stops.
    let state = run_all(&words, &[0]).result.unwrap();
    assert_eq!(state.registers[2..5], [1, 0, 0]);
    // Taken: the exit flag is ignored.
    let state = run_all(&words, &[1]).result.unwrap();
    assert_eq!(state.registers[2..5], [1, 0, 1]);
}

#[test]
fn taken_exit_branch_continues() {
    let words = [
        exit(branch(true, true, 1, 2)),
        add_imm(2, 0, 1, MOVE),
        add_imm(3, 0, 1, MOVE),
        exit(NOP),
        NOP,
    ];
    let state = run_all(&words, &[1]).result.unwrap();
    assert_eq!(state.registers[2..4], [0, 1]);
}

#[test]
fn branch_in_delay_slot() {
    let words = [branch(false, false, 0, 2), branch(false, false, 0, 1), NOP];
    let run = run_all(&words, &[0]);
    assert_eq!(error_of(&run), expected(MacroError::BadDelaySlot { pc: 1 }));
}

#[test]
fn branch_after_exit() {
    let words = [exit(NOP), branch(false, true, 0, 0)];
    let run = run_all(&words, &[0]);
    assert_eq!(error_of(&run), expected(MacroError::BadDelaySlot { pc: 1 }));
}

#[test]
fn running_off_the_end() {
    let run = run_all(&[NOP, NOP], &[0]);
    assert_eq!(
        error_of(&run),
        expected(MacroError::PcOutOfRange { pc: 2, len: 2 })
    );
    // Exit with no delay slot left.
    let run = run_all(&[NOP, exit(NOP)], &[0]);
    assert_eq!(
        error_of(&run),
        expected(MacroError::PcOutOfRange { pc: 2, len: 2 })
    );
}

#[test]
fn branch_out_of_body() {
    let run = run_all(&[branch(false, true, 0, -1)], &[0]);
    assert_eq!(
        error_of(&run),
        expected(MacroError::PcOutOfRange { pc: -1, len: 1 })
    );
    let run = run_all(&[branch(false, false, 0, 100), add_imm(2, 0, 1, MOVE_SEND)], &[0]);
    assert_eq!(
        error_of(&run),
        expected(MacroError::PcOutOfRange { pc: 100, len: 2 })
    );
    // The delay slot ran first.
    assert_eq!(run.bank.calls, [(0, 1)]);
}

#[test]
fn empty_body() {
    let run = run_all(&[], &[0]);
    assert_eq!(
        error_of(&run),
        expected(MacroError::PcOutOfRange { pc: 0, len: 0 })
    );
}

#[test]
fn reserved_is_nop() {
    let words = [0x6, exit(add_imm(2, 0, 1, MOVE)), NOP];
    let state = run_all(&words, &[0]).result.unwrap();
    assert_eq!(state.registers[2], 1);
}

// -- Parameters --

#[test]
fn leftover_parameters() {
    let run = run_all(&[exit(NOP), NOP], &[0, 1, 2]);
    assert_eq!(
        error_of(&run),
        expected(MacroError::ParameterLeftover {
            consumed: 1,
            count: 3
        })
    );
}

#[test]
fn no_parameters() {
    let run = run_all(&[exit(NOP), NOP], &[]);
    assert_eq!(
        error_of(&run),
        expected(MacroError::ParameterUnderflow { pc: 0 })
    );
}

#[test]
fn underflow_reports_pc() {
    let words = [
        add_imm(2, 0, 0, FETCH),
        add_imm(3, 0, 0, FETCH),
        exit(NOP),
        NOP,
    ];
    let run = run_all(&words, &[0, 1]);
    assert_eq!(
        error_of(&run),
        expected(MacroError::ParameterUnderflow { pc: 1 })
    );
}

#[test]
fn idempotent_runs() {
    let words = [
        add_imm(7, 0, 0x1010, MOVE_SET_METHOD),
        add_imm(2, 0, 0, FETCH_SEND),
        exit(read(3, 0, 0x20, MOVE_SEND)),
        NOP,
    ];
    let first = run_all(&words, &[0, 77]);
    let second = run_all(&words, &[0, 77]);
    assert_eq!(first, second);
    assert_eq!(first.bank.calls.len(), 2);
}
