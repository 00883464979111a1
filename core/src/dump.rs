//! Macro disassembly: a human-readable listing of macro code.

use std::fmt::{self, Write};

use crate::insn::{InsnKind, Instruction};
use crate::opcode::{AluOperation, BranchCondition, Opcode, ResultOperation};

fn alu_name(op: AluOperation) -> &'static str {
    match op {
        AluOperation::Add => "add",
        AluOperation::AddWithCarry => "adc",
        AluOperation::Subtract => "sub",
        AluOperation::SubtractWithBorrow => "sbb",
        AluOperation::Xor => "xor",
        AluOperation::Or => "or",
        AluOperation::And => "and",
        AluOperation::AndNot => "andn",
        AluOperation::Nand => "nand",
    }
}

fn result_name(op: ResultOperation) -> &'static str {
    match op {
        ResultOperation::IgnoreAndFetch => "fetch",
        ResultOperation::Move => "move",
        ResultOperation::MoveAndSetMethod => "move,setm",
        ResultOperation::FetchAndSend => "fetch,send",
        ResultOperation::MoveAndSend => "move,send",
        ResultOperation::FetchAndSetMethod => "fetch,setm",
        ResultOperation::MoveAndSetMethodFetchAndSend => "move,setm,fetch,send",
        ResultOperation::MoveAndSetMethodSend => "move,setm,send",
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            InsnKind::Alu {
                op,
                dst,
                src_a,
                src_b,
                result,
            } => write!(
                f,
                "{:<6} $r{dst}, $r{src_a}, $r{src_b} [{}]",
                alu_name(op),
                result_name(result)
            )?,
            InsnKind::AddImmediate {
                dst,
                src_a,
                imm,
                result,
            } => write!(f, "addi   $r{dst}, $r{src_a}, {imm} [{}]", result_name(result))?,
            InsnKind::ExtractInsert {
                dst,
                src_a,
                src_b,
                src_bit,
                size,
                dst_bit,
                result,
            } => write!(
                f,
                "ins    $r{dst}, $r{src_a}[{dst_bit}:+{size}] <- $r{src_b}[{src_bit}:+{size}] [{}]",
                result_name(result)
            )?,
            InsnKind::ExtractShiftLeftImmediate {
                dst,
                src_a,
                src_b,
                size,
                dst_bit,
                result,
            } => write!(
                f,
                "extsli $r{dst}, ($r{src_b} >> $r{src_a}):{size} << {dst_bit} [{}]",
                result_name(result)
            )?,
            InsnKind::ExtractShiftLeftRegister {
                dst,
                src_a,
                src_b,
                src_bit,
                size,
                result,
            } => write!(
                f,
                "extslr $r{dst}, ($r{src_b} >> {src_bit}):{size} << $r{src_a} [{}]",
                result_name(result)
            )?,
            InsnKind::Read {
                dst,
                src_a,
                imm,
                result,
            } => write!(f, "read   $r{dst}, [$r{src_a} + {imm}] [{}]", result_name(result))?,
            InsnKind::Branch {
                cond,
                annul,
                src_a,
                offset,
            } => {
                let cc = match cond {
                    BranchCondition::Zero => "bz",
                    BranchCondition::NotZero => "bnz",
                };
                let annul = if annul { ".a" } else { "" };
                write!(f, "{:<6} $r{src_a}, {offset:+}", format!("{cc}{annul}"))?;
            }
            InsnKind::Reserved => f.write_str("nop    (reserved)")?,
            InsnKind::InvalidAlu { raw_op } => write!(f, "nop    (alu op {raw_op})")?,
        }
        if self.is_exit {
            f.write_str(" exit")?;
        }
        Ok(())
    }
}

/// Produce an addressed listing of a macro body, one word per line.
pub fn disassemble(words: &[u32]) -> String {
    let mut out = String::new();
    for (pc, &word) in words.iter().enumerate() {
        let insn = Opcode(word).decode();
        let _ = write!(out, "{pc:4}: {word:08x}  {insn}");
        if let InsnKind::Branch { offset, .. } = insn.kind {
            let _ = write!(out, " (-> {})", pc as i64 + offset as i64);
        }
        out.push('\n');
    }
    out
}
