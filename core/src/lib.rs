//! Macro engine core: instruction set, code store and shared types.
//!
//! The GPU macro unit runs short programs ("macros") uploaded through the
//! command stream. This crate defines the 32-bit instruction encoding and
//! its decoder, the append-only store macros are uploaded into, and the
//! interface macros use to reach the GPU.

pub mod bank;
pub mod code_store;
pub mod dump;
pub mod error;
pub mod insn;
pub mod opcode;
pub mod types;

pub use bank::RegisterBank;
pub use code_store::{hash_code, CodeStore, MacroBody};
pub use dump::disassemble;
pub use error::{MacroError, Result};
pub use insn::{bitfield_mask, branch_target, decode_program, sign_extend_18, InsnKind, Instruction};
pub use opcode::{AluOperation, BranchCondition, Opcode, Operation, ResultOperation};
pub use types::{MacroState, MethodAddress, METHOD_MASK, NUM_GPU_REGS, NUM_MACRO_REGISTERS};
