//! Glue between generated code and the Rust side.
//!
//! Generated code sees a [`JitState`] through `rbx` and calls back into the
//! register bank through two `extern "C"` trampolines. Panics raised by the
//! bank never unwind through generated frames: the trampolines catch them,
//! flag the state, and [`JitProgram::run`] resumes them once the native
//! function has returned.

use std::any::Any;
use std::ffi::c_void;
use std::mem::offset_of;
use std::panic::{self, AssertUnwindSafe};

use mme_core::{
    MacroError, MacroState, MethodAddress, RegisterBank, Result, NUM_GPU_REGS,
    NUM_MACRO_REGISTERS,
};

use crate::code_buffer::CodeBuffer;

/// Signature of a compiled macro.
pub type NativeFn = unsafe extern "C" fn(state: *mut JitState, params: *const u32);

/// Why generated code left through the exit path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum ExitStatus {
    Ok = 0,
    ParameterUnderflow = 1,
    BadDelaySlot = 2,
    PcOutOfRange = 3,
    RegisterOutOfRange = 4,
    Panicked = 5,
}

impl ExitStatus {
    pub fn from_raw(v: u32) -> Self {
        match v {
            0 => Self::Ok,
            1 => Self::ParameterUnderflow,
            2 => Self::BadDelaySlot,
            3 => Self::PcOutOfRange,
            4 => Self::RegisterOutOfRange,
            _ => Self::Panicked,
        }
    }
}

/// Per-invocation machine state shared with generated code.
#[repr(C)]
#[derive(Debug)]
pub struct JitState {
    pub registers: [u32; NUM_MACRO_REGISTERS],
    /// 0 or 1; only the low byte is written.
    pub carry: u32,
    pub status: u32,
    /// Faulting pc or register address, depending on `status`.
    pub fault_arg: u32,
    /// Raw method address at exit.
    pub method_address: u32,
    /// Next unread parameter at exit.
    pub param_cursor: *const u32,
    pub param_end: *const u32,
    host: *mut c_void,
}

pub const STATE_CARRY: i32 = offset_of!(JitState, carry) as i32;
pub const STATE_STATUS: i32 = offset_of!(JitState, status) as i32;
pub const STATE_FAULT_ARG: i32 = offset_of!(JitState, fault_arg) as i32;
pub const STATE_METHOD_ADDRESS: i32 = offset_of!(JitState, method_address) as i32;
pub const STATE_PARAM_CURSOR: i32 = offset_of!(JitState, param_cursor) as i32;
pub const STATE_PARAM_END: i32 = offset_of!(JitState, param_end) as i32;

/// Offset of macro register `r` within the state.
#[inline]
pub const fn state_register(r: u8) -> i32 {
    (offset_of!(JitState, registers) + 4 * (r as usize)) as i32
}

/// Host context reachable from the trampolines.
struct CallHost<'a> {
    bank: &'a mut dyn RegisterBank,
    panic: Option<Box<dyn Any + Send>>,
}

impl CallHost<'_> {
    fn record_panic(&mut self, state: &mut JitState, payload: Box<dyn Any + Send>) {
        self.panic = Some(payload);
        state.status = ExitStatus::Panicked as u32;
    }
}

/// `call_method(method, value)` on the running bank.
///
/// # Safety
/// `state` must be the live state of a running [`JitProgram::run`].
pub unsafe extern "C" fn jit_send(state: *mut JitState, method: u32, value: u32) {
    let state = &mut *state;
    let host = &mut *(state.host as *mut CallHost<'_>);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| host.bank.call_method(method, value)));
    if let Err(payload) = outcome {
        host.record_panic(state, payload);
    }
}

/// `read_register(address)` on the running bank, bounds-checked.
///
/// # Safety
/// `state` must be the live state of a running [`JitProgram::run`].
pub unsafe extern "C" fn jit_read(state: *mut JitState, address: u32) -> u32 {
    let state = &mut *state;
    if address >= NUM_GPU_REGS {
        state.status = ExitStatus::RegisterOutOfRange as u32;
        state.fault_arg = address;
        return 0;
    }
    let host = &mut *(state.host as *mut CallHost<'_>);
    match panic::catch_unwind(AssertUnwindSafe(|| host.bank.read_register(address))) {
        Ok(value) => value,
        Err(payload) => {
            host.record_panic(state, payload);
            0
        }
    }
}

/// A compiled macro. Owns its executable mapping; dropping the program
/// unmaps the code.
pub struct JitProgram {
    buf: CodeBuffer,
    entry: NativeFn,
    len: usize,
}

impl JitProgram {
    /// Wrap a finished, executable buffer whose entry point is at offset 0.
    ///
    /// # Safety
    /// `buf` must hold a complete function with the [`NativeFn`] ABI at its
    /// start and must already be executable.
    pub(crate) unsafe fn from_buffer(buf: CodeBuffer, len: usize) -> Self {
        let entry = std::mem::transmute::<*const u8, NativeFn>(buf.base_ptr());
        Self { buf, entry, len }
    }

    /// Number of macro instructions compiled.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Generated host code.
    pub fn code(&self) -> &[u8] {
        self.buf.as_slice()
    }

    pub fn code_size(&self) -> usize {
        self.buf.offset()
    }

    /// Run the macro against `bank` with the given parameter words.
    pub fn run(&self, params: &[u32], bank: &mut dyn RegisterBank) -> Result<MacroState> {
        if params.is_empty() {
            return Err(MacroError::ParameterUnderflow { pc: 0 });
        }
        let range = params.as_ptr_range();
        let mut host = CallHost { bank, panic: None };
        let mut state = JitState {
            registers: [0; NUM_MACRO_REGISTERS],
            carry: 0,
            status: ExitStatus::Ok as u32,
            fault_arg: 0,
            method_address: 0,
            param_cursor: range.start,
            param_end: range.end,
            host: &mut host as *mut CallHost<'_> as *mut c_void,
        };

        // SAFETY: the buffer holds a complete NativeFn; `state` and `host`
        // outlive the call and `params` is non-empty.
        unsafe { (self.entry)(&mut state, range.start) };

        if let Some(payload) = host.panic.take() {
            panic::resume_unwind(payload);
        }

        let fault = state.fault_arg;
        match ExitStatus::from_raw(state.status) {
            ExitStatus::Ok => {}
            ExitStatus::ParameterUnderflow => {
                return Err(MacroError::ParameterUnderflow { pc: signed_pc(fault) })
            }
            ExitStatus::BadDelaySlot => {
                return Err(MacroError::BadDelaySlot { pc: signed_pc(fault) })
            }
            ExitStatus::PcOutOfRange => {
                return Err(MacroError::PcOutOfRange {
                    pc: signed_pc(fault),
                    len: self.len,
                })
            }
            ExitStatus::RegisterOutOfRange => {
                return Err(MacroError::RegisterOutOfRange {
                    address: fault,
                    limit: NUM_GPU_REGS,
                })
            }
            ExitStatus::Panicked => unreachable!("bank panic is resumed above"),
        }

        // SAFETY: generated code only advances the cursor within `params`.
        let consumed = unsafe { state.param_cursor.offset_from(range.start) } as usize;
        if consumed != params.len() {
            return Err(MacroError::ParameterLeftover {
                consumed,
                count: params.len(),
            });
        }

        Ok(MacroState {
            registers: state.registers,
            method_address: MethodAddress(state.method_address),
        })
    }
}

impl std::fmt::Debug for JitProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JitProgram")
            .field("len", &self.len)
            .field("code_size", &self.code_size())
            .finish()
    }
}

fn signed_pc(raw: u32) -> i64 {
    raw as i32 as i64
}
