use thiserror::Error;

/// Errors raised while resolving, compiling or running a macro.
#[derive(Debug, Error)]
pub enum MacroError {
    #[error("macro 0x{0:x} was not uploaded")]
    UnknownMacro(u32),

    #[error("macro read of register 0x{address:x} is out of range (limit 0x{limit:x})")]
    RegisterOutOfRange { address: u32, limit: u32 },

    #[error("branch at pc {pc} executed in a delay slot")]
    BadDelaySlot { pc: i64 },

    #[error("parameter fetch at pc {pc} with no parameters left")]
    ParameterUnderflow { pc: i64 },

    #[error("macro finished after consuming {consumed} of {count} parameters")]
    ParameterLeftover { consumed: usize, count: usize },

    #[error("pc {pc} is outside the macro body ({len} words)")]
    PcOutOfRange { pc: i64, len: usize },

    #[error("jit code buffer exhausted ({capacity} bytes)")]
    JitBufferExhausted { capacity: usize },

    #[error("jit is not supported on this host")]
    JitUnsupported,

    #[error("jit code buffer mapping failed: {0}")]
    JitMap(#[from] std::io::Error),
}

impl MacroError {
    /// Whether the error only rules out the JIT; the macro can still run
    /// on the interpreter.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::JitBufferExhausted { .. } | Self::JitUnsupported | Self::JitMap(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MacroError>;
