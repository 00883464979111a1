//! x86-64 JIT for GPU macros.

pub mod code_buffer;
pub mod label;
pub mod optimize;
pub mod runtime;
pub mod translate;
pub mod x86_64;

pub use code_buffer::{CodeBuffer, DEFAULT_CODE_BUF_SIZE};
pub use label::Label;
pub use optimize::{analyze, Analysis, OptimizerOptions};
pub use runtime::{ExitStatus, JitProgram, JitState};
pub use translate::{compile, host_supported};
