use mme_backend::JitProgram;

use crate::hle::HleFn;
use crate::interpreter::InterpretedProgram;

/// How a cached macro runs.
pub enum Program {
    Hle(HleFn),
    Jit(JitProgram),
    Interpreter,
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Program::Hle(_) => f.write_str("Hle"),
            Program::Jit(p) => f.debug_tuple("Jit").field(p).finish(),
            Program::Interpreter => f.write_str("Interpreter"),
        }
    }
}

/// Discriminant of [`Program`], for introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramKind {
    Hle,
    Jit,
    Interpreter,
}

/// Everything the engine keeps per entry method.
#[derive(Debug)]
pub struct CacheEntry {
    /// Method the body was uploaded under.
    pub base: u32,
    /// Content hash of the body at build time.
    pub hash: u64,
    /// Always built; the fallback for every other program kind.
    pub interpreter: InterpretedProgram,
    pub program: Program,
}

impl CacheEntry {
    pub fn kind(&self) -> ProgramKind {
        match self.program {
            Program::Hle(_) => ProgramKind::Hle,
            Program::Jit(_) => ProgramKind::Jit,
            Program::Interpreter => ProgramKind::Interpreter,
        }
    }

    /// Compiled program, when the entry runs on the JIT.
    pub fn jit(&self) -> Option<&JitProgram> {
        match &self.program {
            Program::Jit(p) => Some(p),
            _ => None,
        }
    }
}
