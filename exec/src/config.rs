use mme_backend::{OptimizerOptions, DEFAULT_CODE_BUF_SIZE};

/// Engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacroConfig {
    /// Always interpret; never compile.
    pub disable_jit: bool,
    /// Ignore the HLE table.
    pub disable_hle: bool,
    /// Log a disassembly of every macro when it is first cached.
    pub dump_macros: bool,
    /// Code buffer capacity for each compiled macro.
    pub jit_buffer_size: usize,
    pub optimizer: OptimizerOptions,
}

impl Default for MacroConfig {
    fn default() -> Self {
        Self {
            disable_jit: false,
            disable_hle: false,
            dump_macros: false,
            jit_buffer_size: DEFAULT_CODE_BUF_SIZE,
            optimizer: OptimizerOptions::default(),
        }
    }
}

impl MacroConfig {
    pub fn with_disable_jit(mut self, disable: bool) -> Self {
        self.disable_jit = disable;
        self
    }

    pub fn with_disable_hle(mut self, disable: bool) -> Self {
        self.disable_hle = disable;
        self
    }

    pub fn with_dump_macros(mut self, dump: bool) -> Self {
        self.dump_macros = dump;
        self
    }

    pub fn with_jit_buffer_size(mut self, size: usize) -> Self {
        self.jit_buffer_size = size;
        self
    }

    pub fn with_optimizer(mut self, optimizer: OptimizerOptions) -> Self {
        self.optimizer = optimizer;
        self
    }
}
