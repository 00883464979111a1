use std::collections::hash_map::Entry;
use std::collections::HashMap;

use mme_backend::compile;
use mme_core::{disassemble, hash_code, CodeStore, MacroState, RegisterBank, Result};

use crate::cache::{CacheEntry, Program};
use crate::config::MacroConfig;
use crate::hle::HleTable;
use crate::interpreter::InterpretedProgram;

/// Front-end of the macro unit: owns uploaded code and the per-entry
/// program cache, and runs macros against a borrowed register bank.
///
/// No invocation state lives here, so a bank may run macros on another
/// engine from inside `call_method`.
#[derive(Debug)]
pub struct MacroEngine {
    config: MacroConfig,
    code: CodeStore,
    cache: HashMap<u32, CacheEntry>,
    hle: HleTable,
}

impl MacroEngine {
    pub fn new(config: MacroConfig) -> Self {
        Self::with_hle(config, HleTable::new())
    }

    pub fn with_hle(config: MacroConfig, hle: HleTable) -> Self {
        Self {
            config,
            code: CodeStore::new(),
            cache: HashMap::new(),
            hle,
        }
    }

    pub fn config(&self) -> &MacroConfig {
        &self.config
    }

    pub fn code_store(&self) -> &CodeStore {
        &self.code
    }

    /// Append `word` to the macro uploaded under `method`.
    pub fn install(&mut self, method: u32, word: u32) {
        self.code.append(method, word);
        self.evict(method);
    }

    /// Alias of [`MacroEngine::install`].
    pub fn add_code(&mut self, method: u32, word: u32) {
        self.install(method, word);
    }

    /// Drop the macro uploaded under `method`. Returns its length.
    pub fn clear_code(&mut self, method: u32) -> Option<usize> {
        let removed = self.code.clear(method);
        if removed.is_some() {
            self.evict(method);
        }
        removed
    }

    /// Cached state for `entry`, if it has run since its code last changed.
    pub fn cache_entry(&self, entry: u32) -> Option<&CacheEntry> {
        self.cache.get(&entry)
    }

    /// Run the macro entered at `entry`.
    ///
    /// Returns the terminal machine state, or `None` when an HLE override
    /// handled the call.
    pub fn execute(
        &mut self,
        entry: u32,
        params: &[u32],
        bank: &mut dyn RegisterBank,
    ) -> Result<Option<MacroState>> {
        let cached = match self.cache.entry(entry) {
            Entry::Occupied(slot) => slot.into_mut(),
            Entry::Vacant(slot) => {
                slot.insert(build_entry(&self.code, &self.config, &self.hle, entry)?)
            }
        };
        log::trace!(
            "macro 0x{entry:x}: {:?} with {} parameters",
            cached.kind(),
            params.len()
        );
        match &cached.program {
            Program::Hle(f) => f(bank, params).map(|()| None),
            Program::Jit(program) => program.run(params, bank).map(Some),
            Program::Interpreter => cached.interpreter.run(params, bank).map(Some),
        }
    }

    /// Forget every cached entry the modified macro under `method` may
    /// have fed. Entries inside its new range may now resolve to it.
    fn evict(&mut self, method: u32) {
        let len = self.code.len_of(method).unwrap_or(0) as u64;
        let range = method as u64..method as u64 + len;
        let before = self.cache.len();
        self.cache
            .retain(|&entry, cached| cached.base != method && !range.contains(&(entry as u64)));
        let evicted = before - self.cache.len();
        if evicted > 0 {
            log::debug!("macro 0x{method:x}: code changed, evicted {evicted} cache entries");
        }
    }
}

fn build_entry(
    code: &CodeStore,
    config: &MacroConfig,
    hle: &HleTable,
    entry: u32,
) -> Result<CacheEntry> {
    let body = code.body_for(entry)?;
    let hash = hash_code(body.words);
    if config.dump_macros {
        log::info!(
            "macro 0x{entry:x} (base 0x{:x}, hash {hash:016x}):\n{}",
            body.base,
            disassemble(body.words)
        );
    }

    let interpreter = InterpretedProgram::new(body.words);
    let hle_fn = if config.disable_hle {
        None
    } else {
        hle.lookup(hash)
    };
    let program = if let Some(f) = hle_fn {
        Program::Hle(f)
    } else if config.disable_jit {
        Program::Interpreter
    } else {
        match compile(interpreter.code(), &config.optimizer, config.jit_buffer_size) {
            Ok(program) => Program::Jit(program),
            Err(e) if e.is_recoverable() => {
                log::warn!("macro 0x{entry:x}: {e}; falling back to the interpreter");
                Program::Interpreter
            }
            Err(e) => return Err(e),
        }
    };

    let cached = CacheEntry {
        base: body.base,
        hash,
        interpreter,
        program,
    };
    log::debug!(
        "macro 0x{entry:x}: cached {} words as {:?} (hash {hash:016x})",
        body.words.len(),
        cached.kind()
    );
    Ok(cached)
}
