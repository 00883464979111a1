use std::collections::HashMap;

use mme_core::{hash_code, MacroError, RegisterBank};

/// Host reimplementation of a macro. Receives the full parameter list,
/// including the word that would seed `$r1`.
pub type HleFn = fn(&mut dyn RegisterBank, &[u32]) -> Result<(), MacroError>;

/// High-level overrides keyed by macro content hash.
///
/// The table belongs to one engine and is filled before the engine starts
/// running macros; a hit replaces both the interpreter and the JIT for
/// every entry whose body hashes to the key.
#[derive(Clone, Default)]
pub struct HleTable {
    entries: HashMap<u64, HleFn>,
}

impl HleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `f` for bodies hashing to `hash`. Returns the override it
    /// replaces, if any.
    pub fn register(&mut self, hash: u64, f: HleFn) -> Option<HleFn> {
        self.entries.insert(hash, f)
    }

    /// Register `f` for the exact body `words`.
    pub fn register_code(&mut self, words: &[u32], f: HleFn) -> Option<HleFn> {
        self.register(hash_code(words), f)
    }

    pub fn lookup(&self, hash: u64) -> Option<HleFn> {
        self.entries.get(&hash).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for HleTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut hashes: Vec<_> = self.entries.keys().collect();
        hashes.sort();
        f.debug_struct("HleTable").field("hashes", &hashes).finish()
    }
}
