use std::collections::BTreeMap;

use xxhash_rust::xxh3::xxh3_64;

use crate::error::{MacroError, Result};

/// Macro body resolved for an entry method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacroBody<'a> {
    /// Code words starting at the entry point.
    pub words: &'a [u32],
    /// Method the enclosing macro was uploaded under. Equal to the entry
    /// method unless the entry points into the middle of a macro.
    pub base: u32,
}

/// Append-only storage of uploaded macro code, keyed by entry method.
#[derive(Debug, Default, Clone)]
pub struct CodeStore {
    macros: BTreeMap<u32, Vec<u32>>,
}

impl CodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one code word to the macro uploaded under `method`.
    pub fn append(&mut self, method: u32, word: u32) {
        self.macros.entry(method).or_default().push(word);
    }

    /// Drop the macro uploaded under `method`, returning its length.
    pub fn clear(&mut self, method: u32) -> Option<usize> {
        self.macros.remove(&method).map(|code| code.len())
    }

    /// Resolve the body executed for `entry`.
    ///
    /// An entry that is not an upload key but lies strictly inside an
    /// uploaded macro resolves to the tail of that macro. When several
    /// macros overlap the entry, the nearest base wins.
    pub fn body_for(&self, entry: u32) -> Result<MacroBody<'_>> {
        if let Some(code) = self.macros.get(&entry) {
            return Ok(MacroBody {
                words: code,
                base: entry,
            });
        }
        self.macros
            .range(..entry)
            .rev()
            .find_map(|(&base, code)| {
                let offset = (entry - base) as usize;
                (offset < code.len()).then(|| MacroBody {
                    words: &code[offset..],
                    base,
                })
            })
            .ok_or(MacroError::UnknownMacro(entry))
    }

    /// Uploaded length of the macro keyed by `method`, if any.
    pub fn len_of(&self, method: u32) -> Option<usize> {
        self.macros.get(&method).map(Vec::len)
    }

    /// Number of uploaded macros.
    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }
}

/// Content hash of a macro body.
///
/// Depends only on the words, so identical code uploaded under different
/// methods hashes identically.
pub fn hash_code(words: &[u32]) -> u64 {
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    xxh3_64(&bytes)
}
