//! Macro engine front-end: interpreter, program cache and HLE overrides.
//!
//! [`MacroEngine`] resolves an entry method to its uploaded body, picks a
//! program for it (HLE override, compiled code, or the interpreter) and
//! caches that choice until the code under it changes.

pub mod cache;
pub mod config;
pub mod engine;
pub mod hle;
pub mod interpreter;

pub use cache::{CacheEntry, Program, ProgramKind};
pub use config::MacroConfig;
pub use engine::MacroEngine;
pub use hle::{HleFn, HleTable};
pub use interpreter::InterpretedProgram;
