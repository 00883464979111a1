/// The GPU engine a macro drives.
///
/// Macros observe the GPU only through this trait: register reads and
/// method calls. Calls arrive in program order.
pub trait RegisterBank {
    /// Read GPU register `index`. Callers guarantee
    /// `index < NUM_GPU_REGS`; implementations may panic otherwise.
    fn read_register(&mut self, index: u32) -> u32;

    /// Dispatch GPU method `method` with `argument`.
    fn call_method(&mut self, method: u32, argument: u32);
}
