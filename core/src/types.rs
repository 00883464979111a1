/// Number of macro general-purpose registers ($r0..$r7).
pub const NUM_MACRO_REGISTERS: usize = 8;

/// Number of addressable GPU registers; READ addresses must stay below it.
pub const NUM_GPU_REGS: u32 = 0xE00;

/// Mask of the method field inside a method address.
pub const METHOD_MASK: u32 = 0xFFF;

/// Macro method address register.
///
/// Layout: bits [11:0] = method, bits [17:12] = auto-increment. The
/// remaining bits are kept as written.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MethodAddress(pub u32);

impl MethodAddress {
    #[inline]
    pub const fn address(self) -> u32 {
        self.0 & METHOD_MASK
    }

    #[inline]
    pub const fn increment(self) -> u32 {
        (self.0 >> 12) & 0x3F
    }

    /// Method address after a send: the method advances by the increment,
    /// wrapping inside the 12-bit field.
    #[inline]
    pub const fn advanced(self) -> Self {
        let inc = self.increment();
        if inc == 0 {
            return self;
        }
        let addr = (self.address() + inc) & METHOD_MASK;
        Self((self.0 & !METHOD_MASK) | addr)
    }
}

impl std::fmt::Debug for MethodAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MethodAddress(addr=0x{:03x}, inc={})",
            self.address(),
            self.increment()
        )
    }
}

/// Observable machine state after a macro finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MacroState {
    pub registers: [u32; NUM_MACRO_REGISTERS],
    pub method_address: MethodAddress,
}
