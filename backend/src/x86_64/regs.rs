/// x86-64 general-purpose register indices.
///
/// Encoding matches the x86-64 ModR/M and REX register numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Reg {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

impl Reg {
    pub const ALL: [Reg; 16] = [
        Reg::Rax,
        Reg::Rcx,
        Reg::Rdx,
        Reg::Rbx,
        Reg::Rsp,
        Reg::Rbp,
        Reg::Rsi,
        Reg::Rdi,
        Reg::R8,
        Reg::R9,
        Reg::R10,
        Reg::R11,
        Reg::R12,
        Reg::R13,
        Reg::R14,
        Reg::R15,
    ];

    /// Low 3 bits of the register encoding (for ModR/M).
    #[inline]
    pub const fn low3(self) -> u8 {
        (self as u8) & 0x7
    }

    /// Whether this register requires a REX prefix (R8-R15).
    #[inline]
    pub const fn needs_rex(self) -> bool {
        (self as u8) >= 8
    }
}

/// Set of host registers as a bitmask over [`Reg`] encodings.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegSet(u16);

impl RegSet {
    pub const EMPTY: RegSet = RegSet(0);

    pub const fn from_regs(regs: &[Reg]) -> Self {
        let mut bits = 0u16;
        let mut i = 0;
        while i < regs.len() {
            bits |= 1 << regs[i] as u16;
            i += 1;
        }
        Self(bits)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    pub const fn contains(self, reg: Reg) -> bool {
        self.0 & (1 << reg as u16) != 0
    }

    pub const fn union(self, other: RegSet) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn intersect(self, other: RegSet) -> Self {
        Self(self.0 & other.0)
    }

    pub const fn subtract(self, other: RegSet) -> Self {
        Self(self.0 & !other.0)
    }

    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Members in ascending encoding order.
    pub fn iter(self) -> impl DoubleEndedIterator<Item = Reg> {
        Reg::ALL.into_iter().filter(move |&r| self.contains(r))
    }
}

impl std::fmt::Debug for RegSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Pointer to the per-invocation `JitState`.
pub const STATE: Reg = Reg::Rbx;
/// Cursor into the parameter array.
pub const PARAMETERS: Reg = Reg::R12;
/// One past the last parameter.
pub const PARAMETERS_END: Reg = Reg::R13;
/// Raw method address value.
pub const METHOD_ADDRESS: Reg = Reg::R14;
/// Pending control transfer (delay slot or exit), zero when none.
pub const BRANCH_HOLDER: Reg = Reg::R15;

/// Scratch registers. Clobbered freely within one macro instruction.
pub const RESULT: Reg = Reg::Rax;
pub const SCRATCH_B: Reg = Reg::Rcx;
pub const SCRATCH_C: Reg = Reg::Rdx;

/// Registers that live across the whole macro body.
pub const PERSISTENT_REGS: RegSet = RegSet::from_regs(&[
    STATE,
    PARAMETERS,
    PARAMETERS_END,
    METHOD_ADDRESS,
    BRANCH_HOLDER,
]);

/// System V caller-saved registers.
pub const CALLER_SAVED_REGS: RegSet = RegSet::from_regs(&[
    Reg::Rax,
    Reg::Rcx,
    Reg::Rdx,
    Reg::Rsi,
    Reg::Rdi,
    Reg::R8,
    Reg::R9,
    Reg::R10,
    Reg::R11,
]);

/// Persistent registers a host call would clobber; these get pushed
/// around every trampoline call.
pub const SAVED_AROUND_CALLS: RegSet = PERSISTENT_REGS.intersect(CALLER_SAVED_REGS);

/// Callee-saved registers the prologue must save/restore, in push order.
pub const CALLEE_SAVED: &[Reg] = &[Reg::Rbx, Reg::R12, Reg::R13, Reg::R14, Reg::R15];

/// Function argument registers (System V AMD64 ABI).
pub const CALL_ARG_REGS: &[Reg] = &[Reg::Rdi, Reg::Rsi, Reg::Rdx, Reg::Rcx, Reg::R8, Reg::R9];

pub const STACK_ALIGN: usize = 16;

/// Total push size: return address (implicit) + callee-saved pushes.
pub const PUSH_SIZE: usize = (1 + CALLEE_SAVED.len()) * 8;

// Calls out of generated code assume an aligned stack after the prologue.
const _: () = assert!(PUSH_SIZE % STACK_ALIGN == 0);
const _: () = assert!(PERSISTENT_REGS.subtract(RegSet::from_regs(CALLEE_SAVED)).is_empty());
