//! Macro instruction word fields.
//!
//! Every macro instruction is a single 32-bit word. [`Opcode`] is a thin
//! view over the raw word with one accessor per bit field; which fields are
//! meaningful depends on [`Operation`]. Use [`Opcode::decode`] to get a
//! tagged [`Instruction`](crate::insn::Instruction) that only carries the
//! fields its operation reads.

/// Primary operation, bits [2:0].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Operation {
    Alu = 0,
    AddImmediate = 1,
    ExtractInsert = 2,
    ExtractShiftLeftImmediate = 3,
    ExtractShiftLeftRegister = 4,
    Read = 5,
    Reserved = 6,
    Branch = 7,
}

impl Operation {
    pub const fn from_raw(v: u32) -> Self {
        match v & 0x7 {
            0 => Self::Alu,
            1 => Self::AddImmediate,
            2 => Self::ExtractInsert,
            3 => Self::ExtractShiftLeftImmediate,
            4 => Self::ExtractShiftLeftRegister,
            5 => Self::Read,
            6 => Self::Reserved,
            _ => Self::Branch,
        }
    }
}

/// ALU sub-operation, bits [21:17]. Encodings 4..=7 and 13..=31 are unused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AluOperation {
    Add = 0,
    AddWithCarry = 1,
    Subtract = 2,
    SubtractWithBorrow = 3,
    Xor = 8,
    Or = 9,
    And = 10,
    AndNot = 11,
    Nand = 12,
}

impl AluOperation {
    pub const fn from_raw(v: u32) -> Option<Self> {
        Some(match v {
            0 => Self::Add,
            1 => Self::AddWithCarry,
            2 => Self::Subtract,
            3 => Self::SubtractWithBorrow,
            8 => Self::Xor,
            9 => Self::Or,
            10 => Self::And,
            11 => Self::AndNot,
            12 => Self::Nand,
            _ => return None,
        })
    }

    /// Whether the operation consumes the carry flag.
    pub const fn reads_carry(self) -> bool {
        matches!(self, Self::AddWithCarry | Self::SubtractWithBorrow)
    }

    /// Whether the operation produces the carry flag.
    pub const fn writes_carry(self) -> bool {
        matches!(
            self,
            Self::Add | Self::AddWithCarry | Self::Subtract | Self::SubtractWithBorrow
        )
    }
}

/// What to do with the computed value, bits [6:4].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResultOperation {
    IgnoreAndFetch = 0,
    Move = 1,
    MoveAndSetMethod = 2,
    FetchAndSend = 3,
    MoveAndSend = 4,
    FetchAndSetMethod = 5,
    MoveAndSetMethodFetchAndSend = 6,
    MoveAndSetMethodSend = 7,
}

impl ResultOperation {
    pub const fn from_raw(v: u32) -> Self {
        match v & 0x7 {
            0 => Self::IgnoreAndFetch,
            1 => Self::Move,
            2 => Self::MoveAndSetMethod,
            3 => Self::FetchAndSend,
            4 => Self::MoveAndSend,
            5 => Self::FetchAndSetMethod,
            6 => Self::MoveAndSetMethodFetchAndSend,
            _ => Self::MoveAndSetMethodSend,
        }
    }

    /// Whether this result operation pops a word from the parameter queue.
    pub const fn fetches(self) -> bool {
        matches!(
            self,
            Self::IgnoreAndFetch
                | Self::FetchAndSend
                | Self::FetchAndSetMethod
                | Self::MoveAndSetMethodFetchAndSend
        )
    }

    /// Whether this result operation issues a method call.
    pub const fn sends(self) -> bool {
        matches!(
            self,
            Self::FetchAndSend
                | Self::MoveAndSend
                | Self::MoveAndSetMethodFetchAndSend
                | Self::MoveAndSetMethodSend
        )
    }
}

/// Branch condition, bit [4].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BranchCondition {
    Zero = 0,
    NotZero = 1,
}

impl BranchCondition {
    pub const fn from_raw(v: u32) -> Self {
        if v & 1 == 0 {
            Self::Zero
        } else {
            Self::NotZero
        }
    }

    /// Evaluate the condition against a register value.
    #[inline]
    pub const fn is_taken(self, value: u32) -> bool {
        (value == 0) == matches!(self, Self::Zero)
    }
}

/// Raw 32-bit macro opcode with accessors for each bit field.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Opcode(pub u32);

impl Opcode {
    /// Primary operation (bits [2:0]).
    #[inline]
    pub const fn operation(self) -> Operation {
        Operation::from_raw(self.0)
    }

    /// Result operation (bits [6:4]).
    #[inline]
    pub const fn result_operation(self) -> ResultOperation {
        ResultOperation::from_raw(self.0 >> 4)
    }

    /// Branch condition (bit [4]).
    #[inline]
    pub const fn branch_condition(self) -> BranchCondition {
        BranchCondition::from_raw(self.0 >> 4)
    }

    /// Branch annul flag (bit [5]). An annulled branch has no delay slot.
    #[inline]
    pub const fn branch_annul(self) -> bool {
        (self.0 >> 5) & 1 != 0
    }

    /// Exit flag (bit [7]).
    #[inline]
    pub const fn is_exit(self) -> bool {
        (self.0 >> 7) & 1 != 0
    }

    /// Destination register (bits [10:8]).
    #[inline]
    pub const fn dst(self) -> u8 {
        ((self.0 >> 8) & 0x7) as u8
    }

    /// Source register A (bits [13:11]).
    #[inline]
    pub const fn src_a(self) -> u8 {
        ((self.0 >> 11) & 0x7) as u8
    }

    /// Source register B (bits [16:14]).
    #[inline]
    pub const fn src_b(self) -> u8 {
        ((self.0 >> 14) & 0x7) as u8
    }

    /// Signed 18-bit immediate (bits [31:14]).
    #[inline]
    pub const fn immediate(self) -> i32 {
        crate::insn::sign_extend_18(self.0 >> 14)
    }

    /// Raw ALU sub-operation field (bits [21:17]).
    #[inline]
    pub const fn alu_operation_raw(self) -> u32 {
        (self.0 >> 17) & 0x1F
    }

    /// ALU sub-operation, or `None` for an unused encoding.
    #[inline]
    pub const fn alu_operation(self) -> Option<AluOperation> {
        AluOperation::from_raw(self.alu_operation_raw())
    }

    /// Bitfield source bit position (bits [21:17]).
    #[inline]
    pub const fn bf_src_bit(self) -> u8 {
        ((self.0 >> 17) & 0x1F) as u8
    }

    /// Bitfield size (bits [26:22]).
    #[inline]
    pub const fn bf_size(self) -> u8 {
        ((self.0 >> 22) & 0x1F) as u8
    }

    /// Bitfield destination bit position (bits [31:27]).
    #[inline]
    pub const fn bf_dst_bit(self) -> u8 {
        ((self.0 >> 27) & 0x1F) as u8
    }
}

impl std::fmt::Debug for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Opcode(0x{:08x})", self.0)
    }
}
