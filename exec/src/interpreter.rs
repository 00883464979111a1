use mme_core::{
    bitfield_mask, decode_program, AluOperation, InsnKind, Instruction, MacroError, MacroState,
    MethodAddress, RegisterBank, Result, ResultOperation, NUM_GPU_REGS, NUM_MACRO_REGISTERS,
};

/// A macro body decoded for interpretation.
#[derive(Debug, Clone)]
pub struct InterpretedProgram {
    code: Vec<Instruction>,
}

impl InterpretedProgram {
    /// Decode `words`. Reserved and unknown ALU words are logged here once.
    pub fn new(words: &[u32]) -> Self {
        Self {
            code: decode_program(words),
        }
    }

    /// Decoded instructions, shared with the JIT.
    pub fn code(&self) -> &[Instruction] {
        &self.code
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Run the macro against `bank`. `params[0]` seeds `$r1`; every fetch
    /// consumes the next word and all words must be consumed.
    pub fn run(&self, params: &[u32], bank: &mut dyn RegisterBank) -> Result<MacroState> {
        let mut machine = Machine::new(&self.code, params, bank)?;
        while machine.step(false)? {}
        machine.finish()
    }
}

/// Execution state of one invocation.
struct Machine<'a> {
    code: &'a [Instruction],
    params: &'a [u32],
    bank: &'a mut dyn RegisterBank,
    registers: [u32; NUM_MACRO_REGISTERS],
    pc: i64,
    delayed_pc: Option<i64>,
    carry: bool,
    method_address: MethodAddress,
    next_param: usize,
}

impl<'a> Machine<'a> {
    fn new(
        code: &'a [Instruction],
        params: &'a [u32],
        bank: &'a mut dyn RegisterBank,
    ) -> Result<Self> {
        let Some(&first) = params.first() else {
            return Err(MacroError::ParameterUnderflow { pc: 0 });
        };
        let mut registers = [0; NUM_MACRO_REGISTERS];
        registers[1] = first;
        Ok(Self {
            code,
            params,
            bank,
            registers,
            pc: 0,
            delayed_pc: None,
            carry: false,
            method_address: MethodAddress::default(),
            next_param: 1,
        })
    }

    fn finish(self) -> Result<MacroState> {
        if self.next_param != self.params.len() {
            return Err(MacroError::ParameterLeftover {
                consumed: self.next_param,
                count: self.params.len(),
            });
        }
        Ok(MacroState {
            registers: self.registers,
            method_address: self.method_address,
        })
    }

    /// Execute one instruction. Returns `Ok(false)` once the macro has
    /// exited.
    fn step(&mut self, is_delay_slot: bool) -> Result<bool> {
        let base_pc = self.pc;
        let insn = self.fetch_insn(base_pc)?;
        self.pc += 1;

        if let Some(target) = self.delayed_pc.take() {
            debug_assert!(is_delay_slot);
            self.pc = target;
        }

        match insn.kind {
            InsnKind::Branch {
                cond,
                annul,
                src_a,
                offset,
            } => {
                if is_delay_slot {
                    return Err(MacroError::BadDelaySlot { pc: base_pc });
                }
                if cond.is_taken(self.reg(src_a)) {
                    let target = base_pc + offset as i64;
                    if annul {
                        self.pc = target;
                        return Ok(true);
                    }
                    self.delayed_pc = Some(target);
                    return self.step(true);
                }
            }
            kind => self.execute(base_pc, kind)?,
        }

        // Exit: run one more instruction as a delay slot, then stop.
        if insn.is_exit && !is_delay_slot {
            self.step(true)?;
            return Ok(false);
        }
        Ok(true)
    }

    fn fetch_insn(&self, pc: i64) -> Result<Instruction> {
        usize::try_from(pc)
            .ok()
            .and_then(|i| self.code.get(i).copied())
            .ok_or(MacroError::PcOutOfRange {
                pc,
                len: self.code.len(),
            })
    }

    fn execute(&mut self, pc: i64, kind: InsnKind) -> Result<()> {
        match kind {
            InsnKind::Alu {
                op,
                dst,
                src_a,
                src_b,
                result,
            } => {
                let value = self.alu(op, self.reg(src_a), self.reg(src_b));
                self.process_result(pc, result, dst, value)
            }
            InsnKind::AddImmediate {
                dst,
                src_a,
                imm,
                result,
            } => {
                let value = self.reg(src_a).wrapping_add(imm as u32);
                self.process_result(pc, result, dst, value)
            }
            InsnKind::ExtractInsert {
                dst,
                src_a,
                src_b,
                src_bit,
                size,
                dst_bit,
                result,
            } => {
                let mask = bitfield_mask(size as u32);
                let inserted = (self.reg(src_b) >> src_bit) & mask;
                let value = (self.reg(src_a) & !mask.wrapping_shl(dst_bit as u32))
                    | inserted.wrapping_shl(dst_bit as u32);
                self.process_result(pc, result, dst, value)
            }
            InsnKind::ExtractShiftLeftImmediate {
                dst,
                src_a,
                src_b,
                size,
                dst_bit,
                result,
            } => {
                let shift = self.reg(src_a);
                let value = (self.reg(src_b).wrapping_shr(shift) & bitfield_mask(size as u32))
                    .wrapping_shl(dst_bit as u32);
                self.process_result(pc, result, dst, value)
            }
            InsnKind::ExtractShiftLeftRegister {
                dst,
                src_a,
                src_b,
                src_bit,
                size,
                result,
            } => {
                let shift = self.reg(src_a);
                let value = ((self.reg(src_b) >> src_bit) & bitfield_mask(size as u32))
                    .wrapping_shl(shift);
                self.process_result(pc, result, dst, value)
            }
            InsnKind::Read {
                dst,
                src_a,
                imm,
                result,
            } => {
                let address = self.reg(src_a).wrapping_add(imm as u32);
                if address >= NUM_GPU_REGS {
                    return Err(MacroError::RegisterOutOfRange {
                        address,
                        limit: NUM_GPU_REGS,
                    });
                }
                let value = self.bank.read_register(address);
                self.process_result(pc, result, dst, value)
            }
            // Warned about when decoded.
            InsnKind::Reserved | InsnKind::InvalidAlu { .. } => Ok(()),
            InsnKind::Branch { .. } => unreachable!("branches are handled by step"),
        }
    }

    fn alu(&mut self, op: AluOperation, a: u32, b: u32) -> u32 {
        match op {
            AluOperation::Add => {
                let (result, carry) = a.overflowing_add(b);
                self.carry = carry;
                result
            }
            AluOperation::AddWithCarry => {
                let wide = a as u64 + b as u64 + self.carry as u64;
                self.carry = wide > u32::MAX as u64;
                wide as u32
            }
            AluOperation::Subtract => {
                let (result, borrow) = a.overflowing_sub(b);
                self.carry = !borrow;
                result
            }
            AluOperation::SubtractWithBorrow => {
                let wide = (a as u64)
                    .wrapping_sub(b as u64)
                    .wrapping_sub(!self.carry as u64);
                self.carry = wide <= u32::MAX as u64;
                wide as u32
            }
            AluOperation::Xor => a ^ b,
            AluOperation::Or => a | b,
            AluOperation::And => a & b,
            AluOperation::AndNot => a & !b,
            AluOperation::Nand => !(a & b),
        }
    }

    fn process_result(
        &mut self,
        pc: i64,
        op: ResultOperation,
        dst: u8,
        value: u32,
    ) -> Result<()> {
        match op {
            ResultOperation::IgnoreAndFetch => {
                let param = self.fetch_param(pc)?;
                self.set_reg(dst, param);
            }
            ResultOperation::Move => self.set_reg(dst, value),
            ResultOperation::MoveAndSetMethod => {
                self.set_reg(dst, value);
                self.method_address = MethodAddress(value);
            }
            ResultOperation::FetchAndSend => {
                let param = self.fetch_param(pc)?;
                self.set_reg(dst, param);
                self.send(value);
            }
            ResultOperation::MoveAndSend => {
                self.set_reg(dst, value);
                self.send(value);
            }
            ResultOperation::FetchAndSetMethod => {
                let param = self.fetch_param(pc)?;
                self.set_reg(dst, param);
                self.method_address = MethodAddress(value);
            }
            ResultOperation::MoveAndSetMethodFetchAndSend => {
                self.set_reg(dst, value);
                self.method_address = MethodAddress(value);
                let param = self.fetch_param(pc)?;
                self.send(param);
            }
            ResultOperation::MoveAndSetMethodSend => {
                self.set_reg(dst, value);
                self.method_address = MethodAddress(value);
                self.send((value >> 12) & 0x3F);
            }
        }
        Ok(())
    }

    fn send(&mut self, value: u32) {
        self.bank
            .call_method(self.method_address.address(), value);
        self.method_address = self.method_address.advanced();
    }

    fn fetch_param(&mut self, pc: i64) -> Result<u32> {
        let param = *self
            .params
            .get(self.next_param)
            .ok_or(MacroError::ParameterUnderflow { pc })?;
        self.next_param += 1;
        Ok(param)
    }

    #[inline]
    fn reg(&self, r: u8) -> u32 {
        // $r0 is never written.
        self.registers[r as usize]
    }

    #[inline]
    fn set_reg(&mut self, r: u8, value: u32) {
        if r != 0 {
            self.registers[r as usize] = value;
        }
    }
}
