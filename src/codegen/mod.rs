//! Generación de código ensamblador x86-64.
//!
//! Traducción mecánica, instrucción por instrucción, de IR a código
//! de máquina. Los registros `%r10` y `%r11` sirven como área de paso
//! para todo operando, ya que la máquina no permite operaciones de
//! memoria a memoria. Lectura y escritura de enteros se delegan a
//! `scanf` y `printf` de la biblioteca de C.

use std::fmt::{self, Display};

use log::debug;

use crate::{
    error::InternalError,
    ir::{Instruction, InstructionSequence, Label, Opcode, Operand, VReg},
    lower::Lowered,
};

mod regs;
pub mod x86_64;

use regs::Allocations;
use x86_64::{MachineInstruction, MachineOperand, Mnemonic, Reg};

const READ_FORMAT: &str = "s_readint_fmt";
const WRITE_FORMAT: &str = "s_writeint_fmt";

/// Una línea del listado final.
#[derive(Clone, Debug, PartialEq)]
pub enum Line {
    Label(Label),

    /// Instrucción de IR de la que provienen las siguientes líneas.
    Source(String),

    Instruction(MachineInstruction),
}

/// Programa completo en ensamblador, listo para `as`.
pub struct Assembly {
    frame_size: u64,
    lines: Vec<Line>,
}

impl Assembly {
    pub fn frame_size(&self) -> u64 {
        self.frame_size
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Instrucciones de máquina del cuerpo, sin prólogo ni epílogo.
    pub fn instructions(&self) -> impl Iterator<Item = &MachineInstruction> {
        self.lines.iter().filter_map(|line| match line {
            Line::Instruction(instruction) => Some(instruction),
            _ => None,
        })
    }
}

impl Display for Assembly {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(fmt, "\t.section .rodata")?;
        writeln!(fmt, "{}: .string \"%ld\"", READ_FORMAT)?;
        writeln!(fmt, "{}: .string \"%ld\\n\"", WRITE_FORMAT)?;
        writeln!(fmt, "\t.section .text")?;
        writeln!(fmt, "\t.globl main")?;
        writeln!(fmt, "main:")?;

        // Prólogo, preserva registros y reserva el frame
        for reg in Reg::CALLEE_SAVED {
            emit!(fmt, Mnemonic::Pushq, "%{}", reg)?;
        }

        emit!(fmt, Mnemonic::Subq, "${}, %rsp", self.frame_size)?;

        for line in &self.lines {
            match line {
                Line::Label(label) => writeln!(fmt, "{}:", label)?,
                Line::Source(source) => writeln!(fmt, "\t# {}", source)?,
                Line::Instruction(instruction) => write!(fmt, "{}", instruction)?,
            }
        }

        // Epílogo, `main` retorna 0
        emit!(fmt, Mnemonic::Addq, "${}, %rsp", self.frame_size)?;
        for reg in Reg::CALLEE_SAVED.iter().rev() {
            emit!(fmt, Mnemonic::Popq, "%{}", reg)?;
        }

        emit!(fmt, Mnemonic::Movl, "$0, %eax")?;
        emit!(fmt, Mnemonic::Ret)
    }
}

/// Traduce un programa en IR a ensamblador.
pub fn emit(lowered: &Lowered) -> Result<Assembly, InternalError> {
    let allocations = Allocations::new(&lowered.code, lowered.storage_size, lowered.vreg_count);

    let mut codegen = AssemblyCodeGen {
        allocations: &allocations,
        lines: Vec::new(),
    };

    codegen.translate(&lowered.code)?;
    debug!("emitted {} assembly lines", codegen.lines.len());

    Ok(Assembly {
        frame_size: allocations.frame_size(),
        lines: codegen.lines,
    })
}

struct AssemblyCodeGen<'a> {
    allocations: &'a Allocations,
    lines: Vec<Line>,
}

impl AssemblyCodeGen<'_> {
    fn translate(&mut self, code: &InstructionSequence) -> Result<(), InternalError> {
        for (position, instruction) in code.iter().enumerate() {
            if let Some(label) = code.label_at(position) {
                self.lines.push(Line::Label(label));
            }

            self.lines.push(Line::Source(instruction.to_string()));
            self.instruction(instruction)?;
        }

        if let Some(label) = code.label_at(code.len()) {
            self.lines.push(Line::Label(label));
        }

        Ok(())
    }

    fn instruction(&mut self, instruction: &Instruction) -> Result<(), InternalError> {
        use Opcode::*;

        let operand = |index: usize| {
            instruction
                .operand(index)
                .ok_or_else(|| InternalError::BadOperand(instruction.to_string()))
        };

        match instruction.opcode() {
            Nop => self.put(Mnemonic::Nop, []),

            LoadInt | Move => {
                let destination = self.value(operand(0)?)?;
                self.stage(operand(1)?, Reg::R10)?;
                self.put(Mnemonic::Movq, [Reg::R10.into(), destination]);
            }

            Add | Sub | Mul => {
                let mnemonic = match instruction.opcode() {
                    Add => Mnemonic::Addq,
                    Sub => Mnemonic::Subq,
                    _ => Mnemonic::Imulq,
                };

                let destination = self.value(operand(0)?)?;
                self.stage(operand(1)?, Reg::R10)?;
                self.stage(operand(2)?, Reg::R11)?;
                self.put(mnemonic, [Reg::R11.into(), Reg::R10.into()]);
                self.put(Mnemonic::Movq, [Reg::R10.into(), destination]);
            }

            Div | Mod => {
                let result = if instruction.opcode() == Div {
                    Reg::Rax
                } else {
                    Reg::Rdx
                };

                let destination = self.value(operand(0)?)?;
                self.stage(operand(1)?, Reg::Rax)?;
                self.put(Mnemonic::Cqto, []);
                self.stage(operand(2)?, Reg::R11)?;
                self.put(Mnemonic::Idivq, [Reg::R11.into()]);
                self.put(Mnemonic::Movq, [result.into(), destination]);
            }

            Compare => {
                self.stage(operand(0)?, Reg::R10)?;
                self.stage(operand(1)?, Reg::R11)?;
                self.put(Mnemonic::Cmpq, [Reg::R11.into(), Reg::R10.into()]);
            }

            Jump | JumpEqual | JumpNotEqual | JumpLess | JumpLessOrEqual | JumpGreater
            | JumpGreaterOrEqual => {
                let mnemonic = match instruction.opcode() {
                    JumpEqual => Mnemonic::Je,
                    JumpNotEqual => Mnemonic::Jne,
                    JumpLess => Mnemonic::Jl,
                    JumpLessOrEqual => Mnemonic::Jle,
                    JumpGreater => Mnemonic::Jg,
                    JumpGreaterOrEqual => Mnemonic::Jge,
                    _ => Mnemonic::Jmp,
                };

                let target = instruction
                    .target()
                    .ok_or_else(|| InternalError::BadOperand(instruction.to_string()))?;

                self.put(mnemonic, [MachineOperand::Label(target)]);
            }

            Load | LoadByte => {
                // Un byte se extiende con ceros hasta la palabra completa
                let mnemonic = match instruction.opcode() {
                    LoadByte => Mnemonic::Movzbq,
                    _ => Mnemonic::Movq,
                };

                let destination = self.value(operand(0)?)?;
                let address = self.address(operand(1)?)?;

                self.put(Mnemonic::Movq, [self.allocations.location(address), Reg::R11.into()]);
                self.put(mnemonic, [indirect(Reg::R11), Reg::R11.into()]);
                self.put(Mnemonic::Movq, [Reg::R11.into(), destination]);
            }

            Store | StoreByte => {
                let (mnemonic, source) = match instruction.opcode() {
                    StoreByte => (Mnemonic::Movb, Reg::R11b),
                    _ => (Mnemonic::Movq, Reg::R11),
                };

                let address = self.address(operand(0)?)?;
                self.stage(operand(1)?, Reg::R11)?;

                self.put(Mnemonic::Movq, [self.allocations.location(address), Reg::R10.into()]);
                self.put(mnemonic, [source.into(), indirect(Reg::R10)]);
            }

            LocalAddr => {
                let destination = self.value(operand(0)?)?;
                let offset = match operand(1)? {
                    Operand::Int(offset) => offset,
                    other => return Err(InternalError::BadOperand(other.to_string())),
                };

                let local = MachineOperand::Memory {
                    base: Reg::Rsp,
                    offset,
                };

                self.put(Mnemonic::Leaq, [local, Reg::R10.into()]);
                self.put(Mnemonic::Movq, [Reg::R10.into(), destination]);
            }

            ReadInt => {
                // `scanf` escribe en memoria, aun si el destino es un registro
                let vreg = self.register(operand(0)?)?;
                let slot = self.allocations.slot(vreg);

                self.put(Mnemonic::Leaq, [MachineOperand::RipRelative(READ_FORMAT), Reg::Rdi.into()]);
                self.put(Mnemonic::Leaq, [slot, Reg::Rsi.into()]);
                self.call("scanf");

                if let Some(reg) = self.allocations.register(vreg) {
                    self.put(Mnemonic::Movq, [slot, reg.into()]);
                }
            }

            WriteInt => {
                self.put(Mnemonic::Leaq, [MachineOperand::RipRelative(WRITE_FORMAT), Reg::Rdi.into()]);
                self.stage(operand(0)?, Reg::Rsi)?;
                self.call("printf");
            }
        }

        Ok(())
    }

    /// Copia un operando fuente a un registro de máquina.
    fn stage(&mut self, operand: Operand, reg: Reg) -> Result<(), InternalError> {
        let source = self.value(operand)?;
        if source != MachineOperand::Register(reg) {
            self.put(Mnemonic::Movq, [source, reg.into()]);
        }

        Ok(())
    }

    /// Ubicación de un operando de valor.
    fn value(&self, operand: Operand) -> Result<MachineOperand, InternalError> {
        match operand {
            Operand::Register(vreg) => Ok(self.allocations.location(vreg)),
            Operand::Int(value) => Ok(MachineOperand::Immediate(value)),
            other => Err(InternalError::BadOperand(other.to_string())),
        }
    }

    fn register(&self, operand: Operand) -> Result<VReg, InternalError> {
        match operand {
            Operand::Register(vreg) => Ok(vreg),
            other => Err(InternalError::BadOperand(other.to_string())),
        }
    }

    fn address(&self, operand: Operand) -> Result<VReg, InternalError> {
        match operand {
            Operand::Memory(vreg) => Ok(vreg),
            other => Err(InternalError::BadOperand(other.to_string())),
        }
    }

    fn call(&mut self, function: &'static str) {
        // Llamada variádica: %al indica cuántos registros vectoriales se usan
        self.put(Mnemonic::Movl, [MachineOperand::Immediate(0), Reg::Eax.into()]);
        self.put(Mnemonic::Call, [MachineOperand::Symbol(function)]);
    }

    fn put<const N: usize>(&mut self, mnemonic: Mnemonic, operands: [MachineOperand; N]) {
        let instruction = MachineInstruction::new(mnemonic, operands);
        self.lines.push(Line::Instruction(instruction));
    }
}

fn indirect(base: Reg) -> MachineOperand {
    MachineOperand::Memory { base, offset: 0 }
}
