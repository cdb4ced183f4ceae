//! Instrucciones de máquina x86-64 en sintaxis AT&T.

use std::fmt::{self, Display};

use crate::ir::Label;

// Esta es una arquitectura de 64 bits
pub const VALUE_SIZE: u64 = 8;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Reg {
    Rax,
    Rdx,
    Rsi,
    Rdi,
    Rsp,
    Rbx,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,

    /// Mitad baja de `%rax`, usada por la convención de llamadas variádicas.
    Eax,

    /// Byte bajo de `%r11`, para escrituras de un byte.
    R11b,
}

impl Reg {
    /// Registros preservados por el llamado que reciben variables escalares.
    pub const CALLEE_SAVED: [Reg; 5] = [Reg::Rbx, Reg::R12, Reg::R13, Reg::R14, Reg::R15];
}

impl Display for Reg {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Reg::*;

        let name = match self {
            Rax => "rax",
            Rdx => "rdx",
            Rsi => "rsi",
            Rdi => "rdi",
            Rsp => "rsp",
            Rbx => "rbx",
            R10 => "r10",
            R11 => "r11",
            R12 => "r12",
            R13 => "r13",
            R14 => "r14",
            R15 => "r15",
            Eax => "eax",
            R11b => "r11b",
        };

        formatter.write_str(name)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MachineOperand {
    Register(Reg),
    Memory { base: Reg, offset: i64 },
    Immediate(i64),
    Label(Label),
    Symbol(&'static str),
    RipRelative(&'static str),
}

impl MachineOperand {
    pub fn is_memory(&self) -> bool {
        matches!(self, MachineOperand::Memory { .. })
    }
}

impl From<Reg> for MachineOperand {
    fn from(reg: Reg) -> Self {
        MachineOperand::Register(reg)
    }
}

impl Display for MachineOperand {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineOperand::Register(reg) => write!(formatter, "%{}", reg),
            MachineOperand::Memory { base, offset } => write!(formatter, "{}(%{})", offset, base),
            MachineOperand::Immediate(value) => write!(formatter, "${}", value),
            MachineOperand::Label(label) => write!(formatter, "{}", label),
            MachineOperand::Symbol(symbol) => formatter.write_str(symbol),
            MachineOperand::RipRelative(symbol) => write!(formatter, "{}(%rip)", symbol),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mnemonic {
    Movq,
    Movl,
    Movb,
    Movzbq,
    Leaq,
    Addq,
    Subq,
    Imulq,
    Cqto,
    Idivq,
    Cmpq,
    Jmp,
    Je,
    Jne,
    Jl,
    Jle,
    Jg,
    Jge,
    Call,
    Pushq,
    Popq,
    Ret,
    Nop,
}

impl Display for Mnemonic {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Mnemonic::*;

        let name = match self {
            Movq  => "movq",
            Movl  => "movl",
            Movb  => "movb",
            Movzbq => "movzbq",
            Leaq  => "leaq",
            Addq  => "addq",
            Subq  => "subq",
            Imulq => "imulq",
            Cqto  => "cqto",
            Idivq => "idivq",
            Cmpq  => "cmpq",
            Jmp   => "jmp",
            Je    => "je",
            Jne   => "jne",
            Jl    => "jl",
            Jle   => "jle",
            Jg    => "jg",
            Jge   => "jge",
            Call  => "call",
            Pushq => "pushq",
            Popq  => "popq",
            Ret   => "ret",
            Nop   => "nop",
        };

        // Respeta ancho y alineamiento de `{:8}`
        formatter.pad(name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MachineInstruction {
    pub mnemonic: Mnemonic,
    pub operands: Vec<MachineOperand>,
}

impl MachineInstruction {
    pub fn new<O: Into<Vec<MachineOperand>>>(mnemonic: Mnemonic, operands: O) -> Self {
        MachineInstruction {
            mnemonic,
            operands: operands.into(),
        }
    }
}

/// Lista de operandos separados por comas.
pub struct Operands<'a>(pub &'a [MachineOperand]);

impl Display for Operands<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, operand) in self.0.iter().enumerate() {
            if i > 0 {
                formatter.write_str(", ")?;
            }

            write!(formatter, "{}", operand)?;
        }

        Ok(())
    }
}

impl Display for MachineInstruction {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operands.is_empty() {
            emit!(formatter, self.mnemonic)
        } else {
            emit!(formatter, self.mnemonic, "{}", Operands(&self.operands))
        }
    }
}
