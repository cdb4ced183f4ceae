//! Representación intermedia de alto nivel.
//!
//! Instrucciones de tres direcciones sobre un suministro ilimitado de
//! registros virtuales. La forma textual de cada instrucción es
//! `mnemónico op, op, ...`, con operandos `vrN`, `(vrN)`, `$N` o `.LN`.

use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};

use bitflags::bitflags;

pub mod cfg;
pub mod transform;

/// Etiqueta sintética de control de flujo.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl Display for Label {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, ".L{}", self.0)
    }
}

bitflags! {
    /// Propiedades de un registro virtual asignadas por fases posteriores.
    pub struct RegFlags: u8 {
        /// Ligado de forma permanente a una variable escalar.
        const SCALAR   = 0x01;

        /// Solicita un registro físico de máquina.
        const PHYSICAL = 0x02;
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct VReg {
    pub number: u32,
    pub flags: RegFlags,
}

impl VReg {
    pub fn new(number: u32) -> Self {
        VReg {
            number,
            flags: RegFlags::empty(),
        }
    }

    pub fn scalar(number: u32) -> Self {
        VReg {
            number,
            flags: RegFlags::SCALAR,
        }
    }

    pub fn is_scalar(&self) -> bool {
        self.flags.contains(RegFlags::SCALAR)
    }

    pub fn is_physical(&self) -> bool {
        self.flags.contains(RegFlags::PHYSICAL)
    }
}

impl Display for VReg {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "vr{}", self.number)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    /// Valor contenido en un registro virtual.
    Register(VReg),

    /// Memoria apuntada por un registro virtual.
    Memory(VReg),

    Int(i64),

    Label(Label),
}

impl Operand {
    /// Registro virtual involucrado, sea como valor o como dirección.
    pub fn vreg(&self) -> Option<VReg> {
        match self {
            Operand::Register(vreg) | Operand::Memory(vreg) => Some(*vreg),
            _ => None,
        }
    }
}

impl Display for Operand {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Register(vreg) => write!(fmt, "{}", vreg),
            Operand::Memory(vreg) => write!(fmt, "({})", vreg),
            Operand::Int(value) => write!(fmt, "${}", value),
            Operand::Label(label) => write!(fmt, "{}", label),
        }
    }
}

/// Conjunto cerrado de operaciones de la IR.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Opcode {
    Nop,
    LoadInt,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Compare,
    Jump,
    JumpEqual,
    JumpNotEqual,
    JumpLess,
    JumpLessOrEqual,
    JumpGreater,
    JumpGreaterOrEqual,
    Load,
    Store,

    /// Como `Load`, pero lee un único byte sin signo.
    LoadByte,

    /// Como `Store`, pero escribe solo el byte menos significativo.
    StoreByte,

    LocalAddr,
    ReadInt,
    WriteInt,
    Move,
}

impl Opcode {
    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;

        match self {
            Nop                => "nop",
            LoadInt            => "ldci",
            Add                => "addi",
            Sub                => "subi",
            Mul                => "muli",
            Div                => "divi",
            Mod                => "modi",
            Compare            => "cmpi",
            Jump               => "jmp",
            JumpEqual          => "je",
            JumpNotEqual       => "jne",
            JumpLess           => "jlt",
            JumpLessOrEqual    => "jlte",
            JumpGreater        => "jgt",
            JumpGreaterOrEqual => "jgte",
            Load               => "ldi",
            Store              => "sti",
            LoadByte           => "ldb",
            StoreByte          => "stb",
            LocalAddr          => "localaddr",
            ReadInt            => "readi",
            WriteInt           => "writei",
            Move               => "mov",
        }
    }

    pub fn is_jump(self) -> bool {
        self == Opcode::Jump || self.is_conditional_jump()
    }

    pub fn is_conditional_jump(self) -> bool {
        use Opcode::*;

        matches!(
            self,
            JumpEqual | JumpNotEqual | JumpLess | JumpLessOrEqual | JumpGreater | JumpGreaterOrEqual
        )
    }

    /// Indica si el primer operando es el destino de la instrucción.
    pub fn defines(self) -> bool {
        use Opcode::*;

        matches!(
            self,
            LoadInt
                | Add
                | Sub
                | Mul
                | Div
                | Mod
                | Load
                | LoadByte
                | LocalAddr
                | ReadInt
                | Move
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    opcode: Opcode,
    operands: Vec<Operand>,
    comment: Option<String>,
}

impl Instruction {
    pub fn new<O: Into<Vec<Operand>>>(opcode: Opcode, operands: O) -> Self {
        Instruction {
            opcode,
            operands: operands.into(),
            comment: None,
        }
    }

    pub fn nop() -> Self {
        Instruction::new(Opcode::Nop, Vec::new())
    }

    pub fn with_comment<S: Into<String>>(self, comment: S) -> Self {
        Instruction {
            comment: Some(comment.into()),
            ..self
        }
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    pub fn operand(&self, index: usize) -> Option<Operand> {
        self.operands.get(index).copied()
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Registro escrito por la instrucción, si lo hay.
    pub fn destination(&self) -> Option<VReg> {
        match self.operands.first() {
            Some(Operand::Register(vreg)) if self.opcode.defines() => Some(*vreg),
            _ => None,
        }
    }

    /// Objetivo de un salto.
    pub fn target(&self) -> Option<Label> {
        match self.operands.first() {
            Some(Operand::Label(label)) if self.opcode.is_jump() => Some(*label),
            _ => None,
        }
    }

    /// Única forma de mutación permitida tras la construcción.
    pub fn replace_operand(&mut self, index: usize, operand: Operand) {
        if let Some(slot) = self.operands.get_mut(index) {
            *slot = operand;
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.opcode.mnemonic())?;
        for (i, operand) in self.operands.iter().enumerate() {
            let separator = if i == 0 { " " } else { ", " };
            write!(fmt, "{}{}", separator, operand)?;
        }

        if let Some(comment) = &self.comment {
            write!(fmt, "\t/* {} */", comment)?;
        }

        Ok(())
    }
}

/// Secuencia lineal de instrucciones con etiquetas en posiciones.
///
/// Una posición tiene a lo sumo una etiqueta. La posición
/// inmediatamente posterior a la última instrucción también puede
/// tener una.
#[derive(Clone, Debug, Default)]
pub struct InstructionSequence {
    instructions: Vec<Instruction>,
    labels: BTreeMap<usize, Label>,
}

impl InstructionSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Coloca una etiqueta en la siguiente posición a emitir.
    ///
    /// Si ya hay una etiqueta ahí, se emite primero un `nop` para que
    /// ambas etiquetas queden en posiciones distintas.
    pub fn define_label(&mut self, label: Label) {
        if self.labels.contains_key(&self.instructions.len()) {
            self.push(Instruction::nop());
        }

        self.labels.insert(self.instructions.len(), label);
    }

    pub fn label_at(&self, position: usize) -> Option<Label> {
        self.labels.get(&position).copied()
    }

    pub fn position_of(&self, label: Label) -> Option<usize> {
        self.labels
            .iter()
            .find(|(_, other)| **other == label)
            .map(|(&position, _)| position)
    }

    pub fn has_label_at_end(&self) -> bool {
        self.labels.contains_key(&self.instructions.len())
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter()
    }
}

impl Display for InstructionSequence {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, instruction) in self.instructions.iter().enumerate() {
            if let Some(label) = self.label_at(position) {
                writeln!(fmt, "{}:", label)?;
            }

            writeln!(fmt, "\t{}", instruction)?;
        }

        if let Some(label) = self.label_at(self.instructions.len()) {
            writeln!(fmt, "{}:", label)?;
        }

        Ok(())
    }
}
