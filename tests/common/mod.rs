//! Intérprete de referencia para la IR, usado para comparar la
//! semántica de programas antes y después de cada transformación.

use std::collections::{HashMap, VecDeque};

use pascalc::{
    context::{Options, Pipeline},
    ir::{InstructionSequence, Opcode, Operand},
    lower::Lowered,
    source::Source,
};

const STEP_LIMIT: usize = 100_000;

const WORD: usize = 8;

pub fn lower(text: &str, options: Options) -> Lowered {
    let source = Source::from_text(text, "test.pas");
    match Pipeline::new(options).lower(&source) {
        Ok(lowered) => lowered,
        Err(failure) => panic!("compilation failed:\n{}", failure),
    }
}

pub fn compile(text: &str, options: Options) -> String {
    let source = Source::from_text(text, "test.pas");
    let mut output = Vec::new();

    if let Err(failure) = Pipeline::new(options).run(&source, &mut output) {
        panic!("compilation failed:\n{}", failure);
    }

    String::from_utf8(output).expect("non-UTF-8 output")
}

/// Ejecuta una secuencia y retorna todo lo escrito con `writei`.
pub fn execute(code: &InstructionSequence, input: &[i64]) -> Vec<i64> {
    let mut machine = Machine {
        registers: HashMap::new(),
        memory: HashMap::new(),
        compared: (0, 0),
        input: input.iter().copied().collect(),
        output: Vec::new(),
    };

    let mut pc = 0;
    let mut steps = 0;

    while let Some(instruction) = code.instructions().get(pc) {
        steps += 1;
        assert!(steps < STEP_LIMIT, "program does not terminate");

        pc += 1;

        let value = |machine: &Machine, index| machine.value(instruction.operand(index));
        let (lhs, rhs) = machine.compared;

        let taken = match instruction.opcode() {
            Opcode::Jump => true,
            Opcode::JumpEqual => lhs == rhs,
            Opcode::JumpNotEqual => lhs != rhs,
            Opcode::JumpLess => lhs < rhs,
            Opcode::JumpLessOrEqual => lhs <= rhs,
            Opcode::JumpGreater => lhs > rhs,
            Opcode::JumpGreaterOrEqual => lhs >= rhs,

            opcode => {
                let result = match opcode {
                    Opcode::LoadInt | Opcode::Move => Some(value(&machine, 1)),
                    Opcode::Add => Some(value(&machine, 1).wrapping_add(value(&machine, 2))),
                    Opcode::Sub => Some(value(&machine, 1).wrapping_sub(value(&machine, 2))),
                    Opcode::Mul => Some(value(&machine, 1).wrapping_mul(value(&machine, 2))),
                    Opcode::Div => Some(value(&machine, 1).wrapping_div(value(&machine, 2))),
                    Opcode::Mod => Some(value(&machine, 1).wrapping_rem(value(&machine, 2))),
                    Opcode::LocalAddr => Some(value(&machine, 1)),
                    Opcode::Load => Some(machine.load(instruction.operand(1), WORD)),
                    Opcode::LoadByte => Some(machine.load(instruction.operand(1), 1)),
                    Opcode::ReadInt => Some(machine.input.pop_front().expect("input exhausted")),

                    Opcode::Compare => {
                        machine.compared = (value(&machine, 0), value(&machine, 1));
                        None
                    }

                    Opcode::Store | Opcode::StoreByte => {
                        let width = if opcode == Opcode::StoreByte { 1 } else { WORD };
                        let stored = value(&machine, 1);
                        machine.store(instruction.operand(0), stored, width);
                        None
                    }

                    Opcode::WriteInt => {
                        let written = value(&machine, 0);
                        machine.output.push(written);
                        None
                    }

                    _ => None,
                };

                if let (Some(result), Some(destination)) = (result, instruction.destination()) {
                    machine.registers.insert(destination.number, result);
                }

                false
            }
        };

        if taken {
            let target = instruction.target().expect("jump without target");
            pc = code.position_of(target).expect("undefined label");
        }
    }

    machine.output
}

struct Machine {
    registers: HashMap<u32, i64>,
    /// Memoria direccionable por byte, en orden little-endian.
    memory: HashMap<i64, u8>,
    compared: (i64, i64),
    input: VecDeque<i64>,
    output: Vec<i64>,
}

impl Machine {
    fn value(&self, operand: Option<Operand>) -> i64 {
        match operand {
            Some(Operand::Register(vreg)) => self.registers.get(&vreg.number).copied().unwrap_or(0),
            Some(Operand::Int(value)) => value,
            other => panic!("bad value operand: {:?}", other),
        }
    }

    fn address(&self, operand: Option<Operand>) -> i64 {
        match operand {
            Some(Operand::Memory(vreg)) => self.registers.get(&vreg.number).copied().unwrap_or(0),
            other => panic!("bad memory operand: {:?}", other),
        }
    }

    /// Lee `width` bytes y los extiende con ceros a 64 bits.
    fn load(&self, operand: Option<Operand>, width: usize) -> i64 {
        let address = self.address(operand);

        let mut bytes = [0; WORD];
        for (offset, byte) in bytes.iter_mut().take(width).enumerate() {
            *byte = self.memory.get(&(address + offset as i64)).copied().unwrap_or(0);
        }

        i64::from_le_bytes(bytes)
    }

    /// Escribe los `width` bytes menos significativos de `value`.
    fn store(&mut self, operand: Option<Operand>, value: i64, width: usize) {
        let address = self.address(operand);
        for (offset, byte) in value.to_le_bytes().into_iter().take(width).enumerate() {
            self.memory.insert(address + offset as i64, byte);
        }
    }
}
