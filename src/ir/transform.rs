//! Transformaciones locales a bloques básicos.
//!
//! Cada transformación recibe el código de un bloque y produce un
//! reemplazo equivalente. No hay flujo de datos entre bloques.

use std::collections::HashMap;

use log::trace;

use super::{cfg::ControlFlowGraph, Instruction, Opcode, Operand, RegFlags};

pub trait BlockTransform {
    fn transform_block(&mut self, code: &[Instruction]) -> Vec<Instruction>;
}

impl ControlFlowGraph {
    /// Aplica una transformación a cada bloque, en orden.
    pub fn transform<T: BlockTransform>(&self, pass: &mut T) -> ControlFlowGraph {
        self.with_blocks(|block| pass.transform_block(block.instructions()))
    }
}

/// Propagación de constantes dentro de un bloque.
///
/// Tras `ldci vrN, $K`, los usos posteriores de `vrN` como valor se
/// reemplazan por `$K`. Los `ldci` se conservan. Nunca se reemplazan
/// operandos de memoria ni destinos.
///
/// Un `mov` que consume `vrN` olvida su constante. Tras la primera
/// pasada ese `mov` ya lleva `$K`, así que una segunda pasada no ve el
/// consumo y reemplaza las lecturas de `vrN` que le siguen. La pasada
/// es idempotente solo si ningún registro
/// constante se lee de nuevo tras ser consumido por un `mov`. El
/// código que produce [`crate::lower`] cumple esto, pues cada
/// temporal pertenece a una única sentencia y esta termina en su `mov`.
#[derive(Default)]
pub struct ConstantPropagation;

impl BlockTransform for ConstantPropagation {
    fn transform_block(&mut self, code: &[Instruction]) -> Vec<Instruction> {
        let mut known: HashMap<u32, i64> = HashMap::new();
        let mut output = Vec::with_capacity(code.len());

        for original in code {
            let mut instruction = original.clone();
            let sources = if instruction.opcode().defines() { 1 } else { 0 };

            let mut spent = Vec::new();
            for slot in sources..instruction.operands().len() {
                if let Some(Operand::Register(vreg)) = instruction.operand(slot) {
                    if let Some(&value) = known.get(&vreg.number) {
                        trace!("propagating ${} into {} of `{}`", value, vreg, original);

                        instruction.replace_operand(slot, Operand::Int(value));
                        spent.push(vreg.number);
                    }
                }
            }

            // Un `mov` consume la constante
            if instruction.opcode() == Opcode::Move {
                for number in spent {
                    known.remove(&number);
                }
            }

            if let Some(destination) = instruction.destination() {
                known.remove(&destination.number);

                if let (Opcode::LoadInt, Some(Operand::Int(value))) =
                    (instruction.opcode(), instruction.operand(1))
                {
                    known.insert(destination.number, value);
                }
            }

            output.push(instruction);
        }

        output
    }
}

/// Marca todo registro escalar como candidato a registro físico.
#[derive(Default)]
pub struct NaiveRegisterAllocation;

impl BlockTransform for NaiveRegisterAllocation {
    fn transform_block(&mut self, code: &[Instruction]) -> Vec<Instruction> {
        code.iter()
            .map(|original| {
                let mut instruction = original.clone();
                for (slot, operand) in original.operands().iter().enumerate() {
                    let marked = match *operand {
                        Operand::Register(mut vreg) if vreg.is_scalar() => {
                            vreg.flags.insert(RegFlags::PHYSICAL);
                            Operand::Register(vreg)
                        }

                        _ => continue,
                    };

                    instruction.replace_operand(slot, marked);
                }

                instruction
            })
            .collect()
    }
}
