//! Grafo de control de flujo.
//!
//! Un bloque básico comienza en cada posición etiquetada y justo
//! después de cada salto, condicional o no. El orden de los bloques es
//! el mismo de la secuencia original, por lo que aplanar el grafo
//! reproduce la secuencia con sus etiquetas.

use std::collections::HashMap;

use log::debug;

use super::{Instruction, InstructionSequence, Label};
use crate::error::InternalError;

#[derive(Clone, Debug, Default)]
pub struct BasicBlock {
    label: Option<Label>,
    code: Vec<Instruction>,
}

impl BasicBlock {
    pub fn label(&self) -> Option<Label> {
        self.label
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.code
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    fn is_unused(&self) -> bool {
        self.code.is_empty() && self.label.is_none()
    }
}

#[derive(Clone, Debug)]
pub struct ControlFlowGraph {
    blocks: Vec<BasicBlock>,
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
}

impl ControlFlowGraph {
    /// Particiona una secuencia lineal en bloques básicos y los enlaza.
    pub fn build(code: &InstructionSequence) -> Result<Self, InternalError> {
        let mut blocks = Vec::new();
        let mut current = BasicBlock::default();

        for (position, instruction) in code.iter().enumerate() {
            if let Some(label) = code.label_at(position) {
                if !current.is_empty() {
                    blocks.push(std::mem::take(&mut current));
                }

                current.label = Some(label);
            }

            current.code.push(instruction.clone());
            if instruction.opcode().is_jump() {
                blocks.push(std::mem::take(&mut current));
            }
        }

        // Etiqueta al final de la secuencia: bloque vacío como destino
        if let Some(label) = code.label_at(code.len()) {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }

            current.label = Some(label);
        }

        if !current.is_unused() {
            blocks.push(current);
        }

        Self::link(blocks)
    }

    fn link(blocks: Vec<BasicBlock>) -> Result<Self, InternalError> {
        let by_label: HashMap<Label, usize> = blocks
            .iter()
            .enumerate()
            .filter_map(|(index, block)| block.label.map(|label| (label, index)))
            .collect();

        let mut successors = vec![Vec::new(); blocks.len()];
        let mut predecessors = vec![Vec::new(); blocks.len()];

        for (index, block) in blocks.iter().enumerate() {
            let next = Some(index + 1).filter(|&next| next < blocks.len());

            let mut edges = Vec::with_capacity(2);
            match block.code.last() {
                Some(last) if last.opcode().is_jump() => {
                    let target = last
                        .target()
                        .ok_or_else(|| InternalError::BadOperand(last.to_string()))?;

                    let target = *by_label
                        .get(&target)
                        .ok_or(InternalError::UndefinedLabel(target))?;

                    edges.push(target);
                    if last.opcode().is_conditional_jump() {
                        edges.extend(next.filter(|&next| next != target));
                    }
                }

                _ => edges.extend(next),
            }

            for &successor in &edges {
                predecessors[successor].push(index);
            }

            successors[index] = edges;
        }

        debug!(
            "control flow graph: {} blocks, {} edges",
            blocks.len(),
            successors.iter().map(Vec::len).sum::<usize>()
        );

        Ok(ControlFlowGraph {
            blocks,
            successors,
            predecessors,
        })
    }

    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    pub fn successors(&self, block: usize) -> &[usize] {
        self.successors.get(block).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn predecessors(&self, block: usize) -> &[usize] {
        self.predecessors.get(block).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sustituye el código de cada bloque, conservando etiquetas y aristas.
    pub(super) fn with_blocks<F>(&self, mut rewrite: F) -> Self
    where
        F: FnMut(&BasicBlock) -> Vec<Instruction>,
    {
        let blocks = self
            .blocks
            .iter()
            .map(|block| BasicBlock {
                label: block.label,
                code: rewrite(block),
            })
            .collect();

        ControlFlowGraph {
            blocks,
            successors: self.successors.clone(),
            predecessors: self.predecessors.clone(),
        }
    }

    /// Reconstruye la secuencia lineal en el orden original de los bloques.
    pub fn flatten(&self) -> InstructionSequence {
        let mut code = InstructionSequence::new();
        for block in &self.blocks {
            if let Some(label) = block.label {
                code.define_label(label);
            }

            for instruction in &block.code {
                code.push(instruction.clone());
            }
        }

        code
    }
}
