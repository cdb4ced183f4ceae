//! Ubicaciones de máquina para registros virtuales.
//!
//! Los primeros cinco registros virtuales marcados como físicos, en
//! orden numérico, residen en los registros preservados `%rbx` y
//! `%r12`-`%r15`. Todo registro virtual tiene además una ranura de 8
//! bytes en el stack frame, que es su única ubicación si no recibió un
//! registro físico.
//!
//! ```text
//! %rsp + 0                    almacenamiento declarado
//! %rsp + align8(storage)      ranura de vr0
//! %rsp + align8(storage) + 8  ranura de vr1
//! ...
//! ```

use std::collections::BTreeSet;

use log::debug;

use super::x86_64::{MachineOperand, Reg, VALUE_SIZE};
use crate::ir::{InstructionSequence, VReg};

pub struct Allocations {
    physical: Vec<(u32, Reg)>,
    slot_base: u64,
    frame_size: u64,
}

impl Allocations {
    pub fn new(code: &InstructionSequence, storage_size: u64, vreg_count: u32) -> Self {
        let requested: BTreeSet<u32> = code
            .iter()
            .flat_map(|instruction| instruction.operands().iter())
            .filter_map(|operand| operand.vreg())
            .filter(VReg::is_physical)
            .map(|vreg| vreg.number)
            .collect();

        let physical: Vec<_> = requested.into_iter().zip(Reg::CALLEE_SAVED).collect();
        for (number, reg) in &physical {
            debug!("vr{} lives in %{}", number, reg);
        }

        let slot_base = align(storage_size, VALUE_SIZE);
        let frame_size = align(slot_base + VALUE_SIZE * vreg_count as u64, 16);
        debug!("frame size is {} bytes, vreg slots start at {}", frame_size, slot_base);

        Allocations {
            physical,
            slot_base,
            frame_size,
        }
    }

    /// Bytes a reservar en el stack, múltiplo de 16.
    pub fn frame_size(&self) -> u64 {
        self.frame_size
    }

    /// Ubicación donde reside el valor de un registro virtual.
    pub fn location(&self, vreg: VReg) -> MachineOperand {
        match self.register(vreg) {
            Some(reg) => MachineOperand::Register(reg),
            None => self.slot(vreg),
        }
    }

    pub fn register(&self, vreg: VReg) -> Option<Reg> {
        if !vreg.is_physical() {
            return None;
        }

        self.physical
            .iter()
            .find(|(number, _)| *number == vreg.number)
            .map(|&(_, reg)| reg)
    }

    /// Ranura en el stack, independiente de si hay registro físico.
    pub fn slot(&self, vreg: VReg) -> MachineOperand {
        MachineOperand::Memory {
            base: Reg::Rsp,
            offset: (self.slot_base + VALUE_SIZE * vreg.number as u64) as i64,
        }
    }
}

fn align(size: u64, to: u64) -> u64 {
    (size + to - 1) / to * to
}
