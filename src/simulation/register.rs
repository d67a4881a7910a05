// src/simulation/register.rs

use super::GroupEngine;
use crate::core::{Backend, JointState, MeshError, MeshResult, QubitRef, RegisterHandle, RegisterId};
use crate::operations::{Gate, TwoQubitGate};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// A register group: one engine plus the slot index of each of its qubits,
/// in engine position order.
#[derive(Debug, Clone)]
struct Group {
    engine: GroupEngine,
    slots: Vec<usize>,
}

impl Group {
    fn position_of(&self, slot: usize) -> Option<usize> {
        self.slots.iter().position(|&s| s == slot)
    }
}

/// Per-node store of qubits.
///
/// Qubits live in slots that are handed out once and never reused. Each live
/// slot belongs to exactly one register group; qubits in different groups are
/// unentangled, and a two-qubit gate across groups requires merging them.
/// A handle whose group was folded into another keeps naming the merged group.
#[derive(Debug)]
pub struct VirtualRegister {
    id: RegisterId,
    backend: Backend,
    /// `slots[i]` is the group holding slot `i`, or `None` once consumed.
    slots: Vec<Option<RegisterHandle>>,
    groups: BTreeMap<RegisterHandle, Group>,
    /// Folded handle → the handle it was merged into.
    merged_into: BTreeMap<RegisterHandle, RegisterHandle>,
    next_handle: u64,
    qubit_limit: usize,
    rng: StdRng,
}

impl VirtualRegister {
    /// An empty register for `backend`; measurement randomness is seeded from the OS.
    pub fn new(backend: Backend) -> Self {
        Self::with_rng(backend, StdRng::from_rng(&mut rand::rng()))
    }

    /// An empty register whose measurement outcomes are reproducible.
    pub fn seeded(backend: Backend, seed: u64) -> Self {
        Self::with_rng(backend, StdRng::seed_from_u64(seed))
    }

    fn with_rng(backend: Backend, rng: StdRng) -> Self {
        Self {
            id: RegisterId::fresh(),
            backend,
            slots: Vec::new(),
            groups: BTreeMap::new(),
            merged_into: BTreeMap::new(),
            next_handle: 0,
            qubit_limit: backend.default_qubit_limit(),
            rng,
        }
    }

    /// Caps the number of qubits one register group may hold.
    pub fn with_qubit_limit(mut self, limit: usize) -> Self {
        self.qubit_limit = limit;
        self
    }

    pub fn qubit_limit(&self) -> usize {
        self.qubit_limit
    }

    pub fn id(&self) -> RegisterId {
        self.id
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Number of live qubits.
    pub fn size(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Number of slots ever allocated, live or consumed.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Handles of the current register groups.
    pub fn groups(&self) -> Vec<RegisterHandle> {
        self.groups.keys().copied().collect()
    }

    /// Creates an empty register group.
    pub fn new_group(&mut self) -> RegisterHandle {
        let handle = RegisterHandle(self.next_handle);
        self.next_handle += 1;
        self.groups.insert(handle, Group { engine: GroupEngine::new(self.backend), slots: Vec::new() });
        debug!(register = %self.id, group = %handle, "Created register group");
        handle
    }

    /// The live group `handle` names, following any merges it was folded into.
    pub fn resolve(&self, handle: RegisterHandle) -> MeshResult<RegisterHandle> {
        let mut current = handle;
        while let Some(next) = self.merged_into.get(&current) {
            current = *next;
        }
        if !self.groups.contains_key(&current) {
            return Err(MeshError::invalid_operation(format!("Register group {} does not exist", handle)));
        }
        Ok(current)
    }

    fn check_limit(&self, qubits: usize) -> MeshResult<()> {
        if qubits > self.qubit_limit {
            return Err(MeshError::simulation(format!(
                "A register group of {} qubits exceeds the {} limit of {}",
                qubits, self.backend, self.qubit_limit
            )));
        }
        Ok(())
    }

    /// Reference to the live qubit at `index`.
    pub fn reference(&self, index: usize) -> MeshResult<QubitRef> {
        match self.slots.get(index) {
            None => Err(MeshError::InvalidIndex { index, size: self.slots.len() }),
            Some(None) => Err(MeshError::StaleReference {
                qubit: QubitRef::new(self.id, index),
                message: "Qubit was consumed".to_string(),
            }),
            Some(Some(_)) => Ok(QubitRef::new(self.id, index)),
        }
    }

    /// Adds a fresh |0⟩ qubit to `group`.
    pub fn allocate(&mut self, group: RegisterHandle) -> MeshResult<QubitRef> {
        let group = self.resolve(group)?;
        let slot = self.slots.len();
        let held = self.groups.get(&group).map_or(0, |g| g.slots.len());
        self.check_limit(held + 1)?;
        let entry = self.group_mut(group)?;
        entry.engine.add_qubit()?;
        entry.slots.push(slot);
        self.slots.push(Some(group));
        debug!(register = %self.id, group = %group, slot, "Allocated qubit");
        Ok(QubitRef::new(self.id, slot))
    }

    /// Adds a fresh |0⟩ qubit in a group of its own.
    pub fn allocate_isolated(&mut self) -> MeshResult<QubitRef> {
        let group = self.new_group();
        self.allocate(group)
    }

    /// The group currently holding `qubit`.
    pub fn group_of(&self, qubit: &QubitRef) -> MeshResult<RegisterHandle> {
        if qubit.register != self.id {
            return Err(MeshError::StaleReference {
                qubit: *qubit,
                message: format!("Reference was issued by {}, not {}", qubit.register, self.id),
            });
        }
        match self.slots.get(qubit.index) {
            Some(Some(group)) => Ok(*group),
            Some(None) => Err(MeshError::StaleReference { qubit: *qubit, message: "Qubit was consumed".to_string() }),
            None => Err(MeshError::StaleReference { qubit: *qubit, message: "Slot was never allocated".to_string() }),
        }
    }

    /// Group and engine position of `qubit`.
    fn locate(&self, qubit: &QubitRef) -> MeshResult<(RegisterHandle, usize)> {
        let group = self.group_of(qubit)?;
        let position = self
            .groups
            .get(&group)
            .and_then(|g| g.position_of(qubit.index))
            .ok_or_else(|| MeshError::simulation(format!("Slot {} missing from {}", qubit.index, group)))?;
        Ok((group, position))
    }

    fn group_mut(&mut self, handle: RegisterHandle) -> MeshResult<&mut Group> {
        self.groups
            .get_mut(&handle)
            .ok_or_else(|| MeshError::simulation(format!("Register group {} vanished", handle)))
    }

    pub fn apply_gate(&mut self, qubit: &QubitRef, gate: Gate) -> MeshResult<()> {
        let (group, position) = self.locate(qubit)?;
        trace!(register = %self.id, qubit = %qubit, gate = %gate, "Applying gate");
        self.group_mut(group)?.engine.apply_gate(position, gate)
    }

    /// Applies a controlled gate. Qubits in different groups are merged first
    /// when `merge_implicitly` is set, otherwise the call fails.
    pub fn apply_two_qubit_gate(
        &mut self,
        control: &QubitRef,
        target: &QubitRef,
        gate: TwoQubitGate,
        merge_implicitly: bool,
    ) -> MeshResult<()> {
        if control == target {
            return Err(MeshError::invalid_operation("Control and target of a two-qubit gate cannot be the same qubit"));
        }
        let control_group = self.group_of(control)?;
        let target_group = self.group_of(target)?;
        if control_group != target_group {
            if !merge_implicitly {
                return Err(MeshError::CrossRegisterUnsupported {
                    control: *control,
                    control_register: control_group,
                    target: *target,
                    target_register: target_group,
                });
            }
            self.merge(control, target)?;
        }
        let (group, control_pos) = self.locate(control)?;
        let (_, target_pos) = self.locate(target)?;
        trace!(register = %self.id, control = %control, target = %target, gate = %gate, "Applying two-qubit gate");
        self.group_mut(group)?.engine.apply_controlled(control_pos, target_pos, gate)
    }

    /// Folds the group of `second` into the group of `first`. The merged group
    /// keeps `first`'s handle and lists `first`'s qubits before `second`'s.
    pub fn merge(&mut self, first: &QubitRef, second: &QubitRef) -> MeshResult<RegisterHandle> {
        let keep = self.group_of(first)?;
        let fold = self.group_of(second)?;
        if keep == fold {
            return Ok(keep);
        }
        let sizes = [keep, fold].map(|h| self.groups.get(&h).map_or(0, |g| g.slots.len()));
        self.check_limit(sizes[0] + sizes[1])?;
        let folded = self
            .groups
            .remove(&fold)
            .ok_or_else(|| MeshError::simulation(format!("Register group {} vanished", fold)))?;
        let kept = self.group_mut(keep)?;
        kept.engine.absorb(folded.engine)?;
        kept.slots.extend(folded.slots.iter().copied());
        let qubits = kept.engine.num_qubits();
        for slot in folded.slots {
            self.slots[slot] = Some(keep);
        }
        self.merged_into.insert(fold, keep);
        debug!(register = %self.id, kept = %keep, folded = %fold, qubits, "Merged register groups");
        Ok(keep)
    }

    /// Joint state over `qubits`, in that order. All of them must share a group;
    /// readouts spanning groups need an explicit merge first.
    pub fn read_joint_state(&self, qubits: &[QubitRef]) -> MeshResult<JointState> {
        let Some(first) = qubits.first() else {
            return Err(MeshError::invalid_operation("Readout needs at least one qubit"));
        };
        let group = self.group_of(first)?;
        let mut order = Vec::with_capacity(qubits.len());
        for qubit in qubits {
            let (g, position) = self.locate(qubit)?;
            if g != group {
                return Err(MeshError::invalid_operation(format!(
                    "Readout spans register groups: {} is in {} but {} is in {}",
                    first, group, qubit, g
                )));
            }
            order.push(position);
        }
        let entry = self
            .groups
            .get(&group)
            .ok_or_else(|| MeshError::simulation(format!("Register group {} vanished", group)))?;
        entry.engine.read(&order)
    }

    /// Measures `qubit` in the Z basis and consumes it.
    pub fn measure(&mut self, qubit: &QubitRef) -> MeshResult<u8> {
        let (group, position) = self.locate(qubit)?;
        let entry = self
            .groups
            .get_mut(&group)
            .ok_or_else(|| MeshError::simulation(format!("Register group {} vanished", group)))?;
        let outcome = entry.engine.measure(position, &mut self.rng)?;
        entry.slots.remove(position);
        self.slots[qubit.index] = None;
        debug!(register = %self.id, qubit = %qubit, outcome, "Measured qubit");
        Ok(outcome)
    }

    /// Consumes every qubit and drops every group; all references go stale.
    pub fn tear_down(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.groups.clear();
        self.merged_into.clear();
        debug!(register = %self.id, "Register torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorKind;

    #[test]
    fn slots_are_never_reused() -> MeshResult<()> {
        let mut register = VirtualRegister::seeded(Backend::AmplitudeVector, 11);
        let a = register.allocate_isolated()?;
        register.measure(&a)?;
        let b = register.allocate_isolated()?;
        assert_ne!(a, b);
        assert_eq!(register.reference(a.index).unwrap_err().kind(), ErrorKind::StaleReference);
        assert_eq!(register.size(), 1);
        assert_eq!(register.slot_count(), 2);
        Ok(())
    }

    #[test]
    fn references_from_another_register_are_stale() -> MeshResult<()> {
        let mut mine = VirtualRegister::new(Backend::DensityMatrix);
        let mut theirs = VirtualRegister::new(Backend::DensityMatrix);
        mine.allocate_isolated()?;
        let foreign = theirs.allocate_isolated()?;
        let err = mine.apply_gate(&foreign, Gate::H).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StaleReference);
        Ok(())
    }

    #[test]
    fn merge_keeps_first_group_and_order() -> MeshResult<()> {
        let mut register = VirtualRegister::new(Backend::AmplitudeVector);
        let a = register.allocate_isolated()?;
        let b = register.allocate_isolated()?;
        register.apply_gate(&b, Gate::X)?;
        let keep = register.merge(&a, &b)?;
        assert_eq!(register.groups(), vec![keep]);
        // a first, b second: |0>|1> = |01>
        let state = register.read_joint_state(&[a, b])?;
        assert_eq!(state.amplitudes()?[1].re, 1.0);
        Ok(())
    }

    #[test]
    fn folded_handles_keep_naming_the_merged_group() -> MeshResult<()> {
        let mut register = VirtualRegister::new(Backend::StabilizerTableau);
        let root = register.new_group();
        let side = register.new_group();
        let a = register.allocate(side)?;
        let b = register.allocate(root)?;
        // The control's group survives, so root is folded away
        register.apply_two_qubit_gate(&a, &b, TwoQubitGate::Cnot, true)?;
        assert_eq!(register.groups(), vec![side]);
        assert_eq!(register.resolve(root)?, side);

        let c = register.allocate(root)?;
        assert_eq!(register.group_of(&c)?, side);
        let late = register.new_group();
        let d = register.allocate(late)?;
        register.merge(&c, &d)?;
        assert_eq!(register.resolve(late)?, side);
        Ok(())
    }

    #[test]
    fn qubit_limit_caps_allocation_and_merging() -> MeshResult<()> {
        let mut register = VirtualRegister::new(Backend::AmplitudeVector).with_qubit_limit(2);
        let group = register.new_group();
        let a = register.allocate(group)?;
        register.allocate(group)?;
        assert_eq!(register.allocate(group).unwrap_err().kind(), ErrorKind::Simulation);
        assert_eq!(register.size(), 2);

        let lone = register.allocate_isolated()?;
        let err = register.apply_two_qubit_gate(&a, &lone, TwoQubitGate::Cnot, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Simulation);
        assert_eq!(register.groups().len(), 2);
        Ok(())
    }

    #[test]
    fn tear_down_stales_everything() -> MeshResult<()> {
        let mut register = VirtualRegister::new(Backend::StabilizerTableau);
        let a = register.allocate_isolated()?;
        register.tear_down();
        assert_eq!(register.size(), 0);
        assert_eq!(register.apply_gate(&a, Gate::X).unwrap_err().kind(), ErrorKind::StaleReference);
        Ok(())
    }
}
