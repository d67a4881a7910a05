// src/simulation/amplitude.rs
use crate::core::{MeshError, MeshResult, NEGLIGIBLE, SEPARABLE_TOLERANCE};
use crate::operations::{Gate, TwoQubitGate};
use num_complex::Complex;
use num_traits::Zero;
use rand::Rng;

/// Pure-state engine holding the 2^N amplitude vector of one register group.
///
/// Position 0 is the most significant tensor factor: basis index `i` has the
/// qubit at position `p` in bit `N - 1 - p`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AmplitudeEngine {
    state: Vec<Complex<f64>>,
    num_qubits: usize,
}

impl AmplitudeEngine {
    /// An empty group: zero qubits, the scalar state 1.
    pub(crate) fn new() -> Self {
        Self { state: vec![Complex::new(1.0, 0.0)], num_qubits: 0 }
    }

    pub(crate) fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    #[cfg(test)]
    pub(crate) fn vector(&self) -> &[Complex<f64>] {
        &self.state
    }

    /// Appends a fresh |0⟩ qubit as the least significant factor and returns its position.
    pub(crate) fn add_qubit(&mut self) -> MeshResult<usize> {
        let dim = checked_dim(self.num_qubits + 1)?;
        let mut new_vec = vec![Complex::zero(); dim];
        for (i, amp) in self.state.iter().enumerate() {
            new_vec[i << 1] = *amp;
        }
        self.state = new_vec;
        self.num_qubits += 1;
        Ok(self.num_qubits - 1)
    }

    /// Replaces this state with `self ⊗ other`; `other`'s qubits follow ours.
    pub(crate) fn absorb(&mut self, other: AmplitudeEngine) -> MeshResult<()> {
        checked_dim(self.num_qubits + other.num_qubits)?;
        self.state = kron_vec(&self.state, &other.state);
        self.num_qubits += other.num_qubits;
        Ok(())
    }

    pub(crate) fn apply_gate(&mut self, position: usize, gate: Gate) -> MeshResult<()> {
        apply_single(&mut self.state, self.num_qubits, position, &gate.matrix())
    }

    pub(crate) fn apply_controlled(&mut self, control: usize, target: usize, gate: TwoQubitGate) -> MeshResult<()> {
        apply_pair(&mut self.state, self.num_qubits, control, target, &gate.matrix())
    }

    /// Projective Z measurement; the measured qubit is removed from the group.
    pub(crate) fn measure<R: Rng>(&mut self, position: usize, rng: &mut R) -> MeshResult<u8> {
        check_position(self.num_qubits, position)?;
        let mask = 1usize << (self.num_qubits - 1 - position);
        let p1: f64 = self
            .state
            .iter()
            .enumerate()
            .filter(|(i, _)| i & mask != 0)
            .map(|(_, c)| c.norm_sqr())
            .sum();
        let outcome = u8::from(rng.random::<f64>() < p1);
        let probability = if outcome == 1 { p1 } else { 1.0 - p1 };
        if probability < NEGLIGIBLE {
            return Err(MeshError::simulation(format!("Measurement selected an outcome of probability {:.3e}", probability)));
        }
        let norm = probability.sqrt();
        let wanted = if outcome == 1 { mask } else { 0 };
        self.state = self
            .state
            .iter()
            .enumerate()
            .filter(|(i, _)| i & mask == wanted)
            .map(|(_, c)| *c / norm)
            .collect();
        self.num_qubits -= 1;
        Ok(outcome)
    }

    /// The amplitude vector with qubits reordered so that `order[0]` is the most
    /// significant factor.
    ///
    /// Naming a strict subset of the group only works when those qubits are in
    /// a product state with the rest; their factor is then returned with its
    /// first non-zero amplitude made real and positive. Entangled subsets have
    /// no pure state and are rejected.
    pub(crate) fn read(&self, order: &[usize]) -> MeshResult<Vec<Complex<f64>>> {
        check_distinct(self.num_qubits, order)?;
        if order.len() == self.num_qubits {
            return Ok(self.permuted(order));
        }
        self.factor(order)
    }

    fn permuted(&self, order: &[usize]) -> Vec<Complex<f64>> {
        let n = self.num_qubits;
        let mut out = vec![Complex::zero(); self.state.len()];
        for (i, amp) in self.state.iter().enumerate() {
            let mut j = 0usize;
            for (t, &pos) in order.iter().enumerate() {
                let bit = (i >> (n - 1 - pos)) & 1;
                j |= bit << (n - 1 - t);
            }
            out[j] = *amp;
        }
        out
    }

    fn factor(&self, order: &[usize]) -> MeshResult<Vec<Complex<f64>>> {
        let n = self.num_qubits;
        let rest: Vec<usize> = (0..n).filter(|p| !order.contains(p)).collect();
        // columns[r][s]: amplitude with the rest in basis state r and the subset in s
        let mut columns = vec![vec![Complex::zero(); 1usize << order.len()]; 1usize << rest.len()];
        for (i, amp) in self.state.iter().enumerate() {
            let bit = |pos: usize| (i >> (n - 1 - pos)) & 1;
            let s = order.iter().fold(0usize, |acc, &p| (acc << 1) | bit(p));
            let r = rest.iter().fold(0usize, |acc, &p| (acc << 1) | bit(p));
            columns[r][s] = *amp;
        }

        let (best, best_weight) = columns
            .iter()
            .map(|column| column.iter().map(|a| a.norm_sqr()).sum::<f64>())
            .enumerate()
            .fold((0, 0.0), |(bi, bw), (i, w)| if w > bw { (i, w) } else { (bi, bw) });
        if best_weight < NEGLIGIBLE {
            return Err(MeshError::simulation("Amplitude vector has zero norm"));
        }
        let scale = 1.0 / best_weight.sqrt();
        let mut factor: Vec<Complex<f64>> = columns[best].iter().map(|a| *a * scale).collect();
        if let Some(lead) = factor.iter().find(|a| a.norm_sqr() > NEGLIGIBLE).copied() {
            let phase = lead.conj() / lead.norm();
            factor.iter_mut().for_each(|a| *a *= phase);
        }

        // Distance of the group state from factor ⊗ (projection of the rest)
        let mut residual = 0.0;
        for column in &columns {
            let overlap: Complex<f64> = factor.iter().zip(column).map(|(v, c)| v.conj() * *c).sum();
            residual += factor.iter().zip(column).map(|(v, c)| (*c - *v * overlap).norm_sqr()).sum::<f64>();
        }
        if residual > SEPARABLE_TOLERANCE {
            return Err(entangled_subset(order.len(), n));
        }
        Ok(factor)
    }
}

/// Readout of qubits that share entanglement with the rest of their group.
pub(crate) fn entangled_subset(subset: usize, group: usize) -> MeshError {
    MeshError::invalid_operation(format!(
        "{} of the {} qubits in the register group are entangled with the rest and have no pure state",
        subset, group
    ))
}

/// 2^n, failing instead of overflowing.
pub(crate) fn checked_dim(num_qubits: usize) -> MeshResult<usize> {
    1usize
        .checked_shl(num_qubits as u32)
        .ok_or_else(|| MeshError::simulation("Number of qubits too large, state dimension overflows usize."))
}

pub(crate) fn check_position(num_qubits: usize, position: usize) -> MeshResult<()> {
    if position >= num_qubits {
        return Err(MeshError::simulation(format!("Position {} out of range for {} qubits", position, num_qubits)));
    }
    Ok(())
}

/// Fails if `order` repeats a position or names one out of range.
pub(crate) fn check_distinct(num_qubits: usize, order: &[usize]) -> MeshResult<()> {
    let mut seen = vec![false; num_qubits];
    for &pos in order {
        check_position(num_qubits, pos)?;
        if seen[pos] {
            return Err(MeshError::invalid_operation(format!("Qubit position {} listed twice", pos)));
        }
        seen[pos] = true;
    }
    Ok(())
}

pub(crate) fn kron_vec(a: &[Complex<f64>], b: &[Complex<f64>]) -> Vec<Complex<f64>> {
    let mut out = Vec::with_capacity(a.len() * b.len());
    for x in a {
        for y in b {
            out.push(*x * *y);
        }
    }
    out
}

/// Applies a 2x2 matrix to the qubit at `position` of an N-qubit vector.
pub(crate) fn apply_single(
    vector: &mut [Complex<f64>],
    num_qubits: usize,
    position: usize,
    matrix: &[[Complex<f64>; 2]; 2],
) -> MeshResult<()> {
    check_position(num_qubits, position)?;
    let k = num_qubits - 1 - position; // bit position, from the right
    let k_mask = 1usize << k;
    let lower_mask = k_mask - 1;
    let upper_mask = !((k_mask << 1) - 1);

    // Walk pairs of basis states that differ only at the target bit
    for i in 0..vector.len() / 2 {
        let i0 = ((i << 1) & upper_mask) | (i & lower_mask);
        let i1 = i0 | k_mask;
        let psi_0 = vector[i0];
        let psi_1 = vector[i1];
        vector[i0] = matrix[0][0] * psi_0 + matrix[0][1] * psi_1;
        vector[i1] = matrix[1][0] * psi_0 + matrix[1][1] * psi_1;
    }
    Ok(())
}

/// Applies a 4x4 matrix to the pair (`first`, `second`), where the matrix basis
/// is |first, second⟩ = |00⟩, |01⟩, |10⟩, |11⟩.
pub(crate) fn apply_pair(
    vector: &mut [Complex<f64>],
    num_qubits: usize,
    first: usize,
    second: usize,
    matrix: &[[Complex<f64>; 4]; 4],
) -> MeshResult<()> {
    check_position(num_qubits, first)?;
    check_position(num_qubits, second)?;
    if first == second {
        return Err(MeshError::invalid_operation("Control and target of a two-qubit gate cannot be the same qubit"));
    }
    let first_mask = 1usize << (num_qubits - 1 - first);
    let second_mask = 1usize << (num_qubits - 1 - second);

    for base in 0..vector.len() {
        if base & (first_mask | second_mask) != 0 {
            continue;
        }
        let indices = [base, base | second_mask, base | first_mask, base | first_mask | second_mask];
        let psi = indices.map(|idx| vector[idx]);
        for (row, &idx) in indices.iter().enumerate() {
            vector[idx] = (0..4).map(|col| matrix[row][col] * psi[col]).sum();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::f64::consts::FRAC_1_SQRT_2;

    const TEST_TOLERANCE: f64 = 1e-9;

    fn assert_vec_approx(actual: &[Complex<f64>], expected: &[Complex<f64>], context: &str) {
        assert_eq!(actual.len(), expected.len(), "Vector length mismatch - {}", context);
        for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
            assert!((*a - *e).norm_sqr() < TEST_TOLERANCE * TEST_TOLERANCE, "Mismatch at {}: {} vs {} - {}", i, a, e, context);
        }
    }

    #[test]
    fn h_then_cnot_builds_phi_plus() -> MeshResult<()> {
        let mut engine = AmplitudeEngine::new();
        engine.add_qubit()?;
        engine.add_qubit()?;
        engine.apply_gate(0, Gate::H)?;
        engine.apply_controlled(0, 1, TwoQubitGate::Cnot)?;
        let h = Complex::new(FRAC_1_SQRT_2, 0.0);
        assert_vec_approx(engine.vector(), &[h, Complex::zero(), Complex::zero(), h], "Φ+");
        Ok(())
    }

    #[test]
    fn absorb_places_other_qubits_last() -> MeshResult<()> {
        let mut a = AmplitudeEngine::new();
        a.add_qubit()?;
        a.apply_gate(0, Gate::X)?;
        let mut b = AmplitudeEngine::new();
        b.add_qubit()?;
        a.absorb(b)?;
        // |1> ⊗ |0> = |10>
        let one = Complex::new(1.0, 0.0);
        assert_vec_approx(a.vector(), &[Complex::zero(), Complex::zero(), one, Complex::zero()], "|10>");
        Ok(())
    }

    #[test]
    fn read_reorders_qubits() -> MeshResult<()> {
        let mut engine = AmplitudeEngine::new();
        engine.add_qubit()?;
        engine.add_qubit()?;
        engine.apply_gate(0, Gate::X)?; // |10>
        let swapped = engine.read(&[1, 0])?;
        assert_eq!(swapped[1], Complex::new(1.0, 0.0)); // |01>
        // Product state: each qubit reads out on its own
        assert_vec_approx(&engine.read(&[0])?, &[Complex::zero(), Complex::new(1.0, 0.0)], "first factor");
        Ok(())
    }

    #[test]
    fn bell_pair_reads_out_of_a_larger_group() -> MeshResult<()> {
        let mut engine = AmplitudeEngine::new();
        for _ in 0..3 {
            engine.add_qubit()?;
        }
        engine.apply_gate(1, Gate::H)?;
        engine.apply_gate(0, Gate::H)?;
        engine.apply_controlled(0, 2, TwoQubitGate::Cnot)?;
        // A global phase on the whole group must not leak into the factor
        engine.apply_gate(1, Gate::Z)?;
        engine.apply_gate(1, Gate::X)?;
        engine.apply_gate(1, Gate::Z)?;

        let h = Complex::new(FRAC_1_SQRT_2, 0.0);
        assert_vec_approx(&engine.read(&[0, 2])?, &[h, Complex::zero(), Complex::zero(), h], "Φ+ factor");
        let err = engine.read(&[2]).unwrap_err();
        assert_eq!(err.kind(), crate::core::ErrorKind::InvalidOperation);
        Ok(())
    }

    #[test]
    fn measuring_a_bell_half_collapses_the_partner() -> MeshResult<()> {
        let mut engine = AmplitudeEngine::new();
        engine.add_qubit()?;
        engine.add_qubit()?;
        engine.apply_gate(0, Gate::H)?;
        engine.apply_controlled(0, 1, TwoQubitGate::Cnot)?;
        let mut rng = StdRng::seed_from_u64(7);
        let outcome = engine.measure(0, &mut rng)?;
        assert_eq!(engine.num_qubits(), 1);
        let expected = if outcome == 0 {
            [Complex::new(1.0, 0.0), Complex::zero()]
        } else {
            [Complex::zero(), Complex::new(1.0, 0.0)]
        };
        assert_vec_approx(engine.vector(), &expected, "partner collapse");
        Ok(())
    }
}
