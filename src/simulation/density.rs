// src/simulation/density.rs
use super::amplitude::{apply_pair, apply_single, check_distinct, check_position, checked_dim};
use crate::core::{MeshError, MeshResult, NEGLIGIBLE};
use crate::operations::{Gate, TwoQubitGate};
use num_complex::Complex;
use num_traits::Zero;
use rand::Rng;

/// Mixed-state engine holding the 2^N x 2^N density matrix of one register group.
/// Uses the same qubit ordering convention as the amplitude engine.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DensityEngine {
    rho: Vec<Vec<Complex<f64>>>,
    num_qubits: usize,
}

impl DensityEngine {
    pub(crate) fn new() -> Self {
        Self { rho: vec![vec![Complex::new(1.0, 0.0)]], num_qubits: 0 }
    }

    pub(crate) fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    /// ρ ⊗ |0⟩⟨0|
    pub(crate) fn add_qubit(&mut self) -> MeshResult<usize> {
        let dim = checked_dim(self.num_qubits + 1)?;
        let mut next = vec![vec![Complex::zero(); dim]; dim];
        for (r, row) in self.rho.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                next[r << 1][c << 1] = *value;
            }
        }
        self.rho = next;
        self.num_qubits += 1;
        Ok(self.num_qubits - 1)
    }

    pub(crate) fn absorb(&mut self, other: DensityEngine) -> MeshResult<()> {
        let dim = checked_dim(self.num_qubits + other.num_qubits)?;
        let other_dim = other.rho.len();
        let mut next = vec![vec![Complex::zero(); dim]; dim];
        for (r1, row1) in self.rho.iter().enumerate() {
            for (c1, a) in row1.iter().enumerate() {
                if a.norm_sqr() < NEGLIGIBLE * NEGLIGIBLE {
                    continue;
                }
                for (r2, row2) in other.rho.iter().enumerate() {
                    for (c2, b) in row2.iter().enumerate() {
                        next[r1 * other_dim + r2][c1 * other_dim + c2] = *a * *b;
                    }
                }
            }
        }
        self.rho = next;
        self.num_qubits += other.num_qubits;
        Ok(())
    }

    pub(crate) fn apply_gate(&mut self, position: usize, gate: Gate) -> MeshResult<()> {
        let u = gate.matrix();
        let u_conj = u.map(|row| row.map(|c| c.conj()));
        let n = self.num_qubits;
        self.conjugate_by(
            |v| apply_single(v, n, position, &u),
            |v| apply_single(v, n, position, &u_conj),
        )
    }

    pub(crate) fn apply_controlled(&mut self, control: usize, target: usize, gate: TwoQubitGate) -> MeshResult<()> {
        let u = gate.matrix();
        let u_conj = u.map(|row| row.map(|c| c.conj()));
        let n = self.num_qubits;
        self.conjugate_by(
            |v| apply_pair(v, n, control, target, &u),
            |v| apply_pair(v, n, control, target, &u_conj),
        )
    }

    /// ρ → U ρ U†: `left` transforms every column by U, `right` every row by conj(U).
    fn conjugate_by<L, R>(&mut self, left: L, right: R) -> MeshResult<()>
    where
        L: Fn(&mut [Complex<f64>]) -> MeshResult<()>,
        R: Fn(&mut [Complex<f64>]) -> MeshResult<()>,
    {
        let dim = self.rho.len();
        let mut column = vec![Complex::zero(); dim];
        for c in 0..dim {
            for r in 0..dim {
                column[r] = self.rho[r][c];
            }
            left(&mut column)?;
            for r in 0..dim {
                self.rho[r][c] = column[r];
            }
        }
        for row in self.rho.iter_mut() {
            right(row)?;
        }
        Ok(())
    }

    /// Projective Z measurement followed by tracing the measured qubit out.
    pub(crate) fn measure<R: Rng>(&mut self, position: usize, rng: &mut R) -> MeshResult<u8> {
        check_position(self.num_qubits, position)?;
        let mask = 1usize << (self.num_qubits - 1 - position);
        let p1: f64 = (0..self.rho.len()).filter(|i| i & mask != 0).map(|i| self.rho[i][i].re).sum();
        let outcome = u8::from(rng.random::<f64>() < p1);
        let probability = if outcome == 1 { p1 } else { 1.0 - p1 };
        if probability < NEGLIGIBLE {
            return Err(MeshError::simulation(format!("Measurement selected an outcome of probability {:.3e}", probability)));
        }
        let wanted = if outcome == 1 { mask } else { 0 };
        let kept: Vec<usize> = (0..self.rho.len()).filter(|i| i & mask == wanted).collect();
        self.rho = kept
            .iter()
            .map(|&r| kept.iter().map(|&c| self.rho[r][c] / probability).collect())
            .collect();
        self.num_qubits -= 1;
        Ok(outcome)
    }

    /// Reduced density matrix over `order`, `order[0]` most significant.
    /// Qubits not named are traced out.
    pub(crate) fn read(&self, order: &[usize]) -> MeshResult<Vec<Vec<Complex<f64>>>> {
        if order.is_empty() {
            return Err(MeshError::invalid_operation("Readout needs at least one qubit"));
        }
        check_distinct(self.num_qubits, order)?;
        let n = self.num_qubits;
        let rest: Vec<usize> = (0..n).filter(|p| !order.contains(p)).collect();
        let kept_dim = 1usize << order.len();
        let traced_dim = 1usize << rest.len();

        let compose = |kept: usize, traced: usize| -> usize {
            let mut idx = 0usize;
            for (t, &pos) in order.iter().enumerate() {
                let bit = (kept >> (order.len() - 1 - t)) & 1;
                idx |= bit << (n - 1 - pos);
            }
            for (s, &pos) in rest.iter().enumerate() {
                let bit = (traced >> (rest.len() - 1 - s)) & 1;
                idx |= bit << (n - 1 - pos);
            }
            idx
        };

        let mut reduced = vec![vec![Complex::zero(); kept_dim]; kept_dim];
        for (a, row) in reduced.iter_mut().enumerate() {
            for (b, cell) in row.iter_mut().enumerate() {
                *cell = (0..traced_dim).map(|e| self.rho[compose(a, e)][compose(b, e)]).sum();
            }
        }
        Ok(reduced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn assert_matrix_approx(actual: &[Vec<Complex<f64>>], expected: &[[f64; 4]; 4]) {
        for r in 0..4 {
            for c in 0..4 {
                let diff = actual[r][c] - Complex::new(expected[r][c], 0.0);
                assert!(diff.norm() < 1e-9, "Mismatch at ({}, {}): {}", r, c, actual[r][c]);
            }
        }
    }

    #[test]
    fn bell_pair_density_matrix() -> MeshResult<()> {
        let mut engine = DensityEngine::new();
        engine.add_qubit()?;
        engine.add_qubit()?;
        engine.apply_gate(0, Gate::H)?;
        engine.apply_controlled(0, 1, TwoQubitGate::Cnot)?;
        let rho = engine.read(&[0, 1])?;
        assert_matrix_approx(
            &rho,
            &[[0.5, 0.0, 0.0, 0.5], [0.0, 0.0, 0.0, 0.0], [0.0, 0.0, 0.0, 0.0], [0.5, 0.0, 0.0, 0.5]],
        );
        Ok(())
    }

    #[test]
    fn one_half_of_a_bell_pair_is_maximally_mixed() -> MeshResult<()> {
        let mut engine = DensityEngine::new();
        engine.add_qubit()?;
        engine.add_qubit()?;
        engine.apply_gate(0, Gate::H)?;
        engine.apply_controlled(0, 1, TwoQubitGate::Cnot)?;
        let half = engine.read(&[1])?;
        assert!((half[0][0].re - 0.5).abs() < 1e-9);
        assert!((half[1][1].re - 0.5).abs() < 1e-9);
        assert!(half[0][1].norm() < 1e-9);
        Ok(())
    }

    #[test]
    fn measurement_removes_the_qubit_and_keeps_trace_one() -> MeshResult<()> {
        let mut engine = DensityEngine::new();
        engine.add_qubit()?;
        engine.add_qubit()?;
        engine.apply_gate(1, Gate::X)?;
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(engine.measure(1, &mut rng)?, 1);
        assert_eq!(engine.num_qubits(), 1);
        let trace: f64 = (0..2).map(|i| engine.read(&[0]).unwrap()[i][i].re).sum();
        assert!((trace - 1.0).abs() < 1e-12);
        Ok(())
    }
}
