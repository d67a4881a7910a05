// src/operations/mod.rs

//! Gate kinds a remote caller may apply to a referenced qubit.
//!
//! These are the only state transformations on the wire: a caller names a
//! gate, the owning node's engine applies it. Each backend decides which
//! gates it can express (the stabilizer backend only takes Clifford gates).

use num_complex::Complex;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_1_SQRT_2;
use std::fmt;

/// A single-qubit gate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Gate {
    Identity,
    /// Pauli X (bit flip).
    X,
    /// Pauli Y.
    Y,
    /// Pauli Z (phase flip).
    Z,
    /// Hadamard.
    H,
    /// Phase gate, `diag(1, i)`.
    S,
    /// Inverse phase gate, `diag(1, -i)`.
    SDagger,
    /// `diag(1, e^(iπ/4))`. Not a Clifford gate.
    T,
    /// `diag(1, e^(iθ))` for an arbitrary angle in radians.
    PhaseShift(f64),
}

impl Gate {
    /// The 2x2 unitary in the computational basis {|0⟩, |1⟩}.
    pub fn matrix(&self) -> [[Complex<f64>; 2]; 2] {
        let one = Complex::new(1.0, 0.0);
        let zero = Complex::zero();
        let i = Complex::i();
        match self {
            Gate::Identity => [[one, zero], [zero, one]],
            Gate::X => [[zero, one], [one, zero]],
            Gate::Y => [[zero, -i], [i, zero]],
            Gate::Z => [[one, zero], [zero, -one]],
            Gate::H => {
                let h = Complex::new(FRAC_1_SQRT_2, 0.0);
                [[h, h], [h, -h]]
            }
            Gate::S => [[one, zero], [zero, i]],
            Gate::SDagger => [[one, zero], [zero, -i]],
            Gate::T => [[one, zero], [zero, Complex::new(FRAC_1_SQRT_2, FRAC_1_SQRT_2)]],
            Gate::PhaseShift(theta) => [[one, zero], [zero, Complex::new(theta.cos(), theta.sin())]],
        }
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gate::PhaseShift(theta) => write!(f, "Phase({:.4})", theta),
            other => write!(f, "{:?}", other),
        }
    }
}

/// A controlled two-qubit gate; the first operand is always the control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TwoQubitGate {
    /// Controlled-NOT.
    Cnot,
    /// Controlled-Z.
    Cz,
}

impl TwoQubitGate {
    /// The gate applied to the target when the control is |1⟩.
    pub fn target_gate(&self) -> Gate {
        match self {
            TwoQubitGate::Cnot => Gate::X,
            TwoQubitGate::Cz => Gate::Z,
        }
    }

    /// The 4x4 unitary over |control, target⟩ = |00⟩, |01⟩, |10⟩, |11⟩.
    pub fn matrix(&self) -> [[Complex<f64>; 4]; 4] {
        let u = self.target_gate().matrix();
        let one = Complex::new(1.0, 0.0);
        let zero = Complex::zero();
        [
            // Control |0> subspace: identity on target
            [one, zero, zero, zero],
            [zero, one, zero, zero],
            // Control |1> subspace: U on target
            [zero, zero, u[0][0], u[0][1]],
            [zero, zero, u[1][0], u[1][1]],
        ]
    }
}

impl fmt::Display for TwoQubitGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TwoQubitGate::Cnot => f.write_str("CNOT"),
            TwoQubitGate::Cz => f.write_str("CZ"),
        }
    }
}
