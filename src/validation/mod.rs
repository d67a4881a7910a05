// src/validation/mod.rs

//! Judges whether an observed joint state is the expected entangled state.
//!
//! Each representation gets the comparison that is meaningful for it:
//! element-wise closeness for matrices and vectors, group equivalence for
//! stabilizer tableaux (two generator sets can differ row by row and still
//! describe the same state).

use crate::core::{
    AMPLITUDE_TOLERANCE, Backend, BellState, DENSITY_TOLERANCE, JointState, MeshError, MeshResult, NEGLIGIBLE,
};
use crate::simulation::{PauliRow, canonical_generators};
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Comparison tolerances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerifierConfig {
    pub amplitude_tolerance: f64,
    /// `0.0` requests exact equality.
    pub density_tolerance: f64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self { amplitude_tolerance: AMPLITUDE_TOLERANCE, density_tolerance: DENSITY_TOLERANCE }
    }
}

/// Reference state in one representation.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpectedState {
    DensityMatrix(Vec<Vec<Complex<f64>>>),
    AmplitudeVector(Vec<Complex<f64>>),
    /// Generators of the stabilizer group.
    StabilizerTableau(Vec<PauliRow>),
}

impl ExpectedState {
    /// The Bell state `bell` as `backend` represents it.
    pub fn bell(bell: BellState, backend: Backend) -> Self {
        let psi = bell.amplitudes();
        match backend {
            Backend::AmplitudeVector => ExpectedState::AmplitudeVector(psi.to_vec()),
            Backend::DensityMatrix => {
                // Bell amplitudes are 0 or ±1/√2, so |ψ⟩⟨ψ| has entries exactly 0 or ±1/2.
                let signs = psi.map(|a| if a.norm() < NEGLIGIBLE { 0.0 } else { a.re.signum() });
                ExpectedState::DensityMatrix(
                    signs.iter().map(|a| signs.iter().map(|b| Complex::new(0.5 * a * b, 0.0)).collect()).collect(),
                )
            }
            Backend::StabilizerTableau => {
                let (xx_negative, zz_negative) = bell.stabilizer_signs();
                let xx = PauliRow { x: vec![true, true], z: vec![false, false], negative: xx_negative };
                let zz = PauliRow { x: vec![false, false], z: vec![true, true], negative: zz_negative };
                ExpectedState::StabilizerTableau(vec![xx, zz])
            }
        }
    }

    pub fn backend(&self) -> Backend {
        match self {
            ExpectedState::DensityMatrix(_) => Backend::DensityMatrix,
            ExpectedState::AmplitudeVector(_) => Backend::AmplitudeVector,
            ExpectedState::StabilizerTableau(_) => Backend::StabilizerTableau,
        }
    }
}

/// Backend-dispatching equality check against a fixed expected state.
#[derive(Debug, Clone, PartialEq)]
pub struct Verifier {
    backend: Backend,
    expected: ExpectedState,
    config: VerifierConfig,
}

impl Verifier {
    /// Expects Φ+ = (|00⟩ + |11⟩)/√2.
    pub fn new(backend: Backend) -> Self {
        Self::for_bell(backend, BellState::PhiPlus)
    }

    pub fn for_bell(backend: Backend, bell: BellState) -> Self {
        Self { backend, expected: ExpectedState::bell(bell, backend), config: VerifierConfig::default() }
    }

    pub fn with_config(mut self, config: VerifierConfig) -> Self {
        self.config = config;
        self
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn expected(&self) -> &ExpectedState {
        &self.expected
    }

    /// `Ok(true)` when `joint` matches the expected state. A joint state in a
    /// different representation is an error, never a silent `false`.
    pub fn verify(&self, joint: &JointState) -> MeshResult<bool> {
        if joint.backend() != self.backend {
            return Err(MeshError::UnsupportedBackend {
                message: format!("Verifier for {} cannot judge a {} state", self.backend, joint.backend()),
            });
        }
        let matches = match &self.expected {
            ExpectedState::DensityMatrix(expected) => {
                let observed = joint.density_matrix()?;
                observed.len() == expected.len()
                    && observed.iter().zip(expected).all(|(o_row, e_row)| {
                        o_row.len() == e_row.len()
                            && o_row.iter().zip(e_row).all(|(o, e)| close(*o, *e, self.config.density_tolerance))
                    })
            }
            ExpectedState::AmplitudeVector(expected) => {
                let observed = joint.amplitudes()?;
                observed.len() == expected.len()
                    && observed.iter().zip(expected).all(|(o, e)| close(*o, *e, self.config.amplitude_tolerance))
            }
            ExpectedState::StabilizerTableau(expected) => {
                let observed = parse_tableau(joint)?;
                let n = expected.first().map(PauliRow::num_qubits).unwrap_or(0);
                if observed.len() != n || observed.iter().any(|r| r.num_qubits() != n) {
                    false
                } else {
                    canonical_generators(&observed)? == canonical_generators(expected)?
                }
            }
        };
        debug!(backend = %self.backend, observed = %joint, matches, "Verified joint state");
        Ok(matches)
    }
}

/// `tolerance == 0.0` is exact equality.
fn close(observed: Complex<f64>, expected: Complex<f64>, tolerance: f64) -> bool {
    if tolerance == 0.0 {
        observed == expected
    } else {
        (observed - expected).norm() <= tolerance
    }
}

/// Generator rows of a tableau payload, checked to form a valid stabilizer set.
fn parse_tableau(joint: &JointState) -> MeshResult<Vec<PauliRow>> {
    let JointState::StabilizerTableau { rows, phases } = joint else {
        return Err(MeshError::UnsupportedBackend { message: format!("{} payload has no tableau", joint.backend()) });
    };
    if rows.len() != phases.len() {
        return Err(MeshError::MalformedState {
            message: format!("Tableau has {} rows but {} phases", rows.len(), phases.len()),
        });
    }
    let generators = rows
        .iter()
        .zip(phases)
        .map(|(bits, &phase)| PauliRow::from_symplectic(bits, phase))
        .collect::<MeshResult<Vec<_>>>()?;
    for (i, a) in generators.iter().enumerate() {
        for b in &generators[i + 1..] {
            if a.num_qubits() == b.num_qubits() && !a.commutes_with(b) {
                return Err(MeshError::MalformedState { message: format!("Generators {} and {} anticommute", a, b) });
            }
        }
    }
    Ok(generators)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorKind;
    use std::f64::consts::FRAC_1_SQRT_2;

    fn tableau(rows: &[[u8; 4]], phases: &[u8]) -> JointState {
        JointState::StabilizerTableau { rows: rows.iter().map(|r| r.to_vec()).collect(), phases: phases.to_vec() }
    }

    #[test]
    fn density_phi_plus_passes_with_float_noise() -> MeshResult<()> {
        let h2 = FRAC_1_SQRT_2 * FRAC_1_SQRT_2; // 0.5000000000000001
        let real = vec![
            vec![h2, 0.0, 0.0, h2],
            vec![0.0; 4],
            vec![0.0; 4],
            vec![h2, 0.0, 0.0, h2],
        ];
        let joint = JointState::DensityMatrix { real, imag: vec![vec![0.0; 4]; 4] };
        assert!(Verifier::new(Backend::DensityMatrix).verify(&joint)?);

        let exact = Verifier::new(Backend::DensityMatrix)
            .with_config(VerifierConfig { density_tolerance: 0.0, ..VerifierConfig::default() });
        assert!(!exact.verify(&joint)?);
        Ok(())
    }

    #[test]
    fn amplitude_verification_is_order_sensitive_for_psi_minus() -> MeshResult<()> {
        let h = FRAC_1_SQRT_2;
        let verifier = Verifier::for_bell(Backend::AmplitudeVector, BellState::PsiMinus);
        let as_read = JointState::AmplitudeVector { real: vec![0.0, h, -h, 0.0], imag: vec![0.0; 4] };
        let swapped = JointState::AmplitudeVector { real: vec![0.0, -h, h, 0.0], imag: vec![0.0; 4] };
        assert!(verifier.verify(&as_read)?);
        assert!(!verifier.verify(&swapped)?);
        Ok(())
    }

    #[test]
    fn wrong_shape_is_a_false_verdict() -> MeshResult<()> {
        let joint = JointState::AmplitudeVector { real: vec![1.0, 0.0], imag: vec![0.0, 0.0] };
        assert!(!Verifier::new(Backend::AmplitudeVector).verify(&joint)?);
        Ok(())
    }

    #[test]
    fn mismatched_halves_are_malformed() {
        let joint = JointState::AmplitudeVector { real: vec![1.0, 0.0, 0.0, 0.0], imag: vec![0.0] };
        let err = Verifier::new(Backend::AmplitudeVector).verify(&joint).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedState);
    }

    #[test]
    fn foreign_representation_is_unsupported() {
        let joint = JointState::AmplitudeVector { real: vec![FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2], imag: vec![0.0; 4] };
        let err = Verifier::new(Backend::StabilizerTableau).verify(&joint).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedBackend);
    }

    #[test]
    fn stabilizer_group_equivalence() -> MeshResult<()> {
        let verifier = Verifier::new(Backend::StabilizerTableau);
        // {XX, ZZ}
        assert!(verifier.verify(&tableau(&[[1, 1, 0, 0], [0, 0, 1, 1]], &[0, 0]))?);
        // {-YY, ZZ} generates the same group
        assert!(verifier.verify(&tableau(&[[1, 1, 1, 1], [0, 0, 1, 1]], &[1, 0]))?);
        // {-XX, ZZ} is Φ−
        assert!(!verifier.verify(&tableau(&[[1, 1, 0, 0], [0, 0, 1, 1]], &[1, 0]))?);
        Ok(())
    }

    #[test]
    fn non_binary_tableau_is_malformed() {
        let err = Verifier::new(Backend::StabilizerTableau)
            .verify(&tableau(&[[2, 1, 0, 0], [0, 0, 1, 1]], &[0, 0]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedState);
    }

    #[test]
    fn anticommuting_rows_are_malformed() {
        // XI and ZI anticommute
        let err = Verifier::new(Backend::StabilizerTableau)
            .verify(&tableau(&[[1, 0, 0, 0], [0, 0, 1, 0]], &[0, 0]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedState);
    }
}
