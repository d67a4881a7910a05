// src/core/state.rs

use num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::constants::mesh_constants::{MAX_AMPLITUDE_QUBITS, MAX_DENSITY_QUBITS, MAX_STABILIZER_QUBITS};
use super::error::{MeshError, MeshResult};

/// The simulation backend a node runs, which fixes the representation of
/// every joint state it reads out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum Backend {
    /// Full density matrix (the `qutip` backend of older configurations).
    DensityMatrix,
    /// Pure-state amplitude vector (the `projectq` backend).
    AmplitudeVector,
    /// Stabilizer tableau; Clifford gates only.
    StabilizerTableau,
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::DensityMatrix => "density_matrix",
            Backend::AmplitudeVector => "amplitude_vector",
            Backend::StabilizerTableau => "stabilizer_tableau",
        }
    }

    /// Largest register group this backend simulates unless configured otherwise.
    pub fn default_qubit_limit(&self) -> usize {
        match self {
            Backend::DensityMatrix => MAX_DENSITY_QUBITS,
            Backend::AmplitudeVector => MAX_AMPLITUDE_QUBITS,
            Backend::StabilizerTableau => MAX_STABILIZER_QUBITS,
        }
    }
}

impl FromStr for Backend {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "density_matrix" | "density" | "qutip" => Ok(Backend::DensityMatrix),
            "amplitude_vector" | "amplitude" | "projectq" => Ok(Backend::AmplitudeVector),
            "stabilizer_tableau" | "stabilizer" => Ok(Backend::StabilizerTableau),
            other => Err(MeshError::UnsupportedBackend {
                message: format!("Unknown backend '{}'", other),
            }),
        }
    }
}

impl TryFrom<String> for Backend {
    type Error = MeshError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The four maximally entangled two-qubit states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BellState {
    /// |Φ+⟩ = (|00⟩ + |11⟩) / √2
    #[default]
    PhiPlus,
    /// |Φ-⟩ = (|00⟩ - |11⟩) / √2
    PhiMinus,
    /// |Ψ+⟩ = (|01⟩ + |10⟩) / √2
    PsiPlus,
    /// |Ψ-⟩ = (|01⟩ - |10⟩) / √2
    PsiMinus,
}

impl BellState {
    /// Amplitudes over the basis |00⟩, |01⟩, |10⟩, |11⟩.
    pub fn amplitudes(&self) -> [Complex<f64>; 4] {
        let h = Complex::new(std::f64::consts::FRAC_1_SQRT_2, 0.0);
        let z = Complex::new(0.0, 0.0);
        match self {
            BellState::PhiPlus => [h, z, z, h],
            BellState::PhiMinus => [h, z, z, -h],
            BellState::PsiPlus => [z, h, h, z],
            BellState::PsiMinus => [z, h, -h, z],
        }
    }

    /// Signs of the X⊗X and Z⊗Z stabilizers (`true` means −1).
    pub fn stabilizer_signs(&self) -> (bool, bool) {
        match self {
            BellState::PhiPlus => (false, false),
            BellState::PhiMinus => (true, false),
            BellState::PsiPlus => (false, true),
            BellState::PsiMinus => (true, true),
        }
    }
}

impl fmt::Display for BellState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BellState::PhiPlus => "Φ+",
            BellState::PhiMinus => "Φ-",
            BellState::PsiPlus => "Ψ+",
            BellState::PsiMinus => "Ψ-",
        };
        f.write_str(name)
    }
}

/// The observable result of reading out a set of qubits.
///
/// Complex data travels as separate real and imaginary halves, the way it
/// crosses the wire; use the accessor methods to rebuild complex values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JointState {
    DensityMatrix {
        real: Vec<Vec<f64>>,
        imag: Vec<Vec<f64>>,
    },
    AmplitudeVector {
        real: Vec<f64>,
        imag: Vec<f64>,
    },
    /// `rows[i]` holds the X block followed by the Z block of generator `i`;
    /// `phases[i]` is 1 when that generator carries a minus sign.
    StabilizerTableau {
        rows: Vec<Vec<u8>>,
        phases: Vec<u8>,
    },
}

impl JointState {
    /// The backend whose representation this payload uses.
    pub fn backend(&self) -> Backend {
        match self {
            JointState::DensityMatrix { .. } => Backend::DensityMatrix,
            JointState::AmplitudeVector { .. } => Backend::AmplitudeVector,
            JointState::StabilizerTableau { .. } => Backend::StabilizerTableau,
        }
    }

    pub(crate) fn from_amplitudes(amplitudes: &[Complex<f64>]) -> Self {
        JointState::AmplitudeVector {
            real: amplitudes.iter().map(|c| c.re).collect(),
            imag: amplitudes.iter().map(|c| c.im).collect(),
        }
    }

    pub(crate) fn from_density(matrix: &[Vec<Complex<f64>>]) -> Self {
        JointState::DensityMatrix {
            real: matrix.iter().map(|row| row.iter().map(|c| c.re).collect()).collect(),
            imag: matrix.iter().map(|row| row.iter().map(|c| c.im).collect()).collect(),
        }
    }

    /// Rebuilds the complex amplitude vector.
    pub fn amplitudes(&self) -> MeshResult<Vec<Complex<f64>>> {
        match self {
            JointState::AmplitudeVector { real, imag } => {
                if real.len() != imag.len() {
                    return Err(MeshError::malformed(format!(
                        "Amplitude halves differ in length: {} real vs {} imaginary",
                        real.len(),
                        imag.len()
                    )));
                }
                Ok(real.iter().zip(imag).map(|(&re, &im)| Complex::new(re, im)).collect())
            }
            other => Err(MeshError::UnsupportedBackend {
                message: format!("{} payload has no amplitude vector", other.backend()),
            }),
        }
    }

    /// Rebuilds the complex density matrix.
    pub fn density_matrix(&self) -> MeshResult<Vec<Vec<Complex<f64>>>> {
        match self {
            JointState::DensityMatrix { real, imag } => {
                if real.len() != imag.len() {
                    return Err(MeshError::malformed(format!(
                        "Density halves differ in row count: {} real vs {} imaginary",
                        real.len(),
                        imag.len()
                    )));
                }
                real.iter()
                    .zip(imag)
                    .enumerate()
                    .map(|(i, (re_row, im_row))| {
                        if re_row.len() != im_row.len() {
                            return Err(MeshError::malformed(format!("Density row {} halves differ in length", i)));
                        }
                        Ok(re_row.iter().zip(im_row).map(|(&re, &im)| Complex::new(re, im)).collect())
                    })
                    .collect()
            }
            other => Err(MeshError::UnsupportedBackend {
                message: format!("{} payload has no density matrix", other.backend()),
            }),
        }
    }
}

impl fmt::Display for JointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JointState::AmplitudeVector { real, imag } => {
                write!(f, "Amplitudes[")?;
                for (i, (re, im)) in real.iter().zip(imag).enumerate() {
                    write!(f, "{}{:.4}", if i > 0 { ", " } else { "" }, Complex::new(*re, *im))?;
                }
                write!(f, "]")
            }
            JointState::DensityMatrix { real, imag } => {
                writeln!(f, "Density[")?;
                for (re_row, im_row) in real.iter().zip(imag) {
                    write!(f, "  ")?;
                    for (j, (re, im)) in re_row.iter().zip(im_row).enumerate() {
                        write!(f, "{}{:.4}", if j > 0 { ", " } else { "" }, Complex::new(*re, *im))?;
                    }
                    writeln!(f)?;
                }
                write!(f, "]")
            }
            JointState::StabilizerTableau { rows, phases } => {
                write!(f, "Stabilizers[")?;
                for (i, (row, phase)) in rows.iter().zip(phases).enumerate() {
                    let n = row.len() / 2;
                    write!(f, "{}{}", if i > 0 { ", " } else { "" }, if *phase == 1 { '-' } else { '+' })?;
                    for q in 0..n {
                        let p = match (row[q], row[n + q]) {
                            (0, 0) => 'I',
                            (1, 0) => 'X',
                            (0, 1) => 'Z',
                            _ => 'Y',
                        };
                        write!(f, "{}", p)?;
                    }
                }
                write!(f, "]")
            }
        }
    }
}
