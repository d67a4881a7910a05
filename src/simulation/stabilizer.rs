// src/simulation/stabilizer.rs

//! Stabilizer-formalism engine and the Pauli algebra shared with the verifier.
//!
//! A pure N-qubit stabilizer state is described by N commuting, independent
//! Pauli generators. Gates act on generators by conjugation; only Clifford
//! gates keep the description closed.

use super::amplitude::{check_distinct, check_position, entangled_subset};
use crate::core::{MeshError, MeshResult};
use crate::operations::{Gate, TwoQubitGate};
use rand::Rng;
use std::f64::consts::FRAC_PI_2;
use std::fmt;

/// One signed Pauli string in symplectic form: qubit `q` carries
/// `I` (0,0), `X` (1,0), `Z` (0,1) or `Y` (1,1) in (`x[q]`, `z[q]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PauliRow {
    pub x: Vec<bool>,
    pub z: Vec<bool>,
    /// `true` for an overall −1.
    pub negative: bool,
}

impl PauliRow {
    /// The identity on `n` qubits.
    pub fn identity(n: usize) -> Self {
        Self { x: vec![false; n], z: vec![false; n], negative: false }
    }

    /// `±Z` on qubit `q`, identity elsewhere.
    pub fn single_z(n: usize, q: usize, negative: bool) -> Self {
        let mut row = Self::identity(n);
        row.z[q] = true;
        row.negative = negative;
        row
    }

    /// Parses a binary row laid out as the X block followed by the Z block.
    pub fn from_symplectic(bits: &[u8], phase: u8) -> MeshResult<Self> {
        if bits.len() % 2 != 0 {
            return Err(MeshError::malformed(format!("Symplectic row has odd length {}", bits.len())));
        }
        let to_bool = |b: u8| match b {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(MeshError::malformed(format!("Tableau entry {} is not binary", other))),
        };
        let n = bits.len() / 2;
        Ok(Self {
            x: bits[..n].iter().map(|&b| to_bool(b)).collect::<MeshResult<_>>()?,
            z: bits[n..].iter().map(|&b| to_bool(b)).collect::<MeshResult<_>>()?,
            negative: to_bool(phase)?,
        })
    }

    pub fn to_symplectic(&self) -> (Vec<u8>, u8) {
        let bits = self.x.iter().chain(self.z.iter()).map(|&b| u8::from(b)).collect();
        (bits, u8::from(self.negative))
    }

    pub fn num_qubits(&self) -> usize {
        self.x.len()
    }

    pub fn is_identity(&self) -> bool {
        !self.x.iter().any(|&b| b) && !self.z.iter().any(|&b| b)
    }

    /// Symplectic column `c`: X bits first, then Z bits.
    fn bit(&self, c: usize) -> bool {
        let n = self.num_qubits();
        if c < n { self.x[c] } else { self.z[c - n] }
    }

    pub fn commutes_with(&self, other: &PauliRow) -> bool {
        let overlap = (0..self.num_qubits())
            .filter(|&q| (self.x[q] && other.z[q]) != (self.z[q] && other.x[q]))
            .count();
        overlap % 2 == 0
    }

    /// Replaces `self` with `other · self`. Both must commute so the product
    /// stays Hermitian with a real sign.
    pub fn left_multiply(&mut self, other: &PauliRow) -> MeshResult<()> {
        if other.num_qubits() != self.num_qubits() {
            return Err(MeshError::malformed("Pauli rows act on different numbers of qubits"));
        }
        // Power of i picked up by multiplying qubit-by-qubit
        let mut exponent: i32 = 2 * i32::from(self.negative) + 2 * i32::from(other.negative);
        for q in 0..self.num_qubits() {
            exponent += phase_exponent(other.x[q], other.z[q], self.x[q], self.z[q]);
        }
        let exponent = exponent.rem_euclid(4);
        if exponent % 2 != 0 {
            return Err(MeshError::malformed("Generators do not commute"));
        }
        self.negative = exponent == 2;
        for q in 0..self.num_qubits() {
            self.x[q] ^= other.x[q];
            self.z[q] ^= other.z[q];
        }
        Ok(())
    }
}

/// Exponent of i in the product of single-qubit Paulis (x1,z1)·(x2,z2).
fn phase_exponent(x1: bool, z1: bool, x2: bool, z2: bool) -> i32 {
    let (x2, z2) = (i32::from(x2), i32::from(z2));
    match (x1, z1) {
        (false, false) => 0,
        (true, true) => z2 - x2,
        (true, false) => z2 * (2 * x2 - 1),
        (false, true) => x2 * (1 - 2 * z2),
    }
}

impl fmt::Display for PauliRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", if self.negative { '-' } else { '+' })?;
        for q in 0..self.num_qubits() {
            let p = match (self.x[q], self.z[q]) {
                (false, false) => 'I',
                (true, false) => 'X',
                (false, true) => 'Z',
                (true, true) => 'Y',
            };
            write!(f, "{}", p)?;
        }
        Ok(())
    }
}

/// Reduced row echelon form of a generator set, unique for the group it generates.
///
/// Dependent generators reduce to the identity and are dropped; one that
/// reduces to −I means the set describes no state and is rejected.
pub fn canonical_generators(rows: &[PauliRow]) -> MeshResult<Vec<PauliRow>> {
    let Some(n) = rows.first().map(PauliRow::num_qubits) else {
        return Ok(Vec::new());
    };
    let mut rows = rows.to_vec();
    if rows.iter().any(|r| r.num_qubits() != n) {
        return Err(MeshError::malformed("Generators act on different numbers of qubits"));
    }
    let mut rank = 0;
    for column in 0..2 * n {
        let Some(pivot) = (rank..rows.len()).find(|&r| rows[r].bit(column)) else {
            continue;
        };
        rows.swap(rank, pivot);
        let pivot_row = rows[rank].clone();
        for (i, row) in rows.iter_mut().enumerate() {
            if i != rank && row.bit(column) {
                row.left_multiply(&pivot_row)?;
            }
        }
        rank += 1;
    }
    if rows[rank..].iter().any(|r| r.negative) {
        return Err(MeshError::malformed("Generators include -I"));
    }
    rows.truncate(rank);
    Ok(rows)
}

/// If `pauli` or `-pauli` lies in the group whose canonical generators are
/// given, returns whether it is the negative one.
fn membership_sign(canonical: &[PauliRow], pauli: &PauliRow) -> MeshResult<Option<bool>> {
    let mut residue = pauli.clone();
    let n = pauli.num_qubits();
    for row in canonical {
        let Some(column) = (0..2 * n).find(|&c| row.bit(c)) else {
            continue;
        };
        if residue.bit(column) {
            residue.left_multiply(row)?;
        }
    }
    Ok(residue.is_identity().then_some(residue.negative))
}

/// Generator-only stabilizer tableau of one register group.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StabilizerEngine {
    generators: Vec<PauliRow>,
    num_qubits: usize,
}

impl StabilizerEngine {
    pub(crate) fn new() -> Self {
        Self { generators: Vec::new(), num_qubits: 0 }
    }

    pub(crate) fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    /// Appends |0⟩, stabilized by +Z on the new qubit.
    pub(crate) fn add_qubit(&mut self) -> MeshResult<usize> {
        for row in self.generators.iter_mut() {
            row.x.push(false);
            row.z.push(false);
        }
        self.num_qubits += 1;
        let q = self.num_qubits - 1;
        self.generators.push(PauliRow::single_z(self.num_qubits, q, false));
        Ok(q)
    }

    pub(crate) fn absorb(&mut self, other: StabilizerEngine) -> MeshResult<()> {
        let (left, right) = (self.num_qubits, other.num_qubits);
        for row in self.generators.iter_mut() {
            row.x.extend(std::iter::repeat_n(false, right));
            row.z.extend(std::iter::repeat_n(false, right));
        }
        for row in other.generators {
            let mut x = vec![false; left];
            let mut z = vec![false; left];
            x.extend(row.x);
            z.extend(row.z);
            self.generators.push(PauliRow { x, z, negative: row.negative });
        }
        self.num_qubits = left + right;
        Ok(())
    }

    pub(crate) fn apply_gate(&mut self, position: usize, gate: Gate) -> MeshResult<()> {
        check_position(self.num_qubits, position)?;
        let q = position;
        match clifford_form(gate)? {
            Gate::Identity => {}
            Gate::X => self.for_each_row(|r| r.negative ^= r.z[q]),
            Gate::Z => self.for_each_row(|r| r.negative ^= r.x[q]),
            Gate::Y => self.for_each_row(|r| r.negative ^= r.x[q] ^ r.z[q]),
            Gate::H => self.for_each_row(|r| {
                r.negative ^= r.x[q] && r.z[q];
                std::mem::swap(&mut r.x[q], &mut r.z[q]);
            }),
            Gate::S => self.for_each_row(|r| {
                r.negative ^= r.x[q] && r.z[q];
                r.z[q] ^= r.x[q];
            }),
            Gate::SDagger => self.for_each_row(|r| {
                r.negative ^= r.x[q] && !r.z[q];
                r.z[q] ^= r.x[q];
            }),
            other => {
                return Err(MeshError::UnsupportedGate {
                    message: format!("{} is not a Clifford gate", other),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn apply_controlled(&mut self, control: usize, target: usize, gate: TwoQubitGate) -> MeshResult<()> {
        check_position(self.num_qubits, control)?;
        check_position(self.num_qubits, target)?;
        if control == target {
            return Err(MeshError::invalid_operation("Control and target of a two-qubit gate cannot be the same qubit"));
        }
        match gate {
            TwoQubitGate::Cnot => {
                self.cnot(control, target);
            }
            TwoQubitGate::Cz => {
                self.apply_gate(target, Gate::H)?;
                self.cnot(control, target);
                self.apply_gate(target, Gate::H)?;
            }
        }
        Ok(())
    }

    fn cnot(&mut self, c: usize, t: usize) {
        self.for_each_row(|r| {
            let (xc, zc, xt, zt) = (r.x[c], r.z[c], r.x[t], r.z[t]);
            r.negative ^= xc && zt && !(xt ^ zc);
            r.x[t] = xt ^ xc;
            r.z[c] = zc ^ zt;
        });
    }

    fn for_each_row<F: FnMut(&mut PauliRow)>(&mut self, f: F) {
        self.generators.iter_mut().for_each(f);
    }

    /// Z-basis measurement. The group afterwards contains `(-1)^m Z_q`; the
    /// generators are rewritten so that it is the only one touching `q`, and
    /// then the qubit is dropped.
    pub(crate) fn measure<R: Rng>(&mut self, position: usize, rng: &mut R) -> MeshResult<u8> {
        check_position(self.num_qubits, position)?;
        let q = position;
        let anticommuting: Vec<usize> = (0..self.generators.len()).filter(|&i| self.generators[i].x[q]).collect();

        let outcome = if let Some((&p, rest)) = anticommuting.split_first() {
            let pivot = self.generators[p].clone();
            for &i in rest {
                self.generators[i].left_multiply(&pivot)?;
            }
            let outcome = u8::from(rng.random::<bool>());
            self.generators[p] = PauliRow::single_z(self.num_qubits, q, outcome == 1);
            outcome
        } else {
            let canonical = canonical_generators(&self.generators)?;
            let z_q = PauliRow::single_z(self.num_qubits, q, false);
            match membership_sign(&canonical, &z_q)? {
                Some(negative) => u8::from(negative),
                None => return Err(MeshError::simulation("Deterministic measurement found no matching stabilizer")),
            }
        };

        let pivot = (0..self.generators.len())
            .find(|&i| self.generators[i].z[q])
            .ok_or_else(|| MeshError::simulation("No generator acts on the measured qubit"))?;
        let pivot_row = self.generators[pivot].clone();
        for i in 0..self.generators.len() {
            if i != pivot && self.generators[i].z[q] {
                self.generators[i].left_multiply(&pivot_row)?;
            }
        }
        self.generators.remove(pivot);
        for row in self.generators.iter_mut() {
            row.x.remove(q);
            row.z.remove(q);
        }
        self.num_qubits -= 1;
        Ok(outcome)
    }

    /// Generators with columns permuted so that `order[t]` becomes qubit `t`.
    ///
    /// A strict subset of the group is described by the stabilizers supported
    /// on it alone, which exist in full only when the subset is not entangled
    /// with the rest of the group.
    pub(crate) fn read(&self, order: &[usize]) -> MeshResult<Vec<PauliRow>> {
        check_distinct(self.num_qubits, order)?;
        let rows = if order.len() == self.num_qubits { self.generators.clone() } else { self.supported_on(order)? };
        Ok(rows
            .iter()
            .map(|row| PauliRow {
                x: order.iter().map(|&p| row.x[p]).collect(),
                z: order.iter().map(|&p| row.z[p]).collect(),
                negative: row.negative,
            })
            .collect())
    }

    /// Generators of the subgroup acting as the identity outside `subset`.
    fn supported_on(&self, subset: &[usize]) -> MeshResult<Vec<PauliRow>> {
        let mut rows = self.generators.clone();
        let mut rank = 0;
        // Eliminate every X and Z column of the qubits outside the subset
        for q in (0..self.num_qubits).filter(|q| !subset.contains(q)) {
            for column in [q, self.num_qubits + q] {
                let Some(pivot) = (rank..rows.len()).find(|&r| rows[r].bit(column)) else {
                    continue;
                };
                rows.swap(rank, pivot);
                let pivot_row = rows[rank].clone();
                for (i, row) in rows.iter_mut().enumerate() {
                    if i != rank && row.bit(column) {
                        row.left_multiply(&pivot_row)?;
                    }
                }
                rank += 1;
            }
        }
        let supported = rows.split_off(rank);
        if supported.len() != subset.len() {
            return Err(entangled_subset(subset.len(), self.num_qubits));
        }
        Ok(supported)
    }
}

/// Maps phase shifts by multiples of π/2 onto their Clifford names.
fn clifford_form(gate: Gate) -> MeshResult<Gate> {
    match gate {
        Gate::PhaseShift(theta) => {
            let quarter_turns = theta / FRAC_PI_2;
            let rounded = quarter_turns.round();
            if (quarter_turns - rounded).abs() > 1e-9 {
                return Err(MeshError::UnsupportedGate {
                    message: format!("Phase shift of {:.4} rad is not a Clifford gate", theta),
                });
            }
            Ok(match (rounded as i64).rem_euclid(4) {
                0 => Gate::Identity,
                1 => Gate::S,
                2 => Gate::Z,
                _ => Gate::SDagger,
            })
        }
        other => Ok(other),
    }
}
