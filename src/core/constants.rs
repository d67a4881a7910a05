//! Numerical constants shared by the engines and the verifier.

/// Tolerances and defaults used when no configuration overrides them.
pub mod mesh_constants {
    /// Element-wise tolerance for amplitude-vector verification.
    pub const AMPLITUDE_TOLERANCE: f64 = 1e-6;
    /// Element-wise tolerance for density-matrix verification. `0.0` means exact.
    pub const DENSITY_TOLERANCE: f64 = 1e-9;
    /// Below this squared norm an amplitude or probability is treated as zero.
    pub const NEGLIGIBLE: f64 = 1e-12;
    /// Largest residual norm for which a subset of a pure register group still
    /// counts as a product factor of it.
    pub const SEPARABLE_TOLERANCE: f64 = 1e-9;
    /// Default cap on the qubits of one amplitude-vector register group.
    pub const MAX_AMPLITUDE_QUBITS: usize = 24;
    /// Default cap on the qubits of one density-matrix register group.
    pub const MAX_DENSITY_QUBITS: usize = 12;
    /// Default cap on the qubits of one stabilizer register group.
    pub const MAX_STABILIZER_QUBITS: usize = 4096;
    /// Acknowledgement returned by the liveness check.
    pub const TEST_ACK: &str = "Tested!";
    /// Default deadline for a single remote call, in milliseconds.
    pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 5_000;
    /// Default deadline for reaching a peer during setup, in milliseconds.
    pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
}
