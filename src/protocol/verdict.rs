// src/protocol/verdict.rs

use super::merge::{MergeFailure, MergeOutcome, MergeStep};
use crate::core::MeshError;
use crate::validation::Verifier;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Final judgement of one merge run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Verdict {
    Pass,
    Mismatch,
    Aborted { step: MergeStep, error: MeshError },
}

impl Verdict {
    /// Feeds a completed merge to `verifier`; an aborted merge never reaches it.
    pub fn judge(merge: Result<MergeOutcome, MergeFailure>, verifier: &Verifier) -> Self {
        match merge {
            Err(MergeFailure { step, error }) => Verdict::Aborted { step, error },
            Ok(outcome) => match verifier.verify(&outcome.joint) {
                Ok(true) => Verdict::Pass,
                Ok(false) => Verdict::Mismatch,
                Err(error) => Verdict::Aborted { step: MergeStep::Verify, error },
            },
        }
    }

    pub fn passed(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    /// The single line a node prints for the run; abort and mismatch both read `fail`.
    pub fn report_line(&self, from: &str, to: &str) -> String {
        format!("Testing register merge: {} to {}............{}", from, to, if self.passed() { "ok" } else { "fail" })
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "pass"),
            Verdict::Mismatch => write!(f, "mismatch"),
            Verdict::Aborted { step, error } => write!(f, "aborted at {}: {}", step, error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Backend, JointState, QubitRef, RegisterId, RemoteQubitRef};
    use std::f64::consts::FRAC_1_SQRT_2;

    fn outcome(joint: JointState) -> MergeOutcome {
        let q = |i| RemoteQubitRef::new("Bob", QubitRef::new(RegisterId(0), i));
        MergeOutcome { peer_half: q(0), fresh: q(1), joint }
    }

    #[test]
    fn report_line_format() {
        assert_eq!(Verdict::Pass.report_line("Alice", "Bob"), "Testing register merge: Alice to Bob............ok");
        assert_eq!(Verdict::Mismatch.report_line("Alice", "Bob"), "Testing register merge: Alice to Bob............fail");
    }

    #[test]
    fn aborted_merge_skips_the_verifier() {
        let failure = MergeFailure { step: MergeStep::Cnot, error: MeshError::NotReady { message: "x".into() } };
        let verdict = Verdict::judge(Err(failure), &Verifier::new(Backend::DensityMatrix));
        assert!(matches!(verdict, Verdict::Aborted { step: MergeStep::Cnot, .. }));
        assert!(verdict.report_line("Alice", "Bob").ends_with("fail"));
    }

    #[test]
    fn verifier_errors_abort_at_verify() {
        let joint = JointState::AmplitudeVector { real: vec![FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2], imag: vec![0.0; 4] };
        let verdict = Verdict::judge(Ok(outcome(joint.clone())), &Verifier::new(Backend::DensityMatrix));
        assert!(matches!(verdict, Verdict::Aborted { step: MergeStep::Verify, .. }));
        assert_eq!(Verdict::judge(Ok(outcome(joint)), &Verifier::new(Backend::AmplitudeVector)), Verdict::Pass);
    }
}
