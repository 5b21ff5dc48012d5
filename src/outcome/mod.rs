//! Verdict → on-chain outcome policy.
//!
//! This is the one place where an UNDETERMINED verdict gets an explicit
//! meaning. The default is to withhold settlement entirely: a market is
//! never settled on a side the classifier did not actually pick.

use crate::classify::Verdict;
use alloy::primitives::U256;

/// What to do with an UNDETERMINED verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndeterminedPolicy {
    /// Produce no transaction this round.
    Withhold,
    /// Settle with a reserved token id the contract is expected to reject or hold.
    Reserved(U256),
}

/// The contract-level result of mapping a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeCode {
    /// Settle with this winning token id.
    Settle(U256),
    /// Do not settle.
    Withhold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutcomePolicy {
    pub yes: U256,
    pub no: U256,
    pub undetermined: UndeterminedPolicy,
}

impl Default for OutcomePolicy {
    fn default() -> Self {
        Self {
            yes: U256::from(1),
            no: U256::from(2),
            undetermined: UndeterminedPolicy::Withhold,
        }
    }
}

impl OutcomePolicy {
    pub fn map(&self, verdict: Verdict) -> OutcomeCode {
        match verdict {
            Verdict::Yes => OutcomeCode::Settle(self.yes),
            Verdict::No => OutcomeCode::Settle(self.no),
            Verdict::Undetermined => match self.undetermined {
                UndeterminedPolicy::Withhold => OutcomeCode::Withhold,
                UndeterminedPolicy::Reserved(code) => OutcomeCode::Settle(code),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Verdict; 3] = [Verdict::Yes, Verdict::No, Verdict::Undetermined];

    #[test]
    fn test_default_policy_withholds_undetermined() {
        let policy = OutcomePolicy::default();
        assert_eq!(policy.map(Verdict::Yes), OutcomeCode::Settle(U256::from(1)));
        assert_eq!(policy.map(Verdict::No), OutcomeCode::Settle(U256::from(2)));
        assert_eq!(policy.map(Verdict::Undetermined), OutcomeCode::Withhold);
    }

    #[test]
    fn test_every_verdict_maps_to_distinct_code() {
        let policy = OutcomePolicy {
            yes: U256::from(7),
            no: U256::from(8),
            undetermined: UndeterminedPolicy::Reserved(U256::ZERO),
        };
        let codes: Vec<OutcomeCode> = ALL.iter().map(|v| policy.map(*v)).collect();
        assert_eq!(codes.len(), 3);
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_undetermined_never_maps_to_a_side() {
        for undetermined in [
            UndeterminedPolicy::Withhold,
            UndeterminedPolicy::Reserved(U256::from(99)),
        ] {
            let policy = OutcomePolicy {
                undetermined,
                ..OutcomePolicy::default()
            };
            let code = policy.map(Verdict::Undetermined);
            assert_ne!(code, policy.map(Verdict::Yes));
            assert_ne!(code, policy.map(Verdict::No));
        }
    }
}
