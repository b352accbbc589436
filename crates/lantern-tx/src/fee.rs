use lantern_core::{Balance, FEE_BASE, FEE_PER_OUTPUT};

/// Fee predicate: deterministic in the intent shape.
///
/// The exact formula belongs to the ledger; builders depend only on this
/// seam so the formula can change without touching the assembly pipeline.
pub trait FeePolicy: Send + Sync {
    fn fee(&self, inputs: usize, outputs: usize) -> Balance;
}

/// Constant base plus a per-output increment.
///
/// The fee is charged in the transferred token and covered by the same
/// reservation as the payment. Deployed networks currently charge no fee
/// on unshielded transfers, so the default is zero; the policy keeps the
/// builder fee-ready.
#[derive(Clone, Copy, Debug)]
pub struct FlatFee {
    pub base: Balance,
    pub per_output: Balance,
}

impl Default for FlatFee {
    fn default() -> Self {
        Self {
            base: FEE_BASE,
            per_output: FEE_PER_OUTPUT,
        }
    }
}

impl FeePolicy for FlatFee {
    fn fee(&self, _inputs: usize, outputs: usize) -> Balance {
        self.base + self.per_output * outputs as Balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_fee_is_deterministic_in_shape() {
        let policy = FlatFee {
            base: 10,
            per_output: 3,
        };
        assert_eq!(policy.fee(1, 2), 16);
        assert_eq!(policy.fee(5, 2), 16);
    }

    #[test]
    fn deployed_default_is_zero() {
        assert_eq!(FlatFee::default().fee(4, 2), 0);
    }
}
