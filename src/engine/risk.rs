//! Risk gate.
//!
//! Validates balance and position-count limits before the orchestrator
//! may open a bracket. A refusal is a normal, expected outcome carried
//! as a value — not an error — and is logged by the caller.

use rust_decimal::Decimal;
use std::fmt;

use crate::config::RiskConfig;

/// Why the gate refused an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refusal {
    InsufficientBalance {
        available: Decimal,
        required: Decimal,
    },
    PositionLimitReached {
        open: usize,
        max: usize,
    },
}

impl fmt::Display for Refusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Refusal::InsufficientBalance {
                available,
                required,
            } => write!(
                f,
                "insufficient balance: have ${available}, need ${required}"
            ),
            Refusal::PositionLimitReached { open, max } => {
                write!(f, "position limit reached: {open} open of {max} allowed")
            }
        }
    }
}

/// Pre-entry checks: position-count cap and balance floor.
pub struct RiskGate {
    config: RiskConfig,
}

impl RiskGate {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Quote-currency balance an entry must be covered by: the trade
    /// amount plus the fee/slippage buffer.
    pub fn required_balance(&self) -> Decimal {
        self.config.trade_amount_usd * (Decimal::ONE + self.config.fee_buffer_pct)
    }

    /// Evaluate both limits. The caller must hold the engine state lock
    /// so the count it passes cannot change before the position is
    /// created.
    pub fn can_open(&self, open_positions: usize, balance: Decimal) -> Result<(), Refusal> {
        if open_positions >= self.config.max_concurrent_positions {
            return Err(Refusal::PositionLimitReached {
                open: open_positions,
                max: self.config.max_concurrent_positions,
            });
        }

        let required = self.required_balance();
        if balance < required {
            return Err(Refusal::InsufficientBalance {
                available: balance,
                required,
            });
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
