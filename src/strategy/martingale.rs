//! Martingale stake table

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Ordered stakes indexed by consecutive loss count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MartingaleTable(Vec<Decimal>);

impl Default for MartingaleTable {
    fn default() -> Self {
        Self(vec![
            dec!(0.35),
            dec!(0.69),
            dec!(1.39),
            dec!(2.84),
            dec!(5.8),
            dec!(11.52),
            dec!(23.51),
            dec!(47.98),
        ])
    }
}

impl MartingaleTable {
    pub fn new(stakes: Vec<Decimal>) -> Self {
        Self(stakes)
    }

    /// Stake after `loss_count` consecutive losses; `None` once exhausted
    pub fn stake(&self, loss_count: usize) -> Option<Decimal> {
        self.0.get(loss_count).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn stakes(&self) -> &[Decimal] {
        &self.0
    }

    /// Index of the first non-positive stake, if any
    pub fn first_non_positive(&self) -> Option<usize> {
        self.0.iter().position(|s| *s <= Decimal::ZERO)
    }
}
