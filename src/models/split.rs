//! Expense split configuration
//!
//! Describes how the cost of an expense is divided between family members.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ids::UserId;
use super::money::Money;
use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SplitType {
    /// Every share gets the same amount
    Equal,
    /// Shares carry explicit amounts
    Custom,
    /// The payer covers the whole amount
    #[default]
    Full,
}

impl fmt::Display for SplitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => write!(f, "equal"),
            Self::Custom => write!(f, "custom"),
            Self::Full => write!(f, "full"),
        }
    }
}

impl FromStr for SplitType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "equal" => Ok(Self::Equal),
            "custom" => Ok(Self::Custom),
            "full" => Ok(Self::Full),
            other => Err(LedgerError::Validation(format!(
                "Unknown split type '{}': expected equal, custom or full",
                other
            ))),
        }
    }
}

/// One counterparty's portion of an expense
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub user_id: UserId,
    pub amount: Money,
    #[serde(default)]
    pub is_paid: bool,
}

impl Share {
    pub fn new(user_id: UserId, amount: Money) -> Self {
        Self {
            user_id,
            amount,
            is_paid: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SplitConfig {
    #[serde(default)]
    pub split_type: SplitType,
    #[serde(default)]
    pub shares: Vec<Share>,
}

impl SplitConfig {
    /// The payer covers everything
    pub fn full() -> Self {
        Self::default()
    }

    /// Equal split between the given users
    pub fn equal(users: &[UserId]) -> Self {
        Self {
            split_type: SplitType::Equal,
            shares: users.iter().map(|u| Share::new(*u, Money::zero())).collect(),
        }
    }

    pub fn custom(shares: Vec<Share>) -> Self {
        Self {
            split_type: SplitType::Custom,
            shares,
        }
    }

    /// Validate against `total` and return the config with final share amounts
    pub fn normalized(&self, total: Money) -> Result<SplitConfig, LedgerError> {
        if self.shares.iter().any(|s| s.amount.is_negative()) {
            return Err(LedgerError::Validation(
                "Split shares cannot be negative".into(),
            ));
        }

        match self.split_type {
            SplitType::Full => {
                if !self.shares.is_empty() {
                    self.check_sum(total)?;
                }
                Ok(self.clone())
            }
            SplitType::Equal => {
                if self.shares.is_empty() {
                    return Err(LedgerError::Validation(
                        "An equal split needs at least one participant".into(),
                    ));
                }
                let amounts = total.split_evenly(self.shares.len());
                let shares = self
                    .shares
                    .iter()
                    .zip(amounts)
                    .map(|(share, amount)| Share {
                        amount,
                        ..share.clone()
                    })
                    .collect();
                Ok(SplitConfig {
                    split_type: SplitType::Equal,
                    shares,
                })
            }
            SplitType::Custom => {
                if self.shares.is_empty() {
                    return Err(LedgerError::Validation(
                        "A custom split needs at least one share".into(),
                    ));
                }
                self.check_sum(total)?;
                Ok(self.clone())
            }
        }
    }

    fn check_sum(&self, total: Money) -> Result<(), LedgerError> {
        let sum: Money = self.shares.iter().map(|s| s.amount).sum();
        if sum != total {
            return Err(LedgerError::Validation(format!(
                "Split amounts ({}) must equal the total amount ({})",
                sum, total
            )));
        }
        Ok(())
    }

    /// Sum of shares not yet settled
    pub fn pending_amount(&self) -> Money {
        self.shares
            .iter()
            .filter(|s| !s.is_paid)
            .map(|s| s.amount)
            .sum()
    }

    /// Mark a participant's share as paid; false if they have no share
    pub fn mark_paid(&mut self, user_id: UserId) -> bool {
        match self.shares.iter_mut().find(|s| s.user_id == user_id) {
            Some(share) => {
                share.is_paid = true;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_split_without_shares() {
        let split = SplitConfig::full().normalized(Money::from_cents(500)).unwrap();
        assert_eq!(split.split_type, SplitType::Full);
        assert!(split.shares.is_empty());
    }

    #[test]
    fn test_equal_split_distributes_remainder() {
        let users = [UserId::new(), UserId::new(), UserId::new()];
        let split = SplitConfig::equal(&users)
            .normalized(Money::from_cents(10000))
            .unwrap();

        let amounts: Vec<i64> = split.shares.iter().map(|s| s.amount.cents()).collect();
        assert_eq!(amounts, vec![3334, 3333, 3333]);
        assert_eq!(split.shares[0].user_id, users[0]);
    }

    #[test]
    fn test_custom_split_must_sum_to_total() {
        let a = UserId::new();
        let b = UserId::new();
        let split = SplitConfig::custom(vec![
            Share::new(a, Money::from_cents(700)),
            Share::new(b, Money::from_cents(200)),
        ]);

        let err = split.normalized(Money::from_cents(1000)).unwrap_err();
        assert!(err.is_validation());
        assert!(split.normalized(Money::from_cents(900)).is_ok());
    }

    #[test]
    fn test_empty_equal_split_rejected() {
        let split = SplitConfig {
            split_type: SplitType::Equal,
            shares: vec![],
        };
        assert!(split.normalized(Money::from_cents(100)).is_err());
    }

    #[test]
    fn test_mark_paid_and_pending() {
        let a = UserId::new();
        let b = UserId::new();
        let mut split = SplitConfig::custom(vec![
            Share::new(a, Money::from_cents(300)),
            Share::new(b, Money::from_cents(200)),
        ]);

        assert_eq!(split.pending_amount().cents(), 500);
        assert!(split.mark_paid(a));
        assert_eq!(split.pending_amount().cents(), 200);
        assert!(!split.mark_paid(UserId::new()));
    }
}
