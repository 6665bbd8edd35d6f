//! Outbound notifications
//!
//! Budget and approval events are handed to a [`Notifier`]. Delivery is
//! best effort: [`dispatch`] logs a failed delivery and carries on, so a
//! broken channel never fails the operation that raised the event.

use std::fmt;
use std::sync::Mutex;

use crate::error::{LedgerError, LedgerResult};
use crate::models::{BudgetId, BudgetOwner, ExpenseId, FamilyId, Money, UserId};

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Spending crossed the alert threshold
    BudgetAlert {
        budget_id: BudgetId,
        owner: BudgetOwner,
        category: String,
        percent_used: f64,
        threshold: u8,
    },
    /// Spending went over the limit
    BudgetExceeded {
        budget_id: BudgetId,
        owner: BudgetOwner,
        category: String,
        spent: Money,
        limit: Money,
    },
    /// An expense is waiting for a family member's approval
    PendingApproval {
        expense_id: ExpenseId,
        family_id: Option<FamilyId>,
        user_id: UserId,
        category: String,
        amount: Money,
    },
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::BudgetAlert {
                category,
                percent_used,
                threshold,
                ..
            } => write!(
                f,
                "Budget alert: {} is at {:.1}% (threshold {}%)",
                category, percent_used, threshold
            ),
            Notification::BudgetExceeded {
                category,
                spent,
                limit,
                ..
            } => write!(
                f,
                "Budget exceeded: {} spent {} of {}",
                category, spent, limit
            ),
            Notification::PendingApproval {
                expense_id,
                category,
                amount,
                ..
            } => write!(
                f,
                "Approval needed: {} {} ({})",
                expense_id, category, amount
            ),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> LedgerResult<()>;
}

/// Send a notification, logging instead of failing if delivery breaks
pub fn dispatch(notifier: &dyn Notifier, notification: Notification) {
    if let Err(e) = notifier.notify(&notification) {
        tracing::warn!(error = %e, %notification, "notification delivery failed");
    }
}

/// Writes every notification as a `tracing` event
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> LedgerResult<()> {
        match notification {
            Notification::BudgetExceeded { budget_id, .. } => {
                tracing::warn!(budget = %budget_id, "{}", notification)
            }
            Notification::BudgetAlert { budget_id, .. } => {
                tracing::info!(budget = %budget_id, "{}", notification)
            }
            Notification::PendingApproval { expense_id, .. } => {
                tracing::info!(expense = %expense_id, "{}", notification)
            }
        }
        Ok(())
    }
}

/// Keeps notifications in memory until they are taken
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    received: Mutex<Vec<Notification>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain everything collected so far
    pub fn take(&self) -> Vec<Notification> {
        self.received
            .lock()
            .map(|mut received| std::mem::take(&mut *received))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.received.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, notification: &Notification) -> LedgerResult<()> {
        self.received
            .lock()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire notifier lock: {}", e)))?
            .push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingNotifier;

    impl Notifier for FailingNotifier {
        fn notify(&self, _: &Notification) -> LedgerResult<()> {
            Err(LedgerError::Io("channel closed".into()))
        }
    }

    fn alert() -> Notification {
        Notification::BudgetAlert {
            budget_id: BudgetId::new(),
            owner: BudgetOwner::User(UserId::new()),
            category: "Dining".into(),
            percent_used: 82.5,
            threshold: 80,
        }
    }

    #[test]
    fn test_collecting_notifier_take_drains() {
        let notifier = CollectingNotifier::new();
        dispatch(&notifier, alert());
        dispatch(&notifier, alert());

        assert_eq!(notifier.len(), 2);
        assert_eq!(notifier.take().len(), 2);
        assert!(notifier.is_empty());
    }

    #[test]
    fn test_dispatch_swallows_delivery_failure() {
        dispatch(&FailingNotifier, alert());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            alert().to_string(),
            "Budget alert: Dining is at 82.5% (threshold 80%)"
        );
    }
}
