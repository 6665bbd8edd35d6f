//! CLI command handlers
//!
//! Bridges clap argument parsing with the service layer. Handlers print
//! plain text and return `LedgerResult<()>`; `main` wraps them in `anyhow`.

pub mod budget;
pub mod expense;
pub mod family;
pub mod recurring;
pub mod user;

pub use budget::{handle_budget_command, BudgetCommands};
pub use expense::{handle_expense_command, ExpenseCommands};
pub use family::{handle_family_command, FamilyCommands};
pub use recurring::{handle_recurring_command, RecurringCommands};
pub use user::{handle_user_command, UserCommands};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::config::Settings;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{Money, Share, SplitConfig, SplitType, User};
use crate::notify::Notifier;
use crate::services::FamilyService;
use crate::storage::Storage;

/// Everything a handler needs besides its own arguments
pub struct CliContext<'a> {
    pub storage: &'a Storage,
    pub settings: &'a Settings,
    pub notifier: &'a dyn Notifier,
    /// `--user` / `FAMLEDGER_USER`: id, short id or email
    pub user: Option<String>,
}

impl<'a> CliContext<'a> {
    /// The acting user; with a single registered user it is implied
    pub fn current_user(&self) -> LedgerResult<User> {
        let families = FamilyService::new(self.storage);
        match &self.user {
            Some(query) => families.find_user(query),
            None => {
                let mut users = families.list_users()?;
                if users.len() == 1 {
                    Ok(users.remove(0))
                } else {
                    Err(LedgerError::Validation(
                        "No user selected; pass --user or set FAMLEDGER_USER".into(),
                    ))
                }
            }
        }
    }
}

/// Print a formatted block with exactly one trailing newline
pub(crate) fn emit(text: &str) {
    println!("{}", text.trim_end_matches('\n'));
}

pub(crate) fn parse_money(input: &str) -> LedgerResult<Money> {
    Money::parse(input).map_err(|e| LedgerError::Validation(format!("Invalid amount: {}", e)))
}

/// `YYYY-MM-DD` or `today`
pub(crate) fn parse_date(input: &str) -> LedgerResult<NaiveDate> {
    if input.trim().eq_ignore_ascii_case("today") {
        return Ok(Utc::now().date_naive());
    }
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").map_err(|_| {
        LedgerError::Validation(format!("Invalid date '{}' (expected YYYY-MM-DD)", input))
    })
}

/// RFC 3339 timestamp, or `YYYY-MM-DD` meaning midnight UTC
pub(crate) fn parse_instant(input: &str) -> LedgerResult<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(input.trim()) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = parse_date(input)?;
    Ok(Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN)))
}

/// `--as-of` if given, otherwise now
pub(crate) fn as_of_or_now(input: Option<&str>) -> LedgerResult<DateTime<Utc>> {
    input.map(parse_instant).transpose().map(|t| t.unwrap_or_else(Utc::now))
}

/// Build a split from `--split`, `--with` and `--share user=amount` options
///
/// An equal split without `--with` uses the active members of `family`.
pub(crate) fn parse_split(
    ctx: &CliContext<'_>,
    split: &str,
    with: &[String],
    shares: &[String],
    family_members: &[User],
) -> LedgerResult<SplitConfig> {
    let families = FamilyService::new(ctx.storage);

    match split.parse::<SplitType>()? {
        SplitType::Full => Ok(SplitConfig::full()),
        SplitType::Equal => {
            let users = if with.is_empty() {
                family_members.iter().map(|u| u.id).collect::<Vec<_>>()
            } else {
                with.iter()
                    .map(|q| families.find_user(q).map(|u| u.id))
                    .collect::<LedgerResult<Vec<_>>>()?
            };
            Ok(SplitConfig::equal(&users))
        }
        SplitType::Custom => {
            let shares = shares
                .iter()
                .map(|spec| -> LedgerResult<Share> {
                    let (who, amount) = spec.split_once('=').ok_or_else(|| {
                        LedgerError::Validation(format!(
                            "Invalid share '{}' (expected user=amount)",
                            spec
                        ))
                    })?;
                    Ok(Share::new(families.find_user(who)?.id, parse_money(amount)?))
                })
                .collect::<LedgerResult<Vec<_>>>()?;
            Ok(SplitConfig::custom(shares))
        }
    }
}
