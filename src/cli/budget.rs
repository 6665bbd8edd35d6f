//! Budget CLI commands

use clap::Subcommand;

use crate::display::{format_budget_details, format_budget_list};
use crate::error::{LedgerError, LedgerResult};
use crate::models::{BudgetOwner, RecurrencePattern, User};
use crate::services::{BudgetService, FamilyService, NewBudget};

use super::{as_of_or_now, emit, parse_money, CliContext};

#[derive(Subcommand)]
pub enum BudgetCommands {
    /// Create a budget for a category (replaces the active one)
    Create {
        /// Category (e.g., "Dining")
        category: String,
        /// Spending limit per window
        limit: String,
        /// Window length: daily, weekly, monthly or yearly
        #[arg(short, long)]
        period: Option<String>,
        /// Start of the first window (defaults to now)
        #[arg(long)]
        start: Option<String>,
        /// Alert when usage reaches this percentage
        #[arg(long)]
        threshold: Option<u8>,
        /// Carry unspent money into the next window
        #[arg(long)]
        rollover: bool,
        /// Budget for your family instead of yourself
        #[arg(long)]
        family: bool,
    },
    /// List active budgets
    List {
        /// Your family's budgets
        #[arg(long)]
        family: bool,
    },
    /// Show budget details
    Show {
        /// Budget id or short id
        budget: String,
    },
    /// Add spending to a budget by hand
    Apply {
        /// Budget id or short id
        budget: String,
        /// Amount to add
        amount: String,
    },
    /// Start new windows for budgets whose window has ended
    Reset {
        /// Reference time (YYYY-MM-DD or RFC 3339; defaults to now)
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Budgets ordered by how much of the limit is used
    Status {
        /// Your family's budgets
        #[arg(long)]
        family: bool,
    },
    /// Stop tracking a budget
    Deactivate {
        /// Budget id or short id
        budget: String,
    },
}

pub fn handle_budget_command(ctx: &CliContext<'_>, cmd: BudgetCommands) -> LedgerResult<()> {
    let service = BudgetService::new(ctx.storage, ctx.notifier);

    match cmd {
        BudgetCommands::Create {
            category,
            limit,
            period,
            start,
            threshold,
            rollover,
            family,
        } => {
            let owner = resolve_owner(ctx, family)?;
            let period = match period {
                Some(p) => p.parse::<RecurrencePattern>()?,
                None => ctx.settings.default_budget_period,
            };

            let budget = service.create(NewBudget {
                owner,
                category,
                limit: parse_money(&limit)?,
                period,
                start: as_of_or_now(start.as_deref())?,
                alert_threshold: threshold.unwrap_or(ctx.settings.default_alert_threshold),
                rollover,
            })?;

            println!("Created budget: {} {} per {}", budget.category, budget.limit, budget.period);
            println!("  ID: {}", budget.id);
            println!(
                "  Window: {} to {}",
                budget.window_start.format(&ctx.settings.date_format),
                budget.window_end.format(&ctx.settings.date_format)
            );
        }

        BudgetCommands::List { family } => {
            let owner = resolve_owner(ctx, family)?;
            emit(&format_budget_list(&service.list(&owner)?));
        }

        BudgetCommands::Show { budget } => {
            emit(&format_budget_details(&service.find(&budget)?, &ctx.settings.date_format));
        }

        BudgetCommands::Apply { budget, amount } => {
            let id = service.find(&budget)?.id;
            let applied = service.apply_expense(id, parse_money(&amount)?)?;
            println!(
                "{}: {} of {} spent ({:.1}%)",
                applied.budget.category,
                applied.budget.spent,
                applied.budget.limit,
                applied.budget.percent_used()
            );
        }

        BudgetCommands::Reset { as_of } => {
            let report = service.reset_due(as_of_or_now(as_of.as_deref())?)?;
            println!("Reset {} budget(s).", report.reset.len());
            for budget in &report.reset {
                println!(
                    "  {} {}: limit {} from {}",
                    budget.id,
                    budget.category,
                    budget.limit,
                    budget.window_start.format(&ctx.settings.date_format)
                );
            }
            for id in &report.skipped {
                println!("  {} skipped (changed concurrently)", id);
            }
            for (id, error) in &report.failed {
                println!("  {} failed: {}", id, error);
            }
        }

        BudgetCommands::Status { family } => {
            let owner = resolve_owner(ctx, family)?;
            emit(&format_budget_list(&service.utilization(&owner)?));
        }

        BudgetCommands::Deactivate { budget } => {
            let id = service.find(&budget)?.id;
            let budget = service.deactivate(id)?;
            println!("Deactivated budget {} ({})", budget.id, budget.category);
        }
    }

    Ok(())
}

fn resolve_owner(ctx: &CliContext<'_>, family: bool) -> LedgerResult<BudgetOwner> {
    let user = ctx.current_user()?;
    if !family {
        return Ok(BudgetOwner::User(user.id));
    }
    family_owner(&FamilyService::new(ctx.storage), &user)
}

fn family_owner(families: &FamilyService<'_>, user: &User) -> LedgerResult<BudgetOwner> {
    families
        .family_of(user.id)?
        .map(|f| BudgetOwner::Family(f.id))
        .ok_or_else(|| LedgerError::Membership(format!("{} is not in a family", user.name)))
}
