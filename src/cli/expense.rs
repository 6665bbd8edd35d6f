//! Expense CLI commands

use std::collections::HashMap;

use clap::Subcommand;

use crate::display::{format_expense_details, format_expense_list, format_summary};
use crate::error::{LedgerError, LedgerResult};
use crate::models::{ApprovalStatus, ExpenseKind, User};
use crate::services::{ExpenseFilter, ExpenseService, FamilyService, NewExpense};

use super::{emit, parse_date, parse_money, parse_split, CliContext};

#[derive(Subcommand)]
pub enum ExpenseCommands {
    /// Record an expense
    Add {
        /// Amount (e.g., "42.50")
        amount: String,
        /// Category (e.g., "Groceries")
        category: String,
        /// Date (YYYY-MM-DD or "today")
        #[arg(short, long, default_value = "today")]
        date: String,
        /// Description
        #[arg(short = 'm', long)]
        description: Option<String>,
        /// Currency the amount is in (defaults to the base currency)
        #[arg(long)]
        currency: Option<String>,
        /// Record against your family
        #[arg(long)]
        family: bool,
        /// Who paid (defaults to you)
        #[arg(long)]
        paid_by: Option<String>,
        /// Split type: full, equal or custom
        #[arg(long, default_value = "full")]
        split: String,
        /// Participants of an equal split (defaults to all family members)
        #[arg(long = "with")]
        with: Vec<String>,
        /// Custom share as user=amount; repeat for each participant
        #[arg(long = "share")]
        shares: Vec<String>,
        /// Tag; repeat for several
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Hold the expense until another member approves it
        #[arg(long)]
        needs_approval: bool,
    },
    /// List expenses
    List {
        /// Show your family's expenses instead of your own
        #[arg(long)]
        family: bool,
        /// Only this category
        #[arg(short, long)]
        category: Option<String>,
        /// From date (inclusive)
        #[arg(long)]
        from: Option<String>,
        /// To date (inclusive)
        #[arg(long)]
        to: Option<String>,
        /// Only expenses awaiting approval
        #[arg(long)]
        pending: bool,
        /// Include deleted expenses
        #[arg(long)]
        all: bool,
        /// Maximum number of expenses to show
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Show expense details
    Show {
        /// Expense id or short id
        expense: String,
        /// Also show the amount converted to this currency
        #[arg(long = "in")]
        in_currency: Option<String>,
    },
    /// Approve a pending family expense
    Approve {
        /// Expense id or short id
        expense: String,
    },
    /// Reject a pending family expense
    Reject {
        /// Expense id or short id
        expense: String,
        /// Why it was rejected
        #[arg(short, long, default_value = "")]
        reason: String,
    },
    /// Delete an expense (kept in history)
    Delete {
        /// Expense id or short id
        expense: String,
    },
    /// Mark a participant's share as paid
    Settle {
        /// Expense id or short id
        expense: String,
        /// Participant whose share is paid (defaults to you)
        #[arg(long)]
        participant: Option<String>,
    },
    /// Totals by category and payer
    Summary {
        /// Summarize your family's expenses
        #[arg(long)]
        family: bool,
        /// From date (inclusive)
        #[arg(long)]
        from: Option<String>,
        /// To date (inclusive)
        #[arg(long)]
        to: Option<String>,
    },
}

pub fn handle_expense_command(ctx: &CliContext<'_>, cmd: ExpenseCommands) -> LedgerResult<()> {
    let service = ExpenseService::new(ctx.storage, ctx.settings, ctx.notifier);
    let families = FamilyService::new(ctx.storage);
    let user = ctx.current_user()?;

    match cmd {
        ExpenseCommands::Add {
            amount,
            category,
            date,
            description,
            currency,
            family,
            paid_by,
            split,
            with,
            shares,
            tags,
            needs_approval,
        } => {
            let members = match families.family_of(user.id)? {
                Some(f) if family => families.members(f.id)?,
                _ => Vec::new(),
            };

            let mut input = NewExpense::personal(
                user.id,
                parse_money(&amount)?,
                category,
                parse_date(&date)?,
            );
            if family {
                input.kind = ExpenseKind::Family;
            }
            input.description = description.unwrap_or_default();
            input.currency = currency;
            input.paid_by = paid_by.map(|p| families.find_user(&p).map(|u| u.id)).transpose()?;
            input.split = parse_split(ctx, &split, &with, &shares, &members)?;
            input.tags = tags;
            input.requires_approval = needs_approval;

            let expense = service.create(input)?;
            println!("Recorded expense: {}", expense);
            println!("  ID: {}", expense.id);
            if expense.approval == ApprovalStatus::Pending {
                println!("  Waiting for approval from another family member");
            }
        }

        ExpenseCommands::List {
            family,
            category,
            from,
            to,
            pending,
            all,
            limit,
        } => {
            let mut filter = ExpenseFilter {
                category,
                from: from.as_deref().map(parse_date).transpose()?,
                to: to.as_deref().map(parse_date).transpose()?,
                include_deleted: all,
                ..ExpenseFilter::default()
            };
            if pending {
                filter.approval = Some(ApprovalStatus::Pending);
            }
            scope_filter(&families, &user, family, &mut filter)?;

            let expenses = service.list(&filter)?;
            let shown: Vec<_> = expenses.iter().take(limit).cloned().collect();
            emit(&format_expense_list(&shown, &ctx.settings.date_format));
            if expenses.len() > limit {
                println!("... and {} more", expenses.len() - limit);
            }
        }

        ExpenseCommands::Show {
            expense,
            in_currency,
        } => {
            let expense = service.find(&expense)?;
            emit(&format_expense_details(&expense, &ctx.settings.date_format));
            if let Some(code) = in_currency {
                let table = &ctx.settings.currency;
                let converted = table.from_base(expense.amount, &code)?;
                println!(
                    "  In {}:    {}",
                    code.trim().to_uppercase(),
                    converted.format_with_symbol(&table.symbol(&code))
                );
            }
        }

        ExpenseCommands::Approve { expense } => {
            let id = service.find(&expense)?.id;
            let expense = service.approve(id, user.id)?;
            println!("Approved: {}", expense);
        }

        ExpenseCommands::Reject { expense, reason } => {
            let id = service.find(&expense)?.id;
            let expense = service.reject(id, user.id, &reason)?;
            println!("Rejected: {}", expense);
        }

        ExpenseCommands::Delete { expense } => {
            let id = service.find(&expense)?.id;
            let expense = service.soft_delete(id, user.id)?;
            println!("Deleted: {}", expense);
        }

        ExpenseCommands::Settle {
            expense,
            participant,
        } => {
            let participant = match participant {
                Some(q) => families.find_user(&q)?,
                None => user.clone(),
            };
            let id = service.find(&expense)?.id;
            let expense = service.mark_split_paid(id, participant.id)?;
            println!(
                "{}'s share of {} is settled; {} still open",
                participant.name,
                expense.id,
                expense.split.pending_amount()
            );
        }

        ExpenseCommands::Summary { family, from, to } => {
            let mut filter = ExpenseFilter {
                from: from.as_deref().map(parse_date).transpose()?,
                to: to.as_deref().map(parse_date).transpose()?,
                ..ExpenseFilter::default()
            };
            scope_filter(&families, &user, family, &mut filter)?;

            let summary = service.summary(&filter)?;
            let names: HashMap<_, _> = families
                .list_users()?
                .into_iter()
                .map(|u| (u.id, u.name))
                .collect();
            emit(&format_summary(&summary, &names));
        }
    }

    Ok(())
}

/// Restrict a filter to the user's own expenses or to their family's
fn scope_filter(
    families: &FamilyService<'_>,
    user: &User,
    family: bool,
    filter: &mut ExpenseFilter,
) -> LedgerResult<()> {
    if family {
        let family = families.family_of(user.id)?.ok_or_else(|| {
            LedgerError::Membership(format!("{} is not in a family", user.name))
        })?;
        filter.family_id = Some(family.id);
    } else {
        filter.user_id = Some(user.id);
    }
    Ok(())
}
