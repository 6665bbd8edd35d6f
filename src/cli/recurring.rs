//! Recurring expense CLI commands

use clap::Subcommand;

use crate::display::{format_outcomes, format_stats, format_template_list, format_upcoming};
use crate::error::{LedgerError, LedgerResult};
use crate::models::{ExpenseKind, RecurrencePattern};
use crate::services::{FamilyService, NewRecurring, RecurringChanges, RecurringService};

use super::{as_of_or_now, emit, parse_instant, parse_money, parse_split, CliContext};

#[derive(Subcommand)]
pub enum RecurringCommands {
    /// Create a recurring expense
    Add {
        /// Amount per occurrence
        amount: String,
        /// Category (e.g., "Rent")
        category: String,
        /// Cadence: daily, weekly, monthly or yearly
        pattern: String,
        /// First occurrence (YYYY-MM-DD or RFC 3339; defaults to now)
        #[arg(long)]
        start: Option<String>,
        /// No occurrences after this time
        #[arg(long)]
        end: Option<String>,
        /// Stop after this many occurrences
        #[arg(long)]
        max: Option<u32>,
        /// Description
        #[arg(short = 'm', long)]
        description: Option<String>,
        /// Record occurrences against your family
        #[arg(long)]
        family: bool,
        /// Who pays (defaults to you)
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
        /// Family occurrences wait for approval
        #[arg(long)]
        needs_approval: bool,
    },
    /// List your recurring expenses
    List,
    /// Show templates due for processing
    Due {
        /// Reference time (defaults to now)
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Create expenses for every due template
    Process {
        /// Reference time (defaults to now)
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Occurrences coming up in the next few days
    Preview {
        /// Horizon in days (defaults to the configured preview window)
        #[arg(short, long)]
        days: Option<u32>,
        /// Reference time (defaults to now)
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Active and paused templates with monthly totals
    Stats,
    /// Edit a template; already created expenses are unchanged
    Update {
        /// Template id or short id
        template: String,
        /// New amount
        #[arg(long)]
        amount: Option<String>,
        /// New category
        #[arg(long)]
        category: Option<String>,
        /// New description
        #[arg(short = 'm', long)]
        description: Option<String>,
        /// New cadence
        #[arg(long)]
        pattern: Option<String>,
        /// New end time
        #[arg(long, conflicts_with = "no_end")]
        end: Option<String>,
        /// Remove the end time
        #[arg(long)]
        no_end: bool,
        /// New occurrence limit
        #[arg(long, conflicts_with = "no_max")]
        max: Option<u32>,
        /// Remove the occurrence limit
        #[arg(long)]
        no_max: bool,
        /// Whether occurrences are approved automatically
        #[arg(long)]
        auto_approve: Option<bool>,
    },
    /// Pause a template
    Deactivate {
        /// Template id or short id
        template: String,
    },
    /// Resume a paused template
    Activate {
        /// Template id or short id
        template: String,
    },
}

pub fn handle_recurring_command(ctx: &CliContext<'_>, cmd: RecurringCommands) -> LedgerResult<()> {
    let service = RecurringService::new(ctx.storage, ctx.notifier);
    let date_format = ctx.settings.date_format.as_str();

    match cmd {
        RecurringCommands::Add {
            amount,
            category,
            pattern,
            start,
            end,
            max,
            description,
            family,
            paid_by,
            split,
            with,
            shares,
            needs_approval,
        } => {
            let user = ctx.current_user()?;
            let families = FamilyService::new(ctx.storage);
            let members = match families.family_of(user.id)? {
                Some(f) if family => families.members(f.id)?,
                _ => Vec::new(),
            };

            let mut input = NewRecurring::personal(
                user.id,
                parse_money(&amount)?,
                category,
                pattern.parse::<RecurrencePattern>()?,
                as_of_or_now(start.as_deref())?,
            );
            if family {
                input.kind = ExpenseKind::Family;
            } else if needs_approval {
                return Err(LedgerError::Validation(
                    "Only family recurring expenses can require approval".into(),
                ));
            }
            input.end_date = end.as_deref().map(parse_instant).transpose()?;
            input.max_occurrences = max;
            input.description = description.unwrap_or_default();
            input.paid_by = paid_by.map(|p| families.find_user(&p).map(|u| u.id)).transpose()?;
            input.split = parse_split(ctx, &split, &with, &shares, &members)?;
            input.auto_approve = !needs_approval;

            let template = service.create(input)?;
            println!(
                "Created recurring expense: {} {} {}",
                template.category, template.amount, template.pattern
            );
            println!("  ID: {}", template.id);
            println!(
                "  First occurrence: {}",
                template.next_occurrence.format(&format!("{} %H:%M", date_format))
            );
        }

        RecurringCommands::List => {
            let user = ctx.current_user()?;
            emit(&format_template_list(&service.list(user.id)?, date_format));
        }

        RecurringCommands::Due { as_of } => {
            let due = service.find_due(as_of_or_now(as_of.as_deref())?)?;
            emit(&format_template_list(&due, date_format));
        }

        RecurringCommands::Process { as_of } => {
            let outcomes = service.process_due(as_of_or_now(as_of.as_deref())?)?;
            emit(&format_outcomes(&outcomes, date_format));
        }

        RecurringCommands::Preview { days, as_of } => {
            let user = ctx.current_user()?;
            let upcoming = service.preview_upcoming(
                user.id,
                days.unwrap_or(ctx.settings.preview_days),
                as_of_or_now(as_of.as_deref())?,
            )?;
            emit(&format_upcoming(&upcoming, date_format));
        }

        RecurringCommands::Stats => {
            let user = ctx.current_user()?;
            emit(&format_stats(&service.statistics(user.id)?));
        }

        RecurringCommands::Update {
            template,
            amount,
            category,
            description,
            pattern,
            end,
            no_end,
            max,
            no_max,
            auto_approve,
        } => {
            let id = service.find(&template)?.id;
            let changes = RecurringChanges {
                amount: amount.as_deref().map(parse_money).transpose()?,
                category,
                description,
                pattern: pattern.map(|p| p.parse::<RecurrencePattern>()).transpose()?,
                end_date: if no_end {
                    Some(None)
                } else {
                    end.as_deref().map(parse_instant).transpose()?.map(Some)
                },
                max_occurrences: if no_max { Some(None) } else { max.map(Some) },
                split: None,
                auto_approve,
            };

            let template = service.update(id, changes)?;
            println!("Updated recurring expense {}", template.id);
            if !template.is_active {
                println!("  It has reached its end and is now inactive");
            }
        }

        RecurringCommands::Deactivate { template } => {
            let id = service.find(&template)?.id;
            let template = service.deactivate(id)?;
            println!("Paused {} ({})", template.id, template.category);
        }

        RecurringCommands::Activate { template } => {
            let id = service.find(&template)?.id;
            let template = service.activate(id)?;
            println!(
                "Resumed {} ({}); next occurrence {}",
                template.id,
                template.category,
                template.next_occurrence.format(date_format)
            );
        }
    }

    Ok(())
}
