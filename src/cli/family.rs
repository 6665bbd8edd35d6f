//! Family CLI commands

use clap::Subcommand;

use crate::display::format_family;
use crate::error::{LedgerError, LedgerResult};
use crate::services::FamilyService;

use super::{emit, CliContext};

#[derive(Subcommand)]
pub enum FamilyCommands {
    /// Create a family and become its first member
    Create {
        /// Family name
        name: String,
    },
    /// Join a family with its invite code
    Join {
        /// Eight-character invite code
        code: String,
    },
    /// Leave your current family
    Leave,
    /// Show your family and its members
    Show,
}

pub fn handle_family_command(ctx: &CliContext<'_>, cmd: FamilyCommands) -> LedgerResult<()> {
    let service = FamilyService::new(ctx.storage);
    let user = ctx.current_user()?;

    match cmd {
        FamilyCommands::Create { name } => {
            let family = service.create_family(&name, user.id)?;
            println!("Created family '{}' ({})", family.name, family.id);
            println!("  Invite code: {}", family.invite_code);
        }
        FamilyCommands::Join { code } => {
            let family = service.join_family(&code, user.id)?;
            println!("{} joined '{}'", user.name, family.name);
        }
        FamilyCommands::Leave => {
            let family = service.leave_family(user.id)?;
            println!("{} left '{}'", user.name, family.name);
        }
        FamilyCommands::Show => {
            let family = service.family_of(user.id)?.ok_or_else(|| {
                LedgerError::Membership(format!("{} is not in a family", user.name))
            })?;
            let members = service.members(family.id)?;
            emit(&format_family(&family, &members));
        }
    }

    Ok(())
}
