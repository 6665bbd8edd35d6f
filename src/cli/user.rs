//! User CLI commands

use clap::Subcommand;

use crate::display::format_user_list;
use crate::error::LedgerResult;
use crate::services::FamilyService;

use super::{emit, CliContext};

#[derive(Subcommand)]
pub enum UserCommands {
    /// Register a user
    Add {
        /// Display name
        name: String,
        /// Email address (unique)
        email: String,
    },
    /// List registered users
    List,
}

pub fn handle_user_command(ctx: &CliContext<'_>, cmd: UserCommands) -> LedgerResult<()> {
    let service = FamilyService::new(ctx.storage);

    match cmd {
        UserCommands::Add { name, email } => {
            let user = service.register_user(&name, &email)?;
            println!("Registered {} ({})", user, user.id);
        }
        UserCommands::List => {
            emit(&format_user_list(&service.list_users()?));
        }
    }

    Ok(())
}
