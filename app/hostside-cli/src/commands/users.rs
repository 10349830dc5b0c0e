//! User and profile management commands.

use super::{OutputFormat, Session, print_json};
use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use hostside_core::{ContextKind, UserContextManager, UserInfo};

/// User subcommands.
#[derive(Subcommand)]
pub enum UserCommands {
    /// List users on the device
    #[command(name = "list", alias = "ls")]
    List,
    /// Create a user or profile
    Create(CreateArgs),
    /// Start a user
    Start(UserArgs),
    /// Stop and remove a user
    #[command(alias = "rm")]
    Remove(UserArgs),
}

#[derive(Args)]
pub struct CreateArgs {
    /// Create a guest user
    #[arg(long, conflicts_with = "profile_of")]
    pub guest: bool,
    /// Create a managed profile of this user
    #[arg(long, value_name = "USER_ID")]
    pub profile_of: Option<u32>,
    /// Start the user after creating it
    #[arg(long)]
    pub start: bool,
}

impl CreateArgs {
    fn kind(&self) -> ContextKind {
        match (self.guest, self.profile_of) {
            (_, Some(parent)) => ContextKind::ManagedProfile { parent },
            (true, None) => ContextKind::Guest,
            (false, None) => ContextKind::Secondary,
        }
    }
}

#[derive(Args)]
pub struct UserArgs {
    /// User id
    pub id: u32,
}

/// Executes the user command.
pub async fn execute(session: &Session, cmd: UserCommands) -> Result<()> {
    let mut contexts = UserContextManager::new(session.channel.clone());
    match cmd {
        UserCommands::List => execute_list(session, &contexts).await,
        UserCommands::Create(args) => execute_create(session, &mut contexts, &args).await,
        UserCommands::Start(args) => {
            let mut context = contexts.adopt(args.id).await?;
            contexts
                .start(&mut context)
                .await
                .with_context(|| format!("Failed to start user {}", args.id))?;
            println!("User {} started", args.id);
            Ok(())
        }
        UserCommands::Remove(args) => {
            let mut context = contexts.adopt(args.id).await?;
            contexts
                .remove(&mut context)
                .await
                .with_context(|| format!("Failed to remove user {}", args.id))?;
            println!("User {} removed", args.id);
            Ok(())
        }
    }
}

async fn execute_list(session: &Session, contexts: &UserContextManager) -> Result<()> {
    let users = contexts.list_users().await.context("Failed to list users")?;
    match session.format {
        OutputFormat::Json => print_json(&users)?,
        OutputFormat::Quiet => {
            for user in &users {
                println!("{}", user.id);
            }
        }
        OutputFormat::Table => {
            println!("{:<6} {:<24} {:<16} {:<8}", "ID", "NAME", "TYPE", "RUNNING");
            for user in &users {
                println!(
                    "{:<6} {:<24} {:<16} {:<8}",
                    user.id,
                    user.name,
                    user_type(user),
                    if user.running { "yes" } else { "no" }
                );
            }
        }
    }
    Ok(())
}

async fn execute_create(
    session: &Session,
    contexts: &mut UserContextManager,
    args: &CreateArgs,
) -> Result<()> {
    let kind = args.kind();
    let mut context = contexts.create(kind).await?;
    if args.start {
        if let Err(e) = contexts.start(&mut context).await {
            // Do not leave a half-provisioned user behind.
            contexts.remove_all().await;
            bail!("Failed to start user {}: {e}", context.id);
        }
    }

    match session.format {
        OutputFormat::Json => print_json(&context)?,
        OutputFormat::Quiet => println!("{}", context.id),
        OutputFormat::Table => {
            println!("Created {kind} user {} ({})", context.id, context.name);
            println!("  Serial: {}", context.serial);
            println!("  State:  {}", context.state());
        }
    }
    Ok(())
}

fn user_type(user: &UserInfo) -> &'static str {
    if user.is_primary() {
        "primary"
    } else if user.is_managed_profile() {
        "managed profile"
    } else if user.is_guest() {
        "guest"
    } else {
        "secondary"
    }
}
