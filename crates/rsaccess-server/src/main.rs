//! rsaccess command-line tool.
//!
//! # Usage
//!
//! ```bash
//! # Resource ids
//! rsaccess encode 1000 --prefix doc
//! rsaccess parse doc-2f7ce362
//!
//! # Against a SQLite store
//! RSACCESS_STORAGE__BACKEND=sqlite \
//! RSACCESS_STORAGE__DATABASE_URL=sqlite://access.db \
//!     rsaccess check read alice doc-2f7ce362
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use rsaccess_domain::{resource_id, Domain, NewNode, NodeKind};
use rsaccess_server::observability::{init_logging, LoggingConfig};
use rsaccess_server::{AccessService, ServerConfig};
use rsaccess_storage::{AccessStore, MemoryAccessStore, SqliteAccessStore};

/// rsaccess - group/permission hierarchies and access checks
#[derive(Parser, Debug)]
#[command(name = "rsaccess")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode an integer id as a resource id
    Encode {
        id: i64,
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Decode a resource id back to its integer id
    Decode {
        value: String,
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Split a prefixed resource id into type and id
    Parse { value: String },
    /// Check whether a user holds a permission
    Check {
        permission: String,
        user: String,
        /// Prefixed resource id
        resource: Option<String>,
    },
    /// Grant a permission to a group, optionally on a target group
    Grant {
        permission: String,
        group: String,
        target: Option<String>,
    },
    /// Revoke a grant
    Revoke {
        permission: String,
        group: String,
        target: Option<String>,
    },
    /// Group operations
    #[command(subcommand)]
    Group(NodeCommand),
    /// Permission operations
    #[command(subcommand)]
    Permission(NodeCommand),
    /// User operations
    #[command(subcommand)]
    User(UserCommand),
    /// List grants, or only those made on one permission
    Grants {
        #[arg(long)]
        permission: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum NodeCommand {
    Create {
        name: String,
        #[arg(long)]
        title: Option<String>,
        /// `any` (resource scoped) or `none`
        #[arg(long, default_value = "any")]
        domain: Domain,
    },
    Delete { node: String },
    AddChild { parent: String, child: String },
    RemoveChild { parent: String, child: String },
    List,
    /// Add a user or a resource id to a group
    AddMember { group: String, member: String },
    RemoveMember { group: String, member: String },
    Members { group: String },
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    Create { username: String },
    Delete { user: String },
    List,
    /// Permissions the user holds, optionally on a resource
    Permissions {
        user: String,
        resource: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // The codec commands need neither config nor a store.
    match &args.command {
        Command::Encode { id, prefix } => {
            println!("{}", resource_id::encode(*id, prefix.as_deref())?);
            return Ok(());
        }
        Command::Decode { value, prefix } => {
            println!("{}", resource_id::decode(value, prefix.as_deref())?);
            return Ok(());
        }
        Command::Parse { value } => {
            let (resource_type, id) = resource_id::parse(value)?;
            println!("{resource_type} {id}");
            return Ok(());
        }
        _ => {}
    }

    let config = ServerConfig::load_or_env(args.config.as_deref())?;
    init_logging(LoggingConfig::from_settings(&config.logging));

    match config.storage.backend.as_str() {
        "memory" => {
            info!("Using in-memory storage backend");
            let store =
                MemoryAccessStore::with_universal_group(&config.access.universal_group)?;
            run(AccessService::new(Arc::new(store)), args.command).await
        }
        "sqlite" => {
            info!("Connecting to SQLite database");
            let store = SqliteAccessStore::from_config(&config.sqlite_config()).await?;
            info!("Running database migrations");
            store.run_migrations().await?;
            run(AccessService::new(Arc::new(store)), args.command).await
        }
        other => anyhow::bail!("unsupported storage backend: {other}"),
    }
}

async fn run<S: AccessStore>(service: AccessService<S>, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Encode { .. } | Command::Decode { .. } | Command::Parse { .. } => {}
        Command::Check {
            permission,
            user,
            resource,
        } => {
            let allowed = service
                .check(&permission, &user, resource.as_deref())
                .await?;
            println!("{}", if allowed { "allowed" } else { "denied" });
        }
        Command::Grant {
            permission,
            group,
            target,
        } => {
            let added = service.grant(&permission, &group, target.as_deref()).await?;
            println!("{}", if added { "granted" } else { "already granted" });
        }
        Command::Revoke {
            permission,
            group,
            target,
        } => {
            let removed = service.revoke(&permission, &group, target.as_deref()).await?;
            println!("{}", if removed { "revoked" } else { "not granted" });
        }
        Command::Group(command) => run_node(&service, NodeKind::Group, command).await?,
        Command::Permission(command) => {
            run_node(&service, NodeKind::Permission, command).await?
        }
        Command::User(command) => run_user(&service, command).await?,
        Command::Grants { permission } => {
            let grants = match permission {
                Some(permission) => service.grants_for_permission(&permission).await?,
                None => service.list_grants().await?,
            };
            for grant in grants {
                match grant.target {
                    Some(target) => {
                        println!("{} {} {}", grant.permission, grant.grantee, target)
                    }
                    None => println!("{} {}", grant.permission, grant.grantee),
                }
            }
        }
    }
    Ok(())
}

async fn run_node<S: AccessStore>(
    service: &AccessService<S>,
    kind: NodeKind,
    command: NodeCommand,
) -> anyhow::Result<()> {
    match command {
        NodeCommand::Create {
            name,
            title,
            domain,
        } => {
            let mut fields = NewNode::named(name).with_domain(domain);
            if let Some(title) = title {
                fields = fields.with_title(title);
            }
            let node = service.create_node(kind, fields).await?;
            println!("{}", node.id);
        }
        NodeCommand::Delete { node } => {
            service.delete_node(kind, &node).await?;
        }
        NodeCommand::AddChild { parent, child } => {
            service.add_child(kind, &parent, &child).await?;
        }
        NodeCommand::RemoveChild { parent, child } => {
            service.remove_child(kind, &parent, &child).await?;
        }
        NodeCommand::List => {
            for node in service.list_nodes(kind).await? {
                println!("{} {} {}", node.id, node.label(), node.title);
            }
        }
        NodeCommand::AddMember { group, member } => {
            anyhow::ensure!(kind == NodeKind::Group, "only groups have members");
            service.add_member(&group, &member).await?;
        }
        NodeCommand::RemoveMember { group, member } => {
            anyhow::ensure!(kind == NodeKind::Group, "only groups have members");
            service.remove_member(&group, &member).await?;
        }
        NodeCommand::Members { group } => {
            anyhow::ensure!(kind == NodeKind::Group, "only groups have members");
            for member in service.members(&group).await? {
                println!("{member}");
            }
        }
    }
    Ok(())
}

async fn run_user<S: AccessStore>(
    service: &AccessService<S>,
    command: UserCommand,
) -> anyhow::Result<()> {
    match command {
        UserCommand::Create { username } => {
            let user = service.create_user(&username).await?;
            println!("{}", user.id);
        }
        UserCommand::Delete { user } => {
            service.delete_user(&user).await?;
        }
        UserCommand::List => {
            for user in service.store().list_users().await? {
                println!("{} {}", user.id, user.username);
            }
        }
        UserCommand::Permissions { user, resource } => {
            for permission in service.permissions_of(&user, resource.as_deref()).await? {
                println!("{permission}");
            }
        }
    }
    Ok(())
}
