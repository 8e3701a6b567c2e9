mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use ticketdesk::auth::CredentialVerifier;
use ticketdesk::cache::{QueryCache, SqliteCache};
use ticketdesk::config::Config;
use ticketdesk::db::Database;
use ticketdesk::desk::Desk;
use ticketdesk::error::ApiError;
use ticketdesk::logging;

use commands::tickets::{ListFilters, Requester};

type AppDesk = Desk<Database, SqliteCache>;

#[derive(Parser)]
#[command(name = "ticketdesk")]
#[command(about = "Support-ticket desk: tickets, comments and categories over SQLite")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    config: Config,

    /// Authorization header value, e.g. "Bearer <token>"
    #[arg(long = "auth", env = "TICKETDESK_AUTH", hide_env_values = true, global = true)]
    authorization: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ticket commands
    Ticket {
        #[command(subcommand)]
        action: TicketCommands,
    },

    /// Comment commands
    Comment {
        #[command(subcommand)]
        action: CommentCommands,
    },

    /// Category commands
    Category {
        #[command(subcommand)]
        action: CategoryCommands,
    },

    /// Token commands
    Token {
        #[command(subcommand)]
        action: TokenCommands,
    },
}

#[derive(Subcommand)]
enum TicketCommands {
    /// Open a new ticket
    Create {
        /// Ticket title
        title: String,
        /// What went wrong
        #[arg(short, long)]
        description: String,
        /// Initial status (open, inprogress, closed)
        #[arg(short, long, default_value = "open")]
        status: String,
        /// User the ticket belongs to
        #[arg(short, long)]
        owner: String,
        /// Category id
        #[arg(short, long)]
        category: i64,
    },

    /// Show one ticket
    Get {
        /// Ticket ID
        id: i64,
        #[command(flatten)]
        who: Requester,
    },

    /// List tickets (requires --auth)
    List {
        #[command(flatten)]
        filters: ListFilters,
    },

    /// Change status and assignment (requires --auth with tickets.PUT)
    Update {
        /// Ticket ID
        id: i64,
        /// New status (open, inprogress, closed)
        #[arg(short, long)]
        status: String,
        /// Agent to assign; omit or pass "" to clear the assignment
        #[arg(short, long)]
        assignee: Option<String>,
    },

    /// Delete a ticket and its comments
    Delete {
        /// Ticket ID
        id: i64,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum CommentCommands {
    /// Comment on a ticket
    Add {
        /// Ticket ID
        ticket: i64,
        /// Comment text
        text: String,
        /// Who is commenting
        #[arg(short, long)]
        author: String,
    },

    /// List comments on a ticket
    List {
        /// Ticket ID
        ticket: i64,
        #[arg(long = "page-id")]
        page_id: Option<String>,
        #[arg(long = "page-size")]
        page_size: Option<String>,
    },

    /// Replace a comment's text
    Edit {
        /// Ticket ID
        ticket: i64,
        /// Comment ID
        comment: i64,
        /// New text
        text: String,
    },

    /// Delete a comment
    Delete {
        /// Ticket ID
        ticket: i64,
        /// Comment ID
        comment: i64,
    },
}

#[derive(Subcommand)]
enum CategoryCommands {
    /// Add a category (requires --auth with categories.POST)
    Create {
        /// Category name
        name: String,
    },

    /// List categories
    List {
        #[arg(long = "page-id")]
        page_id: Option<String>,
        #[arg(long = "page-size")]
        page_size: Option<String>,
    },
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Sign a bearer token with the configured secret
    Issue {
        /// Subject claim
        #[arg(long)]
        subject: Option<String>,
        /// Permission to grant, e.g. tickets.PUT (repeatable)
        #[arg(short, long = "permission")]
        permissions: Vec<String>,
        /// Lifetime in minutes
        #[arg(long, default_value_t = 60)]
        ttl: i64,
    },
}

fn open_desk(config: &Config) -> Result<AppDesk> {
    let db = Database::open(&config.database_path).with_context(|| {
        format!(
            "Failed to open database at {}",
            config.database_path.display()
        )
    })?;
    let service = SqliteCache::open(&config.database_path).context("Failed to open listing cache")?;
    let cache = QueryCache::with_ttl(service, config.cache_ttl());
    let verifier = CredentialVerifier::new(config.secret()?);
    Ok(Desk::new(db, cache, verifier))
}

fn run(cli: Cli) -> Result<()> {
    let auth = cli.authorization.as_deref();

    match cli.command {
        Commands::Token { action } => match action {
            TokenCommands::Issue {
                subject,
                permissions,
                ttl,
            } => commands::token::issue(
                cli.config.secret()?,
                subject.as_deref(),
                &permissions,
                ttl,
            ),
        },

        Commands::Ticket { action } => {
            let desk = open_desk(&cli.config)?;
            match action {
                TicketCommands::Create {
                    title,
                    description,
                    status,
                    owner,
                    category,
                } => commands::tickets::create(
                    &desk,
                    &title,
                    &description,
                    &status,
                    &owner,
                    category,
                ),
                TicketCommands::Get { id, who } => commands::tickets::get(&desk, id, &who),
                TicketCommands::List { filters } => {
                    commands::tickets::list(&desk, auth, &filters)
                }
                TicketCommands::Update {
                    id,
                    status,
                    assignee,
                } => commands::tickets::update(&desk, auth, id, &status, assignee.as_deref()),
                TicketCommands::Delete { id, force } => {
                    commands::tickets::delete(&desk, id, force)
                }
            }
        }

        Commands::Comment { action } => {
            let desk = open_desk(&cli.config)?;
            match action {
                CommentCommands::Add {
                    ticket,
                    text,
                    author,
                } => commands::comments::add(&desk, ticket, &text, &author),
                CommentCommands::List {
                    ticket,
                    page_id,
                    page_size,
                } => commands::comments::list(
                    &desk,
                    ticket,
                    page_id.as_deref(),
                    page_size.as_deref(),
                ),
                CommentCommands::Edit {
                    ticket,
                    comment,
                    text,
                } => commands::comments::edit(&desk, ticket, comment, &text),
                CommentCommands::Delete { ticket, comment } => {
                    commands::comments::delete(&desk, ticket, comment)
                }
            }
        }

        Commands::Category { action } => {
            let desk = open_desk(&cli.config)?;
            match action {
                CategoryCommands::Create { name } => {
                    commands::categories::create(&desk, auth, &name)
                }
                CategoryCommands::List { page_id, page_size } => commands::categories::list(
                    &desk,
                    page_id.as_deref(),
                    page_size.as_deref(),
                ),
            }
        }
    }
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.config.log_format);

    if let Err(err) = run(cli) {
        match err.downcast_ref::<ApiError>() {
            Some(api) => eprintln!("error ({}): {}", api.status(), api.message()),
            None => eprintln!("error: {:#}", err),
        }
        std::process::exit(1);
    }
}
