//! DevPilot CLI — command-line interface for developer workflows.
//!
//! Reuses the same core domain logic (devpilot-core) and server bootstrap
//! (devpilot-server) that power the HTTP API.

mod commands;

use clap::{Parser, Subcommand};

/// DevPilot CLI — Developer workflow orchestration
#[derive(Parser)]
#[command(name = "devpilot", version, about = "DevPilot CLI — Developer workflow orchestration")]
pub struct Cli {
    /// Path to the SQLite database file (defaults to the user data directory)
    #[arg(long, env = "DEVPILOT_DB_PATH")]
    db: Option<String>,

    /// Engine configuration YAML file
    #[arg(long, env = "DEVPILOT_ENGINE_CONFIG")]
    engine_config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the DevPilot HTTP backend server
    Server {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on
        #[arg(long, default_value_t = 3220)]
        port: u16,
        /// Seconds between automatic schedule ticks (0 disables)
        #[arg(long, default_value_t = 60)]
        tick_secs: u64,
    },

    /// Manage and run workflows
    Workflow {
        #[command(subcommand)]
        action: WorkflowAction,
    },

    /// Rank workflows against the current activity
    Suggest {
        /// Changed file paths
        #[arg(long = "file")]
        files: Vec<String>,
        /// Git event name (e.g. "push", "pre-push")
        #[arg(long)]
        git_event: Option<String>,
        /// Branch for the git event
        #[arg(long)]
        branch: Option<String>,
        /// Recent conversation text
        #[arg(long)]
        conversation: Option<String>,
        /// Tags describing recent activity
        #[arg(long = "pattern")]
        patterns: Vec<String>,
    },

    /// Manage cron schedules
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },
}

#[derive(Subcommand)]
enum WorkflowAction {
    /// List stored workflows
    List {
        /// Only show this category
        #[arg(long)]
        category: Option<String>,
    },
    /// Show one workflow as YAML
    Show {
        /// Workflow ID
        id: String,
    },
    /// Store a workflow from a YAML or JSON file
    Create {
        /// Path to the workflow file
        file: String,
    },
    /// Validate a workflow file without storing it
    Validate {
        /// Path to the workflow file
        file: String,
    },
    /// Run a stored workflow (by ID) or a workflow file and wait for the result
    Run {
        /// Workflow ID or path to a workflow file
        target: String,
        /// Shared variables as KEY=VALUE (VALUE may be JSON)
        #[arg(long = "var")]
        vars: Vec<String>,
        /// Trigger payload (JSON string)
        #[arg(long)]
        trigger_payload: Option<String>,
        /// Print every step result
        #[arg(long, short = 'v')]
        verbose: bool,
    },
    /// Delete a stored workflow and its schedules
    Delete {
        /// Workflow ID
        id: String,
    },
    /// List the built-in workflow catalog
    Builtins,
    /// List specialist definitions
    Specialists,
}

#[derive(Subcommand)]
enum ScheduleAction {
    /// List schedules
    List {
        #[arg(long)]
        workflow_id: Option<String>,
    },
    /// Register a cron schedule for a workflow
    Create {
        /// Workflow ID
        #[arg(long)]
        workflow_id: String,
        /// Cron expression (5 or 6 fields)
        #[arg(long)]
        cron: String,
        /// IANA timezone
        #[arg(long, default_value = "UTC")]
        timezone: String,
    },
    /// Delete a schedule
    Delete {
        /// Schedule ID
        id: String,
    },
    /// Fire every due schedule now and wait for the runs
    Tick,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "devpilot_core=warn,devpilot_server=warn,devpilot_cli=info".into()
            }),
        )
        .init();

    let db = cli.db.unwrap_or_else(commands::default_db_path);
    let engine_config = cli.engine_config;

    let result = match cli.command {
        Commands::Server {
            host,
            port,
            tick_secs,
        } => commands::server::run(host, port, db, engine_config, tick_secs).await,

        Commands::Workflow { action } => {
            let state = commands::init_state(&db, engine_config.as_deref()).await;
            match action {
                WorkflowAction::List { category } => {
                    commands::workflow::list(&state, category.as_deref()).await
                }
                WorkflowAction::Show { id } => commands::workflow::show(&state, &id).await,
                WorkflowAction::Create { file } => commands::workflow::create(&state, &file).await,
                WorkflowAction::Validate { file } => commands::workflow::validate(&state, &file),
                WorkflowAction::Run {
                    target,
                    vars,
                    trigger_payload,
                    verbose,
                } => {
                    commands::workflow::run(
                        &state,
                        &target,
                        &vars,
                        trigger_payload.as_deref(),
                        verbose,
                    )
                    .await
                }
                WorkflowAction::Delete { id } => commands::workflow::delete(&state, &id).await,
                WorkflowAction::Builtins => commands::workflow::builtins(&state),
                WorkflowAction::Specialists => commands::workflow::specialists(&state),
            }
        }

        Commands::Suggest {
            files,
            git_event,
            branch,
            conversation,
            patterns,
        } => {
            let state = commands::init_state(&db, engine_config.as_deref()).await;
            commands::suggest::run(&state, files, git_event, branch, conversation, patterns).await
        }

        Commands::Schedule { action } => {
            let state = commands::init_state(&db, engine_config.as_deref()).await;
            match action {
                ScheduleAction::List { workflow_id } => {
                    commands::schedule::list(&state, workflow_id.as_deref()).await
                }
                ScheduleAction::Create {
                    workflow_id,
                    cron,
                    timezone,
                } => commands::schedule::create(&state, workflow_id, cron, timezone).await,
                ScheduleAction::Delete { id } => commands::schedule::delete(&state, &id).await,
                ScheduleAction::Tick => commands::schedule::tick(&state).await,
            }
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
