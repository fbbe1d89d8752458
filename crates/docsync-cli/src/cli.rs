use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "docsync")]
#[command(about = "Local-first documents with background sync")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to the local document store
    #[arg(long, global = true, value_name = "PATH")]
    pub store_path: Option<PathBuf>,

    /// Remote replica base URL (overrides DOCSYNC_REMOTE_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub remote_url: Option<String>,

    /// Account to sync as (overrides DOCSYNC_USER_ID)
    #[arg(long, global = true, value_name = "ID")]
    pub user: Option<String>,

    /// Treat the network as unavailable; changes stay queued locally
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new document
    #[command(alias = "add")]
    New {
        /// Document title
        title: Vec<String>,
        /// Initial content (piped stdin is used when omitted)
        #[arg(long)]
        content: Option<String>,
        /// Workspace the document belongs to
        #[arg(long, value_name = "ID")]
        workspace: Option<String>,
    },
    /// Edit a document; opens $EDITOR on the content when no field is given
    Edit {
        /// Document ID or unique ID prefix
        id: String,
        /// New title
        #[arg(long)]
        title: Option<String>,
        /// New content
        #[arg(long)]
        content: Option<String>,
        /// Mark or unmark as favorite
        #[arg(long)]
        favorite: Option<bool>,
    },
    /// Delete a document
    Delete {
        /// Document ID or unique ID prefix
        id: String,
    },
    /// List recent documents
    List {
        /// Number of documents to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Only documents with changes not yet synced
        #[arg(long)]
        dirty: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push local changes and pull remote ones now
    Sync,
    /// Show the current sync status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Diagnose sync problems
    Health {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List unresolved sync conflicts
    Conflicts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve the conflicts attached to a document
    Resolve {
        /// Document ID or unique ID prefix
        id: String,
        /// Choice applied to every conflict without a field override
        #[arg(long = "use", value_enum)]
        choice: Option<ResolveChoice>,
        /// Per-field choice, e.g. `--field content=local`
        #[arg(long = "field", value_name = "FIELD=CHOICE")]
        fields: Vec<String>,
    },
    /// Keep syncing in the background and print status changes
    Watch,
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ResolveChoice {
    Local,
    Remote,
    Merge,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
