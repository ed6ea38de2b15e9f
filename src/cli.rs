use aether_common::{ConflictMode, ItemId, MediaType};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "aether")]
#[command(author, version, about = "Batch media conversion queue")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add files to the queue
    Add {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Also generate thumbnails for the new items
        #[arg(long)]
        thumbnails: bool,
    },

    /// Convert every pending item, resuming cancelled ones first
    Run {
        /// Leave failed items alone instead of retrying them
        #[arg(long)]
        no_retry_errors: bool,
    },

    /// Convert the given items in order
    RunSelected {
        #[arg(required = true)]
        ids: Vec<ItemId>,
    },

    /// Show the queue
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Move cancelled items back to pending
    Resume {
        /// Also retry failed items
        #[arg(long)]
        retry_errors: bool,
    },

    /// Move completed items back to pending
    RetryCompleted,

    /// Remove items from the queue
    Remove {
        #[arg(required = true)]
        ids: Vec<ItemId>,
    },

    /// Remove every item from the queue
    Clear,

    /// Handle a previous unfinished session
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Show or change global conversion settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Set or clear per-item settings
    Override {
        #[command(subcommand)]
        action: OverrideAction,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Display version information
    Version,
}

#[derive(Subcommand)]
pub enum SessionAction {
    /// Keep the previous session's items
    Restore,
    /// Drop the previous session's items and thumbnails
    Discard,
}

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Print the current settings
    Show,

    /// Set output quality in percent
    SetQuality {
        #[arg(value_parser = clap::value_parser!(u8).range(1..=100))]
        quality: u8,
    },

    /// Set the output format for a media category ("original" keeps it)
    SetFormat { category: MediaType, format: String },

    /// Set the output directory; omit to write next to the input
    SetOutputDir { dir: Option<PathBuf> },

    /// Set what happens when an output file already exists
    SetConflict { mode: ConflictMode },

    /// Restore previous sessions without asking
    SetAutoRestore {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },

    /// Restore defaults (keeps the output directory)
    Reset,
}

#[derive(Subcommand)]
pub enum OverrideAction {
    /// Set fields for one item; unset fields keep inheriting
    Set {
        id: ItemId,

        #[command(flatten)]
        fields: OverrideFields,
    },

    /// Remove an item's override, or every override with --all
    Clear {
        #[arg(required_unless_present = "all")]
        id: Option<ItemId>,

        #[arg(long)]
        all: bool,
    },
}

#[derive(Args)]
pub struct OverrideFields {
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: Option<u8>,

    /// Output format for the item's category ("original" keeps it)
    #[arg(long)]
    pub format: Option<String>,

    #[arg(long)]
    pub muted: Option<bool>,

    #[arg(long)]
    pub strip_metadata: Option<bool>,

    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}
