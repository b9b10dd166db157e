use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "manualseek",
    about = "Semantic passage retrieval over a reference manual"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Index collection to use
    #[arg(long, global = true)]
    pub collection: Option<String>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Chunk, embed and store a document
    Index(IndexArgs),
    /// Retrieve passages relevant to a question
    Search(SearchArgs),
    /// Show stored indexes
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Index --

#[derive(Debug, Parser)]
pub struct IndexArgs {
    /// Extracted text of the document (pages separated by form feeds)
    pub file: PathBuf,

    /// Document id (defaults to the file stem)
    #[arg(long)]
    pub id: Option<String>,

    /// Rebuild even if the stored index is current
    #[arg(long)]
    pub force: bool,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The question
    pub query: String,

    /// Document the index was built from
    #[arg(short, long)]
    pub source: PathBuf,

    /// Document id used when indexing
    #[arg(long)]
    pub id: Option<String>,

    /// Number of results to return
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Minimum cosine similarity
    #[arg(long)]
    pub min_score: Option<f32>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "manualseek",
            &mut std::io::stdout(),
        );
    }
}
