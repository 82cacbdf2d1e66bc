use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(
    name = "bilisum",
    about = "Summarize Bilibili videos from their captions",
    version = env!("GIT_DESCRIBE"),
)]
pub struct Cli {
    /// Video link, short link, BV code, or av id (taken from --message if omitted)
    pub input: Option<String>,

    /// Decoded chat message (JSON) to search for a video link; "-" reads stdin
    #[arg(short, long)]
    pub message: Option<PathBuf>,

    /// Output format: text (default), json
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Only resolve the input to a canonical id, without fetching captions
    #[arg(long)]
    pub resolve_only: bool,

    /// Override the chat model from the config file
    #[arg(long)]
    pub model: Option<String>,

    /// Show config location and resolution details on stderr
    #[arg(short, long)]
    pub verbose: bool,
}
