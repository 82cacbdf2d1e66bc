use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::{Result, bail};
use log::{info, warn};

mod cli;

use bilisum::bilibili::BilibiliClient;
use bilisum::message::IncomingMessage;
use bilisum::pipeline::{Pipeline, Trigger};
use bilisum::{ParsedInput, VideoId, links, parse_video_input};
use cli::{Cli, OutputFormat};

fn setup_logging() -> Result<()> {
    let log_dir = log_dir();
    std::fs::create_dir_all(&log_dir)?;
    let log_file = log_dir.join("bilisum.log");

    let target = Box::new(std::fs::OpenOptions::new().create(true).append(true).open(&log_file)?);

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized: {}", log_file.display());
    Ok(())
}

fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bilisum")
        .join("logs")
}

fn build_after_help() -> String {
    let log_path = log_dir().join("bilisum.log");
    let config_path = bilisum::config::config_path();

    format!(
        "\nCONFIG:\n  {}\n  env: BILISUM_CHAT_API_KEY (or OPENAI_API_KEY), BILIBILI_SESSDATA\n\nLogs are written to: {}",
        config_path.display(),
        log_path.display()
    )
}

fn read_message(path: &Path) -> Result<IncomingMessage> {
    let raw = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)?
    };
    Ok(serde_json::from_str(&raw)?)
}

async fn resolve_only(client: &BilibiliClient, raw: &str, verbose: bool) -> Result<()> {
    let id = match parse_video_input(raw) {
        Some(ParsedInput::Video(id)) => id,
        Some(ParsedInput::ShortLink(url)) => {
            if verbose {
                eprintln!("Probing short link: {url}");
            }
            client.resolve_short_link(&url).await?
        }
        None => bail!("could not recognize a video reference in: {raw}"),
    };

    match id {
        VideoId::Av(aid) => {
            let bvid = client.lookup_bvid(aid).await?;
            println!("{id} {bvid}");
        }
        VideoId::Bv(_) => println!("{id}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging()?;

    let after_help = build_after_help();
    let cmd = <Cli as clap::CommandFactory>::command().after_help(after_help);
    let matches = cmd.get_matches();
    let cli = <Cli as clap::FromArgMatches>::from_arg_matches(&matches)?;

    let mut config = bilisum::config::Config::load()?;
    if let Some(ref model) = cli.model {
        config.chat_model = model.clone();
    }
    for warning in config.warnings() {
        warn!("Config: {warning}");
        if cli.verbose {
            eprintln!("warning: {warning}");
        }
    }
    if cli.verbose {
        let config_path = bilisum::config::config_path();
        if config_path.exists() {
            eprintln!("Config: {}", config_path.display());
        }
    }

    let message = match cli.message {
        Some(ref path) => read_message(path)?,
        None => IncomingMessage::default(),
    };

    if cli.resolve_only {
        let client = BilibiliClient::new(&config)?;
        let raw = match cli.input.clone() {
            Some(input) => input,
            None => links::extract_from_message(&message)
                .into_iter()
                .next()
                .map(|c| c.raw)
                .ok_or_else(|| eyre::eyre!("no video reference given or found in the message"))?,
        };
        return resolve_only(&client, raw.trim(), cli.verbose).await;
    }

    let pipeline = Pipeline::from_config(Arc::new(config))?;
    let trigger = Trigger {
        argument: cli.input.clone(),
        message,
    };

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let format = cli.format;
    let printer = tokio::spawn(async move {
        while let Some(reply) = rx.recv().await {
            if format == OutputFormat::Text {
                println!("{reply}\n");
            } else {
                eprintln!("{reply}");
            }
        }
    });

    let outcome = pipeline.handle(trigger, tx).await;
    printer.await?;

    if cli.format == OutputFormat::Json {
        println!("{}", bilisum::output::render_json(&outcome));
    }

    Ok(())
}
