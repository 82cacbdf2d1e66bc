//! Pipeline orchestration.
//!
//! One invocation walks `AwaitingInput -> Identified -> MetadataFetched ->
//! CaptionFetched -> Summarized`. Each stage failure ends the run with its own
//! user-facing [`Failure`]; the detail only goes to the log.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::bilibili::BilibiliClient;
use crate::config::Config;
use crate::error::{FetchError, FetchResult};
use crate::links::extract_from_message;
use crate::message::IncomingMessage;
use crate::summarize::{ChatSummarizer, SummaryRequest};
use crate::{ParsedInput, Transcript, VideoId, VideoMetadata, parse_video_input};

pub const USAGE: &str = "Usage:\n\
1. /bs <video link or id>\n\
2. Quote a message containing a video link, then send /bs\n\
3. Forward a video share card, then send /bs\n\n\
Accepted formats:\n\
• Stable code: BV1jv7YzJED2 or 1jv7YzJED2\n\
• Legacy id: av123456 or 123456\n\
• Desktop link: https://www.bilibili.com/video/BV1jv7YzJED2\n\
• Mobile link: https://m.bilibili.com/video/BV1jv7YzJED2\n\
• Short link: https://b23.tv/xxxxx";

/// Source of video metadata and captions
#[async_trait]
pub trait VideoSource: Send + Sync {
    async fn resolve_short_link(&self, url: &str) -> FetchResult<VideoId>;
    async fn fetch_metadata(&self, id: &VideoId) -> FetchResult<VideoMetadata>;
    async fn fetch_transcript(&self, aid: u64, cid: u64) -> FetchResult<Transcript>;
}

/// Turns captions into prose
#[async_trait]
pub trait Summarize: Send + Sync {
    async fn summarize(&self, request: &SummaryRequest<'_>) -> FetchResult<String>;
}

#[async_trait]
impl VideoSource for BilibiliClient {
    async fn resolve_short_link(&self, url: &str) -> FetchResult<VideoId> {
        BilibiliClient::resolve_short_link(self, url).await
    }

    async fn fetch_metadata(&self, id: &VideoId) -> FetchResult<VideoMetadata> {
        BilibiliClient::fetch_metadata(self, id).await
    }

    async fn fetch_transcript(&self, aid: u64, cid: u64) -> FetchResult<Transcript> {
        BilibiliClient::fetch_transcript(self, aid, cid).await
    }
}

#[async_trait]
impl Summarize for ChatSummarizer {
    async fn summarize(&self, request: &SummaryRequest<'_>) -> FetchResult<String> {
        ChatSummarizer::summarize(self, request).await
    }
}

/// A command invocation: optional explicit argument plus the triggering message
#[derive(Debug, Clone, Default)]
pub struct Trigger {
    pub argument: Option<String>,
    pub message: IncomingMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    AwaitingInput,
    Identified,
    MetadataFetched,
    CaptionFetched,
    Summarized,
}

/// Terminal failure of a run, displayed as the user-facing reply
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Failure {
    #[error("❌ Unrecognized video link or id format, please check and try again")]
    Unrecognized,

    #[error("❌ Summaries are not configured (missing chat API key), please contact the administrator")]
    NotConfigured,

    #[error("❌ Failed to fetch video info, please check that the id is correct")]
    Metadata,

    #[error("❌ No usable captions found for this video")]
    NoCaptions,

    #[error("❌ Failed to generate the summary")]
    Summary,

    #[error("❌ Error while processing the request: {detail}")]
    Internal { detail: String },
}

/// A finished summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoSummary {
    pub id: VideoId,
    pub title: String,
    pub link: Option<String>,
    pub caption_language: String,
    pub transcript_truncated: bool,
    pub summary: String,
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// No argument and nothing found in the message
    Usage,
    Summarized(VideoSummary),
    Failed(Failure),
}

impl Outcome {
    /// Final reply text for the chat
    pub fn reply_text(&self) -> String {
        match self {
            Outcome::Usage => USAGE.to_string(),
            Outcome::Summarized(s) => {
                let mut text = format!("📺 {}\n", s.title);
                if let Some(link) = &s.link {
                    text.push_str(&format!("🔗 {link}\n"));
                }
                text.push_str(&format!("\n📋 Summary:\n{}", s.summary));
                text
            }
            Outcome::Failed(failure) => failure.to_string(),
        }
    }
}

/// Sequences identification, metadata, captions, and summary for one request
pub struct Pipeline<V, S> {
    source: Arc<V>,
    summarizer: Arc<S>,
    config: Arc<Config>,
}

impl<V, S> Clone for Pipeline<V, S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            summarizer: Arc::clone(&self.summarizer),
            config: Arc::clone(&self.config),
        }
    }
}

impl Pipeline<BilibiliClient, ChatSummarizer> {
    /// Pipeline over the live platform and chat endpoints
    pub fn from_config(config: Arc<Config>) -> FetchResult<Self> {
        let source = BilibiliClient::new(&config)?;
        let summarizer = ChatSummarizer::new(&config)?;
        Ok(Self::new(source, summarizer, config))
    }
}

impl<V, S> Pipeline<V, S>
where
    V: VideoSource + 'static,
    S: Summarize + 'static,
{
    pub fn new(source: V, summarizer: S, config: Arc<Config>) -> Self {
        Self {
            source: Arc::new(source),
            summarizer: Arc::new(summarizer),
            config,
        }
    }

    /// Run one invocation, sending each reply through `replies`.
    ///
    /// The run happens on its own task so a panic in any stage still ends
    /// with a reply instead of reaching the host.
    pub async fn handle(&self, trigger: Trigger, replies: UnboundedSender<String>) -> Outcome {
        let this = self.clone();
        let tx = replies.clone();
        let outcome = match tokio::spawn(async move { this.run(trigger, &tx).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let detail = join_error_detail(e);
                error!("Pipeline run aborted: {detail}");
                Outcome::Failed(Failure::Internal { detail })
            }
        };

        send(&replies, outcome.reply_text());
        outcome
    }

    async fn run(&self, trigger: Trigger, replies: &UnboundedSender<String>) -> Outcome {
        let mut stage = Stage::AwaitingInput;

        let Some(raw) = select_input(&trigger) else {
            info!("No argument and no link in message, sending usage");
            return Outcome::Usage;
        };

        let id = match self.identify(&raw).await {
            Ok(id) => id,
            Err(e) => return fail(stage, e, Failure::Unrecognized),
        };
        advance(&mut stage, Stage::Identified);

        if !self.config.has_chat_key() {
            warn!("Chat API key missing, refusing to process {id}");
            return Outcome::Failed(Failure::NotConfigured);
        }

        send(replies, format!("🔍 Processing {id}, please wait..."));

        let metadata = self.source.fetch_metadata(&id).await;
        self.pace().await;
        let metadata = match metadata {
            Ok(m) => m,
            Err(e) => return fail(stage, e, Failure::Metadata),
        };
        advance(&mut stage, Stage::MetadataFetched);

        let transcript = self.source.fetch_transcript(metadata.aid, metadata.cid).await;
        self.pace().await;
        let transcript = match transcript {
            Ok(t) => t,
            Err(e) => return fail(stage, e, Failure::NoCaptions),
        };
        advance(&mut stage, Stage::CaptionFetched);

        let request = SummaryRequest {
            title: &metadata.title,
            description: &metadata.description,
            transcript: &transcript.text,
        };
        let summary = match self.summarizer.summarize(&request).await {
            Ok(s) => s,
            Err(e) => return fail(stage, e, Failure::Summary),
        };
        advance(&mut stage, Stage::Summarized);

        Outcome::Summarized(VideoSummary {
            link: metadata
                .bvid
                .as_ref()
                .map(|bvid| format!("https://www.bilibili.com/video/{bvid}")),
            id,
            title: metadata.title,
            caption_language: transcript.language,
            transcript_truncated: transcript.truncated,
            summary,
        })
    }

    /// Normalize the raw reference, probing short links
    async fn identify(&self, raw: &str) -> FetchResult<VideoId> {
        match parse_video_input(raw) {
            Some(ParsedInput::Video(id)) => Ok(id),
            Some(ParsedInput::ShortLink(url)) => self.source.resolve_short_link(&url).await,
            None => Err(FetchError::Unrecognized(raw.to_string())),
        }
    }

    async fn pace(&self) {
        let secs = self.config.min_request_interval;
        if secs.is_finite() && secs > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(secs)).await;
        }
    }
}

/// Explicit argument first, else the first link found in the message
fn select_input(trigger: &Trigger) -> Option<String> {
    if let Some(arg) = trigger.argument.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
        return Some(arg.to_string());
    }

    let candidates = extract_from_message(&trigger.message);
    debug!("Link candidates: {candidates:?}");
    let first = candidates.into_iter().next()?;
    info!("Auto-extracted link from message: {}", first.raw);
    Some(first.raw)
}

fn advance(stage: &mut Stage, next: Stage) {
    debug!("Pipeline stage {stage:?} -> {next:?}");
    *stage = next;
}

fn fail(stage: Stage, err: FetchError, failure: Failure) -> Outcome {
    warn!("Pipeline failed after {stage:?}: {err}");
    Outcome::Failed(failure)
}

fn send(replies: &UnboundedSender<String>, text: String) {
    if replies.send(text).is_err() {
        debug!("Reply channel closed, dropping reply");
    }
}

fn join_error_detail(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unexpected panic".to_string()
    }
}
