use std::time::Duration;

use log::{debug, info, warn};
use reqwest::StatusCode;
use reqwest::header::{COOKIE, LOCATION, REFERER, USER_AGENT};
use serde::Deserialize;

use crate::config::Config;
use crate::error::{FetchError, FetchResult};
use crate::{CaptionTrack, ParsedInput, Transcript, VideoId, VideoMetadata, parse_video_input};

const BROWSER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

const REFERER_URL: &str = "https://www.bilibili.com/";

/// Language label marker of the preferred caption track
pub const PREFERRED_LANGUAGE: &str = "中文";

/// Appended to a transcript cut at the length cap
pub const TRUNCATION_MARKER: &str = "...";

const REDIRECT_CODES: [StatusCode; 5] = [
    StatusCode::MOVED_PERMANENTLY,
    StatusCode::FOUND,
    StatusCode::SEE_OTHER,
    StatusCode::TEMPORARY_REDIRECT,
    StatusCode::PERMANENT_REDIRECT,
];

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ViewData {
    aid: Option<u64>,
    bvid: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    desc: Option<String>,
    #[serde(default)]
    pages: Vec<PageEntry>,
}

#[derive(Debug, Deserialize)]
struct PageEntry {
    cid: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PlayerData {
    #[serde(default)]
    subtitle: Option<SubtitleInfo>,
    #[serde(default)]
    need_login_subtitle: bool,
}

#[derive(Debug, Deserialize)]
struct SubtitleInfo {
    #[serde(default)]
    subtitles: Vec<SubtitleEntry>,
    #[serde(default)]
    need_login_subtitle: bool,
}

#[derive(Debug, Deserialize)]
struct SubtitleEntry {
    #[serde(default)]
    lan_doc: String,
    #[serde(default)]
    subtitle_url: String,
}

#[derive(Debug, Deserialize)]
struct SubtitleBody {
    #[serde(default)]
    body: Vec<Cue>,
}

#[derive(Debug, Deserialize)]
struct Cue {
    #[serde(default)]
    content: String,
}

/// HTTP client for the video platform's public endpoints
#[derive(Debug, Clone)]
pub struct BilibiliClient {
    client: reqwest::Client,
    probe: reqwest::Client,
    api_base: String,
    session_cookie: Option<String>,
    max_transcript_len: usize,
}

impl BilibiliClient {
    pub fn new(config: &Config) -> FetchResult<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let probe = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        let session_cookie = Some(config.session_cookie.trim().to_string()).filter(|c| !c.is_empty());

        Ok(Self {
            client,
            probe,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            session_cookie,
            max_transcript_len: config.max_transcript_length,
        })
    }

    /// Probe a short link once, without following redirects, and normalize its target
    pub async fn resolve_short_link(&self, short_url: &str) -> FetchResult<VideoId> {
        debug!("Probing short link: {short_url}");
        let resp = self
            .probe
            .get(short_url)
            .header(USER_AGENT, BROWSER_AGENT)
            .send()
            .await?;

        let status = resp.status();
        if !REDIRECT_CODES.contains(&status) {
            return Err(FetchError::Redirect(format!("{short_url} answered {status} instead of a redirect")));
        }

        let location = resp
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| FetchError::Redirect(format!("{short_url} redirected without a location")))?;
        debug!("Short link {short_url} -> {location}");

        match parse_video_input(location) {
            Some(ParsedInput::Video(id)) => Ok(id),
            _ => Err(FetchError::Redirect(format!("{short_url} -> {location}"))),
        }
    }

    /// Fetch metadata of the first part of a video
    pub async fn fetch_metadata(&self, id: &VideoId) -> FetchResult<VideoMetadata> {
        let url = format!("{}/x/web-interface/view", self.api_base);
        let query = match id {
            VideoId::Av(aid) => ("aid", aid.to_string()),
            VideoId::Bv(code) => ("bvid", code.clone()),
        };
        debug!("Fetching metadata: {url}?{}={}", query.0, query.1);

        let resp = self
            .client
            .get(&url)
            .query(&[query])
            .header(USER_AGENT, BROWSER_AGENT)
            .send()
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(FetchError::from_response(resp).await);
        }

        let envelope: ApiEnvelope<ViewData> = resp.json().await?;
        let metadata = metadata_from_response(envelope)?;
        info!("Fetched metadata for {id}: {}", metadata.title);
        Ok(metadata)
    }

    /// Look up the stable code of a legacy id
    pub async fn lookup_bvid(&self, aid: u64) -> FetchResult<String> {
        self.fetch_metadata(&VideoId::Av(aid))
            .await?
            .bvid
            .ok_or_else(|| FetchError::Protocol(format!("no bvid for av{aid}")))
    }

    /// List caption tracks, pick one, download and flatten it
    pub async fn fetch_transcript(&self, aid: u64, cid: u64) -> FetchResult<Transcript> {
        let tracks = self.fetch_tracks(aid, cid).await?;
        let track = select_track(&tracks).ok_or(FetchError::NoCaptions)?;
        let url = normalize_caption_url(&track.url);
        debug!("Downloading caption track {} from {url}", track.language);

        let resp = self
            .with_platform_headers(self.client.get(&url))
            .send()
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(FetchError::from_response(resp).await);
        }

        let body: SubtitleBody = resp.json().await?;
        let text = flatten_cues(body.body.iter().map(|c| c.content.as_str())).ok_or(FetchError::EmptyCaptions)?;
        Ok(cap_transcript(&track.language, text, self.max_transcript_len))
    }

    async fn fetch_tracks(&self, aid: u64, cid: u64) -> FetchResult<Vec<CaptionTrack>> {
        let url = format!("{}/x/player/wbi/v2", self.api_base);
        debug!("Listing caption tracks: aid={aid} cid={cid}");

        let resp = self
            .with_platform_headers(self.client.get(&url))
            .query(&[("aid", aid), ("cid", cid)])
            .send()
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(FetchError::from_response(resp).await);
        }

        let envelope: ApiEnvelope<PlayerData> = resp.json().await?;
        tracks_from_response(envelope)
    }

    fn with_platform_headers(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let req = req.header(USER_AGENT, BROWSER_AGENT).header(REFERER, REFERER_URL);
        match &self.session_cookie {
            Some(sessdata) => req.header(COOKIE, format!("SESSDATA={sessdata}")),
            None => req,
        }
    }
}

fn metadata_from_response(envelope: ApiEnvelope<ViewData>) -> FetchResult<VideoMetadata> {
    if envelope.code != 0 {
        return Err(FetchError::Api {
            code: envelope.code,
            message: envelope.message.unwrap_or_else(|| "unknown error".to_string()),
        });
    }

    let data = envelope
        .data
        .ok_or_else(|| FetchError::Protocol("metadata response has no data".to_string()))?;
    let first = data
        .pages
        .first()
        .ok_or_else(|| FetchError::Protocol("metadata response lists no parts".to_string()))?;

    let aid = data
        .aid
        .filter(|a| *a > 0)
        .ok_or_else(|| FetchError::Protocol("metadata response has no aid".to_string()))?;
    let cid = first
        .cid
        .filter(|c| *c > 0)
        .ok_or_else(|| FetchError::Protocol("first part has no cid".to_string()))?;

    Ok(VideoMetadata {
        aid,
        cid,
        bvid: data.bvid.filter(|b| !b.is_empty()),
        title: data.title.unwrap_or_default(),
        description: data.desc.unwrap_or_default(),
    })
}

fn tracks_from_response(envelope: ApiEnvelope<PlayerData>) -> FetchResult<Vec<CaptionTrack>> {
    if envelope.code != 0 {
        return Err(FetchError::Api {
            code: envelope.code,
            message: envelope.message.unwrap_or_else(|| "unknown error".to_string()),
        });
    }

    let data = envelope
        .data
        .ok_or_else(|| FetchError::Protocol("player response has no data".to_string()))?;
    let (entries, nested_login) = match data.subtitle {
        Some(info) => (info.subtitles, info.need_login_subtitle),
        None => (Vec::new(), false),
    };

    if entries.is_empty() {
        if data.need_login_subtitle || nested_login {
            return Err(FetchError::LoginRequired);
        }
        return Err(FetchError::NoCaptions);
    }

    Ok(entries
        .into_iter()
        .map(|e| CaptionTrack {
            language: e.lan_doc,
            url: e.subtitle_url,
        })
        .collect())
}

/// Pick the first track labelled with the preferred language, else the first track
pub fn select_track(tracks: &[CaptionTrack]) -> Option<&CaptionTrack> {
    if let Some(track) = tracks.iter().find(|t| t.language.contains(PREFERRED_LANGUAGE)) {
        info!("Selected preferred caption track: {}", track.language);
        return Some(track);
    }

    let track = tracks.first()?;
    info!(
        "No {PREFERRED_LANGUAGE} caption track, falling back to: {}",
        if track.language.is_empty() { "unknown" } else { track.language.as_str() }
    );
    Some(track)
}

/// Give protocol-relative and schemeless caption URLs an https scheme
pub fn normalize_caption_url(url: &str) -> String {
    if url.starts_with("//") {
        format!("https:{url}")
    } else if !url.starts_with("http") {
        format!("https://{url}")
    } else {
        url.to_string()
    }
}

/// Join non-empty trimmed cues with single spaces
pub fn flatten_cues<'a>(cues: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let parts: Vec<&str> = cues.into_iter().map(str::trim).filter(|c| !c.is_empty()).collect();
    if parts.is_empty() {
        warn!("Caption body has no text");
        return None;
    }
    Some(parts.join(" "))
}

/// Cut a transcript to `cap` characters, appending the truncation marker
pub fn cap_transcript(language: &str, text: String, cap: usize) -> Transcript {
    let original_len = text.chars().count();
    if original_len <= cap {
        info!("Caption text fetched ({original_len} chars)");
        return Transcript {
            language: language.to_string(),
            text,
            original_len,
            truncated: false,
        };
    }

    let mut truncated: String = text.chars().take(cap).collect();
    truncated.push_str(TRUNCATION_MARKER);
    info!("Caption text too long ({original_len} chars), truncated to {cap}");
    Transcript {
        language: language.to_string(),
        text: truncated,
        original_len,
        truncated: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn track(language: &str) -> CaptionTrack {
        CaptionTrack {
            language: language.to_string(),
            url: format!("//subtitle.example.com/{language}.json"),
        }
    }

    fn view(value: serde_json::Value) -> ApiEnvelope<ViewData> {
        serde_json::from_value(value).unwrap()
    }

    fn player(value: serde_json::Value) -> ApiEnvelope<PlayerData> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_select_prefers_chinese() {
        let tracks = vec![track("English"), track("中文(简体)")];
        assert_eq!(select_track(&tracks).unwrap().language, "中文(简体)");
    }

    #[test]
    fn test_select_falls_back_to_first() {
        let tracks = vec![track("English"), track("日本語")];
        assert_eq!(select_track(&tracks).unwrap().language, "English");
    }

    #[test]
    fn test_select_first_chinese_in_order() {
        let tracks = vec![track("中文(繁體)"), track("中文(简体)")];
        assert_eq!(select_track(&tracks).unwrap().language, "中文(繁體)");
        assert!(select_track(&[]).is_none());
    }

    #[test]
    fn test_normalize_caption_url() {
        assert_eq!(
            normalize_caption_url("//aisubtitle.hdslb.com/bfs/a.json"),
            "https://aisubtitle.hdslb.com/bfs/a.json"
        );
        assert_eq!(
            normalize_caption_url("aisubtitle.hdslb.com/bfs/a.json"),
            "https://aisubtitle.hdslb.com/bfs/a.json"
        );
        assert_eq!(normalize_caption_url("http://x.test/a.json"), "http://x.test/a.json");
    }

    #[test]
    fn test_flatten_cues() {
        assert_eq!(
            flatten_cues(["  hello ", "", "   ", "world"]),
            Some("hello world".to_string())
        );
        assert_eq!(flatten_cues([" ", ""]), None);
    }

    #[test]
    fn test_cap_transcript_truncates() {
        let t = cap_transcript("English", "abcdefghijklmno".to_string(), 10);
        assert_eq!(t.text, "abcdefghij...");
        assert_eq!(t.original_len, 15);
        assert!(t.truncated);
    }

    #[test]
    fn test_cap_transcript_counts_chars() {
        let t = cap_transcript("中文", "你好世界".to_string(), 4);
        assert_eq!(t.text, "你好世界");
        assert!(!t.truncated);

        let t = cap_transcript("中文", "你好世界".to_string(), 2);
        assert_eq!(t.text, "你好...");
        assert_eq!(t.original_len, 4);
    }

    #[test]
    fn test_metadata_first_part_only() {
        let meta = metadata_from_response(view(json!({
            "code": 0,
            "data": {
                "aid": 170001,
                "bvid": "BV17x411w7KC",
                "title": "Title",
                "desc": "",
                "pages": [{"cid": 279786, "part": "p1"}, {"cid": 279787, "part": "p2"}]
            }
        })))
        .unwrap();
        assert_eq!(meta.aid, 170001);
        assert_eq!(meta.cid, 279786);
        assert_eq!(meta.bvid.as_deref(), Some("BV17x411w7KC"));
        assert_eq!(meta.description, "");
    }

    #[test]
    fn test_metadata_empty_pages() {
        let err = metadata_from_response(view(json!({
            "code": 0,
            "data": {"aid": 1, "title": "t", "pages": []}
        })))
        .unwrap_err();
        assert!(matches!(err, FetchError::Protocol(_)));
    }

    #[test]
    fn test_metadata_error_code() {
        let err = metadata_from_response(view(json!({"code": -404, "message": "啥都木有", "data": null}))).unwrap_err();
        assert!(matches!(err, FetchError::Api { code: -404, ref message } if message == "啥都木有"));
    }

    #[test]
    fn test_metadata_missing_cid() {
        let err = metadata_from_response(view(json!({
            "code": 0,
            "data": {"aid": 1, "title": "t", "pages": [{"part": "p1"}]}
        })))
        .unwrap_err();
        assert!(matches!(err, FetchError::Protocol(_)));
    }

    #[test]
    fn test_tracks_listed_in_order() {
        let tracks = tracks_from_response(player(json!({
            "code": 0,
            "data": {"subtitle": {"subtitles": [
                {"lan_doc": "English", "subtitle_url": "//a/en.json"},
                {"lan_doc": "中文（自动生成）", "subtitle_url": "//a/zh.json"}
            ]}}
        })))
        .unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[1].url, "//a/zh.json");
    }

    #[test]
    fn test_tracks_login_required() {
        let err = tracks_from_response(player(json!({
            "code": 0,
            "data": {"need_login_subtitle": true, "subtitle": {"subtitles": []}}
        })))
        .unwrap_err();
        assert!(matches!(err, FetchError::LoginRequired));

        let err = tracks_from_response(player(json!({
            "code": 0,
            "data": {"subtitle": {"subtitles": [], "need_login_subtitle": true}}
        })))
        .unwrap_err();
        assert!(matches!(err, FetchError::LoginRequired));
    }

    #[test]
    fn test_tracks_none_available() {
        let err = tracks_from_response(player(json!({"code": 0, "data": {"subtitle": {"subtitles": []}}}))).unwrap_err();
        assert!(matches!(err, FetchError::NoCaptions));
    }

    #[test]
    fn test_tracks_error_code() {
        let err = tracks_from_response(player(json!({"code": -400, "message": "请求错误"}))).unwrap_err();
        assert!(matches!(err, FetchError::Api { code: -400, .. }));
    }
}
