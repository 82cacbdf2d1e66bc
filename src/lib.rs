pub mod bilibili;
pub mod config;
pub mod error;
pub mod links;
pub mod message;
pub mod output;
pub mod pipeline;
pub mod summarize;

use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Prefix of the stable 12-character video code
pub const BV_PREFIX: &str = "BV";

/// Prefix of the legacy numeric id form
pub const AV_PREFIX: &str = "av";

pub const PRIMARY_DOMAIN: &str = "bilibili.com";
pub const SHORT_DOMAIN: &str = "b23.tv";

static BV_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^BV[a-zA-Z0-9]{10}$").expect("valid regex"));
static BARE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9]{10}$").expect("valid regex"));
static AV_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^av(\d+)$").expect("valid regex"));
static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("valid regex"));
static VIDEO_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/video/(BV[a-zA-Z0-9]{10}|(?i:av)\d+)").expect("valid regex"));

/// Canonical video identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum VideoId {
    /// Full stable code, prefix included (`BV1jv7YzJED2`)
    Bv(String),
    /// Legacy numeric id (`av170001` holds 170001)
    Av(u64),
}

impl std::fmt::Display for VideoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoId::Bv(code) => write!(f, "{code}"),
            VideoId::Av(aid) => write!(f, "{AV_PREFIX}{aid}"),
        }
    }
}

/// Result of normalizing a raw user reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedInput {
    Video(VideoId),
    /// Shortener link that must be probed for its redirect target
    ShortLink(String),
}

impl std::fmt::Display for ParsedInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParsedInput::Video(id) => write!(f, "{id}"),
            ParsedInput::ShortLink(url) => write!(f, "{url}"),
        }
    }
}

/// Metadata of the first part of a video
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoMetadata {
    pub aid: u64,
    pub cid: u64,
    pub bvid: Option<String>,
    pub title: String,
    pub description: String,
}

/// One available caption track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionTrack {
    pub language: String,
    pub url: String,
}

/// Flattened caption text of one track
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transcript {
    pub language: String,
    pub text: String,
    /// Length in characters before the cap was applied
    pub original_len: usize,
    pub truncated: bool,
}

/// Normalize a raw video reference.
///
/// Accepted forms, first match wins: `BV` + 10 alphanumerics, 10 bare
/// alphanumerics, `av<digits>` (any case), bare digits, then desktop, mobile,
/// or short links. Short links that carry no id in their path come back as
/// [`ParsedInput::ShortLink`] and need a redirect probe.
pub fn parse_video_input(input: &str) -> Option<ParsedInput> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if BV_CODE.is_match(input) {
        return Some(ParsedInput::Video(VideoId::Bv(input.to_string())));
    }

    if BARE_CODE.is_match(input) {
        return Some(ParsedInput::Video(VideoId::Bv(format!("{BV_PREFIX}{input}"))));
    }

    if let Some(caps) = AV_ID.captures(input) {
        return parse_aid(&caps[1]).map(|aid| ParsedInput::Video(VideoId::Av(aid)));
    }

    if DIGITS.is_match(input) {
        return parse_aid(input).map(|aid| ParsedInput::Video(VideoId::Av(aid)));
    }

    if input.contains(PRIMARY_DOMAIN) || input.contains(SHORT_DOMAIN) {
        return parse_video_url(input);
    }

    None
}

fn parse_aid(digits: &str) -> Option<u64> {
    digits.parse::<u64>().ok().filter(|aid| *aid > 0)
}

fn parse_video_url(input: &str) -> Option<ParsedInput> {
    let parsed = match url::Url::parse(input) {
        Ok(u) => u,
        Err(e) => {
            warn!("Could not parse URL {input}: {e}");
            return None;
        }
    };
    let host = parsed.host_str()?.to_ascii_lowercase();

    if host.contains(PRIMARY_DOMAIN) || host.contains(SHORT_DOMAIN) {
        if let Some(caps) = VIDEO_PATH.captures(parsed.path()) {
            let id = &caps[1];
            if id.starts_with(BV_PREFIX) {
                return Some(ParsedInput::Video(VideoId::Bv(id.to_string())));
            }
            return parse_aid(&id[AV_PREFIX.len()..]).map(|aid| ParsedInput::Video(VideoId::Av(aid)));
        }
    }

    if host.contains(SHORT_DOMAIN) {
        return Some(ParsedInput::ShortLink(input.to_string()));
    }

    if host.contains(PRIMARY_DOMAIN) {
        return parsed
            .query_pairs()
            .find(|(k, _)| k == "bvid")
            .map(|(_, v)| v.into_owned())
            .filter(|v| BV_CODE.is_match(v))
            .map(|v| ParsedInput::Video(VideoId::Bv(v)));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bv(code: &str) -> Option<ParsedInput> {
        Some(ParsedInput::Video(VideoId::Bv(code.to_string())))
    }

    fn av(aid: u64) -> Option<ParsedInput> {
        Some(ParsedInput::Video(VideoId::Av(aid)))
    }

    #[test]
    fn test_prefixed_code_unchanged() {
        assert_eq!(parse_video_input("BV1jv7YzJED2"), bv("BV1jv7YzJED2"));
    }

    #[test]
    fn test_bare_code_gets_prefix() {
        assert_eq!(parse_video_input("1jv7YzJED2"), bv("BV1jv7YzJED2"));
    }

    #[test]
    fn test_ten_digits_take_code_rule() {
        assert_eq!(parse_video_input("1234567890"), bv("BV1234567890"));
    }

    #[test]
    fn test_legacy_id_lowercased() {
        assert_eq!(parse_video_input("AV170001"), av(170001));
        assert_eq!(parse_video_input("av170001").unwrap().to_string(), "av170001");
        assert_eq!(parse_video_input("Av170001").unwrap().to_string(), "av170001");
    }

    #[test]
    fn test_digits_get_legacy_prefix() {
        let parsed = parse_video_input("170001").unwrap();
        assert_eq!(parsed, ParsedInput::Video(VideoId::Av(170001)));
        let rendered = parsed.to_string();
        assert_eq!(rendered.strip_prefix(AV_PREFIX), Some("170001"));
    }

    #[test]
    fn test_zero_aid_rejected() {
        assert_eq!(parse_video_input("av0"), None);
        assert_eq!(parse_video_input("0"), None);
    }

    #[test]
    fn test_aid_overflow_rejected() {
        assert_eq!(parse_video_input("av99999999999999999999999"), None);
    }

    #[test]
    fn test_desktop_url() {
        assert_eq!(
            parse_video_input("https://www.bilibili.com/video/BV1jv7YzJED2?p=2&share_source=copy"),
            bv("BV1jv7YzJED2")
        );
    }

    #[test]
    fn test_mobile_url() {
        assert_eq!(parse_video_input("https://m.bilibili.com/video/BV1jv7YzJED2"), bv("BV1jv7YzJED2"));
    }

    #[test]
    fn test_legacy_url() {
        assert_eq!(parse_video_input("https://www.bilibili.com/video/av170001/"), av(170001));
    }

    #[test]
    fn test_query_bvid() {
        assert_eq!(
            parse_video_input("https://player.bilibili.com/player.html?bvid=BV1jv7YzJED2&page=1"),
            bv("BV1jv7YzJED2")
        );
    }

    #[test]
    fn test_query_bvid_malformed() {
        assert_eq!(parse_video_input("https://player.bilibili.com/player.html?bvid=BV123"), None);
    }

    #[test]
    fn test_short_link_tagged() {
        assert_eq!(
            parse_video_input("https://b23.tv/aBcDeF1"),
            Some(ParsedInput::ShortLink("https://b23.tv/aBcDeF1".to_string()))
        );
    }

    #[test]
    fn test_malformed_url() {
        assert_eq!(parse_video_input("bilibili.com is great"), None);
        assert_eq!(parse_video_input("https://"), None);
    }

    #[test]
    fn test_unrelated_input() {
        assert_eq!(parse_video_input("hello there"), None);
        assert_eq!(parse_video_input("https://www.youtube.com/watch?v=dQw4w9WgXcQ"), None);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(parse_video_input(""), None);
        assert_eq!(parse_video_input("   "), None);
    }

    #[test]
    fn test_whitespace_trimming() {
        assert_eq!(parse_video_input("  BV1jv7YzJED2\n"), bv("BV1jv7YzJED2"));
    }

    #[test]
    fn test_normalize_idempotent() {
        let inputs = [
            "BV1jv7YzJED2",
            "1jv7YzJED2",
            "AV42",
            "42",
            "https://www.bilibili.com/video/BV1jv7YzJED2",
            "https://b23.tv/xyz",
        ];
        for input in inputs {
            let once = parse_video_input(input).unwrap();
            let twice = parse_video_input(&once.to_string()).unwrap();
            assert_eq!(once, twice, "not idempotent for {input}");
        }
    }
}
