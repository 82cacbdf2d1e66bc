use crate::pipeline::Outcome;

/// Render the outcome as pretty-printed JSON
pub fn render_json(outcome: &Outcome) -> String {
    serde_json::to_string_pretty(outcome).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VideoId;
    use crate::pipeline::{Failure, VideoSummary};

    fn sample_outcome() -> Outcome {
        Outcome::Summarized(VideoSummary {
            id: VideoId::Bv("BV1jv7YzJED2".to_string()),
            title: "Test Video".to_string(),
            link: Some("https://www.bilibili.com/video/BV1jv7YzJED2".to_string()),
            caption_language: "中文(简体)".to_string(),
            transcript_truncated: true,
            summary: "It is a test.".to_string(),
        })
    }

    #[test]
    fn test_render_json() {
        let json: serde_json::Value = serde_json::from_str(&render_json(&sample_outcome())).unwrap();
        assert_eq!(json["status"], "summarized");
        assert_eq!(json["id"], "BV1jv7YzJED2");
        assert_eq!(json["transcript_truncated"], true);
    }

    #[test]
    fn test_render_json_failure() {
        let outcome = Outcome::Failed(Failure::Internal {
            detail: "boom".to_string(),
        });
        let json: serde_json::Value = serde_json::from_str(&render_json(&outcome)).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["kind"], "internal");
        assert_eq!(json["detail"], "boom");
    }

    #[test]
    fn test_render_json_usage() {
        let json: serde_json::Value = serde_json::from_str(&render_json(&Outcome::Usage)).unwrap();
        assert_eq!(json["status"], "usage");
    }
}
