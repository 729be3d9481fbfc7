use reqwest::Client;
use serde_json::json;

use crate::config::Config;

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Approved,
    Rejected,
}

#[derive(Debug)]
pub struct Moderation {
    pub verdict: Verdict,
    pub reason: String,
}

pub struct ModerationService;

impl ModerationService {
    fn api_key() -> Result<String, String> {
        Config::openrouter_api_key().ok_or_else(|| "OPENROUTER_API_KEY not configured".to_string())
    }

    fn prompt(text: &str) -> String {
        format!(
            "You are a content moderator. Evaluate the following review text \
             for inappropriate, offensive, or harmful content. \
             Start your reply with exactly one word: APPROVED or REJECTED. \
             If the review is REJECTED, follow up by the exact reason after the word REJECTED, \
             separated by '|' without space between them. Do not add any other text.\
             \n\n\n\n Also, you are very picky. Even a little bit of offensiveness, such as \
             not using polite language, writing unrelated comments, using wrong grammar, \
             or expressing controversial opinion will result in a REJECTION.\
             \n\n\n\n Here is the text: {}",
            text
        )
    }

    /// Single round trip to the moderation endpoint. No retry and no
    /// timeout override; network or shape errors surface as `Err`, which
    /// callers must treat as an internal failure rather than a rejection.
    pub async fn moderate(text: &str) -> Result<Moderation, String> {
        let res = Client::new()
            .post(OPENROUTER_URL)
            .bearer_auth(Self::api_key()?)
            .json(&json!({
                "model": Config::moderation_model(),
                "messages": [
                    { "role": "user", "content": Self::prompt(text) }
                ],
                "provider": { "sort": "latency" }
            }))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let body: serde_json::Value = res.json().await.map_err(|e| e.to_string())?;

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| format!("malformed moderation response: {}", body))?;

        Self::parse_verdict(content)
    }

    /// The verdict token is everything before the first `|`; the reason is
    /// everything after it (empty when absent).
    fn parse_verdict(content: &str) -> Result<Moderation, String> {
        let (token, reason) = match content.split_once('|') {
            Some((token, reason)) => (token, reason),
            None => (content, ""),
        };

        let verdict = match token.trim() {
            "APPROVED" => Verdict::Approved,
            "REJECTED" => Verdict::Rejected,
            other => return Err(format!("unrecognized moderation verdict: {:?}", other)),
        };

        Ok(Moderation {
            verdict,
            reason: reason.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approved_without_reason() {
        let m = ModerationService::parse_verdict("APPROVED").unwrap();
        assert_eq!(m.verdict, Verdict::Approved);
        assert_eq!(m.reason, "");
    }

    #[test]
    fn rejected_with_reason() {
        let m = ModerationService::parse_verdict("REJECTED|contains profanity").unwrap();
        assert_eq!(m.verdict, Verdict::Rejected);
        assert_eq!(m.reason, "contains profanity");
    }

    #[test]
    fn reason_keeps_later_pipes() {
        let m = ModerationService::parse_verdict("REJECTED|a|b").unwrap();
        assert_eq!(m.reason, "a|b");
    }

    #[test]
    fn unknown_token_is_an_error_not_a_rejection() {
        assert!(ModerationService::parse_verdict("MAYBE|hmm").is_err());
        assert!(ModerationService::parse_verdict("").is_err());
    }

    #[test]
    fn tolerates_whitespace_around_token() {
        let m = ModerationService::parse_verdict(" APPROVED ").unwrap();
        assert_eq!(m.verdict, Verdict::Approved);
    }
}
