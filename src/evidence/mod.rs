//! Social evidence source.
//!
//! Fetches the most recent posts authored by a handle from the evidence
//! provider's REST API. Every fetch logs in anew; there is no session or
//! post cache shared between runs.
//!
//! Provider API:
//! - `POST {base}/auth/login` with `{username, password}` → `{token}`
//! - `GET  {base}/users/{identity}/posts?limit=N[&cursor=C]` (bearer auth)
//!   → `{posts: [{text, is_reshare, reshared: {text}?}], next_cursor?}`

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum EvidenceError {
    #[error("evidence provider credentials not configured")]
    MissingCredentials,
    #[error("invalid evidence identity: {0:?}")]
    InvalidIdentity(String),
    #[error("login rejected {status}: {body}")]
    Auth { status: u16, body: String },
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("provider error {status}: {body}")]
    Provider { status: u16, body: String },
}

/// One post as used for classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceItem {
    pub is_reshare: bool,
    pub text: String,
}

#[async_trait]
pub trait EvidenceSource: Send + Sync {
    /// Up to `max_count` most recent posts by `identity`, newest first.
    /// An identity with no posts yields `Ok(vec![])`.
    async fn fetch(&self, identity: &str, max_count: usize)
        -> Result<Vec<EvidenceItem>, EvidenceError>;
}

/// Join the corpus in received order, one item per line.
pub fn join_corpus(items: &[EvidenceItem]) -> String {
    items
        .iter()
        .map(|item| item.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

// ─── Provider wire types ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct PostsPage {
    #[serde(default)]
    posts: Vec<RawPost>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawPost {
    #[serde(default)]
    text: String,
    #[serde(default)]
    is_reshare: bool,
    #[serde(default)]
    reshared: Option<ResharedPost>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResharedPost {
    #[serde(default)]
    text: Option<String>,
}

impl EvidenceItem {
    /// A reshare is read through to the post it reshares; if that text is
    /// missing the wrapper's own text is kept.
    fn from_raw(post: RawPost) -> Self {
        let reshared_text = if post.is_reshare {
            post.reshared
                .and_then(|r| r.text)
                .filter(|t| !t.trim().is_empty())
        } else {
            None
        };

        EvidenceItem {
            is_reshare: post.is_reshare,
            text: reshared_text.unwrap_or(post.text),
        }
    }
}

// ─── HTTP client ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SocialCredentials {
    pub username: String,
    pub password: String,
}

impl SocialCredentials {
    pub fn from_config(username: &str, password: &str) -> Option<Self> {
        if username.is_empty() || password.is_empty() {
            return None;
        }
        Some(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

/// `EvidenceSource` backed by the provider REST API.
pub struct SocialClient {
    client: reqwest::Client,
    base_url: String,
    creds: Option<SocialCredentials>,
    page_size: usize,
}

impl SocialClient {
    pub fn new(
        base_url: String,
        creds: Option<SocialCredentials>,
        page_size: usize,
        timeout: Duration,
    ) -> Result<Self, EvidenceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            creds,
            page_size: page_size.max(1),
        })
    }

    async fn login(&self) -> Result<String, EvidenceError> {
        let creds = self.creds.as_ref().ok_or(EvidenceError::MissingCredentials)?;
        let url = format!("{}/auth/login", self.base_url);

        let resp = self
            .client
            .post(&url)
            .json(&LoginRequest {
                username: &creds.username,
                password: &creds.password,
            })
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status >= 400 {
            let body = resp.text().await.unwrap_or_default();
            return Err(EvidenceError::Auth { status, body });
        }

        let login: LoginResponse = resp.json().await?;
        if login.token.is_empty() {
            return Err(EvidenceError::Auth {
                status,
                body: "empty session token".to_string(),
            });
        }
        debug!(user = %creds.username, "evidence provider session established");
        Ok(login.token)
    }

    async fn fetch_page(
        &self,
        token: &str,
        identity: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<PostsPage, EvidenceError> {
        let url = format!("{}/users/{}/posts", self.base_url, identity);
        let mut query = vec![("limit", limit.to_string())];
        if let Some(c) = cursor {
            query.push(("cursor", c.to_string()));
        }

        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&query)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 401 || status == 403 {
            let body = resp.text().await.unwrap_or_default();
            return Err(EvidenceError::Auth { status, body });
        }
        if status >= 400 {
            let body = resp.text().await.unwrap_or_default();
            return Err(EvidenceError::Provider { status, body });
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl EvidenceSource for SocialClient {
    async fn fetch(
        &self,
        identity: &str,
        max_count: usize,
    ) -> Result<Vec<EvidenceItem>, EvidenceError> {
        let identity = validate_identity(identity)?;
        if max_count == 0 {
            return Ok(Vec::new());
        }

        let token = self.login().await?;

        let mut items: Vec<EvidenceItem> = Vec::with_capacity(max_count);
        let mut cursor: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let want = (max_count - items.len()).min(self.page_size);
            let page = self
                .fetch_page(&token, identity, want, cursor.as_deref())
                .await?;
            pages += 1;

            match absorb_page(&mut items, page, max_count) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        info!(
            identity = %identity,
            posts = items.len(),
            reshares = items.iter().filter(|i| i.is_reshare).count(),
            pages,
            "evidence fetched"
        );

        Ok(items)
    }
}

/// Append one page to `items`, never past `max_count`. Returns the cursor
/// of the next page, or `None` once the cap is reached, the page came back
/// empty or the provider has no further page.
fn absorb_page(items: &mut Vec<EvidenceItem>, page: PostsPage, max_count: usize) -> Option<String> {
    let got = page.posts.len();
    let room = max_count.saturating_sub(items.len());
    items.extend(page.posts.into_iter().take(room).map(EvidenceItem::from_raw));

    let next = page.next_cursor.filter(|c| !c.is_empty())?;
    if got == 0 || items.len() >= max_count {
        return None;
    }
    Some(next)
}

/// Handles are used in a URL path segment; reject anything that is not a
/// plain account name.
fn validate_identity(identity: &str) -> Result<&str, EvidenceError> {
    let handle = identity.trim().trim_start_matches('@');
    let valid = !handle.is_empty()
        && handle
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-');
    if valid {
        Ok(handle)
    } else {
        Err(EvidenceError::InvalidIdentity(identity.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(json: &str) -> RawPost {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_plain_post_keeps_text() {
        let item = EvidenceItem::from_raw(raw(r#"{"text": "it happened", "is_reshare": false}"#));
        assert_eq!(
            item,
            EvidenceItem {
                is_reshare: false,
                text: "it happened".to_string()
            }
        );
    }

    #[test]
    fn test_reshare_reads_through_one_level() {
        let item = EvidenceItem::from_raw(raw(
            r#"{"text": "RT @a: it happ…", "is_reshare": true, "reshared": {"text": "it happened, confirmed"}}"#,
        ));
        assert!(item.is_reshare);
        assert_eq!(item.text, "it happened, confirmed");
    }

    #[test]
    fn test_reshare_falls_back_to_own_text() {
        let missing = EvidenceItem::from_raw(raw(r#"{"text": "RT wrapper", "is_reshare": true}"#));
        assert_eq!(missing.text, "RT wrapper");

        let blank = EvidenceItem::from_raw(raw(
            r#"{"text": "RT wrapper", "is_reshare": true, "reshared": {"text": "  "}}"#,
        ));
        assert_eq!(blank.text, "RT wrapper");
    }

    #[test]
    fn test_non_reshare_ignores_reshared_field() {
        let item = EvidenceItem::from_raw(raw(
            r#"{"text": "own", "is_reshare": false, "reshared": {"text": "other"}}"#,
        ));
        assert_eq!(item.text, "own");
    }

    #[test]
    fn test_page_parsing_defaults() {
        let page: PostsPage = serde_json::from_str(r#"{"posts": []}"#).unwrap();
        assert!(page.posts.is_empty());
        assert!(page.next_cursor.is_none());
    }

    fn page(texts: &[&str], next_cursor: Option<&str>) -> PostsPage {
        PostsPage {
            posts: texts
                .iter()
                .map(|t| RawPost {
                    text: t.to_string(),
                    is_reshare: false,
                    reshared: None,
                })
                .collect(),
            next_cursor: next_cursor.map(str::to_string),
        }
    }

    fn texts(items: &[EvidenceItem]) -> Vec<&str> {
        items.iter().map(|i| i.text.as_str()).collect()
    }

    #[test]
    fn test_absorb_pages_until_cap() {
        let mut items = Vec::new();
        assert_eq!(
            absorb_page(&mut items, page(&["a", "b"], Some("c1")), 5),
            Some("c1".to_string())
        );
        assert_eq!(
            absorb_page(&mut items, page(&["c", "d"], Some("c2")), 5),
            Some("c2".to_string())
        );
        // Third page oversupplies; only one more fits
        assert_eq!(absorb_page(&mut items, page(&["e", "f", "g"], Some("c3")), 5), None);
        assert_eq!(texts(&items), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_absorb_oversized_first_page() {
        let mut items = Vec::new();
        let many: Vec<String> = (0..30).map(|i| format!("post {i}")).collect();
        let refs: Vec<&str> = many.iter().map(String::as_str).collect();

        assert_eq!(absorb_page(&mut items, page(&refs, Some("more")), 20), None);
        assert_eq!(items.len(), 20);
        assert_eq!(items[0].text, "post 0");
        assert_eq!(items[19].text, "post 19");
    }

    #[test]
    fn test_absorb_stops_without_cursor() {
        let mut items = Vec::new();
        assert_eq!(absorb_page(&mut items, page(&["a"], None), 20), None);
        assert_eq!(texts(&items), vec!["a"]);

        let mut items = Vec::new();
        assert_eq!(absorb_page(&mut items, page(&["a"], Some("")), 20), None);
        assert_eq!(texts(&items), vec!["a"]);
    }

    #[test]
    fn test_absorb_stops_on_empty_page() {
        let mut items = vec![EvidenceItem {
            is_reshare: false,
            text: "earlier".into(),
        }];
        assert_eq!(absorb_page(&mut items, page(&[], Some("loop")), 20), None);
        assert_eq!(texts(&items), vec!["earlier"]);
    }

    #[test]
    fn test_absorb_reads_reshares_through() {
        let mut items = Vec::new();
        let page: PostsPage = serde_json::from_str(
            r#"{"posts": [{"text": "RT", "is_reshare": true, "reshared": {"text": "original"}}]}"#,
        )
        .unwrap();
        absorb_page(&mut items, page, 20);
        assert_eq!(
            items,
            vec![EvidenceItem {
                is_reshare: true,
                text: "original".into()
            }]
        );
    }

    #[test]
    fn test_join_corpus_keeps_order() {
        let items = vec![
            EvidenceItem { is_reshare: false, text: "newest".into() },
            EvidenceItem { is_reshare: true, text: "older".into() },
        ];
        assert_eq!(join_corpus(&items), "newest\nolder");
        assert_eq!(join_corpus(&[]), "");
    }

    #[test]
    fn test_validate_identity() {
        assert_eq!(validate_identity("@newsbot").unwrap(), "newsbot");
        assert_eq!(validate_identity("news_bot.1").unwrap(), "news_bot.1");
        assert!(validate_identity("").is_err());
        assert!(validate_identity("../admin").is_err());
        assert!(validate_identity("a b").is_err());
    }

    #[tokio::test]
    async fn test_fetch_without_credentials_fails() {
        let client = SocialClient::new(
            "http://127.0.0.1:9".into(),
            None,
            20,
            Duration::from_secs(1),
        )
        .unwrap();
        let err = client.fetch("newsbot", 20).await.unwrap_err();
        assert!(matches!(err, EvidenceError::MissingCredentials));
    }

    #[tokio::test]
    async fn test_fetch_unreachable_provider_fails() {
        let creds = SocialCredentials::from_config("user", "pass");
        let client =
            SocialClient::new("http://127.0.0.1:9".into(), creds, 20, Duration::from_secs(1))
                .unwrap();
        let err = client.fetch("newsbot", 20).await.unwrap_err();
        assert!(matches!(err, EvidenceError::Request(_)));
    }
}
