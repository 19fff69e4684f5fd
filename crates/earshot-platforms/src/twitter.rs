use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use earshot_schema::{
    ActivityKind, Author, Credentials, EngagementCounters, MessageResult, Platform,
    PlatformMetrics, Post, PostRequest, PostResult, UserProfile,
};
use futures_core::Stream;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tokio_stream::StreamExt;

use crate::{
    ActivityRecorder, CredentialManager, PlatformAdapter, PlatformError, PostStream,
    TokenRefresher, TwitterConfig,
};

const RULES_PATH: &str = "/2/tweets/search/stream/rules";
const STREAM_PATH: &str = "/2/tweets/search/stream";
const TWEET_FIELDS: &str =
    "created_at,public_metrics,author_id,conversation_id,referenced_tweets,lang";
const USER_FIELDS: &str = "username,name,profile_image_url,verified,public_metrics";

/// Twitter API v2 adapter using an OAuth 2.0 user token.
pub struct TwitterAdapter {
    client: reqwest::Client,
    api_base: String,
    integration_id: String,
    credentials: CredentialManager,
    activity: ActivityRecorder,
    me: OnceCell<String>,
}

impl TwitterAdapter {
    pub fn new(
        api_base: &str,
        integration_id: String,
        credentials: CredentialManager,
        activity: ActivityRecorder,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            integration_id,
            credentials,
            activity,
            me: OnceCell::new(),
        }
    }

    async fn authed(&self, method: Method, path: &str) -> Result<RequestBuilder, PlatformError> {
        let token = self.credentials.access_token().await?;
        Ok(self
            .client
            .request(method, format!("{}{}", self.api_base, path))
            .bearer_auth(token))
    }

    async fn my_user_id(&self) -> Result<&str, PlatformError> {
        let id = self
            .me
            .get_or_try_init(|| async {
                let req = self.authed(Method::GET, "/2/users/me").await?;
                let env: Envelope<TwUser> = send_json(req).await?;
                env.data
                    .map(|u| u.id)
                    .ok_or_else(|| PlatformError::Decode("users/me returned no data".into()))
            })
            .await?;
        Ok(id.as_str())
    }

    async fn sync_rules(&self, keywords: &[String]) -> Result<(), PlatformError> {
        let existing: Envelope<Vec<StreamRule>> =
            send_json(self.authed(Method::GET, RULES_PATH).await?).await?;
        let ids: Vec<String> = existing
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|rule| rule.id)
            .collect();

        if !ids.is_empty() {
            let req = self
                .authed(Method::POST, RULES_PATH)
                .await?
                .json(&serde_json::json!({ "delete": { "ids": ids } }));
            let _: serde_json::Value = send_json(req).await?;
        }

        let add: Vec<serde_json::Value> = keywords
            .iter()
            .map(|keyword| serde_json::json!({ "value": keyword, "tag": rule_tag(keyword) }))
            .collect();
        if !add.is_empty() {
            let req = self
                .authed(Method::POST, RULES_PATH)
                .await?
                .json(&serde_json::json!({ "add": add }));
            let _: serde_json::Value = send_json(req).await?;
        }
        tracing::debug!(removed = ids.len(), added = add.len(), "synced stream rules");
        Ok(())
    }

    async fn tweet(&self, body: serde_json::Value) -> Result<PostResult, PlatformError> {
        let req = self.authed(Method::POST, "/2/tweets").await?.json(&body);
        let env: Envelope<Created> = send_json(req).await?;
        let created = env
            .data
            .ok_or_else(|| PlatformError::Decode("create tweet returned no data".into()))?;
        Ok(PostResult {
            url: format!("https://twitter.com/i/web/status/{}", created.id),
            id: created.id,
            created_at: Utc::now(),
            platform: Platform::Twitter,
        })
    }
}

#[async_trait]
impl PlatformAdapter for TwitterAdapter {
    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    fn integration_id(&self) -> &str {
        &self.integration_id
    }

    async fn stream_keywords(&self, keywords: &[String]) -> Result<PostStream, PlatformError> {
        self.sync_rules(keywords).await?;

        let req = self.authed(Method::GET, STREAM_PATH).await?.query(&[
            ("tweet.fields", TWEET_FIELDS),
            ("user.fields", USER_FIELDS),
            ("expansions", "author_id"),
        ]);
        let resp = check_status(req.send().await?).await?;
        tracing::info!(integration_id = %self.integration_id, "twitter filtered stream connected");
        Ok(Box::pin(parse_ndjson_stream(resp.bytes_stream())))
    }

    async fn create_post(&self, request: &PostRequest) -> Result<PostResult, PlatformError> {
        let result = self
            .tweet(serde_json::json!({ "text": request.text }))
            .await?;
        self.activity
            .record(
                ActivityKind::Post,
                Some(&result.id),
                Some(&request.text),
                serde_json::Value::Null,
            )
            .await;
        Ok(result)
    }

    async fn reply_to_post(
        &self,
        post_id: &str,
        content: &str,
    ) -> Result<PostResult, PlatformError> {
        let result = self
            .tweet(serde_json::json!({
                "text": content,
                "reply": { "in_reply_to_tweet_id": post_id },
            }))
            .await?;
        self.activity
            .record(
                ActivityKind::Reply,
                Some(&result.id),
                Some(content),
                serde_json::json!({ "original_post_id": post_id }),
            )
            .await;
        Ok(result)
    }

    async fn like_post(&self, post_id: &str) -> Result<(), PlatformError> {
        let me = self.my_user_id().await?;
        let path = format!("/2/users/{}/likes", urlencoding::encode(me));
        let req = self
            .authed(Method::POST, &path)
            .await?
            .json(&serde_json::json!({ "tweet_id": post_id }));
        let _: serde_json::Value = send_json(req).await?;
        self.activity
            .record(
                ActivityKind::Like,
                Some(post_id),
                None,
                serde_json::Value::Null,
            )
            .await;
        Ok(())
    }

    async fn send_direct_message(
        &self,
        user_id: &str,
        content: &str,
    ) -> Result<MessageResult, PlatformError> {
        let path = format!(
            "/2/dm_conversations/with/{}/messages",
            urlencoding::encode(user_id)
        );
        let req = self
            .authed(Method::POST, &path)
            .await?
            .json(&serde_json::json!({ "text": content }));
        let env: Envelope<DmCreated> = send_json(req).await?;
        let created = env
            .data
            .ok_or_else(|| PlatformError::Decode("dm returned no data".into()))?;
        self.activity
            .record(
                ActivityKind::Dm,
                None,
                Some(content),
                serde_json::json!({ "recipient_id": user_id }),
            )
            .await;
        Ok(MessageResult {
            id: created.dm_event_id,
        })
    }

    async fn search_posts(&self, query: &str, limit: usize) -> Result<Vec<Post>, PlatformError> {
        let max_results = limit.clamp(10, 100).to_string();
        let req = self
            .authed(Method::GET, "/2/tweets/search/recent")
            .await?
            .query(&[
                ("query", query),
                ("max_results", max_results.as_str()),
                ("tweet.fields", TWEET_FIELDS),
                ("user.fields", USER_FIELDS),
                ("expansions", "author_id"),
            ]);
        let env: Envelope<Vec<TwTweet>> = send_json(req).await?;

        let mut posts = Vec::new();
        for tweet in env.data.unwrap_or_default().into_iter().take(limit) {
            let id = tweet.id.clone();
            let post = convert_tweet(tweet, &env.includes.users)
                .ok_or_else(|| PlatformError::Decode(format!("author not found for tweet {id}")))?;
            posts.push(post);
        }
        Ok(posts)
    }

    async fn get_user_profile(&self, user_id: &str) -> Result<UserProfile, PlatformError> {
        let path = format!("/2/users/{}", urlencoding::encode(user_id));
        let req = self
            .authed(Method::GET, &path)
            .await?
            .query(&[(
                "user.fields",
                "created_at,description,public_metrics,verified",
            )]);
        let env: Envelope<TwUser> = send_json(req).await?;
        let user = env
            .data
            .ok_or_else(|| PlatformError::Decode(format!("user {user_id} not found")))?;
        let metrics = user.public_metrics.unwrap_or_default();
        Ok(UserProfile {
            id: user.id,
            handle: user.username,
            display_name: user.name,
            bio: user.description,
            verified: user.verified,
            followers: metrics.followers_count,
            following: metrics.following_count,
            posts: metrics.tweet_count,
            created_at: user.created_at,
        })
    }

    async fn get_metrics(&self) -> Result<PlatformMetrics, PlatformError> {
        let req = self
            .authed(Method::GET, "/2/users/me")
            .await?
            .query(&[("user.fields", "public_metrics")]);
        let env: Envelope<TwUser> = send_json(req).await?;
        let metrics = env
            .data
            .and_then(|u| u.public_metrics)
            .ok_or_else(|| PlatformError::Decode("users/me returned no metrics".into()))?;
        Ok(PlatformMetrics {
            followers: metrics.followers_count,
            following: metrics.following_count,
            posts: metrics.tweet_count,
            engagement_rate: 0.0,
        })
    }
}

// ============================================================
// OAuth 2.0 refresh
// ============================================================

pub struct TwitterRefresher {
    client: reqwest::Client,
    api_base: String,
    client_id: String,
    client_secret: Option<String>,
}

impl TwitterRefresher {
    /// `None` when no OAuth client id is configured.
    pub fn new(config: &TwitterConfig) -> Option<Self> {
        let client_id = config.client_id.clone().filter(|id| !id.is_empty())?;
        Some(Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            client_id,
            client_secret: config.client_secret.clone().filter(|s| !s.is_empty()),
        })
    }
}

#[async_trait]
impl TokenRefresher for TwitterRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<Credentials, PlatformError> {
        let mut req = self
            .client
            .post(format!("{}/2/oauth2/token", self.api_base))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
            ]);
        if let Some(secret) = &self.client_secret {
            req = req.basic_auth(&self.client_id, Some(secret));
        }

        let token: TokenResponse = send_json(req).await?;
        Ok(Credentials {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: token
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
        })
    }
}

// ============================================================
// Wire helpers
// ============================================================

async fn check_status(resp: Response) -> Result<Response, PlatformError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

async fn send_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, PlatformError> {
    let resp = check_status(req.send().await?).await?;
    resp.json::<T>()
        .await
        .map_err(|e| PlatformError::Decode(e.to_string()))
}

fn status_error(status: StatusCode, body: &str) -> PlatformError {
    let message = serde_json::from_str::<ApiProblem>(body)
        .ok()
        .and_then(|p| p.detail.or(p.title).or(p.error_description))
        .unwrap_or_else(|| body.trim().to_string());
    if status == StatusCode::UNAUTHORIZED {
        PlatformError::AuthExpired(message)
    } else {
        PlatformError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

fn rule_tag(keyword: &str) -> String {
    format!(
        "keyword_{}",
        keyword.split_whitespace().collect::<Vec<_>>().join("_")
    )
}

fn parse_ndjson_stream(
    byte_stream: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
) -> impl Stream<Item = Result<Post, PlatformError>> + Send {
    async_stream::stream! {
        tokio::pin!(byte_stream);
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = byte_stream.next().await {
            match chunk {
                Ok(bytes) => {
                    buffer.extend_from_slice(&bytes);
                    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = buffer.drain(..=pos).collect();
                        if let Some(post) = parse_stream_line(&line) {
                            yield Ok(post);
                        }
                    }
                }
                Err(e) => {
                    yield Err(PlatformError::Transport(e.to_string()));
                    return;
                }
            }
        }

        if let Some(post) = parse_stream_line(&buffer) {
            yield Ok(post);
        }
    }
}

/// Blank lines are keep-alives. Undecodable lines are skipped.
fn parse_stream_line(line: &[u8]) -> Option<Post> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str::<Envelope<TwTweet>>(text) {
        Ok(env) => {
            let tweet = env.data?;
            let id = tweet.id.clone();
            let post = convert_tweet(tweet, &env.includes.users);
            if post.is_none() {
                tracing::debug!(tweet_id = %id, "stream tweet without author expansion");
            }
            post
        }
        Err(e) => {
            tracing::warn!(error = %e, "skipping undecodable stream line");
            None
        }
    }
}

fn convert_tweet(tweet: TwTweet, users: &[TwUser]) -> Option<Post> {
    let author_id = tweet.author_id.as_deref()?;
    let user = users.iter().find(|u| u.id == author_id)?;
    let metrics = tweet.public_metrics.unwrap_or_default();
    let in_reply_to_id = tweet
        .referenced_tweets
        .iter()
        .find(|r| r.kind == "replied_to")
        .map(|r| r.id.clone());

    Some(Post {
        id: tweet.id,
        platform: Platform::Twitter,
        author: Author {
            id: user.id.clone(),
            handle: user.username.clone(),
            display_name: user.name.clone(),
            verified: user.verified,
            followers: user.public_metrics.as_ref().map(|m| m.followers_count),
            profile_image: user.profile_image_url.clone(),
        },
        text: tweet.text,
        media: Vec::new(),
        metrics: EngagementCounters {
            likes: metrics.like_count,
            shares: metrics.retweet_count,
            comments: metrics.reply_count,
            impressions: metrics.impression_count,
        },
        created_at: tweet.created_at.unwrap_or_else(Utc::now),
        conversation_id: tweet.conversation_id,
        in_reply_to_id,
        language: tweet.lang,
    })
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    includes: Includes,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<TwUser>,
}

#[derive(Debug, Deserialize)]
struct TwTweet {
    id: String,
    text: String,
    #[serde(default)]
    author_id: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    public_metrics: Option<TweetMetrics>,
    #[serde(default)]
    referenced_tweets: Vec<ReferencedTweet>,
    #[serde(default)]
    lang: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TweetMetrics {
    #[serde(default)]
    like_count: u64,
    #[serde(default)]
    retweet_count: u64,
    #[serde(default)]
    reply_count: u64,
    #[serde(default)]
    impression_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ReferencedTweet {
    #[serde(rename = "type")]
    kind: String,
    id: String,
}

#[derive(Debug, Deserialize)]
struct TwUser {
    id: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    verified: bool,
    #[serde(default)]
    profile_image_url: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    public_metrics: Option<UserMetrics>,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetrics {
    #[serde(default)]
    followers_count: u64,
    #[serde(default)]
    following_count: u64,
    #[serde(default)]
    tweet_count: u64,
}

#[derive(Debug, Deserialize)]
struct StreamRule {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DmCreated {
    dm_event_id: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ApiProblem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}
