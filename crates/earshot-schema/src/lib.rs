pub mod profile;

pub use profile::*;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitter,
    Meta,
    Linkedin,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Twitter, Platform::Meta, Platform::Linkedin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitter => "twitter",
            Platform::Meta => "meta",
            Platform::Linkedin => "linkedin",
        }
    }

    /// Maximum reply length in characters accepted by the network.
    pub fn reply_char_limit(&self) -> usize {
        match self {
            Platform::Twitter => 280,
            Platform::Linkedin => 3000,
            Platform::Meta => 8000,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "twitter" | "x" => Ok(Platform::Twitter),
            "meta" | "facebook" => Ok(Platform::Meta),
            "linkedin" => Ok(Platform::Linkedin),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Author {
    pub id: String,
    pub handle: String,
    pub display_name: String,
    #[serde(default)]
    pub verified: bool,
    /// Follower count when the network includes it with the post.
    #[serde(default)]
    pub followers: Option<u64>,
    #[serde(default)]
    pub profile_image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Gif,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub url: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngagementCounters {
    pub likes: u64,
    pub shares: u64,
    pub comments: u64,
    #[serde(default)]
    pub impressions: Option<u64>,
}

/// A post as received from a platform stream or search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub platform: Platform,
    pub author: Author,
    pub text: String,
    #[serde(default)]
    pub media: Vec<MediaRef>,
    #[serde(default)]
    pub metrics: EngagementCounters,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub in_reply_to_id: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

impl Post {
    /// Platform-qualified identifier, e.g. `twitter:1790000000`.
    pub fn qualified_id(&self) -> String {
        format!("{}:{}", self.platform, self.id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SuggestedAction {
    Engage,
    Monitor,
    Ignore,
}

impl SuggestedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestedAction::Engage => "engage",
            SuggestedAction::Monitor => "monitor",
            SuggestedAction::Ignore => "ignore",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ResponderCategory {
    Sales,
    Marketing,
    Support,
    Operations,
}

impl ResponderCategory {
    pub const ALL: [ResponderCategory; 4] = [
        ResponderCategory::Sales,
        ResponderCategory::Marketing,
        ResponderCategory::Support,
        ResponderCategory::Operations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResponderCategory::Sales => "sales",
            ResponderCategory::Marketing => "marketing",
            ResponderCategory::Support => "support",
            ResponderCategory::Operations => "operations",
        }
    }
}

impl fmt::Display for ResponderCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponderCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sales" => Ok(ResponderCategory::Sales),
            "marketing" => Ok(ResponderCategory::Marketing),
            "support" => Ok(ResponderCategory::Support),
            "operations" => Ok(ResponderCategory::Operations),
            other => Err(format!("unknown responder category: {other}")),
        }
    }
}

/// Classifier verdict for one post against the active keyword set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeywordMatch {
    pub post: Post,
    pub matched_keywords: Vec<String>,
    pub relevance_score: u8,
    pub sentiment: Sentiment,
    pub suggested_action: SuggestedAction,
    pub suggested_category: Option<ResponderCategory>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TriggerAction {
    Reply,
    Like,
    Dm,
    Follow,
    Monitor,
}

impl TriggerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerAction::Reply => "reply",
            TriggerAction::Like => "like",
            TriggerAction::Dm => "dm",
            TriggerAction::Follow => "follow",
            TriggerAction::Monitor => "monitor",
        }
    }

    /// Whether executing this action sends text to the platform.
    pub fn needs_content(&self) -> bool {
        matches!(self, TriggerAction::Reply | TriggerAction::Dm)
    }
}

impl fmt::Display for TriggerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    Pending,
    Completed,
    Failed,
    PendingApproval,
}

impl TriggerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerStatus::Pending => "pending",
            TriggerStatus::Completed => "completed",
            TriggerStatus::Failed => "failed",
            TriggerStatus::PendingApproval => "pending_approval",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TriggerStatus::Pending),
            "completed" => Some(TriggerStatus::Completed),
            "failed" => Some(TriggerStatus::Failed),
            "pending_approval" => Some(TriggerStatus::PendingApproval),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriggerContext {
    pub matched_keywords: Vec<String>,
    pub relevance_score: u8,
    pub sentiment: Sentiment,
}

/// An intent to perform a platform action on behalf of a tenant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowTrigger {
    pub id: Uuid,
    pub tenant_id: String,
    pub category: ResponderCategory,
    pub post: Post,
    pub context: TriggerContext,
    pub action: TriggerAction,
    pub priority: Priority,
    pub status: TriggerStatus,
    pub created_at: DateTime<Utc>,
}

/// Candidate reply produced by the response generator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentReply {
    pub content: String,
    pub confidence: u8,
    pub reasoning: String,
    pub requires_approval: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ApprovalStatus::Pending),
            "approved" => Some(ApprovalStatus::Approved),
            "rejected" => Some(ApprovalStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

impl From<ApprovalDecision> for ApprovalStatus {
    fn from(decision: ApprovalDecision) -> Self {
        match decision {
            ApprovalDecision::Approved => ApprovalStatus::Approved,
            ApprovalDecision::Rejected => ApprovalStatus::Rejected,
        }
    }
}

/// A workflow trigger waiting for a human decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub tenant_id: String,
    pub trigger: WorkflowTrigger,
    #[serde(default)]
    pub candidate: Option<AgentReply>,
    pub reason: String,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub decided_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListenerFilters {
    #[serde(default)]
    pub min_followers: Option<u64>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub exclude_replies: bool,
    #[serde(default)]
    pub exclude_retweets: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListenerActions {
    #[serde(default)]
    pub auto_reply: bool,
    #[serde(default = "default_true")]
    pub notify_human: bool,
    #[serde(default = "default_true")]
    pub trigger_agent: bool,
}

impl Default for ListenerActions {
    fn default() -> Self {
        Self {
            auto_reply: false,
            notify_human: true,
            trigger_agent: true,
        }
    }
}

/// Live listening configuration of one tenant session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListenerConfig {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "default_platforms")]
    pub platforms: Vec<Platform>,
    #[serde(default)]
    pub filters: ListenerFilters,
    #[serde(default)]
    pub actions: ListenerActions,
}

fn default_platforms() -> Vec<Platform> {
    vec![Platform::Twitter]
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            platforms: default_platforms(),
            filters: ListenerFilters::default(),
            actions: ListenerActions::default(),
        }
    }
}

/// Partial configuration update; present fields replace the live ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListenerConfigPatch {
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
    #[serde(default)]
    pub platforms: Option<Vec<Platform>>,
    #[serde(default)]
    pub filters: Option<ListenerFilters>,
    #[serde(default)]
    pub actions: Option<ListenerActions>,
}

impl ListenerConfig {
    pub fn merged(&self, patch: ListenerConfigPatch) -> ListenerConfig {
        ListenerConfig {
            keywords: patch.keywords.unwrap_or_else(|| self.keywords.clone()),
            platforms: patch.platforms.unwrap_or_else(|| self.platforms.clone()),
            filters: patch.filters.unwrap_or_else(|| self.filters.clone()),
            actions: patch.actions.unwrap_or_else(|| self.actions.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ListenerStats {
    pub total_posts: u64,
    pub matched_posts: u64,
    pub agents_triggered: u64,
    pub auto_replies: u64,
    pub human_interventions: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Listening,
    Stopped,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum PlatformStatus {
    Listening,
    Retrying { attempts: u32 },
    Stopped,
}

// ============================================================
// Integrations and platform results
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    /// True when the token expires within `skew` of `now`. Tokens without an
    /// expiry never expire.
    pub fn is_expiring(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= now + skew,
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationStatus {
    Connected,
    Expired,
    Error,
    Disconnected,
}

impl IntegrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationStatus::Connected => "connected",
            IntegrationStatus::Expired => "expired",
            IntegrationStatus::Error => "error",
            IntegrationStatus::Disconnected => "disconnected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "connected" => Some(IntegrationStatus::Connected),
            "expired" => Some(IntegrationStatus::Expired),
            "error" => Some(IntegrationStatus::Error),
            "disconnected" => Some(IntegrationStatus::Disconnected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Integration {
    pub id: String,
    pub tenant_id: String,
    pub platform: Platform,
    pub status: IntegrationStatus,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Post,
    Reply,
    Like,
    Dm,
    Search,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Post => "post",
            ActivityKind::Reply => "reply",
            ActivityKind::Like => "like",
            ActivityKind::Dm => "dm",
            ActivityKind::Search => "search",
        }
    }
}

/// One row of the per-tenant social activity log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityRecord {
    pub tenant_id: String,
    pub integration_id: String,
    pub platform: Platform,
    pub kind: ActivityKind,
    #[serde(default)]
    pub post_id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostRequest {
    pub text: String,
    #[serde(default)]
    pub media: Vec<MediaRef>,
}

impl PostRequest {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            media: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostResult {
    pub id: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub platform: Platform,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageResult {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: String,
    pub handle: String,
    pub display_name: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub verified: bool,
    pub followers: u64,
    pub following: u64,
    pub posts: u64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlatformMetrics {
    pub followers: u64,
    pub following: u64,
    pub posts: u64,
    pub engagement_rate: f64,
}

// ============================================================
// Bus messages
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BusMessage {
    MatchFound {
        tenant_id: String,
        platform: Platform,
        post_id: String,
        relevance_score: u8,
        suggested_action: SuggestedAction,
    },
    AgentTriggered {
        tenant_id: String,
        trigger_id: Uuid,
        category: ResponderCategory,
        action: TriggerAction,
    },
    ApprovalRequested {
        tenant_id: String,
        approval_id: Uuid,
        reason: String,
    },
    ActionExecuted {
        tenant_id: String,
        trigger_id: Uuid,
        action: TriggerAction,
        result_url: Option<String>,
    },
    ActionFailed {
        tenant_id: String,
        trigger_id: Uuid,
        error: String,
    },
    PlatformFailed {
        tenant_id: String,
        platform: Platform,
        error: String,
        attempts: u32,
    },
    ListenerStopped {
        tenant_id: String,
    },
}

impl BusMessage {
    pub fn tenant_id(&self) -> &str {
        match self {
            BusMessage::MatchFound { tenant_id, .. }
            | BusMessage::AgentTriggered { tenant_id, .. }
            | BusMessage::ApprovalRequested { tenant_id, .. }
            | BusMessage::ActionExecuted { tenant_id, .. }
            | BusMessage::ActionFailed { tenant_id, .. }
            | BusMessage::PlatformFailed { tenant_id, .. }
            | BusMessage::ListenerStopped { tenant_id } => tenant_id,
        }
    }
}
