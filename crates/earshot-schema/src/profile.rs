use serde::{Deserialize, Serialize};

use crate::ResponderCategory;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BrandVoice {
    #[default]
    Professional,
    Casual,
    Friendly,
    Technical,
    Enthusiastic,
    Custom,
}

impl BrandVoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrandVoice::Professional => "professional",
            BrandVoice::Casual => "casual",
            BrandVoice::Friendly => "friendly",
            BrandVoice::Technical => "technical",
            BrandVoice::Enthusiastic => "enthusiastic",
            BrandVoice::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductInfo {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub pricing: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub benefits: Vec<String>,
    #[serde(default)]
    pub pricing: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PricingTier {
    pub name: String,
    pub price: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub recommended: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetAudience {
    #[serde(default)]
    pub demographics: Vec<String>,
    #[serde(default)]
    pub industries: Vec<String>,
    #[serde(default)]
    pub pain_points: Vec<String>,
}

impl TargetAudience {
    pub fn is_empty(&self) -> bool {
        self.demographics.is_empty() && self.industries.is_empty() && self.pain_points.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct KnowledgeEntry {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseTime {
    Immediate,
    #[default]
    #[serde(rename = "within_1hr")]
    Within1hr,
    #[serde(rename = "within_24hr")]
    Within24hr,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalPolicy {
    Always,
    #[default]
    HighRiskOnly,
    Never,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SocialGuidelines {
    #[serde(default)]
    pub hashtags_to_use: Vec<String>,
    #[serde(default)]
    pub hashtags_to_avoid: Vec<String>,
    #[serde(default)]
    pub topics_to_avoid: Vec<String>,
    #[serde(default)]
    pub response_time: ResponseTime,
    #[serde(default)]
    pub approval_policy: ApprovalPolicy,
}

/// Per-tenant business description used to ground generated replies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BusinessProfile {
    pub tenant_id: String,
    pub business_name: String,
    pub industry: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub brand_voice: BrandVoice,
    #[serde(default)]
    pub custom_brand_voice: Option<String>,
    #[serde(default)]
    pub tone_attributes: Vec<String>,
    #[serde(default)]
    pub products: Vec<ProductInfo>,
    #[serde(default)]
    pub services: Vec<ServiceInfo>,
    #[serde(default)]
    pub pricing_tiers: Vec<PricingTier>,
    #[serde(default)]
    pub target_audience: TargetAudience,
    #[serde(default)]
    pub unique_selling_points: Vec<String>,
    #[serde(default)]
    pub competitors: Vec<String>,
    #[serde(default)]
    pub knowledge_base: Vec<KnowledgeEntry>,
    #[serde(default)]
    pub social_guidelines: SocialGuidelines,
}

impl BusinessProfile {
    /// Profile used for a tenant that never saved one.
    pub fn default_for(tenant_id: &str, display_name: Option<&str>) -> Self {
        let business_name = display_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or("My Business")
            .to_string();
        Self {
            tenant_id: tenant_id.to_string(),
            business_name,
            industry: "Technology".to_string(),
            description: "A business using automated social media engagement".to_string(),
            website: None,
            brand_voice: BrandVoice::Professional,
            custom_brand_voice: None,
            tone_attributes: vec![
                "helpful".to_string(),
                "professional".to_string(),
                "responsive".to_string(),
            ],
            products: Vec::new(),
            services: Vec::new(),
            pricing_tiers: Vec::new(),
            target_audience: TargetAudience::default(),
            unique_selling_points: Vec::new(),
            competitors: Vec::new(),
            knowledge_base: Vec::new(),
            social_guidelines: SocialGuidelines {
                topics_to_avoid: vec!["politics".to_string(), "religion".to_string()],
                ..SocialGuidelines::default()
            },
        }
    }

    pub fn apply(&mut self, patch: BusinessProfilePatch) {
        if let Some(v) = patch.business_name {
            self.business_name = v;
        }
        if let Some(v) = patch.industry {
            self.industry = v;
        }
        if let Some(v) = patch.description {
            self.description = v;
        }
        if let Some(v) = patch.website {
            self.website = Some(v);
        }
        if let Some(v) = patch.brand_voice {
            self.brand_voice = v;
        }
        if let Some(v) = patch.custom_brand_voice {
            self.custom_brand_voice = Some(v);
        }
        if let Some(v) = patch.tone_attributes {
            self.tone_attributes = v;
        }
        if let Some(v) = patch.products {
            self.products = v;
        }
        if let Some(v) = patch.services {
            self.services = v;
        }
        if let Some(v) = patch.pricing_tiers {
            self.pricing_tiers = v;
        }
        if let Some(v) = patch.target_audience {
            self.target_audience = v;
        }
        if let Some(v) = patch.unique_selling_points {
            self.unique_selling_points = v;
        }
        if let Some(v) = patch.competitors {
            self.competitors = v;
        }
        if let Some(v) = patch.knowledge_base {
            self.knowledge_base = v;
        }
        if let Some(v) = patch.social_guidelines {
            self.social_guidelines = v;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BusinessProfilePatch {
    #[serde(default)]
    pub business_name: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub brand_voice: Option<BrandVoice>,
    #[serde(default)]
    pub custom_brand_voice: Option<String>,
    #[serde(default)]
    pub tone_attributes: Option<Vec<String>>,
    #[serde(default)]
    pub products: Option<Vec<ProductInfo>>,
    #[serde(default)]
    pub services: Option<Vec<ServiceInfo>>,
    #[serde(default)]
    pub pricing_tiers: Option<Vec<PricingTier>>,
    #[serde(default)]
    pub target_audience: Option<TargetAudience>,
    #[serde(default)]
    pub unique_selling_points: Option<Vec<String>>,
    #[serde(default)]
    pub competitors: Option<Vec<String>>,
    #[serde(default)]
    pub knowledge_base: Option<Vec<KnowledgeEntry>>,
    #[serde(default)]
    pub social_guidelines: Option<SocialGuidelines>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponseRules {
    pub max_response_length: usize,
    pub include_links: bool,
    pub include_emojis: bool,
    pub include_hashtags: bool,
    pub mention_competitors: bool,
    pub offer_discounts: bool,
    #[serde(default)]
    pub max_discount_percent: Option<u8>,
}

impl ResponseRules {
    pub fn default_for(category: ResponderCategory) -> Self {
        use ResponderCategory::*;
        Self {
            max_response_length: 280,
            include_links: matches!(category, Sales | Marketing),
            include_emojis: matches!(category, Marketing | Support),
            include_hashtags: matches!(category, Marketing),
            mention_competitors: false,
            offer_discounts: matches!(category, Sales),
            max_discount_percent: Some(10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExampleResponse {
    pub scenario: String,
    pub user_message: String,
    pub agent_response: String,
    #[serde(default)]
    pub reasoning: String,
}

pub const DEFAULT_CONFIDENCE_THRESHOLD: u8 = 80;

fn default_confidence_threshold() -> u8 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

/// Behavioral rules for one responder category of one tenant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponderPersonality {
    pub tenant_id: String,
    pub category: ResponderCategory,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub response_style: String,
    #[serde(default)]
    pub example_responses: Vec<ExampleResponse>,
    pub rules: ResponseRules,
    #[serde(default)]
    pub requires_context: Vec<String>,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: u8,
}

impl ResponderPersonality {
    pub fn default_for(profile: &BusinessProfile, category: ResponderCategory) -> Self {
        Self {
            tenant_id: profile.tenant_id.clone(),
            category,
            system_prompt: String::new(),
            response_style: profile.brand_voice.as_str().to_string(),
            example_responses: Vec::new(),
            rules: ResponseRules::default_for(category),
            requires_context: default_required_context(category)
                .iter()
                .map(|s| s.to_string())
                .collect(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

pub fn default_required_context(category: ResponderCategory) -> &'static [&'static str] {
    match category {
        ResponderCategory::Sales => &["user_intent", "budget_indication", "company_size"],
        ResponderCategory::Marketing => &["user_interests", "engagement_history"],
        ResponderCategory::Support => &["issue_description", "product_version", "error_messages"],
        ResponderCategory::Operations => &["technical_details", "api_version", "integration_type"],
    }
}
