//! Per-tenant business context: profile, responder personalities and the
//! system prompt assembled from them.

use std::collections::HashMap;
use std::sync::Arc;

use earshot_schema::{
    BusinessProfile, BusinessProfilePatch, KnowledgeEntry, ResponderCategory,
    ResponderPersonality,
};
use earshot_store::ContextStore;
use tokio::sync::RwLock;

use crate::ListenError;

const OUTPUT_SCHEMA: &str = r#"Always respond in JSON format:
{
  "content": "your response here",
  "confidence": 0-100,
  "reasoning": "why this response is appropriate",
  "requiresApproval": true/false
}"#;

/// Cache-backed access to tenant context. Writes go through to the store and
/// drop only the written tenant's cache entries.
pub struct BusinessContextStore {
    store: Arc<dyn ContextStore>,
    profiles: RwLock<HashMap<String, BusinessProfile>>,
    personalities: RwLock<HashMap<(String, ResponderCategory), ResponderPersonality>>,
}

impl BusinessContextStore {
    pub fn new(store: Arc<dyn ContextStore>) -> Self {
        Self {
            store,
            profiles: RwLock::new(HashMap::new()),
            personalities: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get_profile(&self, tenant_id: &str) -> Result<BusinessProfile, ListenError> {
        if let Some(profile) = self.profiles.read().await.get(tenant_id) {
            return Ok(profile.clone());
        }

        let profile = match self.store.load_profile(tenant_id).await? {
            Some(profile) => profile,
            None => {
                let display_name = self.store.tenant_display_name(tenant_id).await?;
                tracing::debug!(tenant_id, "no saved business profile, using defaults");
                BusinessProfile::default_for(tenant_id, display_name.as_deref())
            }
        };

        self.profiles
            .write()
            .await
            .insert(tenant_id.to_string(), profile.clone());
        Ok(profile)
    }

    pub async fn get_personality(
        &self,
        tenant_id: &str,
        category: ResponderCategory,
    ) -> Result<ResponderPersonality, ListenError> {
        let key = (tenant_id.to_string(), category);
        if let Some(personality) = self.personalities.read().await.get(&key) {
            return Ok(personality.clone());
        }

        let personality = match self.store.load_personality(tenant_id, category).await? {
            Some(personality) => personality,
            None => {
                let profile = self.get_profile(tenant_id).await?;
                ResponderPersonality::default_for(&profile, category)
            }
        };

        self.personalities
            .write()
            .await
            .insert(key, personality.clone());
        Ok(personality)
    }

    /// Applies `patch` on top of the current profile and persists the result.
    pub async fn update_profile(
        &self,
        tenant_id: &str,
        patch: BusinessProfilePatch,
    ) -> Result<BusinessProfile, ListenError> {
        let mut profile = self.get_profile(tenant_id).await?;
        profile.apply(patch);
        self.store.save_profile(&profile).await?;
        self.invalidate(tenant_id).await;
        tracing::info!(tenant_id, "business profile updated");
        Ok(profile)
    }

    pub async fn save_personality(
        &self,
        personality: ResponderPersonality,
    ) -> Result<ResponderPersonality, ListenError> {
        self.store.save_personality(&personality).await?;
        self.invalidate(&personality.tenant_id).await;
        tracing::info!(
            tenant_id = %personality.tenant_id,
            category = %personality.category,
            "responder personality updated"
        );
        Ok(personality)
    }

    pub async fn invalidate(&self, tenant_id: &str) {
        self.profiles.write().await.remove(tenant_id);
        self.personalities
            .write()
            .await
            .retain(|(tenant, _), _| tenant != tenant_id);
    }

    pub async fn build_system_prompt(
        &self,
        tenant_id: &str,
        category: ResponderCategory,
    ) -> Result<String, ListenError> {
        let profile = self.get_profile(tenant_id).await?;
        let personality = self.get_personality(tenant_id, category).await?;
        Ok(system_prompt(&profile, &personality))
    }

    pub async fn search_knowledge_base(
        &self,
        tenant_id: &str,
        query: &str,
    ) -> Result<Vec<KnowledgeEntry>, ListenError> {
        let profile = self.get_profile(tenant_id).await?;
        Ok(search_knowledge(&profile.knowledge_base, query))
    }
}

/// Entries whose tags occur in the query or whose question contains it,
/// most matching tags first. Ties keep knowledge base order.
pub fn search_knowledge(entries: &[KnowledgeEntry], query: &str) -> Vec<KnowledgeEntry> {
    let query = query.to_lowercase();
    let tag_hits = |entry: &KnowledgeEntry| {
        entry
            .keywords
            .iter()
            .map(|k| k.to_lowercase())
            .filter(|k| !k.is_empty() && query.contains(k.as_str()))
            .count()
    };

    let mut hits: Vec<(usize, &KnowledgeEntry)> = entries
        .iter()
        .filter_map(|entry| {
            let tags = tag_hits(entry);
            let question_hit = !query.is_empty() && entry.question.to_lowercase().contains(&query);
            (tags > 0 || question_hit).then_some((tags, entry))
        })
        .collect();
    hits.sort_by(|a, b| b.0.cmp(&a.0));
    hits.into_iter().map(|(_, entry)| entry.clone()).collect()
}

fn role_duties(category: ResponderCategory) -> &'static [&'static str] {
    match category {
        ResponderCategory::Sales => &[
            "Qualify leads and identify potential customers",
            "Provide information about products, services, and pricing",
            "Guide prospects through the sales process",
            "Schedule demos and consultations",
            "Keep responses focused on value and ROI",
        ],
        ResponderCategory::Marketing => &[
            "Engage with community discussions",
            "Share valuable content and insights",
            "Promote products/services naturally in context",
            "Build brand awareness and positive sentiment",
            "Foster relationships with potential customers",
        ],
        ResponderCategory::Support => &[
            "Troubleshoot technical issues",
            "Answer questions about features and functionality",
            "Provide guidance on best practices",
            "Escalate complex issues when needed",
            "Ensure customer satisfaction and retention",
        ],
        ResponderCategory::Operations => &[
            "Handle technical and API questions",
            "Assist with integrations and implementations",
            "Address developer inquiries",
            "Monitor system performance concerns",
            "Coordinate with technical team",
        ],
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

fn bullets<'a>(items: impl IntoIterator<Item = &'a String>) -> String {
    items
        .into_iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Assembles the instruction block in a fixed section order. Sections with
/// nothing to say are left out entirely.
pub fn system_prompt(profile: &BusinessProfile, personality: &ResponderPersonality) -> String {
    let category = personality.category;
    let mut parts = Vec::new();

    parts.push(format!(
        "You are a {category} AI agent for {}.",
        profile.business_name
    ));

    let mut business = vec![format!("- Industry: {}", profile.industry)];
    if !profile.description.is_empty() {
        business.push(format!("- Description: {}", profile.description));
    }
    if let Some(website) = profile.website.as_deref().filter(|w| !w.is_empty()) {
        business.push(format!("- Website: {website}"));
    }
    parts.push(format!("BUSINESS CONTEXT:\n{}", business.join("\n")));

    let mut voice = vec![format!("BRAND VOICE: {}", profile.brand_voice.as_str())];
    if let Some(custom) = profile.custom_brand_voice.as_deref().filter(|v| !v.is_empty()) {
        voice.push(format!("Custom Voice: {custom}"));
    }
    if !profile.tone_attributes.is_empty() {
        voice.push(format!(
            "Tone Attributes: {}",
            profile.tone_attributes.join(", ")
        ));
    }
    parts.push(voice.join("\n"));

    if !profile.products.is_empty() {
        let mut lines = vec!["PRODUCTS:".to_string()];
        for product in &profile.products {
            lines.push(format!("- {}: {}", product.name, product.description));
            if !product.features.is_empty() {
                lines.push(format!("  Features: {}", product.features.join(", ")));
            }
            if let Some(pricing) = &product.pricing {
                lines.push(format!("  Pricing: {pricing}"));
            }
        }
        parts.push(lines.join("\n"));
    }

    if !profile.services.is_empty() {
        let mut lines = vec!["SERVICES:".to_string()];
        for service in &profile.services {
            lines.push(format!("- {}: {}", service.name, service.description));
            if !service.benefits.is_empty() {
                lines.push(format!("  Benefits: {}", service.benefits.join(", ")));
            }
        }
        parts.push(lines.join("\n"));
    }

    if !profile.pricing_tiers.is_empty() {
        let mut lines = vec!["PRICING TIERS:".to_string()];
        for tier in &profile.pricing_tiers {
            let marker = if tier.recommended { " (RECOMMENDED)" } else { "" };
            lines.push(format!("- {}: {}{marker}", tier.name, tier.price));
            if !tier.features.is_empty() {
                lines.push(format!("  Features: {}", tier.features.join(", ")));
            }
        }
        parts.push(lines.join("\n"));
    }

    let audience = &profile.target_audience;
    if !audience.is_empty() {
        let mut lines = vec!["TARGET AUDIENCE:".to_string()];
        if !audience.demographics.is_empty() {
            lines.push(format!("Demographics: {}", audience.demographics.join(", ")));
        }
        if !audience.industries.is_empty() {
            lines.push(format!("Industries: {}", audience.industries.join(", ")));
        }
        if !audience.pain_points.is_empty() {
            lines.push(format!("Pain Points: {}", audience.pain_points.join(", ")));
        }
        parts.push(lines.join("\n"));
    }

    if !profile.unique_selling_points.is_empty() {
        parts.push(format!(
            "UNIQUE SELLING POINTS:\n{}",
            bullets(&profile.unique_selling_points)
        ));
    }

    if !profile.knowledge_base.is_empty() {
        let entries = profile
            .knowledge_base
            .iter()
            .map(|entry| format!("Q: {}\nA: {}", entry.question, entry.answer))
            .collect::<Vec<_>>()
            .join("\n\n");
        parts.push(format!("KNOWLEDGE BASE:\n{entries}"));
    }

    let mut role = vec![format!(
        "YOUR ROLE AS {} AGENT:",
        category.as_str().to_uppercase()
    )];
    role.extend(role_duties(category).iter().map(|duty| format!("- {duty}")));
    if !personality.response_style.is_empty() {
        role.push(format!("Response style: {}", personality.response_style));
    }
    if !personality.requires_context.is_empty() {
        role.push(format!(
            "Before replying, look for: {}",
            personality.requires_context.join(", ")
        ));
    }
    if !personality.system_prompt.trim().is_empty() {
        role.push(personality.system_prompt.trim().to_string());
    }
    parts.push(role.join("\n"));

    let rules = &personality.rules;
    let mut rule_lines = vec![
        "RESPONSE RULES:".to_string(),
        format!(
            "- Maximum response length: {} characters",
            rules.max_response_length
        ),
        format!("- Include links: {}", yes_no(rules.include_links)),
        format!("- Use emojis: {}", yes_no(rules.include_emojis)),
        format!("- Use hashtags: {}", yes_no(rules.include_hashtags)),
        format!("- Mention competitors: {}", yes_no(rules.mention_competitors)),
    ];
    if rules.offer_discounts {
        rule_lines.push(format!(
            "- Can offer discounts up to {}%",
            rules.max_discount_percent.unwrap_or(10)
        ));
    }
    parts.push(rule_lines.join("\n"));

    let guidelines = &profile.social_guidelines;
    let mut guideline_lines = Vec::new();
    if !guidelines.topics_to_avoid.is_empty() {
        guideline_lines.push(format!(
            "TOPICS TO AVOID: {}",
            guidelines.topics_to_avoid.join(", ")
        ));
    }
    if !guidelines.hashtags_to_use.is_empty() {
        guideline_lines.push(format!(
            "PREFERRED HASHTAGS: {}",
            guidelines.hashtags_to_use.join(", ")
        ));
    }
    if !guidelines.hashtags_to_avoid.is_empty() {
        guideline_lines.push(format!(
            "HASHTAGS TO AVOID: {}",
            guidelines.hashtags_to_avoid.join(", ")
        ));
    }
    if !guideline_lines.is_empty() {
        parts.push(guideline_lines.join("\n"));
    }

    if !personality.example_responses.is_empty() {
        let examples = personality
            .example_responses
            .iter()
            .map(|example| {
                format!(
                    "Scenario: {}\nUser: \"{}\"\nResponse: \"{}\"\nReasoning: {}",
                    example.scenario,
                    example.user_message,
                    example.agent_response,
                    example.reasoning
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        parts.push(format!("EXAMPLE RESPONSES:\n{examples}"));
    }

    parts.push(OUTPUT_SCHEMA.to_string());
    parts.join("\n\n")
}
