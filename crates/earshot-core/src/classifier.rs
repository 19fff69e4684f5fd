//! Keyword classifier for incoming posts.
//!
//! Everything in here is pure: identical inputs give identical verdicts.
//! Alternative scoring plugs in through [`RelevanceScorer`].

use std::sync::Arc;

use earshot_schema::{
    KeywordMatch, Post, Priority, ResponderCategory, Sentiment, SuggestedAction, TriggerAction,
};

use crate::ListenError;

const POSITIVE_WORDS: &[&str] = &[
    "great",
    "love",
    "awesome",
    "excellent",
    "amazing",
    "perfect",
    "thanks",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad",
    "hate",
    "terrible",
    "awful",
    "poor",
    "worst",
    "disappointed",
];

/// Category buckets, checked in order against the matched keywords.
const CATEGORY_TERMS: &[(ResponderCategory, &[&str])] = &[
    (
        ResponderCategory::Sales,
        &["pricing", "cost", "buy", "purchase", "upgrade", "enterprise"],
    ),
    (
        ResponderCategory::Support,
        &["help", "issue", "problem", "bug", "error", "support", "question"],
    ),
    (
        ResponderCategory::Marketing,
        &["feature", "announcement", "new", "update", "launch"],
    ),
    (
        ResponderCategory::Operations,
        &["api", "integration", "deployment", "performance"],
    ),
];

pub const MIN_RELEVANCE: u8 = 30;

/// Scores a post given the keywords it matched. Must stay within 0..=100.
pub trait RelevanceScorer: Send + Sync {
    fn score(&self, post: &Post, matched: &[String]) -> u8;
}

/// `20` per distinct keyword plus `10` each for a verified author, more than
/// 100 likes and more than 50 shares, capped at 100.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordCountScorer;

impl RelevanceScorer for KeywordCountScorer {
    fn score(&self, post: &Post, matched: &[String]) -> u8 {
        let mut score = 20u64.saturating_mul(matched.len() as u64);
        if post.author.verified {
            score += 10;
        }
        if post.metrics.likes > 100 {
            score += 10;
        }
        if post.metrics.shares > 50 {
            score += 10;
        }
        score.min(100) as u8
    }
}

#[derive(Clone)]
pub struct PostClassifier {
    scorer: Arc<dyn RelevanceScorer>,
}

impl Default for PostClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl PostClassifier {
    pub fn new() -> Self {
        Self {
            scorer: Arc::new(KeywordCountScorer),
        }
    }

    pub fn with_scorer(scorer: Arc<dyn RelevanceScorer>) -> Self {
        Self { scorer }
    }

    pub fn classify(&self, post: &Post, keywords: &[String]) -> Result<KeywordMatch, ListenError> {
        if post.id.trim().is_empty() {
            return Err(ListenError::ClassificationInput(format!(
                "{} post without an id",
                post.platform
            )));
        }

        let matched_keywords = match_keywords(&post.text, keywords);
        let relevance_score = self.scorer.score(post, &matched_keywords).min(100);
        let sentiment = detect_sentiment(&post.text);
        let suggested_action = suggest_action(relevance_score, sentiment);
        let suggested_category = Some(suggest_category(&matched_keywords, sentiment));

        Ok(KeywordMatch {
            post: post.clone(),
            matched_keywords,
            relevance_score,
            sentiment,
            suggested_action,
            suggested_category,
        })
    }
}

/// Classifies with the default keyword-count scorer.
pub fn classify(post: &Post, keywords: &[String]) -> Result<KeywordMatch, ListenError> {
    PostClassifier::new().classify(post, keywords)
}

/// Keywords whose lower-cased form occurs in the lower-cased text, in
/// configuration order, without case-insensitive duplicates.
pub fn match_keywords(text: &str, keywords: &[String]) -> Vec<String> {
    let haystack = text.to_lowercase();
    let mut seen: Vec<String> = Vec::new();
    let mut matched = Vec::new();
    for keyword in keywords {
        let needle = keyword.trim().to_lowercase();
        if needle.is_empty() || seen.contains(&needle) {
            continue;
        }
        if haystack.contains(&needle) {
            seen.push(needle);
            matched.push(keyword.clone());
        }
    }
    matched
}

/// Whole-token word counting; punctuation attached to a word defeats the match.
pub fn detect_sentiment(text: &str) -> Sentiment {
    let lowered = text.to_lowercase();
    let mut score: i64 = 0;
    for token in lowered.split_whitespace() {
        if POSITIVE_WORDS.contains(&token) {
            score += 1;
        }
        if NEGATIVE_WORDS.contains(&token) {
            score -= 1;
        }
    }
    match score {
        s if s > 0 => Sentiment::Positive,
        s if s < 0 => Sentiment::Negative,
        _ => Sentiment::Neutral,
    }
}

pub fn suggest_action(relevance: u8, sentiment: Sentiment) -> SuggestedAction {
    if relevance > 60 && sentiment != Sentiment::Negative {
        SuggestedAction::Engage
    } else if relevance < MIN_RELEVANCE {
        SuggestedAction::Ignore
    } else {
        SuggestedAction::Monitor
    }
}

pub fn suggest_category(matched: &[String], sentiment: Sentiment) -> ResponderCategory {
    let joined = matched.join(" ").to_lowercase();
    for (category, terms) in CATEGORY_TERMS {
        if terms.iter().any(|term| joined.contains(term)) {
            return *category;
        }
    }
    match sentiment {
        Sentiment::Negative => ResponderCategory::Support,
        Sentiment::Positive => ResponderCategory::Marketing,
        Sentiment::Neutral => ResponderCategory::Sales,
    }
}

/// Platform action a responder should take for a match.
pub fn determine_action(keyword_match: &KeywordMatch) -> TriggerAction {
    let relevance = keyword_match.relevance_score;
    if relevance > 80 && keyword_match.sentiment == Sentiment::Positive {
        TriggerAction::Reply
    } else if relevance > 60 {
        TriggerAction::Like
    } else {
        TriggerAction::Monitor
    }
}

pub fn determine_priority(relevance: u8) -> Priority {
    match relevance {
        r if r > 90 => Priority::Critical,
        r if r > 70 => Priority::High,
        r if r > 50 => Priority::Medium,
        _ => Priority::Low,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use earshot_schema::{Author, EngagementCounters, Platform};

    fn post(text: &str, verified: bool, likes: u64, shares: u64) -> Post {
        Post {
            id: "1790".into(),
            platform: Platform::Twitter,
            author: Author {
                id: "42".into(),
                handle: "alice".into(),
                display_name: "Alice".into(),
                verified,
                followers: Some(1200),
                profile_image: None,
            },
            text: text.into(),
            media: Vec::new(),
            metrics: EngagementCounters {
                likes,
                shares,
                comments: 0,
                impressions: None,
            },
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            conversation_id: None,
            in_reply_to_id: None,
            language: Some("en".into()),
        }
    }

    fn keywords(list: &[&str]) -> Vec<String> {
        list.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn verified_author_with_likes_is_monitored_as_sales() {
        let p = post("Love this daw! pricing looks great", true, 150, 0);
        let m = classify(&p, &keywords(&["daw", "pricing"])).unwrap();

        assert_eq!(m.matched_keywords, keywords(&["daw", "pricing"]));
        assert_eq!(m.relevance_score, 60);
        assert_eq!(m.sentiment, Sentiment::Positive);
        assert_eq!(m.suggested_action, SuggestedAction::Monitor);
        assert_eq!(m.suggested_category, Some(ResponderCategory::Sales));
    }

    #[test]
    fn shares_push_the_same_post_into_engage() {
        let p = post("Love this daw! pricing looks great", true, 200, 60);
        let m = classify(&p, &keywords(&["daw", "pricing"])).unwrap();

        assert_eq!(m.relevance_score, 70);
        assert_eq!(m.suggested_action, SuggestedAction::Engage);
    }

    #[test]
    fn classify_is_deterministic() {
        let p = post("Terrible bug in the api, help", false, 3, 1);
        let kw = keywords(&["bug", "api", "help"]);
        assert_eq!(classify(&p, &kw).unwrap(), classify(&p, &kw).unwrap());
    }

    #[test]
    fn relevance_is_capped_and_monotone_in_matches() {
        let p = post("a b c d e f g", true, 500, 500);
        let all = keywords(&["a", "b", "c", "d", "e", "f", "g"]);
        let mut previous = 0;
        for n in 0..=all.len() {
            let score = KeywordCountScorer.score(&p, &all[..n]);
            assert!(score >= previous);
            assert!(score <= 100);
            previous = score;
        }
        assert_eq!(previous, 100);
    }

    #[test]
    fn keyword_matching_ignores_case_and_duplicates() {
        let matched = match_keywords("Our DAW crashed", &keywords(&["daw", "Daw", " ", "synth"]));
        assert_eq!(matched, keywords(&["daw"]));
    }

    #[test]
    fn sentiment_counts_whole_tokens_only() {
        assert_eq!(detect_sentiment("great stuff"), Sentiment::Positive);
        assert_eq!(detect_sentiment("great! stuff"), Sentiment::Neutral);
        assert_eq!(detect_sentiment("love it but worst update, bad"), Sentiment::Negative);
        assert_eq!(detect_sentiment("love it, hate it"), Sentiment::Neutral);
    }

    #[test]
    fn low_relevance_is_ignored_and_negative_never_engages() {
        assert_eq!(suggest_action(20, Sentiment::Positive), SuggestedAction::Ignore);
        assert_eq!(suggest_action(30, Sentiment::Neutral), SuggestedAction::Monitor);
        assert_eq!(suggest_action(100, Sentiment::Negative), SuggestedAction::Monitor);
        assert_eq!(suggest_action(61, Sentiment::Neutral), SuggestedAction::Engage);
    }

    #[test]
    fn category_buckets_follow_priority_order() {
        let cat = |kw: &[&str], s| suggest_category(&keywords(kw), s);
        assert_eq!(cat(&["bug", "pricing"], Sentiment::Neutral), ResponderCategory::Sales);
        assert_eq!(cat(&["bug", "launch"], Sentiment::Neutral), ResponderCategory::Support);
        assert_eq!(cat(&["launch", "api"], Sentiment::Neutral), ResponderCategory::Marketing);
        assert_eq!(cat(&["API"], Sentiment::Positive), ResponderCategory::Operations);
    }

    #[test]
    fn category_falls_back_on_sentiment() {
        let kw = keywords(&["daw"]);
        assert_eq!(suggest_category(&kw, Sentiment::Negative), ResponderCategory::Support);
        assert_eq!(suggest_category(&kw, Sentiment::Positive), ResponderCategory::Marketing);
        assert_eq!(suggest_category(&kw, Sentiment::Neutral), ResponderCategory::Sales);
    }

    #[test]
    fn empty_post_id_is_an_input_error() {
        let mut p = post("daw", false, 0, 0);
        p.id.clear();
        let err = classify(&p, &keywords(&["daw"])).unwrap_err();
        assert!(matches!(err, ListenError::ClassificationInput(_)));
    }

    #[test]
    fn custom_scorer_is_clamped() {
        struct Loud;
        impl RelevanceScorer for Loud {
            fn score(&self, _: &Post, _: &[String]) -> u8 {
                250
            }
        }
        let classifier = PostClassifier::with_scorer(Arc::new(Loud));
        let m = classifier.classify(&post("daw", false, 0, 0), &keywords(&["daw"])).unwrap();
        assert_eq!(m.relevance_score, 100);
    }

    #[test]
    fn action_and_priority_thresholds() {
        let p = post("Love this daw", true, 200, 60);
        let mut m = classify(&p, &keywords(&["daw"])).unwrap();

        m.relevance_score = 81;
        assert_eq!(determine_action(&m), TriggerAction::Reply);
        m.sentiment = Sentiment::Neutral;
        assert_eq!(determine_action(&m), TriggerAction::Like);
        m.relevance_score = 60;
        assert_eq!(determine_action(&m), TriggerAction::Monitor);

        assert_eq!(determine_priority(91), Priority::Critical);
        assert_eq!(determine_priority(90), Priority::High);
        assert_eq!(determine_priority(71), Priority::High);
        assert_eq!(determine_priority(70), Priority::Medium);
        assert_eq!(determine_priority(50), Priority::Low);
    }
}
