use std::sync::atomic::{AtomicU64, Ordering};

use earshot_schema::ListenerStats;

/// Running counters of one listener session, shared by its platform tasks.
#[derive(Debug, Default)]
pub struct SessionStats {
    total_posts: AtomicU64,
    matched_posts: AtomicU64,
    agents_triggered: AtomicU64,
    auto_replies: AtomicU64,
    human_interventions: AtomicU64,
}

impl SessionStats {
    pub fn post_seen(&self) {
        self.total_posts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn post_matched(&self) {
        self.matched_posts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn agent_triggered(&self) {
        self.agents_triggered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn auto_reply_sent(&self) {
        self.auto_replies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn human_intervention(&self) {
        self.human_interventions.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy; later updates are not reflected in it.
    pub fn snapshot(&self) -> ListenerStats {
        ListenerStats {
            total_posts: self.total_posts.load(Ordering::Relaxed),
            matched_posts: self.matched_posts.load(Ordering::Relaxed),
            agents_triggered: self.agents_triggered.load(Ordering::Relaxed),
            auto_replies: self.auto_replies.load(Ordering::Relaxed),
            human_interventions: self.human_interventions.load(Ordering::Relaxed),
        }
    }
}
