use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use earshot_schema::BusMessage;
use tokio::sync::{mpsc, RwLock};

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum Topic {
    MatchFound,
    AgentTriggered,
    ApprovalRequested,
    ActionExecuted,
    ActionFailed,
    PlatformFailed,
    ListenerStopped,
}

impl Topic {
    pub const ALL: [Topic; 7] = [
        Topic::MatchFound,
        Topic::AgentTriggered,
        Topic::ApprovalRequested,
        Topic::ActionExecuted,
        Topic::ActionFailed,
        Topic::PlatformFailed,
        Topic::ListenerStopped,
    ];

    pub fn from_message(msg: &BusMessage) -> Self {
        match msg {
            BusMessage::MatchFound { .. } => Topic::MatchFound,
            BusMessage::AgentTriggered { .. } => Topic::AgentTriggered,
            BusMessage::ApprovalRequested { .. } => Topic::ApprovalRequested,
            BusMessage::ActionExecuted { .. } => Topic::ActionExecuted,
            BusMessage::ActionFailed { .. } => Topic::ActionFailed,
            BusMessage::PlatformFailed { .. } => Topic::PlatformFailed,
            BusMessage::ListenerStopped { .. } => Topic::ListenerStopped,
        }
    }
}

type Subscriber = mpsc::Sender<BusMessage>;
type Subscribers = Arc<RwLock<HashMap<Topic, Vec<Subscriber>>>>;

/// Bounded fan-out queue. [`EventBus::publish`] waits for room in every
/// subscriber's queue, so a slow consumer slows the producer instead of
/// losing events. [`EventBus::try_publish`] never waits and skips full queues.
pub struct EventBus {
    subscribers: Subscribers,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    pub async fn subscribe(&self, topic: Topic) -> mpsc::Receiver<BusMessage> {
        self.subscribe_many(&[topic]).await
    }

    /// One receiver for several topics; each message is delivered once.
    pub async fn subscribe_many(&self, topics: &[Topic]) -> mpsc::Receiver<BusMessage> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut subs = self.subscribers.write().await;
        for topic in topics {
            subs.entry(*topic).or_default().push(tx.clone());
        }
        rx
    }

    pub async fn subscribe_all(&self) -> mpsc::Receiver<BusMessage> {
        self.subscribe_many(&Topic::ALL).await
    }

    pub async fn publish(&self, msg: BusMessage) -> Result<()> {
        deliver(&self.subscribers, msg).await
    }

    /// Returns how many subscribers missed the message because their queue
    /// was full.
    pub async fn try_publish(&self, msg: BusMessage) -> usize {
        offer(&self.subscribers, msg).await
    }

    pub fn publisher(&self) -> BusPublisher {
        BusPublisher {
            subscribers: self.subscribers.clone(),
        }
    }

    pub async fn subscriber_count(&self, topic: Topic) -> usize {
        let subs = self.subscribers.read().await;
        subs.get(&topic).map(|s| s.len()).unwrap_or(0)
    }
}

#[derive(Clone)]
pub struct BusPublisher {
    subscribers: Subscribers,
}

impl BusPublisher {
    pub async fn publish(&self, msg: BusMessage) -> Result<()> {
        deliver(&self.subscribers, msg).await
    }

    pub async fn try_publish(&self, msg: BusMessage) -> usize {
        offer(&self.subscribers, msg).await
    }
}

async fn targets(subscribers: &Subscribers, topic: Topic) -> Vec<Subscriber> {
    let subs = subscribers.read().await;
    subs.get(&topic).cloned().unwrap_or_default()
}

async fn prune(subscribers: &Subscribers, topic: Topic) {
    let mut subs = subscribers.write().await;
    if let Some(list) = subs.get_mut(&topic) {
        list.retain(|tx| !tx.is_closed());
        tracing::debug!(?topic, remaining = list.len(), "pruned closed subscribers");
    }
}

async fn deliver(subscribers: &Subscribers, msg: BusMessage) -> Result<()> {
    let topic = Topic::from_message(&msg);
    let mut saw_closed = false;
    for tx in &targets(subscribers, topic).await {
        if tx.send(msg.clone()).await.is_err() {
            saw_closed = true;
        }
    }

    if saw_closed {
        prune(subscribers, topic).await;
    }
    Ok(())
}

async fn offer(subscribers: &Subscribers, msg: BusMessage) -> usize {
    let topic = Topic::from_message(&msg);
    let mut missed = 0;
    let mut saw_closed = false;
    for tx in &targets(subscribers, topic).await {
        match tx.try_send(msg.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => missed += 1,
            Err(mpsc::error::TrySendError::Closed(_)) => saw_closed = true,
        }
    }

    if saw_closed {
        prune(subscribers, topic).await;
    }
    missed
}
