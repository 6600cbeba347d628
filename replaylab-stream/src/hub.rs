//! Per-task event fan-out.
//!
//! Each task id is a topic. Every published event is appended to the topic's
//! history and sent to every live subscriber; a new subscriber first receives
//! the history, so re-subscribing after recovery replays the task from its
//! first event. Channels are unbounded, so a slow subscriber never drops or
//! reorders events.

use crate::event::TaskEvent;
use crate::task::TaskId;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct Topic {
    history: Vec<TaskEvent>,
    subscribers: Vec<mpsc::UnboundedSender<TaskEvent>>,
}

/// Clone-able via internal Arc.
#[derive(Debug, Clone, Default)]
pub struct EventHub {
    topics: Arc<RwLock<HashMap<TaskId, Topic>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the topic for `task_id`. No-op if it exists.
    pub fn open(&self, task_id: &TaskId) {
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        topics.entry(task_id.clone()).or_default();
    }

    pub fn is_open(&self, task_id: &TaskId) -> bool {
        let topics = self.topics.read().unwrap_or_else(PoisonError::into_inner);
        topics.contains_key(task_id)
    }

    /// Record and deliver an event. Returns how many subscribers received
    /// it; events for unknown topics are dropped and count 0.
    pub fn publish(&self, event: TaskEvent) -> usize {
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        let Some(topic) = topics.get_mut(&event.task_id) else {
            return 0;
        };
        topic.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        let delivered = topic.subscribers.len();
        topic.history.push(event);
        delivered
    }

    /// Subscribe to a topic, receiving its history first. `None` if the
    /// topic does not exist.
    pub fn subscribe(&self, task_id: &TaskId) -> Option<mpsc::UnboundedReceiver<TaskEvent>> {
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        let topic = topics.get_mut(task_id)?;
        let (tx, rx) = mpsc::unbounded_channel();
        for event in &topic.history {
            // rx is alive in this scope
            let _ = tx.send(event.clone());
        }
        topic.subscribers.push(tx);
        Some(rx)
    }

    /// Drop every subscriber of a topic. Receivers drain what is queued and
    /// then end. The topic and its history remain.
    pub fn unsubscribe_all(&self, task_id: &TaskId) -> usize {
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        topics
            .get_mut(task_id)
            .map_or(0, |topic| std::mem::take(&mut topic.subscribers).len())
    }

    /// Remove a topic with its history and subscribers.
    pub fn remove(&self, task_id: &TaskId) -> bool {
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        topics.remove(task_id).is_some()
    }

    pub fn subscriber_count(&self, task_id: &TaskId) -> usize {
        let topics = self.topics.read().unwrap_or_else(PoisonError::into_inner);
        topics.get(task_id).map_or(0, |topic| topic.subscribers.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskPhase;

    #[test]
    fn publish_to_unknown_topic_is_dropped() {
        let hub = EventHub::new();
        let id = TaskId::new("nobody");
        assert_eq!(hub.publish(TaskEvent::progress(&id, 5.0)), 0);
        assert!(hub.subscribe(&id).is_none());
    }

    #[test]
    fn late_subscriber_gets_history_in_order() {
        let hub = EventHub::new();
        let id = TaskId::new("t");
        hub.open(&id);
        hub.publish(TaskEvent::phase(&id, TaskPhase::Running));
        hub.publish(TaskEvent::progress(&id, 10.0));

        let mut rx = hub.subscribe(&id).unwrap();
        hub.publish(TaskEvent::progress(&id, 20.0));

        assert_eq!(rx.try_recv().unwrap(), TaskEvent::phase(&id, TaskPhase::Running));
        assert_eq!(rx.try_recv().unwrap(), TaskEvent::progress(&id, 10.0));
        assert_eq!(rx.try_recv().unwrap(), TaskEvent::progress(&id, 20.0));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unsubscribe_all_ends_receivers() {
        let hub = EventHub::new();
        let id = TaskId::new("t");
        hub.open(&id);
        let mut a = hub.subscribe(&id).unwrap();
        let _b = hub.subscribe(&id).unwrap();
        assert_eq!(hub.subscriber_count(&id), 2);

        assert_eq!(hub.unsubscribe_all(&id), 2);
        assert_eq!(hub.publish(TaskEvent::progress(&id, 1.0)), 0);
        assert!(matches!(
            a.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert!(hub.is_open(&id));
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let hub = EventHub::new();
        let id = TaskId::new("t");
        hub.open(&id);
        drop(hub.subscribe(&id).unwrap());
        assert_eq!(hub.publish(TaskEvent::progress(&id, 1.0)), 0);
        assert_eq!(hub.subscriber_count(&id), 0);
    }
}
