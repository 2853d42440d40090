use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::event::error::EventSystemError;
use crate::event::interface::{InterfaceManager, SubscriberInterface, SubscriptionMap};
use crate::event::subscriber::{Callback, Subscriber, SubscriberKey, SubscriberRecord};
use crate::event::types::{Event, LifecycleEvent, Payload, Subject};
use crate::kernel::component::KernelComponent;
use crate::kernel::error::Result;

/// Live queue of one in-progress publish
struct DispatchFrame {
    id: u64,
    event_name: String,
    queue: VecDeque<SubscriberRecord>,
}

#[derive(Default)]
struct ManagerState {
    /// Subscribers per event name, in subscribe order
    subscribers: HashMap<String, Vec<SubscriberRecord>>,
    /// Priority-sorted copies, rebuilt lazily after a mutation
    sorted: HashMap<String, Vec<SubscriberRecord>>,
    /// One frame per in-progress publish, innermost last
    frames: Vec<DispatchFrame>,
}

impl ManagerState {
    fn sorted_for(&mut self, event_name: &str) -> Vec<SubscriberRecord> {
        if let Some(sorted) = self.sorted.get(event_name) {
            return sorted.clone();
        }
        let mut records = self.subscribers.get(event_name).cloned().unwrap_or_default();
        // Stable sort keeps subscribe order within a priority
        records.sort_by(|a, b| b.priority.cmp(&a.priority));
        self.sorted.insert(event_name.to_string(), records.clone());
        records
    }

    fn invalidate(&mut self, event_name: &str) {
        self.sorted.remove(event_name);
    }

    fn live_frames<'a>(&'a mut self, event_name: &'a str) -> impl Iterator<Item = &'a mut DispatchFrame> + 'a {
        self.frames.iter_mut().filter(move |frame| frame.event_name == event_name)
    }
}

/// Priority-ordered, re-entrant publish/subscribe manager.
///
/// Subscribers may subscribe, unsubscribe and publish while a publish is in
/// progress. Every publish owns a dispatch frame; mutations for an event name
/// are applied to persistent storage and to every live frame for that name,
/// so the in-progress loop observes them.
pub struct Manager {
    state: Mutex<ManagerState>,
    next_seq: AtomicU64,
    next_frame: AtomicU64,
}

impl Manager {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ManagerState::default()),
            next_seq: AtomicU64::new(1),
            next_frame: AtomicU64::new(1),
        }
    }

    // The lock is never held while subscriber code runs, so a poisoned
    // state can only come from a panic inside the manager itself.
    fn state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Subscribe to `event_name`.
    ///
    /// A subscriber added while `event_name` is being published is spliced
    /// into the live queue at its priority position and may fire within the
    /// ongoing publish.
    pub fn subscribe(
        &self,
        event_name: &str,
        subscriber: impl Into<Subscriber>,
        priority: i32,
        only_once: bool,
    ) -> std::result::Result<(), EventSystemError> {
        let subscriber = subscriber.into();
        subscriber.validate()?;
        let record = SubscriberRecord {
            key: subscriber.key(),
            subscriber,
            priority,
            only_once,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };
        log::debug!(
            "Subscribing {:?} to '{}' (priority {}, only_once {})",
            record.key,
            event_name,
            priority,
            only_once
        );

        let mut state = self.state();
        state
            .subscribers
            .entry(event_name.to_string())
            .or_default()
            .push(record.clone());
        state.invalidate(event_name);
        for frame in state.live_frames(event_name) {
            let position = frame
                .queue
                .iter()
                .position(|queued| queued.priority < priority)
                .unwrap_or(frame.queue.len());
            frame.queue.insert(position, record.clone());
        }
        Ok(())
    }

    /// Remove every registration of `subscriber` from `event_name`.
    ///
    /// Also removes it from live dispatch frames for `event_name`. Returns the
    /// number of persistent registrations removed.
    pub fn unsubscribe(&self, event_name: &str, subscriber: &Subscriber) -> usize {
        self.unsubscribe_key(event_name, &subscriber.key())
    }

    /// Remove every registration with identity `key` from `event_name`
    pub fn unsubscribe_key(&self, event_name: &str, key: &SubscriberKey) -> usize {
        let mut state = self.state();
        let removed = match state.subscribers.get_mut(event_name) {
            Some(records) => {
                let before = records.len();
                records.retain(|record| &record.key != key);
                before - records.len()
            }
            None => 0,
        };
        if state.subscribers.get(event_name).is_some_and(|records| records.is_empty()) {
            state.subscribers.remove(event_name);
        }
        state.invalidate(event_name);
        for frame in state.live_frames(event_name) {
            frame.queue.retain(|record| &record.key != key);
        }
        log::debug!("Unsubscribed {} registration(s) of {:?} from '{}'", removed, key, event_name);
        removed
    }

    /// Subscribers of `event_name` in dispatch order
    pub fn subscribers(&self, event_name: &str) -> Vec<SubscriberRecord> {
        self.state().sorted_for(event_name)
    }

    /// Subscribers of every event name in dispatch order
    pub fn all_subscribers(&self) -> BTreeMap<String, Vec<SubscriberRecord>> {
        let mut state = self.state();
        let names: Vec<String> = state.subscribers.keys().cloned().collect();
        names
            .into_iter()
            .map(|name| {
                let sorted = state.sorted_for(&name);
                (name, sorted)
            })
            .filter(|(_, records)| !records.is_empty())
            .collect()
    }

    pub fn has_subscribers(&self, event_name: &str) -> bool {
        self.state()
            .subscribers
            .get(event_name)
            .is_some_and(|records| !records.is_empty())
    }

    pub fn has_any_subscribers(&self) -> bool {
        self.state().subscribers.values().any(|records| !records.is_empty())
    }

    /// Number of publishes currently in progress
    pub fn dispatch_depth(&self) -> usize {
        self.state().frames.len()
    }

    /// Event name of the dispatch frame at `index` (0 is the outermost)
    pub fn frame_event(&self, index: usize) -> std::result::Result<String, EventSystemError> {
        let state = self.state();
        state
            .frames
            .get(index)
            .map(|frame| frame.event_name.clone())
            .ok_or(EventSystemError::UnknownDispatchFrame {
                index,
                depth: state.frames.len(),
            })
    }

    /// Publish `event_name` with a new event built from `subject` and `values`
    pub fn publish(&self, event_name: &str, subject: Option<Subject>, values: Payload) -> Result<Event> {
        self.publish_event(event_name, Event::new(subject, values))
    }

    /// Publish an existing event; returns it after dispatch completes or stops
    pub fn publish_event(&self, event_name: &str, mut event: Event) -> Result<Event> {
        if !self.has_subscribers(event_name) {
            return Ok(event);
        }
        let frame = self.push_frame(event_name);
        while !event.is_propagation_stopped() {
            let Some(record) = self.next_subscriber(frame.id) else {
                break;
            };
            let callback = self.materialize(event_name, &record)?;
            // Removed before the call so a re-entrant publish cannot run it again
            if record.only_once {
                self.remove_once(event_name, record.seq);
            }
            log::trace!("Dispatching '{}' to {:?}", event_name, record.key);
            let returned = callback.call(&mut event, event_name, self)?;
            if let Some(value) = returned {
                event.attach_return(value);
            }
        }
        drop(frame);
        Ok(event)
    }

    /// Subscribe every declaration of `owner`; returns the normalized map
    pub fn add_subscriber_interface(&self, owner: Arc<dyn SubscriberInterface>) -> Result<SubscriptionMap> {
        let normalized = InterfaceManager::normalize(&owner)?;
        for (event_name, subscriptions) in &normalized {
            for subscription in subscriptions {
                self.subscribe(
                    event_name,
                    subscription.subscriber.clone(),
                    subscription.priority,
                    subscription.only_once,
                )?;
            }
        }
        Ok(normalized)
    }

    /// Unsubscribe every declaration of `owner`; returns the normalized map
    pub fn remove_subscriber_interface(&self, owner: Arc<dyn SubscriberInterface>) -> Result<SubscriptionMap> {
        let normalized = InterfaceManager::normalize(&owner)?;
        for (event_name, subscriptions) in &normalized {
            for subscription in subscriptions {
                self.unsubscribe(event_name, &subscription.subscriber);
            }
        }
        Ok(normalized)
    }

    fn push_frame(&self, event_name: &str) -> FrameGuard<'_> {
        let id = self.next_frame.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state();
        let queue = state.sorted_for(event_name).into();
        state.frames.push(DispatchFrame {
            id,
            event_name: event_name.to_string(),
            queue,
        });
        log::debug!("Pushed dispatch frame {} for '{}' (depth {})", id, event_name, state.frames.len());
        FrameGuard { manager: self, id }
    }

    fn next_subscriber(&self, frame_id: u64) -> Option<SubscriberRecord> {
        self.state()
            .frames
            .iter_mut()
            .find(|frame| frame.id == frame_id)
            .and_then(|frame| frame.queue.pop_front())
    }

    /// Resolve the callable of `record`, materializing a closure factory once.
    fn materialize(&self, event_name: &str, record: &SubscriberRecord) -> Result<Callback> {
        let factory = match &record.subscriber {
            Subscriber::Callback(callback) => return Ok(callback.clone()),
            Subscriber::Lazy(factory) => factory.clone(),
        };
        // Another frame may already have materialized the persistent record.
        if let Some(Subscriber::Callback(callback)) = self.stored_subscriber(event_name, record.seq) {
            return Ok(callback);
        }
        log::debug!("Materializing closure factory {:?} for '{}'", record.key, event_name);
        let callback = factory.materialize(event_name)?;

        let mut state = self.state();
        if let Some(stored) = state
            .subscribers
            .get_mut(event_name)
            .and_then(|records| records.iter_mut().find(|r| r.seq == record.seq))
        {
            stored.subscriber = Subscriber::Callback(callback.clone());
        }
        state.invalidate(event_name);
        for frame in state.live_frames(event_name) {
            for queued in frame.queue.iter_mut().filter(|r| r.seq == record.seq) {
                queued.subscriber = Subscriber::Callback(callback.clone());
            }
        }
        Ok(callback)
    }

    fn stored_subscriber(&self, event_name: &str, seq: u64) -> Option<Subscriber> {
        self.state()
            .subscribers
            .get(event_name)
            .and_then(|records| records.iter().find(|r| r.seq == seq))
            .map(|record| record.subscriber.clone())
    }

    fn remove_once(&self, event_name: &str, seq: u64) {
        let mut state = self.state();
        if let Some(records) = state.subscribers.get_mut(event_name) {
            records.retain(|record| record.seq != seq);
            if records.is_empty() {
                state.subscribers.remove(event_name);
            }
        }
        state.invalidate(event_name);
        for frame in state.live_frames(event_name) {
            frame.queue.retain(|record| record.seq != seq);
        }
    }
}

/// Pops its dispatch frame when the publish ends, including on error.
struct FrameGuard<'a> {
    manager: &'a Manager,
    id: u64,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.manager.state();
        if let Some(position) = state.frames.iter().position(|frame| frame.id == self.id) {
            let frame = state.frames.remove(position);
            log::debug!(
                "Popped dispatch frame {} for '{}' ({} subscriber(s) skipped)",
                frame.id,
                frame.event_name,
                frame.queue.len()
            );
        }
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        let subscriber_count: usize = state.subscribers.values().map(|v| v.len()).sum();
        f.debug_struct("Manager")
            .field("event_names", &state.subscribers.len())
            .field("subscriber_count", &subscriber_count)
            .field("dispatch_depth", &state.frames.len())
            .finish()
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

/// Kernel component owning the application's [`Manager`].
///
/// Publishes the `shutdown` lifecycle event when stopped.
#[derive(Debug, Clone)]
pub struct EventComponent {
    name: &'static str,
    manager: Arc<Manager>,
}

impl EventComponent {
    pub fn new(manager: Arc<Manager>) -> Self {
        Self {
            name: "EventManager",
            manager,
        }
    }

    pub fn manager(&self) -> &Arc<Manager> {
        &self.manager
    }
}

#[async_trait]
impl KernelComponent for EventComponent {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let event = self
            .manager
            .publish(LifecycleEvent::Shutdown.name(), None, Payload::new())?;
        if let Some(Value::String(reason)) = event.raw_value("reason") {
            log::info!("Shutdown subscribers reported: {}", reason);
        }
        Ok(())
    }
}
