// Copyright 2025 HEM Sp. z o.o.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use log::debug;

use crate::source_state::{AttributeBag, SourceId, SourceSnapshot};

/// Notification that the reported state of a tracked source changed.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChangedEvent {
    pub source: SourceId,
    pub old_state: Option<SourceSnapshot>,
    pub new_state: Option<SourceSnapshot>,
}

/// Read access to the host's current source states plus change notifications.
pub trait StateObserver: Send + Sync {
    /// Current snapshot of a source, `None` if the source does not exist right now.
    fn state(&self, source: &str) -> Option<SourceSnapshot>;

    /// Subscribe to changes of the given sources.
    fn subscribe(&self, sources: &[SourceId]) -> StateSubscription;
}

/// Active registration for state change notifications.
///
/// The registration is released by [`StateSubscription::unsubscribe`] or when the subscription
/// is dropped, whichever comes first.
pub struct StateSubscription {
    events: UnboundedReceiver<StateChangedEvent>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl StateSubscription {
    pub fn new(events: UnboundedReceiver<StateChangedEvent>, release: impl FnOnce() + Send + 'static) -> Self {
        Self { events, release: Some(Box::new(release)) }
    }

    /// Next change notification; `None` once the observer side has gone away.
    pub async fn next(&mut self) -> Option<StateChangedEvent> {
        self.events.next().await
    }

    pub fn unsubscribe(mut self) {
        self.release_registration();
    }

    fn release_registration(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for StateSubscription {
    fn drop(&mut self) {
        self.release_registration();
    }
}

struct Subscriber {
    sources: HashSet<SourceId>,
    sender: UnboundedSender<StateChangedEvent>,
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    entries: HashMap<u64, Subscriber>,
}

/// In-memory snapshot of source states that notifies subscribers on every write.
#[derive(Default)]
pub struct StateStore {
    states: RwLock<HashMap<SourceId, SourceSnapshot>>,
    subscribers: Arc<Mutex<Subscribers>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes the state of a source and notifies every subscriber tracking it.
    pub fn set_state(&self, source: &str, raw_state: &str, attributes: AttributeBag) {
        let new_state = SourceSnapshot::new(raw_state, attributes);
        let old_state = self
            .states
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(source.to_string(), new_state.clone());
        self.notify(StateChangedEvent { source: source.to_string(), old_state, new_state: Some(new_state) });
    }

    /// Changes only the raw state of an existing source, keeping its attributes.
    pub fn set_raw_state(&self, source: &str, raw_state: &str) -> bool {
        let Some(current) = self.state(source) else { return false; };
        self.set_state(source, raw_state, current.attributes);
        true
    }

    /// Updates attributes of an existing source, keeping its raw state.
    pub fn update_attributes(&self, source: &str, update: impl FnOnce(&mut AttributeBag)) -> bool {
        let Some(mut current) = self.state(source) else { return false; };
        update(&mut current.attributes);
        self.set_state(source, &current.raw_state, current.attributes);
        true
    }

    pub fn remove_state(&self, source: &str) {
        let old_state = self.states.write().unwrap_or_else(PoisonError::into_inner).remove(source);
        if old_state.is_some() {
            self.notify(StateChangedEvent { source: source.to_string(), old_state, new_state: None });
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner).entries.len()
    }

    fn notify(&self, event: StateChangedEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.entries.retain(|id, subscriber| {
            if !subscriber.sources.contains(&event.source) {
                return true;
            }
            let delivered = subscriber.sender.unbounded_send(event.clone()).is_ok();
            if !delivered {
                debug!("Dropping closed state subscription {}", id);
            }
            delivered
        });
    }
}

impl StateObserver for StateStore {
    fn state(&self, source: &str) -> Option<SourceSnapshot> {
        self.states.read().unwrap_or_else(PoisonError::into_inner).get(source).cloned()
    }

    fn subscribe(&self, sources: &[SourceId]) -> StateSubscription {
        let (sender, receiver) = mpsc::unbounded();
        let id = {
            let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
            let id = subscribers.next_id;
            subscribers.next_id += 1;
            subscribers.entries.insert(id, Subscriber { sources: sources.iter().cloned().collect(), sender });
            id
        };
        debug!("State subscription {} registered for {} sources", id, sources.len());

        let registry = Arc::downgrade(&self.subscribers);
        StateSubscription::new(receiver, move || {
            if let Some(registry) = registry.upgrade() {
                registry.lock().unwrap_or_else(PoisonError::into_inner).entries.remove(&id);
                debug!("State subscription {} released", id);
            }
        })
    }
}
