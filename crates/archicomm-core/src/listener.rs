// Copyright 2025 eraflo
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

//! Subscriber fan-out with per-listener failure isolation.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// Handle returned by [`ListenerSet::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type Callback<E> = Box<dyn FnMut(&E) + Send>;

/// An ordered set of callbacks receiving `&E`.
///
/// A listener that panics is logged and skipped; the remaining listeners
/// still receive the event.
pub struct ListenerSet<E> {
    label: &'static str,
    next_id: u64,
    listeners: Vec<(ListenerId, Callback<E>)>,
}

impl<E> ListenerSet<E> {
    /// Creates an empty set. `label` prefixes log lines.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            next_id: 1,
            listeners: Vec::new(),
        }
    }

    /// Adds a listener.
    pub fn subscribe(&mut self, listener: impl FnMut(&E) + Send + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Removes a listener. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    /// Number of listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Returns `true` if nobody is listening.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Delivers `event` to every listener and returns how many panicked.
    pub fn emit(&mut self, event: &E) -> usize {
        let mut failures = 0;
        for (id, listener) in self.listeners.iter_mut() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener(event)));
            if let Err(payload) = outcome {
                failures += 1;
                log::error!(
                    "{}: listener {} panicked: {}",
                    self.label,
                    id,
                    panic_message(payload.as_ref())
                );
            }
        }
        failures
    }
}

impl<E> fmt::Debug for ListenerSet<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSet")
            .field("label", &self.label)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Extracts a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_emit_reaches_every_listener() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut set = ListenerSet::<u32>::new("test");
        for tag in 0..3u32 {
            let seen = seen.clone();
            set.subscribe(move |v| seen.lock().unwrap().push(tag * 10 + v));
        }
        assert_eq!(set.emit(&1), 0);
        assert_eq!(*seen.lock().unwrap(), vec![1, 11, 21]);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let seen = Arc::new(Mutex::new(0u32));
        let mut set = ListenerSet::<u32>::new("test");
        set.subscribe(|_| panic!("faulty subscriber"));
        let counter = seen.clone();
        set.subscribe(move |v| *counter.lock().unwrap() += v);

        assert_eq!(set.emit(&5), 1);
        assert_eq!(set.emit(&5), 1);
        assert_eq!(*seen.lock().unwrap(), 10);
    }

    #[test]
    fn test_unsubscribe() {
        let mut set = ListenerSet::<()>::new("test");
        let id = set.subscribe(|_| {});
        assert_eq!(set.len(), 1);
        assert!(set.unsubscribe(id));
        assert!(!set.unsubscribe(id));
        assert!(set.is_empty());
    }

    #[test]
    fn test_panic_message_variants() {
        let boxed: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(boxed.as_ref()), "static");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(boxed.as_ref()), "non-string panic payload");
    }
}
