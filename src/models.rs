use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Up,
    Down,
}

impl From<bool> for Status {
    fn from(is_up: bool) -> Self {
        if is_up { Status::Up } else { Status::Down }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Up => f.write_str("UP"),
            Status::Down => f.write_str("DOWN"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerState {
    pub name: String,
    pub is_up: bool,
    pub last_checked: DateTime<Utc>,
    pub last_changed: DateTime<Utc>,
    pub check_count: u64,
}

/// A host's recorded state flipped between two sweeps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub host: String,
    pub ip: Ipv4Addr,
    pub old: Status,
    pub new: Status,
    pub at: DateTime<Utc>,
}

/// Last known state of every monitored host, keyed by configured name.
#[derive(Debug, Default)]
pub struct StateStore {
    states: HashMap<String, ServerState>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one probe result and reports a transition if the state flipped.
    ///
    /// The first result for a host becomes its initial state and never counts
    /// as a transition.
    pub fn apply(&mut self, name: &str, ip: Ipv4Addr, is_up: bool, now: DateTime<Utc>) -> Option<Transition> {
        let Some(state) = self.states.get_mut(name) else {
            self.states.insert(
                name.to_string(),
                ServerState {
                    name: name.to_string(),
                    is_up,
                    last_checked: now,
                    last_changed: now,
                    check_count: 1,
                },
            );
            return None;
        };

        state.last_checked = now;
        state.check_count += 1;

        if state.is_up == is_up {
            return None;
        }

        let old = Status::from(state.is_up);
        state.is_up = is_up;
        state.last_changed = now;

        Some(Transition {
            host: name.to_string(),
            ip,
            old,
            new: Status::from(is_up),
            at: now,
        })
    }

    pub fn get(&self, name: &str) -> Option<&ServerState> {
        self.states.get(name)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn snapshot(&self) -> Vec<ServerState> {
        let mut states: Vec<_> = self.states.values().cloned().collect();
        states.sort_by(|a, b| a.name.cmp(&b.name));
        states
    }
}
