//! Base URL selection across a document's declared servers.

use rand::seq::SliceRandom as _;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Picks the server a single call is sent to.
pub trait BaseUrlSelector: Send + Sync + Debug {
    /// `None` only when `servers` is empty.
    fn select<'a>(&self, servers: &'a [String]) -> Option<&'a str>;
}

#[derive(Debug, Default)]
pub struct UniformRandom;

impl BaseUrlSelector for UniformRandom {
    fn select<'a>(&self, servers: &'a [String]) -> Option<&'a str> {
        servers.choose(&mut rand::thread_rng()).map(String::as_str)
    }
}

/// Cycles through the servers. The counter is shared by every callable built from one
/// dispatcher.
#[derive(Debug, Default)]
pub struct RoundRobin {
    next: AtomicUsize,
}

impl BaseUrlSelector for RoundRobin {
    fn select<'a>(&self, servers: &'a [String]) -> Option<&'a str> {
        if servers.is_empty() {
            return None;
        }
        let i = self.next.fetch_add(1, Ordering::Relaxed) % servers.len();
        servers.get(i).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BaseUrlStrategy {
    #[default]
    Random,
    RoundRobin,
}

impl FromStr for BaseUrlStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(BaseUrlStrategy::Random),
            "round-robin" | "round_robin" | "roundrobin" => Ok(BaseUrlStrategy::RoundRobin),
            other => Err(format!(
                "unknown base url strategy '{other}' (expected random or round-robin)"
            )),
        }
    }
}

impl BaseUrlStrategy {
    #[must_use]
    pub fn selector(self) -> Arc<dyn BaseUrlSelector> {
        match self {
            BaseUrlStrategy::Random => Arc::new(UniformRandom),
            BaseUrlStrategy::RoundRobin => Arc::new(RoundRobin::default()),
        }
    }
}
