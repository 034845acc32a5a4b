use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// How the cached baseline relates to the stored price once a listing is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaselinePolicy {
    /// Cache takes every newly observed price, even when the store skipped the write.
    /// Cache and store may diverge under tick races.
    #[default]
    Observed,
    /// Cache mirrors the store's durable price.
    Durable,
}

impl fmt::Display for BaselinePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaselinePolicy::Observed => f.write_str("observed"),
            BaselinePolicy::Durable => f.write_str("durable"),
        }
    }
}

impl FromStr for BaselinePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "observed" => Ok(BaselinePolicy::Observed),
            "durable" => Ok(BaselinePolicy::Durable),
            other => Err(format!("unknown baseline policy '{}'", other)),
        }
    }
}

#[derive(Debug, Default)]
pub struct Baseline {
    known: bool,
    price: Option<f64>,
    /// Newest tick timestamp that wrote this baseline.
    observed_at: Option<DateTime<Utc>>,
}

/// Exclusive access to one listing's baseline. Held for the whole
/// read-notify-persist-update sequence of a row.
pub struct BaselineGuard {
    id: String,
    slot: OwnedMutexGuard<Baseline>,
}

impl BaselineGuard {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn has(&self) -> bool {
        self.slot.known
    }

    pub fn get(&self) -> Option<f64> {
        self.slot.price
    }

    pub fn set(&mut self, price: f64) {
        self.slot.known = true;
        self.slot.price = Some(price);
    }

    /// Sets the price as seen by the tick at `timestamp`. The observation
    /// clock never moves backwards.
    pub fn observe(&mut self, price: f64, timestamp: DateTime<Utc>) {
        self.set(price);
        self.slot.observed_at = self.slot.observed_at.max(Some(timestamp));
    }

    /// A tick is stale when a tick at the same or a later timestamp already wrote this baseline.
    pub fn is_stale(&self, timestamp: DateTime<Utc>) -> bool {
        self.slot
            .observed_at
            .map_or(false, |last| timestamp <= last)
    }

    /// Known without a price, as after a presence-only reseed.
    pub fn mark_known(&mut self) {
        self.slot.known = true;
    }
}

/// Process-lifetime map from listing id to last known price.
///
/// Each id owns its own async mutex, so rows for the same listing are
/// serialized across overlapping ticks while unrelated ids proceed in parallel.
#[derive(Default)]
pub struct BaselineCache {
    slots: RwLock<HashMap<String, Arc<Mutex<Baseline>>>>,
}

impl BaselineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks ids as known without a price. Returns how many were newly added.
    pub async fn seed<I>(&self, ids: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let pending: Vec<Arc<Mutex<Baseline>>> = {
            let mut slots = self.slots.write().await;
            ids.into_iter()
                .map(|id| slots.entry(id).or_default().clone())
                .collect()
        };

        // Map lock is released; only one id is waited on at a time.
        let mut added = 0;
        for slot in pending {
            let mut baseline = slot.lock().await;
            if !baseline.known {
                baseline.known = true;
                added += 1;
            }
        }

        added
    }

    async fn slot(&self, id: &str) -> Arc<Mutex<Baseline>> {
        if let Some(slot) = self.slots.read().await.get(id) {
            return slot.clone();
        }

        self.slots
            .write()
            .await
            .entry(id.to_string())
            .or_default()
            .clone()
    }

    pub async fn lock(&self, id: &str) -> BaselineGuard {
        let slot = self.slot(id).await;
        BaselineGuard {
            id: id.to_string(),
            slot: slot.lock_owned().await,
        }
    }

    /// Drops the guard. A slot that never became known, such as after a failed
    /// first insert, is removed unless another task is waiting on it.
    pub async fn release(&self, guard: BaselineGuard) {
        if guard.has() {
            return;
        }

        let BaselineGuard { id, slot } = guard;
        drop(slot);

        let mut slots = self.slots.write().await;
        let removable = match slots.get(&id) {
            Some(slot) => {
                Arc::strong_count(slot) == 1
                    && slot.try_lock().map(|baseline| !baseline.known).unwrap_or(false)
            }
            None => false,
        };
        if removable {
            slots.remove(&id);
        }
    }

    async fn existing(&self, id: &str) -> Option<Arc<Mutex<Baseline>>> {
        self.slots.read().await.get(id).cloned()
    }

    pub async fn has(&self, id: &str) -> bool {
        match self.existing(id).await {
            Some(slot) => slot.lock().await.known,
            None => false,
        }
    }

    pub async fn get(&self, id: &str) -> Option<f64> {
        match self.existing(id).await {
            Some(slot) => slot.lock().await.price,
            None => None,
        }
    }

    pub async fn set(&self, id: &str, price: f64) {
        self.lock(id).await.set(price);
    }

    pub async fn known_ids(&self) -> Vec<String> {
        let slots: Vec<(String, Arc<Mutex<Baseline>>)> = self
            .slots
            .read()
            .await
            .iter()
            .map(|(id, slot)| (id.clone(), slot.clone()))
            .collect();

        let mut ids = Vec::with_capacity(slots.len());
        for (id, slot) in slots {
            if slot.lock().await.known {
                ids.push(id);
            }
        }
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.known_ids().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
