use super::{AnalysisResponse, CueProvider};
use crate::error::SourceError;
use async_trait::async_trait;
use log::{debug, info};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

struct CacheEntry {
    analysis: AnalysisResponse,
    stored_at: Instant,
}

/// In-memory analysis cache in front of another provider.
///
/// Lives for one session only. Failures are never cached, so the next track
/// change retries the inner provider.
pub struct CachedCueProvider<P> {
    inner: P,
    max_age: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl<P: CueProvider> CachedCueProvider<P> {
    pub fn new(inner: P, max_age: Duration) -> Self {
        Self {
            inner,
            max_age,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Drop every entry older than the max age. Returns how many went.
    pub fn purge_expired(&self) -> usize {
        let max_age = self.max_age;
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| entry.stored_at.elapsed() < max_age);
        before - entries.len()
    }

    fn lookup(&self, track_id: &str) -> Option<AnalysisResponse> {
        let mut entries = self.entries();
        match entries.get(track_id) {
            Some(entry) if entry.stored_at.elapsed() < self.max_age => Some(entry.analysis.clone()),
            Some(_) => {
                debug!("Cached analysis for {} expired", track_id);
                entries.remove(track_id);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl<P: CueProvider> CueProvider for CachedCueProvider<P> {
    async fn fetch_timeline(&self, track_id: &str) -> Result<AnalysisResponse, SourceError> {
        let key = track_id.trim();
        if let Some(analysis) = self.lookup(key) {
            debug!("Analysis cache hit for {}", key);
            return Ok(analysis);
        }

        let analysis = self.inner.fetch_timeline(key).await?;
        info!("Cached analysis for {}", key);
        self.entries().insert(
            key.to_string(),
            CacheEntry {
                analysis: analysis.clone(),
                stored_at: Instant::now(),
            },
        );
        Ok(analysis)
    }
}
