//! Enrichment executor.
//!
//! Pulls batches from the [`PriorityScheduler`], looks each entry up in the
//! catalog (search cache first), picks a candidate with the similarity
//! matcher and writes the enrichment and artwork caches. Successful entries
//! are reported back with `mark_enriched`; anything else stays queued and
//! is retried on a later pass.
//!
//! Rate limiting lives here, not in the clients: a shared gate spaces
//! outgoing requests, batches are separated by a delay and full passes by a
//! cooldown read from the scheduler's last-enrichment timestamp.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::domain::{CandidateMatch, EnrichmentError, MatchOutcome};
use super::matcher::best_match;
use super::traits::{ArtworkFetcher, CatalogSearch};
use crate::cache::{ArtworkCache, EnrichmentCache, PutOutcome, SearchCache, normalize_query};
use crate::clock::SharedClock;
use crate::events::{EventChannel, LibraryEvent};
use crate::model::{EntryId, LibraryEntry};
use crate::scheduler::PriorityScheduler;

/// Executor tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutorConfig {
    /// Entries per batch
    pub batch_size: usize,
    /// Lookups in flight within a batch
    pub concurrency: usize,
    /// Candidates requested per search
    pub result_limit: usize,
    /// Minimum spacing between outgoing requests
    pub request_interval: Duration,
    /// Pause between batches
    pub batch_delay: Duration,
    /// Minimum time between full passes
    pub pass_cooldown: chrono::Duration,
    /// Stop a pass after this many batches
    pub max_batches_per_pass: Option<usize>,
    pub fetch_artwork: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            concurrency: 4,
            result_limit: 5,
            // MusicBrainz allows one request per second
            request_interval: Duration::from_millis(1100),
            batch_delay: Duration::from_secs(2),
            pass_cooldown: chrono::Duration::minutes(5),
            max_batches_per_pass: None,
            fetch_artwork: true,
        }
    }
}

/// Where a successful lookup came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSource {
    /// A fresh enrichment cache entry already existed
    EnrichmentCache,
    /// The search cache held a match for the query
    SearchCache,
    Catalog,
}

/// Result of one entry's lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Enriched { source: MatchSource },
    /// No candidate cleared the threshold
    NoMatch,
    /// The search failed. Treated like no match.
    SearchFailed(EnrichmentError),
}

impl LookupOutcome {
    pub fn is_enriched(&self) -> bool {
        matches!(self, LookupOutcome::Enriched { .. })
    }
}

/// Tally of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// The pass did not run because of the cooldown
    pub skipped: bool,
    pub batches: usize,
    pub attempted: usize,
    pub enriched: usize,
    pub from_cache: usize,
    pub no_match: usize,
    pub failed: usize,
    pub artwork_stored: usize,
}

/// Spaces outgoing requests by a fixed interval.
struct RateGate {
    interval: Duration,
    next: Mutex<Option<Instant>>,
}

impl RateGate {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Mutex::new(None),
        }
    }

    async fn wait(&self) {
        if self.interval.is_zero() {
            return;
        }
        let mut next = self.next.lock().await;
        if let Some(at) = *next
            && at > Instant::now()
        {
            tokio::time::sleep_until(at).await;
        }
        *next = Some(Instant::now() + self.interval);
    }
}

pub struct EnrichmentExecutor {
    scheduler: Arc<PriorityScheduler>,
    catalog: Arc<dyn CatalogSearch>,
    artwork_fetcher: Option<Arc<dyn ArtworkFetcher>>,
    enrichment_cache: Arc<EnrichmentCache>,
    artwork_cache: Arc<ArtworkCache>,
    search_cache: Arc<SearchCache>,
    events: EventChannel,
    clock: SharedClock,
    config: ExecutorConfig,
    gate: RateGate,
}

impl EnrichmentExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scheduler: Arc<PriorityScheduler>,
        catalog: Arc<dyn CatalogSearch>,
        artwork_fetcher: Option<Arc<dyn ArtworkFetcher>>,
        enrichment_cache: Arc<EnrichmentCache>,
        artwork_cache: Arc<ArtworkCache>,
        search_cache: Arc<SearchCache>,
        events: EventChannel,
        clock: SharedClock,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            scheduler,
            catalog,
            artwork_fetcher,
            enrichment_cache,
            artwork_cache,
            search_cache,
            events,
            clock,
            gate: RateGate::new(config.request_interval),
            config,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run a pass unless the last one finished within the cooldown.
    pub async fn run_pass(&self) -> PassReport {
        if let Some(last) = self.scheduler.last_enrichment_at() {
            let since = self.clock.now() - last;
            if since < self.config.pass_cooldown {
                tracing::debug!(
                    target: "enrichment",
                    "Skipping pass, last one finished {}s ago",
                    since.num_seconds()
                );
                return PassReport {
                    skipped: true,
                    ..Default::default()
                };
            }
        }
        self.run_pass_now().await
    }

    /// Drain the queue batch by batch, each entry attempted at most once.
    pub async fn run_pass_now(&self) -> PassReport {
        let mut report = PassReport::default();
        let mut attempted: HashSet<EntryId> = HashSet::new();

        loop {
            if self
                .config
                .max_batches_per_pass
                .is_some_and(|max| report.batches >= max)
            {
                break;
            }
            if report.batches > 0 && !self.config.batch_delay.is_zero() {
                tokio::time::sleep(self.config.batch_delay).await;
            }

            let batch = self
                .scheduler
                .next_batch_where(self.config.batch_size, |item| {
                    !attempted.contains(&item.entry.id)
                });
            if batch.is_empty() {
                break;
            }
            attempted.extend(batch.iter().map(|e| e.id.clone()));

            report.batches += 1;
            report.attempted += batch.len();
            for (_, outcome, artwork_stored) in self.enrich_batch(batch).await {
                match outcome {
                    LookupOutcome::Enriched { source } => {
                        report.enriched += 1;
                        if source != MatchSource::Catalog {
                            report.from_cache += 1;
                        }
                    }
                    LookupOutcome::NoMatch => report.no_match += 1,
                    LookupOutcome::SearchFailed(_) => report.failed += 1,
                }
                if artwork_stored {
                    report.artwork_stored += 1;
                }
            }
        }

        self.scheduler.record_enrichment_pass();
        tracing::info!(
            target: "enrichment",
            "Pass finished: {} batches, {} attempted, {} enriched ({} from cache), {} no match, {} failed",
            report.batches,
            report.attempted,
            report.enriched,
            report.from_cache,
            report.no_match,
            report.failed
        );
        report
    }

    /// Look up a batch concurrently. Completion order is arbitrary.
    pub async fn enrich_batch(&self, batch: Vec<LibraryEntry>) -> Vec<(EntryId, LookupOutcome, bool)> {
        stream::iter(batch)
            .map(|entry| async move {
                let (outcome, artwork) = self.enrich_entry_inner(&entry).await;
                (entry.id, outcome, artwork)
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await
    }

    /// Look up one entry and record the result.
    pub async fn enrich_entry(&self, entry: &LibraryEntry) -> LookupOutcome {
        self.enrich_entry_inner(entry).await.0
    }

    async fn enrich_entry_inner(&self, entry: &LibraryEntry) -> (LookupOutcome, bool) {
        if self.enrichment_cache.contains(&entry.id).await {
            self.complete(entry);
            return (
                LookupOutcome::Enriched {
                    source: MatchSource::EnrichmentCache,
                },
                false,
            );
        }

        let (candidate, source) = match self.find_candidate(entry).await {
            Ok(Some(found)) => found,
            Ok(None) => {
                tracing::debug!(target: "enrichment", "No match for {} - {}", entry.artist, entry.title);
                return (LookupOutcome::NoMatch, false);
            }
            Err(e) => {
                tracing::debug!(target: "enrichment", "Search failed for {}: {}", entry.id, e);
                return (LookupOutcome::SearchFailed(e), false);
            }
        };

        let payload = candidate.merged_payload_for(entry);
        if let PutOutcome::Failed = self.enrichment_cache.put(entry, &payload).await {
            tracing::warn!(target: "enrichment", "Enrichment for {} was not cached", entry.id);
        }

        let artwork_stored = self.store_artwork(entry, &candidate).await;
        self.complete(entry);
        (LookupOutcome::Enriched { source }, artwork_stored)
    }

    /// Search cache, then the catalog.
    async fn find_candidate(
        &self,
        entry: &LibraryEntry,
    ) -> Result<Option<(CandidateMatch, MatchSource)>, EnrichmentError> {
        if let Some(hit) = self.search_cache.get(&entry.title, &entry.artist).await {
            return Ok(Some((hit.candidate, MatchSource::SearchCache)));
        }

        let query = normalize_query(&entry.title, &entry.artist);
        if query.is_empty() {
            return Ok(None);
        }

        self.gate.wait().await;
        let candidates = self.catalog.search(&query, self.config.result_limit).await?;

        match best_match(&entry.title, &entry.artist, &candidates) {
            MatchOutcome::Matched { candidate, score } => {
                tracing::debug!(
                    target: "enrichment",
                    "Matched {} to \"{}\" by {} ({:.2})",
                    entry.id, candidate.title, candidate.artist, score
                );
                self.search_cache
                    .put(&entry.title, &entry.artist, &candidate, score)
                    .await;
                Ok(Some((candidate, MatchSource::Catalog)))
            }
            MatchOutcome::NoMatch => Ok(None),
        }
    }

    /// Fetch and cache artwork. Failures only lose the artwork.
    async fn store_artwork(&self, entry: &LibraryEntry, candidate: &CandidateMatch) -> bool {
        if !self.config.fetch_artwork {
            return false;
        }
        let Some(fetcher) = self.artwork_fetcher.as_ref() else {
            return false;
        };
        if self.artwork_cache.contains(&entry.id).await {
            return false;
        }

        self.gate.wait().await;
        match fetcher.fetch_artwork(candidate).await {
            Ok(bytes) if bytes.is_empty() => false,
            Ok(bytes) => self.artwork_cache.put(&entry.id, bytes).await.is_stored(),
            Err(e) => {
                tracing::debug!(target: "enrichment", "No artwork for {}: {}", entry.id, e);
                false
            }
        }
    }

    fn complete(&self, entry: &LibraryEntry) {
        if self.scheduler.mark_enriched(&entry.id) {
            self.events.publish(LibraryEvent::EntryEnriched {
                id: entry.id.clone(),
            });
        }
    }
}
