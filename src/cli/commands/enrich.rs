//! Enrichment queue and catalog lookup commands.

use std::sync::Arc;

use tokio::runtime::Runtime;

use crate::config::Config;
use crate::enrichment::{ArtworkFetcher, CoverArtClient, MusicBrainzClient};
use crate::model::SortConfiguration;
use crate::scheduler::Tier;

use super::open_service;

/// Show the enrichment queue
pub fn cmd_queue(
    rt: &Runtime,
    config: &Config,
    limit: usize,
    sort: SortConfiguration,
    idle: bool,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let service = open_service(config).await?;
        let refresh = service.refresh_library().await?;
        service.set_active_sort_configuration(sort);
        service.set_idle(idle);

        let snapshot = service.scheduler_snapshot();
        println!("Enrichment Queue ({})", sort);
        println!("================");
        println!(
            "Library: {} entries, {} already enriched",
            refresh.entries, snapshot.enriched
        );
        for tier in Tier::ALL {
            println!("  {:<11} {}", format!("{}:", tier), snapshot.tier_counts.get(tier));
        }
        println!();

        if snapshot.items.is_empty() {
            println!("✓ Nothing left to enrich");
            return anyhow::Ok(());
        }
        for (i, item) in snapshot.items.iter().take(limit).enumerate() {
            println!(
                "{:>4}. [{}] {} - {} ({})",
                i + 1,
                item.tier,
                item.entry.artist,
                item.entry.title,
                item.reason
            );
        }
        if snapshot.items.len() > limit {
            println!("  ... and {} more", snapshot.items.len() - limit);
        }
        anyhow::Ok(())
    })
}

/// Run an enrichment pass against MusicBrainz
pub fn cmd_enrich(rt: &Runtime, config: &Config, dry_run: bool, force: bool) -> anyhow::Result<()> {
    rt.block_on(async {
        let service = open_service(config).await?;
        let refresh = service.refresh_library().await?;
        println!(
            "Library: {} entries, {} already enriched",
            refresh.entries, refresh.cached
        );

        let batch_size = config.enrichment.batch_size.max(1);
        if dry_run {
            let batches = config.enrichment.max_batches_per_pass.unwrap_or(1);
            let batch = service.next_enrichment_batch(batch_size * batches);
            println!("Would look up {} entries:", batch.len());
            for entry in &batch {
                println!("  {} - {}", entry.artist, entry.title);
            }
            return anyhow::Ok(());
        }

        let catalog = Arc::new(match &config.enrichment.musicbrainz_url {
            Some(url) => MusicBrainzClient::with_base_url(url.clone()),
            None => MusicBrainzClient::new(),
        });
        let artwork: Option<Arc<dyn ArtworkFetcher>> = if config.enrichment.fetch_artwork {
            Some(Arc::new(match &config.enrichment.coverart_url {
                Some(url) => CoverArtClient::with_base_url(url.clone()),
                None => CoverArtClient::new(),
            }))
        } else {
            None
        };

        let executor = service.enrichment_executor(catalog, artwork);
        let report = if force {
            executor.run_pass_now().await
        } else {
            executor.run_pass().await
        };

        if report.skipped {
            println!("Skipped: the last pass finished recently. Use --force to run anyway.");
            return anyhow::Ok(());
        }
        println!();
        println!("✓ Pass finished ({} batches)", report.batches);
        println!("  Attempted:  {}", report.attempted);
        println!("  Enriched:   {} ({} from cache)", report.enriched, report.from_cache);
        println!("  No match:   {}", report.no_match);
        println!("  Failed:     {}", report.failed);
        println!("  Artwork:    {}", report.artwork_stored);
        println!("  Remaining:  {}", service.scheduler_snapshot().items.len());
        anyhow::Ok(())
    })
}
