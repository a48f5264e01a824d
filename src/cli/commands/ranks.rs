//! Rank listing and play-count commands.

use tokio::runtime::Runtime;

use crate::config::Config;
use crate::history::RankChange;
use crate::model::SortConfiguration;

use super::open_service;

/// Print entries by rank with movement since the last snapshot
pub fn cmd_ranks(
    rt: &Runtime,
    config: &Config,
    sort: SortConfiguration,
    limit: usize,
    save: bool,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let service = open_service(config).await?;
        service.refresh_library().await?;

        let entries = service.enriched_entries().await;
        let ordered = service.ranked(&entries, sort).await;
        let changes = service.rank_changes(&ordered, sort).await;

        println!("Ranks ({})", sort);
        println!("=====");
        for (i, entry) in ordered.iter().take(limit).enumerate() {
            let change = changes
                .get(&entry.id)
                .map(RankChange::to_string)
                .unwrap_or_default();
            println!(
                "{:>4}. {:>5} {:>6}  {} - {}",
                i + 1,
                change,
                service.displayed_play_count(entry).await,
                entry.display_artist(),
                entry.title
            );
        }
        if changes.is_empty() {
            println!();
            println!("No earlier snapshot for this sort. Use --save to record one.");
        }

        if save {
            service.save_rank_snapshot(&ordered, sort).await;
            println!();
            println!("✓ Snapshot saved");
        }
        anyhow::Ok(())
    })
}

/// Fold local play counts into the system counts
pub fn cmd_reconcile(rt: &Runtime, config: &Config) -> anyhow::Result<()> {
    rt.block_on(async {
        let service = open_service(config).await?;
        let mut events = service.subscribe();
        let refresh = service.refresh_library().await?;
        let summary = refresh.reconciled;

        println!("Reconciled {} entries", refresh.entries);
        println!("  Tracked locally: {}", summary.tracked);
        println!("  Caught up:       {}", summary.caught_up);
        println!("  Anomalies:       {}", summary.anomalies);

        while let Ok(event) = events.try_recv() {
            if let crate::events::LibraryEvent::ReconciliationAnomaly {
                id,
                previous_baseline,
                system,
            } = event
            {
                println!("  ! {}: system count went from {} to {}", id, previous_baseline, system);
            }
        }
        anyhow::Ok(())
    })
}
