//! Cache health and cleanup commands.

use tokio::runtime::Runtime;

use crate::cache::{SweepReport, ValidationReport};
use crate::config::Config;
use crate::maintenance::CleanupReport;

use super::open_service;

/// Show the cache health score
pub fn cmd_health(rt: &Runtime, config: &Config) -> anyhow::Result<()> {
    rt.block_on(async {
        let service = open_service(config).await?;
        let report = service.health_report().await;
        let stats = &report.stats;

        println!("Cache Health");
        println!("============");
        println!("Score: {:.0}%", report.score * 100.0);
        println!();
        print_validation("Enrichment", &stats.enrichment);
        print_validation("Artwork", &stats.artwork);
        print_validation("Search", &stats.search);
        println!(
            "  Rank history: {} lists, {} snapshots",
            stats.history.lists, stats.history.snapshots
        );
        println!("  Keys: {}", stats.key_count);
        match stats.last_cleanup {
            Some(at) => println!("  Last cleanup: {}", at.format("%Y-%m-%d %H:%M UTC")),
            None => println!("  Last cleanup: never"),
        }

        if report.recommendations.is_empty() {
            println!();
            println!("✓ No issues found");
        } else {
            println!();
            println!("Recommendations:");
            for rec in &report.recommendations {
                println!("  • {}", rec);
            }
        }
        anyhow::Ok(())
    })
}

/// Sweep the caches
pub fn cmd_cleanup(rt: &Runtime, config: &Config, emergency: bool, force: bool) -> anyhow::Result<()> {
    rt.block_on(async {
        let service = open_service(config).await?;
        let coordinator = service.coordinator();

        let report = if emergency {
            Some(coordinator.emergency_cleanup().await)
        } else if force {
            Some(coordinator.periodic_cleanup().await)
        } else {
            coordinator.run_cleanup_if_due().await
        };

        match report {
            Some(report) => print_cleanup(&report),
            None => {
                println!("Cleanup not due. Use --force to run anyway.");
            }
        }
        anyhow::Ok(())
    })
}

/// Delete all cached data
pub fn cmd_clear(rt: &Runtime, config: &Config, yes: bool) -> anyhow::Result<()> {
    if !yes {
        anyhow::bail!("Refusing to clear without --yes");
    }
    rt.block_on(async {
        let service = open_service(config).await?;
        service.clear_all().await;
        println!("✓ Cleared enrichment, artwork and search caches, rank history and local play counts");
        anyhow::Ok(())
    })
}

fn print_validation(name: &str, report: &ValidationReport) {
    println!(
        "  {:<11} {} valid, {} stale, {} corrupted ({} KB)",
        format!("{}:", name),
        report.valid,
        report.stale,
        report.corrupted,
        report.total_bytes / 1024
    );
}

fn print_sweep(name: &str, sweep: &SweepReport) {
    println!(
        "  {:<11} -{} expired, -{} over count, -{} over size, {} left",
        format!("{}:", name),
        sweep.expired,
        sweep.over_count,
        sweep.over_size,
        sweep.remaining
    );
}

fn print_cleanup(report: &CleanupReport) {
    println!("✓ {} cleanup finished", report.kind);
    print_sweep("Enrichment", &report.enrichment);
    print_sweep("Artwork", &report.artwork);
    print_sweep("Search", &report.search);
    if report.corrupted_removed > 0 {
        println!("  Corrupted removed: {}", report.corrupted_removed);
    }
    println!("  Snapshots removed: {}", report.snapshots_removed);
    if report.orphans_removed > 0 {
        println!("  Orphans removed: {}", report.orphans_removed);
    }
    println!("  Entries removed: {}", report.entries_removed());
}
