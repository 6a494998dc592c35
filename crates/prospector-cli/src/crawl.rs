//! The `crawl` command: wires config, sink selection, and interrupt
//! handling around the pipeline.

use std::sync::Arc;
use std::time::Duration;

use prospector_core::AppConfig;
use prospector_crawler::{
    run_crawl, CancelToken, CrawlConfig, CrawlSummary, ProListTarget, SearchQuery,
};

use crate::csv::CsvSink;
use crate::{CrawlArgs, SinkKind};

/// Runs one crawl end to end and prints the summary.
///
/// Returns an error when the crawl could not start, or when it ended with a
/// fatal failure — partial results are persisted and reported either way.
pub(crate) async fn run_crawl_command(config: &AppConfig, args: &CrawlArgs) -> anyhow::Result<()> {
    let mut crawl_config = CrawlConfig::from_app_config(config);
    if let Some(max_extractors) = args.max_extractors {
        crawl_config.max_concurrent_extractors = max_extractors;
    }
    if let Some(max_retries) = args.max_retries {
        crawl_config.max_retries = max_retries;
    }

    let cancel = CancelToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received — finishing in-flight work");
            interrupt.cancel();
        }
    });

    let query = SearchQuery::new(&args.subject, &args.location);
    let adapter = Arc::new(ProListTarget::new(&config.target_base_url));

    let summary = match args.sink {
        SinkKind::Database => {
            let pool = prospector_db::connect_pool_from_app_config(config).await?;
            prospector_db::run_migrations(&pool).await?;
            let mut sink = prospector_db::PgSink::new(pool, &args.subject, &args.location);
            run_crawl(&query, adapter, crawl_config, &mut sink, cancel).await?
        }
        SinkKind::Csv => {
            let mut sink = CsvSink::new(args.output.clone(), &args.subject, &args.location);
            run_crawl(&query, adapter, crawl_config, &mut sink, cancel).await?
        }
    };

    print_summary(&query, &summary);
    if summary.has_fatal_failure() {
        anyhow::bail!("crawl ended with a fatal failure");
    }
    Ok(())
}

fn print_summary(query: &SearchQuery, summary: &CrawlSummary) {
    println!("crawl finished: {}", query.combined());
    println!("  records written:       {}", summary.records_written);
    println!("  pages fetched:         {}", summary.pages_fetched);
    println!("  references discovered: {}", summary.references_discovered);
    println!("  requests issued:       {}", summary.requests_issued);
    println!("  retries:               {}", summary.retries);
    println!("  elapsed:               {}", format_elapsed(summary.elapsed));

    if !summary.failures.is_empty() {
        println!("  failures ({}):", summary.failures.len());
        for failure in &summary.failures {
            let marker = if failure.fatal { "fatal" } else { "skipped" };
            match &failure.external_id {
                Some(id) => println!("    [{marker}] {} {id}: {}", failure.stage, failure.reason),
                None => println!("    [{marker}] {}: {}", failure.stage, failure.reason),
            }
        }
    }
}

/// Formats a duration as `HH:MM:SS`.
fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_sub_minute_durations() {
        assert_eq!(format_elapsed(Duration::from_secs(7)), "00:00:07");
    }

    #[test]
    fn formats_hours_minutes_seconds() {
        assert_eq!(format_elapsed(Duration::from_secs(3600 + 23 * 60 + 45)), "01:23:45");
    }

    #[test]
    fn formats_multi_day_runs_as_hours() {
        assert_eq!(format_elapsed(Duration::from_secs(90_000)), "25:00:00");
    }
}
