//! TokenCache soak harness
//!
//! Seeds an in-memory token store, drives a concurrent mixed workload of
//! lookups, updates and deletions through the lookup cache, then checks
//! every cached lookup against the store.
//!
//! ```text
//! ┌──────────┐   find_by_* / add / remove   ┌─────────────┐   miss   ┌────────────────────┐
//! │ workers  │ ───────────────────────────▶ │ LookupCache │ ───────▶ │ InMemoryTokenStore │
//! └──────────┘                              └─────────────┘          └────────────────────┘
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use futures::TryStreamExt;
use prometheus::{Encoder, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tokencache::{
    CacheConfig, CacheStats, EntityStore, InMemoryTokenStore, LookupCache, Token, TokenStatus,
    TokenType,
};

type Cache = LookupCache<InMemoryTokenStore>;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Report format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Prometheus,
}

/// TokenCache soak harness - concurrent workload with a coherence check
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Cache capacity in size units
    #[arg(long, env = "TOKENCACHE_CAPACITY", default_value = "250")]
    capacity: u64,

    /// Disable caching of "not found" lookups
    #[arg(long, env = "TOKENCACHE_NO_NEGATIVE_CACHING")]
    no_negative_caching: bool,

    /// Background sweep interval in milliseconds (0 disables the sweeper)
    #[arg(long, env = "TOKENCACHE_SWEEP_INTERVAL_MS", default_value = "100")]
    sweep_interval_ms: u64,

    /// Number of tokens seeded into the store
    #[arg(long, default_value = "1000")]
    tokens: usize,

    /// Number of distinct subjects
    #[arg(long, default_value = "50")]
    subjects: usize,

    /// Number of distinct applications
    #[arg(long, default_value = "5")]
    applications: usize,

    /// Concurrent workers
    #[arg(long, default_value = "4")]
    workers: usize,

    /// Operations per worker
    #[arg(long, default_value = "20000")]
    iterations: usize,

    /// Workload seed
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    if args.workers == 0 || args.subjects == 0 || args.applications == 0 {
        bail!("workers, subjects and applications must be greater than zero");
    }

    info!("Starting TokenCache soak harness");
    info!("  Capacity: {}", args.capacity);
    info!("  Tokens: {}", args.tokens);
    info!("  Workers: {} x {} operations", args.workers, args.iterations);

    let mut config = CacheConfig::new()
        .with_capacity(args.capacity)
        .with_negative_caching(!args.no_negative_caching);
    if args.sweep_interval_ms > 0 {
        config = config.with_sweep_interval(Duration::from_millis(args.sweep_interval_ms));
    }

    let store = Arc::new(InMemoryTokenStore::new());
    seed_store(&store, &args);
    let cache = LookupCache::with_config(config, Arc::clone(&store))
        .context("invalid cache configuration")?;
    let cache = Arc::new(cache);

    // Spawn sweeper
    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(Arc::clone(&cache).run_sweeper(shutdown.clone()));

    let started = Instant::now();
    let mut handles = Vec::with_capacity(args.workers);
    for worker in 0..args.workers {
        let cache = Arc::clone(&cache);
        let store = Arc::clone(&store);
        let plan = Plan::from_args(&args, worker);
        handles.push(tokio::spawn(async move { run_worker(cache, store, plan).await }));
    }

    let mut totals = WorkerReport::default();
    for handle in handles {
        let report = handle.await.context("worker panicked")??;
        totals.merge(&report);
    }
    let elapsed = started.elapsed();

    shutdown.cancel();
    sweeper.await.context("sweeper panicked")?;

    info!(
        reads = totals.reads,
        updates = totals.updates,
        deletes = totals.deletes,
        elapsed_ms = elapsed.as_millis() as u64,
        "Workload complete"
    );

    let checked = verify(&cache, &store, &args).await?;
    info!(checked, "Coherence check passed");

    let stats = cache.stats();
    match args.format {
        OutputFormat::Text => print_text(&stats),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Prometheus => print!("{}", render_prometheus(&stats)?),
    }

    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

// =============================================================================
// Workload
// =============================================================================

fn token_id(n: usize) -> String {
    format!("tok-{:06}", n)
}

fn seed_store(store: &InMemoryTokenStore, args: &Args) {
    const TYPES: [TokenType; 3] = [
        TokenType::AccessToken,
        TokenType::RefreshToken,
        TokenType::AuthorizationCode,
    ];

    for n in 0..args.tokens {
        store.create(
            Token::new(TYPES[n % TYPES.len()])
                .with_id(token_id(n))
                .with_reference_id(format!("ref-{:06}", n))
                .with_subject(format!("user-{}", n % args.subjects))
                .with_application_id(format!("app-{}", n % args.applications))
                .with_authorization_id(format!("auth-{}", n / 4)),
        );
    }
    debug!(count = store.len(), "Seeded token store");
}

/// What one worker does
struct Plan {
    worker: usize,
    workers: usize,
    tokens: usize,
    subjects: usize,
    applications: usize,
    iterations: usize,
    seed: u64,
}

impl Plan {
    fn from_args(args: &Args, worker: usize) -> Self {
        Self {
            worker,
            workers: args.workers,
            tokens: args.tokens,
            subjects: args.subjects,
            applications: args.applications,
            iterations: args.iterations,
            seed: args.seed,
        }
    }

    /// Tokens this worker may mutate. Ownership is partitioned so two
    /// workers never write the same token.
    fn owned(&self, rng: &mut StdRng) -> Option<usize> {
        let owned = self.tokens.saturating_sub(self.worker).div_ceil(self.workers);
        (owned > 0).then(|| self.worker + rng.random_range(0..owned) * self.workers)
    }
}

#[derive(Debug, Default)]
struct WorkerReport {
    reads: u64,
    updates: u64,
    deletes: u64,
}

impl WorkerReport {
    fn merge(&mut self, other: &WorkerReport) {
        self.reads += other.reads;
        self.updates += other.updates;
        self.deletes += other.deletes;
    }
}

async fn run_worker(
    cache: Arc<Cache>,
    store: Arc<InMemoryTokenStore>,
    plan: Plan,
) -> anyhow::Result<WorkerReport> {
    let mut rng = StdRng::seed_from_u64(plan.seed.wrapping_add(plan.worker as u64));
    let mut report = WorkerReport::default();
    // Look up ids past the seeded range so misses are exercised too
    let id_space = plan.tokens + plan.tokens / 10 + 1;

    for iteration in 0..plan.iterations {
        let roll = rng.random_range(0..100u32);
        match roll {
            0..=49 => {
                cache.find_by_id(&token_id(rng.random_range(0..id_space))).await?;
                report.reads += 1;
            }
            50..=64 => {
                let reference = format!("ref-{:06}", rng.random_range(0..id_space));
                cache.find_by_reference_id(&reference).await?;
                report.reads += 1;
            }
            65..=79 => {
                let subject = format!("user-{}", rng.random_range(0..plan.subjects));
                cache.find_by_subject(&subject).await?;
                report.reads += 1;
            }
            80..=87 => {
                let application = format!("app-{}", rng.random_range(0..plan.applications));
                cache.find_by_application_id(&application).await?;
                report.reads += 1;
            }
            88..=93 => {
                let authorization = format!("auth-{}", rng.random_range(0..plan.tokens / 4 + 1));
                cache.find_by_authorization_id(&authorization).await?;
                report.reads += 1;
            }
            94..=97 => {
                let Some(n) = plan.owned(&mut rng) else {
                    continue;
                };
                let Some(current) = cache.find_by_id(&token_id(n)).await? else {
                    continue;
                };

                let updated = current
                    .clone()
                    .with_status(TokenStatus::Revoked)
                    .with_payload(format!("w{}-i{}", plan.worker, iteration));
                store.update(updated.clone())?;
                cache.remove(&current)?;
                cache.add(&updated)?;
                report.updates += 1;
            }
            _ => {
                let Some(n) = plan.owned(&mut rng) else {
                    continue;
                };
                if let Some(deleted) = store.delete(&token_id(n)) {
                    cache.remove(&deleted)?;
                    report.deletes += 1;
                }
            }
        }

        if iteration % 64 == 0 {
            tokio::task::yield_now().await;
        }
    }

    debug!(worker = plan.worker, ?report, "Worker finished");
    Ok(report)
}

/// Compare every cached lookup with the store. Returns the number of
/// lookups checked.
async fn verify(cache: &Cache, store: &InMemoryTokenStore, args: &Args) -> anyhow::Result<usize> {
    let mut checked = 0;

    for n in 0..args.tokens {
        let id = token_id(n);
        let expected = store.find_by_id(&id).await?;
        let cached = cache.find_by_id(&id).await?;
        if cached != expected {
            bail!("cached lookup for '{}' disagrees with the store", id);
        }
        checked += 1;
    }

    for s in 0..args.subjects {
        let subject = format!("user-{}", s);
        let mut expected: Vec<Option<String>> = store
            .find_by_subject(&subject)
            .map_ok(|token| token.id)
            .try_collect()
            .await?;
        let mut cached: Vec<Option<String>> = cache
            .find_by_subject(&subject)
            .await?
            .iter()
            .map(|token| token.id.clone())
            .collect();
        expected.sort();
        cached.sort();
        if cached != expected {
            bail!("cached list for subject '{}' disagrees with the store", subject);
        }
        checked += 1;
    }

    Ok(checked)
}

// =============================================================================
// Reporting
// =============================================================================

fn print_text(stats: &CacheStats) {
    println!("{:<18} {:>10} {:>10}", "shape", "hits", "misses");
    for shape in &stats.lookups.lookups {
        println!("{:<18} {:>10} {:>10}", shape.shape, shape.hits, shape.misses);
    }
    println!();
    println!("store queries:        {}", stats.lookups.store_queries);
    println!("hit ratio:            {:.3}", stats.lookups.overall_hit_ratio);
    println!("signals fired:        {}", stats.lookups.signals_fired);
    println!("populations skipped:  {}", stats.lookups.populations_skipped);
    println!("entries / size:       {} / {}", stats.store.entries, stats.store.size);
    println!("evictions:            {}", stats.store.evictions);
    println!("live signals:         {}", stats.live_signals);
}

fn render_prometheus(stats: &CacheStats) -> anyhow::Result<String> {
    let registry = Registry::new();

    let lookups = IntGaugeVec::new(
        Opts::new("tokencache_lookups", "Lookups served, by shape and outcome"),
        &["shape", "outcome"],
    )?;
    registry.register(Box::new(lookups.clone()))?;
    for shape in &stats.lookups.lookups {
        lookups
            .with_label_values(&[shape.shape, "hit"])
            .set(shape.hits as i64);
        lookups
            .with_label_values(&[shape.shape, "miss"])
            .set(shape.misses as i64);
    }

    let gauges = [
        (
            "tokencache_store_queries",
            "Queries sent to the backing store",
            stats.lookups.store_queries,
        ),
        (
            "tokencache_signals_fired",
            "Invalidation signals fired",
            stats.lookups.signals_fired,
        ),
        (
            "tokencache_populations_skipped",
            "Populations dropped after a concurrent invalidation",
            stats.lookups.populations_skipped,
        ),
        (
            "tokencache_entries",
            "Cached entries",
            stats.store.entries as u64,
        ),
        ("tokencache_size", "Cached size units", stats.store.size),
        (
            "tokencache_capacity",
            "Capacity in size units",
            stats.store.capacity,
        ),
        (
            "tokencache_evictions",
            "Capacity evictions",
            stats.store.evictions,
        ),
        (
            "tokencache_live_signals",
            "Unfired invalidation signals",
            stats.live_signals as u64,
        ),
    ];
    for (name, help, value) in gauges {
        let gauge = IntGauge::new(name, help)?;
        gauge.set(value as i64);
        registry.register(Box::new(gauge))?;
    }

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
