use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use vitalsync::cache::{CacheService, CacheStorage, JsonFileStorage, NoopStorage};
use vitalsync::config::Config;
use vitalsync::health::MetricType;
use vitalsync::logging;
use vitalsync::source::JsonFileSource;
use vitalsync::sync::{NetworkKind, RetryOutcome, StaticDeviceMonitor, SyncEngine, SyncOutcome};
use vitalsync::transport::HttpTransport;

#[derive(Parser, Debug)]
#[command(name = "vitalsync")]
#[command(about = "Cache device health metrics and upload them in batches")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/vitalsync/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Battery charge as a fraction in [0, 1]; unknown if omitted
  #[arg(long, global = true)]
  battery: Option<f32>,

  /// Device is in low power mode
  #[arg(long, global = true)]
  low_power: bool,

  /// Current network: wifi, ethernet, cellular or offline
  #[arg(long, global = true, default_value_t = NetworkKind::Wifi)]
  network: NetworkKind,

  /// Don't write a log file
  #[arg(long, global = true)]
  no_log_file: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Sync once, retrying queued uploads if it fails
  Sync {
    /// Only sync these metric types over the last day
    #[arg(long, value_delimiter = ',')]
    metrics: Vec<MetricType>,
  },
  /// Sync on the configured interval until Ctrl-C
  Run,
  /// Show cache counters and throttle state
  CacheStats,
  /// Drop cached data for one metric type, or everything
  ClearCache {
    #[arg(long)]
    metric: Option<MetricType>,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = logging::init(if args.no_log_file {
    None
  } else {
    logging::default_log_dir()
  })?;

  let config = Config::load(args.config.as_deref())?;

  let device = StaticDeviceMonitor {
    battery_level: args.battery.map(|b| b.clamp(0.0, 1.0)),
    low_power_mode: args.low_power,
    network: args.network,
  };

  let cache_config = config
    .cache
    .configuration(device.battery_level, device.low_power_mode);
  let storage: Arc<dyn CacheStorage> = if cache_config.persist_to_disk {
    match &config.cache.directory {
      Some(dir) => Arc::new(JsonFileStorage::open_at(dir)?),
      None => Arc::new(JsonFileStorage::open()?),
    }
  } else {
    Arc::new(NoopStorage)
  };
  let cache = Arc::new(CacheService::new(cache_config, storage));

  match args.command {
    Command::CacheStats => {
      print_cache_stats(&cache);
      return Ok(());
    }
    Command::ClearCache { metric } => {
      match metric {
        Some(metric) => {
          cache.clear_for(metric);
          println!("Cleared cached {}", metric);
        }
        None => {
          cache.clear_all();
          println!("Cleared all cached data");
        }
      }
      return Ok(());
    }
    Command::Sync { .. } | Command::Run => {}
  }

  let transport = HttpTransport::new(
    config.upload.endpoint.clone(),
    Config::get_upload_token(),
    config.upload.timeout(),
  )?;

  let engine = Arc::new(
    SyncEngine::new(
      config.sync.configuration(),
      config.owner_id.clone(),
      cache,
      Arc::new(JsonFileSource::new(&config.source.directory)),
      Arc::new(transport),
      Arc::new(device),
    )
    .with_metrics(config.metrics.clone()),
  );

  match args.command {
    Command::Sync { metrics } => sync_once(&engine, &metrics).await,
    Command::Run => run_until_interrupted(&engine).await,
    Command::CacheStats | Command::ClearCache { .. } => Ok(()),
  }
}

async fn sync_once(engine: &SyncEngine, metrics: &[MetricType]) -> Result<()> {
  let result = if metrics.is_empty() {
    engine.sync_now().await
  } else {
    engine.sync_metrics(metrics).await
  };

  match result {
    Ok(SyncOutcome::Completed(report)) => {
      println!(
        "Uploaded {} data points in {} request(s)",
        report.uploaded_points, report.chunks
      );
      for metric in report.skipped {
        println!("  skipped {}", metric);
      }
      Ok(())
    }
    Ok(SyncOutcome::AlreadySyncing) => {
      println!("A sync is already running");
      Ok(())
    }
    Err(e) => {
      println!("Sync failed: {}", e);
      if engine.statistics().pending_batch_count == 0 {
        return Err(eyre!(e));
      }

      match engine.retry_failed_uploads().await {
        RetryOutcome::Success { retried } => {
          println!("Retry delivered {} queued batch(es)", retried);
          Ok(())
        }
        RetryOutcome::PartialFailure {
          success_count,
          errors,
        } => {
          let reasons: Vec<String> = errors.iter().map(ToString::to_string).collect();
          Err(eyre!(
            "Retry delivered {} batch(es) before failing: {}",
            success_count,
            reasons.join("; ")
          ))
        }
        RetryOutcome::AlreadyRunning => Err(eyre!(e)),
      }
    }
  }
}

async fn run_until_interrupted(engine: &Arc<SyncEngine>) -> Result<()> {
  if !engine.configuration().background_sync_enabled {
    return Err(eyre!("Background sync is disabled in the configuration"));
  }
  if !engine.start_automatic_sync() {
    return Err(eyre!("Sync interval must be positive for automatic sync"));
  }

  tokio::signal::ctrl_c()
    .await
    .map_err(|e| eyre!("Failed to listen for Ctrl-C: {}", e))?;

  engine.stop_automatic_sync();
  let stats = engine.statistics();
  info!(
    total_synced = stats.total_synced,
    pending = stats.pending_batch_count,
    "shutting down"
  );
  Ok(())
}

fn print_cache_stats(cache: &CacheService) {
  let stats = cache.statistics();
  println!("Queries:   {}", stats.total_queries);
  println!("Hits:      {} ({:.1}%)", stats.hit_count, stats.hit_rate() * 100.0);
  println!("Misses:    {}", stats.miss_count);
  println!(
    "Throttled: {} ({:.1}%)",
    stats.throttle_count,
    stats.throttle_rate() * 100.0
  );

  for metric in MetricType::ALL {
    let remaining = cache.remaining_throttle_time(metric);
    println!(
      "{:<15} {} entries, throttle {}s",
      metric.to_string(),
      cache.entry_count(metric),
      remaining.num_seconds()
    );
  }
}
