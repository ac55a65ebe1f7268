//! Cushion Link CLI
//!
//! Runs the posture engine against a mock or real cushion and inspects the
//! history it leaves behind.

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use cushion_link::{
    clock::{Clock, SystemClock},
    config::{Config, SourceKind, ThresholdUpdate},
    core::{
        history::{local_date, summarize},
        CushionEngine, EngineEvent, EngineOptions, HistoryAggregator, HistoryRecord,
        HistoryStore, JsonFileStore, PostureLabel,
    },
    diagnostics::{create_shared_log_with_persistence, LinkLog},
    protocol::{
        codec::{encode, threshold_command},
        stream::FrameReader,
        types::Command,
    },
    source::{route_frame, LinkEvent, MockSource, ReadingSource, StreamSource},
    VERSION,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cushion")]
#[command(version = VERSION)]
#[command(about = "Posture and occupancy engine for the smart cushion", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine against a reading source
    Run {
        /// Reading source (mock, stdin or replay)
        #[arg(long)]
        source: Option<String>,

        /// Capture file for the replay source
        #[arg(long)]
        replay: Option<PathBuf>,

        /// Seed for the mock source
        #[arg(long)]
        seed: Option<u64>,

        /// Tick interval in milliseconds (overrides config)
        #[arg(long)]
        tick_ms: Option<u64>,

        /// Stop after this many ticks
        #[arg(long)]
        ticks: Option<u64>,

        /// Serve snapshots over HTTP on this port (requires server feature)
        #[arg(long)]
        serve: Option<u16>,
    },

    /// Show link statistics and history overview
    Status,

    /// List or export archived sessions
    History {
        /// Number of records to show
        #[arg(long, short, default_value = "10")]
        limit: usize,

        /// Write records to the export directory
        #[arg(long)]
        export: bool,

        /// Export format (json or jsonl)
        #[arg(long, default_value = "json")]
        format: String,

        /// Output directory for the export
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show or update thresholds
    Thresholds {
        #[arg(long)]
        temp_min: Option<f64>,
        #[arg(long)]
        temp_max: Option<f64>,
        #[arg(long)]
        humidity_min: Option<f64>,
        #[arg(long)]
        humidity_max: Option<f64>,
        #[arg(long)]
        sitting_max_minutes: Option<u32>,
        #[arg(long)]
        alert_delay_secs: Option<u32>,
    },

    /// Build a command frame and print it as hex
    Encode {
        command: FrameCommand,

        /// Payload bytes as hex (set-thresholds defaults to the configured values)
        #[arg(long)]
        payload: Option<String>,
    },

    /// Decode hex bytes into frames
    Decode {
        /// Hex bytes; spaces are ignored
        hex: Vec<String>,
    },

    /// Show configuration
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum FrameCommand {
    SensorData,
    DeviceStatus,
    PostureAlert,
    HeatingOn,
    HeatingOff,
    FanOn,
    FanOff,
    SetThresholds,
    QueryStatus,
}

impl From<FrameCommand> for Command {
    fn from(value: FrameCommand) -> Self {
        match value {
            FrameCommand::SensorData => Command::SensorData,
            FrameCommand::DeviceStatus => Command::DeviceStatus,
            FrameCommand::PostureAlert => Command::PostureAlert,
            FrameCommand::HeatingOn => Command::HeatingOn,
            FrameCommand::HeatingOff => Command::HeatingOff,
            FrameCommand::FanOn => Command::FanOn,
            FrameCommand::FanOff => Command::FanOff,
            FrameCommand::SetThresholds => Command::SetThresholds,
            FrameCommand::QueryStatus => Command::QueryStatus,
        }
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            source,
            replay,
            seed,
            tick_ms,
            ticks,
            serve,
        } => {
            cmd_run(source, replay, seed, tick_ms, ticks, serve);
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::History {
            limit,
            export,
            format,
            output,
        } => {
            cmd_history(limit, export, &format, output);
        }
        Commands::Thresholds {
            temp_min,
            temp_max,
            humidity_min,
            humidity_max,
            sitting_max_minutes,
            alert_delay_secs,
        } => {
            cmd_thresholds(ThresholdUpdate {
                temp_min,
                temp_max,
                humidity_max,
                humidity_min,
                sitting_duration_max_minutes: sitting_max_minutes,
                posture_alert_delay_secs: alert_delay_secs,
            });
        }
        Commands::Encode { command, payload } => {
            cmd_encode(command.into(), payload);
        }
        Commands::Decode { hex } => {
            cmd_decode(&hex.concat());
        }
        Commands::Config => {
            cmd_config();
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config() -> Config {
    match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config ({e}), using defaults");
            Config::default()
        }
    }
}

fn cmd_run(
    source: Option<String>,
    replay: Option<PathBuf>,
    seed: Option<u64>,
    tick_ms: Option<u64>,
    max_ticks: Option<u64>,
    serve: Option<u16>,
) {
    println!("Cushion Link v{VERSION}");
    println!();

    let mut config = load_config();
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }
    if let Some(name) = source {
        match SourceKind::from_arg(&name, replay, seed) {
            Ok(kind) => config.source = kind,
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
    } else if seed.is_some() && matches!(config.source, SourceKind::Mock { .. }) {
        config.source = SourceKind::Mock { seed };
    }
    if let Some(ms) = tick_ms {
        config.tick_interval = std::time::Duration::from_millis(ms.max(1));
    }

    let options = match EngineOptions::from_config(&config) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    let tz = options.tz;

    let mut reading_source: Box<dyn ReadingSource> = match &config.source {
        SourceKind::Mock { seed } => Box::new(MockSource::new(*seed)),
        SourceKind::Stdin => Box::new(StreamSource::from_reader("stdin", std::io::stdin(), None)),
        SourceKind::Replay { path } => match std::fs::File::open(path) {
            Ok(file) => Box::new(StreamSource::from_reader(
                "replay",
                file,
                Some(config.tick_interval),
            )),
            Err(e) => {
                eprintln!("Error opening capture {path:?}: {e}");
                std::process::exit(1);
            }
        },
    };

    println!("Starting engine...");
    println!("  Source: {}", reading_source.name());
    println!("  Tick interval: {}ms", config.tick_interval.as_millis());
    println!("  Time zone: {}", config.timezone);
    println!("  Disconnect policy: {:?}", config.disconnect_policy);

    let link_log = create_shared_log_with_persistence(config.link_log_path());
    let store = JsonFileStore::new(config.history_path());
    let history = match HistoryAggregator::with_store(Box::new(store)) {
        Ok(history) => {
            println!("  Archived sessions: {}", history.record_len());
            history
        }
        Err(e) => {
            eprintln!("Warning: Could not load history ({e}), starting empty without saving");
            HistoryAggregator::new()
        }
    };
    let mut engine = CushionEngine::new(options, history, link_log.clone());

    #[cfg(feature = "server")]
    let server = serve.and_then(|port| start_server(port, engine.snapshot_handle()));
    #[cfg(not(feature = "server"))]
    if serve.is_some() {
        eprintln!("Warning: --serve ignored (server feature not enabled at compile time)");
    }

    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let clock = SystemClock;
    let mut day = local_date(clock.now_ms(), tz);
    let mut ticks = 0u64;

    while running.load(Ordering::SeqCst) {
        let now = clock.now_ms();
        let today = local_date(now, tz);
        if today != day {
            engine.new_day();
            day = today;
        }

        let events = engine.pump(reading_source.as_mut(), now);
        for frame in engine.take_outbound() {
            println!("[{}] -> {}", clock_label(now, tz), hex::encode(frame));
        }

        let mut link_lost = false;
        for event in &events {
            if matches!(event, EngineEvent::LinkLost) {
                link_lost = true;
            }
            print_event(event, now, tz);
        }
        if link_lost {
            println!("Source closed");
            break;
        }

        ticks += 1;
        if max_ticks.is_some_and(|max| ticks >= max) {
            break;
        }
        thread::sleep(config.tick_interval);
    }

    println!();
    println!("Stopping engine...");
    for event in engine.shutdown() {
        print_event(&event, clock.now_ms(), tz);
    }

    #[cfg(feature = "server")]
    if let Some((runtime, shutdown_tx)) = server {
        let _ = shutdown_tx.send(());
        runtime.shutdown_timeout(std::time::Duration::from_secs(1));
    }

    let snapshot = engine.snapshot();
    println!();
    println!("Today's posture alerts: {}", snapshot.today_alert_count);
    println!("{}", link_log.summary());
}

#[cfg(feature = "server")]
fn start_server(
    port: u16,
    snapshots: cushion_link::core::SnapshotHandle,
) -> Option<(tokio::runtime::Runtime, tokio::sync::oneshot::Sender<()>)> {
    use cushion_link::server::{run, ServerConfig};

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Warning: Could not start async runtime: {e}");
            return None;
        }
    };
    match runtime.block_on(run(ServerConfig::new(port), snapshots)) {
        Ok((addr, shutdown_tx)) => {
            println!("  Snapshot server: http://{addr}");
            Some((runtime, shutdown_tx))
        }
        Err(e) => {
            eprintln!("Warning: Could not start snapshot server: {e}");
            None
        }
    }
}

fn clock_label(now_ms: u64, tz: chrono_tz::Tz) -> String {
    use chrono::TimeZone;
    tz.timestamp_millis_opt(now_ms as i64)
        .single()
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_default()
}

fn print_event(event: &EngineEvent, now_ms: u64, tz: chrono_tz::Tz) {
    let at = clock_label(now_ms, tz);
    match event {
        EngineEvent::SessionOpened { session_id, .. } => {
            println!("[{at}] Seated (session {session_id})");
        }
        EngineEvent::SessionClosed(record) => {
            println!(
                "[{at}] Left seat after {}m {}s, {} alert(s)",
                record.duration / 60,
                record.duration % 60,
                record.alert_count
            );
        }
        EngineEvent::PostureChanged { to, .. } => {
            if to.is_seated() {
                println!("[{at}] Posture: {to}");
            }
        }
        EngineEvent::PostureAlert { label, streak_ms, .. } => {
            println!(
                "[{at}] ALERT: {} ({}s)",
                label.description(),
                streak_ms / 1000
            );
        }
        EngineEvent::SedentaryReminder { seated_ms, .. } => {
            println!(
                "[{at}] Seated for {} minutes, time to stand up and stretch",
                seated_ms / 60_000
            );
        }
        EngineEvent::DeviceAlert { payload } => {
            println!("[{at}] Device alert: {}", hex::encode(payload));
        }
        EngineEvent::LinkLost => {}
    }
}

fn load_records(config: &Config) -> Vec<HistoryRecord> {
    match JsonFileStore::new(config.history_path()).load() {
        Ok(records) => records,
        Err(e) => {
            eprintln!("Error reading history: {e}");
            Vec::new()
        }
    }
}

fn dominant_posture(record: &HistoryRecord) -> PostureLabel {
    PostureLabel::SEATED
        .iter()
        .copied()
        .max_by(|a, b| {
            record
                .posture_breakdown
                .get(*a)
                .total_cmp(&record.posture_breakdown.get(*b))
        })
        .unwrap_or(PostureLabel::Normal)
}

fn cmd_status() {
    let config = load_config();

    println!("Cushion Link Status");
    println!("===================");
    println!();

    println!("Configuration:");
    println!("  Source: {:?}", config.source);
    println!("  Tick interval: {}ms", config.tick_interval.as_millis());
    println!("  Time zone: {}", config.timezone);
    println!("  Disconnect policy: {:?}", config.disconnect_policy);
    println!();

    let stats_path = config.link_log_path();
    if stats_path.exists() {
        let stats = LinkLog::with_persistence(stats_path).stats();
        println!("Cumulative Statistics:");
        println!("  Frames decoded: {}", stats.frames_decoded);
        println!("  Frames dropped: {}", stats.frames_dropped);
        println!("  Readings processed: {}", stats.readings_processed);
        println!("  Sessions archived: {}", stats.sessions_archived);
        println!("  Posture alerts: {}", stats.posture_alerts);
        println!("  Commands sent: {}", stats.commands_sent);
    } else {
        println!("No previous run data found.");
    }
    println!();

    let records = load_records(&config);
    if records.is_empty() {
        return;
    }
    let tz = config.tz().unwrap_or(chrono_tz::UTC);
    let now = SystemClock.now_ms();
    let today = local_date(now, tz);
    let todays: Vec<&HistoryRecord> = records.iter().filter(|r| r.date == today).collect();
    let summary = summarize(records.iter().take(7));

    println!("History:");
    println!("  Archived sessions: {}", records.len());
    println!(
        "  Today: {} session(s), {} minutes seated",
        todays.len(),
        todays.iter().map(|r| r.duration / 60).sum::<u64>()
    );
    println!(
        "  Last {} sessions: mean {:.0}s (sd {:.0}s), {} alert(s), {:.0}% upright",
        summary.sessions,
        summary.mean_duration_secs,
        summary.std_dev_duration_secs,
        summary.total_alerts,
        summary.posture_share.normal * 100.0
    );
}

fn cmd_history(limit: usize, export: bool, format: &str, output: Option<PathBuf>) {
    let config = load_config();
    let records = load_records(&config);

    if records.is_empty() {
        println!("No sessions recorded yet.");
        println!("Run 'cushion run' to start tracking.");
        return;
    }

    if !export {
        println!(
            "{:<12} {:<8} {:>8} {:>7} {:<16}",
            "Date", "Start", "Minutes", "Alerts", "Mostly"
        );
        let tz = config.tz().unwrap_or(chrono_tz::UTC);
        for record in records.iter().take(limit) {
            println!(
                "{:<12} {:<8} {:>8} {:>7} {:<16}",
                record.date,
                clock_label(record.start_time, tz),
                record.duration / 60,
                record.alert_count,
                dominant_posture(record).as_str()
            );
        }
        return;
    }

    let export_dir = output.unwrap_or(config.export_path.clone());
    if let Err(e) = std::fs::create_dir_all(&export_dir) {
        eprintln!("Error creating {export_dir:?}: {e}");
        return;
    }
    let output_path = export_dir.join(format!(
        "history_{}.{}",
        Utc::now().format("%Y%m%d_%H%M%S"),
        if format == "jsonl" { "jsonl" } else { "json" }
    ));

    let selected: Vec<&HistoryRecord> = records.iter().take(limit).collect();
    let result = if format == "jsonl" {
        let lines: Vec<String> = selected
            .iter()
            .filter_map(|r| serde_json::to_string(r).ok())
            .collect();
        std::fs::write(&output_path, lines.join("\n"))
    } else {
        match serde_json::to_string_pretty(&selected) {
            Ok(json) => std::fs::write(&output_path, json),
            Err(e) => {
                eprintln!("Error serializing: {e}");
                return;
            }
        }
    };

    match result {
        Ok(_) => println!("Exported {} session(s) to {output_path:?}", selected.len()),
        Err(e) => eprintln!("Error writing export: {e}"),
    }
}

fn cmd_thresholds(update: ThresholdUpdate) {
    let mut config = load_config();

    if !update.is_empty() {
        match config.thresholds.apply(&update) {
            Ok(next) => {
                config.thresholds = next;
                if let Err(e) = config.save() {
                    eprintln!("Error saving config: {e}");
                    std::process::exit(1);
                }
                println!("Thresholds updated.");
                println!();
            }
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
    }

    let t = config.thresholds;
    println!("Thresholds");
    println!("==========");
    println!("  Heating: on below {}°C, off at {}°C", t.temp_min, t.temp_max);
    println!("  Fan: on above {}%, off below {}%", t.humidity_max, t.humidity_min);
    println!("  Sedentary reminder: {} minutes", t.sitting_duration_max_minutes);
    println!("  Posture alert delay: {} seconds", t.posture_alert_delay_secs);
    println!();
    println!("Frame: {}", hex::encode(threshold_command(&t)));
}

fn cmd_encode(command: Command, payload: Option<String>) {
    let frame = match payload {
        Some(text) => match hex::decode(strip_spaces(&text)) {
            Ok(bytes) => encode(command, &bytes),
            Err(e) => {
                eprintln!("Error: invalid hex payload: {e}");
                std::process::exit(1);
            }
        },
        None if command == Command::SetThresholds => {
            Ok(threshold_command(&load_config().thresholds))
        }
        None => encode(command, &[]),
    };

    match frame {
        Ok(bytes) => println!("{}", hex::encode(bytes)),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_decode(text: &str) {
    let bytes = match hex::decode(strip_spaces(text)) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error: invalid hex: {e}");
            std::process::exit(1);
        }
    };

    let mut reader = FrameReader::new();
    let results = reader.push(&bytes);
    if results.is_empty() {
        println!("No complete frame found");
    }

    for result in results {
        match result {
            Ok(frame) => {
                println!(
                    "Frame {:?} (0x{:02X}), payload {}",
                    frame.command,
                    frame.command.code(),
                    hex::encode(&frame.payload)
                );
                match route_frame(&frame, SystemClock.now_ms()) {
                    Some(LinkEvent::Reading(reading)) => {
                        let c = cushion_link::classify(&reading);
                        println!(
                            "  Pressures LF/RF/LB/RB: {:?}, total {}",
                            reading.pressures(),
                            c.total_pressure
                        );
                        println!(
                            "  Temperature {}°C, humidity {}%",
                            reading.temperature, reading.humidity
                        );
                        println!("  Posture: {} ({:.2})", c.label, c.confidence);
                    }
                    Some(LinkEvent::Status(status)) => {
                        println!(
                            "  Battery {}%, signal {}",
                            status.battery_level, status.signal_strength
                        );
                    }
                    Some(LinkEvent::Dropped(e)) => println!("  Rejected: {e}"),
                    _ => {}
                }
            }
            Err(e) => println!("Rejected: {e}"),
        }
    }

    if reader.discarded_bytes() > 0 {
        println!("Skipped {} byte(s) outside frames", reader.discarded_bytes());
    }
    if reader.pending_len() > 0 {
        println!("{} byte(s) left waiting for the rest of a frame", reader.pending_len());
    }
}

fn cmd_config() {
    let config = load_config();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn strip_spaces(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: Could not set Ctrl+C handler: {e}");
    }
}
