use std::io::{self, BufRead, IsTerminal};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use revaudit::browser::ChromeLauncher;
use revaudit::cli::Cli;
use revaudit::config::{self, AppConfig};
use revaudit::engine::{AuditEngine, AuditError, AuditOutcome, AuditPlan, AuditRun};
use revaudit::events::{AuditEvent, EventSink};
use revaudit::export;
use revaudit::logger::{AuditLogger, VerbosityLevel};
use revaudit::signals::OperatorSignals;
use revaudit::workbook::XlsxOpener;

/// Set by the first Ctrl-C; a second one force-exits
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Handle --init flag first (before any other processing)
    if cli.init {
        match AppConfig::create_default_config_at(&cli.config) {
            Ok(path) => {
                println!("✅ Created default configuration file at: {}", path.display());
                println!("   Edit this file to list your profiles, then run revaudit again.");
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("❌ Failed to create configuration file: {}", e);
                std::process::exit(1);
            }
        }
    }

    if let Err(e) = cli.validate() {
        eprintln!("❌ Invalid arguments: {}", e);
        std::process::exit(1);
    }

    let mut app_config = match AppConfig::load_from_path(&cli.config) {
        Ok(cfg) => cfg,
        Err(config::ConfigError::FileNotFound(path)) => {
            // Config not found - prompt to create if interactive
            match AppConfig::prompt_create_config(&cli.config) {
                Ok(Some(created_path)) => {
                    println!("✅ Created default configuration file at: {}", created_path.display());
                    println!("   Edit this file to list your profiles, then run revaudit again.");
                    std::process::exit(0);
                }
                Ok(None) => {
                    eprintln!("❌ Configuration file not found at: {}", path.display());
                    eprintln!("   Run with --init to create a default configuration file.");
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("❌ Failed to create configuration file: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Err(e) => {
            eprintln!("❌ Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    cli.apply_overrides(&mut app_config);

    let plan = match AuditPlan::from_config(&app_config, &cli.profiles) {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("❌ Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let verbosity = VerbosityLevel::from_verbose_count(cli.verbose);
    let logger = match &cli.log_file {
        Some(path) => AuditLogger::with_log_file(verbosity, path.clone()),
        None => AuditLogger::new(verbosity),
    };

    let signals = OperatorSignals::new();
    install_interrupt_handler(signals.clone());

    let interactive = io::stdin().is_terminal();
    if interactive {
        spawn_operator_input(signals.clone());
    } else {
        // Unattended: nobody can press Enter, so start as soon as the browser is up
        logger.info("stdin is not a terminal; starting without operator confirmation");
        signals.request_start();
    }

    for profile in &plan.profiles {
        logger.debug(&format!(
            "Profile {}: {} -> {}",
            profile.name(),
            profile.source().display(),
            profile.output.display()
        ));
    }

    let (events, rx) = EventSink::channel();
    let engine = AuditEngine::new(
        ChromeLauncher::from_config(&app_config),
        XlsxOpener,
        plan,
        signals.clone(),
        events,
    );

    logger.mark_started();
    let worker = tokio::task::spawn_blocking(move || engine.run());
    let reported = pump_events(rx, &logger, &signals, interactive).await;

    let (run, outcome) = match worker.await {
        Ok(run) => {
            let outcome = run
                .outcome
                .clone()
                .or(reported)
                .unwrap_or(AuditOutcome::Aborted);
            (Some(run), outcome)
        }
        Err(e) => {
            let outcome = AuditOutcome::Failed(AuditError::Panicked(e.to_string()));
            logger.error(&outcome.to_string());
            (None, outcome)
        }
    };

    match &run {
        Some(run) => logger.record_run(run),
        None => logger.record_outcome(&outcome),
    }

    if let Some(summary_path) = &cli.summary {
        write_summary(run.as_ref(), summary_path, &logger);
    }

    logger.print_final_summary();

    if logger.is_log_export_enabled() {
        if let Err(e) = logger.export_logs() {
            eprintln!("⚠️  Failed to export logs: {}", e);
        }
    }

    std::process::exit(outcome.exit_code());
}

/// Structured tracing output for -vv or when RUST_LOG is set
fn init_tracing(verbose: u8) {
    let env_filter = std::env::var("RUST_LOG").is_ok();
    if verbose < 2 && !env_filter {
        return;
    }

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "revaudit=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init();
}

fn install_interrupt_handler(signals: OperatorSignals) {
    ctrlc::set_handler(move || {
        if INTERRUPTED.swap(true, Ordering::SeqCst) {
            eprintln!("⚠️  Force exiting.");
            std::process::exit(130); // 130 = 128 + SIGINT(2), standard exit code for Ctrl-C
        }
        eprintln!("\n⚠️  Interrupt received. Aborting audit (press Ctrl-C again to force exit)...");
        signals.request_abort();
    })
    .unwrap_or_else(|e| {
        eprintln!(
            "⚠️  Warning: Failed to set Ctrl-C handler: {}. Type 'q' to abort instead.",
            e
        );
    });
}

/// Enter starts (or retries) the audit; `q`/`abort` aborts it.
fn spawn_operator_input(signals: OperatorSignals) {
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match line.trim().to_lowercase().as_str() {
                "" | "start" | "s" => signals.request_start(),
                "q" | "quit" | "abort" => {
                    signals.request_abort();
                    break;
                }
                other => eprintln!("Unknown command '{}'. Press Enter to start or type 'q' to abort.", other),
            }
        }
    });
}

/// Relay worker events to the console until the worker drops its sender.
async fn pump_events(
    mut rx: UnboundedReceiver<AuditEvent>,
    logger: &AuditLogger,
    signals: &OperatorSignals,
    interactive: bool,
) -> Option<AuditOutcome> {
    let mut finished = None;

    while let Some(event) = rx.recv().await {
        match event {
            AuditEvent::Status(message) => {
                if logger.has_progress().await {
                    logger.update_progress(&message).await;
                    logger.debug(&message);
                } else {
                    logger.log_status(&message);
                }
            }
            AuditEvent::Progress { processed, total, percent } => {
                if !logger.has_progress().await && total > 0 {
                    logger.start_progress(total as u64).await;
                }
                logger.set_progress_position(processed as u64).await;
                logger.debug(&format!("Progress: {}/{} ({}%)", processed, total, percent));
            }
            AuditEvent::ValidationFailed(message) => {
                logger.log_validation_failed(&message);
                if !interactive {
                    logger.error("No operator available to log in; aborting");
                    signals.request_abort();
                }
            }
            AuditEvent::Finished(outcome) => {
                logger.finish_progress().await;
                if let AuditOutcome::Completed { reports } = &outcome {
                    for report in reports {
                        logger.log_report_written(report);
                    }
                }
                finished = Some(outcome);
            }
        }
    }

    logger.finish_progress().await;
    finished
}

fn write_summary(run: Option<&AuditRun>, path: &std::path::Path, logger: &AuditLogger) {
    let Some(run) = run else {
        logger.warn("No audit run to summarise");
        return;
    };
    match export::export_summary(run, path) {
        Ok(()) => logger.record_summary_file(path),
        Err(e) => logger.error(&format!("Failed to write summary {}: {}", path.display(), e)),
    }
}
