//! `mockrobot-cli` – operator shell for the MockRobot driver.
//!
//! This binary stands in for the lab UI.  It:
//!
//! 1. Checks for `~/.mockrobot/config.toml`; runs a **First-Run Wizard** when
//!    the file is absent.
//! 2. Optionally (`--simulate`) starts an in-process simulated robot and points
//!    the driver at it.
//! 3. Drops the user into an **interactive REPL** whose slash-commands map onto
//!    the UI's Open Connection / Initialize / Execute Operation / Abort buttons.
//! 4. Intercepts **Ctrl-C** to cancel any in-flight process wait and exit.

mod config;
mod repl;

use colored::Colorize;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use mockrobot_driver::MockRobotDriver;
use mockrobot_driver::sim::SimRobot;

/// Poll interval used against the simulator so demos finish quickly.
const SIM_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Status polls the simulator answers `In Progress` before finishing.
const SIM_POLLS_UNTIL_DONE: u32 = 3;

fn main() {
    let simulate = std::env::args().skip(1).any(|a| a == "--simulate");

    let (loaded, config_error) = match config::load() {
        Ok(cfg) => (cfg, None),
        Err(e) => (None, Some(e)),
    };

    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG selects the filter (defaults to "info").  Set
    // MOCKROBOT_LOG_FORMAT=json for newline-delimited JSON.  User-facing
    // output still goes through println!.
    init_tracing(loaded.as_ref().and_then(|c| c.log_file.as_deref()));

    print_banner();

    // ── First-Run Wizard ──────────────────────────────────────────────────
    let mut cfg = match (loaded, config_error) {
        (Some(cfg), _) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        (None, Some(e)) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
        (None, None) => run_first_run_wizard(),
    };

    // ── Simulated robot ───────────────────────────────────────────────────
    let _sim = if simulate {
        match SimRobot::builder().polls_until_done(SIM_POLLS_UNTIL_DONE).spawn() {
            Ok(sim) => {
                println!(
                    "  {} Simulated robot listening on {}",
                    "✓".green().bold(),
                    sim.addr().to_string().bold()
                );
                cfg.robot_ip = sim.addr().ip().to_string();
                cfg.port = sim.port();
                Some(sim)
            }
            Err(e) => {
                println!("{}: {}", "Failed to start simulated robot".red(), e);
                return;
            }
        }
    } else {
        None
    };

    let mut driver_config = cfg.driver_config();
    if simulate {
        driver_config.poll_interval = SIM_POLL_INTERVAL;
    }
    info!(
        robot_ip = %cfg.robot_ip,
        port = driver_config.port,
        simulate,
        "driver configured"
    );
    let driver = Arc::new(MockRobotDriver::with_config(driver_config));

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    // Cancelling interrupts a running process wait; the REPL then exits on
    // its next iteration.
    let cancel = driver.cancel_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – cancelling and shutting down …".yellow().bold());
        cancel.cancel();
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    println!();
    println!(
        "  Type {} for a list of commands.\n",
        "/help".bold().cyan()
    );

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(driver, cfg.robot_ip, shutdown);
}

fn init_tracing(log_file: Option<&Path>) {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    let file = log_file.and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => Some(f),
            Err(e) => {
                eprintln!("Failed to open log file {}: {}", path.display(), e);
                None
            }
        }
    });
    let to_file = file.is_some();
    let writer = match file {
        Some(f) => BoxMakeWriter::new(Mutex::new(f)),
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_ansi(!to_file)
        .with_writer(writer);

    if std::env::var("MOCKROBOT_LOG_FORMAT").as_deref() == Ok("json") {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║      MockRobot First-Run Wizard      ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up the driver.\n");

    let mut cfg = config::Config::default();

    cfg.robot_ip = prompt_line(
        &format!("  Robot IP address [{}]: ", cfg.robot_ip),
        &cfg.robot_ip,
    );

    let port_str = prompt_line(
        &format!("  Robot TCP port [{}]: ", cfg.port),
        &cfg.port.to_string(),
    );
    if let Ok(p) = port_str.trim().parse::<u16>() {
        cfg.port = p;
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   __  ___         __   ___       __        __ "#.bold().cyan());
    println!("{}", r#"  /  |/  /__  ____/ /__/ _ \___  / /  ___  / /_"#.bold().cyan());
    println!("{}", r#" / /|_/ / _ \/ __/  '_/ , _/ _ \/ _ \/ _ \/ __/"#.bold().cyan());
    println!("{}", r#"/_/  /_/\___/\__/_/\_\/_/|_|\___/_.__/\___/\__/ "#.bold().cyan());
    println!();
    println!("  {} {}",
        "MockRobot".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Robot arm driver shell");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
