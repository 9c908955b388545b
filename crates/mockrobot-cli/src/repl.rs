//! REPL – interactive stand-in for the UI's four buttons.
//!
//! Supported slash-commands:
//!   /help                       – show this list
//!   /open [ip]                  – Open Connection (defaults to the configured IP)
//!   /init                       – Initialize (home the robot)
//!   /pick <loc>                 – Execute Operation: Pick
//!   /place <loc>                – Execute Operation: Place
//!   /transfer <src> <dst>       – Execute Operation: Transfer
//!   /exec <Op> <name>=<v>, ...  – Execute Operation with raw UI arguments
//!   /abort                      – Abort (close the connection)
//!   /status                     – show connection / homing / process state
//!   /quit | /exit               – leave the shell

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mockrobot_driver::MockRobotDriver;
use mockrobot_types::{DESTINATION_LOCATION, SOURCE_LOCATION};

/// One parsed shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Help,
    Open(Option<String>),
    Init,
    Exec {
        operation: String,
        names: Vec<String>,
        values: Vec<i64>,
    },
    Abort,
    Status,
    Quit,
}

/// Parse one input line.  `Ok(None)` for a blank line.
pub fn parse_command(line: &str) -> Result<Option<ReplCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let cmd = match head {
        "/help" => ReplCommand::Help,
        "/open" => ReplCommand::Open(args.first().map(|s| s.to_string())),
        "/init" => ReplCommand::Init,
        "/pick" => {
            let [loc] = parse_locations::<1>(&args, "/pick <location>")?;
            exec("Pick", &[SOURCE_LOCATION], &[loc])
        }
        "/place" => {
            let [loc] = parse_locations::<1>(&args, "/place <location>")?;
            exec("Place", &[DESTINATION_LOCATION], &[loc])
        }
        "/transfer" => {
            let [src, dst] = parse_locations::<2>(&args, "/transfer <source> <destination>")?;
            exec("Transfer", &[SOURCE_LOCATION, DESTINATION_LOCATION], &[src, dst])
        }
        "/exec" => parse_exec(line)?,
        "/abort" => ReplCommand::Abort,
        "/status" => ReplCommand::Status,
        "/quit" | "/exit" => ReplCommand::Quit,
        other => return Err(format!("Unknown command '{other}'")),
    };
    Ok(Some(cmd))
}

fn exec(operation: &str, names: &[&str], values: &[i64]) -> ReplCommand {
    ReplCommand::Exec {
        operation: operation.to_string(),
        names: names.iter().map(|n| n.to_string()).collect(),
        values: values.to_vec(),
    }
}

fn parse_locations<const N: usize>(args: &[&str], usage: &str) -> Result<[i64; N], String> {
    if args.len() != N {
        return Err(format!("Usage: {usage}"));
    }
    let mut out = [0i64; N];
    for (slot, arg) in out.iter_mut().zip(args) {
        *slot = arg
            .parse()
            .map_err(|_| format!("'{arg}' is not a location number. Usage: {usage}"))?;
    }
    Ok(out)
}

/// `/exec Transfer Source Location=12, Destination Location=5`
fn parse_exec(line: &str) -> Result<ReplCommand, String> {
    const USAGE: &str = "Usage: /exec <Operation> <name>=<value>, <name>=<value> ...";
    let rest = line.trim().strip_prefix("/exec").unwrap_or_default().trim();
    let (operation, params) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    if operation.is_empty() {
        return Err(USAGE.to_string());
    }

    let mut names = Vec::new();
    let mut values = Vec::new();
    for pair in params.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("'{pair}' is not name=value. {USAGE}"))?;
        let value = value
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("'{}' is not a number. {USAGE}", value.trim()))?;
        names.push(name.trim().to_string());
        values.push(value);
    }
    Ok(ReplCommand::Exec {
        operation: operation.to_string(),
        names,
        values,
    })
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(driver: Arc<MockRobotDriver>, default_ip: String, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "mockrobot>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let cmd = match parse_command(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(e) => {
                println!("{} Type {} for available commands.", e.red(), "/help".bold());
                continue;
            }
        };

        match cmd {
            ReplCommand::Help => cmd_help(),
            ReplCommand::Open(ip) => {
                let ip = ip.unwrap_or_else(|| default_ip.clone());
                println!("  Connecting to {} …", ip.bold());
                print_result(&driver.open_connection(&ip));
            }
            ReplCommand::Init => {
                println!("  Homing … (this can take up to two minutes)");
                print_result(&driver.initialize());
            }
            ReplCommand::Exec {
                operation,
                names,
                values,
            } => {
                println!("  Executing {} …", operation.bold());
                print_result(&driver.execute_operation(&operation, &names, &values));
            }
            ReplCommand::Abort => print_result(&driver.abort()),
            ReplCommand::Status => cmd_status(&driver),
            ReplCommand::Quit => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
        }
    }

    // Leave the robot link closed on the way out; a refusal (process in
    // flight, already closed) is not worth reporting here.
    if driver.status().connected() {
        let _ = driver.abort();
    }
}

fn print_result(result: &str) {
    if result.is_empty() {
        println!("  {}", "✓ done".green());
    } else {
        println!("  {} {}", "✗".red().bold(), result.red());
    }
}

fn cmd_status(driver: &MockRobotDriver) {
    let status = driver.status();
    let yes_no = |b: bool| if b { "yes".green() } else { "no".yellow() };
    println!(
        "  Connected : {}{}",
        yes_no(status.connected()),
        status
            .ip_address
            .as_deref()
            .map(|ip| format!(" ({ip})"))
            .unwrap_or_default()
    );
    if let Some(ip) = &status.connecting {
        println!("  Dialling  : {}", ip.yellow());
    }
    println!("  Homed     : {}", yes_no(status.homed));
    match status.current_process {
        Some(id) => println!("  Process   : {} running", id.to_string().bold()),
        None => println!("  Process   : {}", "none".dimmed()),
    }
}

fn cmd_help() {
    println!();
    println!("  {}", "Available commands:".bold());
    let rows = [
        ("/open [ip]", "Open a connection to the robot"),
        ("/init", "Home the robot (required before operations)"),
        ("/pick <loc>", "Pick from a source location (1-17)"),
        ("/place <loc>", "Place at a destination location (1-17)"),
        ("/transfer <src> <dst>", "Pick then place"),
        ("/exec <Op> <name>=<v>, …", "Send a raw ExecuteOperation request"),
        ("/abort", "Close the connection"),
        ("/status", "Show driver state"),
        ("/quit", "Exit"),
    ];
    for (cmd, desc) in rows {
        println!("    {:<28} {}", cmd.cyan(), desc);
    }
    println!();
}
