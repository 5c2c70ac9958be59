//! Line-based operator console read from stdin while the loop runs.

use std::io::BufRead;
use std::time::Duration;

use log::{info, warn};
use telematics_core::control::{ControlHandle, CrashTarget};

/// Time a `crash` command waits for the loop's answer.
const CRASH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Pause,
    Resume,
    Stop,
    Interval(u64),
    Accidents(bool),
    Crash(CrashTarget),
    Help,
}

pub const HELP: &str =
    "commands: pause | resume | stop | interval <ms> | accidents on|off | crash [driver_id] | help";

pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err("empty command".into());
    };
    let arg = words.next();
    if words.next().is_some() {
        return Err(format!("too many arguments to `{verb}`"));
    }
    match (verb.to_ascii_lowercase().as_str(), arg) {
        ("pause", None) => Ok(Command::Pause),
        ("resume", None) => Ok(Command::Resume),
        ("stop" | "quit" | "exit", None) => Ok(Command::Stop),
        ("help", None) => Ok(Command::Help),
        ("interval", Some(ms)) => ms
            .parse()
            .map(Command::Interval)
            .map_err(|_| format!("invalid interval `{ms}`")),
        ("accidents", Some("on")) => Ok(Command::Accidents(true)),
        ("accidents", Some("off")) => Ok(Command::Accidents(false)),
        ("crash", None) => Ok(Command::Crash(CrashTarget::Random)),
        ("crash", Some(id)) => id
            .parse()
            .map(|id| Command::Crash(CrashTarget::Driver(id)))
            .map_err(|_| format!("invalid driver id `{id}`")),
        _ => Err(format!("unrecognized command `{}`", line.trim())),
    }
}

/// Applies one command. Returns `false` once the loop has been told to stop.
pub fn apply(handle: &ControlHandle, command: Command) -> bool {
    match command {
        Command::Pause => handle.pause(),
        Command::Resume => handle.resume(),
        Command::Stop => {
            handle.stop();
            return false;
        }
        Command::Interval(ms) => {
            handle.set_interval_ms(ms);
        }
        Command::Accidents(enabled) => handle.set_random_accidents(enabled),
        Command::Crash(target) => match handle.trigger_crash(target, CRASH_TIMEOUT) {
            Ok(report) => info!(
                "manual crash on driver {}: {} at {:.1} mph",
                report.driver_id, report.accident, report.speed_at_impact_mph
            ),
            Err(err) => warn!("manual crash failed: {err}"),
        },
        Command::Help => info!("{HELP}"),
    }
    true
}

/// Reads commands until `stop` or end of input. End of input leaves the loop running.
pub fn run(input: impl BufRead, handle: &ControlHandle) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!("console input closed: {err}");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_command(&line) {
            Ok(command) => {
                if !apply(handle, command) {
                    return;
                }
            }
            Err(err) => warn!("{err}; {HELP}"),
        }
    }
}
