//! gpiotrigger - run a command once a GPIO line is held low

use anyhow::Result;
use clap::Parser;
use cli_lib::{run, ConfigOverrides, RunOutcome, WatchConfig};
use std::io::Write;
use std::path::PathBuf;
use tracing::{warn, Level};

/// Run a shell command when a GPIO line falls and stays down
#[derive(Parser)]
#[command(name = "gpiotrigger")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Shell command to run once the edge is confirmed [default: "echo hello, world"]
    #[arg(short, long)]
    command: Option<String>,

    /// Seconds the line must stay down [default: 5]
    #[arg(short, long)]
    time: Option<u32>,

    /// GPIO line number [default: 27]
    #[arg(short, long)]
    pin: Option<u32>,

    /// TOML file with any of: command, time, pin, tick_ms, sysfs_root
    #[arg(long)]
    config: Option<PathBuf>,

    /// Root of the sysfs GPIO tree [default: /sys/class/gpio]
    #[arg(long)]
    sysfs_root: Option<PathBuf>,

    /// Length of one tick in milliseconds
    #[arg(long, hide = true)]
    tick_ms: Option<u64>,

    /// Log debug output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let mut config = WatchConfig::load(cli.config.as_deref())?;
    config.apply(ConfigOverrides {
        command: cli.command,
        time: cli.time,
        pin: cli.pin,
        tick_ms: cli.tick_ms,
        sysfs_root: cli.sysfs_root,
    });
    config.validate()?;

    match run(&config).await? {
        RunOutcome::Triggered(output) => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(output.stdout.as_bytes())?;
            stdout.flush()?;
            if !output.stderr.is_empty() {
                eprint!("{}", output.stderr);
            }
            if !output.success() {
                warn!(status = ?output.status, "Command exited unsuccessfully");
            }
        }
        RunOutcome::Interrupted => {}
    }

    Ok(())
}
