//! Integration tests for the STM32WL LoRa receiver firmware.
//!
//! Run after flashing the firmware. Attaches to the board's diagnostic UART,
//! records a few listen windows and checks the output against its rules.

mod device;
mod transcript;

use std::time::Duration;

use clap::Parser;
use colored::Colorize;

use device::{resolve_port, DeviceClient};
use tests::{print_results, run_all_tests, Expectations};
use transcript::Transcript;

#[derive(Parser)]
#[command(name = "integration-tests")]
#[command(about = "Integration tests for the STM32WL LoRa receiver firmware")]
struct Args {
    /// Serial port for the device (use "auto" to auto-detect)
    #[arg(short, long, default_value = "auto")]
    port: String,

    /// Baud rate
    #[arg(short, long, default_value = "115200")]
    baud: u32,

    /// Listen windows to observe
    #[arg(short, long, default_value = "2")]
    windows: usize,

    /// Length of one listen window in seconds (SF12 at 10.4kHz is ~39.3s)
    #[arg(long, default_value = "40")]
    window_secs: u64,

    /// Expect the boot output; reset the board once connected
    #[arg(long)]
    boot: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Resolve port (auto-detect if "auto")
    let port = resolve_port(&args.port)?;

    println!("{}", "STM32WL LoRa Receiver Integration Tests".bold());
    println!("Port: {}", port);
    println!("Baud: {}", args.baud);
    println!();

    println!("Connecting to device...");
    let mut device = DeviceClient::new(&port, args.baud)?;
    device.clear_buffer()?;
    println!("{}", "Connected!".green());

    if args.boot {
        println!("{}", "Press the board's reset button now".yellow());
    }

    // One extra window so the last counted one has completed
    let duration = Duration::from_secs(args.window_secs * (args.windows as u64 + 1));
    println!("\nCapturing for {}s...\n", duration.as_secs());
    let lines = device.capture(duration, |line| println!("  {}", line.dimmed()))?;

    let transcript = Transcript::new(&lines);

    println!("\nRunning tests...\n");

    let expect = Expectations {
        boot: args.boot,
        windows: args.windows,
    };
    let results = run_all_tests(&transcript, &expect);
    print_results(&results);

    // Exit with error code if any tests failed
    let failed = results.iter().filter(|r| !r.passed).count();
    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}
