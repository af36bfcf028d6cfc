use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing::Level;

use unmute_kit::LoopbackEngine;
use unmute_kit::control::api::Controller;
use unmute_kit::host::{AudioHost, HostConfig, HostError, list_devices};

#[derive(Parser)]
#[command(name = "unmutectl", version, about = "Hear your microphone through your speakers")]
struct Cli {
    /// List audio devices and exit
    #[arg(short, long)]
    list_devices: bool,
    /// Capture device (case-insensitive name substring)
    #[arg(long)]
    input: Option<String>,
    /// Playback device (case-insensitive name substring)
    #[arg(long)]
    output: Option<String>,
    /// Capture device index among capture-capable devices
    #[arg(long)]
    input_index: Option<usize>,
    /// Playback device index among playback-capable devices
    #[arg(long)]
    output_index: Option<usize>,
    /// Sample rate in Hz
    #[arg(long)]
    sample_rate: Option<u32>,
    /// Frames per device callback
    #[arg(long)]
    block_size: Option<u32>,
    /// Open the output only (no microphone)
    #[arg(long)]
    no_input: bool,
    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn host_config(&self) -> HostConfig {
        HostConfig {
            input_name: self.input.clone(),
            output_name: self.output.clone(),
            input_index: self.input_index,
            output_index: self.output_index,
            sample_rate: self.sample_rate,
            block_size: self.block_size,
            input_enabled: !self.no_input,
        }
    }
}

fn print_devices() -> Result<(), HostError> {
    let list = list_devices()?;
    if list.is_empty() {
        println!("(no devices found)");
        return Ok(());
    }
    for d in list {
        let mut marks = String::new();
        if d.is_default_input {
            marks.push_str("*I");
        }
        if d.is_default_output {
            if !marks.is_empty() {
                marks.push(' ');
            }
            marks.push_str("*O");
        }
        if !marks.is_empty() {
            print!("[{marks}] ");
        }
        println!("{:>2}  {}", d.index, d.name);
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    unmute_kit::init_tracing(if cli.verbose { Level::DEBUG } else { Level::WARN });

    if cli.list_devices {
        if let Err(err) = print_devices() {
            eprintln!("unmutectl: {err}");
            process::exit(1);
        }
        return;
    }

    let engine = Arc::new(LoopbackEngine::new());
    let mut host = AudioHost::new(cli.host_config(), engine.clone());
    let device = match host.start() {
        Ok(device) => device,
        Err(err) => {
            eprintln!("unmutectl: {err}");
            process::exit(1);
        }
    };

    let mut controller = Controller::new(engine);
    let result = unmute_kit::control::ui::run(&mut controller, Some(device));
    host.stop();

    let stats = host.stats();
    if stats.overruns() > 0 || stats.underruns() > 0 {
        eprintln!(
            "unmutectl: {} capture overruns, {} playback underruns",
            stats.overruns(),
            stats.underruns()
        );
    }

    if let Err(err) = result {
        eprintln!("unmutectl: {err}");
        process::exit(1);
    }
}
