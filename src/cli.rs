use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "padcafe", about = "Pressure-grid pattern step sequencer")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List available MIDI devices
    #[command(subcommand)]
    Enumerate(EnumerateTarget),
    /// Run the sequencer with the terminal grid (and optional hardware pads)
    Run(RunArgs),
}

#[derive(Subcommand)]
pub enum EnumerateTarget {
    /// List available MIDI input and output devices
    Midi,
}

#[derive(clap::Args)]
pub struct RunArgs {
    /// Optional session file (.toml) with patterns, scale and timing
    pub session: Option<String>,

    /// MIDI pad controller name filter (input + LED output)
    #[arg(long)]
    pub grid_device: Option<String>,

    /// MIDI output device name filter for notes (default: none, log only)
    #[arg(long)]
    pub midi_out: Option<String>,

    /// Tempo in BPM (overrides the session file)
    #[arg(long)]
    pub tempo: Option<f64>,

    /// Note scheduling lead time in seconds (overrides the session file)
    #[arg(long)]
    pub latency: Option<f64>,

    /// Start in toggle mode: a press latches until the next press
    #[arg(long)]
    pub toggle: bool,
}
