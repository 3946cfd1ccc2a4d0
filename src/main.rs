mod cli;
mod emit;
mod engine;
mod enumerate;
mod led;
mod midi;
mod pads;
mod pattern;
mod scale;
mod session;
mod tui;

use std::io::Write;
use std::time::{Duration, Instant, SystemTime};

use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};

use cli::{Cli, Command, EnumerateTarget, RunArgs};
use emit::NoteSink;
use pads::CellEvent;
use pattern::MAX_STEPS;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Enumerate(target) => {
            env_logger::init();
            match target {
                EnumerateTarget::Midi => enumerate::midi(),
            }
        }
        Command::Run(args) => run(args),
    }
}

/// Custom logger that writes to stderr with \r\n line endings for raw mode.
struct RawModeLogger;

impl log::Log for RawModeLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            let now = SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default();
            let secs = now.as_secs() % 86400; // time of day
            let h = secs / 3600;
            let m = (secs % 3600) / 60;
            let s = secs % 60;
            let ms = now.subsec_millis();
            let _ = write!(
                std::io::stderr(),
                "[{h:02}:{m:02}:{s:02}.{ms:03} {}] {}\r\n",
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static RAW_MODE_LOGGER: RawModeLogger = RawModeLogger;

/// Row patterns used when no session file is given, so a bare
/// `padcafe run` makes sound right away.
fn default_patterns() -> [pattern::Pattern; led::GRID_ROWS] {
    let rows: [(usize, [u8; MAX_STEPS]); led::GRID_ROWS] = [
        (8, [1, 0, 0, 0, 1, 0, 0, 0]),
        (8, [0, 0, 1, 0, 0, 0, 1, 0]),
        (4, [1, 0, 1, 1, 0, 0, 0, 0]),
        (3, [1, 0, 1, 0, 0, 0, 0, 0]),
        (6, [1, 1, 0, 1, 0, 1, 0, 0]),
        (1, [1, 0, 0, 0, 0, 0, 0, 0]),
    ];
    rows.map(|(length, mask)| pattern::Pattern::new(length, mask.map(|s| s != 0)))
}

fn run(args: RunArgs) -> anyhow::Result<()> {
    // Raw mode logger first so device-open messages render correctly.
    log::set_logger(&RAW_MODE_LOGGER).ok();
    log::set_max_level(
        std::env::var("RUST_LOG")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
    );

    let mut store = match args.session.as_deref() {
        Some(path) => session::load(path)?.to_store(),
        None => {
            let mut store = session::SessionConfig::default().to_store();
            store.patterns = default_patterns();
            store
        }
    };
    if let Some(tempo) = args.tempo {
        store.set_bpm(tempo);
    }
    if let Some(latency) = args.latency {
        store.latency = latency.max(0.0);
    }
    if args.toggle {
        store.toggle_mode = true;
    }

    let sink: Box<dyn NoteSink> = match args.midi_out.as_deref() {
        Some(filter) => Box::new(midi::MidiNoteSink::open(filter)?),
        None => {
            log::info!("No --midi-out given; notes go to the log");
            Box::new(midi::LogSink)
        }
    };
    let mut engine = engine::Engine::new(store, sink);

    // Hardware pads are optional; the terminal grid always works.
    let (pad_tx, pad_rx) = crossbeam_channel::bounded::<CellEvent>(256);
    let mut pad_grid = match args.grid_device.as_deref() {
        Some(filter) => Some(pads::PadGrid::open(filter, pad_tx)?),
        None => None,
    };

    crossterm::terminal::enable_raw_mode()?;
    let mut ui = tui::Ui::new()?;

    log::info!("Playing. q or Ctrl+C to quit.");

    let clock = Instant::now();
    let now_us = move || clock.elapsed().as_micros() as u64;
    let mut last_flush = Instant::now();

    loop {
        if event::poll(Duration::from_millis(10))? {
            match event::read()? {
                Event::Key(key) if key.kind != KeyEventKind::Release => {
                    if key.modifiers.contains(KeyModifiers::CONTROL)
                        && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('q'))
                    {
                        break;
                    }
                    if ui.handle_key(key, &mut engine, now_us()) {
                        break;
                    }
                }
                Event::Mouse(mouse) => ui.handle_mouse(mouse, &mut engine, now_us()),
                _ => {}
            }
        }

        // Drain hardware pad events before advancing time.
        while let Ok(cell_event) = pad_rx.try_recv() {
            match cell_event {
                CellEvent::Edge { row, col, value } => {
                    engine.on_cell_edge(now_us(), row, col, value)
                }
                CellEvent::Value { row, col, value } => engine.on_cell_value(row, col, value),
            }
        }

        engine.run_until(now_us());

        // ~30 Hz display flush; the engine only mutates logical LED state.
        if last_flush.elapsed() >= Duration::from_millis(33) {
            ui.draw(&engine)?;
            if let Some(grid) = pad_grid.as_mut() {
                grid.flush(engine.frame());
            }
            last_flush = Instant::now();
        }
    }

    log::info!("Stopping...");

    // Shutdown order matters: stop instances first (retracts all LEDs),
    // flush the now-dark frame to the pads, then restore the terminal.
    // Dropping the engine's sink releases any still-gated notes.
    engine.stop_all();
    if let Some(grid) = pad_grid.as_mut() {
        grid.flush(engine.frame());
    }
    drop(pad_grid);
    drop(ui);
    crossterm::terminal::disable_raw_mode()?;

    Ok(())
}
