mod keymap;
mod layout;
mod script;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use fugit::MicrosDurationU32;
use keypad_matrix::sim::SimMatrix;
use keypad_matrix::{layouts, Config, Event, EventStream, ScanEngine, Topology};
use log::{info, warn};
use std::fs;

use crate::keymap::{parse_keymap, Keymap};
use crate::script::parse_script;

#[derive(Parser)]
#[command(name = "keypad-cli")]
#[command(about = "Keypad matrix layout checker and scan simulator")]
struct Cli {
    /// Log more (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Source {
    /// Keymap file describing lines, polarity and symbols
    #[arg(long, conflicts_with = "preset")]
    keymap: Option<String>,
    /// Built-in layout: letter-game or diode-test
    #[arg(long)]
    preset: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a keymap file and summarise it
    Check {
        /// Path to the keymap file
        keymap: String,
    },
    /// Render a keymap as an HTML/SVG page
    Layout {
        #[command(flatten)]
        source: Source,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Run the scanner against a simulated matrix driven by a press script
    Replay {
        /// Press script: `<row> <col> <from_ms> [<until_ms>]` or `stuck <col> <from_ms>`
        #[arg(long)]
        script: String,
        #[command(flatten)]
        source: Source,
        /// Pause between sweeps
        #[arg(long, default_value_t = 20)]
        interval_ms: u32,
        /// Simulated run time (default: one second past the last scripted change)
        #[arg(long)]
        duration_ms: Option<u32>,
        /// Wait after asserting a row before sampling its columns (default 800)
        #[arg(long)]
        settle_us: Option<u32>,
        /// Wait before re-sampling a column that reads pressed (default 20)
        #[arg(long)]
        debounce_ms: Option<u32>,
        /// Give up waiting for a held key's release after this long (default 2000)
        #[arg(long)]
        release_timeout_ms: Option<u32>,
        /// Hold back a re-press of the same key within this window
        #[arg(long)]
        repeat_guard_ms: Option<u32>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Command::Check { keymap } => {
            let contents =
                fs::read_to_string(&keymap).with_context(|| format!("reading {}", keymap))?;
            let keymap = parse_keymap(&contents).context("parsing keymap file")?;
            check(&keymap)?;
        }
        Command::Layout { source, output } => {
            let (name, keymap) = load(&source)?;
            let table = keymap.table();
            let rows = table.rows();
            let topology = Topology::new(keymap.layout(&rows)).context("invalid keymap")?;
            let html = layout::generate_html(&name, &topology);
            match output {
                Some(path) => {
                    fs::write(&path, html).with_context(|| format!("writing {}", path))?;
                    info!("wrote {}", path);
                }
                None => print!("{}", html),
            }
        }
        Command::Replay {
            script,
            source,
            interval_ms,
            duration_ms,
            settle_us,
            debounce_ms,
            release_timeout_ms,
            repeat_guard_ms,
        } => {
            let mut builder = Config::builder();
            if let Some(us) = settle_us {
                builder = builder.settle(MicrosDurationU32::micros(us));
            }
            if let Some(ms) = debounce_ms {
                builder = builder.debounce(MicrosDurationU32::millis(ms));
            }
            if let Some(ms) = release_timeout_ms {
                builder = builder.release_timeout(MicrosDurationU32::millis(ms));
            }
            if let Some(ms) = repeat_guard_ms {
                builder = builder.repeat_guard(MicrosDurationU32::millis(ms));
            }
            let config = builder.build().context("invalid timing")?;

            let contents =
                fs::read_to_string(&script).with_context(|| format!("reading {}", script))?;
            let script = parse_script(&contents).context("parsing press script")?;

            let (_, keymap) = load(&source)?;
            let table = keymap.table();
            let rows = table.rows();
            let topology = Topology::new(keymap.layout(&rows)).context("invalid keymap")?;

            let sim = SimMatrix::new(&topology);
            script.apply(&topology, &sim)?;
            let end = match duration_ms {
                Some(ms) => u64::from(ms) * 1000,
                None => script.last_change().ticks() + 1_000_000,
            };

            let engine = ScanEngine::new(topology, sim.driver(), sim.delay(), sim.clock(), config)?;
            let mut stream = EventStream::new(engine);
            let mut keys = 0;
            while sim.now().ticks() < end {
                match stream.next_event()? {
                    Event::Idle => {}
                    Event::Key(press) => {
                        keys += 1;
                        println!(
                            "{:>10.3} ms  key {:<4} {}",
                            press.confirmed_at.ticks() as f64 / 1000.0,
                            press.symbol.as_str(),
                            press.coord
                        );
                    }
                    Event::Stuck(coord) => {
                        let at = stream
                            .engine()
                            .last_release()
                            .map_or(sim.now(), |release| release.at());
                        println!(
                            "{:>10.3} ms  stuck     {}",
                            at.ticks() as f64 / 1000.0,
                            coord
                        );
                    }
                }
                stream
                    .engine_mut()
                    .pause(MicrosDurationU32::millis(interval_ms));
            }
            println!("{} keys in {} ms", keys, end / 1000);
        }
    }

    Ok(())
}

/// Keymap named by `--keymap` or `--preset`, with a display name.
fn load(source: &Source) -> Result<(String, Keymap)> {
    match (&source.keymap, &source.preset) {
        (Some(path), _) => {
            let contents =
                fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
            let keymap = parse_keymap(&contents).context("parsing keymap file")?;
            Ok((path.clone(), keymap))
        }
        (None, Some(name)) => match layouts::preset(name) {
            Some(layout) => Ok((name.clone(), Keymap::from_layout(&layout))),
            None => {
                let known: Vec<&str> = layouts::PRESETS.iter().map(|(name, _)| *name).collect();
                bail!("unknown preset `{}` (known: {})", name, known.join(", "));
            }
        },
        (None, None) => bail!("pass --keymap FILE or --preset NAME"),
    }
}

fn check(keymap: &Keymap) -> Result<()> {
    let table = keymap.table();
    let rows = table.rows();
    let topology = Topology::new(keymap.layout(&rows)).context("invalid keymap")?;

    let mapped = topology.symbols().count();
    println!(
        "{}x{} matrix, {:?}, {} keys, {} empty positions",
        topology.rows().len(),
        topology.columns().len(),
        topology.polarity(),
        mapped,
        topology.len() - mapped
    );

    let duplicates = keymap.duplicate_symbols();
    if !duplicates.is_empty() {
        warn!(
            "symbols on more than one key: {} (lookups use the first in scan order)",
            duplicates.join(" ")
        );
    }

    let worst = Config::default().worst_case_sweep(topology.rows().len(), topology.columns().len());
    println!(
        "Sweep takes at most {:.1} ms with default timings",
        worst.to_micros() as f64 / 1000.0
    );
    Ok(())
}
