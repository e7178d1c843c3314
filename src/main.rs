use std::{
    fs::File,
    io::{self, BufWriter, Cursor, Read, Write},
};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use lzwin::{BinTree, MatchFinder, MatchFinderConfig, MatchFinderKind, OutputWindow, WindowStream};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log window moves and normalization
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct FinderArgs {
    /// Match finder layout (bt2 or bt4)
    #[arg(long, default_value = "bt4")]
    kind: MatchFinderKind,
    /// Dictionary size in bytes
    #[arg(long, default_value_t = 1 << 22)]
    dict: u32,
    /// Longest match to search for (5-273)
    #[arg(long, default_value_t = 32)]
    fast_bytes: u32,
    /// Tree nodes visited per position (derived from fast bytes if unset)
    #[arg(long)]
    cut_value: Option<u32>,
}

impl FinderArgs {
    fn config(&self) -> MatchFinderConfig {
        MatchFinderConfig {
            kind: self.kind,
            history_size: self.dict,
            match_max_len: self.fast_bytes,
            cut_value: self.cut_value,
            ..MatchFinderConfig::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the match candidates found at every input position
    Matches {
        /// Input file path (use - for stdin)
        input: String,
        /// Output file path (use - for stdout)
        #[arg(default_value = "-")]
        output: String,
        #[command(flatten)]
        finder: FinderArgs,
    },
    /// Summarize what the match finder sees in an input
    Stats {
        /// Input file path (use - for stdin)
        input: String,
        #[command(flatten)]
        finder: FinderArgs,
    },
    /// Greedy-parse an input and rebuild it through an output window
    Replay {
        /// Input file path (use - for stdin)
        input: String,
        /// Output file path (use - for stdout)
        output: String,
        #[command(flatten)]
        finder: FinderArgs,
    },
}

// Helper to open input (file or stdin)
fn open_input(path: &str) -> Result<Box<dyn Read>> {
    if path == "-" {
        Ok(Box::new(io::stdin()))
    } else {
        let file = File::open(path).with_context(|| format!("Failed to open input file: {}", path))?;
        Ok(Box::new(file))
    }
}

// Helper to open output (file or stdout)
fn open_output(path: &str) -> Result<Box<dyn Write>> {
    if path == "-" {
        Ok(Box::new(BufWriter::new(io::stdout())))
    } else {
        let file = File::create(path).with_context(|| format!("Failed to create output file: {}", path))?;
        Ok(Box::new(BufWriter::new(file)))
    }
}

fn open_finder<R: Read>(source: R, path: &str, args: &FinderArgs) -> Result<BinTree<R>> {
    let mut finder = args.config().build().context("Invalid match finder settings")?;
    finder
        .init(source)
        .with_context(|| format!("Failed to read input: {}", path))?;
    Ok(finder)
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn list_matches(input: &str, output: &str, args: &FinderArgs) -> Result<()> {
    let mut finder = open_finder(open_input(input)?, input, args)?;
    let mut writer = open_output(output)?;
    let mut distances = vec![0u32; finder.distances_capacity()];
    let mut pos = 0u64;

    while finder.available_bytes() > 0 {
        let count = finder
            .get_matches(&mut distances)
            .with_context(|| format!("Match search failed at position {}", pos))?;
        if count > 0 {
            write!(writer, "{}:", pos)?;
            for pair in distances[..count].chunks_exact(2) {
                write!(writer, " ({},{})", pair[0], pair[1])?;
            }
            writeln!(writer)?;
        }
        pos += 1;
    }

    writer.flush()?;
    info!("Listed matches for {} positions.", pos);
    Ok(())
}

#[derive(Debug, Default)]
struct Stats {
    positions: u64,
    with_candidates: u64,
    candidates: u64,
    longest: u32,
    greedy_covered: u64,
}

fn collect_stats(input: &str, args: &FinderArgs) -> Result<Stats> {
    let mut finder = open_finder(open_input(input)?, input, args)?;
    let mut distances = vec![0u32; finder.distances_capacity()];
    let mut stats = Stats::default();
    let mut covered_until = 0u64;

    while finder.available_bytes() > 0 {
        let count = finder.get_matches(&mut distances)?;
        if count > 0 {
            let best = distances[count - 2];
            stats.with_candidates += 1;
            stats.candidates += count as u64 / 2;
            stats.longest = stats.longest.max(best);
            if stats.positions >= covered_until {
                stats.greedy_covered += best as u64;
                covered_until = stats.positions + best as u64;
            }
        }
        stats.positions += 1;
    }
    Ok(stats)
}

/// Longest candidate or a literal at every step, replayed into an output
/// window. Returns the rebuilt bytes and the (literal, match) counts.
fn greedy_replay(data: &[u8], args: &FinderArgs) -> Result<(Vec<u8>, u64, u64)> {
    let config = args.config();
    let mut finder = open_finder(Cursor::new(data), "replay buffer", args)?;
    let mut window = OutputWindow::new();
    window.create(config.history_size as usize)?;
    window.init(Vec::with_capacity(data.len()))?;

    let mut distances = vec![0u32; finder.distances_capacity()];
    let (mut literals, mut matches) = (0u64, 0u64);
    while finder.available_bytes() > 0 {
        let count = finder.get_matches(&mut distances)?;
        if count > 0 {
            let (len, distance) = (distances[count - 2], distances[count - 1]);
            window.copy_block(distance, len)?;
            finder.skip(len - 1)?;
            matches += 1;
        } else {
            window.write_byte(finder.index_byte(-1))?;
            literals += 1;
        }
    }

    let rebuilt = window.release_stream()?.unwrap_or_default();
    Ok((rebuilt, literals, matches))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Matches { input, output, finder } => {
            info!("Listing matches in {} using {}...", input, finder.kind);
            list_matches(&input, &output, &finder)
                .with_context(|| format!("Match listing failed for {}", input))?;
        }
        Commands::Stats { input, finder } => {
            let stats = collect_stats(&input, &finder)
                .with_context(|| format!("Match statistics failed for {}", input))?;
            let coverage = if stats.positions == 0 {
                0.0
            } else {
                stats.greedy_covered as f64 * 100.0 / stats.positions as f64
            };
            println!("positions:        {}", stats.positions);
            println!("with candidates:  {}", stats.with_candidates);
            println!("candidates:       {}", stats.candidates);
            println!("longest match:    {}", stats.longest);
            println!("greedy coverage:  {:.1}%", coverage);
        }
        Commands::Replay { input, output, finder } => {
            let mut data = Vec::new();
            open_input(&input)?
                .read_to_end(&mut data)
                .with_context(|| format!("Failed to read input: {}", input))?;
            info!("Replaying {} to {} using {}...", input, output, finder.kind);
            let (rebuilt, literals, matches) = greedy_replay(&data, &finder)
                .with_context(|| format!("Replay failed for {}", input))?;
            if rebuilt != data {
                bail!("Replay of {} diverged from the input", input);
            }
            let mut writer = open_output(&output)?;
            writer
                .write_all(&rebuilt)
                .and_then(|()| writer.flush())
                .with_context(|| format!("Failed to write output file: {}", output))?;
            info!(
                "Replay verified: {} bytes, {} literals, {} matches.",
                rebuilt.len(),
                literals,
                matches
            );
        }
    }

    Ok(())
}
