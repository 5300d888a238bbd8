//! pcpipe: streaming point-cloud pipelines
//!
//! Usage: pcpipe <COMMAND> [OPTIONS]

use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use pcpipe::bounds::Bounds;
use pcpipe::buffer::PointBuffer;
use pcpipe::config;
use pcpipe::drivers::{FauxMode, FauxReader, TextReader, TextWriter};
use pcpipe::error::Result;
use pcpipe::filters::{CropFilter, DecimationFilter};
use pcpipe::options::Options;
use pcpipe::stage::{PointSource, Stage, Writer};

#[derive(Parser)]
#[command(name = "pcpipe")]
#[command(version)]
#[command(about = "pcpipe: streaming point-cloud pipelines with bounded memory", long_about = None)]
struct Cli {
    /// Points pulled per read (default: 65536, or 4096 with --low-memory)
    #[arg(long, global = true)]
    chunk_size: Option<usize>,

    /// Use small chunks to reduce peak memory
    #[arg(long, global = true)]
    low_memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the schema, point count and extent of a text point file
    Info {
        /// Input X/Y/Z text file
        #[arg(short, long)]
        input: PathBuf,

        /// Print each dimension as a JSON diagnostic tree
        #[arg(long)]
        json: bool,

        /// Skip malformed lines instead of failing
        #[arg(long)]
        lenient: bool,
    },

    /// Keep only the points inside a bounding box
    Crop {
        /// Input X/Y/Z text file
        #[arg(short, long)]
        input: PathBuf,

        /// Box to keep, e.g. "([0, 10], [0, 10], [0, 5])"
        #[arg(short, long)]
        bounds: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip malformed lines instead of failing
        #[arg(long)]
        lenient: bool,

        /// Print run statistics to stderr
        #[arg(long)]
        stats: bool,
    },

    /// Keep every n-th point
    Decimate {
        /// Input X/Y/Z text file
        #[arg(short, long)]
        input: PathBuf,

        /// Keep one point out of this many
        #[arg(short, long, default_value = "1")]
        step: u64,

        /// Position of the first kept point
        #[arg(long, default_value = "0")]
        offset: u64,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print run statistics to stderr
        #[arg(long)]
        stats: bool,
    },

    /// Generate synthetic points
    Generate {
        /// Extent of the points, e.g. "([0, 100], [0, 100], [0, 10])"
        #[arg(short, long)]
        bounds: String,

        /// Number of points
        #[arg(short = 'n', long)]
        num_points: u64,

        /// Placement: constant, random or ramp
        #[arg(short, long, default_value = "random")]
        mode: FauxMode,

        /// Random seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print run statistics to stderr
        #[arg(long)]
        stats: bool,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let chunk_size = cli
        .chunk_size
        .unwrap_or_else(|| config::chunk_size(cli.low_memory));

    let result = match cli.command {
        Commands::Info {
            input,
            json,
            lenient,
        } => run_info(input, json, lenient, chunk_size),

        Commands::Crop {
            input,
            bounds,
            output,
            lenient,
            stats,
        } => run_crop(input, bounds, output, lenient, stats, chunk_size),

        Commands::Decimate {
            input,
            step,
            offset,
            output,
            stats,
        } => run_decimate(input, step, offset, output, stats, chunk_size),

        Commands::Generate {
            bounds,
            num_points,
            mode,
            seed,
            output,
            stats,
        } => run_generate(bounds, num_points, mode, seed, output, stats, chunk_size),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn text_reader(input: PathBuf, lenient: bool) -> TextReader {
    TextReader::new(
        Options::new()
            .with("filename", input.display())
            .with("lenient", lenient),
    )
}

fn open_output(output: Option<PathBuf>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) => Ok(Box::new(File::create(path)?)),
        None => Ok(Box::new(io::stdout().lock())),
    }
}

/// Drive `source` into a text sink and report statistics.
fn run_writer(
    label: &str,
    source: Box<dyn PointSource>,
    output: Option<PathBuf>,
    stats: bool,
    chunk_size: usize,
) -> Result<()> {
    let sink = TextWriter::new(open_output(output)?);
    let mut writer = Writer::new(source, sink, Options::new().with("chunk_size", chunk_size));
    let result = writer.write(None)?;
    writer.into_sink().into_inner()?.flush()?;

    if stats {
        eprintln!("{} stats: {}", label, result);
    }
    Ok(())
}

fn run_info(input: PathBuf, json: bool, lenient: bool, chunk_size: usize) -> Result<()> {
    let mut reader = text_reader(input, lenient);
    reader.initialize()?;

    let mut iter = reader.create_sequential_iterator()?;
    let mut buffer = PointBuffer::new(reader.schema(), chunk_size.max(1))?;
    let mut extent = Bounds::empty();
    let mut count: u64 = 0;
    loop {
        let n = iter.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        count += n as u64;
        if let Some(chunk) = buffer.calculate_bounds()? {
            let mins: Vec<f64> = chunk.ranges().iter().map(|r| r.min).collect();
            let maxs: Vec<f64> = chunk.ranges().iter().map(|r| r.max).collect();
            extent.grow(&mins);
            extent.grow(&maxs);
        }
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "Points: {}", count)?;
    writeln!(out, "Bounds: {}", extent)?;
    writeln!(out, "Record size: {} bytes", reader.schema().record_size())?;
    writeln!(out, "Dimensions:")?;
    for dim in reader.schema().dimensions() {
        if json {
            writeln!(out, "{}", dim.to_json()?)?;
        } else {
            writeln!(out, "  {}", dim)?;
        }
    }
    Ok(())
}

fn run_crop(
    input: PathBuf,
    bounds: String,
    output: Option<PathBuf>,
    lenient: bool,
    stats: bool,
    chunk_size: usize,
) -> Result<()> {
    let reader = text_reader(input, lenient);
    let crop = CropFilter::new(Box::new(reader), Options::new().with("bounds", bounds));
    run_writer("Crop", Box::new(crop), output, stats, chunk_size)
}

fn run_decimate(
    input: PathBuf,
    step: u64,
    offset: u64,
    output: Option<PathBuf>,
    stats: bool,
    chunk_size: usize,
) -> Result<()> {
    let reader = text_reader(input, false);
    let decimate = DecimationFilter::new(
        Box::new(reader),
        Options::new().with("step", step).with("offset", offset),
    );
    run_writer("Decimate", Box::new(decimate), output, stats, chunk_size)
}

fn run_generate(
    bounds: String,
    num_points: u64,
    mode: FauxMode,
    seed: u64,
    output: Option<PathBuf>,
    stats: bool,
    chunk_size: usize,
) -> Result<()> {
    let reader = FauxReader::new(
        Options::new()
            .with("bounds", bounds)
            .with("num_points", num_points)
            .with("mode", mode)
            .with("seed", seed),
    );
    run_writer("Generate", Box::new(reader), output, stats, chunk_size)
}
