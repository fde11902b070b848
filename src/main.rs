use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use linecount::detector::DetectionFilter;
use linecount::worker::JsonLinesSource;
use linecount::{Config, Error, Frame, FrameSource, LineCounter, SharedCounter, Worker};

/// Replays recorded detections through the line counter.
#[derive(Parser, Debug)]
#[command(name = "linecount", version)]
struct Args {
    /// YAML config; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Detections, one JSON frame per line
    #[arg(short, long)]
    input: PathBuf,

    /// Override the configured loop rate (0 = as fast as possible)
    #[arg(long)]
    fps: Option<f32>,

    /// Skip the detector-side class/confidence/size filter
    #[arg(long)]
    no_filter: bool,
}

/// Applies the detector-side filter to frames from the wrapped source.
struct Filtered<S> {
    inner: S,
    filter: Option<DetectionFilter>,
}

impl<S: FrameSource> FrameSource for Filtered<S> {
    fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        let mut frame = self.inner.next_frame()?;

        if let (Some(frame), Some(filter)) = (&mut frame, &self.filter) {
            filter.apply(frame);
        }

        Ok(frame)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("linecount=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(fps) = args.fps {
        config.worker.target_fps = fps;
    }

    let counter = SharedCounter::new(LineCounter::from_config(&config)?);

    let file = File::open(&args.input)
        .with_context(|| format!("opening detections {}", args.input.display()))?;
    let filter = (!args.no_filter)
        .then(|| {
            config
                .class_table()
                .map(|table| DetectionFilter::new(&config.detector, &table))
        })
        .transpose()?;
    let source = Filtered {
        inner: JsonLinesSource::new(BufReader::new(file)),
        filter,
    };

    let (tx, rx) = crossbeam_channel::unbounded();
    let worker = Worker::spawn(counter.clone(), source, config.worker, Some(tx));

    for event in rx.iter() {
        println!("{}", serde_json::to_string(&event)?);
    }

    let stats = worker.join()?;
    info!(frames = stats.frames, events = stats.events, "replay finished");

    println!("{}", serde_json::to_string_pretty(&counter.counts())?);

    Ok(())
}
