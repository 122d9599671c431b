//! Extract lane occupancy from a frame sequence into an occupancy log.

use clap::*;
use occupancy::prelude::v1::{Result, *};

fn main() -> Result<()> {
    env_logger::init();

    let matches = app().get_matches();

    if let Some((summary, resumed_at)) = run(&matches)? {
        println!("Frames: {}", summary.frames_processed);
        if summary.frames_skipped > 0 {
            println!("Skipped: {}", summary.frames_skipped);
        }
        println!(
            "Log blocks: {} ({} new)",
            summary.log_blocks,
            summary.log_blocks - resumed_at
        );
        println!(
            "Execution Time: {:.2} seconds",
            summary.elapsed.as_secs_f32()
        );
    }

    Ok(())
}

fn app() -> Command<'static> {
    Command::new("occupancy-extract")
        .version(crate_version!())
        .about(crate_description!())
        .arg(
            Arg::new("input")
                .long("input")
                .short('i')
                .takes_value(true)
                .required_unless_present("print-config")
                .help("Frame directory, frame list (.txt/.lst) or single image"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .takes_value(true)
                .help("JSON run configuration"),
        )
        .arg(
            Arg::new("log")
                .long("log")
                .short('l')
                .takes_value(true)
                .default_value("occupancy.csv")
                .help("Occupancy log to append to"),
        )
        .arg(
            Arg::new("snapshots")
                .long("snapshots")
                .short('s')
                .takes_value(true)
                .help("Directory to write annotated frames into"),
        )
        .arg(
            Arg::new("mode")
                .long("mode")
                .short('m')
                .takes_value(true)
                .possible_values(ChannelMode::ALL.map(ChannelMode::as_str))
                .help("Channel selection mode"),
        )
        .arg(
            Arg::new("frame-cap")
                .long("frame-cap")
                .short('n')
                .takes_value(true)
                .help("Stop after this many frames"),
        )
        .arg(
            Arg::new("threads")
                .long("threads")
                .short('t')
                .takes_value(true)
                .help("Classification worker threads"),
        )
        .arg(
            Arg::new("skip-failed")
                .long("skip-failed")
                .help("Skip frames that fail classification instead of stopping"),
        )
        .arg(
            Arg::new("print")
                .long("print")
                .short('p')
                .help("Print every occupancy matrix"),
        )
        .arg(
            Arg::new("print-config")
                .long("print-config")
                .help("Print the effective configuration as JSON and exit"),
        )
}

/// Build the run configuration from the config file and flag overrides.
fn build_config(matches: &ArgMatches) -> Result<OccupancyConfig> {
    let mut config = match matches.value_of("config") {
        Some(path) => OccupancyConfig::from_json_file(path)?,
        None => OccupancyConfig::default(),
    };

    if let Some(mode) = matches.value_of("mode") {
        config.channel_mode = mode.parse()?;
    }

    if let Some(cap) = matches.value_of("frame-cap") {
        config.frame_cap = Some(cap.parse()?);
    }

    if let Some(threads) = matches.value_of("threads") {
        config.worker_threads = Some(threads.parse()?);
    }

    if matches.is_present("skip-failed") {
        config.cycle_policy = CyclePolicy::Skip;
    }

    Ok(config)
}

/// Run the frame loop as configured by `matches`.
///
/// Returns the run summary along with the number of blocks the log held before the run, or
/// `None` when only the configuration was printed.
fn run(matches: &ArgMatches) -> Result<Option<(RunSummary, usize)>> {
    let config = build_config(matches)?;

    if matches.is_present("print-config") {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(None);
    }

    config.validate()?;

    let input = matches
        .value_of("input")
        .ok_or_else(|| anyhow!("Please supply an input!"))?;
    let source = frame_loader::create_source(input)?;

    let log = OccupancyLog::open(matches.value_of("log").unwrap_or("occupancy.csv"))?;
    let resumed_at = log.len();

    let sink: Box<dyn FrameSink> = if let Some(dir) = matches.value_of("snapshots") {
        Box::new(frame_loader::SnapshotSink::new(dir, config.rois.clone())?)
    } else if matches.is_present("print") {
        Box::new(LogSink)
    } else {
        Box::new(NullSink)
    };

    let summary = FrameLoop::new(config, source, sink, log)?.run()?;

    Ok(Some((summary, resumed_at)))
}
