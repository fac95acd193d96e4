//! Random Cut Forest CLI
//!
//! The `rcf` binary wraps the engine for file and pipe workflows:
//! - Training a forest from a batch of points and saving it
//! - Batch scoring against a saved model
//! - Online score-then-update streaming with an adaptive threshold
//! - Shingling scalar series and inspecting saved models

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use rcf_common::config::ConfigResolution;
use rcf_common::{
    Config, ConfigPaths, ConfigResolver, ConfigSnapshot, Error, OutputFormat, Result,
    StructuredError,
};
use rcf_core::exit_codes::ExitCode;
use rcf_core::input::{self, InputPoint, PointReader};
use rcf_core::logging::{
    event_names, generate_run_id, get_host_id, init_logging, LogConfig, LogContext, LogFormat,
    LogLevel, Stage,
};
use rcf_core::{log_event, persist, shingle, Detection, RandomCutForest, StreamingDetector};
use serde::Serialize;

/// Random Cut Forest - streaming anomaly detection
#[derive(Parser)]
#[command(name = "rcf")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to config.toml (falls back to RCF_CONFIG, then the XDG config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log format on stderr (human, jsonl)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a forest from a batch of points and save it
    Train(TrainArgs),

    /// Score points against a saved model without updating it
    Score(ScoreArgs),

    /// Score-then-update each point and flag anomalies
    Stream(StreamArgs),

    /// Turn a scalar series into sliding-window vectors
    Shingle(ShingleArgs),

    /// Summarize a saved model
    Inspect(InspectArgs),

    /// Configuration commands
    Config(ConfigArgs),
}

/// Forest overrides shared by train and stream.
#[derive(Args, Debug, Default)]
struct ForestOpts {
    /// Number of trees
    #[arg(long)]
    trees: Option<usize>,

    /// Sample size per tree
    #[arg(long)]
    samples: Option<usize>,

    /// Master random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Build and score trees on one thread
    #[arg(long)]
    sequential: bool,
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Input file, or - for stdin
    #[arg(long, short = 'i')]
    input: String,

    /// Where to write the model
    #[arg(long, short = 'o')]
    output: PathBuf,

    /// Treat input as a scalar series and shingle it to this width
    #[arg(long)]
    shingle: Option<usize>,

    #[command(flatten)]
    forest: ForestOpts,
}

#[derive(Args, Debug)]
struct ScoreArgs {
    /// Saved model
    #[arg(long, short = 'm')]
    model: PathBuf,

    /// Input file, or - for stdin
    #[arg(long, short = 'i')]
    input: String,

    /// Treat input as a scalar series and shingle it to this width
    #[arg(long)]
    shingle: Option<usize>,
}

#[derive(Args, Debug)]
struct StreamArgs {
    /// Input file, or - for stdin
    #[arg(long, short = 'i', default_value = "-")]
    input: String,

    /// Continue from a saved model instead of an empty forest
    #[arg(long, short = 'm')]
    model: Option<PathBuf>,

    /// Save the updated model when the stream ends
    #[arg(long)]
    save: Option<PathBuf>,

    /// Point dimensionality for a fresh forest (default: first point's width)
    #[arg(long)]
    dimensions: Option<usize>,

    /// Threshold multiplier
    #[arg(long)]
    k: Option<f64>,

    /// Scores to observe before flagging anything
    #[arg(long)]
    min_observations: Option<usize>,

    /// Judge against only the most recent scores
    #[arg(long)]
    window: Option<usize>,

    /// Treat input as a scalar series and shingle it to this width
    #[arg(long)]
    shingle: Option<usize>,

    #[command(flatten)]
    forest: ForestOpts,
}

#[derive(Args, Debug)]
struct ShingleArgs {
    /// Input file, or - for stdin
    #[arg(long, short = 'i')]
    input: String,

    /// Window width
    #[arg(long, short = 'w')]
    window: usize,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Saved model
    #[arg(long, short = 'm')]
    model: PathBuf,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show the resolved configuration and where it came from
    Show,
}

fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::from_env(cli.global.log_level, cli.global.log_format);
    init_logging(&log_config);

    let ctx = LogContext::new(generate_run_id(), get_host_id());
    log_event!(
        ctx,
        DEBUG,
        event_names::RUN_STARTED,
        Stage::Init,
        "rcf started",
        version = env!("CARGO_PKG_VERSION")
    );

    let exit_code = match &cli.command {
        Commands::Train(args) => run_train(&cli.global, args, &ctx),
        Commands::Score(args) => run_score(&cli.global, args, &ctx),
        Commands::Stream(args) => run_stream(&cli.global, args, &ctx),
        Commands::Shingle(args) => run_shingle(&cli.global, args),
        Commands::Inspect(args) => run_inspect(&cli.global, args),
        Commands::Config(args) => match args.command {
            ConfigCommands::Show => run_config_show(&cli.global, &ctx),
        },
    };

    log_event!(
        ctx,
        DEBUG,
        event_names::RUN_FINISHED,
        Stage::Init,
        "rcf finished",
        exit_code = exit_code.as_i32() as i64
    );
    std::process::exit(exit_code.as_i32());
}

// ============================================================================
// Shared helpers
// ============================================================================

fn load_config(global: &GlobalOpts, ctx: &LogContext) -> Result<(Config, ConfigSnapshot)> {
    let resolver = ConfigResolver::new(ConfigPaths {
        config_path: global.config.clone(),
    });
    let (config, snapshot) = Config::load(&resolver)?;
    let path = snapshot.path.as_deref().unwrap_or("<defaults>");
    // Event targets must be static, so each outcome gets its own call.
    if snapshot.resolution == ConfigResolution::Default {
        log_event!(
            ctx,
            DEBUG,
            event_names::CONFIG_DEFAULT_USED,
            Stage::Init,
            "using built-in configuration",
            effective_hash = snapshot.effective_hash.as_str()
        );
    } else {
        log_event!(
            ctx,
            INFO,
            event_names::CONFIG_LOADED,
            Stage::Init,
            "configuration loaded",
            path = path,
            effective_hash = snapshot.effective_hash.as_str()
        );
    }
    Ok((config, snapshot))
}

fn apply_forest_opts(config: &mut Config, opts: &ForestOpts) {
    if let Some(trees) = opts.trees {
        config.forest.num_trees = trees;
    }
    if let Some(samples) = opts.samples {
        config.forest.samples_per_tree = samples;
    }
    if let Some(seed) = opts.seed {
        config.forest.seed = seed;
    }
    if opts.sequential {
        config.forest.parallel = false;
    }
}

fn open_input(path: &str) -> Result<Box<dyn BufRead>> {
    if path == "-" {
        Ok(Box::new(BufReader::new(std::io::stdin())))
    } else {
        let file = std::fs::File::open(path)?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Read a batch of points, shingling a scalar series when asked.
fn read_batch(path: &str, shingle_size: Option<usize>) -> Result<(Vec<usize>, Vec<Vec<f64>>)> {
    let points = input::read_points(open_input(path)?)?;
    match shingle_size {
        Some(size) => {
            let series = input::scalars(&points)?;
            let vectors = shingle(&series, size)?;
            // A window is attributed to the line of its newest value.
            let lines = points.iter().skip(size).map(|p| p.line).collect();
            Ok((lines, vectors))
        }
        None => Ok(points
            .into_iter()
            .map(|InputPoint { line, values }| (line, values))
            .unzip()),
    }
}

fn write_json<T: Serialize>(global: &GlobalOpts, value: &T) -> Result<()> {
    let mut out = std::io::stdout().lock();
    match global.format {
        OutputFormat::Jsonl => writeln!(out, "{}", serde_json::to_string(value)?)?,
        _ => writeln!(out, "{}", serde_json::to_string_pretty(value)?)?,
    }
    Ok(())
}

/// Emit a one-document report: JSON formats print `doc`, others print `line`.
fn emit_report<T: Serialize>(global: &GlobalOpts, doc: &T, line: &str) -> Result<()> {
    match global.format {
        OutputFormat::Json | OutputFormat::Jsonl => write_json(global, doc),
        OutputFormat::Summary | OutputFormat::Csv => {
            writeln!(std::io::stdout().lock(), "{}", line)?;
            Ok(())
        }
    }
}

/// Report an error on stderr and map it to an exit code.
fn fail(global: &GlobalOpts, err: &Error) -> ExitCode {
    match global.format {
        OutputFormat::Json | OutputFormat::Jsonl => {
            eprintln!("{}", StructuredError::from(err).to_json());
        }
        _ => {
            eprintln!("error: {}: {}", err.headline(), err);
        }
    }
    ExitCode::from(err)
}

fn finish(global: &GlobalOpts, result: Result<ExitCode>) -> ExitCode {
    result.unwrap_or_else(|err| fail(global, &err))
}

// ============================================================================
// train
// ============================================================================

#[derive(Serialize)]
struct TrainReport<'a> {
    command: &'static str,
    model: String,
    checksum: &'a str,
    points: usize,
    dimensions: usize,
    num_trees: usize,
    samples_per_tree: usize,
    seed: u64,
}

fn run_train(global: &GlobalOpts, args: &TrainArgs, ctx: &LogContext) -> ExitCode {
    finish(global, train(global, args, ctx))
}

fn train(global: &GlobalOpts, args: &TrainArgs, ctx: &LogContext) -> Result<ExitCode> {
    let (mut config, _) = load_config(global, ctx)?;
    apply_forest_opts(&mut config, &args.forest);

    let (_, points) = read_batch(&args.input, args.shingle)?;
    let first = points
        .first()
        .ok_or_else(|| Error::Configuration("no training points in input".to_string()))?;
    config.forest.dimensions = first.len();
    config.shingle.size = args.shingle;
    config.validate()?;

    let forest = RandomCutForest::train(config.forest.clone(), &points)?;
    let checksum = persist::save(&forest, &args.output)?;
    let ctx = ctx.clone().with_model_id(persist::model_id(&checksum));
    log_event!(
        ctx,
        INFO,
        event_names::TRAIN_FINISHED,
        Stage::Train,
        "model written",
        points = points.len() as u64
    );

    let report = TrainReport {
        command: "train",
        model: args.output.display().to_string(),
        checksum: &checksum,
        points: points.len(),
        dimensions: forest.dimensions(),
        num_trees: forest.num_trees(),
        samples_per_tree: forest.samples_per_tree(),
        seed: forest.config().seed,
    };
    let line = format!(
        "trained {} trees on {} points ({}-d) -> {}",
        report.num_trees, report.points, report.dimensions, report.model
    );
    emit_report(global, &report, &line)?;
    Ok(ExitCode::Clean)
}

// ============================================================================
// score
// ============================================================================

#[derive(Debug, Serialize)]
struct ScoreRecord {
    line: usize,
    score: f64,
}

#[derive(Serialize)]
struct RejectedPoint {
    line: usize,
    error: StructuredError,
}

fn run_score(global: &GlobalOpts, args: &ScoreArgs, ctx: &LogContext) -> ExitCode {
    finish(global, score(global, args, ctx))
}

fn score(global: &GlobalOpts, args: &ScoreArgs, ctx: &LogContext) -> Result<ExitCode> {
    let (forest, checksum) = persist::load_with_checksum(&args.model)?;
    let ctx = ctx.clone().with_model_id(persist::model_id(&checksum));
    let (lines, points) = read_batch(&args.input, args.shingle)?;

    log_event!(
        ctx,
        INFO,
        event_names::SCORE_STARTED,
        Stage::Score,
        "scoring batch",
        points = points.len() as u64
    );

    let mut records = Vec::with_capacity(points.len());
    let mut rejected = Vec::new();
    for (line, point) in lines.into_iter().zip(&points) {
        match forest.score(point) {
            Ok(score) => records.push(ScoreRecord { line, score }),
            Err(err) if err.is_point_rejection() => {
                log_event!(
                    ctx,
                    WARN,
                    event_names::SCORE_POINT_REJECTED,
                    Stage::Score,
                    "point rejected",
                    line = line as u64,
                    error = err.to_string()
                );
                rejected.push(RejectedPoint {
                    line,
                    error: StructuredError::from(&err),
                });
            }
            Err(err) => return Err(err),
        }
    }

    log_event!(
        ctx,
        INFO,
        event_names::SCORE_FINISHED,
        Stage::Score,
        "batch scored",
        scored = records.len() as u64,
        rejected = rejected.len() as u64
    );

    match global.format {
        OutputFormat::Jsonl => {
            let mut out = std::io::stdout().lock();
            for record in &records {
                writeln!(out, "{}", serde_json::to_string(record)?)?;
            }
        }
        OutputFormat::Csv => {
            let mut out = std::io::stdout().lock();
            writeln!(out, "line,score")?;
            for record in &records {
                writeln!(out, "{},{}", record.line, record.score)?;
            }
        }
        OutputFormat::Json => {
            let doc = serde_json::json!({
                "command": "score",
                "model": args.model.display().to_string(),
                "scores": records,
                "rejected": rejected,
            });
            write_json(global, &doc)?;
        }
        OutputFormat::Summary => {
            let top = records
                .iter()
                .max_by(|a, b| a.score.total_cmp(&b.score))
                .map(|r| format!(", max {:.4} at line {}", r.score, r.line))
                .unwrap_or_default();
            writeln!(
                std::io::stdout().lock(),
                "scored {} points ({} rejected){}",
                records.len(),
                rejected.len(),
                top
            )?;
        }
    }
    Ok(ExitCode::Clean)
}

// ============================================================================
// stream
// ============================================================================

#[derive(Serialize)]
struct StreamRecord {
    line: usize,
    #[serde(flatten)]
    detection: Detection,
}

#[derive(Serialize)]
struct StreamReport {
    command: &'static str,
    points: u64,
    anomalies: usize,
    rejected: Vec<RejectedPoint>,
    detections: Vec<StreamRecord>,
}

fn run_stream(global: &GlobalOpts, args: &StreamArgs, ctx: &LogContext) -> ExitCode {
    finish(global, stream(global, args, ctx))
}

fn stream(global: &GlobalOpts, args: &StreamArgs, ctx: &LogContext) -> Result<ExitCode> {
    let (mut config, _) = load_config(global, ctx)?;
    apply_forest_opts(&mut config, &args.forest);
    if let Some(k) = args.k {
        config.scorer.k = k;
    }
    if let Some(n) = args.min_observations {
        config.scorer.min_observations = Some(n);
    }
    if let Some(window) = args.window {
        config.scorer.window = Some(window);
    }
    if args.shingle.is_some() {
        config.shingle.size = args.shingle;
    }

    let mut reader = PointReader::new(open_input(&args.input)?).peekable();
    let mut ctx = ctx.clone();

    let forest = match &args.model {
        Some(path) => {
            let (forest, checksum) = persist::load_with_checksum(path)?;
            ctx = ctx.with_model_id(persist::model_id(&checksum));
            config.forest = forest.config().clone();
            forest
        }
        None => {
            config.forest.dimensions = match (config.shingle.size, args.dimensions) {
                (Some(size), _) => size,
                (None, Some(dims)) => dims,
                (None, None) => match reader.peek() {
                    Some(Ok(point)) => point.values.len(),
                    _ => config.forest.dimensions,
                },
            };
            RandomCutForest::new(config.forest.clone())?
        }
    };
    config.validate()?;
    let mut detector = StreamingDetector::with_forest(&config, forest)?;
    let shingled = config.shingle.size.is_some();

    let mut out = std::io::stdout().lock();
    if global.format == OutputFormat::Csv {
        writeln!(out, "line,index,score,threshold,anomalous,warm")?;
    }

    let mut anomalies = 0usize;
    let mut rejected = Vec::new();
    let mut detections = Vec::new();

    for item in reader {
        let (line, outcome) = match item {
            Ok(InputPoint { line, values }) => {
                let outcome = if shingled {
                    match values.as_slice() {
                        [x] => detector.push_scalar(*x),
                        other => Err(Error::InputParse {
                            line,
                            message: format!("expected one value per line, got {}", other.len()),
                        }),
                    }
                } else {
                    detector.push_point(&values).map(Some)
                };
                (line, outcome)
            }
            Err(Error::InputParse { line, message }) => {
                (line, Err(Error::InputParse { line, message }))
            }
            Err(err) => return Err(err),
        };

        let detection = match outcome {
            Ok(Some(detection)) => detection,
            Ok(None) => continue,
            Err(err) if err.category() == rcf_common::ErrorCategory::Input => {
                log_event!(
                    ctx,
                    WARN,
                    event_names::STREAM_POINT_REJECTED,
                    Stage::Stream,
                    "point rejected",
                    line = line as u64,
                    error = err.to_string()
                );
                rejected.push(RejectedPoint {
                    line,
                    error: StructuredError::from(&err),
                });
                continue;
            }
            Err(err) => return Err(err),
        };

        if detection.anomalous {
            anomalies += 1;
            log_event!(
                ctx,
                INFO,
                event_names::STREAM_ANOMALY,
                Stage::Stream,
                "anomaly detected",
                line = line as u64,
                score = detection.score,
                threshold = detection.threshold.unwrap_or(f64::NAN)
            );
        }

        let record = StreamRecord { line, detection };
        match global.format {
            OutputFormat::Jsonl => writeln!(out, "{}", serde_json::to_string(&record)?)?,
            OutputFormat::Csv => writeln!(
                out,
                "{},{},{},{},{},{}",
                record.line,
                detection.index,
                detection.score,
                detection.threshold.map(|t| t.to_string()).unwrap_or_default(),
                detection.anomalous,
                detection.warm
            )?,
            OutputFormat::Json => detections.push(record),
            OutputFormat::Summary => {}
        }
    }
    drop(out);

    if let Some(path) = &args.save {
        let checksum = persist::save(detector.forest(), path)?;
        ctx = ctx.with_model_id(persist::model_id(&checksum));
    }

    log_event!(
        ctx,
        INFO,
        event_names::STREAM_FINISHED,
        Stage::Stream,
        "stream finished",
        points = detector.position(),
        anomalies = anomalies as u64,
        rejected = rejected.len() as u64
    );

    match global.format {
        OutputFormat::Json => {
            let report = StreamReport {
                command: "stream",
                points: detector.position(),
                anomalies,
                rejected,
                detections,
            };
            write_json(global, &report)?;
        }
        OutputFormat::Summary => {
            writeln!(
                std::io::stdout().lock(),
                "streamed {} points: {} anomalies, {} rejected",
                detector.position(),
                anomalies,
                rejected.len()
            )?;
        }
        OutputFormat::Jsonl | OutputFormat::Csv => {}
    }

    Ok(if anomalies > 0 {
        ExitCode::AnomaliesFound
    } else {
        ExitCode::Clean
    })
}

// ============================================================================
// shingle
// ============================================================================

fn run_shingle(global: &GlobalOpts, args: &ShingleArgs) -> ExitCode {
    finish(global, shingle_cmd(global, args))
}

fn shingle_cmd(global: &GlobalOpts, args: &ShingleArgs) -> Result<ExitCode> {
    let points = input::read_points(open_input(&args.input)?)?;
    let series = input::scalars(&points)?;
    let vectors = shingle(&series, args.window)?;

    match global.format {
        OutputFormat::Json => {
            let doc = serde_json::json!({
                "command": "shingle",
                "window": args.window,
                "vectors": vectors,
            });
            write_json(global, &doc)?;
        }
        OutputFormat::Jsonl => {
            let mut out = std::io::stdout().lock();
            for vector in &vectors {
                writeln!(out, "{}", serde_json::to_string(vector)?)?;
            }
        }
        OutputFormat::Csv => {
            let mut out = std::io::stdout().lock();
            for vector in &vectors {
                let row: Vec<String> = vector.iter().map(f64::to_string).collect();
                writeln!(out, "{}", row.join(","))?;
            }
        }
        OutputFormat::Summary => {
            writeln!(
                std::io::stdout().lock(),
                "{} vectors of width {} from {} values",
                vectors.len(),
                args.window,
                series.len()
            )?;
        }
    }
    Ok(ExitCode::Clean)
}

// ============================================================================
// inspect
// ============================================================================

#[derive(Serialize)]
struct TreeSummary {
    index: usize,
    mass: usize,
    leaves: usize,
    nodes: usize,
    depth: usize,
    sampler_seen: u64,
}

#[derive(Serialize)]
struct InspectReport {
    command: &'static str,
    model: String,
    checksum: String,
    dimensions: usize,
    num_trees: usize,
    samples_per_tree: usize,
    seed: u64,
    parallel: bool,
    observed: u64,
    trees: Vec<TreeSummary>,
}

fn run_inspect(global: &GlobalOpts, args: &InspectArgs) -> ExitCode {
    finish(global, inspect(global, &args.model))
}

fn inspect(global: &GlobalOpts, path: &Path) -> Result<ExitCode> {
    let (forest, checksum) = persist::load_with_checksum(path)?;
    let trees: Vec<TreeSummary> = forest
        .trees()
        .iter()
        .zip(forest.samplers())
        .enumerate()
        .map(|(index, (tree, sampler))| TreeSummary {
            index,
            mass: tree.len(),
            leaves: tree.leaf_count(),
            nodes: tree.node_count(),
            depth: tree.depth(),
            sampler_seen: sampler.seen(),
        })
        .collect();

    let max_depth = trees.iter().map(|t| t.depth).max().unwrap_or(0);
    let line = format!(
        "{} trees x {} samples, {}-d, {} observed, max depth {}",
        forest.num_trees(),
        forest.samples_per_tree(),
        forest.dimensions(),
        forest.observed(),
        max_depth
    );
    let report = InspectReport {
        command: "inspect",
        model: path.display().to_string(),
        checksum,
        dimensions: forest.dimensions(),
        num_trees: forest.num_trees(),
        samples_per_tree: forest.samples_per_tree(),
        seed: forest.config().seed,
        parallel: forest.config().parallel,
        observed: forest.observed(),
        trees,
    };
    emit_report(global, &report, &line)?;
    Ok(ExitCode::Clean)
}

// ============================================================================
// config
// ============================================================================

fn run_config_show(global: &GlobalOpts, ctx: &LogContext) -> ExitCode {
    finish(global, config_show(global, ctx))
}

fn config_show(global: &GlobalOpts, ctx: &LogContext) -> Result<ExitCode> {
    let (config, snapshot) = load_config(global, ctx)?;
    let doc = serde_json::json!({
        "command": "config show",
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "source": &snapshot,
        "config": &config,
    });
    let line = format!(
        "config from {} ({:?}), {} trees x {} samples, k = {}",
        snapshot.path.as_deref().unwrap_or("built-in defaults"),
        snapshot.resolution,
        config.forest.num_trees,
        config.forest.samples_per_tree,
        config.scorer.k
    );
    emit_report(global, &doc, &line)?;
    Ok(ExitCode::Clean)
}
