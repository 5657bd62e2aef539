use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use ekg_lib::{
    config::{BaselineMode, EmgSetting, EngineConfig, NotchSetting},
    error::is_valid_sampling_rate,
    io::{read_csv_leads, text as text_io},
    pipeline::{EcgPipeline, LeadState, WindowAnalysis},
    signal::{LeadBuffer, TimeSeries},
    BeatDetector, SignalConditioner,
};
use log::info;
use serde::Serialize;
use std::{
    io::{self, Read},
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(
    name = "ekg",
    version,
    about = "EKG: real-time ECG conditioning, measurement and rhythm tools"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Engine configuration: a TOML file plus per-option overrides.
#[derive(Args, Clone, Debug, Default)]
struct EngineArgs {
    /// TOML engine configuration
    #[arg(long)]
    config: Option<PathBuf>,
    /// Mains notch: 50, 60 or off
    #[arg(long)]
    notch: Option<String>,
    /// EMG low-pass cutoff in Hz (clamped to 35-40) or off
    #[arg(long)]
    emg: Option<String>,
    /// Baseline mode: median_mean, respiration_preserving or off
    #[arg(long)]
    baseline: Option<String>,
    /// Enable QRS-gated sharpening
    #[arg(long)]
    sharpen: bool,
}

impl EngineArgs {
    fn resolve(&self) -> Result<EngineConfig> {
        let mut cfg = match &self.config {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::default(),
        };
        if let Some(notch) = &self.notch {
            cfg.conditioner.notch_freq = notch.parse::<NotchSetting>()?;
        }
        if let Some(emg) = &self.emg {
            cfg.conditioner.emg_cutoff_hz = emg.parse::<EmgSetting>()?;
        }
        if let Some(baseline) = &self.baseline {
            cfg.conditioner.baseline_mode = baseline.parse::<BaselineMode>()?;
        }
        if self.sharpen {
            cfg.conditioner.enable_qrs_sharpening = true;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the conditioned waveform of newline-delimited samples (stdin or --input)
    Condition {
        #[arg(long, default_value_t = 250.0)]
        fs: f64,
        #[arg(long)]
        input: Option<PathBuf>,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Condition samples and print the detected R peaks as JSON
    DetectRPeaks {
        #[arg(long, default_value_t = 250.0)]
        fs: f64,
        #[arg(long)]
        input: Option<PathBuf>,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Run the full pipeline over sliding windows, one JSON line per window and lead
    Analyze {
        /// Sampling rate; required for text input, inferred from a time column for CSV
        #[arg(long)]
        fs: Option<f64>,
        #[arg(long, conflicts_with = "csv")]
        input: Option<PathBuf>,
        #[arg(long)]
        csv: Option<PathBuf>,
        /// CSV column of the primary lead
        #[arg(long, default_value = "II")]
        lead: String,
        /// CSV column of an orthogonal lead, enables the QRS axis
        #[arg(long, requires = "csv")]
        second_lead: Option<String>,
        #[arg(long, default_value_t = 10.0)]
        window_s: f64,
        #[arg(long, default_value_t = 2.0)]
        step_s: f64,
        /// Include the conditioned waveform in each record
        #[arg(long)]
        waveform: bool,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Validate a TOML configuration and print it fully resolved
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Condition { fs, input, engine } => {
            cmd_condition(fs, input.as_deref(), &engine)?
        }
        Commands::DetectRPeaks { fs, input, engine } => {
            cmd_detect_r_peaks(fs, input.as_deref(), &engine)?
        }
        Commands::Analyze {
            fs,
            input,
            csv,
            lead,
            second_lead,
            window_s,
            step_s,
            waveform,
            engine,
        } => cmd_analyze(AnalyzeArgs {
            fs,
            input: input.as_deref(),
            csv: csv.as_deref(),
            lead: &lead,
            second_lead: second_lead.as_deref(),
            window_s,
            step_s,
            waveform,
            engine: &engine,
        })?,
        Commands::CheckConfig { config } => cmd_check_config(&config)?,
    }
    Ok(())
}

/// Longest analysis window `analyze` will buffer.
const MAX_WINDOW_S: f64 = 600.0;

fn read_samples(input: Option<&Path>, fs: f64) -> Result<TimeSeries> {
    let ts = match input {
        Some(path) => text_io::read_samples(path, fs)?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            text_io::parse_samples(&buf, fs).context("parsing stdin")?
        }
    };
    Ok(ts)
}

fn cmd_condition(fs: f64, input: Option<&Path>, engine: &EngineArgs) -> Result<()> {
    let cfg = engine.resolve()?;
    let ts = read_samples(input, fs)?;
    let mut conditioner = SignalConditioner::new(cfg.conditioner);
    for sample in conditioner.condition(&ts) {
        println!("{}", sample);
    }
    Ok(())
}

fn cmd_detect_r_peaks(fs: f64, input: Option<&Path>, engine: &EngineArgs) -> Result<()> {
    let cfg = engine.resolve()?;
    let ts = read_samples(input, fs)?;
    let conditioned = SignalConditioner::new(cfg.conditioner).condition(&ts);
    let detector = BeatDetector::new(cfg.detector);
    let mut history = detector.new_history();
    let peaks = detector.detect_r_peaks(&conditioned, fs, &mut history);
    println!("{}", serde_json::to_string(&peaks)?);
    Ok(())
}

fn cmd_check_config(path: &Path) -> Result<()> {
    let cfg = EngineConfig::load(path)?;
    println!("{}", serde_json::to_string_pretty(&cfg)?);
    Ok(())
}

struct AnalyzeArgs<'a> {
    fs: Option<f64>,
    input: Option<&'a Path>,
    csv: Option<&'a Path>,
    lead: &'a str,
    second_lead: Option<&'a str>,
    window_s: f64,
    step_s: f64,
    waveform: bool,
    engine: &'a EngineArgs,
}

/// One line of `analyze` output.
#[derive(Serialize)]
struct WindowReport<'a> {
    lead: &'a str,
    window: usize,
    start_sample: u64,
    end_sample: u64,
    #[serde(flatten)]
    analysis: &'a WindowAnalysis,
}

/// Per-lead driving state: the sample ring and the pipeline's rolling history.
struct LeadChannel {
    name: String,
    buffer: LeadBuffer,
    state: LeadState,
}

fn cmd_analyze(args: AnalyzeArgs<'_>) -> Result<()> {
    let cfg = args.engine.resolve()?;
    let mut pipeline = EcgPipeline::new(cfg)?;

    let (primary, second) = match args.csv {
        Some(path) => {
            let leads = read_csv_leads(path, args.lead, args.second_lead, args.fs)?;
            (leads.primary, leads.second)
        }
        None => {
            let fs = args
                .fs
                .context("--fs is required for newline-delimited input")?;
            (read_samples(args.input, fs)?, None)
        }
    };
    let fs = primary.fs;
    if !is_valid_sampling_rate(fs) {
        bail!("sampling rate {} Hz is outside (0, 10000]", fs);
    }
    if !(args.window_s > 0.0 && args.step_s > 0.0) {
        bail!("--window-s and --step-s must be positive");
    }
    if args.window_s > MAX_WINDOW_S {
        bail!("--window-s must be at most {} s", MAX_WINDOW_S);
    }
    let new_buffer = || LeadBuffer::with_duration(fs, args.window_s);
    let window_len = new_buffer().capacity();
    let step_len = ((args.step_s * fs).round() as usize).max(1);
    info!(
        "analyzing {} samples at {} Hz, window {} step {}",
        primary.len(),
        fs,
        window_len,
        step_len
    );

    let mut channels = vec![LeadChannel {
        name: args.lead.to_string(),
        buffer: new_buffer(),
        state: pipeline.new_lead_state(),
    }];
    if let (Some(name), Some(_)) = (args.second_lead, &second) {
        channels.push(LeadChannel {
            name: name.to_string(),
            buffer: new_buffer(),
            state: pipeline.new_lead_state(),
        });
    }

    let total = primary.len();
    let mut window_index = 0usize;
    let mut emitted = false;
    for i in 0..total {
        channels[0].buffer.push(primary.data[i]);
        if let (Some(lead2), Some(channel)) = (&second, channels.get_mut(1)) {
            channel.buffer.push(lead2.data[i]);
        }
        let pushed = i + 1;
        let full = pushed >= window_len && (pushed - window_len) % step_len == 0;
        let tail = pushed == total && !emitted;
        if full || tail {
            let len = channels[0].buffer.len();
            emit_window(&mut pipeline, &mut channels, len, window_index, args.waveform)?;
            window_index += 1;
            emitted = true;
        }
    }
    Ok(())
}

fn emit_window(
    pipeline: &mut EcgPipeline,
    channels: &mut [LeadChannel],
    len: usize,
    window_index: usize,
    waveform: bool,
) -> Result<()> {
    let windows: Vec<TimeSeries> = channels
        .iter()
        .map(|ch| ch.buffer.window(len).context("lead buffer shorter than window"))
        .collect::<Result<_>>()?;
    for (idx, channel) in channels.iter_mut().enumerate() {
        // The primary lead pairs with the second for the axis.
        let partner = if idx == 0 { windows.get(1) } else { None };
        let mut analysis = pipeline.process(&windows[idx], partner, &mut channel.state)?;
        if !waveform {
            analysis.conditioned.clear();
            analysis.respiration = None;
            analysis.median_beat = None;
        }
        let end_sample = channel.buffer.total_pushed();
        let report = WindowReport {
            lead: &channel.name,
            window: window_index,
            start_sample: end_sample - len as u64,
            end_sample,
            analysis: &analysis,
        };
        println!("{}", serde_json::to_string(&report)?);
    }
    Ok(())
}
