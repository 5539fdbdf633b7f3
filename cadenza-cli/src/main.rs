//! Cadenza CLI - decode FLAC streams into RIFF/WAVE files.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

use anyhow::{bail, Context};
use cadenza_flac::{DecoderState, FlacDecoder, StreamInfo};
use cadenza_wave::{WaveEncoder, WaveStreamInfo};
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

/// Output mode for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    /// Normal output with progress bar.
    Normal,
    /// JSON output for programmatic parsing.
    Json,
    /// Quiet mode with minimal output.
    Quiet,
    /// Verbose mode with per-block detail.
    Verbose,
}

/// Command-line arguments for the cadenza tool.
#[derive(Parser, Debug)]
#[command(name = "cadenza")]
#[command(version)]
#[command(about = "Decode FLAC audio into RIFF/WAVE files")]
#[command(long_about = "Cadenza decodes a FLAC bitstream and writes the audio \n\
    as uncompressed PCM in a RIFF/WAVE container.\n\n\
    EXAMPLES:\n    \
    cadenza input.flac output.wav\n    \
    cadenza input.flac output.wav --json\n    \
    cadenza input.flac output.wav --buffer-capacity 16384")]
struct Args {
    /// Input FLAC file
    input: PathBuf,

    /// Output WAVE file
    output: PathBuf,

    /// Decoder buffer capacity in samples per channel
    #[arg(long, default_value = "8192")]
    buffer_capacity: usize,

    /// Overwrite the output file if it exists
    #[arg(short = 'y', long)]
    overwrite: bool,

    /// Disable the progress bar
    #[arg(long)]
    no_progress: bool,

    /// Verbose output (log each metadata block and decode stats)
    #[arg(short, long, conflicts_with = "quiet", conflicts_with = "json")]
    verbose: bool,

    /// Quiet mode (only print the output path on success)
    #[arg(short, long, conflicts_with = "verbose", conflicts_with = "json")]
    quiet: bool,

    /// JSON summary output for programmatic parsing
    #[arg(long, conflicts_with = "verbose", conflicts_with = "quiet")]
    json: bool,
}

impl Args {
    /// Determine the output mode based on flags.
    fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else if self.quiet {
            OutputMode::Quiet
        } else if self.verbose {
            OutputMode::Verbose
        } else {
            OutputMode::Normal
        }
    }
}

/// What a finished conversion looked like.
struct ConversionSummary {
    stream_info: StreamInfo,
    samples: u64,
    frames: u64,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mode = args.output_mode();

    // Initialize logging (not in JSON or quiet mode)
    if mode != OutputMode::Json && mode != OutputMode::Quiet {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(if args.verbose {
                tracing::Level::DEBUG
            } else {
                tracing::Level::INFO
            })
            .with_target(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    match convert(&args, mode) {
        Ok(summary) => {
            report_success(&args, mode, &summary);
            Ok(())
        }
        Err(err) => {
            if mode == OutputMode::Json {
                let output = serde_json::json!({
                    "type": "error",
                    "message": err.to_string(),
                });
                println!("{}", output);
            } else {
                eprintln!("{} {:#}", style("error:").red().bold(), err);
            }
            std::process::exit(1);
        }
    }
}

fn convert(args: &Args, mode: OutputMode) -> anyhow::Result<ConversionSummary> {
    if args.output.exists() && !args.overwrite {
        bail!(
            "output file {} exists; pass -y to overwrite",
            args.output.display()
        );
    }

    let input = File::open(&args.input)
        .with_context(|| format!("cannot open {}", args.input.display()))?;
    let mut decoder = FlacDecoder::with_capacity(BufReader::new(input), args.buffer_capacity);

    decoder.decode_marker()?;
    while decoder.state() != DecoderState::HasMetadata {
        let block_type = decoder.decode_metadata()?;
        debug!("metadata block: {:?}", block_type);
    }

    let info = decoder.stream_info().clone();
    if info.sample_count == 0 {
        warn!("stream does not declare its length; WAVE chunk sizes will read zero");
    }
    if mode == OutputMode::Normal || mode == OutputMode::Verbose {
        print_stream_info(&info);
    }

    let output = File::create(&args.output)
        .with_context(|| format!("cannot create {}", args.output.display()))?;
    let mut encoder = WaveEncoder::new(BufWriter::new(output));
    encoder.write_header(&WaveStreamInfo {
        sample_rate: info.sample_rate,
        sample_bit_size: info.sample_bit_size,
        channel_count: info.channel_count,
        sample_count: info.sample_count,
    })?;

    let show_progress = !args.no_progress
        && info.sample_count > 0
        && (mode == OutputMode::Normal || mode == OutputMode::Verbose);
    let progress = if show_progress {
        let bar = ProgressBar::new(info.sample_count);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} samples ({eta})",
            )
            .unwrap()
            .progress_chars("#>-"),
        );
        bar
    } else {
        ProgressBar::hidden()
    };

    while decoder.state() != DecoderState::Complete {
        decoder.decode_audio()?;
        if decoder.state() == DecoderState::Complete {
            // End of stream; no frame was produced by this call.
            break;
        }
        if decoder.block_sample_rate() != info.sample_rate {
            bail!(
                "variable sample rate streams are not supported (frame at {} Hz, stream at {} Hz)",
                decoder.block_sample_rate(),
                info.sample_rate
            );
        }

        let block = decoder.block_data();
        for i in 0..usize::from(decoder.block_size()) {
            for channel in 0..usize::from(info.channel_count) {
                encoder.write_sample(block[channel][i] as i32)?;
            }
        }
        progress.inc(u64::from(decoder.block_size()));
    }
    progress.finish_and_clear();

    let samples = decoder.samples_decoded();
    if info.sample_count > 0 && samples != info.sample_count {
        warn!(
            "decoded {} samples per channel but the stream declared {}",
            samples, info.sample_count
        );
    }

    encoder.finish()?;

    Ok(ConversionSummary {
        stream_info: info,
        samples,
        frames: decoder.frames_decoded(),
    })
}

fn print_stream_info(info: &StreamInfo) {
    println!("{}", style("FLAC stream").cyan().bold());
    println!("  Sample rate:  {} Hz", style(info.sample_rate).white());
    println!("  Channels:     {}", style(info.channel_count).white());
    println!("  Bit depth:    {} bits", style(info.sample_bit_size).white());
    println!(
        "  Blocksize:    {}..{} samples",
        style(info.min_block_size).white(),
        style(info.max_block_size).white()
    );
    if info.sample_count > 0 {
        let seconds = info.sample_count as f64 / f64::from(info.sample_rate.max(1));
        println!(
            "  Length:       {} samples ({:.1}s)",
            style(info.sample_count).white(),
            seconds
        );
    } else {
        println!("  Length:       unknown");
    }
}

fn report_success(args: &Args, mode: OutputMode, summary: &ConversionSummary) {
    match mode {
        OutputMode::Json => {
            let output = serde_json::json!({
                "type": "complete",
                "output": args.output.display().to_string(),
                "sample_rate": summary.stream_info.sample_rate,
                "channels": summary.stream_info.channel_count,
                "bits_per_sample": summary.stream_info.sample_bit_size,
                "samples": summary.samples,
                "frames": summary.frames,
            });
            println!("{}", output);
        }
        OutputMode::Quiet => {
            println!("{}", args.output.display());
        }
        OutputMode::Normal | OutputMode::Verbose => {
            println!(
                "{} {} ({} samples in {} frames)",
                style("Wrote").green().bold(),
                args.output.display(),
                summary.samples,
                summary.frames
            );
        }
    }
}
