//! CLI front end for the morph engine.
//!
//! Morphs a main WAV toward a sidechain WAV through the streaming engine,
//! processing in host-style blocks. `--demo` generates the classic
//! 440 Hz / 554.37 Hz test tone pair instead of reading files. The blend
//! can be fixed (`-k`) or ramped linearly across the file (`--k-end`).

use clap::Parser;
use morph_dsp::{Algorithm, MorphEngine, MorphParams, StderrSink};
use shared_dsp::{RingBuffer, RunningMetrics};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "morph", about = "Spectral morphing of two audio streams")]
struct Cli {
    /// Main input WAV (omit with --demo)
    main_wav: Option<String>,

    /// Sidechain input WAV (omit with --demo)
    sidechain_wav: Option<String>,

    /// Output WAV
    #[arg(short, long, default_value = "morph_out.wav")]
    output: String,

    /// Blend factor (0 = main, 1 = sidechain)
    #[arg(short, long, default_value_t = 0.5)]
    k: f32,

    /// Ramp the blend linearly from -k to this value across the file
    #[arg(long)]
    k_end: Option<f32>,

    /// Algorithm: "cdf" or "reassignment"
    #[arg(long, default_value = "cdf")]
    algorithm: String,

    /// Analysis window in milliseconds
    #[arg(long, default_value_t = 100.0)]
    window_ms: f64,

    /// Hop divisor (4 = 75% overlap for the CDF variant)
    #[arg(long, default_value_t = 4)]
    hop_divisor: u32,

    /// FFT zero-padding multiplier
    #[arg(long, default_value_t = 2)]
    fft_multiplier: u32,

    /// Processing block size in samples
    #[arg(long, default_value_t = 512)]
    block_size: usize,

    /// Generate 440 Hz / 554.37 Hz demo tones instead of reading files
    #[arg(long)]
    demo: bool,

    /// Peak-normalize the output to 0.95
    #[arg(long)]
    normalize: bool,

    /// Also write the last N seconds of output to <output>.tail.wav
    #[arg(long)]
    capture_tail: Option<f64>,
}

fn main() {
    let cli = Cli::parse();

    let (mut main_audio, mut sidechain_audio, sample_rate) = if cli.demo {
        eprintln!("Demo mode: 440 Hz main, 554.37 Hz sidechain");
        let sr = 44100;
        (
            vec![test_tone(440.0, sr, 2.0)],
            vec![test_tone(554.37, sr, 2.0)],
            sr,
        )
    } else {
        let (Some(main_path), Some(side_path)) = (&cli.main_wav, &cli.sidechain_wav) else {
            eprintln!("Usage: morph <main.wav> <sidechain.wav> [-o out.wav] [-k 0.5]");
            eprintln!("       morph --demo [-o out.wav] [-k 0.5]");
            std::process::exit(1);
        };
        let (main_audio, main_sr) = read_wav(main_path);
        let (side_audio, side_sr) = read_wav(side_path);
        if side_sr != main_sr {
            eprintln!("Warning: sample rate mismatch ({main_sr} Hz vs {side_sr} Hz); using {main_sr} Hz");
        }
        (main_audio, side_audio, main_sr)
    };

    let algorithm = match cli.algorithm.as_str() {
        "cdf" => Algorithm::Cdf,
        "reassignment" => Algorithm::Reassignment,
        other => {
            eprintln!("Unknown algorithm '{other}' (expected cdf or reassignment)");
            std::process::exit(1);
        }
    };

    // Mono sidechain against stereo main (or vice versa): duplicate the
    // single channel.
    let channels = main_audio.len().max(sidechain_audio.len());
    while main_audio.len() < channels {
        let dup = main_audio[0].clone();
        main_audio.push(dup);
    }
    while sidechain_audio.len() < channels {
        let dup = sidechain_audio[0].clone();
        sidechain_audio.push(dup);
    }

    // Equal lengths, zero-padded
    let n_samples = main_audio
        .iter()
        .chain(&sidechain_audio)
        .map(|c| c.len())
        .max()
        .unwrap_or(0);
    for c in main_audio.iter_mut().chain(sidechain_audio.iter_mut()) {
        c.resize(n_samples, 0.0);
    }

    let params = MorphParams {
        sample_rate: sample_rate as f64,
        window_ms: cli.window_ms,
        hop_divisor: cli.hop_divisor,
        fft_multiplier: cli.fft_multiplier,
        algorithm,
    };

    // One independent mono engine per channel
    let mut engines: Vec<MorphEngine> = (0..channels)
        .map(|_| {
            MorphEngine::with_sink(&params, Arc::new(StderrSink)).unwrap_or_else(|e| {
                eprintln!("Engine construction failed: {e}");
                std::process::exit(1);
            })
        })
        .collect();

    let latency = engines[0].latency_samples();
    let layout = engines[0].layout();
    eprintln!(
        "{channels} ch, {sample_rate} Hz, {n_samples} samples/ch, {:?} algorithm",
        params.algorithm
    );
    eprintln!(
        "Window {} samples, hop {}, FFT {}, latency {} samples ({:.1} ms)",
        layout.window_size,
        layout.hop_size,
        layout.fft_size,
        latency,
        latency as f64 / sample_rate as f64 * 1000.0
    );

    let k_start = cli.k.clamp(0.0, 1.0);
    let k_end = cli.k_end.map(|k| k.clamp(0.0, 1.0)).unwrap_or(k_start);

    let mut output: Vec<Vec<f32>> = vec![vec![0.0; n_samples]; channels];
    let mut metrics = RunningMetrics::new(sample_rate as usize / 10);

    let block = cli.block_size.max(1);
    let mut pos = 0;
    while pos < n_samples {
        let end = (pos + block).min(n_samples);
        // Blend at the block midpoint of the ramp
        let t = (pos + end) as f32 / 2.0 / n_samples.max(1) as f32;
        let k = k_start + (k_end - k_start) * t;

        for ch in 0..channels {
            let (main_block, side_block) = (&main_audio[ch][pos..end], &sidechain_audio[ch][pos..end]);
            let mut out_block = vec![0.0f32; end - pos];
            engines[ch].process(main_block, side_block, &mut out_block, k);
            if ch == 0 {
                for &s in &out_block {
                    metrics.push(s as f64);
                }
            }
            output[ch][pos..end].copy_from_slice(&out_block);
        }
        pos = end;
    }

    if cli.normalize {
        let peak = output
            .iter()
            .flatten()
            .fold(0.0f32, |a, &b| a.max(b.abs()));
        if peak > 0.0 {
            let scale = 0.95 / peak;
            for c in output.iter_mut() {
                for s in c.iter_mut() {
                    *s *= scale;
                }
            }
            eprintln!("Normalized by {scale:.3} (peak was {peak:.3})");
        }
    }

    write_wav(&cli.output, &output, sample_rate);
    let snap = metrics.snapshot();
    eprintln!(
        "Written {} ({} samples/ch, RMS {:.1} dBFS, peak {:.1} dBFS)",
        cli.output,
        n_samples,
        snap.rms_db(),
        snap.peak_db()
    );

    if let Some(secs) = cli.capture_tail {
        let mut tail = RingBuffer::with_duration(secs, sample_rate);
        for &s in &output[0] {
            tail.push(s as f64);
        }
        let tail_path = format!("{}.tail.wav", cli.output);
        match tail.dump_to_wav(&tail_path, sample_rate) {
            Ok(()) => eprintln!("Captured last {secs} s to {tail_path}"),
            Err(e) => eprintln!("Tail capture failed: {e}"),
        }
    }
}

/// 0.5-amplitude test tone, matching the realtime demo defaults.
fn test_tone(freq: f64, sample_rate: u32, duration: f64) -> Vec<f32> {
    let n = (duration * sample_rate as f64) as usize;
    (0..n)
        .map(|i| {
            let t = i as f64 / sample_rate as f64;
            (0.5 * (2.0 * std::f64::consts::PI * freq * t).sin()) as f32
        })
        .collect()
}

/// Read a WAV into per-channel f32 buffers.
fn read_wav(path: &str) -> (Vec<Vec<f32>>, u32) {
    let reader = hound::WavReader::open(path).unwrap_or_else(|e| {
        eprintln!("Failed to open {path}: {e}");
        std::process::exit(1);
    });
    let spec = reader.spec();
    let channels = spec.channels as usize;
    let bits = spec.bits_per_sample;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_val = (1_i64 << (bits - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.unwrap() as f32 / max_val)
                .collect()
        }
        hound::SampleFormat::Float => reader.into_samples::<f32>().map(|s| s.unwrap()).collect(),
    };

    let frames = samples.len() / channels;
    let mut deinterleaved = vec![Vec::with_capacity(frames); channels];
    for (i, &s) in samples.iter().enumerate() {
        deinterleaved[i % channels].push(s);
    }
    (deinterleaved, spec.sample_rate)
}

/// Write per-channel buffers as 32-bit float WAV.
fn write_wav(path: &str, channels: &[Vec<f32>], sample_rate: u32) {
    let spec = hound::WavSpec {
        channels: channels.len() as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap_or_else(|e| {
        eprintln!("Failed to create {path}: {e}");
        std::process::exit(1);
    });
    let frames = channels.first().map(|c| c.len()).unwrap_or(0);
    for i in 0..frames {
        for c in channels {
            writer.write_sample(c[i]).unwrap();
        }
    }
    writer.finalize().unwrap();
}
