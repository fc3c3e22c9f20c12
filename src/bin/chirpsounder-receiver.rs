use std::env;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process;

use chirpsounder_core::sample_source::{InMemorySource, SampleSource, SourceMetadata};
use chirpsounder_core::{
    batch_partition, build_ionogram, next_analytic_chirp, try_claim, Config, DetectionRecord,
    WaitOutcome,
};
use rustfft::num_complex::Complex32;

fn usage() -> ! {
    eprintln!("Usage:");
    eprintln!("  chirpsounder-receiver detect <config.json> <iq-file> <i0>");
    eprintln!("  chirpsounder-receiver scan <config.json> <iq-file> <i0> <n-blocks>");
    eprintln!("  chirpsounder-receiver ionogram <config.json> <iq-file> <rate> <t0> <id>");
    eprintln!("  chirpsounder-receiver batch <config.json> <iq-file>");
    eprintln!("  chirpsounder-receiver serendipitous <config.json> <iq-file>");
    eprintln!("  chirpsounder-receiver analytic <config.json> <iq-file>");
    process::exit(1);
}

/// Reads a flat file of interleaved little-endian `f32` I/Q pairs into a
/// single in-memory sample source. Real deployments plug in a ring-buffered
/// SDR adapter; this is the glue a CLI needs to have *something* concrete to
/// read from.
fn load_iq_file(path: &Path, metadata: SourceMetadata) -> std::io::Result<InMemorySource> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    let samples: Vec<Complex32> = bytes
        .chunks_exact(8)
        .map(|c| {
            let re = f32::from_le_bytes([c[0], c[1], c[2], c[3]]);
            let im = f32::from_le_bytes([c[4], c[5], c[6], c[7]]);
            Complex32::new(re, im)
        })
        .collect();
    Ok(InMemorySource::new("ch0", samples, metadata))
}

fn load_config(path: &str) -> Config {
    match Config::load(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config {}: {}", path, e);
            process::exit(1);
        }
    }
}

fn cmd_detect(config_path: &str, iq_path: &str, i0_str: &str) -> anyhow::Result<()> {
    let conf = load_config(config_path);
    let i0: i64 = i0_str.parse()?;
    let meta = SourceMetadata {
        sample_rate: conf.sample_rate,
        center_freq: conf.center_freq,
    };
    let source = load_iq_file(Path::new(iq_path), meta)?;
    let z = source
        .read(&conf.channel, i0, conf.n_samples_per_block)
        .ok_or_else(|| anyhow::anyhow!("not enough samples at i0={} for one block", i0))?;

    let bank = chirpsounder_core::ChirpMatchedFilterBank::new(&conf);
    let records = bank.seek(&z, i0)?;

    let store = chirpsounder_core::artifact::ArtifactStore::new(&conf.output_dir);
    for rec in &records {
        log::info!(
            "detected chirp_rate={:.2} kHz t0={:.6} snr={:.1}",
            rec.chirp_rate / 1e3,
            rec.t0,
            rec.detected_snr
        );
        // f0 is recoverable from t0 = i0/sr - f0/rate, so the
        // detection record doesn't need the matched-filter bank to expose
        // the raw frequency bin separately.
        let f0 = rec.chirp_rate * (i0 as f64 / conf.sample_rate - rec.t0);
        let detection = DetectionRecord {
            f0,
            i0,
            sample_rate: conf.sample_rate,
            n_samples: conf.n_samples_per_block,
            chirp_time: rec.t0,
            chirp_rate: rec.chirp_rate,
        };
        store.write_detection_record(rec.t0, &detection);
        store.write_parameter_file(rec.t0, rec.chirp_rate, i0)?;
    }
    println!("{} detection(s)", records.len());
    Ok(())
}

/// Advances `i0` by `n_samples_per_block * step` per block, mirroring the
/// original's multi-block streaming scan, and records every detection found
/// along the way.
fn cmd_scan(config_path: &str, iq_path: &str, i0_str: &str, n_blocks_str: &str) -> anyhow::Result<()> {
    let conf = load_config(config_path);
    let i0: i64 = i0_str.parse()?;
    let n_blocks: usize = n_blocks_str.parse()?;
    let meta = SourceMetadata {
        sample_rate: conf.sample_rate,
        center_freq: conf.center_freq,
    };
    let source = load_iq_file(Path::new(iq_path), meta)?;

    let bank = chirpsounder_core::ChirpMatchedFilterBank::new(&conf);
    let records = bank.scan(&source, &conf.channel, i0, n_blocks)?;

    let store = chirpsounder_core::artifact::ArtifactStore::new(&conf.output_dir);
    for rec in &records {
        log::info!(
            "scan: detected chirp_rate={:.2} kHz t0={:.6} snr={:.1}",
            rec.chirp_rate / 1e3,
            rec.t0,
            rec.detected_snr
        );
        store.write_parameter_file(rec.t0, rec.chirp_rate, rec.detected_at)?;
    }
    println!("{} detection(s) over {} block(s)", records.len(), n_blocks);
    Ok(())
}

fn cmd_ionogram(config_path: &str, iq_path: &str, rate_str: &str, t0_str: &str, id_str: &str) -> anyhow::Result<()> {
    let conf = load_config(config_path);
    let rate: f64 = rate_str.parse()?;
    let t0: f64 = t0_str.parse()?;
    let id: u16 = id_str.parse()?;
    let meta = SourceMetadata {
        sample_rate: conf.sample_rate,
        center_freq: conf.center_freq,
    };
    let source = load_iq_file(Path::new(iq_path), meta)?;
    let iono = build_ionogram(&conf, &source, rate, t0, id, |_| WaitOutcome::SourceGone);

    let store = chirpsounder_core::artifact::ArtifactStore::new(&conf.output_dir);
    store.write_ionogram(&iono);
    println!(
        "wrote ionogram id={} t0={:.2} shape=({}x{})",
        id, t0, iono.n_freq, iono.n_range
    );
    Ok(())
}

/// Glob `par-*.json` under every day-bucketed directory in `output_dir`,
/// returning `(path, t0, chirp_rate)` triples sorted by path — the JSON
/// stand-in for the original's `par-*.h5` glob (batch mode).
fn list_parameter_files(output_dir: &str) -> anyhow::Result<Vec<(PathBuf, f64, f64)>> {
    #[derive(serde::Deserialize)]
    struct ParameterFile {
        t0: f64,
        chirp_rate: f64,
    }

    let mut out = Vec::new();
    let Ok(days) = fs::read_dir(output_dir) else {
        return Ok(out);
    };
    for day in days.flatten() {
        let Ok(entries) = fs::read_dir(day.path()) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let is_par = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("par-") && n.ends_with(".json"))
                .unwrap_or(false);
            if !is_par {
                continue;
            }
            let contents = fs::read_to_string(&path)?;
            let parsed: ParameterFile = serde_json::from_str(&contents)?;
            out.push((path, parsed.t0, parsed.chirp_rate));
        }
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

fn cmd_batch(config_path: &str, iq_path: &str) -> anyhow::Result<()> {
    let conf = load_config(config_path);
    let meta = SourceMetadata {
        sample_rate: conf.sample_rate,
        center_freq: conf.center_freq,
    };
    let source = load_iq_file(Path::new(iq_path), meta)?;
    let store = chirpsounder_core::artifact::ArtifactStore::new(&conf.output_dir);

    let files = list_parameter_files(&conf.output_dir)?;
    let (worker_id, worker_count) = worker_identity();
    let work = batch_partition(&files, worker_id, worker_count);

    for chirp in work {
        let iono = build_ionogram(&conf, &source, chirp.chirp_rate, chirp.t0, chirp.id, |_| WaitOutcome::SourceGone);
        store.write_ionogram(&iono);
        log::info!("batch: wrote ionogram t0={:.2} rate={:.2} kHz", chirp.t0, chirp.chirp_rate / 1e3);
    }
    Ok(())
}

fn cmd_serendipitous(config_path: &str, iq_path: &str) -> anyhow::Result<()> {
    let conf = load_config(config_path);
    let meta = SourceMetadata {
        sample_rate: conf.sample_rate,
        center_freq: conf.center_freq,
    };
    let source = load_iq_file(Path::new(iq_path), meta)?;
    let store = chirpsounder_core::artifact::ArtifactStore::new(&conf.output_dir);

    chirpsounder_core::worker::supervise("serendipitous", std::time::Duration::from_secs(1), || {
        loop {
            let files = list_parameter_files(&conf.output_dir)?;
            let mut claimed_any = false;
            for (path, t0, chirp_rate) in &files {
                if try_claim(path)? {
                    claimed_any = true;
                    let iono = build_ionogram(&conf, &source, *chirp_rate, *t0, 0, |_| WaitOutcome::SourceGone);
                    store.write_ionogram(&iono);
                    log::info!("serendipitous: processed {}", path.display());
                }
            }
            if !claimed_any {
                std::thread::sleep(std::time::Duration::from_secs(1));
            }
        }
    });
    Ok(())
}

/// `(worker_id, worker_count)`, an explicit pair standing in for an MPI
/// rank/size ambient global. Read from the environment
/// so multiple processes can be launched side by side without MPI.
fn worker_identity() -> (usize, usize) {
    let worker_id = env::var("CHIRPSOUNDER_WORKER_ID")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let worker_count = env::var("CHIRPSOUNDER_WORKER_COUNT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);
    (worker_id, worker_count.max(1))
}

fn cmd_analytic(config_path: &str, iq_path: &str) -> anyhow::Result<()> {
    let conf = load_config(config_path);
    let (worker_id, _) = worker_identity();
    let timings = conf
        .sounder_timings
        .get(worker_id)
        .cloned()
        .unwrap_or_default();
    let meta = SourceMetadata {
        sample_rate: conf.sample_rate,
        center_freq: conf.center_freq,
    };
    let source = load_iq_file(Path::new(iq_path), meta)?;
    let store = chirpsounder_core::artifact::ArtifactStore::new(&conf.output_dir);

    chirpsounder_core::worker::supervise("analytic-realtime", std::time::Duration::from_secs(1), || {
        let (_lo, hi) = source.bounds(&conf.channel);
        let t_now = hi as f64 / conf.sample_rate;
        let Some(chirp) = next_analytic_chirp(&timings, t_now) else {
            return Ok(());
        };
        let iono = build_ionogram(&conf, &source, chirp.chirp_rate, chirp.t0, chirp.id, |_| WaitOutcome::SourceGone);
        store.write_ionogram(&iono);
        log::info!("analytic: wrote ionogram id={} t0={:.2}", chirp.id, chirp.t0);
        Ok(())
    });
    Ok(())
}

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        usage();
    }

    let result = match args[1].as_str() {
        "detect" if args.len() == 5 => cmd_detect(&args[2], &args[3], &args[4]),
        "scan" if args.len() == 6 => cmd_scan(&args[2], &args[3], &args[4], &args[5]),
        "ionogram" if args.len() == 7 => cmd_ionogram(&args[2], &args[3], &args[4], &args[5], &args[6]),
        "batch" if args.len() == 4 => cmd_batch(&args[2], &args[3]),
        "serendipitous" if args.len() == 4 => cmd_serendipitous(&args[2], &args[3]),
        "analytic" if args.len() == 4 => cmd_analytic(&args[2], &args[3]),
        _ => usage(),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
