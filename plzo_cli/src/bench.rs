//! Serial vs parallel timing over a set of files.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use plzo_core::{worst_case_compressed_len, ArchiveEngine, Codec, EngineConfig};

/// One direction of one run: bytes in, bytes out, wall time.
#[derive(Debug, Clone, Copy)]
pub struct Measurement {
    pub in_size: u64,
    pub out_size: u64,
    pub elapsed: Duration,
}

impl Measurement {
    pub fn ratio(&self) -> f64 {
        if self.in_size == 0 {
            return 1.0;
        }
        self.out_size as f64 / self.in_size as f64
    }
}

#[derive(Debug, Clone)]
pub struct BenchRow {
    pub name: String,
    pub serial_compress: Measurement,
    pub serial_decompress: Measurement,
    pub parallel_compress: Measurement,
    pub parallel_decompress: Measurement,
}

/// Compress and decompress `path` once as a single block and once through
/// the parallel engine, checking that both round trips are exact.
pub fn bench_file(
    path: &Path,
    codec: Arc<dyn Codec>,
    config: EngineConfig,
) -> anyhow::Result<BenchRow> {
    let data = std::fs::read(path).with_context(|| format!("reading {:?}", path))?;
    let len = data.len() as u64;

    // ── Serial: whole input as one block ────────────────────────────────────
    let t0 = Instant::now();
    let packed = codec
        .compress_block(&data, worst_case_compressed_len(data.len()))
        .with_context(|| format!("serial compress of {:?}", path))?;
    let serial_compress = Measurement {
        in_size: len,
        out_size: packed.len() as u64,
        elapsed: t0.elapsed(),
    };

    let t0 = Instant::now();
    let unpacked = codec
        .decompress_block(&packed, data.len())
        .with_context(|| format!("serial decompress of {:?}", path))?;
    let serial_decompress = Measurement {
        in_size: packed.len() as u64,
        out_size: unpacked.len() as u64,
        elapsed: t0.elapsed(),
    };
    anyhow::ensure!(unpacked == data, "serial round trip of {:?} is not exact", path);

    // ── Parallel: chunked container ─────────────────────────────────────────
    let mut engine = ArchiveEngine::new(config, codec)?;
    let archive = engine.compress(&data)?;
    let restored = engine.decompress(&archive.bytes)?;
    anyhow::ensure!(restored.bytes == data, "parallel round trip of {:?} is not exact", path);

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    Ok(BenchRow {
        name,
        serial_compress,
        serial_decompress,
        parallel_compress: Measurement {
            in_size: archive.stats.input_len,
            out_size: archive.stats.output_len,
            elapsed: archive.stats.elapsed,
        },
        parallel_decompress: Measurement {
            in_size: restored.stats.input_len,
            out_size: restored.stats.output_len,
            elapsed: restored.stats.elapsed,
        },
    })
}

/// Tab-separated results table, one serial and one parallel line per file.
pub fn render_report(rows: &[BenchRow], workers: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<30}\t{:>15}\t{:>15}\t{:>15}\t{:>15}\t{:>15}\t{:>15}\t{:>15}\n",
        "filename",
        "file size",
        "comp size",
        "comp ratio",
        "comp time",
        "decomp size",
        "decomp ratio",
        "decomp time"
    );
    for row in rows {
        let _ = writeln!(out, "{:<30}", row.name);
        push_line(&mut out, "serial", &row.serial_compress, &row.serial_decompress);
        push_line(&mut out, "parallel", &row.parallel_compress, &row.parallel_decompress);
        out.push('\n');
    }
    let _ = write!(out, "{:<15}{:>15}", "thread count:", workers);
    out
}

fn push_line(out: &mut String, label: &str, comp: &Measurement, decomp: &Measurement) {
    let _ = writeln!(
        out,
        "{:>30}\t{:>15}\t{:>15}\t{:>15.8}\t{:>15.8}\t{:>15}\t{:>15.8}\t{:>15.8}",
        label,
        comp.in_size,
        comp.out_size,
        comp.ratio(),
        comp.elapsed.as_secs_f64(),
        decomp.out_size,
        decomp.ratio(),
        decomp.elapsed.as_secs_f64()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(in_size: u64, out_size: u64) -> Measurement {
        Measurement {
            in_size,
            out_size,
            elapsed: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_report_lists_both_modes_per_file() {
        let rows = vec![BenchRow {
            name: "paper1".into(),
            serial_compress: m(1000, 400),
            serial_decompress: m(400, 1000),
            parallel_compress: m(1000, 450),
            parallel_decompress: m(450, 1000),
        }];
        let report = render_report(&rows, 8);
        assert!(report.contains("paper1"));
        assert!(report.contains("serial"));
        assert!(report.contains("parallel"));
        assert!(report.contains("0.45000000"));
        assert!(report.trim_end().ends_with('8'));
    }
}
