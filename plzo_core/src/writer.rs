use std::io::Write;

use crate::error::{format_error, Result};
use crate::format::{encode_size_table, HEADER_SIZE, SIZE_ENTRY_SIZE};
use crate::plan::ChunkPlan;
use crate::pool::ChunkResult;

/// Serialize a container into any `Write` sink.
///
/// # Layout written
/// ```text
/// [worker_count: u8][nominal_chunk_size: u64 LE][remainder: u8]
/// [compressed_len: u32 LE] x worker_count        <- size table, chunk order
/// [payload 0][payload 1] ... [payload N-1]        <- same order as the table
/// ```
///
/// The whole size table is written before the first payload byte; a reader
/// has no other way to find chunk boundaries. Returns the number of bytes
/// written, header and table included.
pub fn write_container<W: Write>(dst: &mut W, plan: &ChunkPlan, payloads: &[&[u8]]) -> Result<u64> {
    let sizes = size_table(plan, payloads)?;

    dst.write_all(&plan.header().to_bytes())?;
    dst.write_all(&encode_size_table(&sizes))?;
    for payload in payloads {
        dst.write_all(payload)?;
    }

    let written = encoded_len(plan, payloads.iter().map(|p| p.len() as u64));
    tracing::debug!(
        worker_count = plan.worker_count(),
        container_len = written,
        "container written"
    );
    Ok(written)
}

/// Encode the compressed chunk results of a plan into an in-memory container.
///
/// `results` must hold one successful result per chunk, in index order.
pub fn encode(plan: &ChunkPlan, results: &[ChunkResult]) -> Result<Vec<u8>> {
    for (i, result) in results.iter().enumerate() {
        if result.index != i {
            return Err(format_error(format!(
                "chunk result at position {} belongs to chunk {}",
                i, result.index
            )));
        }
        if !result.is_ok() {
            return Err(format_error(format!(
                "chunk {} has no payload (status {})",
                i, result.status
            )));
        }
    }
    let payloads: Vec<&[u8]> = results.iter().map(|r| r.output.as_slice()).collect();
    let total = encoded_len(plan, payloads.iter().map(|p| p.len() as u64));
    let mut buf = Vec::with_capacity(total as usize);
    write_container(&mut buf, plan, &payloads)?;
    Ok(buf)
}

/// Total container length for the given payload lengths: header, size table
/// and payloads together. Compression ratios are computed from this figure.
pub fn encoded_len(plan: &ChunkPlan, payload_lens: impl IntoIterator<Item = u64>) -> u64 {
    let prefix = (HEADER_SIZE + plan.worker_count() * SIZE_ENTRY_SIZE) as u64;
    prefix + payload_lens.into_iter().sum::<u64>()
}

fn size_table(plan: &ChunkPlan, payloads: &[&[u8]]) -> Result<Vec<u32>> {
    if payloads.len() != plan.worker_count() {
        return Err(format_error(format!(
            "plan has {} chunks but {} payloads were supplied",
            plan.worker_count(),
            payloads.len()
        )));
    }
    payloads
        .iter()
        .enumerate()
        .map(|(i, p)| {
            u32::try_from(p.len()).map_err(|_| {
                format_error(format!(
                    "chunk {} payload of {} bytes does not fit a 32-bit size entry",
                    i,
                    p.len()
                ))
            })
        })
        .collect()
}
