//! Multi-page scanning
//!
//! Pages are independent, so each worker pulls page indices from a shared queue and
//! sends back results tagged with their index. A page that fails to decode yields
//! `None` in its slot and never stops the batch.

use crossbeam_channel::unbounded;
use std::thread;
use tracing::{debug, info};

use crate::vision::{OmrPipeline, ScanResult};

/// Scan every page, returning one slot per page in input order
///
/// `workers` of 0 or 1 scans on the calling thread.
pub fn scan_batch<P>(pipeline: &OmrPipeline, pages: &[P], workers: usize) -> Vec<Option<ScanResult>>
where
    P: AsRef<[u8]> + Sync,
{
    let workers = workers.min(pages.len());
    let results: Vec<Option<ScanResult>> = if workers <= 1 {
        pages.iter().map(|page| pipeline.scan(page.as_ref())).collect()
    } else {
        scan_parallel(pipeline, pages, workers)
    };

    let readable = results.iter().filter(|r| r.is_some()).count();
    info!("Batch complete: {}/{} pages readable", readable, pages.len());
    results
}

fn scan_parallel<P>(pipeline: &OmrPipeline, pages: &[P], workers: usize) -> Vec<Option<ScanResult>>
where
    P: AsRef<[u8]> + Sync,
{
    let (job_tx, job_rx) = unbounded::<usize>();
    let (result_tx, result_rx) = unbounded::<(usize, Option<ScanResult>)>();
    for index in 0..pages.len() {
        // Receiver is alive until the scope below ends
        let _ = job_tx.send(index);
    }
    drop(job_tx);

    debug!("Scanning {} pages on {} workers", pages.len(), workers);
    thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                for index in job_rx.iter() {
                    let result = pipeline.scan(pages[index].as_ref());
                    if result_tx.send((index, result)).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(result_tx);

    let mut results: Vec<Option<ScanResult>> = vec![None; pages.len()];
    for (index, result) in result_rx.iter() {
        results[index] = result;
    }
    results
}
