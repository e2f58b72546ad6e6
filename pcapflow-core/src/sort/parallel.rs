//! One-task-per-file fan-out shared by the sorter and the renumberer.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use tracing::{debug, warn};

use crate::error::Result;

/// Run `task` over every file and collect `(path, count)` in input order.
///
/// Sequentially, the first failure stops the run. In parallel each file
/// gets its own scoped thread and reports over a channel; every task runs
/// to completion before the first failure (in input order) is returned.
pub fn run_per_file<F>(paths: &[PathBuf], parallel: bool, task: F) -> Result<Vec<(PathBuf, u64)>>
where
    F: Fn(&Path) -> Result<u64> + Sync,
{
    if !parallel || paths.len() < 2 {
        return paths
            .iter()
            .map(|path| task(path).map(|count| (path.clone(), count)))
            .collect();
    }

    let mut results: Vec<Option<Result<u64>>> = Vec::with_capacity(paths.len());
    results.resize_with(paths.len(), || None);

    thread::scope(|scope| {
        let (tx, rx) = mpsc::channel();
        for (slot, path) in paths.iter().enumerate() {
            let tx = tx.clone();
            let task = &task;
            scope.spawn(move || {
                // The receiver outlives every sender in this scope.
                let _ = tx.send((slot, task(path)));
            });
        }
        drop(tx);

        for (slot, result) in rx {
            debug!(path = %paths[slot].display(), ok = result.is_ok(), "file task finished");
            results[slot] = Some(result);
        }
    });

    let mut first_error = None;
    let mut done = Vec::with_capacity(paths.len());
    for (path, result) in paths.iter().zip(results) {
        match result {
            Some(Ok(count)) => done.push((path.clone(), count)),
            Some(Err(e)) => {
                warn!(path = %path.display(), error = %e, "file task failed");
                first_error.get_or_insert(e);
            }
            // A task that panicked never reports; the scope re-raises the panic.
            None => {}
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(done),
    }
}
