//! # Concurrency Tests using Loom
//!
//! Loom models of how `run_all` collects cell results while a Ctrl-C
//! handler may cancel the build. A loom `AtomicBool` stands for the state of
//! the shared `CancellationToken` (loom cannot instrument tokio-util's
//! internals), while the cells, results and verdict are the crate's own
//! `expand`, `CellResult` and `Outcome::from_results`.

#[cfg(test)]
mod tests {
    use build_matrix::config::Axis;
    use build_matrix::matrix::{expand, Cell};
    use build_matrix::models::{CellResult, Outcome};
    use loom::sync::atomic::{AtomicBool, Ordering};
    use loom::sync::{Arc, Mutex};
    use loom::thread;
    use std::time::Duration;

    // loom's exploration recurses deeply; run each model on a larger stack.
    const STACK_SIZE: usize = 8 * 1024 * 1024; // 8 MB

    fn run_model<F>(name: &str, model: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let handle = std::thread::Builder::new()
            .name(name.into())
            .stack_size(STACK_SIZE)
            .spawn(move || loom::model(model))
            .unwrap();
        handle.join().unwrap();
    }

    fn two_cells() -> Vec<Cell> {
        expand(&[Axis::env("env", &["SET=A", "SET=B"])])
            .unwrap()
            .collect()
    }

    /// What a cell that checks the token before its first command yields.
    fn start_cell(cell: Cell, cancelled: bool) -> CellResult {
        if cancelled {
            CellResult::Cancelled {
                cell,
                steps: vec![],
                duration: Duration::ZERO,
            }
        } else {
            CellResult::Passed {
                cell,
                steps: vec![],
                duration: Duration::ZERO,
            }
        }
    }

    /// The signal handler cancels while two cells decide whether to start.
    ///
    /// Every cell yields exactly one result, the results sort back into
    /// expansion order, and the aggregate passes only when no cell saw the
    /// cancellation.
    #[test]
    fn test_signal_cancellation_races_with_cell_start() {
        run_model("loom-cancel-race", || {
            let cells = two_cells();
            let num_cells = cells.len();
            let stop = Arc::new(AtomicBool::new(false));
            let results = Arc::new(Mutex::new(Vec::with_capacity(num_cells)));

            let signal = {
                let stop = stop.clone();
                thread::spawn(move || stop.store(true, Ordering::Release))
            };

            let workers: Vec<_> = cells
                .into_iter()
                .map(|cell| {
                    let stop = stop.clone();
                    let results = results.clone();
                    thread::spawn(move || {
                        let result = start_cell(cell, stop.load(Ordering::Acquire));
                        results.lock().unwrap().push(result);
                    })
                })
                .collect();

            signal.join().unwrap();
            for worker in workers {
                worker.join().unwrap();
            }

            assert!(stop.load(Ordering::Acquire));
            let mut results = results.lock().unwrap().clone();
            results.sort_by_key(|r| r.cell().index);

            assert_eq!(results.len(), num_cells);
            let indices: Vec<usize> = results.iter().map(|r| r.cell().index).collect();
            assert_eq!(indices, vec![0, 1]);

            let any_cancelled = results
                .iter()
                .any(|r| matches!(r, CellResult::Cancelled { .. }));
            let expected = if any_cancelled { Outcome::Fail } else { Outcome::Pass };
            assert_eq!(Outcome::from_results(&results), expected);
        });
    }

    /// Cells push their results in completion order; after sorting by index
    /// the collected results and the verdict are the same whatever the
    /// interleaving.
    #[test]
    fn test_results_are_complete_in_any_completion_order() {
        run_model("loom-result-order", || {
            let cells = two_cells();
            let results = Arc::new(Mutex::new(Vec::with_capacity(cells.len())));

            let workers: Vec<_> = cells
                .into_iter()
                .map(|cell| {
                    let results = results.clone();
                    thread::spawn(move || {
                        // The second cell is interrupted.
                        let cancelled = cell.index == 1;
                        results.lock().unwrap().push(start_cell(cell, cancelled));
                    })
                })
                .collect();
            for worker in workers {
                worker.join().unwrap();
            }

            let mut results = results.lock().unwrap().clone();
            results.sort_by_key(|r| r.cell().index);
            assert_eq!(results[0].cell().value_of("env"), Some("SET=A"));
            assert!(results[0].is_pass());
            assert_eq!(results[1].cell().value_of("env"), Some("SET=B"));
            assert!(!results[1].is_pass() && !results[1].is_failure());
            assert_eq!(Outcome::from_results(&results), Outcome::Fail);
        });
    }
}
