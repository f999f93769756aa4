//! Thread-local workspace for reusable allocations
//!
//! The path aligner needs two rolling cost rows per state and one traceback
//! byte per DP cell. Each thread keeps one workspace and reuses it across
//! alignments, so steady-state alignment performs no matrix allocation.

use super::path_aligner::Cost;
use std::cell::RefCell;

/// Initial row capacity, enough for typical short-read windows.
const INITIAL_ROW_CAPACITY: usize = 512;

// Thread-local workspace for alignment buffers
thread_local! {
    static WORKSPACE: RefCell<AlignmentWorkspace> = RefCell::new(AlignmentWorkspace::new());
}

/// Reusable buffers for the affine DP
pub struct AlignmentWorkspace {
    /// Best cost in any state, previous query row
    pub best_prev: Vec<Cost>,
    /// Best cost in any state, current query row
    pub best_curr: Vec<Cost>,
    /// Insertion-run cost, previous query row
    pub insertion_prev: Vec<Cost>,
    /// Insertion-run cost, current query row
    pub insertion_curr: Vec<Cost>,
    /// One traceback byte per cell, row-major over `(query + 1) x (reference + 1)`
    pub pointers: Vec<u8>,
}

impl AlignmentWorkspace {
    pub fn new() -> Self {
        Self {
            best_prev: Vec::with_capacity(INITIAL_ROW_CAPACITY),
            best_curr: Vec::with_capacity(INITIAL_ROW_CAPACITY),
            insertion_prev: Vec::with_capacity(INITIAL_ROW_CAPACITY),
            insertion_curr: Vec::with_capacity(INITIAL_ROW_CAPACITY),
            pointers: Vec::new(),
        }
    }

    /// Size every buffer for a `query_len x reference_len` problem.
    ///
    /// Rows are filled with [`Cost::INFINITE`], pointers with zero.
    pub fn prepare(&mut self, query_len: usize, reference_len: usize) {
        let cols = reference_len + 1;
        for row in [
            &mut self.best_prev,
            &mut self.best_curr,
            &mut self.insertion_prev,
            &mut self.insertion_curr,
        ] {
            row.clear();
            row.resize(cols, Cost::INFINITE);
        }
        self.pointers.clear();
        self.pointers.resize((query_len + 1) * cols, 0);
    }

    /// Swap current and previous rows after finishing a query row.
    #[inline]
    pub fn advance_row(&mut self) {
        std::mem::swap(&mut self.best_prev, &mut self.best_curr);
        std::mem::swap(&mut self.insertion_prev, &mut self.insertion_curr);
    }

    /// Bytes currently reserved.
    pub fn memory_bytes(&self) -> usize {
        let cost = std::mem::size_of::<Cost>();
        (self.best_prev.capacity()
            + self.best_curr.capacity()
            + self.insertion_prev.capacity()
            + self.insertion_curr.capacity())
            * cost
            + self.pointers.capacity()
    }
}

impl Default for AlignmentWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `f` with this thread's workspace.
pub fn with_workspace<F, R>(f: F) -> R
where
    F: FnOnce(&mut AlignmentWorkspace) -> R,
{
    WORKSPACE.with(|ws| f(&mut ws.borrow_mut()))
}
