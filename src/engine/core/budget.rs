//! CPU thread budget for accelerated workers.
//!
//! When NVENC encodes but decode/scale stay on the CPU, the accelerated workers
//! share one advisory thread budget. The allotment is only passed to ffmpeg as
//! `-threads` / `-filter_threads`; nothing enforces it at the OS level.

/// Split `total_cpu_budget` evenly across accelerated workers (floor, minimum 1).
///
/// A zero budget is treated as 1 and a zero worker count as a single worker.
pub fn allocate(total_cpu_budget: u32, accelerated_workers: u32) -> u32 {
    let total = total_cpu_budget.max(1);
    (total / accelerated_workers.max(1)).max(1)
}

/// Thread flags handed to one ffmpeg invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadAllotment {
    /// `-threads` (decoder)
    pub decoder: Option<u32>,
    /// `-filter_threads` / `-filter_complex_threads`
    pub filter: Option<u32>,
}

/// Inputs for deriving per-worker allotments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetPlan {
    pub gpu_workers: u32,
    pub cpu_budget_for_gpu: u32,
    pub gpu_filter_threads: u32,
    pub cpu_threads: u32,
    /// Decode and scale both happen on the GPU (NVDEC + scale_cuda)
    pub full_gpu_pipeline: bool,
}

impl BudgetPlan {
    /// Allotment for a hardware worker.
    ///
    /// The allocator is bypassed when there are no GPU workers or when the GPU
    /// does all the decode/scale work; a small fixed filter-thread count is used then.
    pub fn gpu_allotment(&self) -> ThreadAllotment {
        if self.gpu_workers > 0 && !self.full_gpu_pipeline {
            let per_worker = allocate(self.cpu_budget_for_gpu, self.gpu_workers);
            ThreadAllotment {
                decoder: Some(per_worker),
                filter: Some(per_worker),
            }
        } else {
            ThreadAllotment {
                decoder: None,
                filter: Some(self.gpu_filter_threads.max(1)),
            }
        }
    }

    /// Allotment for software workers and software fallbacks.
    pub fn cpu_allotment(&self) -> ThreadAllotment {
        ThreadAllotment {
            decoder: Some(self.cpu_threads.max(1)),
            filter: None,
        }
    }
}
