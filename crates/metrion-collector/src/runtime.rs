//! Runtime gauge samplers.
//!
//! The gauge set is an explicit registry: a list of `(name, reader)` tuples
//! over one [`ProbeSnapshot`], refreshed once per poll. The names are the
//! wire contract consumed by dashboards; several allocator-internal entries
//! have no analog outside the original runtime and read as zero so the gauge
//! set stays stable across reports.

use rand::Rng;
use sysinfo::{Pid, ProcessRefreshKind, RefreshKind, System};

/// One refresh worth of process and system figures, in bytes unless noted.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProbeSnapshot {
    pub proc_resident: f64,
    pub proc_virtual: f64,
    pub mem_total: f64,
    pub mem_used: f64,
    pub mem_available: f64,
    pub mem_free: f64,
    pub swap_total: f64,
    pub swap_used: f64,
    /// Whole-machine CPU utilization, percent.
    pub cpu_percent: f64,
    pub process_count: f64,
}

type Reader = fn(&ProbeSnapshot) -> f64;

/// The sampled gauge registry.
pub const SAMPLERS: &[(&str, Reader)] = &[
    ("Alloc", |p| p.proc_resident),
    ("BuckHashSys", |p| p.swap_total),
    ("Frees", |_| 0.0),
    ("GCCPUFraction", |_| 0.0),
    ("GCSys", |p| p.swap_used),
    ("HeapAlloc", |p| p.proc_resident),
    ("HeapIdle", |p| p.mem_available),
    ("HeapInuse", |p| p.mem_used),
    ("HeapObjects", |p| p.process_count),
    ("HeapReleased", |p| p.mem_free),
    ("HeapSys", |p| p.proc_virtual),
    ("LastGC", |_| 0.0),
    ("Lookups", |_| 0.0),
    // allocator internals the runtime does not expose
    ("MCacheInuse", |_| 0.0),
    ("MCacheSys", |_| 0.0),
    ("MSpanInuse", |_| 0.0),
    ("MSpanSys", |_| 0.0),
    ("Mallocs", |_| 0.0),
    ("NextGC", |_| 0.0),
    ("NumForcedGC", |_| 0.0),
    ("NumGC", |_| 0.0),
    ("OtherSys", |p| p.mem_used),
    ("PauseTotalNs", |_| 0.0),
    ("StackInuse", |p| p.proc_resident),
    ("StackSys", |p| p.proc_virtual),
    ("Sys", |p| p.mem_total),
    ("TotalAlloc", |p| p.proc_virtual),
    ("TotalMemory", |p| p.mem_total),
    ("FreeMemory", |p| p.mem_free),
    ("CPUutilization1", |p| p.cpu_percent),
];

/// sysinfo-backed reader for [`ProbeSnapshot`].
pub struct SystemProbe {
    system: System,
    pid: Pid,
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe {
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::new()
                .with_memory(sysinfo::MemoryRefreshKind::everything())
                .with_cpu(sysinfo::CpuRefreshKind::new().with_cpu_usage())
                .with_processes(ProcessRefreshKind::new().with_memory()),
        );
        Self {
            system,
            pid: Pid::from_u32(std::process::id()),
        }
    }

    /// Refreshes the underlying counters and returns a consistent snapshot.
    pub fn snapshot(&mut self) -> ProbeSnapshot {
        self.system.refresh_memory();
        self.system.refresh_cpu_usage();
        self.system
            .refresh_processes_specifics(ProcessRefreshKind::new().with_memory());

        let (proc_resident, proc_virtual) = self
            .system
            .process(self.pid)
            .map(|p| (p.memory() as f64, p.virtual_memory() as f64))
            .unwrap_or((0.0, 0.0));

        ProbeSnapshot {
            proc_resident,
            proc_virtual,
            mem_total: self.system.total_memory() as f64,
            mem_used: self.system.used_memory() as f64,
            mem_available: self.system.available_memory() as f64,
            mem_free: self.system.free_memory() as f64,
            swap_total: self.system.total_swap() as f64,
            swap_used: self.system.used_swap() as f64,
            cpu_percent: self.system.global_cpu_info().cpu_usage() as f64,
            process_count: self.system.processes().len() as f64,
        }
    }

    /// Runs every registered sampler plus the `RandomValue` jitter gauge.
    pub fn sample(&mut self) -> Vec<(String, f64)> {
        let snapshot = self.snapshot();
        let mut out: Vec<(String, f64)> = SAMPLERS
            .iter()
            .map(|(name, read)| (name.to_string(), read(&snapshot)))
            .collect();
        out.push(("RandomValue".to_string(), rand::thread_rng().gen::<f64>()));
        out
    }
}
