//! Protected-memory (EPC) budget checks for model loading.
//!
//! Enclave memory is a hard, hardware-enforced budget. A model that does not
//! fit is rejected up front with `AllocationFailed` instead of letting the
//! platform page or kill the boundary mid-load.

/// Share of available protected memory a model may occupy, in percent.
/// The remainder is headroom for decryption buffers and inference scratch.
const MODEL_BUDGET_PERCENT: u64 = 75;

/// Estimated protected memory available to the boundary, in bytes.
///
/// On Linux this reads `MemAvailable` from `/proc/meminfo`, which inside a
/// confidential VM reflects what remains after the hypervisor has assigned
/// encrypted pages. Returns `None` elsewhere or when unreadable.
pub fn available_epc_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let content = std::fs::read_to_string("/proc/meminfo").ok()?;
        parse_mem_available(&content)
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_mem_available(meminfo: &str) -> Option<u64> {
    let line = meminfo
        .lines()
        .find(|line| line.starts_with("MemAvailable:"))?;
    // Format: "MemAvailable:   123456 kB"
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb * 1024)
}

/// Whether `model_bytes` exceeds the budget derived from `available`.
///
/// Unknown availability never rejects a model.
pub fn exceeds_budget(model_bytes: u64, available: Option<u64>) -> bool {
    match available {
        Some(avail) => model_bytes > avail / 100 * MODEL_BUDGET_PERCENT,
        None => false,
    }
}

/// Whether a decrypted model of `model_bytes` would exceed the live budget.
pub fn model_exceeds_epc(model_bytes: u64) -> bool {
    exceeds_budget(model_bytes, available_epc_bytes())
}
