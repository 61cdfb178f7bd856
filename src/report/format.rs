//! Human-readable sizes and durations.

use std::time::Duration;

const SIZE_UNIT: u64 = 1024;
const SIZE_PREFIXES: &[u8] = b"KMGTPE";

/// Formats a byte count with 1024-based units.
///
/// ```
/// use doihive_core::report::format_size;
///
/// assert_eq!(format_size(512), "512 B");
/// assert_eq!(format_size(102_400), "100.00 KB");
/// ```
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    if bytes < SIZE_UNIT {
        return format!("{bytes} B");
    }
    let mut divisor = SIZE_UNIT;
    let mut exponent = 0;
    let mut n = bytes / SIZE_UNIT;
    while n >= SIZE_UNIT && exponent + 1 < SIZE_PREFIXES.len() {
        divisor *= SIZE_UNIT;
        exponent += 1;
        n /= SIZE_UNIT;
    }
    format!(
        "{:.2} {}B",
        bytes as f64 / divisor as f64,
        char::from(SIZE_PREFIXES[exponent])
    )
}

/// Formats a duration with a unit picked from its magnitude.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if duration < Duration::from_secs(1) {
        let ms = secs * 1000.0;
        if ms < 10.0 {
            format!("{ms:.2}ms")
        } else {
            format!("{ms:.1}ms")
        }
    } else if duration < Duration::from_secs(60) {
        format!("{secs:.3}s")
    } else if duration < Duration::from_secs(3600) {
        format!("{:.3}min", secs / 60.0)
    } else {
        format!("{:.3}h", secs / 3600.0)
    }
}
