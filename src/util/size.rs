const UNITS: &[&str] = &["KB", "MB", "GB", "TB", "PB"];

/// Formats a byte count for log output, e.g. `512 B` or `1.50 MB`.
pub fn human_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    format!("{value:.2} {}", UNITS[unit])
}

/// Percentage saved going from `before` to `after` bytes. Negative when the result grew.
pub fn savings_ratio(before: u64, after: u64) -> f64 {
    if before == 0 {
        return 0.0;
    }
    (1.0 - after as f64 / before as f64) * 100.0
}
