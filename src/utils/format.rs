const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

/// Human-readable size using binary (1024) scaling, rounded to two decimals.
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let mut rounded = (value * 100.0).round() / 100.0;
    // 1023.999 KB rounds to 1024 and belongs to the next unit
    if rounded >= 1024.0 && unit < UNITS.len() - 1 {
        rounded = ((rounded / 1024.0) * 100.0).round() / 100.0;
        unit += 1;
    }
    format!("{} {}", rounded, UNITS[unit])
}

/// Caption attached to every relayed document.
pub fn caption(filename: &str, size: &str) -> String {
    format!("📁 {}\n💾 Size: {}", filename, size)
}
