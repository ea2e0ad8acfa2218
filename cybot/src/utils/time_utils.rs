use std::time::Duration;

/// Render a duration as e.g. `1h2m3s`, omitting leading zero units
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total / 60) % 60, total % 60);

    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[test]
fn test_format_duration() {
    assert_eq!(format_duration(Duration::from_millis(4500)), "4s");
    assert_eq!(format_duration(Duration::from_secs(61)), "1m1s");
    assert_eq!(format_duration(Duration::from_secs(3600 * 26 + 5)), "26h0m5s");
}
