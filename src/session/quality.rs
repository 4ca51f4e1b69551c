//! Bitrate parsing for quality labels like `"480p | 0.9M"` or `"128kbps"`.

use once_cell::sync::Lazy;
use regex::Regex;

static LABEL_BITRATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([0-9]*\.?[0-9]+)\s*([MmKk])(?:bps)?\b").expect("valid regex")
});

/// Bits per second encoded in a quality label, or 0 when the label has no
/// recognizable `<number><M|K>` rate. The last rate in the label wins.
pub fn label_bitrate(label: &str) -> u64 {
    let Some(caps) = LABEL_BITRATE.captures_iter(label).last() else {
        return 0;
    };
    let Ok(value) = caps[1].parse::<f64>() else {
        return 0;
    };
    let scale = match &caps[2] {
        "M" | "m" => 1_000_000.0,
        _ => 1_000.0,
    };
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let bits = (value * scale).round() as u64;
    bits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_megabit_label() {
        assert_eq!(label_bitrate("480p | 0.9M"), 900_000);
        assert_eq!(label_bitrate("1080p | 6M"), 6_000_000);
        assert_eq!(label_bitrate("720p | 2.5M"), 2_500_000);
    }

    #[test]
    fn test_kilobit_label() {
        assert_eq!(label_bitrate("360p | 600K"), 600_000);
        assert_eq!(label_bitrate("128kbps"), 128_000);
        assert_eq!(label_bitrate("64 kbps"), 64_000);
    }

    #[test]
    fn test_rate_followed_by_text() {
        assert_eq!(label_bitrate("1.5Mbps (HD)"), 1_500_000);
        assert_eq!(label_bitrate("720p | 2M economy"), 2_000_000);
        assert_eq!(label_bitrate("2M or 3.5M"), 3_500_000);
    }

    #[test]
    fn test_unparsable_label() {
        assert_eq!(label_bitrate(""), 0);
        assert_eq!(label_bitrate("720p"), 0);
        assert_eq!(label_bitrate("high quality"), 0);
        assert_eq!(label_bitrate("5 Kings"), 0);
    }
}
