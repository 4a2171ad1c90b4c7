//! Money rounding and display

/// Round to cents
pub fn round2(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// "$1,234.50"
pub fn format_usd(amount: f64) -> String {
    let cents = format!("{:.2}", round2(amount).abs());
    let (whole, frac) = cents.split_once('.').unwrap_or((cents.as_str(), "00"));
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if amount < -0.005 { "-" } else { "" };
    format!("{sign}${grouped}.{frac}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2() {
        assert!((round2(10.005_1) - 10.01).abs() < 1e-9);
        assert!((round2(399.999) - 400.0).abs() < 1e-9);
        assert!((round2(0.1 + 0.2) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_format_usd() {
        assert_eq!(format_usd(0.0), "$0.00");
        assert_eq!(format_usd(250.0), "$250.00");
        assert_eq!(format_usd(1234.5), "$1,234.50");
        assert_eq!(format_usd(1_000_000.0), "$1,000,000.00");
        assert_eq!(format_usd(-40.0), "-$40.00");
    }
}
