/// Rounds to cents, half away from zero.
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

pub fn is_valid_amount(amount: f64) -> bool {
    amount.is_finite() && amount >= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_cents() {
        assert_eq!(round_cents(10.006), 10.01);
        assert_eq!(round_cents(19.994), 19.99);
        assert_eq!(round_cents(0.1 + 0.2), 0.3);
    }

    #[test]
    fn test_is_valid_amount() {
        assert!(is_valid_amount(0.0));
        assert!(!is_valid_amount(-1.0));
        assert!(!is_valid_amount(f64::NAN));
    }
}
