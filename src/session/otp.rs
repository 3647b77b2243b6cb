//! OTP generation, cooldown and expiry arithmetic, and the clock seam.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

/// Source of "now". Tests substitute a clock they can move by hand.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A numeric code of exactly `length` digits. Leading zeros are kept.
pub fn generate_otp(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Whole seconds left before another OTP may be issued, if any.
pub fn cooldown_remaining(
    issued_at: DateTime<Utc>,
    now: DateTime<Utc>,
    cooldown: Duration,
) -> Option<i64> {
    let cooldown = chrono::Duration::from_std(cooldown).unwrap_or(chrono::Duration::zero());
    let elapsed = now.signed_duration_since(issued_at);
    if elapsed < cooldown {
        let remaining = cooldown - elapsed;
        // Round up so "0 seconds remaining" is never reported.
        let secs = (remaining.num_milliseconds() + 999) / 1000;
        Some(secs.max(1))
    } else {
        None
    }
}

/// Whether an OTP issued at `issued_at` has outlived `validity`.
pub fn is_expired(issued_at: DateTime<Utc>, now: DateTime<Utc>, validity: Duration) -> bool {
    let validity = chrono::Duration::from_std(validity).unwrap_or(chrono::Duration::zero());
    now.signed_duration_since(issued_at) > validity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_has_requested_length_and_digits_only() {
        for length in [4, 6, 8] {
            let otp = generate_otp(length);
            assert_eq!(otp.len(), length);
            assert!(otp.chars().all(|c| c.is_ascii_digit()), "{otp}");
        }
    }

    #[test]
    fn cooldown_counts_down() {
        let issued = Utc::now();
        let cooldown = Duration::from_secs(60);

        assert_eq!(cooldown_remaining(issued, issued, cooldown), Some(60));
        assert_eq!(
            cooldown_remaining(issued, issued + chrono::Duration::seconds(45), cooldown),
            Some(15)
        );
        assert_eq!(
            cooldown_remaining(issued, issued + chrono::Duration::milliseconds(59_500), cooldown),
            Some(1)
        );
        assert_eq!(
            cooldown_remaining(issued, issued + chrono::Duration::seconds(60), cooldown),
            None
        );
    }

    #[test]
    fn expiry_is_strictly_after_validity() {
        let issued = Utc::now();
        let validity = Duration::from_secs(600);
        assert!(!is_expired(issued, issued + chrono::Duration::seconds(600), validity));
        assert!(is_expired(issued, issued + chrono::Duration::seconds(601), validity));
    }
}
