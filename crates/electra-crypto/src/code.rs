use rand::Rng;

const CODE_MIN: u32 = 100_000;
const CODE_MAX: u32 = 999_999;

/// Generate a six-digit voting code, uniformly in 100000..=999999.
pub fn generate_voting_code() -> String {
    rand::rng().random_range(CODE_MIN..=CODE_MAX).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_six_digits() {
        for _ in 0..200 {
            let code = generate_voting_code();
            assert_eq!(code.len(), 6);
            assert!(code.bytes().all(|b| b.is_ascii_digit()));
            assert_ne!(code.as_bytes()[0], b'0');
        }
    }
}
