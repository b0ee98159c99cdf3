use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};

pub const REFERRAL_CODE_LENGTH: usize = 6;
pub const TRANSFER_REFERENCE_LENGTH: usize = 16;

/// Attempts made to find a free referral code or transfer reference before
/// giving up.
pub const MAX_CODE_ATTEMPTS: usize = 5;

/// Random `[A-Za-z0-9]` string drawn from the operating system CSPRNG.
pub fn generate_code(length: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

pub fn generate_referral_code() -> String {
    generate_code(REFERRAL_CODE_LENGTH)
}

pub fn generate_transfer_reference() -> String {
    generate_code(TRANSFER_REFERENCE_LENGTH)
}
