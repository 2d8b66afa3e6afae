/// Electra Crypto Library
///
/// Password storage uses Argon2id with a per-password random salt, encoded as
/// a PHC string so the parameters travel with the hash.
/// Voting codes are short numeric strings read out to voters; they are not
/// secrets and carry no uniqueness guarantee.
pub mod code;
pub mod password;

pub use code::generate_voting_code;
pub use password::{CryptoError, hash_password, verify_password};
