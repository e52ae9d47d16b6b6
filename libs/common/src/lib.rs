pub mod id;
pub mod token;

pub use id::PrefixedId;
pub use token::ReferralToken;
