pub mod error;
pub mod config;
pub mod clock;
pub mod security;
pub mod policy;
pub mod codec;
pub mod fingerprint;
pub mod storage;
pub mod identity;
pub mod cookies;
pub mod audit;
pub mod issuance;
pub mod verification;
pub mod service;
pub mod server;

pub use config::SkeletonKeyConfig;
pub use error::{AppError, CredentialError, CredentialResult};
pub use service::SkeletonKey;
pub use verification::Outcome;

// Test-only printing helper: expands to eprintln! during tests and is absent otherwise.
// Usage in tests: tprintln!("debug: {}", value);
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

// In non-test builds, provide a no-op tprintln! so calls compile without effect.
#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        // Preserve formatting checks in release without producing code
        if false { let _ = format!($($arg)*); }
    });
}
