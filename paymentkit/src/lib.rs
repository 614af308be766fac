//! Bindings facade for PaymentKit.
//!
//! Re-exports the `paymentkit-core` API under one crate for foreign
//! language bindings (Swift, Kotlin) built with UniFFI.

pub use paymentkit_core::*;

/// Convenience result alias for SDK operations.
pub type PaymentKitResult<T, E = PaymentKitError> = std::result::Result<T, E>;

uniffi::setup_scaffolding!("paymentkit");
