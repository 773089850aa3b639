//! Display number generation
//!
//! Account numbers shown to customers are random 32-bit values, stored as
//! BIGINT. Uniqueness is enforced by the store's unique constraint; the
//! ledger regenerates on collision.

use rand::Rng;

/// Generate a candidate display number.
pub(crate) fn generate() -> i64 {
    rand::thread_rng().gen::<u32>() as i64
}
