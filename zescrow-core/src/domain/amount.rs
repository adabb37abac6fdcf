//! ZEC amount conversions
//!
//! All balances and transfers are carried as integer zatoshi. Decimal ZEC
//! values only exist at the edges (API input, display).

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::result::{Error, Result};

pub const ZATOSHI_PER_ZEC: i64 = 100_000_000;

/// Flat fee charged on every outgoing send
pub const DEFAULT_FEE_ZATOSHI: i64 = 1_000;

/// 21M ZEC supply cap
pub const MAX_MONEY_ZATOSHI: i64 = 21_000_000 * ZATOSHI_PER_ZEC;

/// Convert a ZEC amount to zatoshi, flooring sub-zatoshi fractions.
pub fn zec_to_zatoshi(amount: Decimal) -> Result<i64> {
    if amount <= Decimal::ZERO {
        return Err(Error::validation("Amount must be greater than zero"));
    }

    let zatoshi = (amount * Decimal::from(ZATOSHI_PER_ZEC))
        .floor()
        .to_i64()
        .ok_or_else(|| Error::validation("Amount is out of range"))?;

    if zatoshi == 0 {
        return Err(Error::validation("Amount is smaller than one zatoshi"));
    }
    if zatoshi > MAX_MONEY_ZATOSHI {
        return Err(Error::validation("Amount exceeds the ZEC supply"));
    }
    Ok(zatoshi)
}

pub fn zatoshi_to_zec(zatoshi: i64) -> Decimal {
    Decimal::new(zatoshi, 8).normalize()
}
