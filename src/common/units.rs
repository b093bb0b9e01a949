// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::domain::error::AppError;
use alloy::primitives::U256;
use alloy::primitives::utils::{ParseUnits, format_units, parse_units};

/// Scale a human-readable decimal amount ("1.5") into base units for a token
/// with the given decimals. Rejects negative amounts and excess precision.
pub fn to_base_units(amount: &str, decimals: u8) -> Result<U256, AppError> {
    let parsed = parse_units(amount.trim(), decimals).map_err(|e| AppError::Validation {
        field: "amount".to_string(),
        message: format!("cannot scale '{amount}' with {decimals} decimals: {e}"),
    })?;
    match parsed {
        ParseUnits::U256(value) => Ok(value),
        ParseUnits::I256(_) => Err(AppError::Validation {
            field: "amount".to_string(),
            message: format!("amount '{amount}' must not be negative"),
        }),
    }
}

/// Render base units back into a human-readable amount for logs. Falls back
/// to the raw integer if the decimals are out of range.
pub fn display_base_units(value: U256, decimals: u8) -> String {
    format_units(value, decimals).unwrap_or_else(|_| value.to_string())
}
