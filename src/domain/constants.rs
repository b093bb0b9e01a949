// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use alloy::primitives::Address;

/// Sentinel address standing for the chain's native coin. Always a valid
/// token, never needs an allowance or approval.
pub const NATIVE_TOKEN: Address = Address::ZERO;

pub const NATIVE_DECIMALS: u8 = 18;

// =============================================================================
// ORDER LIFECYCLE MARKERS
// =============================================================================

/// Prefix written into `transaction_hash` when a spawned child order fails
/// terminally. Distinguishable from a real hash without a status column.
pub const FAILURE_MARKER_PREFIX: &str = "EXECUTION_FAILED: ";

/// Marker written into `transaction_hash` when a recurring order is
/// soft-cancelled by the user.
pub const CANCELLED_MARKER: &str = "CANCELLED_BY_USER";

/// Hard cap on marker length; keeps markers within the column width the
/// original deployments used.
pub const MARKER_MAX_LEN: usize = 255;

// =============================================================================
// RECURRENCE BOUNDS
// =============================================================================

pub const MIN_RECURRING_INTERVAL_SECS: i64 = 60;

pub const DEFAULT_SLIPPAGE_PERCENT: f64 = 0.5;

// =============================================================================
// GAS & TRANSACTION CONSTANTS
// =============================================================================

pub const DEFAULT_GAS_LIMIT: u64 = 250_000;
pub const MAX_GAS_LIMIT: u64 = 8_000_000;
pub const DEFAULT_PRIORITY_FEE_GWEI: u64 = 2;

/// Headroom applied on top of `eth_estimateGas`, in basis points.
pub const GAS_HEADROOM_BPS: u64 = 2_000;

/// Truncate a failure reason into a marker that fits the hash column.
pub fn failure_marker(reason: &str) -> String {
    let mut marker = format!("{FAILURE_MARKER_PREFIX}{reason}");
    if marker.len() > MARKER_MAX_LEN {
        let mut cut = MARKER_MAX_LEN;
        while !marker.is_char_boundary(cut) {
            cut -= 1;
        }
        marker.truncate(cut);
    }
    marker
}

/// True when the `transaction_hash` column holds a lifecycle marker rather
/// than a real transaction hash.
pub fn is_lifecycle_marker(value: &str) -> bool {
    value.starts_with(FAILURE_MARKER_PREFIX) || value == CANCELLED_MARKER
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_truncates_to_cap() {
        let long = "x".repeat(400);
        let marker = failure_marker(&long);
        assert_eq!(marker.len(), MARKER_MAX_LEN);
        assert!(marker.starts_with(FAILURE_MARKER_PREFIX));
    }

    #[test]
    fn marker_keeps_short_reasons_whole() {
        let marker = failure_marker("quote error");
        assert_eq!(marker, "EXECUTION_FAILED: quote error");
    }

    #[test]
    fn marker_truncation_respects_char_boundaries() {
        let long = "é".repeat(300);
        let marker = failure_marker(&long);
        assert!(marker.len() <= MARKER_MAX_LEN);
        assert!(marker.starts_with(FAILURE_MARKER_PREFIX));
    }

    #[test]
    fn lifecycle_markers_are_recognized() {
        assert!(is_lifecycle_marker("EXECUTION_FAILED: swap reverted"));
        assert!(is_lifecycle_marker(CANCELLED_MARKER));
        assert!(!is_lifecycle_marker(
            "0xcccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccc"
        ));
    }
}
