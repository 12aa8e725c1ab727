use alloy::primitives::U256;
use alloy::primitives::utils::{format_ether as format_wei, parse_ether as parse_wei};

use crate::error::ChainError;

/// Parses a decimal ether amount such as `"0.05"` into wei
pub fn parse_ether(amount: &str) -> Result<U256, ChainError> {
    let invalid = || ChainError::InvalidAmount(amount.to_string());
    let trimmed = amount.trim();
    let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));

    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if fraction.len() > 18
        || !whole.chars().all(|c| c.is_ascii_digit())
        || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }

    let whole = if whole.is_empty() { "0" } else { whole };
    let normalized = if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{fraction}")
    };
    parse_wei(&normalized).map_err(|_| invalid())
}

/// Formats wei as a decimal ether string without trailing zeros
pub fn format_ether(wei: U256) -> String {
    let formatted = format_wei(wei);
    match formatted.split_once('.') {
        Some((whole, fraction)) => {
            let fraction = fraction.trim_end_matches('0');
            if fraction.is_empty() {
                format!("{whole}.0")
            } else {
                format!("{whole}.{fraction}")
            }
        }
        None => format!("{formatted}.0"),
    }
}
