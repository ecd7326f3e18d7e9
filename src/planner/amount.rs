//! Human formatting of base-unit coin amounts

/// Decimal places between base units and whole TRU
pub const COIN_DECIMALS: u32 = 6;

/// Format a TRU amount given in base units
pub fn format_amount(amount: u64) -> String {
    format_amount_with_decimals(amount, COIN_DECIMALS)
}

/// Format a base-unit amount with `decimals` implicit decimal places
///
/// Whole amounts keep two fractional digits, amounts below one keep four.
/// Digits are truncated, never rounded, and trailing zeros are dropped.
pub fn format_amount_with_decimals(amount: u64, decimals: u32) -> String {
    let decimals = decimals as usize;
    let digits = format!("{:0>width$}", amount, width = decimals + 1);
    let (whole, fraction) = digits.split_at(digits.len() - decimals);

    let keep = if whole == "0" { 4 } else { 2 };
    let fraction = fraction[..keep.min(fraction.len())].trim_end_matches('0');

    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    }
}
