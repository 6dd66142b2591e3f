/// Renders an atomic amount with `decimals` fractional digits.
pub fn format_amount(amount: u64, decimals: u32) -> String {
	let divisor = 10u64.pow(decimals);
	format!(
		"{}.{:0width$}",
		amount / divisor,
		amount % divisor,
		width = decimals as usize
	)
}

/// Same as [`format_amount`] for signed transaction totals.
pub fn format_signed_amount(amount: i64, decimals: u32) -> String {
	let sign = if amount < 0 { "-" } else { "" };
	format!("{}{}", sign, format_amount(amount.unsigned_abs(), decimals))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_format_amount() {
		assert_eq!(format_amount(1_500_000, 6), "1.500000");
		assert_eq!(format_amount(42, 3), "0.042");
		assert_eq!(format_signed_amount(-1_000, 3), "-1.000");
	}
}
