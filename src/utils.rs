// Display helpers shared by the published snapshots.

/// Tiered USD formatter, wallet-style: "$0.00", "<$0.01", "$12.34",
/// "$1.23K", "$1.2M" depending on magnitude.
pub fn format_usd_value(value: f64) -> String {
    if value == 0.0 {
        return "$0.00".to_string();
    }
    if value < 0.01 {
        return "<$0.01".to_string();
    }
    if value < 1.0 {
        return format!("${value:.3}");
    }
    if value < 1_000.0 {
        return format!("${value:.2}");
    }
    if value < 10_000.0 {
        return format!("${:.2}K", value / 1_000.0);
    }
    if value < 1_000_000.0 {
        return format!("${:.1}K", value / 1_000.0);
    }
    if value < 10_000_000.0 {
        return format!("${:.2}M", value / 1_000_000.0);
    }
    format!("${:.1}M", value / 1_000_000.0)
}

/// Unit price formatter: two decimals above $1, eight below.
pub fn format_price(price: f64) -> String {
    if price >= 1.0 {
        format!("{price:.2}")
    } else {
        format!("{price:.8}")
    }
}

pub fn format_percentage(percentage: f64) -> String {
    let sign = if percentage >= 0.0 { "+" } else { "" };
    format!("{sign}{percentage:.2}%")
}

/// "0x1234...abcd"; empty input stays empty.
pub fn short_address(address: &str) -> String {
    if address.len() <= 10 {
        return address.to_string();
    }
    format!("{}...{}", &address[..6], &address[address.len() - 4..])
}
