//! Number formatting and rounding shared by the report outputs.

/// Round to `places` decimal places. Non-finite input becomes 0.
pub fn round_to(value: f64, places: u32) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let factor = 10f64.powi(places as i32);
    let rounded = (value * factor).round() / factor;
    if rounded.is_finite() {
        rounded
    } else {
        value
    }
}

/// `savings / retail * 100`, or 0 when there is no retail cost to compare with.
pub fn savings_percentage(savings: f64, retail: f64) -> f64 {
    if retail > 0.0 {
        let pct = savings / retail * 100.0;
        if pct.is_finite() {
            pct
        } else {
            0.0
        }
    } else {
        0.0
    }
}

/// Format an amount with thousands separators and two decimals, prefixed
/// with the currency symbol (or the currency code when there is none).
pub fn format_currency(amount: f64, currency: &str) -> String {
    let amount = round_to(amount, 2);
    let negative = amount < 0.0;
    let fixed = format!("{:.2}", amount.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if negative { "-" } else { "" };
    format!("{}{}{}.{}", sign, currency_symbol(currency), grouped, cents)
}

fn currency_symbol(currency: &str) -> String {
    match currency.to_uppercase().as_str() {
        "USD" => "$".to_string(),
        "EUR" => "€".to_string(),
        "GBP" => "£".to_string(),
        other => format!("{} ", other),
    }
}

/// One decimal place, the presentation precision for percentages.
pub fn format_pct(value: f64) -> String {
    format!("{:.1}%", round_to(value, 1))
}
