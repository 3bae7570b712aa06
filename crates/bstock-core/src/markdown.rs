use bstock_client::types::CheckResult;

pub fn header(level: usize, text: &str) -> String {
    let level = level.max(1);
    format!("{} {}", "#".repeat(level), text)
}

pub fn bold(label: &str, value: &str) -> String {
    format!("**{label}:** {value}")
}

/// One bullet summarising a stored result.
pub fn result_bullet(label: &str, result: &CheckResult) -> String {
    let mut line = format!("- **{label}**: {} ({})", result.message, result.status);
    if let Some(price) = &result.price {
        line.push_str(&format!(" · price {price}"));
        if result.price_changed {
            line.push_str(" (changed)");
        }
    }
    if let Some(price) = &result.b_stock_price {
        line.push_str(&format!(" · B-Stock {price}"));
        if result.b_stock_price_changed {
            line.push_str(" (changed)");
        }
    }
    line
}
