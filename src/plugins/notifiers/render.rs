use rust_decimal::Decimal;
use std::fmt::Write;

use crate::models::{
    AlertEvent, ChangeType, ErrorKind, FailureDigest, FailureStreakAlert, PriceChangeAlert, Trend, WeeklySummary,
};

/// A fully formatted message, ready for any transport.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    pub subject: String,
    pub text: String,
    pub html: String,
}

pub fn render(event: &AlertEvent, currency_symbol: &str) -> RenderedMessage {
    match event {
        AlertEvent::PriceChange(alert) => render_price_change(alert, currency_symbol),
        AlertEvent::FailureStreak(alert) => render_failure_streak(alert),
        AlertEvent::FailureDigest(digest) => render_failure_digest(digest),
        AlertEvent::WeeklySummary(summary) => render_weekly_summary(summary, currency_symbol),
    }
}

pub fn describe_error(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::NotFound => "The page no longer exists. The item may have been sold or the listing removed.",
        ErrorKind::Gone => "The listing has been permanently removed.",
        ErrorKind::Forbidden => "Access to the page was denied. The site may be blocking automated access.",
        ErrorKind::RateLimited => "The site is rate limiting requests.",
        ErrorKind::ServerError => "The website is experiencing server errors.",
        ErrorKind::Timeout => "The website took too long to respond.",
        ErrorKind::ConnectionRefused => "Unable to connect to the website.",
        ErrorKind::ConnectionReset => "The website reset the connection.",
        ErrorKind::ParseError => "The page structure has changed and the price cannot be extracted.",
        ErrorKind::Unknown => "An unknown error occurred.",
    }
}

/// `£12,500` or `£1,299.99`; negative amounts get a leading `-`.
pub fn format_money(symbol: &str, amount: Decimal) -> String {
    let rounded = amount.abs().round_dp(2);
    let digits = if rounded.fract().is_zero() {
        rounded.trunc().to_string()
    } else {
        format!("{:.2}", rounded)
    };

    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (digits.as_str(), None),
    };

    let sign = if amount.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    match fraction {
        Some(fraction) => format!("{}{}{}.{}", sign, symbol, group_thousands(whole), fraction),
        None => format!("{}{}{}", sign, symbol, group_thousands(whole)),
    }
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn signed_money(symbol: &str, amount: Decimal) -> String {
    if amount > Decimal::ZERO {
        format!("+{}", format_money(symbol, amount))
    } else {
        format_money(symbol, amount)
    }
}

fn render_price_change(alert: &PriceChangeAlert, symbol: &str) -> RenderedMessage {
    let dropped = alert.change.change_type == ChangeType::Decreased;
    let (icon, verb, colour) = if dropped {
        ("📉", "DROPPED", "#28a745")
    } else {
        ("📈", "INCREASED", "#dc3545")
    };

    let subject = format!("{} Price {}: {}", icon, verb, alert.item.name);
    let difference = signed_money(symbol, alert.change.difference);
    let percent = alert
        .change
        .percent_change
        .map(|p| format!(" ({:.1}%)", p.abs()))
        .unwrap_or_default();

    let mut text = String::new();
    let _ = writeln!(text, "Price {}!\n", verb);
    let _ = writeln!(text, "{}", alert.item.name);
    let _ = writeln!(text, "Old price: {}", format_money(symbol, alert.previous_price));
    let _ = writeln!(text, "New price: {}", format_money(symbol, alert.new_price));
    let _ = writeln!(text, "Change: {}{}", difference, percent);
    if let Some(mileage) = alert.mileage {
        let _ = writeln!(text, "Mileage: {} miles", group_thousands(&mileage.to_string()));
    }
    if let Some(description) = &alert.description {
        let _ = writeln!(text, "Listing: {}", description);
    }
    let _ = writeln!(text, "\nView listing: {}", alert.item.url);

    let mut html = String::new();
    let _ = write!(
        html,
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px;">
<h2 style="color: {colour};">Price {verb}!</h2>
<div style="background-color: #f8f9fa; padding: 20px; border-radius: 5px;">
<h3 style="margin-top: 0;">{name}</h3>
<p><strong>Old Price:</strong> <span style="text-decoration: line-through;">{old}</span></p>
<p style="color: {colour};"><strong>New Price:</strong> {new}</p>
<p style="color: {colour};"><strong>Change:</strong> {difference}{percent}</p>
"#,
        colour = colour,
        verb = verb,
        name = escape_html(&alert.item.name),
        old = format_money(symbol, alert.previous_price),
        new = format_money(symbol, alert.new_price),
        difference = difference,
        percent = percent,
    );
    if let Some(mileage) = alert.mileage {
        let _ = writeln!(html, "<p><strong>Mileage:</strong> {} miles</p>", group_thousands(&mileage.to_string()));
    }
    let _ = write!(
        html,
        r#"</div>
<p><a href="{url}">View listing</a></p>
</div>"#,
        url = escape_html(&alert.item.url),
    );

    RenderedMessage { subject, text, html }
}

fn render_failure_streak(alert: &FailureStreakAlert) -> RenderedMessage {
    let subject = format!("⚠️ Alert: {} may no longer be available", alert.item.name);
    let explanation = describe_error(alert.error_kind);

    let mut text = String::new();
    let _ = writeln!(text, "{}\n", alert.item.name);
    let _ = writeln!(
        text,
        "Status: failed to check price on {} consecutive runs",
        alert.consecutive_failures
    );
    let _ = writeln!(text, "Error: {} - {}", alert.error_kind, explanation);
    let _ = writeln!(text, "Details: {}", alert.message);
    let _ = writeln!(text, "\nView listing: {}", alert.item.url);

    let html = format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px;">
<h2 style="color: #dc3545;">⚠️ Item Unavailable</h2>
<div style="background-color: #fff3cd; border-left: 4px solid #ffc107; padding: 15px;">
<h3 style="margin-top: 0;">{name}</h3>
<p><strong>Status:</strong> Failed to check price on {count} consecutive runs</p>
<p><strong>Error:</strong> {kind}</p>
<p>{explanation}</p>
<p><small>{message}</small></p>
</div>
<p><a href="{url}">View listing</a></p>
</div>"#,
        name = escape_html(&alert.item.name),
        count = alert.consecutive_failures,
        kind = alert.error_kind,
        explanation = explanation,
        message = escape_html(&alert.message),
        url = escape_html(&alert.item.url),
    );

    RenderedMessage { subject, text, html }
}

fn render_failure_digest(digest: &FailureDigest) -> RenderedMessage {
    let subject = format!(
        "⚠️ Daily failure summary: {} issue(s) across {} item(s)",
        digest.total_failures(),
        digest.items.len()
    );

    let mut text = String::new();
    let mut html = String::from(r#"<div style="font-family: Arial, sans-serif; max-width: 600px;"><h2>Daily Failure Summary</h2>"#);

    let _ = writeln!(
        text,
        "Total failures: {} issue(s) across {} item(s) since {}\n",
        digest.total_failures(),
        digest.items.len(),
        digest.since.format("%Y-%m-%d %H:%M UTC")
    );

    for item in &digest.items {
        let name = item.item_name.as_deref().unwrap_or(&item.item_url);
        let (Some(latest), Some(first)) = (item.failures.first(), item.failures.last()) else {
            continue;
        };

        let _ = writeln!(text, "{}", name);
        let _ = writeln!(text, "  Error: {}", describe_error(latest.error_kind));
        let _ = writeln!(text, "  Occurrences: {}", item.failures.len());
        let _ = writeln!(text, "  First failure: {}", first.failed_at.format("%Y-%m-%d %H:%M UTC"));
        let _ = writeln!(text, "  {}\n", item.item_url);

        let _ = write!(
            html,
            r#"<div style="border-left: 4px solid #dc3545; padding: 10px; margin: 10px 0;">
<h3 style="margin-top: 0;">{name}</h3>
<p><strong>Error:</strong> {error}</p>
<p><strong>Occurrences:</strong> {count} time(s)</p>
<p><strong>First failure:</strong> {first}</p>
<p><a href="{url}">View listing</a></p>
</div>"#,
            name = escape_html(name),
            error = describe_error(latest.error_kind),
            count = item.failures.len(),
            first = first.failed_at.format("%Y-%m-%d %H:%M UTC"),
            url = escape_html(&item.item_url),
        );
    }

    text.push_str("Check each listing to see if it is still available. Site errors usually resolve themselves.\n");
    html.push_str("<p>Check each listing to see if it is still available. Site errors usually resolve themselves.</p></div>");

    RenderedMessage { subject, text, html }
}

fn render_weekly_summary(summary: &WeeklySummary, symbol: &str) -> RenderedMessage {
    let subject = format!("📈 Weekly Summary - {} change(s)", summary.changed_items());

    let mut text = String::new();
    let mut html = String::from(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px;"><h2>Weekly Price Summary</h2><table style="width: 100%; border-collapse: collapse;">"#,
    );

    let _ = writeln!(text, "Weekly summary for week ending {}\n", summary.generated_at.format("%Y-%m-%d"));

    for trend in &summary.items {
        let icon = match trend.trend {
            Trend::Down => "📉",
            Trend::Up => "📈",
            Trend::Stable => "➡️",
        };
        let change = if trend.difference == Decimal::ZERO {
            "No change".to_string()
        } else {
            signed_money(symbol, trend.difference)
        };

        let _ = writeln!(
            text,
            "{} {}: {} ({}, {} check(s), {} price change(s))",
            icon,
            trend.item.name,
            format_money(symbol, trend.current_price),
            change,
            trend.checks_this_week,
            trend.price_changes
        );

        let _ = write!(
            html,
            r#"<tr><td>{icon}</td><td><a href="{url}">{name}</a></td><td>{price}</td><td>{change}</td></tr>"#,
            icon = icon,
            url = escape_html(&trend.item.url),
            name = escape_html(&trend.item.name),
            price = format_money(symbol, trend.current_price),
            change = change,
        );
    }
    html.push_str("</table>");

    if let Some(drop) = summary.biggest_drop() {
        let _ = writeln!(text, "\nBiggest drop: {} ({})", drop.item.name, signed_money(symbol, drop.difference));
        let _ = write!(
            html,
            "<p><strong>Biggest drop:</strong> {} ({})</p>",
            escape_html(&drop.item.name),
            signed_money(symbol, drop.difference)
        );
    }
    if let Some(increase) = summary.biggest_increase() {
        let _ = writeln!(
            text,
            "Biggest increase: {} ({})",
            increase.item.name,
            signed_money(symbol, increase.difference)
        );
        let _ = write!(
            html,
            "<p><strong>Biggest increase:</strong> {} ({})</p>",
            escape_html(&increase.item.name),
            signed_money(symbol, increase.difference)
        );
    }
    if summary.changed_items() == 0 {
        text.push_str("\nNo price changes this week.\n");
        html.push_str("<p>No price changes this week.</p>");
    }

    if !summary.persistent_failures.is_empty() {
        text.push_str("\nItems failing for over a week:\n");
        html.push_str("<h3>Items failing for over a week</h3><ul>");
        for failure in &summary.persistent_failures {
            let _ = writeln!(
                text,
                "  {} - {} failure(s) since {}",
                failure.item_url,
                failure.failure_count,
                failure.first_failure.format("%Y-%m-%d")
            );
            let _ = write!(
                html,
                "<li>{} - {} failure(s) since {}</li>",
                escape_html(&failure.item_url),
                failure.failure_count,
                failure.first_failure.format("%Y-%m-%d")
            );
        }
        html.push_str("</ul>");
    }
    html.push_str("</div>");

    RenderedMessage { subject, text, html }
}
