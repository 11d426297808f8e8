//! Printable invoice documents.

use std::fmt::Write;

use domain::{Customer, Invoice, Order, Payment, PaymentStatus};

use crate::error::Result;

/// Renders `invoice` as a standalone HTML page.
///
/// All text coming from stored data is escaped.
pub fn invoice_html(
    invoice: &Invoice,
    order: Option<&Order>,
    customer: Option<&Customer>,
    payments: &[Payment],
) -> Result<String> {
    let number = escape(&invoice.invoice_number.to_string());
    let mut html = String::with_capacity(2048);

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    let _ = writeln!(html, "<title>Invoice {number}</title>");
    html.push_str(STYLE);
    html.push_str("</head>\n<body>\n");

    let _ = writeln!(html, "<h1>Invoice {number}</h1>");
    html.push_str("<table class=\"meta\">\n");
    meta_row(&mut html, "Status", invoice.status().as_str());
    meta_row(&mut html, "Issue date", &invoice.issue_date.format("%Y-%m-%d").to_string());
    meta_row(&mut html, "Due date", &invoice.due_date.format("%Y-%m-%d").to_string());
    if let Some(paid) = invoice.paid_date() {
        meta_row(&mut html, "Paid on", &paid.format("%Y-%m-%d").to_string());
    }
    if let Some(order) = order {
        meta_row(&mut html, "Order", &order.order_number.to_string());
    }
    html.push_str("</table>\n");

    if let Some(customer) = customer {
        html.push_str("<address>\n");
        let _ = writeln!(html, "<strong>{}</strong><br>", escape(&customer.full_name()));
        let _ = writeln!(html, "{}<br>", escape(customer.email.as_str()));
        for part in [&customer.address, &customer.postal_code, &customer.city, &customer.country]
            .into_iter()
            .flatten()
        {
            let _ = writeln!(html, "{}<br>", escape(part));
        }
        html.push_str("</address>\n");
    }

    html.push_str("<table class=\"lines\">\n<thead><tr><th>Description</th><th>Qty</th><th>Unit price</th><th>Total</th></tr></thead>\n<tbody>\n");
    for line in invoice.lines() {
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td></tr>",
            escape(&line.description),
            line.quantity(),
            escape(&line.unit_price().to_string()),
            escape(&line.total().to_string()),
        );
    }
    html.push_str("</tbody>\n<tfoot>\n");
    total_row(&mut html, "Net", &invoice.net_amount().to_string());
    total_row(&mut html, "Tax", &invoice.tax_amount().to_string());
    total_row(&mut html, "Total", &invoice.total_amount().to_string());
    let paid = invoice.amount_paid(payments)?;
    if !paid.is_zero() {
        total_row(&mut html, "Paid", &paid.to_string());
        total_row(
            &mut html,
            "Balance due",
            &invoice.total_amount().subtract(paid)?.to_string(),
        );
    }
    html.push_str("</tfoot>\n</table>\n");

    let completed: Vec<_> = payments
        .iter()
        .filter(|p| p.status == PaymentStatus::Completed)
        .collect();
    if !completed.is_empty() {
        html.push_str("<h2>Payments</h2>\n<ul>\n");
        for payment in completed {
            let _ = writeln!(
                html,
                "<li>{} {} ({})</li>",
                payment.payment_date.format("%Y-%m-%d"),
                escape(&payment.amount().to_string()),
                payment.method.as_str(),
            );
        }
        html.push_str("</ul>\n");
    }

    if let Some(notes) = &invoice.notes {
        let _ = writeln!(html, "<p class=\"notes\">{}</p>", escape(notes));
    }
    html.push_str("</body>\n</html>\n");
    Ok(html)
}

const STYLE: &str = "<style>\
body{font-family:sans-serif;margin:2em}\
table{border-collapse:collapse}\
.lines{width:100%;margin-top:1em}\
.lines th,.lines td{border-bottom:1px solid #ddd;padding:4px 8px;text-align:left}\
.num{text-align:right}\
.meta th{text-align:left;padding-right:1em}\
</style>\n";

fn meta_row(html: &mut String, label: &str, value: &str) {
    let _ = writeln!(html, "<tr><th>{label}</th><td>{}</td></tr>", escape(value));
}

fn total_row(html: &mut String, label: &str, value: &str) {
    let _ = writeln!(
        html,
        "<tr><th colspan=\"3\">{label}</th><td class=\"num\">{}</td></tr>",
        escape(value)
    );
}

fn escape(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
