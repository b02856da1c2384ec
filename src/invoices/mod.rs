//! Invoice documents attached to order emails.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::fmt::Write;
use thiserror::Error;

use crate::entities::order;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedInvoice {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum InvoiceError {
    #[error("Invoice rendering failed: {0}")]
    Render(String),
}

impl From<std::fmt::Error> for InvoiceError {
    fn from(err: std::fmt::Error) -> Self {
        InvoiceError::Render(err.to_string())
    }
}

/// Renders an order into a document byte stream.
#[async_trait]
pub trait InvoiceRenderer: Send + Sync {
    async fn render(&self, order: &order::Model) -> Result<RenderedInvoice, InvoiceError>;
}

/// Self-contained HTML invoice
#[derive(Debug, Clone, Default)]
pub struct HtmlInvoiceRenderer {
    store_name: String,
}

impl HtmlInvoiceRenderer {
    pub fn new(store_name: impl Into<String>) -> Self {
        Self {
            store_name: store_name.into(),
        }
    }

    pub fn render_html(&self, order: &order::Model) -> Result<String, InvoiceError> {
        let address = order.shipping_address();
        let mut html = String::with_capacity(2048);

        writeln!(html, "<!DOCTYPE html>")?;
        writeln!(
            html,
            "<html><head><meta charset=\"utf-8\"><title>Invoice {}</title></head><body>",
            escape_html(&order.order_id)
        )?;
        writeln!(html, "<h1>{}</h1>", escape_html(&self.store_name))?;
        writeln!(
            html,
            "<p>Invoice for order <strong>{}</strong><br>Placed on {}</p>",
            escape_html(&order.order_id),
            order.created_at.format("%d %b %Y %H:%M UTC")
        )?;
        writeln!(
            html,
            "<p>Ship to:<br>{} {}<br>{}<br>{}, {} {}<br>Phone: {}</p>",
            escape_html(&address.first_name),
            escape_html(&address.last_name),
            escape_html(&address.street),
            escape_html(&address.city),
            escape_html(&address.state),
            escape_html(&address.postal_code),
            escape_html(&address.phone)
        )?;

        writeln!(
            html,
            "<table><thead><tr><th>Product</th><th>Qty</th><th>Unit price</th><th>Amount</th></tr></thead><tbody>"
        )?;
        for line in &order.products.0 {
            let amount = line.price * Decimal::from(line.quantity);
            writeln!(
                html,
                "<tr><td>{}</td><td>{}</td><td>{:.2}</td><td>{:.2}</td></tr>",
                escape_html(&line.name),
                line.quantity,
                line.price,
                amount
            )?;
        }
        writeln!(html, "</tbody></table>")?;

        writeln!(
            html,
            "<p>Subtotal: {:.2}</p><p>Payment: {} ({})</p><p>Status: {}</p>",
            order.total_amount,
            match order.payment_mode {
                order::PaymentMode::CashOnDelivery => "Cash on delivery",
                order::PaymentMode::Online => "Online",
            },
            order.payment_status,
            order.order_status
        )?;
        writeln!(html, "</body></html>")?;

        Ok(html)
    }
}

#[async_trait]
impl InvoiceRenderer for HtmlInvoiceRenderer {
    async fn render(&self, order: &order::Model) -> Result<RenderedInvoice, InvoiceError> {
        let html = self.render_html(order)?;
        Ok(RenderedInvoice {
            filename: format!("invoice-{}.html", order.order_id),
            content_type: "text/html; charset=utf-8".to_string(),
            bytes: html.into_bytes(),
        })
    }
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
