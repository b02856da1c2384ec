use crate::entities::order::OrderStatus;

pub const ORDER_PLACED_SUBJECT: &str = "Your order has been placed successfully.";
pub const STATUS_UPDATED_SUBJECT: &str = "Your order's status has been updated.";
pub const ORDER_DELIVERED_SUBJECT: &str = "Your order has been delivered.";
pub const PAYMENT_INVOICE_SUBJECT: &str = "Your payment invoice";
pub const REQUESTED_INVOICE_SUBJECT: &str = "Order Invoice";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailTemplate {
    pub subject: String,
    pub html_body: String,
}

fn order_body(order_id: &str, outcome: &str, base_url: &str) -> String {
    let link = format!("{}/orders", base_url.trim_end_matches('/'));
    format!(
        "<p>Dear User, </p>\
         <p>Your order with OrderID: {}, has been {}.</p>\
         <p><a href=\"{}\">Click Here</a> to check out the details.</p>\
         <p>Have a good day.</p>\
         <p>Thank you.</p>",
        order_id, outcome, link
    )
}

pub fn order_placed(order_id: &str, base_url: &str) -> EmailTemplate {
    EmailTemplate {
        subject: ORDER_PLACED_SUBJECT.to_string(),
        html_body: order_body(order_id, "placed successfully", base_url),
    }
}

pub fn status_updated(order_id: &str, status: OrderStatus, base_url: &str) -> EmailTemplate {
    EmailTemplate {
        subject: STATUS_UPDATED_SUBJECT.to_string(),
        html_body: order_body(order_id, status.label(), base_url),
    }
}

pub fn order_delivered(order_id: &str, base_url: &str) -> EmailTemplate {
    EmailTemplate {
        subject: ORDER_DELIVERED_SUBJECT.to_string(),
        html_body: order_body(order_id, OrderStatus::Delivered.label(), base_url),
    }
}

pub fn payment_invoice() -> EmailTemplate {
    EmailTemplate {
        subject: PAYMENT_INVOICE_SUBJECT.to_string(),
        html_body: "Thank you for payment".to_string(),
    }
}

pub fn requested_invoice() -> EmailTemplate {
    EmailTemplate {
        subject: REQUESTED_INVOICE_SUBJECT.to_string(),
        html_body: "Here's your requested invoice.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_email_names_order_and_label() {
        let email = status_updated("ord-9", OrderStatus::OutForDelivery, "https://shop.test/");
        assert_eq!(email.subject, "Your order's status has been updated.");
        assert!(email
            .html_body
            .contains("Your order with OrderID: ord-9, has been Out for Delivery."));
        assert!(email.html_body.contains("href=\"https://shop.test/orders\""));
    }

    #[test]
    fn delivered_and_placed_subjects_differ() {
        assert_eq!(
            order_delivered("o", "http://x").subject,
            "Your order has been delivered."
        );
        let placed = order_placed("o", "http://x");
        assert_eq!(placed.subject, "Your order has been placed successfully.");
        assert!(placed.html_body.contains("has been placed successfully."));
    }
}
