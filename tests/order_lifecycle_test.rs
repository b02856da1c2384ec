//! End-to-end tests for the order lifecycle against an in-memory SQLite store:
//! placement, staff status changes, payment confirmation and invoice mail.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use common::{admin, customer, order_request, TestApp, BASE_URL};
use mockall::mock;
use storefront_orders::{
    entities::order::{OrderStatus, PaymentMode, PaymentStatus},
    errors::ServiceError,
    notifications::{templates, NotificationStatus},
    repositories::CartStore,
    services::payment_sessions::OrderSessionRequest,
    services::orders::{
        INVOICE_SENT_MESSAGE, ORDER_DELIVERED_MESSAGE, ORDER_PLACED_MESSAGE,
        STATUS_CHANGED_MESSAGE,
    },
};
use uuid::Uuid;

mock! {
    pub Carts {}

    #[async_trait]
    impl CartStore for Carts {
        async fn clear_for_user(&self, user_id: Uuid) -> Result<u64, ServiceError>;
    }
}

#[tokio::test]
async fn cod_order_is_placed_with_invoice_email() {
    let app = TestApp::new().await;
    let buyer = customer("asha@example.com");

    let placed = app
        .orders
        .create(&buyer, order_request(&buyer, PaymentMode::CashOnDelivery))
        .await
        .expect("order placed");

    assert_eq!(placed.message, ORDER_PLACED_MESSAGE);
    assert_eq!(placed.order.order_status, OrderStatus::Placed);
    assert_eq!(placed.order.payment_status, PaymentStatus::Cod);
    assert_eq!(placed.order.payment_id, None);
    assert_eq!(placed.order.customer_email, "asha@example.com");
    assert!(Uuid::parse_str(&placed.order.order_id).is_ok());
    assert_eq!(placed.notification.status, NotificationStatus::Sent);

    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "asha@example.com");
    assert_eq!(sent[0].subject, templates::ORDER_PLACED_SUBJECT);
    assert!(sent[0].html_body.contains(&placed.order.order_id));
    assert!(sent[0].html_body.contains(&format!("{}/orders", BASE_URL)));
    assert!(sent[0].attachment.is_some());
}

#[tokio::test]
async fn online_order_waits_for_payment_before_mailing() {
    let app = TestApp::new().await;
    let buyer = customer("asha@example.com");

    let placed = app
        .orders
        .create(&buyer, order_request(&buyer, PaymentMode::Online))
        .await
        .unwrap();

    assert_eq!(placed.order.payment_status, PaymentStatus::Pending);
    assert_eq!(placed.notification.status, NotificationStatus::Skipped);
    assert!(app.mailer.sent().is_empty());
}

#[tokio::test]
async fn placing_an_order_empties_the_cart() {
    let app = TestApp::new().await;
    let buyer = customer("asha@example.com");
    let other = customer("ravi@example.com");
    app.seed_cart_item(buyer.user_id, "sku-kettle").await;
    app.seed_cart_item(other.user_id, "sku-toaster").await;

    app.orders
        .create(&buyer, order_request(&buyer, PaymentMode::Online))
        .await
        .unwrap();

    use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
    use storefront_orders::entities::cart_item;
    let remaining_for_buyer = cart_item::Entity::find()
        .filter(cart_item::Column::UserId.eq(buyer.user_id))
        .count(app.db.as_ref())
        .await
        .unwrap();
    let remaining_for_other = cart_item::Entity::find()
        .filter(cart_item::Column::UserId.eq(other.user_id))
        .count(app.db.as_ref())
        .await
        .unwrap();
    assert_eq!(remaining_for_buyer, 0);
    assert_eq!(remaining_for_other, 1);
}

#[tokio::test]
async fn cart_failure_does_not_undo_the_order() {
    let mut carts = MockCarts::new();
    carts
        .expect_clear_for_user()
        .times(1)
        .returning(|_| Err(ServiceError::InternalError("cart store down".into())));
    let app = TestApp::with_cart_store(Arc::new(carts)).await;
    let buyer = customer("asha@example.com");

    let placed = app
        .orders
        .create(&buyer, order_request(&buyer, PaymentMode::CashOnDelivery))
        .await
        .expect("order still placed");

    let stored = app.orders.get(&buyer, placed.order.id).await.unwrap();
    assert_eq!(stored.order_id, placed.order.order_id);
}

#[tokio::test]
async fn cart_is_cleared_for_the_order_owner() {
    let buyer = customer("asha@example.com");
    let owner = buyer.user_id;
    let mut carts = MockCarts::new();
    carts
        .expect_clear_for_user()
        .withf(move |user_id| *user_id == owner)
        .times(1)
        .returning(|_| Ok(2));
    let app = TestApp::with_cart_store(Arc::new(carts)).await;

    app.orders
        .create(&buyer, order_request(&buyer, PaymentMode::Online))
        .await
        .unwrap();
}

#[tokio::test]
async fn order_for_another_user_is_rejected() {
    let app = TestApp::new().await;
    let buyer = customer("asha@example.com");
    let someone_else = customer("ravi@example.com");

    app.seed_cart_item(someone_else.user_id, "sku-kettle").await;

    let result = app
        .orders
        .create(
            &buyer,
            order_request(&someone_else, PaymentMode::CashOnDelivery),
        )
        .await;

    assert_matches!(result, Err(ServiceError::Unauthorized(_)));

    let (stored, total) = app.orders.list_all(1, 10).await.unwrap();
    assert!(stored.is_empty());
    assert_eq!(total, 0);

    use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
    use storefront_orders::entities::cart_item;
    let cart_lines = cart_item::Entity::find()
        .filter(cart_item::Column::UserId.eq(someone_else.user_id))
        .count(app.db.as_ref())
        .await
        .unwrap();
    assert_eq!(cart_lines, 1);
    assert!(app.mailer.sent().is_empty());
}

#[tokio::test]
async fn invalid_order_payload_is_rejected() {
    let app = TestApp::new().await;
    let buyer = customer("asha@example.com");

    let mut request = order_request(&buyer, PaymentMode::Online);
    request.products.clear();
    assert_matches!(
        app.orders.create(&buyer, request).await,
        Err(ServiceError::ValidationError(_))
    );

    let mut request = order_request(&buyer, PaymentMode::Online);
    request.products[0].quantity = 0;
    assert_matches!(
        app.orders.create(&buyer, request).await,
        Err(ServiceError::ValidationError(_))
    );

    let mut request = order_request(&buyer, PaymentMode::Online);
    request.address.city = String::new();
    assert_matches!(
        app.orders.create(&buyer, request).await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn caller_without_email_cannot_place_orders() {
    let app = TestApp::new().await;
    let mut buyer = customer("asha@example.com");
    buyer.email = None;

    let result = app
        .orders
        .create(&buyer, order_request(&buyer, PaymentMode::Online))
        .await;

    assert_matches!(result, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn status_change_mails_the_owner() {
    let app = TestApp::new().await;
    let buyer = customer("asha@example.com");
    let placed = app
        .orders
        .create(&buyer, order_request(&buyer, PaymentMode::Online))
        .await
        .unwrap();

    let changed = app
        .orders
        .transition(placed.order.id, "Out-for-Delivery")
        .await
        .unwrap();

    assert_eq!(changed.message, STATUS_CHANGED_MESSAGE);
    assert_eq!(changed.order.order_status, OrderStatus::OutForDelivery);
    assert_eq!(changed.order.payment_status, PaymentStatus::Pending);

    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "asha@example.com");
    assert_eq!(sent[0].subject, templates::STATUS_UPDATED_SUBJECT);
    assert!(sent[0].html_body.contains("Out for Delivery"));
    assert!(sent[0].attachment.is_none());
}

#[tokio::test]
async fn delivery_settles_payment_and_attaches_invoice() {
    let app = TestApp::new().await;
    let buyer = customer("asha@example.com");
    let placed = app
        .orders
        .create(&buyer, order_request(&buyer, PaymentMode::CashOnDelivery))
        .await
        .unwrap();

    let delivered = app
        .orders
        .transition(placed.order.id, "delivered")
        .await
        .unwrap();

    assert_eq!(delivered.message, ORDER_DELIVERED_MESSAGE);
    assert_eq!(delivered.order.order_status, OrderStatus::Delivered);
    assert_eq!(delivered.order.payment_status, PaymentStatus::Success);

    let sent = app.mailer.sent();
    let last = sent.last().unwrap();
    assert_eq!(last.subject, templates::ORDER_DELIVERED_SUBJECT);
    assert!(last.attachment.is_some());
}

#[tokio::test]
async fn unknown_status_and_missing_order_are_rejected() {
    let app = TestApp::new().await;
    let buyer = customer("asha@example.com");
    let placed = app
        .orders
        .create(&buyer, order_request(&buyer, PaymentMode::Online))
        .await
        .unwrap();

    assert_matches!(
        app.orders.transition(placed.order.id, "Shipped").await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        app.orders.transition(Uuid::new_v4(), "Processing").await,
        Err(ServiceError::NotFound(_))
    );

    let unchanged = app.orders.get(&buyer, placed.order.id).await.unwrap();
    assert_eq!(unchanged.order_status, OrderStatus::Placed);
}

#[tokio::test]
async fn failed_email_still_commits_the_status_change() {
    let app = TestApp::new().await;
    let buyer = customer("asha@example.com");
    let placed = app
        .orders
        .create(&buyer, order_request(&buyer, PaymentMode::Online))
        .await
        .unwrap();
    app.mailer.fail_next_sends(true);

    let changed = app
        .orders
        .transition(placed.order.id, "Processing")
        .await
        .unwrap();

    assert_eq!(changed.notification.status, NotificationStatus::Failed);
    assert!(changed.notification.is_degraded());
    let stored = app.orders.get(&buyer, placed.order.id).await.unwrap();
    assert_eq!(stored.order_status, OrderStatus::Processing);
}

#[tokio::test]
async fn confirm_marks_payment_and_mails_invoice() {
    let app = TestApp::new().await;
    let buyer = customer("asha@example.com");
    let placed = app
        .orders
        .create(&buyer, order_request(&buyer, PaymentMode::Online))
        .await
        .unwrap();
    app.processor
        .insert_paid_session("cs_paid_1", Some(&placed.order.order_id));

    let confirmed = app.orders.confirm(&buyer, "cs_paid_1").await.unwrap();

    assert_eq!(confirmed.payment_status.as_deref(), Some("paid"));
    assert_eq!(
        confirmed.metadata.get("orderID").map(String::as_str),
        Some(placed.order.order_id.as_str())
    );
    assert_eq!(confirmed.order.payment_status, PaymentStatus::Success);
    assert_eq!(confirmed.order.payment_id.as_deref(), Some("cs_paid_1"));
    assert_eq!(confirmed.order.order_status, OrderStatus::Placed);

    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, templates::PAYMENT_INVOICE_SUBJECT);
    assert!(sent[0].html_body.contains("Thank you for payment"));
    assert!(sent[0].attachment.is_some());
}

#[tokio::test]
async fn confirming_twice_resends_the_invoice() {
    let app = TestApp::new().await;
    let buyer = customer("asha@example.com");
    let placed = app
        .orders
        .create(&buyer, order_request(&buyer, PaymentMode::Online))
        .await
        .unwrap();
    app.processor
        .insert_paid_session("cs_paid_2", Some(&placed.order.order_id));

    let first = app.orders.confirm(&buyer, "cs_paid_2").await.unwrap();
    let second = app.orders.confirm(&buyer, "cs_paid_2").await.unwrap();

    assert_eq!(first.order.payment_status, second.order.payment_status);
    assert_eq!(second.order.payment_id.as_deref(), Some("cs_paid_2"));
    assert_eq!(app.mailer.sent().len(), 2);
}

#[tokio::test]
async fn confirm_of_unknown_or_unlinked_session_is_not_found() {
    let app = TestApp::new().await;
    let buyer = customer("asha@example.com");
    app.processor.insert_paid_session("cs_unlinked", None);
    app.processor
        .insert_paid_session("cs_dangling", Some("no-such-order"));

    assert_matches!(
        app.orders.confirm(&buyer, "cs_missing").await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        app.orders.confirm(&buyer, "cs_unlinked").await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        app.orders.confirm(&buyer, "cs_dangling").await,
        Err(ServiceError::NotFound(_))
    );
    assert!(app.mailer.sent().is_empty());
}

#[tokio::test]
async fn invoice_goes_to_the_requesting_admin() {
    let app = TestApp::new().await;
    let buyer = customer("asha@example.com");
    let staff = admin();
    let placed = app
        .orders
        .create(&buyer, order_request(&buyer, PaymentMode::Online))
        .await
        .unwrap();

    let mailed = app.orders.mail_invoice(&staff, placed.order.id).await.unwrap();

    assert_eq!(mailed.message, INVOICE_SENT_MESSAGE);
    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "admin@shop.test");
    assert_eq!(sent[0].subject, templates::REQUESTED_INVOICE_SUBJECT);
    assert!(sent[0].attachment.is_some());
}

#[tokio::test]
async fn strangers_cannot_read_or_mail_an_order() {
    let app = TestApp::new().await;
    let buyer = customer("asha@example.com");
    let stranger = customer("mallory@example.com");
    let placed = app
        .orders
        .create(&buyer, order_request(&buyer, PaymentMode::Online))
        .await
        .unwrap();

    assert_matches!(
        app.orders.get(&stranger, placed.order.id).await,
        Err(ServiceError::Unauthorized(_))
    );
    assert_matches!(
        app.orders.mail_invoice(&stranger, placed.order.id).await,
        Err(ServiceError::Unauthorized(_))
    );
    assert!(app.mailer.sent().is_empty());
}

#[tokio::test]
async fn confirming_an_unpaid_session_changes_nothing() {
    let app = TestApp::new().await;
    app.seed_charges().await;
    let buyer = customer("asha@example.com");
    let placed = app
        .orders
        .create(&buyer, order_request(&buyer, PaymentMode::Online))
        .await
        .unwrap();

    let handle = app
        .gateway
        .create_order_session(
            &buyer,
            OrderSessionRequest {
                order_id: placed.order.order_id.clone(),
            },
        )
        .await
        .unwrap();

    assert_matches!(
        app.orders.confirm(&buyer, &handle.id).await,
        Err(ServiceError::ValidationError(_))
    );

    let stored = app.orders.get(&buyer, placed.order.id).await.unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Pending);
    assert_eq!(stored.payment_id, None);
    assert!(app.mailer.sent().is_empty());
}
