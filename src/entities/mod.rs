pub mod cart_item;
pub mod charge;
pub mod order;
pub mod subscription;
