pub mod cart;
pub mod coupon;
pub mod discount;
pub mod redemption;
