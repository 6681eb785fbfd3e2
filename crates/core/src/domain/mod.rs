pub mod notification;
pub mod policy;
pub mod ticket;
pub mod viewer;
