pub mod events;
pub mod garments;
pub mod images;
pub mod local;
pub mod models;
pub mod options;
pub mod panels;
pub mod transfer;
