pub mod health;
pub mod objects;
pub mod preview;
pub mod uploads;
