pub mod cache;
pub mod decisions;
pub mod health;
pub mod tick;
