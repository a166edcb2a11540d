pub mod docker;
pub mod health;
pub mod nginx;
