pub mod badge;
pub mod controller;
mod schedule;

pub use badge::Badge;
pub use controller::StatsController;
