//! Browser drivers implementing the capability surface.

mod chrome;
pub mod config;

pub use chrome::ChromeDriver;
pub use config::ChromeConfig;
