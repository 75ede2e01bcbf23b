mod http;
pub mod telegram;

pub use http::Console;
