//! HTTP request handlers shared by Eventgram services.

pub mod health;

pub use health::health_check;
