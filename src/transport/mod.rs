//! Outbound-call capability.
//!
//! The registry never speaks a wire protocol itself. Callers hand it a
//! `ServiceCaller`; it only consumes success/failure plus elapsed time.

pub mod http;

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

pub use http::{HttpCaller, HttpProbe};

/// What one outbound call produced.
#[derive(Debug)]
pub struct CallReport<T, E> {
    pub elapsed: Duration,
    pub result: Result<T, E>,
}

/// Performs a request against one instance URL.
pub trait ServiceCaller: Send + Sync {
    type Response: Send;
    type Error: Display + Send;

    fn call(&self, url: &str)
        -> impl Future<Output = CallReport<Self::Response, Self::Error>> + Send;
}
