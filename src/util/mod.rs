//! Utility functions shared by the store and the command-line surface.

mod url_validator;

pub use url_validator::{validate_feed_url, UrlValidationError};
