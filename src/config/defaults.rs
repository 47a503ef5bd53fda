//! Default values for configuration

/// Default number of records staged per transaction
pub fn default_batch_size() -> usize {
    100
}

/// Default TCP connect timeout for feed downloads (seconds)
pub fn default_connect_timeout() -> u64 {
    30
}

/// Default overall request timeout for feed downloads (seconds)
pub fn default_request_timeout() -> u64 {
    300
}

/// Default user agent string for feed downloads
pub fn default_user_agent() -> String {
    format!("stockroom/{}", env!("CARGO_PKG_VERSION"))
}

/// Suppliers are enabled unless configured otherwise
pub fn default_supplier_enabled() -> bool {
    true
}
