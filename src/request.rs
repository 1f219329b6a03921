use std::fmt;
use std::sync::Arc;

/// An immutable request flowing through the chain.
///
/// Cloning shares the identifier, so forwarding hands every stage the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Request {
    name: Arc<str>,
}

impl Request {
    /// Create a request with the given identifier
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self { name: name.into() }
    }

    /// The request identifier
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Request{{name='{}'}}", self.name)
    }
}

impl From<&str> for Request {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Request {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let request = Request::new("alpha");
        assert_eq!(request.to_string(), "Request{name='alpha'}");
    }

    #[test]
    fn test_clone_shares_identifier() {
        let request = Request::from("alpha");
        let forwarded = request.clone();
        assert_eq!(request, forwarded);
        assert!(Arc::ptr_eq(&request.name, &forwarded.name));
    }
}
