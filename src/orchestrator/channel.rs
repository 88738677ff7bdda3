//! Externally managed secure channel (TLS context).

/// Implemented by the embedding application's TLS layer.
pub trait SecureChannel: Send + Sync {
    fn is_established(&self) -> bool;

    fn describe(&self) -> String {
        "external secure channel".to_string()
    }
}

/// A channel whose state is fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct StaticChannel(pub bool);

impl SecureChannel for StaticChannel {
    fn is_established(&self) -> bool {
        self.0
    }

    fn describe(&self) -> String {
        format!("static channel (established: {})", self.0)
    }
}
