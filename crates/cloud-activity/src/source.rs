//! Where the tracker reads operation status from
//!
//! Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
//! (`Arc<dyn OperationSource>`), so tests can script observations without
//! a server.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Result;
use crate::operation::{Operation, OperationKind};
use crate::transport::ApiTransport;

/// Fetch the current representation of an operation. `Ok(None)` means the
/// backend does not know the id.
pub trait OperationSource: Send + Sync {
    fn fetch<'a>(
        &'a self,
        kind: OperationKind,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Operation>>> + Send + 'a>>;
}

/// Status endpoints over the authenticated transport.
pub struct HttpOperationSource {
    transport: Arc<ApiTransport>,
}

impl HttpOperationSource {
    pub fn new(transport: Arc<ApiTransport>) -> Self {
        Self { transport }
    }
}

impl OperationSource for HttpOperationSource {
    fn fetch<'a>(
        &'a self,
        kind: OperationKind,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Operation>>> + Send + 'a>> {
        Box::pin(async move {
            let fetched: Option<Operation> = self
                .transport
                .get_json(&kind.status_path(id), &[])
                .await?;
            Ok(fetched.map(|mut operation| {
                if operation.id.is_empty() {
                    operation.id = id.to_string();
                }
                operation
            }))
        })
    }
}
