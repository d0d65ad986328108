use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Durable key-value storage capability. Values are opaque bytes; the
/// core serializes JSON into them. Reads and writes are both answered so
/// persistence failures can be logged without ever blocking a flow.
#[derive(Clone)]
pub struct KeyValue<E> {
    context: CapabilityContext<KvOperation, E>,
}

impl<Ev> Capability<Ev> for KeyValue<Ev> {
    type Operation = KvOperation;
    type MappedSelf<MappedEv> = KeyValue<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        KeyValue::new(self.context.map_event(f))
    }
}

impl<E> KeyValue<E>
where
    E: 'static,
{
    pub fn new(context: CapabilityContext<KvOperation, E>) -> Self {
        Self { context }
    }

    pub fn get<F>(&self, key: &str, callback: F)
    where
        F: FnOnce(KvResult) -> E + Send + 'static,
    {
        self.request(KvOperation::Get { key: key.into() }, callback);
    }

    pub fn set<F>(&self, key: &str, value: Vec<u8>, callback: F)
    where
        F: FnOnce(KvResult) -> E + Send + 'static,
    {
        self.request(
            KvOperation::Set {
                key: key.into(),
                value,
            },
            callback,
        );
    }

    fn request<F>(&self, operation: KvOperation, callback: F)
    where
        F: FnOnce(KvResult) -> E + Send + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let response = context.request_from_shell(operation).await;
            context.update_app(callback(response));
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KvOperation {
    Get {
        key: String,
    },
    Set {
        key: String,
        #[serde(with = "serde_bytes")]
        value: Vec<u8>,
    },
}

impl Operation for KvOperation {
    type Output = KvResult;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KvOutput {
    Value(#[serde(with = "serde_bytes")] Vec<u8>),
    Written,
}

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum KvError {
    #[error("key not found")]
    NotFound,
    #[error("invalid key: {reason}")]
    InvalidKey { reason: String },
    #[error("storage error: {message}")]
    Storage { message: String },
}

pub type KvResult = Result<KvOutput, KvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kv_output_round_trips_through_json() {
        let output = KvOutput::Value(vec![1, 2, 3]);
        let json = serde_json::to_string(&output).unwrap();
        let back: KvOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(back, output);
    }

    #[test]
    fn test_not_found_is_distinguishable_from_storage_failure() {
        assert_ne!(
            KvError::NotFound,
            KvError::Storage {
                message: "disk full".into()
            }
        );
    }
}
