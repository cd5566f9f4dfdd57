//! Keychain Gate
//!
//! Builtin transformers flagged with a keychain role go through this gate:
//! service and account must be non-empty, and values read out of the
//! keychain are tainted as secret material before they reach user code.

use std::sync::Arc;

use crate::env::variable::KeychainFunction;
use crate::interpreter::errors::MlldError;
use crate::values::{SecurityDescriptor, StructuredValue};

/// Host-provided keychain backend.
pub trait Keychain: Send + Sync {
    fn get(&self, service: &str, account: &str) -> Result<Option<String>, MlldError>;
    fn set(&self, service: &str, account: &str, value: &str) -> Result<(), MlldError>;
    fn delete(&self, service: &str, account: &str) -> Result<(), MlldError>;
}

/// Validate arguments and dispatch a keychain call, tainting `get` results.
pub fn invoke_keychain(
    keychain: &Arc<dyn Keychain>,
    function: KeychainFunction,
    args: &[StructuredValue],
) -> Result<StructuredValue, MlldError> {
    let service = args.first().map(|a| a.text.as_str()).unwrap_or("");
    let account = args.get(1).map(|a| a.text.as_str()).unwrap_or("");
    if service.is_empty() || account.is_empty() {
        return Err(MlldError::KeychainPolicy);
    }

    match function {
        KeychainFunction::Get => {
            let value = keychain.get(service, account)?.unwrap_or_default();
            let mut descriptor = SecurityDescriptor::with_label("secret");
            descriptor.add_taint("src:keychain");
            descriptor.add_source(format!("keychain:{}", service));
            Ok(StructuredValue::from_text(value).with_descriptor(descriptor))
        }
        KeychainFunction::Set => {
            let value = args.get(2).map(|a| a.text.as_str()).unwrap_or("");
            keychain.set(service, account, value)?;
            Ok(StructuredValue::empty())
        }
        KeychainFunction::Delete => {
            keychain.delete(service, account)?;
            Ok(StructuredValue::empty())
        }
    }
}
