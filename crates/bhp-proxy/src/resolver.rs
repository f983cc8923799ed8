use bhp_wire::AppletId;
use uuid::Uuid;

use crate::error::{ProxyError, Result};

/// Turns the human-readable form of an applet id into its 16 bytes.
pub trait AppletIdResolver: Send + Sync {
    fn resolve(&self, text: &str) -> Result<AppletId>;
}

impl<F> AppletIdResolver for F
where
    F: Fn(&str) -> Result<AppletId> + Send + Sync,
{
    fn resolve(&self, text: &str) -> Result<AppletId> {
        self(text)
    }
}

/// Accepts `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` and the same 32 hex
/// digits without hyphens.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidResolver;

impl AppletIdResolver for UuidResolver {
    fn resolve(&self, text: &str) -> Result<AppletId> {
        let text = text.trim();
        if text.len() != 32 && text.len() != 36 {
            return Err(invalid(text));
        }
        let uuid = Uuid::try_parse(text).map_err(|_| invalid(text))?;
        Ok(AppletId::from_bytes(uuid.into_bytes()))
    }
}

fn invalid(text: &str) -> ProxyError {
    ProxyError::InvalidArgument(format!("invalid applet id {text:?}"))
}
