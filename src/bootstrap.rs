//! One-time setup performed before any event is processed.

use log::{debug, info};

use crate::config::ListenerConfig;
use crate::records::{KeyLayout, Listener};
use crate::store::{self, ConfigStore, Ensured, StoreError};

/// Creates the proxy's entry listener unless one with the same name exists.
pub async fn ensure_listener(
    store: &dyn ConfigStore,
    keys: &KeyLayout,
    listener: &ListenerConfig,
) -> Result<Ensured, StoreError> {
    let key = keys.listener(&listener.name);
    let record = Listener::tcp(&listener.protocol, &listener.address);
    let ensured = store::ensure(store, &key, &record).await?;
    match ensured {
        Ensured::Created => info!(
            "Created listener {} ({} on {})",
            key, listener.protocol, listener.address
        ),
        Ensured::AlreadyPresent => debug!("Listener already present: {}", key),
    }
    Ok(ensured)
}
