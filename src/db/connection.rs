use crate::connections::{AdapterKind, ConnectionDescriptor};
use crate::constants::{CONNECT_ACQUIRE_TIMEOUT, CONNECT_MAX_RETRIES, CONNECT_RETRY_DELAY};
use crate::error::{MigrationError, MigrationResult};
use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;
use std::sync::Once;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

static INSTALL_DRIVERS: Once = Once::new();

/// Mask password in database URL for display
pub fn mask_url_password(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    if parsed.password().is_none() {
        return url.to_string();
    }
    match parsed.set_password(Some("***")) {
        Ok(()) => parsed.to_string(),
        Err(()) => url.to_string(),
    }
}

/// Database connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Maximum number of retries for database connections
    pub max_retries: u32,
    /// Delay between connection retries
    pub retry_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_retries: CONNECT_MAX_RETRIES,
            retry_delay: CONNECT_RETRY_DELAY,
        }
    }
}

/// An open pool for one resolved connection
#[derive(Debug, Clone)]
pub struct TargetConnection {
    descriptor: ConnectionDescriptor,
    pool: AnyPool,
}

impl TargetConnection {
    /// Connect with the default retry policy
    pub async fn connect(descriptor: &ConnectionDescriptor) -> MigrationResult<Self> {
        Self::connect_with_config(descriptor, &ConnectionConfig::default()).await
    }

    pub async fn connect_with_config(
        descriptor: &ConnectionDescriptor,
        config: &ConnectionConfig,
    ) -> MigrationResult<Self> {
        INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);

        let url = descriptor
            .connection_url()
            .map_err(|reason| MigrationError::malformed(&descriptor.dsn, reason))?;

        let mut last_error = None;
        for attempt in 0..=config.max_retries {
            let result = AnyPoolOptions::new()
                .max_connections(1)
                .acquire_timeout(CONNECT_ACQUIRE_TIMEOUT)
                .connect(&url)
                .await;

            match result {
                Ok(pool) => {
                    if attempt > 0 {
                        info!(
                            "Connected to '{}' (after {} retr{})",
                            descriptor.name,
                            attempt,
                            if attempt == 1 { "y" } else { "ies" }
                        );
                    } else {
                        debug!("Connected to '{}' at {}", descriptor.name, descriptor.display_url());
                    }
                    return Ok(Self {
                        descriptor: descriptor.clone(),
                        pool,
                    });
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < config.max_retries {
                        if attempt == 0 {
                            info!("Database '{}' not ready, retrying...", descriptor.name);
                        }
                        tokio::time::sleep(config.retry_delay).await;
                    }
                }
            }
        }

        Err(MigrationError::Connection {
            connection: descriptor.name.clone(),
            url: descriptor.display_url(),
            source: last_error.unwrap_or(sqlx::Error::PoolTimedOut),
        })
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn adapter(&self) -> AdapterKind {
        self.descriptor.adapter
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Open every resolved connection in order, failing on the first one that cannot be reached
pub async fn connect_all(
    descriptors: &[ConnectionDescriptor],
) -> MigrationResult<Vec<TargetConnection>> {
    let mut connections = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        connections.push(TargetConnection::connect(descriptor).await?);
    }
    Ok(connections)
}

pub async fn close_all(connections: &[TargetConnection]) {
    for connection in connections {
        connection.close().await;
    }
}
