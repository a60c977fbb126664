//! Defines the factory producing queues that share one process
//! configuration.

use log::debug;

use crate::config::Config;
use crate::models::{ConvoyError, ConvoyResult};
use crate::queue::{Queue, QueueOptions};

/// Builds a Redis client from the process configuration. Overridable so
/// deployments and tests can substitute connection settings such as the
/// database selection.
pub type ClientFactory = dyn Fn(&Config) -> redis::RedisResult<redis::Client> + Send + Sync;

/// Factory for [`Queue`]s sharing a configuration and a way of reaching
/// Redis.
///
/// The client factory is called exactly once per created queue; the
/// resulting client and its connections are owned by that queue and are
/// released when it is dropped.
pub struct Convoy {
    config: Config,
    client_factory: Box<ClientFactory>,
}

impl Convoy {
    /// Create a new Convoy whose queues connect to the Redis URL and
    /// database named by `config`.
    pub fn new(config: Config) -> Self {
        Convoy {
            config,
            client_factory: Box::new(|config: &Config| {
                redis::Client::open(config.redis_url().as_str())
            }),
        }
    }

    /// Create a new Convoy with a custom Redis client factory.
    pub fn with_client_factory<F>(config: Config, factory: F) -> Self
    where
        F: Fn(&Config) -> redis::RedisResult<redis::Client> + Send + Sync + 'static,
    {
        Convoy {
            config,
            client_factory: Box::new(factory),
        }
    }

    /// Create a queue with the given name and default options.
    pub async fn create_queue(&self, name: &str) -> ConvoyResult<Queue> {
        self.create_queue_with_options(name, QueueOptions::default())
            .await
    }

    /// Create a queue with the given name and options.
    pub async fn create_queue_with_options(
        &self,
        name: &str,
        options: QueueOptions,
    ) -> ConvoyResult<Queue> {
        debug!("Creating queue '{}'", name);
        let client = (self.client_factory)(&self.config)
            .map_err(|err| ConvoyError::Connection(err.to_string()))?;
        let conn = client
            .get_tokio_connection_manager()
            .await
            .map_err(|err| ConvoyError::Connection(err.to_string()))?;
        Queue::new(name, options, client, conn, &self.config)
    }

    /// The configuration shared by this Convoy's queues.
    pub fn config(&self) -> &Config {
        &self.config
    }
}
