use crate::Result;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use std::time::Duration;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::ImageExt;
use testcontainers::{ContainerAsync, GenericImage};
use typed_builder::TypedBuilder;

#[derive(TypedBuilder)]
pub struct MysqlConfig {
    #[builder(default = "hop".to_string())]
    database: String,
    #[builder(default = "hop".to_string())]
    username: String,
    #[builder(default = "hop".to_string())]
    password: String,
    /// Connection attempts made by [`MySqlServer::pool`] before giving up.
    #[builder(default = 20)]
    connect_attempts: u32,
}

/// Test fixture for a disposable MySQL server.
pub struct MySqlServer {
    container: ContainerAsync<GenericImage>,
    config: MysqlConfig,
}

impl MySqlServer {
    /// Starts a MySQL container suitable for integration tests.
    pub async fn new(config: MysqlConfig) -> Result<Self> {
        let container = GenericImage::new("mysql", "8.4")
            .with_exposed_port(3306_u16.tcp())
            .with_wait_for(WaitFor::message_on_stderr("ready for connections"))
            .with_env_var("MYSQL_DATABASE", config.database.as_str())
            .with_env_var("MYSQL_USER", config.username.as_str())
            .with_env_var("MYSQL_PASSWORD", config.password.as_str())
            .with_env_var("MYSQL_ROOT_PASSWORD", "root")
            .start()
            .await?;

        Ok(Self { container, config })
    }

    pub async fn database_url(&self) -> Result<String> {
        let host = self.container.get_host().await?;
        let port = self.container.get_host_port_ipv4(3306).await?;
        Ok(format!(
            "mysql://{}:{}@{}:{}/{}",
            self.config.username, self.config.password, host, port, self.config.database
        ))
    }

    /// Opens a pool, retrying while the server finishes booting.
    ///
    /// MySQL logs "ready for connections" once for the temporary init server
    /// and once for the real one, so the first attempts can be refused.
    pub async fn pool(&self) -> Result<MySqlPool> {
        let url = self.database_url().await?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match MySqlPoolOptions::new().max_connections(5).connect(&url).await {
                Ok(pool) => return Ok(pool),
                Err(err) if attempt >= self.config.connect_attempts => return Err(err.into()),
                Err(_) => tokio::time::sleep(Duration::from_millis(500)).await,
            }
        }
    }
}
