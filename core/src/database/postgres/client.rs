use std::{env, time::Duration};

use bb8::{Pool, PooledConnection, RunError};
use bb8_postgres::PostgresConnectionManager;
use dotenv::dotenv;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio::{task, time::timeout};
use tokio_postgres::{config::SslMode, Config, Error as PgError};
use tracing::{debug, error, info};

pub type PostgresManager = PostgresConnectionManager<MakeTlsConnector>;
pub type PostgresConnection<'a> = PooledConnection<'a, PostgresManager>;

pub fn connection_string() -> Result<String, env::VarError> {
    dotenv().ok();
    let connection = env::var("DATABASE_URL")?;
    Ok(connection)
}

#[derive(thiserror::Error, Debug)]
pub enum PostgresConnectionError {
    #[error("The database connection string is wrong please check your environment: {0}")]
    DatabaseConnectionConfigWrong(#[from] env::VarError),

    #[error("Connection pool error: {0}")]
    ConnectionPoolError(#[from] tokio_postgres::Error),

    #[error("Can not connect to the database please make sure your connection string is correct")]
    CanNotConnectToDatabase,

    #[error("Could not parse connection string make sure it is correctly formatted")]
    CouldNotParseConnectionString,

    #[error("Could not create tls connector")]
    CouldNotCreateTlsConnector,
}

/// Server side failures carry their SQLSTATE, message, detail and hint.
fn describe_pg_error(error: &PgError) -> String {
    let Some(db_error) = error.as_db_error() else {
        return error.to_string();
    };

    let mut description =
        format!("{} {}: {}", db_error.severity(), db_error.code().code(), db_error.message());
    if let Some(detail) = db_error.detail() {
        description.push_str(&format!(" DETAIL: {}", detail));
    }
    if let Some(hint) = db_error.hint() {
        description.push_str(&format!(" HINT: {}", hint));
    }
    description
}

#[derive(thiserror::Error, Debug)]
pub enum PostgresError {
    #[error("PgError {}", describe_pg_error(.0))]
    PgError(#[from] PgError),

    #[error("Connection pool error: {0}")]
    ConnectionPoolError(#[from] RunError<tokio_postgres::Error>),
}

/// Pool of connections to the database named by `DATABASE_URL`.
///
/// The bulk operations never open or commit transactions themselves; take a connection with
/// [`PostgresClient::get`] and open one on it when the writes must be atomic.
pub struct PostgresClient {
    pool: Pool<PostgresManager>,
}

impl PostgresClient {
    pub async fn new() -> Result<Self, PostgresConnectionError> {
        let connection_str = connection_string()?;
        Self::from_connection_string(&connection_str).await
    }

    pub async fn from_connection_string(
        connection_str: &str,
    ) -> Result<Self, PostgresConnectionError> {
        async fn _new(
            connection_str: &str,
            disable_ssl: bool,
        ) -> Result<PostgresClient, PostgresConnectionError> {
            let mut config: Config = connection_str
                .parse()
                .map_err(|_| PostgresConnectionError::CouldNotParseConnectionString)?;

            if disable_ssl {
                config.ssl_mode(SslMode::Disable);
            }

            let connector = TlsConnector::builder()
                .build()
                .map_err(|_| PostgresConnectionError::CouldNotCreateTlsConnector)?;
            let tls_connector = MakeTlsConnector::new(connector);

            // Perform a direct connection test
            let (client, connection) =
                match timeout(Duration::from_millis(5000), config.connect(tls_connector.clone()))
                    .await
                {
                    Ok(Ok((client, connection))) => (client, connection),
                    Ok(Err(e)) => {
                        // retry without ssl if ssl has been attempted and failed
                        if !disable_ssl
                            && config.get_ssl_mode() != SslMode::Disable
                            && !connection_str.contains("sslmode=require")
                        {
                            debug!("TLS connection failed, retrying without ssl");
                            return Box::pin(_new(connection_str, true)).await;
                        }
                        error!("Error connecting to database: {}", e);
                        return Err(PostgresConnectionError::CanNotConnectToDatabase);
                    }
                    Err(e) => {
                        error!("Timeout connecting to database: {}", e);
                        return Err(PostgresConnectionError::CanNotConnectToDatabase);
                    }
                };

            let connection_handle = task::spawn(connection);

            if client.simple_query("SELECT 1").await.is_err() {
                return Err(PostgresConnectionError::CanNotConnectToDatabase);
            }

            drop(client);
            match connection_handle.await {
                Ok(Ok(())) => (),
                Ok(Err(_)) | Err(_) => return Err(PostgresConnectionError::CanNotConnectToDatabase),
            }

            let manager = PostgresConnectionManager::new(config, tls_connector);

            let pool = Pool::builder().build(manager).await?;

            info!("Connected to postgres");

            Ok(PostgresClient { pool })
        }

        _new(connection_str, false).await
    }

    /// Checks a connection out of the pool. It goes back when dropped.
    pub async fn get(&self) -> Result<PostgresConnection<'_>, PostgresError> {
        let conn = self.pool.get().await?;
        Ok(conn)
    }
}
