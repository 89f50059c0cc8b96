//! Opening Postgres connections, with TLS when the connection string asks for it.

use std::sync::Arc;

use rustls::ClientConfig;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_postgres::tls::MakeTlsConnect;
use tokio_postgres::{Client, Connection, Socket};
use tokio_postgres_rustls_improved::MakeRustlsConnect;
use tracing::error;

use crate::error::{PgError, PgResult};

/// Connect to Postgres and spawn the connection driver; only the client is returned.
///
/// `sslmode=require`, `verify-ca` and `verify-full` select rustls with the
/// webpki root store. Anything else connects in plain text.
pub async fn connect_postgres(connection_string: &str) -> PgResult<Client> {
    if requires_tls(connection_string) {
        let config = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(|e| PgError::Connection(format!("TLS config error: {}", e)))?
        .with_root_certificates(root_certs())
        .with_no_client_auth();

        connect_with(connection_string, MakeRustlsConnect::new(config)).await
    } else {
        connect_with(connection_string, tokio_postgres::NoTls).await
    }
}

async fn connect_with<T>(connection_string: &str, tls: T) -> PgResult<Client>
where
    T: MakeTlsConnect<Socket>,
    T::Stream: Send + 'static,
{
    let (client, connection) = tokio_postgres::connect(connection_string, tls)
        .await
        .map_err(|e| PgError::Connection(e.to_string()))?;

    spawn_driver(connection);
    Ok(client)
}

fn spawn_driver<S, T>(connection: Connection<S, T>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!(error = %e, "Postgres connection error");
        }
    });
}

fn root_certs() -> rustls::RootCertStore {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    roots
}

fn requires_tls(connection_string: &str) -> bool {
    connection_string.contains("sslmode=require")
        || connection_string.contains("sslmode=verify-ca")
        || connection_string.contains("sslmode=verify-full")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_tls() {
        assert!(requires_tls("postgres://u:p@h/db?sslmode=require"));
        assert!(requires_tls("host=h sslmode=verify-full"));
        assert!(!requires_tls("host=h sslmode=disable"));
        assert!(!requires_tls("postgres://u:p@localhost/db"));
    }
}
