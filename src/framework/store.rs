use std::fmt;
use tokio_postgres::Client;
use tokio_postgres::NoTls;

use crate::config::PostgresConfig;
use crate::constants::SCHEMA_NAME;

/// Current schema revision
pub const REVISION: Revision = Revision { major: 1, minor: 0 };

#[derive(Debug, Clone, PartialEq)]
pub struct Revision {
    pub major: i32,
    pub minor: i32,
}

impl Revision {
    pub fn new(major: i32, minor: i32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Open a connection and drive it in a background task.
pub async fn connect(pgconf: &PostgresConfig) -> Result<Client, tokio_postgres::Error> {
    tracing::debug!("connecting to postgres");
    let (client, connection) = tokio_postgres::connect(&pgconf.connection_uri, NoTls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("connection error: {}", e);
        }
    });
    Ok(client)
}

/// Load the schema if not declared yet and return its revision.
pub async fn init(client: &mut Client) -> Result<Revision, tokio_postgres::Error> {
    tracing::trace!("initializing schema {SCHEMA_NAME}");
    if !schema_exists(client, SCHEMA_NAME).await? {
        tracing::info!("loading {SCHEMA_NAME} schema");
        let pgtx = client.transaction().await?;
        pgtx.batch_execute(include_str!("tw.sql")).await?;
        pgtx.commit().await?;
    }
    let rev = revisions::get(client).await?;
    if rev != REVISION {
        tracing::warn!("schema is at revision {rev}, expected {REVISION}");
    }
    Ok(rev)
}

/// Returns True if a schema with given `name` exists.
async fn schema_exists(client: &Client, name: &str) -> Result<bool, tokio_postgres::Error> {
    tracing::trace!("checking for existing {} schema", &name);
    let qry = "
    select exists(
        select schema_name
        from information_schema.schemata
        where schema_name = $1
    );";
    Ok(client.query_one(qry, &[&name]).await?.get(0))
}

/// Access tw.revisions table
pub mod revisions {
    use tokio_postgres::GenericClient;

    use super::Revision;

    pub async fn get(client: &impl GenericClient) -> Result<Revision, tokio_postgres::Error> {
        // Revision is set during schema declaration, so guaranteed to be present.
        let row = client
            .query_one("select major, minor from tw.revisions;", &[])
            .await?;
        Ok(Revision::new(row.get(0), row.get(1)))
    }
}

/// Access tw.app_state table
pub mod app_state {
    use tokio_postgres::GenericClient;
    use tokio_postgres::Transaction;

    use crate::core::types::Head;
    use crate::error::invariant;
    use crate::error::Error;

    pub async fn get_head(client: &impl GenericClient) -> Result<Head, tokio_postgres::Error> {
        tracing::trace!("get_head");
        let row = client
            .query_one("select level, hash from tw.app_state;", &[])
            .await?;
        Ok(Head::new(row.get(0), row.get(1)))
    }

    pub async fn update_head(pgtx: &Transaction<'_>, head: &Head) -> Result<(), Error> {
        tracing::trace!("update_head {head:?}");
        let n_modified = pgtx
            .execute(
                "update tw.app_state set level = $1, hash = $2;",
                &[&head.level, &head.hash],
            )
            .await?;
        match n_modified {
            1 => Ok(()),
            n => Err(invariant(format!("app state has {n} rows"))),
        }
    }
}
