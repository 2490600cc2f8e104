use crate::PostgresPool;
use openssl::ssl::{SslConnector, SslFiletype, SslMethod, SslVerifyMode};
use postgres_openssl::MakeTlsConnector;
use std::{env, path::Path};
use strata_core::{Context, Error, Result};
use url::Url;

/// Connection options that do not travel in the url.
#[derive(Debug, Clone)]
pub struct PostgresSetting {
    /// Namespace of the entities that do not declare one, overrides the `schema` url parameter
    pub schema: Option<String>,
    /// Connections kept open for reuse
    pub max_idle: usize,
}

impl Default for PostgresSetting {
    fn default() -> Self {
        Self {
            schema: None,
            max_idle: 4,
        }
    }
}

impl PostgresSetting {
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }
    pub fn max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }
}

/// Connection url rewritten for `tokio-postgres`, with the parameters the driver consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionUrl {
    pub url: String,
    pub schema: Option<String>,
    pub sslmode: String,
    pub sslrootcert: Option<String>,
    pub sslcert: Option<String>,
    pub sslkey: Option<String>,
}

impl ConnectionUrl {
    /// Normalize the scheme alias and take out `schema` and the TLS parameters.
    ///
    /// The TLS parameters fall back to the `PGSSLMODE`, `PGSSLROOTCERT`,
    /// `PGSSLCERT` and `PGSSLKEY` environment variables.
    pub fn parse(url: &str) -> Result<Self> {
        let context = || format!("While trying to connect to `{}`", url);
        let Some((_, rest)) = url
            .split_once("://")
            .filter(|(scheme, _)| PostgresDriver::accepts(scheme))
        else {
            let error = Error::msg(format!(
                "Postgres connection url must start with `{}://` or one of its aliases",
                PostgresDriver::NAME
            ))
            .context(context());
            log::error!("{:#}", error);
            return Err(error);
        };
        let mut url = Url::parse(&format!("{}://{}", PostgresDriver::NAME, rest))
            .with_context(context)?;
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let mut take = |key: &str, env_var: Option<&str>| {
            let value = pairs
                .iter()
                .position(|(k, _)| k == key)
                .map(|i| pairs.remove(i).1);
            value.or_else(|| env_var.and_then(|v| env::var(v).ok()))
        };
        let schema = take("schema", None).filter(|v| !v.is_empty());
        let sslmode = take("sslmode", Some("PGSSLMODE")).unwrap_or_else(|| "disable".into());
        let sslrootcert = take("sslrootcert", Some("PGSSLROOTCERT"));
        let sslcert = take("sslcert", Some("PGSSLCERT"));
        let sslkey = take("sslkey", Some("PGSSLKEY"));
        if matches!(sslmode.as_str(), "require" | "verify-ca" | "verify-full") {
            pairs.push(("sslmode".into(), "require".into()));
        }
        if pairs.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut()
                .clear()
                .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        Ok(Self {
            url: url.into(),
            schema,
            sslmode,
            sslrootcert,
            sslcert,
            sslkey,
        })
    }

    /// TLS connector for the requested `sslmode`, `None` when disabled.
    pub fn tls(&self) -> Result<Option<MakeTlsConnector>> {
        if self.sslmode == "disable" {
            return Ok(None);
        }
        let mut builder = SslConnector::builder(SslMethod::tls())?;
        if let Some(path) = self.sslrootcert.as_deref().map(Path::new)
            && path.exists()
        {
            builder.set_ca_file(path)?;
        }
        if let Some(path) = self.sslcert.as_deref().map(Path::new)
            && path.exists()
        {
            builder.set_certificate_chain_file(path)?;
        }
        if let Some(path) = self.sslkey.as_deref().map(Path::new)
            && path.exists()
        {
            builder.set_private_key_file(path, SslFiletype::PEM)?;
        }
        match self.sslmode.as_str() {
            "require" | "prefer" | "allow" => builder.set_verify(SslVerifyMode::NONE),
            _ => builder.set_verify(SslVerifyMode::PEER),
        }
        let mut connector = MakeTlsConnector::new(builder.build());
        if self.sslmode != "verify-full" {
            connector.set_callback(|config, _| {
                config.set_verify_hostname(false);
                Ok(())
            });
        }
        Ok(Some(connector))
    }
}

#[derive(Default, Debug, Clone, Copy)]
pub struct PostgresDriver {}

impl PostgresDriver {
    pub const NAME: &'static str = "postgres";

    /// Url schemes and driver names served by this driver.
    pub const NAMES: &'static [&'static str] = &[
        "postgres",
        "postgresql",
        "pgsql",
        "pgdb",
        "pg",
        "cockroachdb",
        "cockroach",
        "crdb",
        "timescaledb",
        "timescale",
        "tsdb",
    ];

    pub const fn new() -> Self {
        Self {}
    }

    pub fn accepts(name: &str) -> bool {
        Self::NAMES.iter().any(|v| v.eq_ignore_ascii_case(name))
    }

    /// Open a pool on `url`, checking that a first connection succeeds.
    ///
    /// The schema comes from `setting`, then from the `schema` url parameter,
    /// and is `public` otherwise.
    pub async fn connect(&self, url: &str, setting: PostgresSetting) -> Result<PostgresPool> {
        let parsed = ConnectionUrl::parse(url)?;
        let tls = parsed
            .tls()
            .with_context(|| format!("While configuring TLS for `{}`", url))
            .map_err(|e| {
                log::error!("{:#}", e);
                e
            })?;
        let schema = setting
            .schema
            .or(parsed.schema)
            .unwrap_or_else(|| "public".into());
        let pool = PostgresPool::new(parsed.url, tls, schema, setting.max_idle);
        let client = pool
            .open()
            .await
            .with_context(|| format!("While trying to connect to `{}`", url))
            .map_err(|e| {
                log::error!("{:#}", e);
                e
            })?;
        pool.release(client);
        Ok(pool)
    }
}
