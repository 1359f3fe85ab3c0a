//! Resolution of the named connections a migration command runs against.
//!
//! Connections come either from the configuration file (the "build" connections) or from
//! explicit `name=dsn[;key=value...]` strings given on the command line. Explicit strings
//! replace the configured set entirely; the two are never merged.

use crate::db::connection::mask_url_password;
use crate::error::{MigrationError, MigrationResult};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use url::Url;

/// Database engine behind a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    Postgres,
    MySql,
    Sqlite,
}

impl AdapterKind {
    /// Resolve the adapter from a DSN prefix such as `pgsql`, `mysql` or `sqlite`
    pub fn from_dsn_prefix(prefix: &str) -> Option<Self> {
        match prefix.to_ascii_lowercase().as_str() {
            "pgsql" | "postgres" | "postgresql" => Some(Self::Postgres),
            "mysql" | "mariadb" => Some(Self::MySql),
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            _ => None,
        }
    }

    pub fn url_scheme(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }

    /// MySQL commits implicitly around DDL, so a failed script cannot be undone there.
    pub fn supports_transactional_ddl(&self) -> bool {
        !matches!(self, Self::MySql)
    }

    /// SQL type used to read timestamps back as text
    pub fn text_cast_type(&self) -> &'static str {
        match self {
            Self::MySql => "CHAR",
            Self::Postgres | Self::Sqlite => "TEXT",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Postgres => "pgsql",
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
        })
    }
}

/// A named logical database and how to reach it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionDescriptor {
    pub name: String,
    /// DSN with any `user`/`password` segments lifted out
    pub dsn: String,
    pub user: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub adapter: AdapterKind,
}

impl ConnectionDescriptor {
    /// Parse an explicit connection string like
    /// `bookstore=mysql:host=127.0.0.1;dbname=test;user=root;password=foobar`
    pub fn parse(input: &str) -> MigrationResult<Self> {
        let (name, dsn) = input
            .split_once('=')
            .ok_or_else(|| MigrationError::malformed(input, "expected 'name=dsn'"))?;

        let name = name.trim();
        if name.is_empty() {
            return Err(MigrationError::malformed(input, "missing connection name"));
        }
        if !is_valid_connection_name(name) {
            return Err(MigrationError::malformed(
                input,
                "missing 'name=' prefix before the DSN",
            ));
        }

        Self::from_parts(name, dsn.trim(), None, None)
            .map_err(|reason| MigrationError::malformed(input, reason))
    }

    /// Build a descriptor from a configured connection entry.
    ///
    /// Explicit `user`/`password` values win over ones embedded in the DSN.
    pub fn from_config(
        name: &str,
        dsn: &str,
        user: Option<String>,
        password: Option<String>,
    ) -> MigrationResult<Self> {
        Self::from_parts(name, dsn.trim(), user, password)
            .map_err(|reason| MigrationError::malformed(&format!("{}={}", name, dsn), reason))
    }

    fn from_parts(
        name: &str,
        dsn: &str,
        user: Option<String>,
        password: Option<String>,
    ) -> Result<Self, String> {
        if dsn.is_empty() {
            return Err("missing DSN".to_string());
        }

        let (prefix, _) = dsn
            .split_once(':')
            .ok_or_else(|| "DSN has no adapter prefix (e.g. 'mysql:')".to_string())?;
        let adapter = AdapterKind::from_dsn_prefix(prefix)
            .ok_or_else(|| format!("unknown adapter '{}'", prefix))?;

        let mut embedded_user = None;
        let mut embedded_password = None;
        let mut kept = Vec::new();

        for (index, segment) in dsn.split(';').enumerate() {
            if segment.trim().is_empty() {
                continue;
            }
            if index > 0
                && let Some((key, value)) = segment.split_once('=')
            {
                match key.trim().to_ascii_lowercase().as_str() {
                    "user" | "username" => {
                        embedded_user = Some(value.trim().to_string());
                        continue;
                    }
                    "password" => {
                        embedded_password = Some(value.trim().to_string());
                        continue;
                    }
                    _ => {}
                }
            }
            kept.push(segment);
        }

        let descriptor = Self {
            name: name.to_string(),
            dsn: kept.join(";"),
            user: user.or(embedded_user).filter(|u| !u.is_empty()),
            password: password.or(embedded_password),
            adapter,
        };

        // Reject DSNs we could never connect with up front
        descriptor.connection_url()?;

        Ok(descriptor)
    }

    /// Translate the DSN into a sqlx connection URL
    pub fn connection_url(&self) -> Result<String, String> {
        let (_, body) = self
            .dsn
            .split_once(':')
            .ok_or_else(|| "DSN has no adapter prefix".to_string())?;
        let scheme = self.adapter.url_scheme();

        if let Some(rest) = body.strip_prefix("//") {
            return self.url_from_url_style(scheme, rest);
        }

        match self.adapter {
            AdapterKind::Sqlite => {
                let path = body.trim();
                if path.is_empty() {
                    return Err("sqlite DSN has no database path".to_string());
                }
                if path == ":memory:" {
                    Ok("sqlite::memory:".to_string())
                } else {
                    Ok(format!("sqlite://{}?mode=rwc", path))
                }
            }
            AdapterKind::Postgres | AdapterKind::MySql => {
                let params = parse_pdo_params(body);
                let dbname = params
                    .get("dbname")
                    .or_else(|| params.get("database"))
                    .ok_or_else(|| "DSN has no 'dbname'".to_string())?;
                let host = params
                    .get("host")
                    .map(String::as_str)
                    .unwrap_or("localhost");
                let port = params
                    .get("port")
                    .map(|p| format!(":{}", p))
                    .unwrap_or_default();

                let mut url = Url::parse(&format!("{}://{}{}/{}", scheme, host, port, dbname))
                    .map_err(|e| format!("invalid DSN: {}", e))?;
                let extras: Vec<(&str, &str)> = params
                    .iter()
                    .filter(|(key, _)| {
                        !matches!(key.as_str(), "dbname" | "database" | "host" | "port")
                    })
                    .map(|(key, value)| (key.as_str(), value.as_str()))
                    .collect();
                append_query(&mut url, &extras);
                self.apply_credentials(&mut url)?;

                Ok(url.to_string())
            }
        }
    }

    /// Connection URL with the password masked, for logs and errors
    pub fn display_url(&self) -> String {
        match self.connection_url() {
            Ok(url) => mask_url_password(&url),
            Err(_) => self.dsn.clone(),
        }
    }

    fn url_from_url_style(&self, scheme: &str, rest: &str) -> Result<String, String> {
        let mut segments = rest.split(';');
        let location = segments.next().unwrap_or_default();
        let extras: Vec<(&str, &str)> = segments.filter_map(|s| s.split_once('=')).collect();

        let mut url = Url::parse(&format!("{}://{}", scheme, location))
            .map_err(|e| format!("invalid DSN URL: {}", e))?;
        append_query(&mut url, &extras);
        self.apply_credentials(&mut url)?;

        Ok(url.to_string())
    }

    /// Credentials already in a URL-style DSN win over lifted ones
    fn apply_credentials(&self, url: &mut Url) -> Result<(), String> {
        if !url.username().is_empty() {
            return Ok(());
        }
        let Some(user) = &self.user else {
            return Ok(());
        };

        url.set_username(user)
            .map_err(|_| format!("cannot attach user '{}' to this DSN", user))?;
        if let Some(password) = &self.password {
            url.set_password(Some(password))
                .map_err(|_| "cannot attach a password to this DSN".to_string())?;
        }
        Ok(())
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.adapter)
    }
}

/// Pick the connections a command operates on.
///
/// Explicit connection strings replace the configured set wholesale.
pub fn resolve_connections(
    explicit: &[String],
    configured: &[ConnectionDescriptor],
) -> MigrationResult<Vec<ConnectionDescriptor>> {
    if explicit.is_empty() {
        return Ok(configured.to_vec());
    }

    let mut seen = HashSet::new();
    let mut connections = Vec::with_capacity(explicit.len());
    for input in explicit {
        let descriptor = ConnectionDescriptor::parse(input)?;
        if !seen.insert(descriptor.name.clone()) {
            return Err(MigrationError::malformed(
                input,
                format!("connection '{}' is given more than once", descriptor.name),
            ));
        }
        connections.push(descriptor);
    }

    Ok(connections)
}

/// Fail before touching any database when there is nothing to connect to
pub fn require_connections(connections: &[ConnectionDescriptor]) -> MigrationResult<()> {
    if connections.is_empty() {
        return Err(MigrationError::Configuration(
            "No connections configured. Add 'databases.connections' to the config file \
             or pass --connection name=dsn"
                .to_string(),
        ));
    }
    Ok(())
}

fn is_valid_connection_name(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn parse_pdo_params(body: &str) -> BTreeMap<String, String> {
    body.split(';')
        .filter_map(|segment| segment.split_once('='))
        .map(|(key, value)| (key.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect()
}

fn append_query(url: &mut Url, pairs: &[(&str, &str)]) {
    if pairs.is_empty() {
        return;
    }
    let mut query = url.query_pairs_mut();
    for (key, value) in pairs {
        query.append_pair(key, value);
    }
}
