// Connection String Translation
// Turns an ADO-style `key=value;...` descriptor into the native connect string
// and from there into a tiberius Config.

use crate::db::types::DatabaseError;
use std::fmt;
use tiberius::{AuthMethod, Config, EncryptionLevel};

/// Driver identifier written at the head of every native connect string.
pub const NATIVE_DRIVER: &str = "SQL Server TDS 7.3";

/// Application name reported to the server at login.
const APPLICATION_NAME: &str = "browseroso";

const MASK: &str = "****";

/// Portable connection descriptor as supplied by the caller.
///
/// Entries are kept in their original order so the descriptor can be shown
/// back to the user and its catalog rewritten in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    entries: Vec<(String, String)>,
}

impl ConnectionDescriptor {
    /// Parse a semicolon-delimited descriptor. Segments without `=` are skipped;
    /// keys are trimmed, values are kept as written.
    pub fn parse(descriptor: &str) -> Self {
        let entries = descriptor
            .split(';')
            .filter(|segment| !segment.is_empty())
            .filter_map(|segment| {
                let (key, value) = segment.split_once('=')?;
                Some((key.trim().to_string(), value.to_string()))
            })
            .collect();

        Self { entries }
    }

    fn get(&self, keys: &[&str]) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| keys.contains(&k.as_str()))
            .map(|(_, v)| v.as_str())
    }

    pub fn server(&self) -> Option<&str> {
        self.get(&["Data Source", "Server"])
    }

    pub fn catalog(&self) -> Option<&str> {
        self.get(&["Initial Catalog", "Database"])
    }

    pub fn user_id(&self) -> Option<&str> {
        self.get(&["User ID", "User Id"])
    }

    pub fn integrated_security(&self) -> bool {
        self.get(&["Integrated Security"])
            .map(is_integrated_value)
            .unwrap_or(false)
    }

    /// Point the descriptor at another catalog, rewriting the existing
    /// `Initial Catalog`/`Database` entry or appending one.
    pub fn set_catalog(&mut self, name: &str) {
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k == "Initial Catalog" || k == "Database")
        {
            Some((_, value)) => *value = name.to_string(),
            None => self
                .entries
                .push(("Initial Catalog".to_string(), name.to_string())),
        }
    }

    /// Descriptor text with the password hidden.
    pub fn masked(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| {
                if k == "Password" {
                    format!("{}={}", k, MASK)
                } else {
                    format!("{}={}", k, v)
                }
            })
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Translate into the driver-native form. Unrecognized keys are dropped.
    pub fn translate(&self) -> NativeConnectString {
        let mut tokens = Vec::new();

        for (key, value) in &self.entries {
            let token = match key.as_str() {
                "Data Source" | "Server" => Some((NativeKey::Server, value.clone())),
                "Initial Catalog" | "Database" => Some((NativeKey::Database, value.clone())),
                "Integrated Security" if is_integrated_value(value) => {
                    Some((NativeKey::TrustedConnection, "yes".to_string()))
                }
                "User ID" | "User Id" => Some((NativeKey::Uid, value.clone())),
                "Password" => Some((NativeKey::Pwd, value.clone())),
                "Encrypt" => parse_flag(value).map(|b| (NativeKey::Encrypt, yes_no(b))),
                "TrustServerCertificate" => {
                    parse_flag(value).map(|b| (NativeKey::TrustServerCertificate, yes_no(b)))
                }
                _ => None,
            };

            if let Some(token) = token {
                tokens.push(token);
            }
        }

        NativeConnectString { tokens }
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

fn is_integrated_value(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("sspi")
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        _ => None,
    }
}

fn yes_no(flag: bool) -> String {
    if flag { "yes" } else { "no" }.to_string()
}

/// Keys understood by the native driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeKey {
    Server,
    Database,
    TrustedConnection,
    Uid,
    Pwd,
    Encrypt,
    TrustServerCertificate,
}

impl NativeKey {
    pub fn token(&self) -> &'static str {
        match self {
            NativeKey::Server => "SERVER",
            NativeKey::Database => "DATABASE",
            NativeKey::TrustedConnection => "Trusted_Connection",
            NativeKey::Uid => "UID",
            NativeKey::Pwd => "PWD",
            NativeKey::Encrypt => "Encrypt",
            NativeKey::TrustServerCertificate => "TrustServerCertificate",
        }
    }
}

/// Driver-native connect string: `DRIVER={...};KEY=value;...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeConnectString {
    tokens: Vec<(NativeKey, String)>,
}

impl NativeConnectString {
    pub fn tokens(&self) -> &[(NativeKey, String)] {
        &self.tokens
    }

    /// Value of the last occurrence of `key`.
    pub fn get(&self, key: NativeKey) -> Option<&str> {
        self.tokens
            .iter()
            .rev()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    fn render(&self, mask_password: bool) -> String {
        let mut out = format!("DRIVER={{{}}};", NATIVE_DRIVER);
        for (key, value) in &self.tokens {
            let value = if mask_password && *key == NativeKey::Pwd {
                MASK
            } else {
                value.as_str()
            };
            out.push_str(key.token());
            out.push('=');
            out.push_str(value);
            out.push(';');
        }
        out
    }

    /// Full connect string including the password.
    pub fn to_connect_string(&self) -> String {
        self.render(false)
    }

    /// Connect string safe for logs.
    pub fn masked(&self) -> String {
        self.render(true)
    }

    /// Build a tiberius Config from the native tokens
    pub fn to_tiberius_config(&self) -> Result<Config, DatabaseError> {
        let server = self
            .get(NativeKey::Server)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| DatabaseError::InvalidConfig("Server is required".to_string()))?;
        let address = ServerAddress::parse(server)?;

        let mut config = Config::new();
        config.host(&address.host);
        if let Some(port) = address.port {
            config.port(port);
        }
        if let Some(instance) = &address.instance {
            config.instance_name(instance);
        }
        config.application_name(APPLICATION_NAME);

        if let Some(database) = self.get(NativeKey::Database).filter(|d| !d.is_empty()) {
            config.database(database);
        }

        let trusted = self.get(NativeKey::TrustedConnection) == Some("yes");
        match self.get(NativeKey::Uid) {
            Some(user) if !trusted => {
                let password = self.get(NativeKey::Pwd).unwrap_or("");
                config.authentication(AuthMethod::sql_server(user, password));
            }
            // No explicit credentials: the login is expected to be integrated.
            _ => config.authentication(integrated_auth()?),
        }

        match self.get(NativeKey::Encrypt) {
            Some("yes") => config.encryption(EncryptionLevel::Required),
            Some("no") => config.encryption(EncryptionLevel::Off),
            _ => {}
        }

        if self.get(NativeKey::TrustServerCertificate) == Some("yes") {
            config.trust_cert();
        }

        Ok(config)
    }
}

impl fmt::Display for NativeConnectString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

#[cfg(any(
    all(windows, feature = "winauth"),
    all(unix, feature = "integrated-auth-gssapi")
))]
fn integrated_auth() -> Result<AuthMethod, DatabaseError> {
    Ok(AuthMethod::Integrated)
}

#[cfg(not(any(
    all(windows, feature = "winauth"),
    all(unix, feature = "integrated-auth-gssapi")
)))]
fn integrated_auth() -> Result<AuthMethod, DatabaseError> {
    Err(DatabaseError::InvalidConfig(
        "Integrated authentication is not available in this build; supply User ID and Password"
            .to_string(),
    ))
}

/// Server part of a descriptor: `host`, `host,port`, `tcp:host,port`, `host\instance`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub port: Option<u16>,
    pub instance: Option<String>,
}

impl ServerAddress {
    pub fn parse(server: &str) -> Result<Self, DatabaseError> {
        let server = server.trim();
        let server = match server.get(..4) {
            Some(prefix) if prefix.eq_ignore_ascii_case("tcp:") => &server[4..],
            _ => server,
        };

        let (host_part, port) = match server.split_once(',') {
            Some((host, port)) => {
                let port = port.trim().parse::<u16>().map_err(|_| {
                    DatabaseError::InvalidConfig(format!("Invalid port in server: {}", port))
                })?;
                (host, Some(port))
            }
            None => (server, None),
        };

        let (host, instance) = match host_part.split_once('\\') {
            Some((host, instance)) if !instance.is_empty() => (host, Some(instance.to_string())),
            Some((host, _)) => (host, None),
            None => (host_part, None),
        };

        let host = match host.trim() {
            "." | "(local)" | "" => "localhost",
            other => other,
        };

        Ok(Self {
            host: host.to_string(),
            port,
            instance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = "Data Source=db01;Initial Catalog=Northwind;User ID=sa;Password=s3cret;Encrypt=False;TrustServerCertificate=True";

    #[test]
    fn test_translates_recognized_keys() {
        let native = ConnectionDescriptor::parse(FULL).translate();

        assert_eq!(
            native.to_connect_string(),
            "DRIVER={SQL Server TDS 7.3};SERVER=db01;DATABASE=Northwind;UID=sa;PWD=s3cret;Encrypt=no;TrustServerCertificate=yes;"
        );
    }

    #[test]
    fn test_aliases() {
        let native =
            ConnectionDescriptor::parse("Server=db02;Database=Sales;User Id=app;Password=x")
                .translate();

        assert_eq!(native.get(NativeKey::Server), Some("db02"));
        assert_eq!(native.get(NativeKey::Database), Some("Sales"));
        assert_eq!(native.get(NativeKey::Uid), Some("app"));
        assert_eq!(native.get(NativeKey::Pwd), Some("x"));
    }

    #[test]
    fn test_integrated_security_values() {
        for value in ["True", "SSPI"] {
            let native = ConnectionDescriptor::parse(&format!(
                "Server=db;Integrated Security={}",
                value
            ))
            .translate();
            assert_eq!(native.get(NativeKey::TrustedConnection), Some("yes"));
            assert!(native.to_connect_string().contains("Trusted_Connection=yes;"));
        }

        let native = ConnectionDescriptor::parse("Server=db;Integrated Security=False").translate();
        assert_eq!(native.get(NativeKey::TrustedConnection), None);
    }

    #[test]
    fn test_unknown_keys_dropped() {
        let native = ConnectionDescriptor::parse(
            "Server=db;Application Name=x;MultipleActiveResultSets=True;;garbage;Pooling=false",
        )
        .translate();

        assert_eq!(native.tokens().len(), 1);
        assert_eq!(native.to_connect_string(), "DRIVER={SQL Server TDS 7.3};SERVER=db;");
    }

    #[test]
    fn test_absent_keys_produce_no_tokens() {
        let native = ConnectionDescriptor::parse("Server=db").translate();
        let text = native.to_connect_string();

        for token in ["DATABASE=", "UID=", "PWD=", "Trusted_Connection", "Encrypt", "TrustServerCertificate"] {
            assert!(!text.contains(token), "unexpected {} in {}", token, text);
        }
    }

    #[test]
    fn test_keys_are_case_sensitive_and_trimmed() {
        let native = ConnectionDescriptor::parse("  Server =db; server=other;DATABASE=x").translate();

        assert_eq!(native.tokens().len(), 1);
        assert_eq!(native.get(NativeKey::Server), Some("db"));
    }

    #[test]
    fn test_masking() {
        let descriptor = ConnectionDescriptor::parse(FULL);
        assert!(!descriptor.masked().contains("s3cret"));
        assert!(!descriptor.to_string().contains("s3cret"));
        assert!(!descriptor.translate().masked().contains("s3cret"));
        assert!(descriptor.translate().masked().contains("PWD=****;"));
    }

    #[test]
    fn test_set_catalog_rewrites_in_place() {
        let mut descriptor = ConnectionDescriptor::parse("Server=db;Initial Catalog=master;User ID=sa");
        descriptor.set_catalog("Sales");

        assert_eq!(descriptor.catalog(), Some("Sales"));
        assert_eq!(descriptor.masked(), "Server=db;Initial Catalog=Sales;User ID=sa");
    }

    #[test]
    fn test_set_catalog_appends_when_missing() {
        let mut descriptor = ConnectionDescriptor::parse("Server=db;User ID=sa");
        descriptor.set_catalog("Sales");

        assert_eq!(descriptor.catalog(), Some("Sales"));
        assert!(descriptor.masked().ends_with(";Initial Catalog=Sales"));
    }

    #[test]
    fn test_descriptor_accessors() {
        let descriptor = ConnectionDescriptor::parse("Data Source=db;Integrated Security=SSPI");
        assert_eq!(descriptor.server(), Some("db"));
        assert_eq!(descriptor.catalog(), None);
        assert_eq!(descriptor.user_id(), None);
        assert!(descriptor.integrated_security());
    }

    #[test]
    fn test_server_address_forms() {
        assert_eq!(
            ServerAddress::parse("db01").unwrap(),
            ServerAddress { host: "db01".into(), port: None, instance: None }
        );
        assert_eq!(
            ServerAddress::parse("tcp:db01,1444").unwrap(),
            ServerAddress { host: "db01".into(), port: Some(1444), instance: None }
        );
        assert_eq!(
            ServerAddress::parse(r".\SQLEXPRESS").unwrap(),
            ServerAddress { host: "localhost".into(), port: None, instance: Some("SQLEXPRESS".into()) }
        );
        assert!(ServerAddress::parse("db01,notaport").is_err());
    }

    #[test]
    fn test_tiberius_config_with_sql_login() {
        let config = ConnectionDescriptor::parse(FULL).translate().to_tiberius_config();
        assert!(config.is_ok());
        assert_eq!(config.unwrap().get_addr(), "db01:1433");
    }

    #[test]
    fn test_tiberius_config_requires_server() {
        let result = ConnectionDescriptor::parse("User ID=sa;Password=x")
            .translate()
            .to_tiberius_config();
        assert!(matches!(result, Err(DatabaseError::InvalidConfig(_))));
    }

    #[cfg(not(any(
        all(windows, feature = "winauth"),
        all(unix, feature = "integrated-auth-gssapi")
    )))]
    #[test]
    fn test_integrated_login_needs_feature() {
        let result = ConnectionDescriptor::parse("Server=db;Integrated Security=True")
            .translate()
            .to_tiberius_config();
        assert!(matches!(result, Err(DatabaseError::InvalidConfig(_))));
    }
}
