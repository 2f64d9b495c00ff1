use crate::error::{EngineError, EngineResult};

/// One `host:port:db:role:password` entry in a credential file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialLine {
    pub host: String,
    pub port: u16,
    pub db: String,
    pub role: String,
    pub password: String,
}

impl CredentialLine {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        db: impl Into<String>,
        role: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            db: db.into(),
            role: role.into(),
            password: password.into(),
        }
    }

    /// `host:port:db:role` — the part two lines must match on for a lookup.
    pub fn prefix(&self) -> String {
        format!("{}:{}:{}:{}", self.host, self.port, self.db, self.role)
    }

    pub fn to_line(&self) -> String {
        format!("{}:{}", self.prefix(), self.password)
    }

    pub fn parse(line: &str) -> EngineResult<Self> {
        let parts: Vec<&str> = line.splitn(5, ':').collect();
        let [host, port, db, role, password] = parts.as_slice() else {
            return Err(EngineError::InvalidInput(format!(
                "malformed credential line (expected host:port:db:role:password): `{}`",
                line
            )));
        };
        let port: u16 = port.parse().map_err(|_| {
            EngineError::InvalidInput(format!("invalid port in credential line: `{}`", line))
        })?;
        Ok(CredentialLine::new(*host, port, *db, *role, *password))
    }
}

/// Parse the non-blank, non-comment lines of a credential file's contents.
pub fn parse_lines(contents: &str) -> EngineResult<Vec<CredentialLine>> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(CredentialLine::parse)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_to_line_and_parse() {
        let line = CredentialLine::new("db.example", 5432, "caweb", "normal", "s3cr3t");
        let text = line.to_line();
        assert_eq!(text, "db.example:5432:caweb:normal:s3cr3t");
        assert_eq!(CredentialLine::parse(&text).unwrap(), line);
    }

    #[test]
    fn prefix_excludes_password() {
        let line = CredentialLine::new("db.example", 5432, "caweb", "normal", "s3cr3t");
        assert_eq!(line.prefix(), "db.example:5432:caweb:normal");
    }

    #[test]
    fn ignores_blank_and_comment_lines() {
        let contents = "\n# a comment\n\ndb.example:5432:caweb:normal:s3cr3t\n";
        let lines = parse_lines(contents).unwrap();
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(CredentialLine::parse("not-enough-fields").is_err());
        assert!(CredentialLine::parse("host:notaport:db:role:pw").is_err());
    }

    #[test]
    fn password_may_contain_colons() {
        let line = CredentialLine::parse("host:5432:db:role:pa:ss:w:ord").unwrap();
        assert_eq!(line.password, "pa:ss:w:ord");
    }
}
