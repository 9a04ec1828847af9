//! Database access used by the apply workflow.
//!
//! Only two capabilities are needed: running the content of one SQL file as
//! a single batch, and rebuilding the database from the canonical schema
//! dump. [`PsqlExecutor`] provides both through the PostgreSQL client tools.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use log::debug;

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};

/// Schema-level database operations - allows mocking in tests
pub trait SchemaExecutor: Send + Sync {
    /// Runs `sql` as one batch in a single transaction.
    fn execute_query(&self, sql: &str) -> Result<()>;

    /// Drops and recreates the database, then loads `schema_file` into it.
    fn restore_schema(&self, schema_file: &Path) -> Result<()>;
}

/// The default implementation of `SchemaExecutor`, driving `psql`,
/// `dropdb` and `createdb`.
pub struct PsqlExecutor {
    config: DatabaseConfig,
}

impl PsqlExecutor {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    fn connection_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(host) = &self.config.host {
            args.push(format!("--host={}", host));
        }
        if let Some(port) = self.config.port {
            args.push(format!("--port={}", port));
        }
        if let Some(user) = &self.config.user {
            args.push(format!("--username={}", user));
        }
        args
    }

    fn run(&self, program: &str, extra: &[&str], stdin: Option<&str>) -> Result<()> {
        let mut command = Command::new(program);
        command
            .args(self.connection_args())
            .args(extra)
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        if stdin.is_some() {
            command.stdin(Stdio::piped());
        }
        debug!("{} {}", program, extra.join(" "));

        let mut child = command.spawn().map_err(|e| Error::Database {
            message: format!("could not start {}: {}", program, e),
        })?;
        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes())?;
        }
        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(Error::Database {
                message: format!(
                    "{} failed: {}",
                    program,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(())
    }
}

impl SchemaExecutor for PsqlExecutor {
    fn execute_query(&self, sql: &str) -> Result<()> {
        let name = self.config.name.as_str();
        self.run(
            "psql",
            &["--quiet", "--single-transaction", "-v", "ON_ERROR_STOP=1", "-d", name, "-f", "-"],
            Some(sql),
        )
    }

    fn restore_schema(&self, schema_file: &Path) -> Result<()> {
        if !schema_file.is_file() {
            return Err(Error::NotFound {
                resource: schema_file.display().to_string(),
                message: "canonical schema dump is missing".to_string(),
                hint: Some("commit the schema dump of the last release first".to_string()),
            });
        }
        let name = self.config.name.as_str();
        let schema = schema_file.to_string_lossy();
        self.run("dropdb", &["--if-exists", name], None)?;
        self.run("createdb", &[name], None)?;
        self.run(
            "psql",
            &["--quiet", "-v", "ON_ERROR_STOP=1", "-d", name, "-f", &schema],
            None,
        )
    }
}
