//! Client library for a sqlcluster node.
//!
//! Statements are sent to any node; followers answer with a redirect to the
//! leader, which the client follows.
//!
//! # Example
//!
//! ```no_run
//! use client::Client;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Client::connect("127.0.0.1:4001")?;
//!
//!     client.execute("CREATE TABLE users (id INT, name TEXT)").await?;
//!     client.execute("INSERT INTO users VALUES (1, 'Alice')").await?;
//!
//!     let result = client.execute("SELECT * FROM users").await?;
//!     println!("#{}: {} row(s)", result.sequence_number, result.rows().count());
//!     Ok(())
//! }
//! ```

mod error;

pub use error::{ClientError, Result};

use common::NodeStatus;
use common::transport;
use reqwest::StatusCode;
use tracing::debug;

const SEQUENCE_PREFIX: &str = "SequenceNumber: ";

/// Client for one node of the cluster.
#[derive(Clone, Debug)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

/// Result of executing a SQL statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    /// Position of the statement's first execution in the cluster's history.
    pub sequence_number: u64,
    /// Engine output. For a statement the engine rejected this holds the
    /// engine's diagnostic.
    pub output: String,
}

impl QueryResult {
    /// Parse a `SequenceNumber: <n>\n<output>` response body.
    pub fn parse(body: &str) -> Result<Self> {
        let malformed = || ClientError::Malformed(body.chars().take(80).collect());

        let rest = body.strip_prefix(SEQUENCE_PREFIX).ok_or_else(malformed)?;
        let (number, output) = rest.split_once('\n').unwrap_or((rest, ""));
        let sequence_number = number.trim().parse().map_err(|_| malformed())?;

        Ok(Self {
            sequence_number,
            output: output.to_string(),
        })
    }

    /// Non-empty output lines.
    pub fn rows(&self) -> impl Iterator<Item = &str> {
        self.output.lines().filter(|line| !line.is_empty())
    }

    /// Returns true if the statement produced no output.
    pub fn is_empty(&self) -> bool {
        self.output.is_empty()
    }
}

impl Client {
    /// Create a client for the node listening on `addr` (`host:port`).
    ///
    /// No connection is made until the first request.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use client::Client;
    /// # fn example() -> anyhow::Result<()> {
    /// let client = Client::connect("127.0.0.1:4001")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn connect(addr: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(ClientError::Connection)?;
        Self::with_http_client(addr, http)
    }

    /// Like [`Client::connect`], reusing an existing HTTP client.
    pub fn with_http_client(addr: &str, http: reqwest::Client) -> Result<Self> {
        Ok(Self {
            http,
            base_url: transport::encode(addr)?,
        })
    }

    /// The node URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Execute a SQL statement on the cluster and return its result.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use client::Client;
    /// # async fn example() -> anyhow::Result<()> {
    /// # let client = Client::connect("127.0.0.1:4001")?;
    /// let result = client.execute("SELECT * FROM users").await?;
    /// for row in result.rows() {
    ///     println!("{row}");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn execute(&self, sql: &str) -> Result<QueryResult> {
        let response = self
            .http
            .post(format!("{}/sql", self.base_url))
            .body(sql.to_string())
            .send()
            .await
            .map_err(ClientError::Connection)?;

        let status = response.status();
        debug!(url = %response.url(), %status, "statement answered");
        let body = response.text().await.map_err(ClientError::Connection)?;

        if status == StatusCode::OK {
            QueryResult::parse(&body)
        } else {
            Err(ClientError::Cluster(body.trim_end().to_string()))
        }
    }

    /// Returns true if the node answers its health check.
    pub async fn health(&self) -> Result<bool> {
        let response = self
            .http
            .get(format!("{}/healthcheck", self.base_url))
            .send()
            .await
            .map_err(ClientError::Connection)?;
        Ok(response.status().is_success())
    }

    /// The node's view of the cluster.
    pub async fn status(&self) -> Result<NodeStatus> {
        self.http
            .get(format!("{}/status", self.base_url))
            .send()
            .await
            .map_err(ClientError::Connection)?
            .json()
            .await
            .map_err(ClientError::Connection)
    }
}
