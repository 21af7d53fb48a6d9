// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures of a pipeline stage.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The whole batch was rolled back; `attempted` rows were in it.
    #[error("write to {table} failed ({attempted} rows attempted): {source}")]
    WriteFailed {
        table: &'static str,
        attempted: usize,
        #[source]
        source: sqlx::Error,
    },

    #[error("table {table} does not match the staging layout (expected {expected}, found {found})")]
    SchemaMismatch {
        table: &'static str,
        expected: String,
        found: String,
    },

    #[error("staging store error: {0}")]
    Store(#[from] sqlx::Error),
}

/// Failures reported by the currency API client.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("failed to parse response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    /// The envelope held a payload of the wrong JSON type.
    #[error("unexpected {kind} payload from {endpoint}")]
    Unexpected {
        endpoint: String,
        kind: &'static str,
    },

    #[error("could not build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Failures of the downstream job trigger. Never fatal to a load.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("trigger request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("trigger endpoint {endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("could not build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}
