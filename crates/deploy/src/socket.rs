//! Operator socket encoding shared with the node binaries.
//!
//! A socket is written `host:dispersal_port;retrieval_port`. The host may
//! itself contain `:` (IPv6 literals), so parsing splits from the right.

use std::str::FromStr;

use derive_more::Display;
use thiserror::Error;

/// Network address advertised by an operator node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
#[display("{host}:{dispersal_port};{retrieval_port}")]
pub struct OperatorSocket {
    pub host: String,
    pub dispersal_port: u16,
    pub retrieval_port: u16,
}

impl OperatorSocket {
    pub fn new(host: impl Into<String>, dispersal_port: u16, retrieval_port: u16) -> Self {
        Self {
            host: host.into(),
            dispersal_port,
            retrieval_port,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid operator socket '{0}', expected host:dispersal_port;retrieval_port")]
pub struct ParseSocketError(String);

impl FromStr for OperatorSocket {
    type Err = ParseSocketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseSocketError(s.to_string());

        let (address, retrieval) = s.rsplit_once(';').ok_or_else(err)?;
        let (host, dispersal) = address.rsplit_once(':').ok_or_else(err)?;
        if host.is_empty() {
            return Err(err());
        }

        Ok(Self {
            host: host.to_string(),
            dispersal_port: dispersal.parse().map_err(|_| err())?,
            retrieval_port: retrieval.parse().map_err(|_| err())?,
        })
    }
}
