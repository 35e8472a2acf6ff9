use serde::Serialize;
use std::fmt;

/// Delivery strategy for one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// Single bounded `sendDocument` call through the bot credential.
    Simple,
    /// Streamed upload through the long-lived session client.
    Session,
}

impl Transport {
    /// Pick the transport for a payload of `size` bytes.
    ///
    /// Everything up to and including `threshold` goes through [`Transport::Simple`];
    /// anything larger always goes through [`Transport::Session`].
    pub fn select(size: u64, threshold: u64) -> Self {
        if size <= threshold {
            Transport::Simple
        } else {
            Transport::Session
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Simple => "simple",
            Transport::Session => "session",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
