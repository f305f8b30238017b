// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Ledger enumerations.
//!
//! External callers hand these in as strings; `FromStr` is the validation
//! boundary and rejects anything outside the recognised set.

use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::KernelError;

/// Visibility tier of an event. Ordered: `Local < Regional < Global < Legendary`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Rank {
    Local = 0,
    Regional = 1,
    Global = 2,
    Legendary = 3,
}

impl Rank {
    pub const ALL: [Rank; 4] = [Rank::Local, Rank::Regional, Rank::Global, Rank::Legendary];

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Rank::Local),
            1 => Some(Rank::Regional),
            2 => Some(Rank::Global),
            3 => Some(Rank::Legendary),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rank::Local => "local",
            Rank::Regional => "regional",
            Rank::Global => "global",
            Rank::Legendary => "legendary",
        }
    }

    /// Weight used by chain prestige scoring.
    pub fn prestige_weight(&self) -> u64 {
        match self {
            Rank::Local => 1,
            Rank::Regional => 3,
            Rank::Global => 8,
            Rank::Legendary => 20,
        }
    }
}

impl Default for Rank {
    fn default() -> Self {
        Rank::Local
    }
}

impl FromStr for Rank {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Rank::Local),
            "regional" => Ok(Rank::Regional),
            "global" => Ok(Rank::Global),
            "legendary" => Ok(Rank::Legendary),
            other => Err(KernelError::Validation(format!("unknown rank '{}'", other))),
        }
    }
}

/// Who may receive a broadcast of an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Scope {
    Private = 0,
    Connections = 1,
    Public = 2,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Private => "private",
            Scope::Connections => "connections",
            Scope::Public => "public",
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Scope::Public
    }
}

impl FromStr for Scope {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "private" => Ok(Scope::Private),
            "connections" => Ok(Scope::Connections),
            "public" => Ok(Scope::Public),
            other => Err(KernelError::Validation(format!("unknown scope '{}'", other))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum EventType {
    JobCompleted = 0,
    Milestone = 1,
    StampUnlock = 2,
    ReviewReceived = 3,
    ProviderVerified = 4,
    /// Minted by the ledger itself when a chain is sealed.
    ChainSealed = 5,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::JobCompleted => "job-completed",
            EventType::Milestone => "milestone",
            EventType::StampUnlock => "stamp-unlock",
            EventType::ReviewReceived => "review-received",
            EventType::ProviderVerified => "provider-verified",
            EventType::ChainSealed => "chain-sealed",
        }
    }

    /// Types only the ledger may emit.
    pub fn is_reserved(&self) -> bool {
        matches!(self, EventType::ChainSealed)
    }
}

impl FromStr for EventType {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "job-completed" => Ok(EventType::JobCompleted),
            "milestone" => Ok(EventType::Milestone),
            "stamp-unlock" => Ok(EventType::StampUnlock),
            "review-received" => Ok(EventType::ReviewReceived),
            "provider-verified" => Ok(EventType::ProviderVerified),
            "chain-sealed" => Ok(EventType::ChainSealed),
            _ => Err(KernelError::Validation(format!("unknown event type '{}'", s))),
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
