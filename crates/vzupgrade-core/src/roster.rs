//! Typed view of the virtualization control plane's guest listing.
//!
//! The listing is requested as `uuid,status,autostart,name` without a header;
//! everything downstream works on [`GuestRecord`] values.

use std::collections::BTreeSet;

use anyhow::{anyhow, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuestState {
    Running,
    Suspended,
    Stopped,
    /// Starting, stopping, paused, mounted and other in-between states, kept
    /// verbatim for diagnostics.
    Transitional(String),
}

impl GuestState {
    pub fn parse(token: &str) -> Self {
        match token {
            "running" => Self::Running,
            "suspended" => Self::Suspended,
            "stopped" => Self::Stopped,
            other => Self::Transitional(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Running => "running",
            Self::Suspended => "suspended",
            Self::Stopped => "stopped",
            Self::Transitional(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestRecord {
    pub id: String,
    pub name: String,
    pub state: GuestState,
    pub autostart: bool,
}

pub fn parse_roster(raw: &str) -> Result<Vec<GuestRecord>> {
    let mut guests = Vec::new();
    for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let mut fields = line.split_whitespace();
        let (Some(id), Some(state), Some(autostart)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(anyhow!("malformed guest roster row: {line}"));
        };
        let name = fields.collect::<Vec<_>>().join(" ");

        guests.push(GuestRecord {
            id: id.to_string(),
            name: if name.is_empty() { id.to_string() } else { name },
            state: GuestState::parse(state),
            autostart: parse_autostart(autostart),
        });
    }
    Ok(guests)
}

/// `on`, `auto` and `yes` all start the guest with the host.
fn parse_autostart(token: &str) -> bool {
    matches!(token, "on" | "auto" | "yes")
}

pub fn parse_guest_ids(raw: &str) -> BTreeSet<String> {
    raw.lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}
