use std::str::FromStr;

use crate::model::ChatRoom;

const HOUR_SECS: i64 = 60 * 60;

/// User-facing mute durations. This is the only place they are interpreted.
#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MuteDuration {
    EightHours,
    OneDay,
    Always,
}

impl FromStr for MuteDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "8h" => Ok(MuteDuration::EightHours),
            "24h" => Ok(MuteDuration::OneDay),
            "always" => Ok(MuteDuration::Always),
            other => Err(format!("unknown mute duration: {other}")),
        }
    }
}

/// `None` means muted indefinitely.
pub fn resolve_mute_expiry(choice: MuteDuration, now: i64) -> Option<i64> {
    match choice {
        MuteDuration::EightHours => Some(now + 8 * HOUR_SECS),
        MuteDuration::OneDay => Some(now + 24 * HOUR_SECS),
        MuteDuration::Always => None,
    }
}

/// A stored mute whose expiry has passed reads as unmuted; the flag itself is
/// left alone until the backend writes it again.
pub fn is_muted_at(is_muted: bool, muted_until: Option<i64>, now: i64) -> bool {
    if !is_muted {
        return false;
    }
    match muted_until {
        None => true,
        Some(until) => until > now,
    }
}

pub fn is_effectively_muted(room: &ChatRoom, now: i64) -> bool {
    is_muted_at(room.is_muted, room.muted_until, now)
}
