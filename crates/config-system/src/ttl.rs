//! Lifetime of temporary dashboards, written as `<int><unit>`

use crate::{ConfigError, Result};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlUnit {
    Minutes,
    Days,
    Weeks,
}

impl TtlUnit {
    fn millis(self) -> u64 {
        match self {
            TtlUnit::Minutes => 60_000,
            TtlUnit::Days => 86_400_000,
            TtlUnit::Weeks => 604_800_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ttl {
    pub amount: u64,
    pub unit: TtlUnit,
}

impl Ttl {
    /// Parse `30d`, `15m`, `2W`. The unit is the last character and is
    /// case-insensitive; anything other than m, d or w is rejected.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let invalid = || ConfigError::InvalidTtl(input.to_string());

        let unit_char = input.chars().last().ok_or_else(invalid)?;
        let amount = &input[..input.len() - unit_char.len_utf8()];

        let unit = match unit_char.to_ascii_lowercase() {
            'm' => TtlUnit::Minutes,
            'd' => TtlUnit::Days,
            'w' => TtlUnit::Weeks,
            _ => return Err(invalid()),
        };
        let amount = amount.parse::<u64>().map_err(|_| invalid())?;

        Ok(Self { amount, unit })
    }

    pub fn as_millis(&self) -> u64 {
        self.amount.saturating_mul(self.unit.millis())
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.as_millis())
    }

    /// Expiry instant in epoch milliseconds for a dashboard saved at `now_ms`
    pub fn expires_at(&self, now_ms: i64) -> i64 {
        now_ms.saturating_add(self.as_millis() as i64)
    }
}
