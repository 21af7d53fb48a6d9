// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

/// Instant that tags a new load generation.
///
/// Truncated to microseconds, the precision of the stored text form, so a
/// record read back from the store compares equal to the one written.
pub fn generation_timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Canonical on-disk form of a load timestamp, e.g. `2026-10-18T09:30:00.123456Z`.
pub fn format_load_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_load_timestamp(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(text).map(|dt| dt.with_timezone(&Utc))
}
