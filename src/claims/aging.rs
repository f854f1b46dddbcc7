use chrono::{DateTime, Utc};
use serde::Serialize;

/// Days since filing, bucketed the way collections worklists expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AgingBucket {
    #[serde(rename = "0-30")]
    Current,
    #[serde(rename = "31-60")]
    Days31To60,
    #[serde(rename = "61-90")]
    Days61To90,
    #[serde(rename = "91-120")]
    Days91To120,
    #[serde(rename = "120+")]
    Over120,
}

impl AgingBucket {
    pub fn label(&self) -> &'static str {
        match self {
            AgingBucket::Current => "0-30",
            AgingBucket::Days31To60 => "31-60",
            AgingBucket::Days61To90 => "61-90",
            AgingBucket::Days91To120 => "91-120",
            AgingBucket::Over120 => "120+",
        }
    }
}

/// Classifies a claim by whole days elapsed since it was filed. A claim
/// filed in the future counts as current.
pub fn aging_bucket(filed_at: DateTime<Utc>, now: DateTime<Utc>) -> AgingBucket {
    let days = (now - filed_at).num_days();
    match days {
        d if d <= 30 => AgingBucket::Current,
        d if d <= 60 => AgingBucket::Days31To60,
        d if d <= 90 => AgingBucket::Days61To90,
        d if d <= 120 => AgingBucket::Days91To120,
        _ => AgingBucket::Over120,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(days_ago: i64) -> (DateTime<Utc>, DateTime<Utc>) {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        (now - Duration::days(days_ago), now)
    }

    #[test]
    fn bucket_boundaries() {
        for (days, expected) in [
            (0, AgingBucket::Current),
            (30, AgingBucket::Current),
            (31, AgingBucket::Days31To60),
            (60, AgingBucket::Days31To60),
            (61, AgingBucket::Days61To90),
            (90, AgingBucket::Days61To90),
            (91, AgingBucket::Days91To120),
            (120, AgingBucket::Days91To120),
            (121, AgingBucket::Over120),
            (400, AgingBucket::Over120),
        ] {
            let (filed, now) = at(days);
            assert_eq!(aging_bucket(filed, now), expected, "{days} days");
        }
    }

    #[test]
    fn future_filing_counts_as_current() {
        let (filed, now) = at(-5);
        assert_eq!(aging_bucket(filed, now), AgingBucket::Current);
    }
}
