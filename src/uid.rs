//! Unique IDs that embed their creation time.
//!
//! Mostly useful in tests that create named resources (log names, buckets): runs do not
//! collide, and leftovers of runs that exited early can be recognized by age and cleaned up.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, NaiveDate, TimeDelta, Timelike, Utc};

/// Options for a [`Space`].
#[derive(Debug, Clone, Copy)]
pub struct Options {
    /// Separates the parts of an ID. Defaults to `-`.
    pub sep: char,
    /// The time embedded in every ID. Defaults to the creation time of the space.
    pub time: Option<DateTime<Utc>>,
    /// Use `prefix-<unix nanos>-NN` instead of `prefix-YYYYMMDD-<nanos of day>-NNNN`.
    pub short: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            sep: '-',
            time: None,
            short: false,
        }
    }
}

/// A namespace of unique IDs sharing a prefix and a timestamp.
#[derive(Debug)]
pub struct Space {
    prefix: String,
    sep: char,
    time: DateTime<Utc>,
    short: bool,
    count: AtomicU64,
}

impl Space {
    pub fn new(prefix: &str, opts: Options) -> Self {
        Self {
            prefix: prefix.to_string(),
            sep: opts.sep,
            time: opts.time.unwrap_or_else(Utc::now),
            short: opts.short,
            count: AtomicU64::new(0),
        }
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// The next ID of this space.
    pub fn new_id(&self) -> String {
        let count = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        let sep = self.sep;
        if self.short {
            let nanos = crate::config::unix_nanos(self.time);
            return format!("{}{sep}{nanos}{sep}{count:02}", self.prefix);
        }
        let nanos_of_day = i64::from(self.time.num_seconds_from_midnight()) * 1_000_000_000
            + i64::from(self.time.nanosecond());
        format!(
            "{}{sep}{}{sep}{nanos_of_day}{sep}{count:04}",
            self.prefix,
            self.time.format("%Y%m%d")
        )
    }

    /// The time embedded in `id`, or `None` when `id` does not belong to this space.
    pub fn timestamp(&self, id: &str) -> Option<DateTime<Utc>> {
        let rest = id.strip_prefix(self.prefix.as_str())?.strip_prefix(self.sep)?;
        let parts: Vec<&str> = rest.split(self.sep).collect();
        if self.short {
            let [nanos, count] = parts.as_slice() else {
                return None;
            };
            count.parse::<u64>().ok()?;
            return Some(DateTime::from_timestamp_nanos(nanos.parse().ok()?));
        }
        let [date, nanos, count] = parts.as_slice() else {
            return None;
        };
        count.parse::<u64>().ok()?;
        let midnight = NaiveDate::parse_from_str(date, "%Y%m%d")
            .ok()?
            .and_hms_opt(0, 0, 0)?
            .and_utc();
        Some(midnight + TimeDelta::nanoseconds(nanos.parse().ok()?))
    }

    /// Whether `id` belongs to this space and was made more than `d` ago.
    pub fn older(&self, id: &str, d: TimeDelta) -> bool {
        self.timestamp(id)
            .map(|ts| Utc::now() - ts > d)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    fn at(y: i32, m: u32, d: u32, nanos: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap() + TimeDelta::nanoseconds(i64::from(nanos))
    }

    #[test]
    fn ids_count_up() {
        let time = at(2017, 1, 6, 21);
        let space = Space::new("prefix", Options { time: Some(time), ..Options::default() });
        assert_eq!(space.new_id(), "prefix-20170106-21-0001");
        assert_eq!(space.new_id(), "prefix-20170106-21-0002");

        let underscored = Space::new(
            "prefix2",
            Options {
                sep: '_',
                time: Some(time),
                short: false,
            },
        );
        assert_eq!(underscored.new_id(), "prefix2_20170106_21_0001");
    }

    #[test]
    fn timestamps_parse_back() {
        let space = Space::new("unique-ID", Options::default());
        let id = space.new_id();
        assert_eq!(space.timestamp(&id), Some(space.time()));

        assert_eq!(space.timestamp("unique-ID-20160308-123-8"), Some(at(2016, 3, 8, 123)));
        assert_eq!(space.timestamp("invalid-time-1234"), None);
        assert_eq!(space.timestamp("unique-ID-2016-123-8"), None);
    }

    #[test]
    fn short_ids() {
        let now = Utc::now();
        let space = Space::new(
            "uid",
            Options {
                short: true,
                time: Some(now),
                ..Options::default()
            },
        );
        let id = space.new_id();
        assert_eq!(id, format!("uid-{}-01", now.timestamp_nanos_opt().unwrap()));
        assert_eq!(space.timestamp(&id), Some(now));
    }

    #[test]
    fn only_old_ids_of_this_space_are_older() {
        let space = Space::new("uid", Options::default());
        let other = Space::new("different-prefix", Options::default()).new_id();
        assert!(!space.older(&other, TimeDelta::seconds(1)));

        let old = Space::new(
            "uid",
            Options {
                time: Some(Utc::now() - TimeDelta::hours(2)),
                ..Options::default()
            },
        )
        .new_id();
        assert!(space.older(&old, TimeDelta::hours(1)));
        assert!(!space.older(&space.new_id(), TimeDelta::hours(1)));
    }
}
