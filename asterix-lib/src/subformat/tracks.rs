use std::collections::BTreeMap;
use std::fmt::{Display, Write};
use std::time::{Duration, Instant};

use tracing::debug;

use super::kml::{label, position};
use super::{emit, flush, Outcome, Subformat, Unit};
use crate::descriptor::FormatDescriptor;
use crate::record::Record;
use crate::Channel;

/// Identifies a track across updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackKey {
    pub category: u8,
    pub sac: u64,
    pub sic: u64,
    pub number: u64,
}

impl TrackKey {
    fn from_record(record: &Record) -> Option<Self> {
        let num = |names: &[&str]| {
            names
                .iter()
                .find_map(|n| record.field(n))
                .and_then(|f| f.value.as_u64())
        };
        Some(TrackKey {
            category: record.category,
            sac: num(&["SAC"])?,
            sic: num(&["SIC"])?,
            number: num(&["TRN", "TrkN", "TN"])?,
        })
    }
}

impl Display for TrackKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:03}/{}/{}/{}",
            self.category, self.sac, self.sic, self.number
        )
    }
}

#[derive(Debug, Clone)]
struct Track {
    updates: usize,
    last_seen: Instant,
}

/// Track table with one line written per track update.
///
/// The heartbeat drops tracks that have not been updated within the track timeout.
#[derive(Debug)]
pub struct TracksFormat {
    timeout: Duration,
    tracks: BTreeMap<TrackKey, Track>,
}

impl Default for TracksFormat {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT)
    }
}

impl TracksFormat {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            tracks: BTreeMap::default(),
        }
    }

    /// Number of tracks currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl Subformat for TracksFormat {
    fn write_unit(
        &mut self,
        _ctx: &FormatDescriptor,
        ch: &mut dyn Channel,
        unit: &mut Unit,
    ) -> Outcome {
        let timestamp = unit.timestamp_or_now().to_rfc3339();
        let now = Instant::now();
        let mut s = String::new();
        for record in unit.records() {
            let Some(key) = TrackKey::from_record(record) else {
                continue;
            };
            let track = self.tracks.entry(key).or_insert(Track {
                updates: 0,
                last_seen: now,
            });
            track.updates += 1;
            track.last_seen = now;

            let state = if track.updates == 1 { "new" } else { "update" };
            let _ = write!(s, "{timestamp} {state} {key} updates={}", track.updates);
            if let Some((lat, lon)) = position(record) {
                let _ = write!(s, " lat={lat:.6} lon={lon:.6}");
            }
            if let Some(label) = label(record) {
                let _ = write!(s, " id={label}");
            }
            s.push('\n');
        }
        if s.is_empty() {
            return Outcome::Discarded;
        }
        emit(ch, s.as_bytes())
    }

    fn heartbeat(&mut self, _ctx: &FormatDescriptor, ch: &mut dyn Channel) -> bool {
        let timeout = self.timeout;
        let mut dropped = Vec::new();
        self.tracks.retain(|key, track| {
            let keep = track.last_seen.elapsed() <= timeout;
            if !keep {
                dropped.push((*key, track.updates));
            }
            keep
        });

        if !dropped.is_empty() {
            debug!(count = dropped.len(), "dropped idle tracks");
            let mut s = String::new();
            for (key, updates) in dropped {
                let _ = writeln!(s, "dropped {key} updates={updates}");
            }
            emit(ch, s.as_bytes());
        }
        flush(ch);
        true
    }
}
