//! Registry of the supported ASTERIX formats.
//!
//! Each format has one canonical name. Names are matched case-insensitively and are part of
//! the public interface: scripts and configuration select formats by name.
use std::fmt::Display;
use std::str::FromStr;

use crate::Error;

/// Identifies a physical or container encoding of ASTERIX traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FormatId {
    /// Back-to-back ASTERIX data blocks.
    Raw,
    /// libpcap capture file of UDP datagrams.
    CaptureFile,
    /// Verbose text listing.
    Text,
    /// KML geospatial export.
    GeoExport,
    /// Track summaries.
    Tracks,
    /// Legacy FINAL terminal records.
    Terminal,
    /// XIDEF XML interchange.
    LegacyInterchange,
    /// HDLC framed link.
    Hdlc,
    /// Raw blocks behind Oradis record headers.
    OradisRaw,
    /// Capture file whose datagrams carry Oradis record headers.
    OradisCaptureFile,
    /// One line per record.
    Output,
}

impl FormatId {
    /// Every format, in index order.
    pub const ALL: [FormatId; 11] = [
        FormatId::Raw,
        FormatId::CaptureFile,
        FormatId::Text,
        FormatId::GeoExport,
        FormatId::Tracks,
        FormatId::Terminal,
        FormatId::LegacyInterchange,
        FormatId::Hdlc,
        FormatId::OradisRaw,
        FormatId::OradisCaptureFile,
        FormatId::Output,
    ];

    /// Canonical name of this format.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            FormatId::Raw => "ASTERIX_RAW",
            FormatId::CaptureFile => "ASTERIX_PCAP",
            FormatId::Text => "ASTERIX_TXT",
            FormatId::GeoExport => "ASTERIX_KML",
            FormatId::Tracks => "ASTERIX_TRACKS",
            FormatId::Terminal => "ASTERIX_FINAL",
            FormatId::LegacyInterchange => "ASTERIX_XIDEF",
            FormatId::Hdlc => "ASTERIX_HDLC",
            FormatId::OradisRaw => "ASTERIX_ORADIS_RAW",
            FormatId::OradisCaptureFile => "ASTERIX_ORADIS_PCAP",
            FormatId::Output => "ASTERIX_OUT",
        }
    }

    /// Historical integer selector for this format.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Format for a historical integer selector, or `None` if out of range.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Look up a format by its canonical name, ignoring ASCII case.
    ///
    /// # Example
    /// ```
    /// use asterix::FormatId;
    ///
    /// assert_eq!(FormatId::lookup("asterix_pcap"), Some(FormatId::CaptureFile));
    /// assert_eq!(FormatId::lookup("pcap"), None);
    /// ```
    #[must_use]
    pub fn lookup(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .find(|f| f.name().eq_ignore_ascii_case(name))
            .copied()
    }

    /// Formats that only ever appear on the write side of a pipeline.
    #[must_use]
    pub const fn is_output_only(self) -> bool {
        matches!(
            self,
            FormatId::Text
                | FormatId::GeoExport
                | FormatId::Tracks
                | FormatId::Terminal
                | FormatId::LegacyInterchange
                | FormatId::Output
        )
    }

    /// Formats that can be read but have no writer.
    #[must_use]
    pub const fn is_input_only(self) -> bool {
        matches!(
            self,
            FormatId::CaptureFile | FormatId::OradisCaptureFile | FormatId::Hdlc
        )
    }
}

impl Display for FormatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FormatId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::lookup(s).ok_or_else(|| Error::UnknownFormat(s.to_string()))
    }
}
