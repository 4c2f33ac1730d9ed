//! Routes pipeline operations to the subformat selected by a [FormatId].
use tracing::error;

use crate::descriptor::FormatDescriptor;
use crate::pipeline::PipelineOptions;
use crate::subformat::{
    Convention, HdlcFormat, KmlFormat, OutFormat, Outcome, PcapFormat, RawFormat, Subformat,
    TerminalFormat, TextFormat, TracksFormat, Unit, XidefFormat,
};
use crate::{Channel, FormatId, Status};

/// The subformat backing each [FormatId].
#[derive(Debug)]
pub enum Handler {
    Raw(RawFormat),
    CaptureFile(PcapFormat),
    Text(TextFormat),
    GeoExport(KmlFormat),
    Tracks(TracksFormat),
    Terminal(TerminalFormat),
    LegacyInterchange(XidefFormat),
    Hdlc(HdlcFormat),
    OradisRaw(RawFormat),
    OradisCaptureFile(PcapFormat),
    Output(OutFormat),
}

impl Handler {
    /// Handler for `format` with default options.
    #[must_use]
    pub fn new(format: FormatId) -> Self {
        Self::with_options(format, &PipelineOptions::default())
    }

    #[must_use]
    pub fn with_options(format: FormatId, opts: &PipelineOptions) -> Self {
        let idle = opts.idle_timeout;
        match format {
            FormatId::Raw => {
                Handler::Raw(RawFormat::new(Convention::Standard).with_idle_timeout(idle))
            }
            FormatId::CaptureFile => {
                Handler::CaptureFile(PcapFormat::new(Convention::Standard).with_idle_timeout(idle))
            }
            FormatId::Text => Handler::Text(TextFormat::new()),
            FormatId::GeoExport => Handler::GeoExport(KmlFormat::new()),
            FormatId::Tracks => Handler::Tracks(TracksFormat::new(opts.track_timeout)),
            FormatId::Terminal => Handler::Terminal(TerminalFormat::default()),
            FormatId::LegacyInterchange => Handler::LegacyInterchange(XidefFormat::new()),
            FormatId::Hdlc => Handler::Hdlc(HdlcFormat::new().with_idle_timeout(idle)),
            FormatId::OradisRaw => {
                Handler::OradisRaw(RawFormat::new(Convention::Oradis).with_idle_timeout(idle))
            }
            FormatId::OradisCaptureFile => Handler::OradisCaptureFile(
                PcapFormat::new(Convention::Oradis).with_idle_timeout(idle),
            ),
            FormatId::Output => Handler::Output(OutFormat::new()),
        }
    }

    /// Handler for a historical integer format selector.
    ///
    /// An index outside the closed set of formats is a programming error: it panics in debug
    /// builds and is logged and reported as `None` otherwise.
    #[must_use]
    pub fn for_index(index: usize) -> Option<Self> {
        let format = FormatId::from_index(index);
        debug_assert!(format.is_some(), "format index {index} out of range");
        match format {
            Some(format) => Some(Self::new(format)),
            None => {
                error!(index, "format index out of range");
                None
            }
        }
    }

    #[must_use]
    pub fn format(&self) -> FormatId {
        match self {
            Handler::Raw(_) => FormatId::Raw,
            Handler::CaptureFile(_) => FormatId::CaptureFile,
            Handler::Text(_) => FormatId::Text,
            Handler::GeoExport(_) => FormatId::GeoExport,
            Handler::Tracks(_) => FormatId::Tracks,
            Handler::Terminal(_) => FormatId::Terminal,
            Handler::LegacyInterchange(_) => FormatId::LegacyInterchange,
            Handler::Hdlc(_) => FormatId::Hdlc,
            Handler::OradisRaw(_) => FormatId::OradisRaw,
            Handler::OradisCaptureFile(_) => FormatId::OradisCaptureFile,
            Handler::Output(_) => FormatId::Output,
        }
    }

    fn subformat(&mut self) -> &mut dyn Subformat {
        match self {
            Handler::Raw(f) | Handler::OradisRaw(f) => f,
            Handler::CaptureFile(f) | Handler::OradisCaptureFile(f) => f,
            Handler::Text(f) => f,
            Handler::GeoExport(f) => f,
            Handler::Tracks(f) => f,
            Handler::Terminal(f) => f,
            Handler::LegacyInterchange(f) => f,
            Handler::Hdlc(f) => f,
            Handler::Output(f) => f,
        }
    }
}

/// Frame the next unit from `ch`.
pub fn dispatch_read(
    ctx: &FormatDescriptor,
    ch: &mut dyn Channel,
    handler: &mut Handler,
    unit: &mut Unit,
) -> Outcome {
    handler.subformat().read_unit(ctx, ch, unit)
}

/// Decode the unit last read. Every call starts from a not-discarded state; the result
/// only reflects this call.
pub fn dispatch_decode(
    ctx: &FormatDescriptor,
    ch: &mut dyn Channel,
    handler: &mut Handler,
    unit: &mut Unit,
) -> Outcome {
    handler.subformat().decode_unit(ctx, ch, unit)
}

pub fn dispatch_write(
    ctx: &FormatDescriptor,
    ch: &mut dyn Channel,
    handler: &mut Handler,
    unit: &mut Unit,
) -> Outcome {
    handler.subformat().write_unit(ctx, ch, unit)
}

/// Run periodic maintenance. Returns false for formats without any.
pub fn dispatch_heartbeat(
    ctx: &FormatDescriptor,
    ch: &mut dyn Channel,
    handler: &mut Handler,
) -> bool {
    handler.subformat().heartbeat(ctx, ch)
}

/// Complete any output that spans the whole pass, e.g., document footers.
pub fn dispatch_finish(
    ctx: &FormatDescriptor,
    ch: &mut dyn Channel,
    handler: &mut Handler,
) -> bool {
    handler.subformat().finish(ctx, ch)
}

/// Notification that an input channel was reset. Nothing to do at this level.
#[must_use]
pub fn on_reset_input_channel(_ctx: &FormatDescriptor) -> bool {
    false
}

/// Notification that output channel `index` was reset.
#[must_use]
pub fn on_reset_output_channel(_index: usize, _ctx: &FormatDescriptor) -> bool {
    true
}

/// Data status of `ch`. The same rule applies to every format.
#[must_use]
pub fn get_status(ch: &dyn Channel, _format: FormatId) -> Status {
    if ch.is_open() {
        Status::Ok
    } else {
        Status::NoData
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use test_case::test_case;

    use super::*;
    use crate::definition::Definition;
    use crate::record::tests::{test_definition, BLOCK};
    use crate::{ReadChannel, WriteChannel};

    fn ctx() -> FormatDescriptor {
        FormatDescriptor::new(test_definition())
    }

    #[test]
    fn handler_matches_format() {
        for format in FormatId::ALL {
            assert_eq!(Handler::new(format).format(), format);
        }
    }

    #[test]
    fn for_index_covers_closed_set() {
        for format in FormatId::ALL {
            let handler = Handler::for_index(format.index()).unwrap();
            assert_eq!(handler.format(), format);
        }
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "out of range"))]
    fn for_index_outside_closed_set() {
        assert!(Handler::for_index(FormatId::ALL.len()).is_none());
    }

    #[test_case(FormatId::Text)]
    #[test_case(FormatId::GeoExport)]
    #[test_case(FormatId::Tracks)]
    #[test_case(FormatId::Terminal)]
    #[test_case(FormatId::LegacyInterchange)]
    #[test_case(FormatId::Output)]
    fn output_only_formats_do_not_read_or_decode(format: FormatId) {
        let ctx = ctx();
        let mut ch = ReadChannel::new(&BLOCK[..]);
        let mut handler = Handler::new(format);
        let mut unit = Unit::new();
        unit.set(&BLOCK, Utc::now());

        assert_eq!(
            dispatch_read(&ctx, &mut ch, &mut handler, &mut unit),
            Outcome::Unsupported
        );
        assert_eq!(
            dispatch_decode(&ctx, &mut ch, &mut handler, &mut unit),
            Outcome::Unsupported
        );
        assert!(unit.blocks.is_empty());
        assert_eq!(unit.data, BLOCK.to_vec());
    }

    #[test_case(FormatId::Raw, true, true)]
    #[test_case(FormatId::CaptureFile, false, true)]
    #[test_case(FormatId::Text, true, false)]
    #[test_case(FormatId::GeoExport, false, false)]
    #[test_case(FormatId::Tracks, true, true)]
    #[test_case(FormatId::Terminal, true, true)]
    #[test_case(FormatId::LegacyInterchange, true, false)]
    #[test_case(FormatId::Hdlc, false, true)]
    #[test_case(FormatId::OradisRaw, true, true)]
    #[test_case(FormatId::OradisCaptureFile, false, true)]
    #[test_case(FormatId::Output, true, false)]
    fn write_and_heartbeat_support(format: FormatId, writes: bool, heartbeat: bool) {
        let ctx = ctx();
        let mut unit = Unit::new();
        unit.set(&BLOCK, Utc::now());
        let mut decoder = Handler::new(FormatId::Raw);
        let mut input = ReadChannel::new(std::io::empty());
        assert_eq!(
            dispatch_decode(&ctx, &mut input, &mut decoder, &mut unit),
            Outcome::Consumed
        );

        let mut out = WriteChannel::new(Vec::new());
        let mut handler = Handler::new(format);
        let outcome = dispatch_write(&ctx, &mut out, &mut handler, &mut unit);
        if writes {
            assert_eq!(outcome, Outcome::Consumed, "{format}");
            assert!(!out.get_ref().unwrap().is_empty());
        } else {
            assert_ne!(outcome, Outcome::Consumed, "{format}");
        }
        assert_eq!(dispatch_heartbeat(&ctx, &mut out, &mut handler), heartbeat);
    }

    #[test]
    fn decode_starts_without_discard() {
        let ctx = ctx();
        let mut ch = ReadChannel::new(std::io::empty());
        let mut handler = Handler::new(FormatId::Raw);
        let mut unit = Unit::new();

        unit.set(&[0x30, 0x00, 0x10], Utc::now());
        assert_eq!(
            dispatch_decode(&ctx, &mut ch, &mut handler, &mut unit),
            Outcome::Discarded
        );
        unit.set(&BLOCK, Utc::now());
        assert_eq!(
            dispatch_decode(&ctx, &mut ch, &mut handler, &mut unit),
            Outcome::Consumed
        );
    }

    #[test]
    fn reset_hooks() {
        let ctx = FormatDescriptor::new(Definition::new());
        assert!(!on_reset_input_channel(&ctx));
        assert!(on_reset_output_channel(0, &ctx));
        assert!(on_reset_output_channel(7, &ctx));
    }

    #[test]
    fn status_follows_channel_state() {
        for format in FormatId::ALL {
            let mut ch = ReadChannel::new(&BLOCK[..]);
            assert_eq!(get_status(&ch, format), Status::Ok);
            ch.close();
            assert_eq!(get_status(&ch, format), Status::NoData);
        }
    }
}
