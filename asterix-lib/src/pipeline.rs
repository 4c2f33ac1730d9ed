//! Read, decode and write units from one channel to another.
use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, trace};
use typed_builder::TypedBuilder;

use crate::descriptor::FormatDescriptor;
use crate::dispatch::{
    dispatch_decode, dispatch_finish, dispatch_heartbeat, dispatch_read, dispatch_write, Handler,
};
use crate::subformat::{Outcome, Unit};
use crate::{Channel, FormatId};

#[derive(Debug, Clone, TypedBuilder)]
pub struct PipelineOptions {
    /// Time between heartbeats.
    #[builder(default = Duration::from_secs(1))]
    pub heartbeat_interval: Duration,
    /// Tracks not updated within this time are dropped.
    #[builder(default = Duration::from_secs(60))]
    pub track_timeout: Duration,
    /// Input idle time before a warning is logged.
    #[builder(default = Duration::from_secs(30))]
    pub idle_timeout: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Counts for a single category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CategorySummary {
    pub blocks: usize,
    pub records: usize,
}

/// Counts from a pipeline pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Summary {
    pub units_read: usize,
    pub units_discarded: usize,
    pub units_decoded: usize,
    pub units_written: usize,
    pub blocks: usize,
    pub records: usize,
    pub categories: BTreeMap<u8, CategorySummary>,
}

impl Summary {
    fn add(&mut self, unit: &Unit) {
        self.units_decoded += 1;
        for block in &unit.blocks {
            self.blocks += 1;
            self.records += block.records.len();
            let cat = self.categories.entry(block.category).or_default();
            cat.blocks += 1;
            cat.records += block.records.len();
        }
    }
}

impl Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Units:")?;
        writeln!(f, "  read:      {}", self.units_read)?;
        writeln!(f, "  discarded: {}", self.units_discarded)?;
        writeln!(f, "  decoded:   {}", self.units_decoded)?;
        writeln!(f, "  written:   {}", self.units_written)?;
        writeln!(f, "Blocks:      {}", self.blocks)?;
        writeln!(f, "Records:     {}", self.records)?;
        writeln!(f, "Categories:")?;
        for (cat, s) in &self.categories {
            writeln!(f, "  {cat:03}: blocks={} records={}", s.blocks, s.records)?;
        }
        Ok(())
    }
}

/// Drives an input format and an optional output format over a pair of channels.
///
/// Each iteration reads one unit, decodes it, and writes it if decoding consumed it. A
/// discarded unit skips the remaining phases. Heartbeats for both sides run whenever the
/// heartbeat interval has elapsed.
#[derive(Debug)]
pub struct Pipeline {
    ctx: Arc<FormatDescriptor>,
    input: Handler,
    output: Option<Handler>,
    opts: PipelineOptions,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        ctx: Arc<FormatDescriptor>,
        input: FormatId,
        output: Option<FormatId>,
        opts: PipelineOptions,
    ) -> Self {
        Self {
            input: Handler::with_options(input, &opts),
            output: output.map(|f| Handler::with_options(f, &opts)),
            ctx,
            opts,
        }
    }

    /// Run until the input is exhausted. Output is written to `output` when an output format
    /// is configured.
    pub fn run(&mut self, input: &mut dyn Channel, output: &mut dyn Channel) -> Summary {
        let ctx = Arc::clone(&self.ctx);
        let ctx = ctx.as_ref();
        let mut summary = Summary::default();
        let mut unit = Unit::new();
        let mut last_heartbeat = Instant::now();

        loop {
            if last_heartbeat.elapsed() >= self.opts.heartbeat_interval {
                self.heartbeat(ctx, input, output);
                last_heartbeat = Instant::now();
            }

            match dispatch_read(ctx, input, &mut self.input, &mut unit) {
                Outcome::Consumed => summary.units_read += 1,
                Outcome::Discarded => {
                    summary.units_discarded += 1;
                    continue;
                }
                Outcome::EndOfStream => break,
                Outcome::Unsupported => {
                    error!(format = %self.input.format(), "format cannot be read");
                    break;
                }
            }

            match dispatch_decode(ctx, input, &mut self.input, &mut unit) {
                Outcome::Consumed => summary.add(&unit),
                Outcome::Discarded => {
                    summary.units_discarded += 1;
                    continue;
                }
                Outcome::EndOfStream => break,
                Outcome::Unsupported => continue,
            }

            let Some(handler) = self.output.as_mut() else {
                continue;
            };
            match dispatch_write(ctx, output, handler, &mut unit) {
                Outcome::Consumed => summary.units_written += 1,
                Outcome::EndOfStream => break,
                outcome => trace!(?outcome, "unit not written"),
            }
        }

        if let Some(handler) = self.output.as_mut() {
            dispatch_finish(ctx, output, handler);
        }
        self.heartbeat(ctx, input, output);
        debug!(
            read = summary.units_read,
            discarded = summary.units_discarded,
            written = summary.units_written,
            "pipeline finished"
        );
        summary
    }

    fn heartbeat(
        &mut self,
        ctx: &FormatDescriptor,
        input: &mut dyn Channel,
        output: &mut dyn Channel,
    ) {
        dispatch_heartbeat(ctx, input, &mut self.input);
        if let Some(handler) = self.output.as_mut() {
            dispatch_heartbeat(ctx, output, handler);
        }
    }
}
