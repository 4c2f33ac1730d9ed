use std::fs::File;
use std::io::{stdin, stdout, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use asterix::{
    Channel, FormatDescriptor, FormatId, Pipeline, PipelineOptions, ReadChannel, Summary,
    WriteChannel,
};
use tracing::info;

/// Open `path` for reading; `-` is stdin.
pub fn open_input(path: &Path) -> Result<ReadChannel<Box<dyn Read>>> {
    let reader: Box<dyn Read> = if path == Path::new("-") {
        Box::new(stdin().lock())
    } else {
        let file = File::open(path).with_context(|| format!("opening input {path:?}"))?;
        Box::new(BufReader::new(file))
    };
    Ok(ReadChannel::new(reader))
}

fn open_output(path: Option<&Path>, clobber: bool) -> Result<WriteChannel<Box<dyn Write>>> {
    let writer: Box<dyn Write> = match path {
        Some(path) => {
            if !clobber && path.exists() {
                bail!("{path:?} exists; use --clobber");
            }
            let file =
                File::create(path).with_context(|| format!("failed to create output {path:?}"))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(stdout().lock()),
    };
    Ok(WriteChannel::new(writer))
}

fn check_formats(input_format: FormatId, output_format: Option<FormatId>) -> Result<()> {
    if input_format.is_output_only() {
        bail!("{input_format} cannot be used as an input format");
    }
    if let Some(format) = output_format.filter(|f| f.is_input_only()) {
        bail!("{format} cannot be used as an output format");
    }
    Ok(())
}

/// Run a single pass from `input` to `output`.
pub fn run(
    ctx: Arc<FormatDescriptor>,
    input: &mut dyn Channel,
    input_format: FormatId,
    output: &mut dyn Channel,
    output_format: Option<FormatId>,
) -> Result<Summary> {
    check_formats(input_format, output_format)?;
    let mut pipeline = Pipeline::new(ctx, input_format, output_format, PipelineOptions::default());
    let summary = pipeline.run(input, output);
    output.flush().context("flushing output")?;
    Ok(summary)
}

pub fn convert(
    ctx: Arc<FormatDescriptor>,
    input: &Path,
    input_format: FormatId,
    output: Option<&Path>,
    output_format: Option<FormatId>,
    clobber: bool,
) -> Result<()> {
    check_formats(input_format, output_format)?;
    let mut src = open_input(input)?;
    let mut dest = open_output(output, clobber)?;

    info!(
        "converting {input:?} from {input_format} to {}",
        output_format.map_or("nothing".to_string(), |f| f.to_string())
    );
    let summary = run(ctx, &mut src, input_format, &mut dest, output_format)?;
    info!(
        read = summary.units_read,
        discarded = summary.units_discarded,
        written = summary.units_written,
        records = summary.records,
        "done"
    );
    Ok(())
}
