use std::io::{stdout, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use asterix::{FormatDescriptor, FormatId, Summary, WriteChannel};
use handlebars::handlebars_helper;
use serde::Serialize;

use crate::convert::{open_input, run};

#[derive(Debug, Clone)]
pub enum Format {
    Json,
    Text,
}

impl clap::ValueEnum for Format {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Json, Self::Text]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            Self::Json => Some(clap::builder::PossibleValue::new("json")),
            Self::Text => Some(clap::builder::PossibleValue::new("text")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct Info {
    filename: String,
    format: String,
    summary: Summary,
}

fn summarize(ctx: Arc<FormatDescriptor>, fpath: &Path, input_format: FormatId) -> Result<Info> {
    let mut src = open_input(fpath)?;
    let mut sink = WriteChannel::new(std::io::sink());
    let summary = run(ctx, &mut src, input_format, &mut sink, None)?;

    Ok(Info {
        filename: fpath.to_string_lossy().to_string(),
        format: input_format.name().to_string(),
        summary,
    })
}

pub fn info(
    ctx: Arc<FormatDescriptor>,
    fpath: &Path,
    input_format: FormatId,
    format: &Format,
) -> Result<()> {
    let info = summarize(ctx, fpath, input_format)?;

    match format {
        Format::Json => {
            serde_json::to_writer_pretty(stdout(), &info).context("serializing to json")
        }
        Format::Text => {
            let data = render_text(&info).context("serializing info")?;
            stdout()
                .write_all(str::as_bytes(&data))
                .context("writing to stdout")
        }
    }
}

fn render_text(info: &Info) -> Result<String> {
    handlebars_helper!(left_pad: |num: u64, v: Json| {
        let v = match v {
            serde_json::Value::String(s) => s.to_owned(),
            serde_json::Value::Null => String::new(),
            _ => v.to_string()
        };
        let num = usize::try_from(num).unwrap_or_default().max(v.len());
        format!("{v:>num$}")
    });
    let mut hb = handlebars::Handlebars::new();
    hb.register_helper("lpad", Box::new(left_pad));
    hb.register_template_string("info", TEXT_TEMPLATE)
        .context("compiling template")?;

    hb.render("info", &info).context("rendering text")
}

const TEXT_TEMPLATE: &str = r"{{ filename }} ({{ format }})
===========================================================
Units:      {{ summary.units_read }} read, {{ summary.units_discarded }} discarded
Blocks:     {{ summary.blocks }}
Records:    {{ summary.records }}
-----------------------------------------------------------
Category      Blocks     Records
-----------------------------------------------------------
{{ #each summary.categories }}{{ lpad 8 @key }}  {{ lpad 10 blocks }}  {{ lpad 10 records }}
{{/each }}
";
