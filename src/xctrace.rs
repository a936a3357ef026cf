//! Convert `xctrace export` XML to delimited sample rows.
//!
//! An export produced with `xctrace export --xpath ...` is a table of `row`
//! elements, one per sample. Each row is resolved against the document's
//! `id`/`ref` cache (see [`crate::resolve`]) and flattened into six fields:
//!
//! ```text
//! time;weight;addr;sym;lib;events
//! ```
//!
//! # Example
//!
//! ```no_run
//! use xctrace_csv::xctrace::XctraceConverter;
//! use std::fs::File;
//! use std::io::{BufReader, BufWriter};
//!
//! let input = BufReader::new(File::open("cpu-profile.xml").unwrap());
//! let output = BufWriter::new(File::create("cpu-profile.csv").unwrap());
//!
//! let mut converter = XctraceConverter::new();
//! converter.parse(input).unwrap();
//! converter.write_csv(output).unwrap();
//! ```

use crate::resolve::{self, Element, RefCache, ResolveError};
use std::io::{Read, Write};
use thiserror::Error;

const SAMPLE_TIME: &str = "sample-time";
const BACKTRACE: &str = "backtrace";
const BINARY: &str = "binary";
const PMC_EVENTS: &str = "pmc-events";

/// Weight-bearing tags, in order of preference.
const WEIGHT_TAGS: [&str; 3] = ["cycle-weight", "weight", "pmc-event"];

const DEFAULT_WEIGHT: &str = "0";
const DEFAULT_ADDRESS: &str = "0x0";

/// Errors that can occur during xctrace export conversion.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parse error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("{0}")]
    Resolve(#[from] ResolveError),

    #[error("row {row}: missing <{tag}> element")]
    MissingField { row: usize, tag: &'static str },

    #[error("row {row}: <{tag}> element has no text")]
    EmptyField { row: usize, tag: String },
}

pub type Result<T> = std::result::Result<T, ConvertError>;

/// Configuration for the converter.
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    /// Name of the elements holding one sample each.
    pub row_tag: String,
    /// Field separator in the output.
    pub delimiter: char,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            row_tag: "row".to_string(),
            delimiter: ';',
        }
    }
}

/// The fields extracted from one resolved row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub time: String,
    pub weight: String,
    pub address: String,
    pub symbol: String,
    pub library: String,
    pub pmc_events: String,
}

impl Sample {
    /// Extract the fields of a resolved row. `row_index` is 1-based and only
    /// used for error messages.
    pub fn extract(row: &Element, row_index: usize) -> Result<Self> {
        let time = row.find_first(SAMPLE_TIME).ok_or(ConvertError::MissingField {
            row: row_index,
            tag: SAMPLE_TIME,
        })?;
        let time = field_text(time, row_index)?;

        let weight = match WEIGHT_TAGS.iter().find_map(|tag| row.find_first(tag)) {
            Some(weight) => field_text(weight, row_index)?,
            None => DEFAULT_WEIGHT.to_string(),
        };

        let mut address = DEFAULT_ADDRESS.to_string();
        let mut symbol = String::new();
        let mut library = String::new();
        // Surplus backtraces, frames and binaries are ignored.
        if let [backtrace] = row.find_all(BACKTRACE).as_slice() {
            if let Some(frame) = backtrace.first_child_element() {
                address = frame.attribute("addr").unwrap_or_default().to_string();
                symbol = frame.attribute("name").unwrap_or_default().to_string();
                if let [binary] = frame.find_all(BINARY).as_slice() {
                    library = binary.attribute("name").unwrap_or_default().to_string();
                }
            }
        }

        let pmc_events = match row.find_all(PMC_EVENTS).as_slice() {
            [events] => field_text(events, row_index)?,
            _ => String::new(),
        };

        Ok(Self {
            time,
            weight,
            address,
            symbol,
            library,
            pmc_events,
        })
    }

    /// Write the sample as one delimited, newline-terminated line.
    pub fn write_row<W: Write>(&self, writer: &mut W, delimiter: char) -> std::io::Result<()> {
        writeln!(
            writer,
            "{}{d}{}{d}{}{d}{}{d}{}{d}{}",
            self.time,
            self.weight,
            self.address,
            self.symbol,
            self.library,
            self.pmc_events,
            d = delimiter
        )
    }
}

fn field_text(element: &Element, row_index: usize) -> Result<String> {
    element
        .text()
        .map(str::to_string)
        .ok_or_else(|| ConvertError::EmptyField {
            row: row_index,
            tag: element.name().to_string(),
        })
}

/// Converter from `xctrace export` XML to delimited sample rows.
pub struct XctraceConverter {
    config: ConverterConfig,
    samples: Vec<Sample>,
}

impl XctraceConverter {
    /// Create a new converter with the default configuration.
    pub fn new() -> Self {
        Self::with_config(ConverterConfig::default())
    }

    /// Create a new converter with custom configuration.
    pub fn with_config(config: ConverterConfig) -> Self {
        Self {
            config,
            samples: Vec::new(),
        }
    }

    /// Parse an exported document from a reader.
    pub fn parse<R: Read>(&mut self, mut reader: R) -> Result<()> {
        let mut contents = String::new();
        reader.read_to_string(&mut contents)?;
        self.parse_str(&contents)
    }

    /// Parse an exported document held in memory.
    ///
    /// Rows are resolved in document order against a cache that lives for
    /// this call only.
    pub fn parse_str(&mut self, xml: &str) -> Result<()> {
        let document = roxmltree::Document::parse_with_options(
            xml,
            roxmltree::ParsingOptions {
                allow_dtd: true,
                ..roxmltree::ParsingOptions::default()
            },
        )?;

        let mut cache = RefCache::new();
        let rows = document
            .descendants()
            .filter(|node| node.is_element() && node.tag_name().name() == self.config.row_tag);
        for (index, row) in rows.enumerate() {
            let resolved = resolve::resolve(row, &mut cache)?;
            self.samples.push(Sample::extract(&resolved, index + 1)?);
        }

        Ok(())
    }

    /// Samples parsed so far, in document order.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Write the parsed samples, one line each.
    pub fn write_csv<W: Write>(&self, mut writer: W) -> Result<()> {
        for sample in &self.samples {
            sample.write_row(&mut writer, self.config.delimiter)?;
        }
        Ok(())
    }
}

impl Default for XctraceConverter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TIME_PROFILE: &str = r#"<?xml version="1.0"?>
<trace-query-result>
<node xpath='//trace-toc[1]/run[1]/data[1]/table[3]'>
<schema name="time-profile">
<col><mnemonic>time</mnemonic></col>
<col><mnemonic>weight</mnemonic></col>
<col><mnemonic>stack</mnemonic></col>
</schema>
<row><sample-time id="1" fmt="00:00.001.006">1006000</sample-time><weight id="2" fmt="1.00 ms">1000000</weight><backtrace id="3"><frame id="4" name="foo" addr="0x1000"><binary id="5" name="libfoo.dylib" UUID="AAAA" arch="arm64" load-addr="0x100" path="/usr/lib/libfoo.dylib"/></frame><frame id="6" name="main" addr="0x2000"><binary ref="5"/></frame></backtrace></row>
<row><sample-time id="7" fmt="00:00.002.011">2011000</sample-time><weight ref="2"/><backtrace ref="3"/></row>
<row><sample-time id="8" fmt="00:00.003.020">3020000</sample-time><weight ref="2"/><backtrace id="9"><frame ref="6"/></backtrace></row>
</node>
</trace-query-result>
"#;

    fn convert(xml: &str) -> Result<String> {
        let mut converter = XctraceConverter::new();
        converter.parse(Cursor::new(xml))?;
        let mut output = Vec::new();
        converter.write_csv(&mut output)?;
        Ok(String::from_utf8(output).unwrap())
    }

    #[test]
    fn convert_full_row() {
        let xml = r#"<rows><row>
            <sample-time>12345</sample-time>
            <weight>3</weight>
            <backtrace><frame addr="0x1000" name="foo"><binary name="libc.so"/></frame></backtrace>
            <pmc-events>cycles=10</pmc-events>
        </row></rows>"#;

        assert_eq!(convert(xml).unwrap(), "12345;3;0x1000;foo;libc.so;cycles=10\n");
    }

    #[test]
    fn convert_row_with_only_time() {
        let xml = "<rows><row><sample-time>99</sample-time></row></rows>";

        assert_eq!(convert(xml).unwrap(), "99;0;0x0;;;\n");
    }

    #[test]
    fn convert_time_profile() {
        let output = convert(TIME_PROFILE).unwrap();
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(
            lines,
            vec![
                "1006000;1000000;0x1000;foo;libfoo.dylib;",
                "2011000;1000000;0x1000;foo;libfoo.dylib;",
                "3020000;1000000;0x2000;main;libfoo.dylib;",
            ]
        );
    }

    #[test]
    fn referenced_row_matches_inline_row() {
        let shared = r#"<rows>
            <row><sample-time>1</sample-time><backtrace><frame id="1" addr="0x10" name="foo"><binary id="2" name="libc.so"/></frame></backtrace></row>
            <row><sample-time>2</sample-time><backtrace><frame ref="1"/></backtrace></row>
        </rows>"#;
        let inline = r#"<rows>
            <row><sample-time>1</sample-time><backtrace><frame addr="0x10" name="foo"><binary name="libc.so"/></frame></backtrace></row>
            <row><sample-time>2</sample-time><backtrace><frame addr="0x10" name="foo"><binary name="libc.so"/></frame></backtrace></row>
        </rows>"#;

        let output = convert(shared).unwrap();
        assert_eq!(output, convert(inline).unwrap());
        assert_eq!(output.lines().nth(1), Some("2;0;0x10;foo;libc.so;"));
    }

    #[test]
    fn weight_tags_checked_in_order() {
        let xml = r#"<rows>
            <row><sample-time>1</sample-time><pmc-event>7</pmc-event><weight>5</weight></row>
            <row><sample-time>2</sample-time><weight>5</weight><cycle-weight>9</cycle-weight></row>
            <row><sample-time>3</sample-time><pmc-event>7</pmc-event></row>
        </rows>"#;
        let output = convert(xml).unwrap();
        let weights: Vec<&str> = output
            .lines()
            .map(|line| line.split(';').nth(1).unwrap())
            .collect();

        assert_eq!(weights, vec!["5", "9", "7"]);
    }

    #[test]
    fn multiple_backtraces_use_defaults() {
        let xml = r#"<rows><row>
            <sample-time>1</sample-time>
            <backtrace><frame addr="0x1" name="a"/></backtrace>
            <backtrace><frame addr="0x2" name="b"/></backtrace>
        </row></rows>"#;

        assert_eq!(convert(xml).unwrap(), "1;0;0x0;;;\n");
    }

    #[test]
    fn extra_frames_and_binaries_ignored() {
        let xml = r#"<rows><row>
            <sample-time>1</sample-time>
            <backtrace><frame addr="0x1" name="a"><binary name="x"/><binary name="y"/></frame><frame addr="0x2" name="b"/></backtrace>
        </row></rows>"#;

        assert_eq!(convert(xml).unwrap(), "1;0;0x1;a;;\n");
    }

    #[test]
    fn backtrace_without_frames_uses_defaults() {
        let xml = "<rows><row><sample-time>1</sample-time><backtrace/></row></rows>";

        assert_eq!(convert(xml).unwrap(), "1;0;0x0;;;\n");
    }

    #[test]
    fn multiple_pmc_events_ignored() {
        let xml = r#"<rows><row>
            <sample-time>1</sample-time>
            <pmc-events>1 2</pmc-events>
            <pmc-events>3 4</pmc-events>
        </row></rows>"#;

        assert_eq!(convert(xml).unwrap(), "1;0;0x0;;;\n");
    }

    #[test]
    fn missing_sample_time_fails() {
        let xml = r#"<rows>
            <row><sample-time>1</sample-time></row>
            <row><weight>1</weight></row>
        </rows>"#;
        let result = convert(xml);

        assert!(matches!(
            result,
            Err(ConvertError::MissingField { row: 2, tag: "sample-time" })
        ));
    }

    #[test]
    fn empty_sample_time_fails() {
        let xml = "<rows><row><sample-time/></row></rows>";
        let result = convert(xml);

        assert!(matches!(result, Err(ConvertError::EmptyField { row: 1, ref tag }) if tag == "sample-time"));
    }

    #[test]
    fn row_carrying_ref_fails() {
        let xml = r#"<rows>
            <row id="7"><sample-time>1</sample-time></row>
            <row ref="7"/>
        </rows>"#;
        let result = convert(xml);

        assert!(matches!(
            result,
            Err(ConvertError::MissingField { row: 2, tag: "sample-time" })
        ));
    }

    #[test]
    fn top_frame_skips_leading_whitespace() {
        let xml = "<rows><row><sample-time>1</sample-time><backtrace>\n  <frame addr=\"0x20\" name=\"inner\"><binary name=\"libm.so\"/></frame>\n  <frame addr=\"0x30\" name=\"outer\"/>\n</backtrace></row></rows>";

        assert_eq!(convert(xml).unwrap(), "1;0;0x20;inner;libm.so;\n");
    }

    #[test]
    fn frame_without_address_has_empty_field() {
        let xml = r#"<rows><row><sample-time>1</sample-time><backtrace><frame name="f"/></backtrace></row></rows>"#;

        assert_eq!(convert(xml).unwrap(), "1;0;;f;;\n");
    }

    #[test]
    fn frame_without_attributes_has_empty_fields() {
        let xml = r#"<rows><row><sample-time>1</sample-time><backtrace><frame/></backtrace></row></rows>"#;

        assert_eq!(convert(xml).unwrap(), "1;0;;;;\n");
    }

    #[test]
    fn unresolved_ref_fails() {
        let xml = r#"<rows><row><sample-time ref="1"/></row></rows>"#;
        let result = convert(xml);

        assert!(matches!(
            result,
            Err(ConvertError::Resolve(ResolveError::UnknownRef(ref id))) if id == "1"
        ));
    }

    #[test]
    fn malformed_xml_fails() {
        let result = convert("<rows><row><sample-time>1</row></rows>");

        assert!(matches!(result, Err(ConvertError::Xml(_))));
    }

    #[test]
    fn empty_document_produces_no_rows() {
        assert_eq!(convert("<trace-query-result/>").unwrap(), "");
    }

    #[test]
    fn conversion_is_repeatable() {
        assert_eq!(convert(TIME_PROFILE).unwrap(), convert(TIME_PROFILE).unwrap());
    }

    #[test]
    fn custom_config() {
        let config = ConverterConfig {
            row_tag: "sample".to_string(),
            delimiter: ',',
        };
        let xml = r#"<samples>
            <sample><sample-time>5</sample-time><cycle-weight>10</cycle-weight></sample>
            <row><sample-time>6</sample-time></row>
        </samples>"#;

        let mut converter = XctraceConverter::with_config(config);
        converter.parse(Cursor::new(xml)).unwrap();
        let mut output = Vec::new();
        converter.write_csv(&mut output).unwrap();

        assert_eq!(converter.samples().len(), 1);
        assert_eq!(String::from_utf8(output).unwrap(), "5,10,0x0,,,\n");
    }

    #[test]
    fn output_validates() {
        let xml = r#"<rows>
            <row><sample-time>100</sample-time><cycle-weight>250</cycle-weight><backtrace><frame id="1" addr="0xdeadbeef" name="hot_loop"><binary id="2" name="bench"/></frame></backtrace><pmc-events>10 20 30</pmc-events></row>
            <row><sample-time>200</sample-time><cycle-weight>50</cycle-weight><backtrace><frame ref="1"/></backtrace><pmc-events>1 2 3</pmc-events></row>
            <row><sample-time>300</sample-time></row>
        </rows>"#;
        let output = convert(xml).unwrap();

        let file = xctrace_csv_parse::SampleFile::parse(Cursor::new(output)).unwrap();

        assert_eq!(file.records.len(), 3);
        assert_eq!(file.records[0].address, 0xdeadbeef);
        assert_eq!(file.records[1].symbol.as_deref(), Some("hot_loop"));
        assert_eq!(file.records[1].library.as_deref(), Some("bench"));
        assert_eq!(file.records[1].pmc_events, vec![1, 2, 3]);
        assert_eq!(file.records[2].address, 0);
        assert_eq!(file.records[2].symbol, None);
        assert_eq!(file.total_weight(), 300);
    }
}
