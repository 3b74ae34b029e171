//! Knobs for parsing and batch reading.

use derive_builder::Builder;

/// How strictly documents are parsed.
///
/// The default is lenient: lines a grammar does not know are collected
/// into the document's unrecognized lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Builder)]
#[builder(default)]
pub struct ParseOptions {
    /// Fail with `UnrecognizedLine` instead of collecting unknown lines.
    pub fail_on_unrecognized_lines: bool,
}

impl ParseOptions {
    pub fn strict() -> Self {
        ParseOptions {
            fail_on_unrecognized_lines: true,
        }
    }

    pub fn lenient() -> Self {
        ParseOptions::default()
    }
}

/// Configuration of a [`DescriptorReader`](crate::reader::DescriptorReader).
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(default)]
pub struct ReaderConfig {
    /// Maximum number of results waiting for the consumer.
    #[builder(default = "100")]
    pub queue_capacity: usize,
    pub parse_options: ParseOptions,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            queue_capacity: 100,
            parse_options: ParseOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let opts = ParseOptionsBuilder::default()
            .fail_on_unrecognized_lines(true)
            .build()
            .unwrap();
        assert_eq!(opts, ParseOptions::strict());

        let config = ReaderConfigBuilder::default().build().unwrap();
        assert_eq!(config.queue_capacity, 100);
        assert!(!config.parse_options.fail_on_unrecognized_lines);

        let config = ReaderConfigBuilder::default()
            .queue_capacity(5)
            .parse_options(opts)
            .build()
            .unwrap();
        assert_eq!(config.queue_capacity, 5);
    }
}
