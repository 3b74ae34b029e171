//! Per-type grammars built from the shared engine pieces.

use std::collections::BTreeSet;

use tracing::trace;

use crate::config::ParseOptions;
use crate::error::DocumentParseError;

use super::annotation::cut_off_annotations;
use super::cardinality::{CardinalityContract, KeywordCounts};
use super::tokenize::{tokenize, Item};
use super::{DocumentMeta, Keyword, RawDocument};

/// The keyword table and cardinality contract of one document type.
///
/// Built once with the chained constructors below and kept in a static.
#[derive(Debug, Clone)]
pub(crate) struct Grammar {
    name: &'static str,
    contract: CardinalityContract,
    known: BTreeSet<Keyword>,
    objects: BTreeSet<Keyword>,
    free_form: bool,
}

/// A document after the generic steps, ready for type-specific dispatch.
#[derive(Debug)]
pub(crate) struct ParsedBody<'a> {
    pub(crate) meta: DocumentMeta,
    pub(crate) items: Vec<Item<'a>>,
}

impl Grammar {
    pub(crate) fn new(name: &'static str) -> Self {
        Grammar {
            name,
            contract: CardinalityContract::default(),
            known: BTreeSet::new(),
            objects: BTreeSet::new(),
            free_form: false,
        }
    }

    pub(crate) fn first(mut self, keyword: Keyword) -> Self {
        self.contract.first = Some(keyword);
        self.known.insert(keyword);
        self
    }

    pub(crate) fn last(mut self, keyword: Keyword) -> Self {
        self.contract.last = Some(keyword);
        self.known.insert(keyword);
        self
    }

    pub(crate) fn exactly_once(mut self, keywords: &[Keyword]) -> Self {
        self.contract.exactly_once.extend_from_slice(keywords);
        self.known.extend(keywords);
        self
    }

    pub(crate) fn at_most_once(mut self, keywords: &[Keyword]) -> Self {
        self.contract.at_most_once.extend_from_slice(keywords);
        self.known.extend(keywords);
        self
    }

    pub(crate) fn at_least_once(mut self, keywords: &[Keyword]) -> Self {
        self.contract.at_least_once.extend_from_slice(keywords);
        self.known.extend(keywords);
        self
    }

    pub(crate) fn any_number(mut self, keywords: &[Keyword]) -> Self {
        self.known.extend(keywords);
        self
    }

    /// If any of `dependents` occurs, `required` must occur too.
    pub(crate) fn depends(mut self, dependents: &[Keyword], required: Keyword) -> Self {
        self.contract
            .dependencies
            .push((dependents.to_vec(), required));
        self
    }

    /// Keywords whose lines may be followed by crypto blocks.
    pub(crate) fn objects(mut self, keywords: &[Keyword]) -> Self {
        self.objects.extend(keywords);
        self
    }

    /// Pass lines without a known keyword on to the document instead of
    /// treating them as unrecognized.
    pub(crate) fn free_form(mut self) -> Self {
        self.free_form = true;
        self
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn accepts(&self, keyword: Keyword) -> bool {
        self.known.contains(&keyword)
    }

    /// Run the generic parse steps on a whole document.
    ///
    /// Annotations are cut off first; the returned metadata refers to the
    /// remaining bytes, which is also what digests are computed over.
    pub(crate) fn parse<'a>(
        &self,
        raw: &'a RawDocument,
        options: &ParseOptions,
    ) -> Result<ParsedBody<'a>, DocumentParseError> {
        let (annotations, offset) = cut_off_annotations(raw.as_bytes())?;
        let body = &raw.as_bytes()[offset..];
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(DocumentParseError::malformed(format!(
                "{} without content",
                self.name
            )));
        }
        let mut unrecognized_lines = Vec::new();
        let items = self.parse_items(body, options, &mut unrecognized_lines)?;
        trace!(
            grammar = self.name,
            items = items.len(),
            annotations = annotations.len(),
            "parsed document items"
        );
        Ok(ParsedBody {
            meta: DocumentMeta::new(raw.slice(offset..raw.len()), annotations, unrecognized_lines),
            items,
        })
    }

    /// Tokenize `bytes`, enforce the cardinality contract and filter out
    /// the lines this grammar does not know.
    ///
    /// Unknown lines are appended to `unrecognized`, or fail the parse in
    /// strict mode. A known keyword followed by a block it may not carry
    /// counts as unknown, together with its block.
    pub(crate) fn parse_items<'a>(
        &self,
        bytes: &'a [u8],
        options: &ParseOptions,
        unrecognized: &mut Vec<String>,
    ) -> Result<Vec<Item<'a>>, DocumentParseError> {
        let tokens = tokenize(bytes)?;

        let mut counts = KeywordCounts::new();
        for item in &tokens.items {
            counts.record(item.keyword(), item.token());
        }
        self.contract.enforce(counts)?;

        let mut reject = |lines: Vec<String>| -> Result<(), DocumentParseError> {
            if options.fail_on_unrecognized_lines {
                return Err(DocumentParseError::UnrecognizedLine {
                    line: lines.into_iter().next().unwrap_or_default(),
                });
            }
            unrecognized.extend(lines);
            Ok(())
        };

        for block in tokens.orphans {
            reject(block.lines().map(str::to_string).collect())?;
        }
        let mut items = Vec::with_capacity(tokens.items.len());
        for item in tokens.items {
            let known = if item.keyword().is_unrecognized() {
                self.free_form
            } else {
                self.accepts(item.keyword())
            };
            let blocks_ok = item.objects().is_empty() || self.objects.contains(&item.keyword());
            if known && blocks_ok {
                items.push(item);
            } else {
                reject(item.into_lines())?;
            }
        }
        Ok(items)
    }
}
