//! Keyword cardinality: how often each keyword may appear in a document.

use std::collections::BTreeMap;

use crate::error::GrammarViolation;

use super::Keyword;

/// Occurrence counts of the keywords of a single document.
///
/// Built during one forward scan over the document's keyword lines. The
/// counts are consumed by [`CardinalityContract::enforce`].
#[derive(Debug, Default)]
pub(crate) struct KeywordCounts {
    counts: BTreeMap<Keyword, usize>,
    first: Option<String>,
    last: Option<String>,
}

impl KeywordCounts {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record one keyword line, given its keyword and its token.
    pub(crate) fn record(&mut self, keyword: Keyword, token: &str) {
        *self.counts.entry(keyword).or_insert(0) += 1;
        if self.first.is_none() {
            self.first = Some(token.to_string());
        }
        self.last = Some(token.to_string());
    }

    pub(crate) fn count(&self, keyword: Keyword) -> usize {
        self.counts.get(&keyword).copied().unwrap_or(0)
    }

    pub(crate) fn assert_exactly_once(&self, keywords: &[Keyword]) -> Result<(), GrammarViolation> {
        for &keyword in keywords {
            let count = self.count(keyword);
            if count != 1 {
                return Err(GrammarViolation::NotExactlyOnce { keyword, count });
            }
        }
        Ok(())
    }

    pub(crate) fn assert_at_least_once(
        &self,
        keywords: &[Keyword],
    ) -> Result<(), GrammarViolation> {
        for &keyword in keywords {
            if self.count(keyword) == 0 {
                return Err(GrammarViolation::NotAtLeastOnce { keyword });
            }
        }
        Ok(())
    }

    pub(crate) fn assert_at_most_once(&self, keywords: &[Keyword]) -> Result<(), GrammarViolation> {
        for &keyword in keywords {
            let count = self.count(keyword);
            if count > 1 {
                return Err(GrammarViolation::NotAtMostOnce { keyword, count });
            }
        }
        Ok(())
    }

    pub(crate) fn assert_first(&self, expected: Keyword) -> Result<(), GrammarViolation> {
        match &self.first {
            Some(token) if token == expected.as_str() => Ok(()),
            other => Err(GrammarViolation::FirstKeyword {
                expected,
                found: other.clone().unwrap_or_default(),
            }),
        }
    }

    pub(crate) fn assert_last(&self, expected: Keyword) -> Result<(), GrammarViolation> {
        match &self.last {
            Some(token) if token == expected.as_str() => Ok(()),
            other => Err(GrammarViolation::LastKeyword {
                expected,
                found: other.clone().unwrap_or_default(),
            }),
        }
    }

    /// If any of `dependents` occurred, `required` must have occurred too.
    pub(crate) fn assert_dependency(
        &self,
        dependents: &[Keyword],
        required: Keyword,
    ) -> Result<(), GrammarViolation> {
        if self.count(required) > 0 {
            return Ok(());
        }
        for &keyword in dependents {
            let count = self.count(keyword);
            if count > 0 {
                return Err(GrammarViolation::MissingDependency {
                    keyword,
                    count,
                    required,
                });
            }
        }
        Ok(())
    }
}

/// The cardinality rules of one grammar.
#[derive(Debug, Clone, Default)]
pub(crate) struct CardinalityContract {
    pub(crate) exactly_once: Vec<Keyword>,
    pub(crate) at_least_once: Vec<Keyword>,
    pub(crate) at_most_once: Vec<Keyword>,
    pub(crate) dependencies: Vec<(Vec<Keyword>, Keyword)>,
    pub(crate) first: Option<Keyword>,
    pub(crate) last: Option<Keyword>,
}

impl CardinalityContract {
    /// Run every assertion of this contract, consuming the counts.
    pub(crate) fn enforce(&self, counts: KeywordCounts) -> Result<(), GrammarViolation> {
        if let Some(first) = self.first {
            counts.assert_first(first)?;
        }
        counts.assert_exactly_once(&self.exactly_once)?;
        counts.assert_at_least_once(&self.at_least_once)?;
        counts.assert_at_most_once(&self.at_most_once)?;
        for (dependents, required) in &self.dependencies {
            counts.assert_dependency(dependents, *required)?;
        }
        if let Some(last) = self.last {
            counts.assert_last(last)?;
        }
        Ok(())
    }
}
