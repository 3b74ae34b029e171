//! Splitting a document body into keyword items.

use std::borrow::Cow;

use nom::bytes::complete::{tag, take_till1};
use nom::character::complete::space0;
use nom::combinator::opt;

use crate::error::DocumentParseError;

use super::crypto::{CryptoBlock, CryptoBlockExtractor, Feed};
use super::Keyword;

/// A generic item within a Tor doc: one keyword line plus the crypto
/// blocks that follow it.
#[derive(Debug, Clone)]
pub struct Item<'a> {
    keyword: Keyword,
    line: Cow<'a, str>,
    kw_start: usize,
    kw_end: usize,
    args_start: usize,
    offset: usize,
    objects: Vec<CryptoBlock>,
}

impl<'a> Item<'a> {
    pub fn keyword(&self) -> Keyword {
        self.keyword
    }

    /// The token as written, which differs from `keyword()` for unrecognized lines.
    pub fn token(&self) -> &str {
        &self.line[self.kw_start..self.kw_end]
    }

    /// The whole line, without its terminator.
    pub fn line(&self) -> &str {
        &self.line
    }

    /// Byte offset of the line within the document body.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Everything after the keyword, if anything.
    pub fn args(&self) -> Option<&str> {
        let args = &self.line[self.args_start..];
        if args.is_empty() {
            None
        } else {
            Some(args)
        }
    }

    pub fn args_or_empty(&self) -> &str {
        self.args().unwrap_or("")
    }

    pub fn get_argument(&self) -> Result<&str, DocumentParseError> {
        self.args()
            .ok_or_else(|| DocumentParseError::args_missing(self.line(), 1))
    }

    pub fn split_arguments(&self) -> Vec<&str> {
        self.args_or_empty().split_whitespace().collect()
    }

    /// Return the `i`th argument, if present.
    pub fn arg(&self, i: usize) -> Option<&str> {
        self.args_or_empty().split_whitespace().nth(i)
    }

    /// Return the arguments, failing unless there are at least `n`.
    pub fn required_args(&self, n: usize) -> Result<Vec<&str>, DocumentParseError> {
        let args = self.split_arguments();
        if args.len() < n {
            return Err(DocumentParseError::args_missing(self.line(), n));
        }
        Ok(args)
    }

    /// Like `required_args`, but the count must match exactly.
    pub fn exact_args(&self, n: usize) -> Result<Vec<&str>, DocumentParseError> {
        let args = self.required_args(n)?;
        if args.len() > n {
            return Err(DocumentParseError::FieldValue {
                line: self.line().to_string(),
                source: crate::error::FieldError::UnexpectedArguments(args[n..].join(" ")),
            });
        }
        Ok(args)
    }

    pub fn objects(&self) -> &[CryptoBlock] {
        &self.objects
    }

    pub fn object(&self) -> Option<&CryptoBlock> {
        self.objects.first()
    }

    pub fn required_object(&self) -> Result<&CryptoBlock, DocumentParseError> {
        self.object().ok_or_else(|| {
            DocumentParseError::malformed(format!(
                "keyword '{}' must be followed by a crypto block",
                self.token()
            ))
        })
    }

    /// The keyword line followed by the lines of all its blocks.
    pub(crate) fn into_lines(self) -> Vec<String> {
        let mut lines = vec![self.line.into_owned()];
        for block in &self.objects {
            lines.extend(block.lines().map(str::to_string));
        }
        lines
    }
}

/// Output of the tokenizer.
#[derive(Debug, Default)]
pub(crate) struct Tokens<'a> {
    pub(crate) items: Vec<Item<'a>>,
    /// Blocks that appeared before any keyword line.
    pub(crate) orphans: Vec<CryptoBlock>,
}

/// Split a line into token boundaries: `(kw_start, kw_end, args_start)`.
fn locate_keyword(line: &str) -> Option<(usize, usize, usize)> {
    let (after_opt, _) = opt(tag::<_, _, nom::error::Error<&str>>("opt "))(line).ok()?;
    let kw_start = line.len() - after_opt.len();
    let (after_kw, kw) =
        take_till1::<_, _, nom::error::Error<&str>>(|c: char| c == ' ' || c == '\t')(after_opt)
            .ok()?;
    let kw_end = kw_start + kw.len();
    let (args, _) = space0::<_, nom::error::Error<&str>>(after_kw).ok()?;
    Some((kw_start, kw_end, line.len() - args.len()))
}

/// Tokenize a document body into keyword items.
///
/// Crypto blocks are attached to the item on the line before them. Blank
/// lines are skipped. A block still open at the end of input is an error.
pub(crate) fn tokenize(body: &[u8]) -> Result<Tokens<'_>, DocumentParseError> {
    let mut tokens = Tokens::default();
    let mut extractor = CryptoBlockExtractor::new();
    let mut offset = 0;

    for raw in body.split_inclusive(|&b| b == b'\n') {
        let line_offset = offset;
        offset += raw.len();

        let text = String::from_utf8_lossy(raw);
        let stripped = text.trim_end_matches(&['\n', '\r'][..]);
        let current = tokens
            .items
            .last()
            .map(Item::keyword)
            .unwrap_or(Keyword::Unrecognized);
        match extractor.feed(stripped, &text, current)? {
            Feed::Consumed => continue,
            Feed::Finished(block) => {
                match tokens.items.last_mut() {
                    Some(item) => item.objects.push(block),
                    None => tokens.orphans.push(block),
                }
                continue;
            }
            Feed::Passed => {}
        }

        let line: Cow<'_, str> = match text {
            Cow::Borrowed(s) => Cow::Borrowed(s.trim_end()),
            Cow::Owned(s) => Cow::Owned(s.trim_end().to_string()),
        };
        if line.is_empty() {
            continue;
        }
        // A line starting with whitespace has no keyword at all.
        let (kw_start, kw_end, args_start) = locate_keyword(&line).unwrap_or((0, 0, 0));
        let keyword = Keyword::from_token(&line[kw_start..kw_end]);
        tokens.items.push(Item {
            keyword,
            line,
            kw_start,
            kw_end,
            args_start,
            offset: line_offset,
            objects: Vec::new(),
        });
    }
    extractor.finish()?;
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_with_objects() {
        let doc = concat!(
            "directory-signature 0232AF901C31A04EE9848595AF9BB7620D4C5B2E 491466AA6B52156E455D9B545242C21D16A6880A\n",
            "-----BEGIN SIGNATURE-----\n",
            "PlYR25xXpuO75eQTnqUx/FX3ZDayW4Ciy5YwF0p0yEv/ApfkZfg6frfwILgm/U/c\n",
            "emvxrFWCWKPT4NZ2uVlkSQ==\n",
            "-----END SIGNATURE-----\n",
            "-----BEGIN RSA PUBLIC KEY-----\n",
            "emvxrFWCWKPT4NZ2uVlkSQ==\n",
            "-----END RSA PUBLIC KEY-----\n"
        );
        let tokens = tokenize(doc.as_bytes()).unwrap();
        assert_eq!(tokens.items.len(), 1);
        let item = &tokens.items[0];
        assert_eq!(item.keyword(), Keyword::DirectorySignature);
        assert_eq!(item.objects()[0].label(), "SIGNATURE");
        assert_eq!(item.objects()[1].label(), "RSA PUBLIC KEY");
        assert_eq!(item.objects()[1].keyword(), Keyword::DirectorySignature);
        assert_eq!(item.split_arguments().len(), 2);
    }

    #[test]
    fn test_arguments() {
        let tokens = tokenize(b"router  foo 1.2.3.4 9001 0 0 \nhibernating\n").unwrap();
        let router = &tokens.items[0];
        assert_eq!(router.token(), "router");
        assert_eq!(router.args(), Some("foo 1.2.3.4 9001 0 0"));
        assert_eq!(router.arg(1), Some("1.2.3.4"));
        assert_eq!(router.arg(5), None);
        assert!(router.required_args(5).is_ok());
        assert!(router.required_args(6).is_err());
        assert!(router.exact_args(4).is_err());

        let hibernating = &tokens.items[1];
        assert_eq!(hibernating.args(), None);
        assert!(hibernating.get_argument().is_err());
        assert_eq!(hibernating.offset(), 30);
    }

    #[test]
    fn test_opt_prefix() {
        let tokens = tokenize(b"opt fingerprint AAAA BBBB\n").unwrap();
        assert_eq!(tokens.items[0].keyword(), Keyword::Fingerprint);
        assert_eq!(tokens.items[0].token(), "fingerprint");
        assert_eq!(tokens.items[0].args(), Some("AAAA BBBB"));
    }

    #[test]
    fn test_unrecognized_and_blank() {
        let tokens = tokenize(b"router a\n\nwhatever x y\n").unwrap();
        assert_eq!(tokens.items.len(), 2);
        assert_eq!(tokens.items[1].keyword(), Keyword::Unrecognized);
        assert_eq!(tokens.items[1].token(), "whatever");
    }

    #[test]
    fn test_block_before_keyword() {
        let tokens =
            tokenize(b"-----BEGIN SIGNATURE-----\nAAAA\n-----END SIGNATURE-----\nrouter a\n")
                .unwrap();
        assert_eq!(tokens.orphans.len(), 1);
        assert_eq!(tokens.items.len(), 1);
    }

    #[test]
    fn test_keyword_inside_block() {
        let tokens = tokenize(
            b"onion-key\n-----BEGIN RSA PUBLIC KEY-----\nrouter x\n-----END RSA PUBLIC KEY-----\n",
        )
        .unwrap();
        assert_eq!(tokens.items.len(), 1);
        assert!(tokens.items[0].objects()[0].as_str().contains("router x\n"));
    }

    #[test]
    fn test_unterminated_block() {
        let err = tokenize(b"onion-key\n-----BEGIN RSA PUBLIC KEY-----\nAAAA\n").unwrap_err();
        assert!(matches!(
            err,
            DocumentParseError::UnterminatedCryptoBlock { keyword } if keyword == "onion-key"
        ));
    }

    #[test]
    fn test_into_lines() {
        let tokens =
            tokenize(b"bogus 1\n-----BEGIN X-----\nAAAA\n-----END X-----\n").unwrap();
        let lines = tokens.items.into_iter().next().unwrap().into_lines();
        assert_eq!(
            lines,
            vec!["bogus 1", "-----BEGIN X-----", "AAAA", "-----END X-----"]
        );
    }
}
