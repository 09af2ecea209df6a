//! Core traits for swanmon acquisition paths

use crate::SwanmonResult;

/// Text parser interface
///
/// Each status dialect implements this trait; the caller picks the
/// implementation after detecting which dialect it was handed.
pub trait Parser: Send + Sync {
    /// Parsed representation
    type Output;

    /// Short identifier used in logs
    fn id(&self) -> &'static str;

    /// Parse raw text
    ///
    /// # Errors
    ///
    /// Returns an error if the text cannot be turned into `Output` at all.
    /// Individual malformed fields are expected to be skipped instead.
    fn parse(&self, input: &str) -> SwanmonResult<Self::Output>;
}

/// Scraper interface for acquisition paths
///
/// A scrape is a single best-effort attempt: it yields a complete result or
/// an error, never a partial result.
#[async_trait::async_trait]
pub trait Scraper: Send + Sync {
    /// Scraped representation
    type Output: Send;

    /// Short identifier used in logs
    fn id(&self) -> &'static str;

    /// Perform one scrape
    ///
    /// # Errors
    ///
    /// Returns an error if acquisition or parsing fails
    async fn scrape(&self) -> SwanmonResult<Self::Output>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SwanmonError;

    struct WordCount;

    impl Parser for WordCount {
        type Output = usize;

        fn id(&self) -> &'static str {
            "word_count"
        }

        fn parse(&self, input: &str) -> SwanmonResult<usize> {
            if input.is_empty() {
                return Err(SwanmonError::UnrecognizedOutput);
            }
            Ok(input.split_whitespace().count())
        }
    }

    struct Fixed(u32);

    #[async_trait::async_trait]
    impl Scraper for Fixed {
        type Output = u32;

        fn id(&self) -> &'static str {
            "fixed"
        }

        async fn scrape(&self) -> SwanmonResult<u32> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_parser() {
        let parser = WordCount;
        assert_eq!(parser.id(), "word_count");
        assert_eq!(parser.parse("a b c").unwrap(), 3);
        assert!(matches!(
            parser.parse(""),
            Err(SwanmonError::UnrecognizedOutput)
        ));
    }

    #[tokio::test]
    async fn test_scraper_object_safety() {
        let scraper: Box<dyn Scraper<Output = u32>> = Box::new(Fixed(7));
        assert_eq!(scraper.id(), "fixed");
        assert_eq!(scraper.scrape().await.unwrap(), 7);
    }
}
