use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    error::{NotFoundError, TypeError},
};

/// First value of `key` in the raw query pairs, parsed as `T`.
pub fn query_value<T: FromStr>(
    pairs: &[(String, String)],
    key: &str,
) -> Result<Option<T>, potion::Error> {
    match pairs.iter().find(|(k, _)| k == key) {
        Some((_, value)) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| TypeError::new(&format!("Invalid value for {key}: {value}")).into()),
        None => Ok(None),
    }
}

/// `page` is 1-based; `limit` is clamped to `[1, max_page_size]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    pub fn new(page: Option<i64>, limit: Option<i64>, config: &Config) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit
                .unwrap_or(config.default_page_size)
                .clamp(1, config.max_page_size),
        }
    }

    /// Rejects a `page` whose row offset does not fit in an `i64`.
    pub fn from_pairs(pairs: &[(String, String)], config: &Config) -> Result<Self, potion::Error> {
        let request = Self::new(
            query_value(pairs, "page")?,
            query_value(pairs, "limit")?,
            config,
        );

        match (request.page - 1).checked_mul(request.limit) {
            Some(_) => Ok(request),
            None => Err(TypeError::new(&format!("Invalid value for page: {}", request.page)).into()),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<i64>,
    pub previous: Option<i64>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// A page past the last one is a 404; an empty first page is an empty listing.
    pub fn from_rows(
        results: Vec<T>,
        total_rows: i64,
        request: &PageRequest,
    ) -> Result<Self, potion::Error> {
        if results.is_empty() {
            if request.page == 1 {
                return Ok(Self::no_rows());
            }
            return Err(NotFoundError::new("Invalid page").into());
        }

        let next = if request.offset().saturating_add(request.limit) < total_rows {
            Some(request.page + 1)
        } else {
            None
        };
        let previous = if request.page > 1 {
            Some(request.page - 1)
        } else {
            None
        };

        Ok(Self {
            count: total_rows,
            next,
            previous,
            results,
        })
    }

    pub fn no_rows() -> Self {
        Self {
            count: 0,
            next: None,
            previous: None,
            results: vec![],
        }
    }

    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnOnce(Vec<T>) -> Vec<U>,
    {
        Page {
            count: self.count,
            next: self.next,
            previous: self.previous,
            results: f(self.results),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped_by_config() {
        let config = Config::default();

        let request = PageRequest::new(Some(0), Some(10_000), &config);
        assert_eq!(request.page, 1);
        assert_eq!(request.limit, config.max_page_size);

        let request = PageRequest::new(None, None, &config);
        assert_eq!(request.limit, config.default_page_size);
    }

    #[test]
    fn links_follow_total() {
        let config = Config::default();
        let request = PageRequest::new(Some(2), Some(10), &config);
        assert_eq!(request.offset(), 10);

        let page = Page::from_rows(vec![1; 10], 25, &request).ok().unwrap();
        assert_eq!(page.next, Some(3));
        assert_eq!(page.previous, Some(1));

        let last = PageRequest::new(Some(3), Some(10), &config);
        let page = Page::from_rows(vec![1; 5], 25, &last).ok().unwrap();
        assert_eq!(page.next, None);
    }

    #[test]
    fn pairs_are_parsed() {
        let config = Config::default();
        let pairs = vec![
            (String::from("limit"), String::from("6")),
            (String::from("page"), String::from("2")),
        ];
        let request = PageRequest::from_pairs(&pairs, &config).ok().unwrap();
        assert_eq!(request, PageRequest { page: 2, limit: 6 });

        let bad = vec![(String::from("page"), String::from("two"))];
        assert!(PageRequest::from_pairs(&bad, &config).is_err());
    }

    #[test]
    fn empty_first_page() {
        let config = Config::default();
        let page: Page<i32> = Page::from_rows(vec![], 0, &PageRequest::new(None, None, &config))
            .ok()
            .unwrap();
        assert_eq!(page.count, 0);
        assert!(page.results.is_empty());
        assert_eq!(page.previous, None);
    }

    #[test]
    fn page_past_the_end_is_not_found() {
        let config = Config::default();
        let request = PageRequest::new(Some(4), Some(10), &config);

        let page: Result<Page<i32>, _> = Page::from_rows(vec![], 0, &request);
        assert!(matches!(page, Err(e) if e.code == 404));
    }

    #[test]
    fn huge_page_is_rejected_not_overflowed() {
        let config = Config::default();
        let pairs = vec![(String::from("page"), i64::MAX.to_string())];
        let request = PageRequest::from_pairs(&pairs, &config);
        assert!(matches!(request, Err(e) if e.code == 400));

        let request = PageRequest::new(Some(i64::MAX), None, &config);
        assert_eq!(request.offset(), i64::MAX);
        let page = Page::from_rows(vec![1], 1, &request).ok().unwrap();
        assert_eq!(page.next, None);
    }
}
