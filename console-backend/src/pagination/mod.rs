//! Cursor-based pagination over in-memory sequences.
//!
//! Every list exposed by the API is fully materialized and then windowed here. The window is
//! derived either forwards from `after` + `first` or backwards from `before` + `last`; the
//! resulting [`PageInfo`] intentionally keeps the historical flag computation clients depend on:
//! `has_next_page` and `has_previous_page` are computed from `first`/`after` even for backward
//! pagination, except that a non-empty backward page always reports a next page.

mod cursor;

pub use cursor::Cursor;

use crate::errors::{Error, Result};

/// Page size used when the caller supplies neither `first` nor `last`.
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Validated pagination window request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pagination {
    first: Option<i64>,
    last: Option<i64>,
    after: Option<Cursor>,
    before: Option<Cursor>,
}

impl Pagination {
    pub fn new(first: Option<i64>, last: Option<i64>, after: Option<Cursor>, before: Option<Cursor>) -> Result<Self> {
        if first.is_some() && last.is_some() {
            return Err(Error::invalid_argument("first and last cannot be used together"));
        }
        if first.is_some_and(|n| n < 0) || last.is_some_and(|n| n < 0) {
            return Err(Error::invalid_argument("first and last must be non-negative"));
        }

        Ok(Self {
            first,
            last,
            after,
            before,
        })
    }

    /// Build a window from raw GraphQL arguments, decoding the cursor tokens.
    pub fn from_args(first: Option<i32>, last: Option<i32>, after: Option<&str>, before: Option<&str>) -> Result<Self> {
        let after = after.map(Cursor::decode).transpose()?;
        let before = before.map(Cursor::decode).transpose()?;
        Self::new(first.map(i64::from), last.map(i64::from), after, before)
    }

    pub fn first(&self) -> i64 {
        self.first.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub fn last(&self) -> i64 {
        self.last.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    /// `after` cursor, defaulting to offset -1 so that forward pages start at 0.
    pub fn after(&self) -> Cursor {
        self.after.unwrap_or(Cursor::new(-1))
    }

    pub fn before(&self) -> Option<Cursor> {
        self.before
    }

    /// Compute the half-open `[start, end)` slice of a sequence with `length` elements.
    ///
    /// `start` is clamped to `length - 1` first and then to 0, `end` to `[0, length]`. Callers
    /// must treat `start >= end` as an empty page.
    pub fn for_slice(&self, length: usize) -> (usize, usize) {
        let length = length as i64;
        let (start, end) = match self.before {
            Some(before) => (before.offset.saturating_sub(self.last()), before.offset),
            None => {
                let start = self.after().offset.saturating_add(1);
                (start, start.saturating_add(self.first()))
            }
        };

        let start = start.min(length - 1).max(0);
        let end = end.min(length).max(0);
        (start as usize, end as usize)
    }

    /// Page flags for a page cut from a sequence of `total` elements.
    pub fn page_info(&self, total: usize, start_cursor: Option<Cursor>, end_cursor: Option<Cursor>) -> PageInfo {
        let after = self.after().offset;
        let mut has_next_page = total as i64 > self.first().saturating_add(after).saturating_add(1);
        let mut has_previous_page = after > 0;

        if self.before.is_some()
            && let Some(start) = start_cursor
        {
            has_next_page = true;
            has_previous_page = start.offset > 0;
        }

        PageInfo {
            has_next_page,
            has_previous_page,
            start_cursor,
            end_cursor,
            total_count: total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<Cursor>,
    pub end_cursor: Option<Cursor>,
    pub total_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge<T> {
    pub cursor: Cursor,
    pub node: T,
}

/// A window of a fully materialized sequence plus its page flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection<T> {
    pub edges: Vec<Edge<T>>,
    pub page_info: PageInfo,
}

impl<T> Connection<T> {
    /// Cut the window described by `pagination` out of `items`.
    ///
    /// Each edge cursor carries the element's absolute index in `items`.
    pub fn paginate(items: Vec<T>, pagination: &Pagination) -> Self {
        let total = items.len();
        let (start, end) = pagination.for_slice(total);

        let edges: Vec<Edge<T>> = if start < end {
            items
                .into_iter()
                .enumerate()
                .skip(start)
                .take(end - start)
                .map(|(index, node)| Edge {
                    cursor: Cursor::new(index as i64),
                    node,
                })
                .collect()
        } else {
            Vec::new()
        };

        let page_info = pagination.page_info(total, edges.first().map(|e| e.cursor), edges.last().map(|e| e.cursor));
        Self { edges, page_info }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Connection<U> {
        Connection {
            edges: self
                .edges
                .into_iter()
                .map(|edge| Edge {
                    cursor: edge.cursor,
                    node: f(edge.node),
                })
                .collect(),
            page_info: self.page_info,
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &T> {
        self.edges.iter().map(|edge| &edge.node)
    }
}
