use crate::query::predicate::FieldRef;
use derive_more::{Deref, IntoIterator};
use serde::{Deserialize, Serialize};

///
/// Direction
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

///
/// Sort
/// Ordered list of sort keys; earlier keys dominate.
///

#[derive(Clone, Debug, Default, Deref, Deserialize, IntoIterator, Serialize)]
pub struct Sort(Vec<(FieldRef, Direction)>);

impl Sort {
    #[must_use]
    pub const fn none() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn by(field: impl Into<FieldRef>, direction: Direction) -> Self {
        Self(vec![(field.into(), direction)])
    }

    /// Append a subordinate sort key.
    #[must_use]
    pub fn and(mut self, field: impl Into<FieldRef>, direction: Direction) -> Self {
        self.0.push((field.into(), direction));
        self
    }

    #[must_use]
    pub fn keys(&self) -> &[(FieldRef, Direction)] {
        &self.0
    }
}

///
/// PageRequest
/// Zero-based page window plus an optional sort.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
    pub sort: Sort,
}

impl PageRequest {
    /// A size below 1 is clamped to 1.
    #[must_use]
    pub fn of(page: u32, size: u32) -> Self {
        Self {
            page,
            size: size.max(1),
            sort: Sort::none(),
        }
    }

    #[must_use]
    pub fn sorted(page: u32, size: u32, sort: Sort) -> Self {
        Self {
            page,
            size: size.max(1),
            sort,
        }
    }

    /// Rows skipped before this window.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.size)
    }
}

///
/// Page
///
/// One window of a counted result set. `total_elements` counts every
/// filtered row, not just this window.
///

#[derive(Clone, Debug, Deref, Deserialize, IntoIterator, Serialize)]
pub struct Page<T> {
    #[deref]
    #[into_iterator]
    content: Vec<T>,
    number: u32,
    size: u32,
    total_elements: u64,
    total_pages: u32,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(content: Vec<T>, request: &PageRequest, total_elements: u64) -> Self {
        let total_pages = u32::try_from(total_elements.div_ceil(u64::from(request.size)))
            .unwrap_or(u32::MAX);

        Self {
            content,
            number: request.page,
            size: request.size,
            total_elements,
            total_pages,
        }
    }

    #[must_use]
    pub fn content(&self) -> &[T] {
        &self.content
    }

    #[must_use]
    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    #[must_use]
    pub const fn number(&self) -> u32 {
        self.number
    }

    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    #[must_use]
    pub const fn total_elements(&self) -> u64 {
        self.total_elements
    }

    #[must_use]
    pub const fn total_pages(&self) -> u32 {
        self.total_pages
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        (u64::from(self.number) + 1) * u64::from(self.size) < self.total_elements
    }

    #[must_use]
    pub const fn has_previous(&self) -> bool {
        self.number > 0
    }

    #[must_use]
    pub const fn is_first(&self) -> bool {
        self.number == 0
    }

    #[must_use]
    pub fn is_last(&self) -> bool {
        !self.has_next()
    }

    /// Convert content while keeping the page metadata (DTO mapping).
    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            number: self.number,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
        }
    }
}

///
/// Slice
///
/// One window of an uncounted result set: next-page knowledge without a
/// total, probed by fetching one row past the window.
///

#[derive(Clone, Debug, Deref, Deserialize, IntoIterator, Serialize)]
pub struct Slice<T> {
    #[deref]
    #[into_iterator]
    content: Vec<T>,
    number: u32,
    size: u32,
    has_next: bool,
}

impl<T> Slice<T> {
    #[must_use]
    pub fn new(content: Vec<T>, request: &PageRequest, has_next: bool) -> Self {
        Self {
            content,
            number: request.page,
            size: request.size,
            has_next,
        }
    }

    #[must_use]
    pub fn content(&self) -> &[T] {
        &self.content
    }

    #[must_use]
    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    #[must_use]
    pub const fn number(&self) -> u32 {
        self.number
    }

    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    #[must_use]
    pub const fn has_next(&self) -> bool {
        self.has_next
    }

    #[must_use]
    pub const fn is_first(&self) -> bool {
        self.number == 0
    }

    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Slice<U> {
        Slice {
            content: self.content.into_iter().map(f).collect(),
            number: self.number,
            size: self.size,
            has_next: self.has_next,
        }
    }
}
