//! Search, sort and pagination shared by every administrative list.

use icu_collator::{CaseFirst, Collator, CollatorOptions, Strength};
use std::cmp::Ordering;
use tracing::warn;

/// Value an item exposes for a sort field.
#[derive(Clone, Debug, PartialEq)]
pub enum SortKey<'a> {
    Text(&'a str),
    Number(i64),
    Missing,
}

/// Items which can go through the list pipeline.
pub trait Listable {
    type Field: Copy + Eq;

    /// Text searched by the filter stage.
    fn search_text(&self) -> Vec<&str>;
    fn sort_key(&self, field: Self::Field) -> SortKey<'_>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    pub fn flip(self) -> Self {
        match self {
            Direction::Ascending => Direction::Descending,
            Direction::Descending => Direction::Ascending,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Sort<F> {
    pub field: F,
    pub direction: Direction,
}

impl<F: Copy + Eq> Sort<F> {
    pub fn ascending(field: F) -> Self {
        Sort {
            field,
            direction: Direction::Ascending,
        }
    }

    /// Sort state after a click on the header of `field`: the same field flips
    /// its direction, another field starts ascending.
    pub fn toggle(current: Option<Self>, field: F) -> Self {
        match current {
            Some(sort) if sort.field == field => Sort {
                field,
                direction: sort.direction.flip(),
            },
            _ => Sort::ascending(field),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ListParams<F> {
    pub search: String,
    pub sort: Option<Sort<F>>,
    pub page: usize,
    pub page_size: usize,
}

impl<F> ListParams<F> {
    pub fn new(page_size: usize) -> Self {
        ListParams {
            search: String::new(),
            sort: None,
            page: 0,
            page_size,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Number of items which passed the filter, across all pages.
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

impl<T> Page<T> {
    pub fn page_count(&self) -> usize {
        if self.page_size == 0 {
            0
        } else {
            self.total.div_ceil(self.page_size)
        }
    }
}

thread_local! {
    static COLLATOR: Option<Collator> = {
        let mut options = CollatorOptions::new();
        options.strength = Some(Strength::Tertiary);
        options.case_first = Some(CaseFirst::LowerFirst);
        Collator::try_new(&Default::default(), options)
            .inspect_err(|e| warn!(error = ?e, "no collation data, sorting by code point"))
            .ok()
    };
}

/// Compare strings the way a human would expect in a listing: root locale
/// collation, so accents and case only break ties between equal letters and
/// lowercase comes first.
pub fn collate(a: &str, b: &str) -> Ordering {
    COLLATOR.with(|collator| match collator {
        Some(collator) => collator.compare(a, b),
        None => {
            let folded = |s: &str| s.chars().flat_map(char::to_lowercase).collect::<Vec<_>>();
            folded(a).cmp(&folded(b)).then_with(|| b.cmp(a))
        }
    })
}

fn compare_keys(a: &SortKey, b: &SortKey, direction: Direction) -> Ordering {
    let ordering = match (a, b) {
        (SortKey::Missing, SortKey::Missing) => return Ordering::Equal,
        (SortKey::Missing, _) => return Ordering::Greater,
        (_, SortKey::Missing) => return Ordering::Less,
        (SortKey::Text(a), SortKey::Text(b)) => collate(a, b),
        (SortKey::Number(a), SortKey::Number(b)) => a.cmp(b),
        (SortKey::Number(_), SortKey::Text(_)) => Ordering::Less,
        (SortKey::Text(_), SortKey::Number(_)) => Ordering::Greater,
    };
    match direction {
        Direction::Ascending => ordering,
        Direction::Descending => ordering.reverse(),
    }
}

/// Filter, sort then paginate `items`. Missing values end up last whatever
/// the direction, and items with equal keys keep their relative order.
pub fn apply<T: Listable>(items: Vec<T>, params: &ListParams<T::Field>) -> Page<T> {
    let needle = params.search.to_lowercase();
    let mut items = items
        .into_iter()
        .filter(|item| {
            needle.is_empty()
                || item
                    .search_text()
                    .iter()
                    .any(|text| text.to_lowercase().contains(&needle))
        })
        .collect::<Vec<_>>();
    if let Some(sort) = params.sort {
        items.sort_by(|a, b| {
            compare_keys(&a.sort_key(sort.field), &b.sort_key(sort.field), sort.direction)
        });
    }
    let total = items.len();
    let start = params.page.saturating_mul(params.page_size);
    let items = items
        .into_iter()
        .skip(start)
        .take(params.page_size)
        .collect();
    Page {
        items,
        total,
        page: params.page,
        page_size: params.page_size,
    }
}
