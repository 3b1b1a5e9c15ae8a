//! Splitting an ordered collection into fixed-size pages.
//!
//! Page numbers are 1-based. Requests for a page that does not exist never
//! fail: anything unparsable or below 1 yields the first page, anything beyond
//! the end yields the last page. An empty collection still has one (empty)
//! page.

use serde::Serialize;


#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PageMeta {
	pub number: u64,
	pub num_pages: u64,
	/// Total number of items over all pages.
	pub count: u64,
	pub per_page: u64,
	pub has_previous: bool,
	pub has_next: bool,
	pub previous_page_number: Option<u64>,
	pub next_page_number: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
	pub items: Vec<T>,
	pub meta: PageMeta,
}


/// Parses the `page` query parameter. Invalid input is treated as the first
/// page. That includes zero and negative numbers, which Django's
/// `Paginator.get_page` would send to the last page instead.
pub fn parse_page_number(raw: Option<&str>) -> u64 {
	raw.and_then(|s| s.trim().parse::<u64>().ok())
		.filter(|n| *n > 0)
		.unwrap_or(1)
}

impl PageMeta {
	pub fn new(requested: u64, count: u64, per_page: u64) -> Self {
		debug_assert!(per_page > 0, "page size must be at least 1");
		let per_page = per_page.max(1);
		let num_pages = if count == 0 {
			1
		} else {
			(count + per_page - 1) / per_page
		};
		let number = requested.clamp(1, num_pages);

		Self {
			number,
			num_pages,
			count,
			per_page,
			has_previous: number > 1,
			has_next: number < num_pages,
			previous_page_number: if number > 1 { Some(number - 1) } else { None },
			next_page_number: if number < num_pages {
				Some(number + 1)
			} else {
				None
			},
		}
	}

	/// The zero-based index of the page, as used by the database paginator.
	pub fn index(&self) -> u64 { self.number - 1 }
}

impl<T> Page<T> {
	pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
		Page {
			items: self.items.into_iter().map(f).collect(),
			meta: self.meta,
		}
	}
}
