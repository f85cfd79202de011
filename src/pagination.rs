#[derive(Debug, serde::Deserialize, Default)]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<String>,
}

/// Page number asked for in the query string, `None` when it can't be a page
pub fn requested_page(page: Option<&str>) -> Option<i64> {
    match page.map(str::trim) {
        None | Some("") => Some(1),
        Some(p) => p.parse().ok().filter(|&n| n >= 1),
    }
}

/// Position of a page inside a list of `total` items split in pages of `per_page`.
///
/// Pages are numbered from 1 and an empty list still has a first page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    pub number: i64,
    pub per_page: i64,
    pub total: i64,
}

impl Paginator {
    /// Returns `None` when `number` is not a page of the list
    pub fn new(number: i64, per_page: i64, total: i64) -> Option<Self> {
        let this = Self {
            number,
            per_page: per_page.max(1),
            total: total.max(0),
        };

        (1..=this.num_pages()).contains(&number).then_some(this)
    }

    pub fn num_pages(&self) -> i64 {
        let full = self.total / self.per_page;
        let partial = i64::from(self.total % self.per_page != 0);
        (full + partial).max(1)
    }

    pub fn offset(&self) -> i64 {
        (self.number - 1) * self.per_page
    }

    pub fn previous(&self) -> Option<i64> {
        (self.number > 1).then(|| self.number - 1)
    }

    pub fn next(&self) -> Option<i64> {
        (self.number < self.num_pages()).then(|| self.number + 1)
    }

    pub fn is_paginated(&self) -> bool {
        self.num_pages() > 1
    }
}

#[cfg(test)]
mod test {
    use super::{requested_page, Paginator};

    #[test]
    fn page_numbers() {
        assert_eq!(requested_page(None), Some(1));
        assert_eq!(requested_page(Some("")), Some(1));
        assert_eq!(requested_page(Some(" 3 ")), Some(3));
        assert_eq!(requested_page(Some("0")), None);
        assert_eq!(requested_page(Some("-1")), None);
        assert_eq!(requested_page(Some("last")), None);
        assert_eq!(requested_page(Some("99999999999999999999")), None);
    }

    #[test]
    fn empty_list_has_a_page() {
        let p = Paginator::new(1, 10, 0).unwrap();
        assert_eq!(p.num_pages(), 1);
        assert_eq!(p.offset(), 0);
        assert_eq!(p.previous(), None);
        assert_eq!(p.next(), None);
        assert!(!p.is_paginated());

        assert_eq!(Paginator::new(2, 10, 0), None);
    }

    #[test]
    fn page_bounds() {
        let p = Paginator::new(3, 10, 25).unwrap();
        assert_eq!(p.num_pages(), 3);
        assert_eq!(p.offset(), 20);
        assert_eq!(p.previous(), Some(2));
        assert_eq!(p.next(), None);

        let p = Paginator::new(1, 10, 25).unwrap();
        assert_eq!(p.next(), Some(2));

        assert_eq!(Paginator::new(4, 10, 25), None);
        assert_eq!(Paginator::new(0, 10, 25), None);
    }

    #[test]
    fn exact_multiple() {
        let p = Paginator::new(2, 10, 20).unwrap();
        assert_eq!(p.num_pages(), 2);
        assert_eq!(p.next(), None);
    }

    #[test]
    fn huge_page_size() {
        let p = Paginator::new(1, i64::MAX, 25).unwrap();
        assert_eq!(p.num_pages(), 1);
        assert_eq!(p.offset(), 0);

        let p = Paginator::new(1, i64::MAX - 1, i64::MAX).unwrap();
        assert_eq!(p.num_pages(), 2);
        assert_eq!(p.next(), Some(2));
    }
}
