//! Shared admission counters for the per-category and global caps.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Admits at most `limit` callers, ever. Concurrent `try_admit` calls never
/// overshoot.
#[derive(Debug)]
pub struct AdmissionCap {
    limit: usize,
    admitted: AtomicUsize,
}

impl AdmissionCap {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            admitted: AtomicUsize::new(0),
        }
    }

    /// Takes a slot if one is left.
    pub fn try_admit(&self) -> bool {
        self.admitted
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.limit).then_some(n + 1)
            })
            .is_ok()
    }

    #[must_use]
    pub fn admitted(&self) -> usize {
        self.admitted.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.admitted() >= self.limit
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// One [`AdmissionCap`] per category, all with the same limit. Categories
/// fill independently.
#[derive(Debug)]
pub struct CategoryCaps {
    caps: HashMap<String, AdmissionCap>,
}

impl CategoryCaps {
    #[must_use]
    pub fn new<'a>(limit: usize, categories: impl IntoIterator<Item = &'a str>) -> Self {
        let caps = categories
            .into_iter()
            .map(|name| (name.to_owned(), AdmissionCap::new(limit)))
            .collect();
        Self { caps }
    }

    /// Unknown categories admit nothing.
    pub fn try_admit(&self, category: &str) -> bool {
        self.caps.get(category).is_some_and(AdmissionCap::try_admit)
    }

    #[must_use]
    pub fn is_full(&self, category: &str) -> bool {
        self.caps.get(category).is_none_or(AdmissionCap::is_full)
    }

    #[must_use]
    pub fn admitted(&self, category: &str) -> usize {
        self.caps.get(category).map_or(0, AdmissionCap::admitted)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn admits_up_to_limit() {
        let cap = AdmissionCap::new(2);
        assert!(cap.try_admit());
        assert!(cap.try_admit());
        assert!(!cap.try_admit());
        assert!(cap.is_full());
        assert_eq!(cap.admitted(), 2);
    }

    #[test]
    fn zero_limit_admits_nothing() {
        let cap = AdmissionCap::new(0);
        assert!(!cap.try_admit());
        assert!(cap.is_full());
    }

    #[test]
    fn concurrent_admission_never_overshoots() {
        let cap = Arc::new(AdmissionCap::new(37));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cap = Arc::clone(&cap);
                std::thread::spawn(move || (0..100).filter(|_| cap.try_admit()).count())
            })
            .collect();
        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 37);
        assert_eq!(cap.admitted(), 37);
    }

    #[test]
    fn categories_fill_independently() {
        let caps = CategoryCaps::new(1, ["household", "garden"]);
        assert!(caps.try_admit("household"));
        assert!(!caps.try_admit("household"));
        assert!(caps.is_full("household"));
        assert!(!caps.is_full("garden"));
        assert!(caps.try_admit("garden"));
        assert_eq!(caps.admitted("household"), 1);
    }

    #[test]
    fn unknown_category_is_closed() {
        let caps = CategoryCaps::new(5, ["household"]);
        assert!(!caps.try_admit("toys"));
        assert!(caps.is_full("toys"));
    }
}
