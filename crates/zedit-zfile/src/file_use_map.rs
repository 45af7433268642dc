//! Byte-range accounting for an archive file.
//!
//! A [`FileUseMap`] partitions `[0, size)` into contiguous, non-overlapping
//! intervals. Each interval is either free or holds a payload describing what
//! is stored there. Adjacent free intervals are always merged, so the map can
//! answer "where does N bytes fit" without scanning fragmented space.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// How [`FileUseMap::locate_free`] picks among free intervals that fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PositionAlgorithm {
    /// The smallest free interval that can hold the request.
    #[default]
    BestFit,
    /// The free interval closest to the start of the file.
    FirstFit,
}

/// One interval of a [`FileUseMap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUseMapEntry<T> {
    start: u64,
    end: u64,
    store: Option<T>,
}

impl<T> FileUseMapEntry<T> {
    fn free(start: u64, end: u64) -> Self {
        Self {
            start,
            end,
            store: None,
        }
    }

    /// First byte of the interval.
    #[inline]
    pub fn start(&self) -> u64 {
        self.start
    }

    /// First byte after the interval.
    #[inline]
    pub fn end(&self) -> u64 {
        self.end
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.end - self.start
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.store.is_none()
    }

    /// The payload, `None` for free intervals.
    #[inline]
    pub fn store(&self) -> Option<&T> {
        self.store.as_ref()
    }
}

/// Interval map over the bytes of a file.
///
/// Precondition violations (adding over used space, removing an interval the
/// map does not hold, shrinking through `extend`) are bugs and panic.
#[derive(Debug, Clone)]
pub struct FileUseMap<T> {
    size: u64,
    /// All intervals keyed by start offset.
    map: BTreeMap<u64, FileUseMapEntry<T>>,
    /// Free intervals as `(size, start)`, smallest first.
    free: BTreeSet<(u64, u64)>,
}

impl<T: Clone + PartialEq + fmt::Debug> FileUseMap<T> {
    /// Create a map of `size` bytes, all free.
    pub fn new(size: u64) -> Self {
        let mut map = Self {
            size,
            map: BTreeMap::new(),
            free: BTreeSet::new(),
        };
        if size > 0 {
            map.internal_add(FileUseMapEntry::free(0, size));
        }
        map
    }

    /// Size of the map, in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Size of the map ignoring a trailing free interval.
    pub fn used_size(&self) -> u64 {
        match self.map.values().next_back() {
            Some(last) if last.is_free() => last.start,
            Some(last) => {
                assert_eq!(last.end, self.size, "last interval does not end the map");
                self.size
            }
            None => 0,
        }
    }

    /// Iterate over every interval in file order.
    pub fn iter(&self) -> impl Iterator<Item = &FileUseMapEntry<T>> + '_ {
        self.map.values()
    }

    fn internal_add(&mut self, entry: FileUseMapEntry<T>) {
        if entry.is_free() {
            self.free.insert((entry.size(), entry.start));
        }
        let previous = self.map.insert(entry.start, entry);
        assert!(previous.is_none(), "interval already present at this offset");
    }

    fn internal_remove(&mut self, start: u64) -> FileUseMapEntry<T> {
        let Some(entry) = self.map.remove(&start) else {
            panic!("no interval starts at {start}");
        };
        if entry.is_free() {
            self.free.remove(&(entry.size(), entry.start));
        }
        entry
    }

    /// Mark `[start, end)` as used by `store`.
    ///
    /// The range must lie entirely inside one free interval, which is split
    /// into up to three pieces.
    pub fn add(&mut self, start: u64, end: u64, store: T) -> FileUseMapEntry<T> {
        assert!(start < end, "empty or inverted interval [{start}, {end})");
        assert!(end <= self.size, "interval end {end} beyond map size {}", self.size);

        let Some((&container_start, container)) = self.map.range(..=start).next_back() else {
            panic!("map has no interval containing {start}");
        };
        assert!(
            container.is_free(),
            "[{start}, {end}) overlaps used interval [{}, {})",
            container.start,
            container.end
        );
        assert!(
            container.end >= end,
            "[{start}, {end}) does not fit in free interval [{}, {})",
            container.start,
            container.end
        );

        let container = self.internal_remove(container_start);
        if container.start < start {
            self.internal_add(FileUseMapEntry::free(container.start, start));
        }

        let entry = FileUseMapEntry {
            start,
            end,
            store: Some(store),
        };
        self.internal_add(entry.clone());

        if end < container.end {
            self.internal_add(FileUseMapEntry::free(end, container.end));
        }

        entry
    }

    /// Release a used interval previously returned by [`add`](Self::add).
    pub fn remove(&mut self, entry: &FileUseMapEntry<T>) {
        assert!(!entry.is_free(), "cannot remove a free interval");
        match self.map.get(&entry.start) {
            Some(held) if held == entry => {}
            held => panic!("interval {entry:?} is not in the map (found {held:?})"),
        }

        self.internal_remove(entry.start);
        self.internal_add(FileUseMapEntry::free(entry.start, entry.end));
        self.coalesce(entry.start);
    }

    /// Merge the free interval at `start` with free neighbours.
    fn coalesce(&mut self, start: u64) {
        let end = self.map[&start].end;
        assert!(self.map[&start].is_free(), "coalescing a used interval");

        let prev = self
            .map
            .range(..start)
            .next_back()
            .filter(|(_, e)| e.is_free())
            .map(|(&s, _)| s);
        let next = self.map.get(&end).filter(|e| e.is_free()).map(|e| e.end);

        if prev.is_none() && next.is_none() {
            return;
        }

        let new_start = prev.unwrap_or(start);
        let new_end = next.unwrap_or(end);
        if let Some(prev) = prev {
            self.internal_remove(prev);
        }
        if next.is_some() {
            self.internal_remove(end);
        }
        self.internal_remove(start);
        self.internal_add(FileUseMapEntry::free(new_start, new_end));
    }

    /// Grow the map to `size` bytes; the new space is free.
    pub fn extend(&mut self, size: u64) {
        assert!(size >= self.size, "cannot shrink map from {} to {size}", self.size);
        if size == self.size {
            return;
        }

        let start = self.size;
        self.size = size;
        self.internal_add(FileUseMapEntry::free(start, size));
        self.coalesce(start);
    }

    /// Drop a trailing free interval, shrinking the map to its start.
    pub fn truncate(&mut self) {
        let trailing = match self.map.values().next_back() {
            Some(last) if last.is_free() => last.start,
            _ => return,
        };
        self.internal_remove(trailing);
        self.size = trailing;
    }

    /// Find an offset where `size` bytes fit such that
    /// `(offset + align_offset) % align == 0`.
    ///
    /// If no free interval can hold the request, the returned offset is past
    /// the last used byte and the caller must [`extend`](Self::extend) the map.
    pub fn locate_free(
        &self,
        size: u64,
        align_offset: u64,
        align: u64,
        algorithm: PositionAlgorithm,
    ) -> u64 {
        assert!(size > 0, "cannot locate an empty interval");
        assert!(align > 0, "alignment must be at least 1");

        let padding = |start: u64| (align - (start + align_offset) % align) % align;
        let fits = |entry: &FileUseMapEntry<T>| entry.size() >= size + padding(entry.start);

        let found = match algorithm {
            PositionAlgorithm::BestFit => self
                .free
                .range((size, 0)..)
                .map(|&(_, start)| &self.map[&start])
                .find(|entry| fits(entry)),
            PositionAlgorithm::FirstFit => self
                .map
                .values()
                .filter(|entry| entry.is_free())
                .find(|entry| fits(entry)),
        };

        if let Some(entry) = found {
            log::trace!(
                "placing {size} bytes in free interval [{}, {})",
                entry.start,
                entry.end
            );
            return entry.start + padding(entry.start);
        }

        let first_free = match self.map.values().next_back() {
            Some(last) if last.is_free() => last.start,
            _ => self.size,
        };
        log::trace!("no free interval holds {size} bytes, placing at end ({first_free})");
        first_free + padding(first_free)
    }

    /// Whether `[start, end)` lies inside a single free interval.
    pub fn is_free_range(&self, start: u64, end: u64) -> bool {
        if start >= end || end > self.size {
            return false;
        }
        self.map
            .range(..=start)
            .next_back()
            .is_some_and(|(_, entry)| entry.is_free() && end <= entry.end)
    }

    /// All free intervals except a trailing one, in file order.
    pub fn free_areas(&self) -> Vec<FileUseMapEntry<T>> {
        self.map
            .values()
            .filter(|entry| entry.is_free() && entry.end != self.size)
            .cloned()
            .collect()
    }
}

impl<T: fmt::Debug> fmt::Display for FileUseMap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileUseMap[")?;
        for (i, entry) in self.map.values().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match &entry.store {
                Some(store) => write!(f, "{} - {}: {:?}", entry.start, entry.end, store)?,
                None => write!(f, "{} - {}: free", entry.start, entry.end)?,
            }
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Coverage and coalescing invariants.
    fn check(map: &FileUseMap<u32>) {
        let mut expected_start = 0;
        let mut prev_free = false;
        for entry in map.iter() {
            assert_eq!(entry.start(), expected_start, "gap or overlap in {map}");
            assert!(entry.start() < entry.end());
            assert!(!(prev_free && entry.is_free()), "adjacent free intervals in {map}");
            prev_free = entry.is_free();
            expected_start = entry.end();
        }
        assert_eq!(expected_start, map.size());

        let free_count = map.iter().filter(|e| e.is_free()).count();
        assert_eq!(free_count, map.free.len());
    }

    #[test]
    fn test_add_splits_free_interval() {
        let mut map = FileUseMap::new(100);
        map.add(10, 20, 1u32);
        check(&map);

        let sizes: Vec<_> = map.iter().map(|e| (e.start(), e.end(), e.is_free())).collect();
        assert_eq!(sizes, vec![(0, 10, true), (10, 20, false), (20, 100, true)]);
    }

    #[test]
    fn test_remove_coalesces_both_sides() {
        let mut map = FileUseMap::new(100);
        let a = map.add(0, 10, 1u32);
        let b = map.add(10, 20, 2);
        let c = map.add(20, 30, 3);

        map.remove(&a);
        map.remove(&c);
        check(&map);
        map.remove(&b);
        check(&map);

        assert_eq!(map.iter().count(), 1);
        assert_eq!(map.used_size(), 0);
    }

    #[test]
    fn test_extend_and_truncate() {
        let mut map = FileUseMap::new(0);
        map.extend(50);
        map.add(0, 10, 1u32);
        map.extend(80);
        check(&map);
        assert_eq!(map.size(), 80);
        assert_eq!(map.used_size(), 10);

        map.truncate();
        check(&map);
        assert_eq!(map.size(), 10);

        // nothing to drop
        map.truncate();
        assert_eq!(map.size(), 10);
    }

    #[test]
    fn test_best_fit_picks_smallest_block() {
        // free blocks of 100, 10 and 50 bytes at increasing offsets
        let mut map = FileUseMap::new(200);
        map.add(100, 101, 1u32);
        map.add(111, 112, 2);
        map.add(162, 200, 3);
        check(&map);

        let offset = map.locate_free(40, 0, 1, PositionAlgorithm::BestFit);
        assert_eq!(offset, 112);

        let offset = map.locate_free(40, 0, 1, PositionAlgorithm::FirstFit);
        assert_eq!(offset, 0);
    }

    #[test]
    fn test_locate_respects_alignment() {
        let mut map = FileUseMap::new(100);
        map.add(0, 3, 1u32);

        // data starts 30 bytes after the returned offset
        let offset = map.locate_free(10, 30, 16, PositionAlgorithm::BestFit);
        assert_eq!((offset + 30) % 16, 0);
        assert!(offset >= 3);
    }

    #[test]
    fn test_locate_past_end_when_nothing_fits() {
        let mut map = FileUseMap::new(100);
        map.add(0, 90, 1u32);

        // trailing free block [90, 100) too small
        assert_eq!(map.locate_free(20, 0, 1, PositionAlgorithm::BestFit), 90);
        assert_eq!(map.locate_free(20, 0, 64, PositionAlgorithm::BestFit), 128);

        map.add(90, 100, 2);
        assert_eq!(map.locate_free(20, 0, 1, PositionAlgorithm::BestFit), 100);
    }

    #[test]
    fn test_free_areas_excludes_trailing() {
        let mut map = FileUseMap::new(100);
        map.add(10, 20, 1u32);
        map.add(30, 40, 2);

        let areas: Vec<_> = map.free_areas().iter().map(|e| (e.start(), e.end())).collect();
        assert_eq!(areas, vec![(0, 10), (20, 30)]);
    }

    #[test]
    fn test_is_free_range() {
        let mut map = FileUseMap::new(100);
        map.add(10, 20, 1u32);

        assert!(map.is_free_range(0, 10));
        assert!(map.is_free_range(20, 100));
        assert!(!map.is_free_range(5, 15));
        assert!(!map.is_free_range(12, 14));
        assert!(!map.is_free_range(90, 101));
        assert!(!map.is_free_range(30, 30));
    }

    #[test]
    fn test_random_operations_keep_coverage() {
        // xorshift, deterministic
        let mut state = 0x2545F4914F6CDD1Du64;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };

        let mut map = FileUseMap::new(0);
        let mut used: Vec<FileUseMapEntry<u32>> = Vec::new();

        for i in 0..2000u32 {
            match next() % 4 {
                0 | 1 => {
                    let size = next() % 64 + 1;
                    let align = 1 << (next() % 4);
                    let offset = map.locate_free(size, 0, align, PositionAlgorithm::BestFit);
                    if offset + size > map.size() {
                        map.extend(offset + size);
                    }
                    used.push(map.add(offset, offset + size, i));
                }
                2 if !used.is_empty() => {
                    let idx = (next() % used.len() as u64) as usize;
                    let entry = used.swap_remove(idx);
                    map.remove(&entry);
                }
                _ => map.truncate(),
            }
            check(&map);
        }
    }

    #[test]
    #[should_panic]
    fn test_add_over_used_space_panics() {
        let mut map = FileUseMap::new(100);
        map.add(10, 20, 1u32);
        map.add(15, 25, 2);
    }

    #[test]
    #[should_panic]
    fn test_remove_foreign_interval_panics() {
        let mut map = FileUseMap::new(100);
        map.add(10, 20, 1u32);
        let mut other = FileUseMap::new(100);
        let foreign = other.add(10, 20, 2u32);
        map.remove(&foreign);
    }
}
