// Copyright 2026 Quarry Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Search index over a string column
//!
//! Maps column values to their posting lists of object keys. Postings
//! are kept in ascending key order so the index fast path yields
//! matches in object-key order, and they sit behind `Arc` so
//! [`SearchIndex::find_all_no_copy`] hands out a window into the live
//! postings without copying.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::core::ObjKey;

/// Result of an index lookup
#[derive(Debug, Clone)]
pub enum FindRes {
    /// No object carries the value
    NotFound,

    /// Exactly one object carries the value
    Single(ObjKey),

    /// A window into a posting list, keys ascending
    Column {
        keys: Arc<Vec<ObjKey>>,
        start_ndx: usize,
        end_ndx: usize,
    },
}

/// Value -> sorted posting list
#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    postings: FxHashMap<Arc<str>, Arc<Vec<ObjKey>>>,
    nulls: Arc<Vec<ObjKey>>,
}

impl SearchIndex {
    /// All keys carrying `value`, without copying the posting list
    pub fn find_all_no_copy(&self, value: Option<&str>) -> FindRes {
        let postings = match value {
            Some(s) => match self.postings.get(s) {
                Some(list) => list,
                None => return FindRes::NotFound,
            },
            None => &self.nulls,
        };
        match postings.len() {
            0 => FindRes::NotFound,
            1 => FindRes::Single(postings[0]),
            n => FindRes::Column {
                keys: postings.clone(),
                start_ndx: 0,
                end_ndx: n,
            },
        }
    }

    /// Lowest key carrying `value`
    pub fn find_first(&self, value: Option<&str>) -> Option<ObjKey> {
        match self.find_all_no_copy(value) {
            FindRes::NotFound => None,
            FindRes::Single(key) => Some(key),
            FindRes::Column { keys, start_ndx, .. } => keys.get(start_ndx).copied(),
        }
    }

    pub(crate) fn insert(&mut self, value: Option<&Arc<str>>, key: ObjKey) {
        let postings = match value {
            Some(s) => self
                .postings
                .entry(s.clone())
                .or_insert_with(|| Arc::new(Vec::new())),
            None => &mut self.nulls,
        };
        let list = Arc::make_mut(postings);
        let pos = list.partition_point(|&k| k < key);
        if list.get(pos) != Some(&key) {
            list.insert(pos, key);
        }
    }

    pub(crate) fn remove(&mut self, value: Option<&str>, key: ObjKey) {
        let postings = match value {
            Some(s) => match self.postings.get_mut(s) {
                Some(list) => list,
                None => return,
            },
            None => &mut self.nulls,
        };
        let list = Arc::make_mut(postings);
        if let Ok(pos) = list.binary_search(&key) {
            list.remove(pos);
        }
        if list.is_empty() {
            if let Some(s) = value {
                self.postings.remove(s);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postings_stay_sorted() {
        let mut index = SearchIndex::default();
        let ann: Arc<str> = Arc::from("ann");
        index.insert(Some(&ann), ObjKey(5));
        index.insert(Some(&ann), ObjKey(1));
        index.insert(Some(&ann), ObjKey(3));
        match index.find_all_no_copy(Some("ann")) {
            FindRes::Column {
                keys,
                start_ndx,
                end_ndx,
            } => {
                assert_eq!(&keys[start_ndx..end_ndx], &[ObjKey(1), ObjKey(3), ObjKey(5)]);
            }
            other => panic!("expected column result, got {:?}", other),
        }
        assert_eq!(index.find_first(Some("ann")), Some(ObjKey(1)));
    }

    #[test]
    fn single_and_missing() {
        let mut index = SearchIndex::default();
        let bob: Arc<str> = Arc::from("bob");
        index.insert(Some(&bob), ObjKey(7));
        assert!(matches!(
            index.find_all_no_copy(Some("bob")),
            FindRes::Single(ObjKey(7))
        ));
        assert!(matches!(
            index.find_all_no_copy(Some("zed")),
            FindRes::NotFound
        ));
        index.remove(Some("bob"), ObjKey(7));
        assert!(matches!(
            index.find_all_no_copy(Some("bob")),
            FindRes::NotFound
        ));
    }

    #[test]
    fn null_postings() {
        let mut index = SearchIndex::default();
        index.insert(None, ObjKey(2));
        assert_eq!(index.find_first(None), Some(ObjKey(2)));
        index.remove(None, ObjKey(2));
        assert!(matches!(index.find_all_no_copy(None), FindRes::NotFound));
    }
}
