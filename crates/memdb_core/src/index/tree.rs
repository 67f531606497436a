//! Persistent ordered map.
//!
//! An AVL tree whose nodes are shared through `Arc`. Cloning a map is
//! O(1); an update copies only the nodes on the path from the root to the
//! changed key (`Arc::make_mut`), so versions share every untouched subtree.

use std::cmp::Ordering;
use std::fmt;
use std::mem;
use std::sync::Arc;

type Link<K, V> = Option<Arc<Node<K, V>>>;

#[derive(Clone)]
struct Node<K, V> {
    key: K,
    value: V,
    height: u32,
    left: Link<K, V>,
    right: Link<K, V>,
}

impl<K, V> Node<K, V> {
    fn leaf(key: K, value: V) -> Self {
        Self {
            key,
            value,
            height: 1,
            left: None,
            right: None,
        }
    }

    fn update_height(&mut self) {
        self.height = 1 + height(&self.left).max(height(&self.right));
    }

    fn balance(&self) -> i64 {
        i64::from(height(&self.left)) - i64::from(height(&self.right))
    }
}

fn height<K, V>(link: &Link<K, V>) -> u32 {
    link.as_ref().map_or(0, |node| node.height)
}

/// An ordered map with cheap clones and copy-on-write updates.
pub struct PersistentMap<K, V> {
    root: Link<K, V>,
    len: usize,
}

impl<K, V> PersistentMap<K, V> {
    /// Creates an empty map.
    #[must_use]
    pub const fn new() -> Self {
        Self { root: None, len: 0 }
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the map holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterates over all entries in ascending key order.
    #[must_use]
    pub fn iter(&self) -> Iter<K, V> {
        let mut iter = Iter { stack: Vec::new() };
        iter.push_left_spine(self.root.clone());
        iter
    }
}

impl<K: Ord + Clone, V: Clone> PersistentMap<K, V> {
    /// Looks up a key.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        let mut link = &self.root;
        while let Some(node) = link {
            link = match key.cmp(&node.key) {
                Ordering::Less => &node.left,
                Ordering::Greater => &node.right,
                Ordering::Equal => return Some(&node.value),
            };
        }
        None
    }

    /// Iterates over entries with keys at or after `from`, ascending.
    #[must_use]
    pub fn iter_from(&self, from: &K) -> Iter<K, V> {
        let mut stack = Vec::new();
        let mut link = self.root.clone();
        while let Some(node) = link {
            if node.key < *from {
                link = node.right.clone();
            } else {
                link = node.left.clone();
                stack.push(node);
            }
        }
        Iter { stack }
    }

    /// Inserts or replaces an entry, returning the previous value.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let old = insert(&mut self.root, key, value);
        if old.is_none() {
            self.len += 1;
        }
        old
    }

    /// Removes an entry, returning its value. Absent keys are a no-op.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        // Checking first keeps shared paths uncopied when nothing changes.
        self.get(key)?;
        let removed = remove(&mut self.root, key);
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }
}

fn insert<K: Ord + Clone, V: Clone>(link: &mut Link<K, V>, key: K, value: V) -> Option<V> {
    let old = match link {
        None => {
            *link = Some(Arc::new(Node::leaf(key, value)));
            return None;
        }
        Some(node) => {
            let node = Arc::make_mut(node);
            match key.cmp(&node.key) {
                Ordering::Less => insert(&mut node.left, key, value),
                Ordering::Greater => insert(&mut node.right, key, value),
                Ordering::Equal => return Some(mem::replace(&mut node.value, value)),
            }
        }
    };
    rebalance(link);
    old
}

fn remove<K: Ord + Clone, V: Clone>(link: &mut Link<K, V>, key: &K) -> Option<V> {
    let node = Arc::make_mut(link.as_mut()?);
    let removed = match key.cmp(&node.key) {
        Ordering::Less => remove(&mut node.left, key),
        Ordering::Greater => remove(&mut node.right, key),
        Ordering::Equal => {
            let value = node.value.clone();
            if node.left.is_none() {
                let right = node.right.take();
                *link = right;
                return Some(value);
            }
            if node.right.is_none() {
                let left = node.left.take();
                *link = left;
                return Some(value);
            }
            if let Some((next_key, next_value)) = pop_min(&mut node.right) {
                node.key = next_key;
                node.value = next_value;
            }
            Some(value)
        }
    };
    rebalance(link);
    removed
}

fn pop_min<K: Clone, V: Clone>(link: &mut Link<K, V>) -> Option<(K, V)> {
    let node = Arc::make_mut(link.as_mut()?);
    if node.left.is_some() {
        let min = pop_min(&mut node.left);
        rebalance(link);
        min
    } else {
        let entry = (node.key.clone(), node.value.clone());
        let right = node.right.take();
        *link = right;
        Some(entry)
    }
}

fn rebalance<K: Clone, V: Clone>(link: &mut Link<K, V>) {
    let Some(node) = link.as_mut() else {
        return;
    };
    let node = Arc::make_mut(node);
    node.update_height();

    let balance = node.balance();
    if balance > 1 {
        if node.left.as_ref().is_some_and(|left| left.balance() < 0) {
            rotate_left(&mut node.left);
        }
        rotate_right(link);
    } else if balance < -1 {
        if node.right.as_ref().is_some_and(|right| right.balance() > 0) {
            rotate_right(&mut node.right);
        }
        rotate_left(link);
    }
}

fn rotate_right<K: Clone, V: Clone>(link: &mut Link<K, V>) {
    let Some(mut root) = link.take() else {
        return;
    };
    let root_node = Arc::make_mut(&mut root);
    let Some(mut pivot) = root_node.left.take() else {
        *link = Some(root);
        return;
    };
    let pivot_node = Arc::make_mut(&mut pivot);
    root_node.left = pivot_node.right.take();
    root_node.update_height();
    pivot_node.right = Some(root);
    pivot_node.update_height();
    *link = Some(pivot);
}

fn rotate_left<K: Clone, V: Clone>(link: &mut Link<K, V>) {
    let Some(mut root) = link.take() else {
        return;
    };
    let root_node = Arc::make_mut(&mut root);
    let Some(mut pivot) = root_node.right.take() else {
        *link = Some(root);
        return;
    };
    let pivot_node = Arc::make_mut(&mut pivot);
    root_node.right = pivot_node.left.take();
    root_node.update_height();
    pivot_node.left = Some(root);
    pivot_node.update_height();
    *link = Some(pivot);
}

impl<K, V> Clone for PersistentMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            len: self.len,
        }
    }
}

impl<K, V> Default for PersistentMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug + Clone, V: fmt::Debug + Clone> fmt::Debug for PersistentMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Ord + Clone, V: Clone> FromIterator<(K, V)> for PersistentMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

/// Ascending iterator over a [`PersistentMap`].
///
/// The iterator holds its own references to the tree, so it reflects the
/// map as it was when the iterator was created. Cloning restarts nothing;
/// it forks the iteration at the current position.
pub struct Iter<K, V> {
    stack: Vec<Arc<Node<K, V>>>,
}

impl<K, V> Iter<K, V> {
    fn push_left_spine(&mut self, mut link: Link<K, V>) {
        while let Some(node) = link {
            link = node.left.clone();
            self.stack.push(node);
        }
    }
}

impl<K: Clone, V: Clone> Iterator for Iter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.push_left_spine(node.right.clone());
        Some((node.key.clone(), node.value.clone()))
    }
}

impl<K, V> Clone for Iter<K, V> {
    fn clone(&self) -> Self {
        Self {
            stack: self.stack.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    /// Checks ordering, AVL balance and cached heights; returns the height.
    fn check<K: Ord + Clone, V: Clone>(link: &Link<K, V>) -> u32 {
        let Some(node) = link else {
            return 0;
        };
        if let Some(left) = &node.left {
            assert!(left.key < node.key);
        }
        if let Some(right) = &node.right {
            assert!(right.key > node.key);
        }
        let lh = check(&node.left);
        let rh = check(&node.right);
        assert!(lh.abs_diff(rh) <= 1, "unbalanced node");
        assert_eq!(node.height, 1 + lh.max(rh));
        node.height
    }

    #[test]
    fn empty_map() {
        let map: PersistentMap<u32, u32> = PersistentMap::new();
        assert!(map.is_empty());
        assert_eq!(map.get(&1), None);
        assert_eq!(map.iter().count(), 0);
    }

    #[test]
    fn insert_get_replace() {
        let mut map = PersistentMap::new();
        assert_eq!(map.insert(2, "b"), None);
        assert_eq!(map.insert(1, "a"), None);
        assert_eq!(map.insert(2, "B"), Some("b"));

        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&2), Some(&"B"));
        assert_eq!(map.iter().collect::<Vec<_>>(), vec![(1, "a"), (2, "B")]);
    }

    #[test]
    fn remove_absent_is_noop() {
        let mut map: PersistentMap<u32, u32> = (0..10).map(|i| (i, i)).collect();
        assert_eq!(map.remove(&42), None);
        assert_eq!(map.len(), 10);
        check(&map.root);
    }

    #[test]
    fn sequential_inserts_stay_balanced() {
        let map: PersistentMap<u32, u32> = (0..1000).map(|i| (i, i * 2)).collect();
        assert_eq!(map.len(), 1000);
        let height = check(&map.root);
        assert!(height <= 15, "height {height} too large for 1000 keys");
    }

    #[test]
    fn versions_are_independent() {
        let v1: PersistentMap<u32, &str> = [(1, "a"), (2, "b"), (3, "c")].into_iter().collect();
        let mut v2 = v1.clone();
        v2.insert(4, "d");
        v2.remove(&1);

        assert_eq!(v1.iter().map(|(k, _)| k).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(v2.iter().map(|(k, _)| k).collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn updates_share_untouched_subtrees() {
        let v1: PersistentMap<u32, u32> = (0..64).map(|i| (i, i)).collect();
        let mut v2 = v1.clone();
        v2.insert(63, 0);

        let (Some(a), Some(b)) = (&v1.root, &v2.root) else {
            panic!("roots missing");
        };
        // The rightmost key changed, so the left subtree must be shared.
        assert!(!Arc::ptr_eq(a, b));
        assert!(Arc::ptr_eq(
            a.left.as_ref().unwrap(),
            b.left.as_ref().unwrap()
        ));
    }

    #[test]
    fn iterator_survives_mutation() {
        let mut map: PersistentMap<u32, u32> = (0..5).map(|i| (i, i)).collect();
        let iter = map.iter();
        map.remove(&2);
        map.insert(10, 10);
        assert_eq!(iter.map(|(k, _)| k).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn iter_from_seeks() {
        let map: PersistentMap<u32, ()> = [10, 20, 30, 40].into_iter().map(|k| (k, ())).collect();
        let keys = |from| map.iter_from(&from).map(|(k, _)| k).collect::<Vec<_>>();

        assert_eq!(keys(0), vec![10, 20, 30, 40]);
        assert_eq!(keys(20), vec![20, 30, 40]);
        assert_eq!(keys(25), vec![30, 40]);
        assert_eq!(keys(41), Vec::<u32>::new());
    }

    #[test]
    fn cloned_iterator_forks() {
        let map: PersistentMap<u32, ()> = (0..4).map(|k| (k, ())).collect();
        let mut iter = map.iter();
        iter.next();
        let fork = iter.clone();
        assert_eq!(iter.count(), 3);
        assert_eq!(fork.count(), 3);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Insert(u8, u16),
        Remove(u8),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            2 => (any::<u8>(), any::<u16>()).prop_map(|(k, v)| Op::Insert(k, v)),
            1 => any::<u8>().prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn behaves_like_btreemap(ops in prop::collection::vec(op_strategy(), 0..300), from in any::<u8>()) {
            let mut map = PersistentMap::new();
            let mut model = BTreeMap::new();
            let mut versions = Vec::new();

            for op in ops {
                versions.push((map.clone(), model.clone()));
                match op {
                    Op::Insert(k, v) => prop_assert_eq!(map.insert(k, v), model.insert(k, v)),
                    Op::Remove(k) => prop_assert_eq!(map.remove(&k), model.remove(&k)),
                }
            }

            check(&map.root);
            prop_assert_eq!(map.len(), model.len());
            prop_assert_eq!(
                map.iter().collect::<Vec<_>>(),
                model.iter().map(|(k, v)| (*k, *v)).collect::<Vec<_>>()
            );
            prop_assert_eq!(
                map.iter_from(&from).collect::<Vec<_>>(),
                model.range(from..).map(|(k, v)| (*k, *v)).collect::<Vec<_>>()
            );

            // Earlier versions were never modified in place.
            for (old_map, old_model) in versions {
                prop_assert_eq!(
                    old_map.iter().collect::<Vec<_>>(),
                    old_model.into_iter().collect::<Vec<_>>()
                );
            }
        }
    }
}
