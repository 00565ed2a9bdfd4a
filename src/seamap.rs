use std::{
    borrow::Borrow,
    collections::{hash_map::Iter, HashMap},
    hash::Hash,
};

// Seahash is keyless, so iteration order is a pure function of the insertion
// sequence. That keeps string-keyed lookups off SipHash without giving up the
// reproducibility the scheduler depends on.
pub struct SeaMap<K, V>(HashMap<K, V, fasthash::sea::Hash64>);

#[allow(dead_code)]
impl<K, V> SeaMap<K, V>
where
    K: Eq + Hash,
{
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        SeaMap(HashMap::with_hasher(fasthash::sea::Hash64))
    }

    #[inline]
    pub fn contains_key<Q: ?Sized>(&self, k: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        self.0.contains_key(k)
    }

    #[inline]
    pub fn get_mut<Q: ?Sized>(&mut self, k: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        self.0.get_mut(k)
    }

    #[inline]
    pub fn insert(&mut self, k: K, v: V) -> Option<V> {
        self.0.insert(k, v)
    }

    #[inline]
    pub fn remove<Q: ?Sized>(&mut self, k: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        self.0.remove(k)
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
