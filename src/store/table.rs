use bytes::Bytes;

/// Bucket count of a freshly created table
pub const INITIAL_BUCKETS: usize = 4;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a
#[inline]
pub fn fnv1a(data: &[u8]) -> u64 {
    data.iter().fold(FNV_OFFSET_BASIS, |h, &b| {
        (h ^ u64::from(b)).wrapping_mul(FNV_PRIME)
    })
}

struct Node {
    hash: u64,
    key: Bytes,
    value: Bytes,
    next: Option<Box<Node>>,
}

type Chain = Option<Box<Node>>;

/// Separate-chaining hash table with power-of-two bucket count
///
/// Nodes are boxed and owned by their chain. Growing relinks the existing
/// boxes into a doubled bucket array; no node is ever reallocated.
pub struct HashTable {
    buckets: Vec<Chain>,
    used: usize,
}

impl HashTable {
    pub fn new() -> Self {
        Self::with_buckets(INITIAL_BUCKETS)
    }

    /// `buckets` is rounded up to a power of two
    pub fn with_buckets(buckets: usize) -> Self {
        let n = buckets.max(1).next_power_of_two();
        Self {
            buckets: empty_buckets(n),
            used: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    fn slot(&self, hash: u64) -> usize {
        (hash & (self.buckets.len() as u64 - 1)) as usize
    }

    pub fn get(&self, key: &[u8]) -> Option<&Bytes> {
        let hash = fnv1a(key);
        let mut cur = self.buckets[self.slot(hash)].as_deref();
        while let Some(node) = cur {
            if node.hash == hash && node.key == key {
                return Some(&node.value);
            }
            cur = node.next.as_deref();
        }
        None
    }

    fn find_mut(&mut self, hash: u64, key: &[u8]) -> Option<&mut Node> {
        let slot = self.slot(hash);
        let mut cur = self.buckets[slot].as_deref_mut();
        while let Some(node) = cur {
            if node.hash == hash && node.key == key {
                return Some(node);
            }
            cur = node.next.as_deref_mut();
        }
        None
    }

    /// Insert or replace; returns the previous value if the key existed
    pub fn insert(&mut self, key: Bytes, value: Bytes) -> Option<Bytes> {
        let hash = fnv1a(&key);
        if let Some(node) = self.find_mut(hash, &key) {
            return Some(std::mem::replace(&mut node.value, value));
        }

        if self.used + 1 >= self.buckets.len() {
            self.grow();
        }

        let slot = self.slot(hash);
        let node = Box::new(Node {
            hash,
            key,
            value,
            next: self.buckets[slot].take(),
        });
        self.buckets[slot] = Some(node);
        self.used += 1;
        None
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Bytes> {
        let hash = fnv1a(key);
        let slot = self.slot(hash);

        let mut link = &mut self.buckets[slot];
        while link
            .as_ref()
            .is_some_and(|node| !(node.hash == hash && node.key == key))
        {
            link = &mut link.as_mut()?.next;
        }

        let mut node = link.take()?;
        *link = node.next.take();
        self.used -= 1;
        Some(node.value)
    }

    /// Double the bucket array and relink every node by its cached hash
    fn grow(&mut self) {
        let new_len = self.buckets.len() * 2;
        let mask = new_len as u64 - 1;
        let mut buckets = empty_buckets(new_len);

        for head in self.buckets.iter_mut() {
            let mut cur = head.take();
            while let Some(mut node) = cur {
                cur = node.next.take();
                let slot = (node.hash & mask) as usize;
                node.next = buckets[slot].take();
                buckets[slot] = Some(node);
            }
        }

        self.buckets = buckets;
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, &Bytes)> {
        self.buckets
            .iter()
            .flat_map(|head| std::iter::successors(head.as_deref(), |node| node.next.as_deref()))
            .map(|node| (&node.key, &node.value))
    }

    #[cfg(test)]
    fn chain_slots(&self) -> Vec<(usize, u64)> {
        self.buckets
            .iter()
            .enumerate()
            .flat_map(|(i, head)| {
                std::iter::successors(head.as_deref(), |node| node.next.as_deref())
                    .map(move |node| (i, node.hash))
            })
            .collect()
    }
}

impl Default for HashTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HashTable {
    fn drop(&mut self) {
        // Unlink iteratively so long chains don't recurse through Box drops
        for head in self.buckets.iter_mut() {
            let mut cur = head.take();
            while let Some(mut node) = cur {
                cur = node.next.take();
            }
        }
    }
}

fn empty_buckets(n: usize) -> Vec<Chain> {
    std::iter::repeat_with(|| None).take(n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn fnv1a_reference_values() {
        assert_eq!(fnv1a(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a(b"a"), 0xaf63dc4c8601ec8c);
        assert_eq!(fnv1a(b"foobar"), 0x85944171f73967e8);
    }

    #[test]
    fn insert_lookup_replace_remove() {
        let mut table = HashTable::new();
        assert_eq!(table.insert(b("foo"), b("bar")), None);
        assert_eq!(table.get(b"foo"), Some(&b("bar")));

        assert_eq!(table.insert(b("foo"), b("baz")), Some(b("bar")));
        assert_eq!(table.get(b"foo"), Some(&b("baz")));
        assert_eq!(table.len(), 1);

        assert_eq!(table.remove(b"foo"), Some(b("baz")));
        assert_eq!(table.get(b"foo"), None);
        assert_eq!(table.remove(b"foo"), None);
        assert!(table.is_empty());
    }

    #[test]
    fn grows_before_used_reaches_bucket_count() {
        let mut table = HashTable::new();
        assert_eq!(table.bucket_count(), INITIAL_BUCKETS);

        for i in 0..3 {
            table.insert(b(&format!("k{i}")), b("v"));
        }
        assert_eq!(table.bucket_count(), 4);

        table.insert(b("k3"), b("v"));
        assert_eq!(table.bucket_count(), 8);
        assert!(table.len() < table.bucket_count());
    }

    #[test]
    fn replacing_existing_key_never_grows() {
        let mut table = HashTable::new();
        for i in 0..3 {
            table.insert(b(&format!("k{i}")), b("v"));
        }
        for _ in 0..10 {
            table.insert(b("k0"), b("again"));
        }
        assert_eq!(table.bucket_count(), 4);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn bucket_count_is_power_of_two_and_never_shrinks() {
        let mut table = HashTable::new();
        let mut last = table.bucket_count();

        for i in 0..1000 {
            table.insert(b(&format!("key:{i}")), b(&i.to_string()));
            let n = table.bucket_count();
            assert!(n.is_power_of_two());
            assert!(n >= last);
            last = n;
        }
        for i in 0..1000 {
            assert!(table.remove(format!("key:{i}").as_bytes()).is_some());
            assert_eq!(table.bucket_count(), last);
        }
        assert!(table.is_empty());
    }

    #[test]
    fn every_node_sits_in_its_masked_bucket() {
        let mut table = HashTable::new();
        for i in 0..200 {
            table.insert(b(&format!("user:{i}")), b("x"));
        }
        let mask = table.bucket_count() as u64 - 1;
        for (slot, hash) in table.chain_slots() {
            assert_eq!(slot as u64, hash & mask);
        }
    }

    #[test]
    fn resize_preserves_lookups() {
        let mut table = HashTable::new();
        let mut expected = Vec::new();
        for i in 0..64 {
            let (k, v) = (format!("k{i}"), format!("v{i}"));
            table.insert(b(&k), b(&v));
            expected.push((k, v));

            // every key inserted so far survives each growth step
            for (k, v) in &expected {
                assert_eq!(table.get(k.as_bytes()), Some(&b(v)));
            }
        }
    }

    #[test]
    fn remove_from_middle_of_chain() {
        // a single bucket forces every key onto one chain
        let mut table = HashTable::with_buckets(1);
        for k in ["a", "b", "c"] {
            let hash = fnv1a(k.as_bytes());
            let next = table.buckets[0].take();
            table.buckets[0] = Some(Box::new(Node {
                hash,
                key: b(k),
                value: b(k),
                next,
            }));
            table.used += 1;
        }

        assert_eq!(table.remove(b"b"), Some(b("b")));
        assert_eq!(table.get(b"a"), Some(&b("a")));
        assert_eq!(table.get(b"c"), Some(&b("c")));
        assert_eq!(table.get(b"b"), None);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn keys_are_opaque_bytes() {
        let mut table = HashTable::new();
        table.insert(Bytes::from_static(b"a\0b\r\n"), b("1"));
        table.insert(Bytes::from_static(b"a"), b("2"));
        assert_eq!(table.get(b"a\0b\r\n"), Some(&b("1")));
        assert_eq!(table.get(b"a"), Some(&b("2")));
    }

    #[test]
    fn matches_std_hashmap_model() {
        let mut table = HashTable::new();
        let mut model: HashMap<Vec<u8>, Bytes> = HashMap::new();

        // deterministic pseudo-random op sequence
        let mut seed: u64 = 0x2545f4914f6cdd1d;
        for step in 0..5000u64 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let key = format!("k{}", seed % 97).into_bytes();
            match seed % 3 {
                0 | 1 => {
                    let value = b(&step.to_string());
                    assert_eq!(
                        table.insert(Bytes::from(key.clone()), value.clone()),
                        model.insert(key, value)
                    );
                }
                _ => assert_eq!(table.remove(&key), model.remove(&key)),
            }
            assert_eq!(table.len(), model.len());
        }

        for (k, v) in &model {
            assert_eq!(table.get(k), Some(v));
        }
        assert_eq!(table.iter().count(), model.len());
    }
}
