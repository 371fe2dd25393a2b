//! Property tests driving the LRU engine against a naive reference
//! model through long randomized operation sequences.

use kiln_cache::LruCache;
use rand::prelude::*;
use rand::rngs::StdRng;

/// Reference model: entries ordered least to most recently used.
struct Model {
    max_bytes: usize,
    entries: Vec<(Vec<u8>, Vec<u8>)>,
}

impl Model {
    fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            entries: Vec::new(),
        }
    }

    fn used_bytes(&self) -> usize {
        self.entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }

    fn position(&self, key: &[u8]) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> bool {
        if key.len() + value.len() > self.max_bytes {
            return false;
        }
        if self.position(key).is_some() {
            return self.set(key, value);
        }
        while self.used_bytes() + key.len() + value.len() > self.max_bytes {
            self.entries.remove(0);
        }
        self.entries.push((key.to_vec(), value.to_vec()));
        true
    }

    fn put_if_absent(&mut self, key: &[u8], value: &[u8]) -> bool {
        if self.position(key).is_some() {
            return false;
        }
        self.put(key, value)
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> bool {
        let Some(pos) = self.position(key) else {
            return false;
        };
        if key.len() + value.len() > self.max_bytes {
            return false;
        }
        let (k, _) = self.entries.remove(pos);
        while self.used_bytes() + k.len() + value.len() > self.max_bytes {
            self.entries.remove(0);
        }
        self.entries.push((k, value.to_vec()));
        true
    }

    fn get(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        let pos = self.position(key)?;
        let entry = self.entries.remove(pos);
        let value = entry.1.clone();
        self.entries.push(entry);
        Some(value)
    }

    fn delete(&mut self, key: &[u8]) -> bool {
        match self.position(key) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }
}

fn agree(cache: &LruCache, model: &Model) {
    cache.check_invariants();
    assert_eq!(cache.used_bytes(), model.used_bytes());
    assert_eq!(cache.len(), model.entries.len());
    let order: Vec<Vec<u8>> = model.entries.iter().map(|(k, _)| k.clone()).collect();
    assert_eq!(cache.keys_by_recency(), order);
}

fn random_key(rng: &mut StdRng) -> Vec<u8> {
    let len = rng.gen_range(1..=4);
    (0..len).map(|_| rng.gen_range(b'a'..=b'f')).collect()
}

fn random_value(rng: &mut StdRng) -> Vec<u8> {
    let len = rng.gen_range(0..=12);
    (0..len).map(|_| rng.r#gen()).collect()
}

#[test]
fn randomized_ops_match_reference_model() {
    for seed in 0..8u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let max_bytes = rng.gen_range(8..=48);
        let mut cache = LruCache::new(max_bytes);
        let mut model = Model::new(max_bytes);

        for _ in 0..2000 {
            let key = random_key(&mut rng);
            match rng.gen_range(0..5) {
                0 => {
                    let value = random_value(&mut rng);
                    assert_eq!(cache.put(&key, &value), model.put(&key, &value));
                }
                1 => {
                    let value = random_value(&mut rng);
                    assert_eq!(
                        cache.put_if_absent(&key, &value),
                        model.put_if_absent(&key, &value)
                    );
                }
                2 => {
                    let value = random_value(&mut rng);
                    assert_eq!(cache.set(&key, &value), model.set(&key, &value));
                }
                3 => {
                    assert_eq!(cache.get(&key).map(<[u8]>::to_vec), model.get(&key));
                }
                _ => {
                    assert_eq!(cache.delete(&key), model.delete(&key));
                }
            }
            agree(&cache, &model);
        }
    }
}

#[test]
fn budget_is_never_exceeded_under_churn() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut cache = LruCache::new(32);
    for _ in 0..5000 {
        let key = random_key(&mut rng);
        let value = random_value(&mut rng);
        cache.put(&key, &value);
        assert!(cache.used_bytes() <= cache.max_bytes());
    }
    cache.check_invariants();
}

#[test]
fn sequential_gets_order_entries_strictly() {
    let mut cache = LruCache::new(1024);
    for i in 0..16u8 {
        cache.put(&[b'k', i], b"v");
    }
    cache.get(&[b'k', 3]);
    cache.get(&[b'k', 7]);
    let order = cache.keys_by_recency();
    let pos3 = order.iter().position(|k| k == &vec![b'k', 3]).unwrap();
    let pos7 = order.iter().position(|k| k == &vec![b'k', 7]).unwrap();
    assert!(pos3 < pos7, "later hit must rank strictly more recent");
    assert_eq!(order.last().unwrap(), &vec![b'k', 7]);
}
