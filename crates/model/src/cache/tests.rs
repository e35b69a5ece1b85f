use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;
use rustc_hash::FxHashMap;

use super::*;
use crate::body::Body;
use crate::handle::ElementKind;

const NODE: ElementKind = ElementKind::new("node");

fn node(i: usize) -> Handle {
	Handle::root(NODE, format!("n{i}"))
}

fn body() -> Arc<dyn ElementBody> {
	Arc::new(Body::new())
}

fn names(evicted: &[Evicted]) -> Vec<String> {
	evicted.iter().map(|(h, _)| h.to_string()).collect()
}

#[test]
fn test_overflow_evicts_down_to_load_factor() {
	let mut cache = ElementCache::new(4, 0.5);
	for i in 0..4 {
		assert!(cache.put(node(i), body()).is_empty());
	}
	cache.get(&node(0));
	let evicted = cache.put(node(4), body());
	assert_eq!(names(&evicted), ["n1", "n2", "n3"]);
	assert_eq!(cache.len(), 2);
	assert!(cache.contains(&node(0)));
	assert!(cache.contains(&node(4)));
	assert_eq!(cache.overflow_count(), 3);
}

#[test]
fn test_peek_does_not_promote() {
	let mut cache = ElementCache::new(2, 0.5);
	cache.put(node(0), body());
	cache.put(node(1), body());
	assert!(cache.peek(&node(0)).is_some());
	let evicted = cache.put(node(2), body());
	assert_eq!(names(&evicted), ["n0", "n1"]);
}

#[test]
fn test_batch_is_not_evicted_by_its_own_insertion() {
	let mut cache = ElementCache::new(2, 0.5);
	cache.put(node(0), body());
	let evicted = cache.put_all((1..5).map(|i| (node(i), body())));
	assert_eq!(names(&evicted), ["n0"]);
	assert_eq!(cache.len(), 4);
}

#[test]
fn test_pinned_subtree_survives() {
	const FILE: ElementKind = ElementKind::new("file").openable();
	let file = Handle::root(FILE, "a.foo");
	let child = file.child(NODE, "x");

	let mut cache = ElementCache::new(2, 0.5);
	cache.pin(file.clone());
	cache.put(file.clone(), body());
	cache.put(child.clone(), body());
	let evicted = cache.put(node(0), body());
	assert!(evicted.is_empty());
	assert_eq!(cache.len(), 3);

	cache.unpin(&file);
	let evicted = cache.put(node(1), body());
	assert_eq!(names(&evicted), ["a.foo", "x", "n0"]);
}

#[test]
fn test_headroom_owner_resets() {
	let a = node(0);
	let b = node(1);
	let mut cache = ElementCache::new(2, 1.0);

	cache.ensure_max_size(10, &a);
	assert_eq!(cache.max_size(), 10);
	cache.ensure_max_size(20, &b);
	assert_eq!(cache.max_size(), 20);
	assert_eq!(cache.watermark_previous(), Some(2));

	// Only the most recent raiser may shrink.
	cache.reset_max_size(2, &a);
	assert_eq!(cache.max_size(), 20);
	cache.reset_max_size(2, &b);
	assert_eq!(cache.max_size(), 2);
	assert_eq!(cache.watermark_previous(), None);
}

#[test]
fn test_reset_shrinks_immediately() {
	let root = node(100);
	let mut cache = ElementCache::new(2, 0.5);
	cache.ensure_max_size(6, &root);
	cache.put_all((0..6).map(|i| (node(i), body())));
	assert_eq!(cache.len(), 6);

	let evicted = cache.reset_max_size(2, &root);
	assert_eq!(evicted.len(), 5);
	assert_eq!(cache.len(), 1);
}

#[test]
fn test_ensure_below_capacity_is_noop() {
	let mut cache = ElementCache::new(10, 0.5);
	cache.ensure_max_size(5, &node(0));
	assert_eq!(cache.max_size(), 10);
	assert!(cache.reset_max_size(1, &node(0)).is_empty());
	assert_eq!(cache.max_size(), 10);
}

#[test]
fn test_temporary_stack_is_lifo() {
	let owner = u64::MAX - 7;
	let first: TemporaryCache = Rc::new(RefCell::new(FxHashMap::default()));
	let second: TemporaryCache = Rc::new(RefCell::new(FxHashMap::default()));
	first.borrow_mut().insert(node(0), body());

	temporary::push(owner, first.clone());
	assert!(temporary::lookup(owner, &node(0)).is_some());
	temporary::push(owner, second.clone());
	assert!(temporary::lookup(owner, &node(0)).is_none());
	assert_eq!(temporary::depth(owner), 2);

	assert!(Rc::ptr_eq(&temporary::pop(owner).unwrap(), &second));
	assert!(Rc::ptr_eq(&temporary::pop(owner).unwrap(), &first));
	assert!(matches!(temporary::pop(owner), Err(crate::Error::IllegalState(_))));
}

#[test]
fn test_temporary_stack_is_thread_confined() {
	let owner = u64::MAX - 8;
	temporary::push(owner, Rc::new(RefCell::new(FxHashMap::default())));
	let other = std::thread::spawn(move || temporary::depth(owner)).join().unwrap();
	assert_eq!(other, 0);
	temporary::pop(owner).unwrap();
}

proptest! {
	#[test]
	fn prop_lru_survivors(
		capacity in 2usize..32,
		load_factor in 0.1f64..=1.0,
		accesses in prop::collection::vec(0usize..64, 1..200),
	) {
		let mut cache = ElementCache::new(capacity, load_factor);
		// Reference recency list, most recent last.
		let mut recency: Vec<usize> = Vec::new();
		let target = (capacity as f64 * load_factor).floor() as usize;

		for key in accesses {
			let h = node(key);
			if cache.get(&h).is_some() {
				recency.retain(|k| *k != key);
				recency.push(key);
				continue;
			}
			let evicted = cache.put(h, body());
			recency.push(key);
			if recency.len() > capacity {
				let survivors = target.max(1);
				let expected: Vec<String> = recency
					.drain(..recency.len() - survivors)
					.map(|k| format!("n{k}"))
					.collect();
				prop_assert_eq!(names(&evicted), expected);
				prop_assert_eq!(cache.len(), survivors);
			} else {
				prop_assert!(evicted.is_empty());
			}
		}
	}
}
