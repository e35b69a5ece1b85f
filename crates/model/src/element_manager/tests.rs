use std::sync::Barrier;
use std::sync::atomic::AtomicUsize;

use super::*;
use crate::body::Body;
use crate::handle::ElementKind;
use crate::working_copy::DefaultWorkingCopyCallback;

const FILE: ElementKind = ElementKind::new("file").openable();
const DEF: ElementKind = ElementKind::new("def");

fn body() -> Arc<dyn ElementBody> {
	Arc::new(Body::new())
}

fn manager(size: usize) -> ElementManager {
	ElementManager::new(ElementCache::new(size, 0.5))
}

fn file_with(name: &str, children: &[&str]) -> (Handle, FxHashMap<Handle, Arc<dyn ElementBody>>) {
	let file = Handle::root(FILE, name);
	let kids: Vec<Handle> = children.iter().map(|c| file.child(DEF, *c)).collect();
	let mut map: FxHashMap<Handle, Arc<dyn ElementBody>> = FxHashMap::default();
	map.insert(file.clone(), Arc::new(Body::with_children(kids.clone())));
	for kid in kids {
		map.insert(kid, body());
	}
	(file, map)
}

#[derive(Default)]
struct Recorder(Mutex<Vec<String>>);

impl EvictionListener for Recorder {
	fn on_evicted(&self, element: &Handle, _body: &Arc<dyn ElementBody>) {
		self.0.lock().push(element.to_string());
	}
}

#[test]
fn test_put_replaces_stale_descendants() {
	let manager = manager(100);
	let (file, first) = file_with("a.foo", &["f", "g"]);
	manager.put(&file, first);
	assert_eq!(manager.cached_count(), 3);

	let (_, second) = file_with("a.foo", &["f"]);
	manager.put(&file, second);
	assert_eq!(manager.cached_count(), 2);
	assert!(manager.peek(&file.child(DEF, "g")).is_none());
	assert!(manager.peek(&file.child(DEF, "f")).is_some());
}

#[test]
fn test_put_if_absent_keeps_first_commit() {
	let manager = manager(100);
	let (file, first) = file_with("a.foo", &["f"]);
	assert!(manager.put_if_absent(&file, first).is_none());
	let committed = manager.peek(&file).unwrap();

	let (_, second) = file_with("a.foo", &["g"]);
	let existing = manager.put_if_absent(&file, second).unwrap();
	assert!(Arc::ptr_eq(&existing, &committed));
	assert!(manager.peek(&file.child(DEF, "g")).is_none());
}

#[test]
fn test_remove_subtree_keeps_other_openables() {
	let manager = manager(100);
	let (a, bodies) = file_with("a.foo", &["f", "g"]);
	manager.put(&a, bodies);
	let (b, bodies) = file_with("b.foo", &["f"]);
	manager.put(&b, bodies);

	let mut removed: Vec<String> = manager.remove_subtree(&a).iter().map(|h| h.to_string()).collect();
	removed.sort();
	assert_eq!(removed, ["a.foo", "f", "g"]);
	assert_eq!(manager.cached_count(), 2);
	assert!(manager.remove(&b).is_some());
	assert!(manager.peek(&b.child(DEF, "f")).is_some());
}

#[test]
fn test_overflow_drops_dependents_and_notifies() {
	let recorder = Arc::new(Recorder::default());
	let manager = ElementManager::new(ElementCache::new(4, 1.0)).with_eviction_listener(recorder.clone());
	let (a, bodies) = file_with("a.foo", &["f", "g"]);
	manager.put(&a, bodies);
	// Children are more recent than their file.
	manager.get(&a.child(DEF, "f"));
	manager.get(&a.child(DEF, "g"));
	let (b, bodies) = file_with("b.foo", &[]);
	manager.put(&b, bodies);
	let (c, bodies) = file_with("c.foo", &[]);
	manager.put(&c, bodies);

	assert_eq!(*recorder.0.lock(), ["a.foo"]);
	assert_eq!(manager.overflow_count(), 1);
	assert!(manager.peek(&a.child(DEF, "f")).is_none());
	assert!(manager.peek(&a.child(DEF, "g")).is_none());
	assert_eq!(manager.cached_count(), 2);
	assert!(manager.peek(&b).is_some());
	assert!(manager.peek(&c).is_some());
}

#[test]
fn test_working_copy_survives_overflow() {
	let manager = manager(2);
	let (a, bodies) = file_with("a.foo", &["f"]);
	manager.put(&a, bodies);
	let buffer = Arc::new(TextBuffer::new("def f() {}"));
	manager.put_working_copy_info_if_absent(&a, buffer, Arc::new(DefaultWorkingCopyCallback));

	for i in 0..10 {
		let (x, bodies) = file_with(&format!("x{i}.foo"), &[]);
		manager.put(&x, bodies);
	}
	assert!(manager.peek(&a).is_some());
	assert!(manager.peek(&a.child(DEF, "f")).is_some());
}

#[test]
fn test_working_copy_refs_mirror_buffer() {
	let manager = manager(100);
	let file = Handle::root(FILE, "a.foo");
	let buffer = Arc::new(TextBuffer::new(""));
	let callback: Arc<dyn WorkingCopyCallback> = Arc::new(DefaultWorkingCopyCallback);

	let (info, created) = manager.put_working_copy_info_if_absent(&file, buffer.clone(), callback.clone());
	assert!(created);
	let (again, created) = manager.put_working_copy_info_if_absent(&file, buffer.clone(), callback);
	assert!(!created);
	assert!(Arc::ptr_eq(&info, &again));
	assert!(manager.get_working_copy_info(&file).is_some());
	assert_eq!(info.ref_count(), 3);
	assert_eq!(buffer.ref_count(), 3);

	assert!(manager.peek_at_working_copy_info(&file).is_some());
	assert_eq!(info.ref_count(), 3);

	assert!(manager.release_working_copy_info(&file).unwrap().is_none());
	assert!(manager.release_working_copy_info(&file).unwrap().is_none());
	assert_eq!(buffer.ref_count(), 1);
	let released = manager.release_working_copy_info(&file).unwrap().unwrap();
	assert!(released.is_disposed());
	assert_eq!(buffer.ref_count(), 0);
	assert!(manager.working_copies().is_empty());

	let err = manager.release_working_copy_info(&file).unwrap_err();
	assert!(matches!(err, Error::IllegalState(_)));
}

#[test]
fn test_claim_build_is_exclusive() {
	let manager = Arc::new(manager(100));
	let file = Handle::root(FILE, "a.foo");
	let builds = Arc::new(AtomicUsize::new(0));
	let barrier = Arc::new(Barrier::new(8));

	let threads: Vec<_> = (0..8)
		.map(|_| {
			let manager = Arc::clone(&manager);
			let file = file.clone();
			let builds = Arc::clone(&builds);
			let barrier = Arc::clone(&barrier);
			thread::spawn(move || {
				barrier.wait();
				match manager.claim_build(&file).unwrap() {
					BuildClaim::Existing(body) => body,
					BuildClaim::Claimed(_guard) => {
						builds.fetch_add(1, Ordering::SeqCst);
						thread::sleep(std::time::Duration::from_millis(20));
						let mut map: FxHashMap<Handle, Arc<dyn ElementBody>> = FxHashMap::default();
						map.insert(file.clone(), body());
						manager.put_if_absent(&file, map);
						manager.peek(&file).unwrap()
					}
				}
			})
		})
		.collect();

	let bodies: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();
	assert_eq!(builds.load(Ordering::SeqCst), 1);
	assert!(bodies.iter().all(|b| Arc::ptr_eq(b, &bodies[0])));
}

#[test]
fn test_recursive_claim_is_illegal() {
	let manager = manager(100);
	let file = Handle::root(FILE, "a.foo");
	let _guard = match manager.claim_build(&file).unwrap() {
		BuildClaim::Claimed(guard) => guard,
		BuildClaim::Existing(_) => panic!("nothing was cached"),
	};
	assert!(matches!(manager.claim_build(&file), Err(Error::IllegalState(_))));
}

#[test]
fn test_claim_rebuild_ignores_cached_body() {
	let manager = manager(100);
	let (file, map) = file_with("a.foo", &["f"]);
	manager.put(&file, map);

	assert!(matches!(manager.claim_build(&file).unwrap(), BuildClaim::Existing(_)));
	let _guard = manager.claim_rebuild(&file).unwrap();
	assert!(matches!(manager.claim_rebuild(&file), Err(Error::IllegalState(_))));
}

#[test]
fn test_discarded_working_copy_disposes_on_last_release() {
	let manager = manager(100);
	let (file, map) = file_with("a.foo", &["f"]);
	let buffer = Arc::new(TextBuffer::new(""));
	let callback: Arc<dyn WorkingCopyCallback> = Arc::new(DefaultWorkingCopyCallback);
	let (info, _) = manager.put_working_copy_info_if_absent(&file, buffer.clone(), callback.clone());
	manager.put_working_copy_info_if_absent(&file, buffer.clone(), callback);
	manager.put(&file, map);
	assert!(manager.is_registered(&info));

	manager.discard_working_copy_info(&info);
	assert!(!manager.is_registered(&info));
	assert!(manager.working_copies().is_empty());
	assert_eq!(manager.cached_count(), 0);
	assert!(matches!(manager.release_working_copy_info(&file), Err(Error::IllegalState(_))));

	assert!(!manager.release_unregistered(&info).unwrap());
	assert!(!info.is_disposed());
	assert!(manager.release_unregistered(&info).unwrap());
	assert!(info.is_disposed());
	assert_eq!(buffer.ref_count(), 0);
}

#[test]
fn test_temporary_cache_shadows_main_cache() {
	let manager = manager(100);
	let (file, bodies) = file_with("a.foo", &[]);
	manager.put(&file, bodies);
	let committed = manager.peek(&file).unwrap();

	let shadow: TemporaryCache = Default::default();
	let replacement = body();
	shadow.borrow_mut().insert(file.clone(), replacement.clone());
	manager.push_temporary_cache(shadow);
	assert!(Arc::ptr_eq(&manager.get(&file).unwrap(), &replacement));
	assert!(manager.peek(&Handle::root(FILE, "b.foo")).is_none());
	manager.pop_temporary_cache().unwrap();

	assert!(Arc::ptr_eq(&manager.get(&file).unwrap(), &committed));
	assert!(manager.pop_temporary_cache().is_err());
}
