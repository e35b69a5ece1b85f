use std::sync::Barrier;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use handly_buffer::TextBuffer;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use rstest::rstest;

use super::*;
use crate::body::{SourceElementBody, TextRange};
use crate::handle::ElementKind;
use crate::working_copy::{DefaultWorkingCopyCallback, WorkingCopyCallback, WorkingCopyInfo};

const FILE: ElementKind = ElementKind::new("file").openable();
const LINE: ElementKind = ElementKind::new("line");

/// One file per entry; every non-empty line becomes a `LINE` child named
/// after its first word.
#[derive(Default)]
struct LinesModel {
	disk: Mutex<FxHashMap<String, String>>,
	builds: AtomicUsize,
	closed: Mutex<Vec<(String, CloseHint)>>,
	slow: AtomicBool,
	gate: Mutex<Option<Arc<Barrier>>>,
}

impl LinesModel {
	fn with_file(name: &str, text: &str) -> Arc<Self> {
		let model = Self::default();
		model.disk.lock().insert(name.to_string(), text.to_string());
		Arc::new(model)
	}
}

impl Model for LinesModel {
	fn validate_existence(&self, element: &Handle) -> Result<()> {
		let name = element.name().unwrap_or_default();
		if self.disk.lock().contains_key(name) {
			Ok(())
		} else {
			Err(Error::DoesNotExist(element.clone()))
		}
	}

	fn build_structure(&self, element: &Handle, ctx: &mut BuildContext<'_>) -> Result<()> {
		self.builds.fetch_add(1, Ordering::SeqCst);
		if element.name() == Some("broken.foo") {
			return Err(Error::illegal_state("unreadable structure"));
		}
		let gate = self.gate.lock().take();
		if let Some(gate) = gate {
			gate.wait();
		}
		if self.slow.load(Ordering::SeqCst) {
			thread::sleep(Duration::from_millis(20));
		}
		let snapshot = match ctx.snapshot() {
			Some(snapshot) => snapshot.clone(),
			None => {
				let disk = self.disk.lock();
				let text = disk
					.get(element.name().unwrap_or_default())
					.ok_or_else(|| Error::DoesNotExist(element.clone()))?;
				Snapshot::detached(text)
			}
		};

		let text = snapshot.contents();
		let mut file_body = SourceElementBody::new();
		let mut offset = 0;
		for line in text.split_inclusive('\n') {
			ctx.check_canceled()?;
			let len = line.chars().count();
			if let Some(word) = line.split_whitespace().next() {
				let child = element.child(LINE, word);
				let mut body = SourceElementBody::new();
				body.set_full_range(TextRange::new(offset, line.trim_end().chars().count()));
				body.set_snapshot(snapshot.clone());
				file_body.add_child(child.clone());
				ctx.put(child, body);
			}
			offset += len;
		}
		file_body.set_full_range(TextRange::new(0, snapshot.len_chars()));
		file_body.set_snapshot(snapshot);
		ctx.put(element.clone(), file_body);
		Ok(())
	}

	fn on_close(&self, element: &Handle, hint: CloseHint) {
		self.closed.lock().push((element.to_string(), hint));
	}
}

fn manager(model: &Arc<LinesModel>) -> ModelManager {
	ModelManager::new(Arc::clone(model) as Arc<dyn Model>, ModelConfig::default()).unwrap()
}

fn file(name: &str) -> Handle {
	Handle::root(FILE, name)
}

type EventLog = Arc<Mutex<Vec<(EventKinds, String)>>>;

fn record_events(manager: &ModelManager) -> EventLog {
	let log = EventLog::default();
	let sink = Arc::clone(&log);
	manager.add_listener(
		Arc::new(move |event: &ElementChangeEvent| {
			let rendered = event.delta().map(ToString::to_string).unwrap_or_default();
			sink.lock().push((event.kind(), rendered));
		}),
		EventKinds::all(),
	);
	log
}

#[test]
fn test_open_builds_once_and_caches_children() {
	let model = LinesModel::with_file("a.foo", "alpha 1\nbeta 2\n");
	let manager = manager(&model);
	let a = file("a.foo");

	let children = manager.children(&a).unwrap();
	assert_eq!(children, vec![a.child(LINE, "alpha"), a.child(LINE, "beta")]);
	assert_eq!(manager.source_text(&children[1]).unwrap().as_deref(), Some("beta 2"));
	assert!(manager.exists(&children[0]).unwrap());
	assert_eq!(model.builds.load(Ordering::SeqCst), 1);
}

#[test]
fn test_missing_elements() {
	let model = LinesModel::with_file("a.foo", "alpha\n");
	let manager = manager(&model);

	assert!(!manager.exists(&file("b.foo")).unwrap());
	assert!(manager.body(&file("b.foo")).unwrap_err().is_does_not_exist());
	assert!(manager.exists(&file("a.foo")).unwrap());
	assert!(!manager.exists(&file("a.foo").child(LINE, "gamma")).unwrap());
}

#[test]
fn test_exists_surfaces_unexpected_errors() {
	let model = LinesModel::with_file("broken.foo", "alpha\n");
	let manager = manager(&model);

	assert!(matches!(manager.exists(&file("broken.foo")), Err(Error::IllegalState(_))));
	assert!(matches!(
		manager.exists(&file("broken.foo").child(LINE, "alpha")),
		Err(Error::IllegalState(_))
	));
	assert!(!manager.exists(&file("missing.foo")).unwrap());
}

#[test]
fn test_open_descendant_opens_owner() {
	let model = LinesModel::with_file("a.foo", "alpha\nbeta\n");
	let manager = manager(&model);
	let beta = file("a.foo").child(LINE, "beta");

	assert_eq!(manager.body(&beta).unwrap().as_source().unwrap().full_range(), Some(TextRange::new(6, 4)));
	assert!(manager.elements().is_cached(&file("a.foo")));
}

#[test]
fn test_close_drops_subtree() {
	let model = LinesModel::with_file("a.foo", "alpha\nbeta\n");
	let manager = manager(&model);
	let a = file("a.foo");
	manager.body(&a).unwrap();
	assert_eq!(manager.elements().cached_count(), 3);

	manager.close(&a.child(LINE, "alpha")).unwrap();
	assert_eq!(manager.elements().cached_count(), 3);

	manager.close(&a).unwrap();
	assert_eq!(manager.elements().cached_count(), 0);
	assert_eq!(*model.closed.lock(), vec![("a.foo".to_string(), CloseHint::Explicit)]);

	manager.body(&a).unwrap();
	assert_eq!(model.builds.load(Ordering::SeqCst), 2);
}

#[test]
fn test_canceled_open_commits_nothing() {
	let model = LinesModel::with_file("a.foo", "alpha\n");
	let manager = manager(&model);
	let cancel = CancellationToken::new();
	cancel.cancel();

	assert!(manager.open(&file("a.foo"), &cancel).unwrap_err().is_canceled());
	assert_eq!(manager.elements().cached_count(), 0);
}

#[test]
fn test_concurrent_open_builds_once() {
	let model = LinesModel::with_file("a.foo", "alpha\nbeta\n");
	model.slow.store(true, Ordering::SeqCst);
	let manager = Arc::new(manager(&model));
	let barrier = Arc::new(Barrier::new(8));

	let handles: Vec<_> = (0..8)
		.map(|_| {
			let manager = Arc::clone(&manager);
			let barrier = Arc::clone(&barrier);
			thread::spawn(move || {
				barrier.wait();
				manager.children(&file("a.foo")).unwrap()
			})
		})
		.collect();
	for handle in handles {
		assert_eq!(handle.join().unwrap().len(), 2);
	}
	assert_eq!(model.builds.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_access_to_evicted_descendant_rebuilds_once() {
	let model = LinesModel::with_file("a.foo", "alpha\nbeta\n");
	let manager = Arc::new(manager(&model));
	let beta = file("a.foo").child(LINE, "beta");
	manager.body(&file("a.foo")).unwrap();
	manager.elements().remove(&beta);
	model.slow.store(true, Ordering::SeqCst);
	let barrier = Arc::new(Barrier::new(8));

	let handles: Vec<_> = (0..8)
		.map(|_| {
			let manager = Arc::clone(&manager);
			let barrier = Arc::clone(&barrier);
			let beta = beta.clone();
			thread::spawn(move || {
				barrier.wait();
				manager.body(&beta).unwrap().as_source().and_then(|s| s.full_range())
			})
		})
		.collect();
	for handle in handles {
		assert_eq!(handle.join().unwrap(), Some(TextRange::new(6, 4)));
	}
	assert_eq!(model.builds.load(Ordering::SeqCst), 2);
}

#[test]
fn test_element_at() {
	let model = LinesModel::with_file("a.foo", "alpha\nbeta\n");
	let manager = manager(&model);
	let a = file("a.foo");

	assert_eq!(manager.element_at(&a, 7, None).unwrap(), Some(a.child(LINE, "beta")));
	assert_eq!(manager.element_at(&a, 5, None).unwrap(), Some(a.child(LINE, "alpha")));
	assert_eq!(manager.element_at(&a, 11, None).unwrap(), Some(a.clone()));
	assert_eq!(manager.element_at(&a, 12, None).unwrap(), None);

	let same = Snapshot::detached("alpha\nbeta\n");
	assert_eq!(manager.element_at(&a, 0, Some(&same)).unwrap(), Some(a.child(LINE, "alpha")));
	let other = Snapshot::detached("alpha\n");
	assert!(matches!(manager.element_at(&a, 0, Some(&other)), Err(Error::StaleSnapshot)));
}

#[test]
fn test_headroom_keeps_large_build_and_resets_on_close() {
	let text: String = (0..10).map(|i| format!("l{i}\n")).collect();
	let model = LinesModel::with_file("a.foo", &text);
	let config = ModelConfig {
		cache_size: 4,
		..ModelConfig::default()
	};
	let manager = ModelManager::new(Arc::clone(&model) as Arc<dyn Model>, config).unwrap();
	let a = file("a.foo");

	manager.body(&a).unwrap();
	assert_eq!(manager.elements().cached_count(), 11);
	assert!(manager.elements().max_size() >= 11);

	manager.close(&a).unwrap();
	assert_eq!(manager.elements().max_size(), 4);
}

#[test]
fn test_working_copy_lifecycle() {
	let model = LinesModel::with_file("a.foo", "alpha\n");
	let manager = manager(&model);
	let events = record_events(&manager);
	let a = file("a.foo");
	let buffer = Arc::new(TextBuffer::new("alpha\nbeta\n"));
	let cancel = CancellationToken::new();

	assert!(
		manager
			.become_working_copy(&a, Arc::clone(&buffer), Arc::new(DefaultWorkingCopyCallback), &cancel)
			.unwrap()
	);
	assert!(manager.is_working_copy(&a));
	assert_eq!(manager.children(&a).unwrap().len(), 2);
	assert_eq!(buffer.ref_count(), 1);
	assert!(matches!(manager.close(&a), Err(Error::IllegalState(_))));

	assert!(
		!manager
			.become_working_copy(&a, Arc::clone(&buffer), Arc::new(DefaultWorkingCopyCallback), &cancel)
			.unwrap()
	);
	assert_eq!(buffer.ref_count(), 2);

	assert!(!manager.release_working_copy(&a).unwrap());
	assert!(manager.is_working_copy(&a));
	assert!(manager.release_working_copy(&a).unwrap());
	assert!(!manager.is_working_copy(&a));
	assert_eq!(buffer.ref_count(), 0);
	assert!(!manager.elements().is_cached(&a));
	assert!(matches!(manager.release_working_copy(&a), Err(Error::IllegalState(_))));

	assert_eq!(
		*events.lock(),
		vec![
			(EventKinds::POST_CHANGE, "a.foo[*]: {WORKING COPY}".to_string()),
			(EventKinds::POST_CHANGE, "a.foo[*]: {WORKING COPY}".to_string()),
		]
	);
}

#[test]
fn test_working_copy_of_missing_file_is_added_then_removed() {
	let model = Arc::new(LinesModel::default());
	let manager = manager(&model);
	let events = record_events(&manager);
	let a = file("new.foo");

	manager
		.become_working_copy(
			&a,
			Arc::new(TextBuffer::new("x\n")),
			Arc::new(DefaultWorkingCopyCallback),
			&CancellationToken::new(),
		)
		.unwrap();
	assert_eq!(manager.children(&a).unwrap(), vec![a.child(LINE, "x")]);
	manager.release_working_copy(&a).unwrap();

	assert_eq!(
		*events.lock(),
		vec![
			(EventKinds::POST_CHANGE, "new.foo[+]: {WORKING COPY}".to_string()),
			(EventKinds::POST_CHANGE, "new.foo[-]: {WORKING COPY}".to_string()),
		]
	);
}

#[derive(Default)]
struct CountingCallback {
	fail_init: bool,
	disposed: AtomicUsize,
	reconciled: Mutex<Vec<String>>,
}

impl WorkingCopyCallback for CountingCallback {
	fn on_init(&self, _info: &WorkingCopyInfo) -> Result<()> {
		if self.fail_init {
			Err(Error::Callback("refused".into()))
		} else {
			Ok(())
		}
	}

	fn on_dispose(&self, _info: &WorkingCopyInfo) {
		self.disposed.fetch_add(1, Ordering::SeqCst);
	}

	fn on_reconcile(&self, _info: &WorkingCopyInfo, delta: &crate::delta::ElementDelta) {
		self.reconciled.lock().push(delta.to_string());
	}
}

#[test]
fn test_failed_init_disposes_working_copy() {
	let model = LinesModel::with_file("a.foo", "alpha\n");
	let manager = manager(&model);
	let events = record_events(&manager);
	let a = file("a.foo");
	let buffer = Arc::new(TextBuffer::new("alpha\n"));
	let callback = Arc::new(CountingCallback {
		fail_init: true,
		..CountingCallback::default()
	});

	let result = manager.become_working_copy(
		&a,
		Arc::clone(&buffer),
		Arc::clone(&callback) as Arc<dyn WorkingCopyCallback>,
		&CancellationToken::new(),
	);
	assert!(matches!(result, Err(Error::Callback(_))));
	assert!(!manager.is_working_copy(&a));
	assert!(manager.acquire_existing_working_copy(&a).is_none());
	assert_eq!(buffer.ref_count(), 0);
	assert_eq!(callback.disposed.load(Ordering::SeqCst), 1);
	assert!(events.lock().is_empty());
}

#[test]
fn test_dispose_runs_once() {
	let model = LinesModel::with_file("a.foo", "alpha\n");
	let manager = manager(&model);
	let a = file("a.foo");
	let callback = Arc::new(CountingCallback::default());
	let buffer = Arc::new(TextBuffer::new("alpha\n"));
	let cancel = CancellationToken::new();

	for _ in 0..3 {
		manager
			.become_working_copy(
				&a,
				Arc::clone(&buffer),
				Arc::clone(&callback) as Arc<dyn WorkingCopyCallback>,
				&cancel,
			)
			.unwrap();
	}
	let info = manager.acquire_existing_working_copy(&a).unwrap();
	assert_eq!(info.ref_count(), 4);
	for _ in 0..3 {
		manager.release_working_copy(&a).unwrap();
	}
	assert_eq!(callback.disposed.load(Ordering::SeqCst), 0);
	manager.release_working_copy(&a).unwrap();
	assert_eq!(callback.disposed.load(Ordering::SeqCst), 1);
	assert!(info.is_disposed());
}

#[test]
fn test_reconcile_reports_buffer_changes() {
	let model = LinesModel::with_file("a.foo", "alpha\nbeta\n");
	let manager = manager(&model);
	let events = record_events(&manager);
	let a = file("a.foo");
	let buffer = Arc::new(TextBuffer::new("alpha\nbeta\n"));
	let callback = Arc::new(CountingCallback::default());
	let cancel = CancellationToken::new();
	manager
		.become_working_copy(
			&a,
			Arc::clone(&buffer),
			Arc::clone(&callback) as Arc<dyn WorkingCopyCallback>,
			&cancel,
		)
		.unwrap();
	events.lock().clear();

	let outcome = manager.reconcile(&a, false, &cancel).unwrap();
	assert!(!outcome.reconciled);

	buffer.set_contents("alpha\nbeta 2\ngamma\n");
	let outcome = manager.reconcile(&a, false, &cancel).unwrap();
	assert!(outcome.reconciled);
	let expected =
		"a.foo[*]: {CHILDREN|CONTENT|FINE GRAINED}\n  gamma[+]: {}\n  alpha[*]: {CONTENT}\n  beta[*]: {CONTENT}";
	assert_eq!(outcome.delta.unwrap().to_string(), expected);
	assert_eq!(*events.lock(), vec![(EventKinds::POST_RECONCILE, expected.to_string())]);
	assert_eq!(manager.children(&a).unwrap().len(), 3);

	let outcome = manager.reconcile(&a, true, &cancel).unwrap();
	assert!(outcome.reconciled);
	assert!(outcome.delta.is_none());
	assert_eq!(events.lock().len(), 1);
	assert_eq!(callback.reconciled.lock().len(), 2);
}

#[test]
fn test_reconcile_of_plain_file_is_noop() {
	let model = LinesModel::with_file("a.foo", "alpha\n");
	let manager = manager(&model);
	let outcome = manager
		.reconcile(&file("a.foo"), true, &CancellationToken::new())
		.unwrap();
	assert!(!outcome.reconciled);
	assert_eq!(model.builds.load(Ordering::SeqCst), 0);
}

#[test]
fn test_working_copy_survives_overflow() {
	let mut disk = FxHashMap::default();
	for name in ["a.foo", "b.foo", "c.foo"] {
		disk.insert(name.to_string(), "x\ny\n".to_string());
	}
	let model = Arc::new(LinesModel {
		disk: Mutex::new(disk),
		..LinesModel::default()
	});
	let config = ModelConfig {
		cache_size: 3,
		load_factor: 1.0,
		child_headroom: false,
		..ModelConfig::default()
	};
	let manager = ModelManager::new(Arc::clone(&model) as Arc<dyn Model>, config).unwrap();
	let a = file("a.foo");
	manager
		.become_working_copy(
			&a,
			Arc::new(TextBuffer::new("x\ny\n")),
			Arc::new(DefaultWorkingCopyCallback),
			&CancellationToken::new(),
		)
		.unwrap();

	manager.body(&file("b.foo")).unwrap();
	manager.body(&file("c.foo")).unwrap();
	assert!(manager.elements().is_cached(&a));
	assert!(manager.elements().is_cached(&a.child(LINE, "y")));
	assert!(!manager.elements().is_cached(&file("b.foo")));
	assert!(
		model
			.closed
			.lock()
			.iter()
			.any(|(name, hint)| name == "b.foo" && *hint == CloseHint::CacheOverflow)
	);
}

/// Parks `on_init` until the test lets it finish.
struct GatedCallback {
	fail_init: bool,
	entered: Barrier,
	proceed: Barrier,
	disposed: AtomicUsize,
}

impl GatedCallback {
	fn new(fail_init: bool) -> Arc<Self> {
		Arc::new(Self {
			fail_init,
			entered: Barrier::new(2),
			proceed: Barrier::new(2),
			disposed: AtomicUsize::new(0),
		})
	}
}

impl WorkingCopyCallback for GatedCallback {
	fn on_init(&self, _info: &WorkingCopyInfo) -> Result<()> {
		self.entered.wait();
		self.proceed.wait();
		if self.fail_init {
			Err(Error::Callback("refused".into()))
		} else {
			Ok(())
		}
	}

	fn on_dispose(&self, _info: &WorkingCopyInfo) {
		self.disposed.fetch_add(1, Ordering::SeqCst);
	}
}

fn wait_for_refs(manager: &ModelManager, file: &Handle, refs: usize) {
	let current = || manager.elements().peek_at_working_copy_info(file).map(|info| info.ref_count());
	while current() != Some(refs) {
		thread::yield_now();
	}
}

fn spawn_become(
	manager: &Arc<ModelManager>,
	buffer: &Arc<TextBuffer>,
	callback: Arc<dyn WorkingCopyCallback>,
) -> thread::JoinHandle<Result<bool>> {
	let manager = Arc::clone(manager);
	let buffer = Arc::clone(buffer);
	thread::spawn(move || manager.become_working_copy(&file("a.foo"), buffer, callback, &CancellationToken::new()))
}

#[test]
fn test_waiting_caller_retries_after_failed_initialization() {
	let model = LinesModel::with_file("a.foo", "alpha\n");
	let manager = Arc::new(manager(&model));
	let a = file("a.foo");
	let failing = GatedCallback::new(true);
	let first_buffer = Arc::new(TextBuffer::new("alpha\n"));
	let first = spawn_become(&manager, &first_buffer, Arc::clone(&failing) as Arc<dyn WorkingCopyCallback>);
	failing.entered.wait();

	let second_buffer = Arc::new(TextBuffer::new("alpha\nbeta\n"));
	let second_callback = Arc::new(CountingCallback::default());
	let second = spawn_become(
		&manager,
		&second_buffer,
		Arc::clone(&second_callback) as Arc<dyn WorkingCopyCallback>,
	);
	wait_for_refs(&manager, &a, 2);
	failing.proceed.wait();

	assert!(matches!(first.join().unwrap(), Err(Error::Callback(_))));
	assert!(second.join().unwrap().unwrap());
	assert_eq!(failing.disposed.load(Ordering::SeqCst), 1);
	assert_eq!(first_buffer.ref_count(), 0);

	assert!(manager.is_working_copy(&a));
	assert!(Arc::ptr_eq(&manager.working_copy_buffer(&a).unwrap(), &second_buffer));
	assert_eq!(manager.children(&a).unwrap().len(), 2);
	second_buffer.set_contents("alpha\nbeta\ngamma\n");
	assert!(manager.reconcile(&a, false, &CancellationToken::new()).unwrap().reconciled);

	assert!(manager.release_working_copy(&a).unwrap());
	assert_eq!(second_callback.disposed.load(Ordering::SeqCst), 1);
	assert_eq!(second_buffer.ref_count(), 0);
	assert!(manager.working_copies().is_empty());
}

#[rstest]
#[case::initialized(false, Some(true))]
#[case::failed(true, None)]
fn test_acquire_waits_for_initialization(#[case] fail_init: bool, #[case] acquired: Option<bool>) {
	let model = LinesModel::with_file("a.foo", "alpha\n");
	let manager = Arc::new(manager(&model));
	let a = file("a.foo");
	let callback = GatedCallback::new(fail_init);
	let buffer = Arc::new(TextBuffer::new("alpha\n"));
	let initializer = spawn_become(&manager, &buffer, Arc::clone(&callback) as Arc<dyn WorkingCopyCallback>);
	callback.entered.wait();

	let acquirer = {
		let manager = Arc::clone(&manager);
		thread::spawn(move || {
			manager
				.acquire_existing_working_copy(&file("a.foo"))
				.map(|info| info.is_initialized())
		})
	};
	wait_for_refs(&manager, &a, 2);
	callback.proceed.wait();

	assert_eq!(initializer.join().unwrap().is_ok(), !fail_init);
	assert_eq!(acquirer.join().unwrap(), acquired);
	if !fail_init {
		assert_eq!(buffer.ref_count(), 2);
		assert!(!manager.release_working_copy(&a).unwrap());
		assert!(manager.release_working_copy(&a).unwrap());
	}
	assert_eq!(callback.disposed.load(Ordering::SeqCst), 1);
	assert_eq!(buffer.ref_count(), 0);
	assert!(!manager.is_working_copy(&a));
}

#[test]
fn test_release_waits_for_reconcile_in_progress() {
	let model = LinesModel::with_file("a.foo", "alpha\n");
	let manager = Arc::new(manager(&model));
	let a = file("a.foo");
	let buffer = Arc::new(TextBuffer::new("alpha\n"));
	let callback = Arc::new(CountingCallback::default());
	manager
		.become_working_copy(
			&a,
			Arc::clone(&buffer),
			Arc::clone(&callback) as Arc<dyn WorkingCopyCallback>,
			&CancellationToken::new(),
		)
		.unwrap();
	let events = record_events(&manager);
	buffer.set_contents("alpha\nbuffer_only\n");

	let gate = Arc::new(Barrier::new(2));
	*model.gate.lock() = Some(Arc::clone(&gate));
	model.slow.store(true, Ordering::SeqCst);
	let reconciler = {
		let manager = Arc::clone(&manager);
		thread::spawn(move || {
			manager
				.reconcile(&file("a.foo"), false, &CancellationToken::new())
				.map(|outcome| outcome.reconciled)
		})
	};
	gate.wait();
	assert!(manager.release_working_copy(&a).unwrap());
	let reconciled = reconciler.join().unwrap().unwrap();
	model.slow.store(false, Ordering::SeqCst);

	assert!(reconciled);
	assert!(!manager.is_working_copy(&a));
	assert!(!manager.elements().is_cached(&a));
	assert_eq!(callback.disposed.load(Ordering::SeqCst), 1);
	assert_eq!(manager.children(&a).unwrap(), vec![a.child(LINE, "alpha")]);
	assert!(
		events
			.lock()
			.contains(&(EventKinds::POST_CHANGE, "a.foo[*]: {WORKING COPY}".to_string()))
	);
	assert!(!manager.reconcile(&a, true, &CancellationToken::new()).unwrap().reconciled);
}
